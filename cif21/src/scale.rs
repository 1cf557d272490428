//!
//! # Scale Engine
//!
//! One [ScaleContext] per mode, constructed per operation and threaded
//! explicitly through every call - never a singleton. It folds the
//! file-declared resolution, the caller-supplied external scale, and the
//! per-symbol rational ratio into a single multiplier, assembled (and
//! rounded) exactly once so results are deterministic regardless of the
//! order the terms arrive in.
//!

// Crates.io
use serde::{Deserialize, Serialize};

// Local imports
use crate::data::CifMode;
use crate::error::CifWarning;
use crate::{Int, DEFAULT_RESOLUTION, MAX_RESOLUTION};

/// # Per-Mode Scale Context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScaleContext {
    /// Owning mode
    mode: CifMode,
    /// File-declared resolution: file units per internal unit, default 100
    resolution: u32,
    /// Whether a resolution declaration has been accepted this file
    resolution_seen: bool,
    /// Caller-supplied overall scale
    external: f64,
    /// Per-symbol rational ratio, reset to 1/1 at each new symbol.
    /// Ignored outright in electrical mode.
    ratio: (Int, Int),
    /// Library-cell exemption: geometry skips the external term,
    /// instance placements keep it
    library_exempt: bool,
    /// Assembled geometry multiplier
    mult: f64,
    /// Assembled instance-placement multiplier
    inst_mult: f64,
    /// Fast-path flag: false when both multipliers are exactly one
    needs_mult: bool,
}
impl ScaleContext {
    /// Create a new identity-scaled context for `mode`
    pub fn new(mode: CifMode) -> Self {
        let mut ctx = Self {
            mode,
            resolution: DEFAULT_RESOLUTION,
            resolution_seen: false,
            external: 1.0,
            ratio: (1, 1),
            library_exempt: false,
            mult: 1.0,
            inst_mult: 1.0,
            needs_mult: false,
        };
        ctx.assemble();
        ctx
    }
    /// Our owning mode
    pub fn mode(&self) -> CifMode {
        self.mode
    }
    /// Accept a file resolution declaration.
    /// Out-of-range values are a warning, not an error: the default is
    /// substituted and the read continues.
    pub fn set_resolution(&mut self, value: Int) -> Option<CifWarning> {
        let warning = if value < DEFAULT_RESOLUTION as Int || value > MAX_RESOLUTION as Int {
            self.resolution = DEFAULT_RESOLUTION;
            Some(CifWarning::Resolution {
                msg: format!(
                    "resolution {} outside {}..={}; using {}",
                    value, DEFAULT_RESOLUTION, MAX_RESOLUTION, DEFAULT_RESOLUTION
                ),
            })
        } else {
            self.resolution = value as u32;
            None
        };
        self.resolution_seen = true;
        self.assemble();
        warning
    }
    /// Whether a resolution declaration has been seen this file
    pub fn resolution_seen(&self) -> bool {
        self.resolution_seen
    }
    /// Set the caller-supplied overall scale
    pub fn set_external_scale(&mut self, scale: f64) {
        self.external = scale;
        self.assemble();
    }
    /// Set the per-symbol rational ratio. Electrical mode ignores ratios by definition.
    pub fn set_symbol_ratio(&mut self, a: Int, b: Int) {
        if self.mode == CifMode::Elec {
            return;
        }
        self.ratio = if a > 0 && b > 0 { (a, b) } else { (1, 1) };
        self.assemble();
    }
    /// Reset the per-symbol ratio to 1/1, as at each new symbol
    pub fn reset_symbol_ratio(&mut self) {
        self.ratio = (1, 1);
        self.assemble();
    }
    /// Mark this context as reading library (shared sub-master) content:
    /// geometry is read unscaled by the external term, while instance
    /// placements keep it, so shared content is never multiply-scaled.
    pub fn set_library_exempt(&mut self, exempt: bool) {
        self.library_exempt = exempt;
        self.assemble();
    }
    /// Assemble the combined multipliers. This is the single rounding
    /// boundary: each term contributes once here, never per-coordinate.
    fn assemble(&mut self) {
        let res_mult = DEFAULT_RESOLUTION as f64 / self.resolution as f64;
        let ratio = self.ratio.0 as f64 / self.ratio.1 as f64;
        self.inst_mult = res_mult * self.external * ratio;
        self.mult = if self.library_exempt {
            res_mult * ratio
        } else {
            self.inst_mult
        };
        self.needs_mult = self.mult != 1.0 || self.inst_mult != 1.0;
    }
    /// Scale one geometry coordinate. Every coordinate the lexer produces
    /// passes through exactly one of [ScaleContext::scale] or
    /// [ScaleContext::scale_placement] before being stored.
    pub fn scale(&self, x: Int) -> Int {
        if !self.needs_mult {
            return x;
        }
        (x as f64 * self.mult).round() as Int
    }
    /// Scale one instance-placement coordinate
    pub fn scale_placement(&self, x: Int) -> Int {
        if !self.needs_mult {
            return x;
        }
        (x as f64 * self.inst_mult).round() as Int
    }
    /// The assembled geometry multiplier, e.g. for property payload rescaling
    pub fn multiplier(&self) -> f64 {
        self.mult
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_identity() {
        let ctx = ScaleContext::new(CifMode::Phys);
        assert_eq!(ctx.scale(12345), 12345);
        assert_eq!(ctx.multiplier(), 1.0);
    }
    #[test]
    fn resolution_rescales() {
        let mut ctx = ScaleContext::new(CifMode::Phys);
        assert!(ctx.set_resolution(1000).is_none());
        assert_eq!(ctx.scale(1000), 100);
        assert_eq!(ctx.scale(15), 2); // 1.5 rounds away from zero
    }
    #[test]
    fn out_of_range_resolution_warns_and_defaults() {
        let mut ctx = ScaleContext::new(CifMode::Phys);
        assert!(ctx.set_resolution(7).is_some());
        assert_eq!(ctx.scale(100), 100);
        assert!(ctx.resolution_seen());
    }
    #[test]
    fn reference_rounding_table() {
        // The one-rounding-per-assembly rule, pinned against fixed values:
        // resolution=100, external=0.33 applied to x=300 is exactly 99.
        let mut ctx = ScaleContext::new(CifMode::Phys);
        assert!(ctx.set_resolution(100).is_none());
        ctx.set_external_scale(0.33);
        assert_eq!(ctx.scale(300), 99);
        assert_eq!(ctx.scale(100), 33);
        assert_eq!(ctx.scale(50), 17); // 16.5 rounds up, not banker's
    }
    #[test]
    fn sequential_vs_single_assembly() {
        // Two sequential configurations k1 then k2 equal a single k1*k2
        // only when no intermediate rounding boundary is crossed.
        let mut ctx = ScaleContext::new(CifMode::Phys);
        ctx.set_external_scale(0.5);
        let first = ctx.scale(301); // 150.5 -> 151: rounding boundary crossed
        let mut ctx2 = ScaleContext::new(CifMode::Phys);
        ctx2.set_external_scale(0.5);
        let second = ctx2.scale(first);
        let mut once = ScaleContext::new(CifMode::Phys);
        once.set_external_scale(0.25);
        assert_eq!(second, 76);
        assert_eq!(once.scale(301), 75);
    }
    #[test]
    fn elec_mode_ignores_symbol_ratio() {
        let mut ctx = ScaleContext::new(CifMode::Elec);
        ctx.set_symbol_ratio(3, 1);
        assert_eq!(ctx.scale(100), 100);
        let mut phys = ScaleContext::new(CifMode::Phys);
        phys.set_symbol_ratio(3, 1);
        assert_eq!(phys.scale(100), 300);
    }
    #[test]
    fn library_exemption_splits_multipliers() {
        let mut ctx = ScaleContext::new(CifMode::Phys);
        ctx.set_external_scale(2.0);
        ctx.set_library_exempt(true);
        assert_eq!(ctx.scale(100), 100); // geometry unscaled
        assert_eq!(ctx.scale_placement(100), 200); // placements scaled
    }
}
