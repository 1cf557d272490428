//!
//! # Property Records & Registry
//!
//! Properties are out-of-band `5 id payload;` records. They queue on the
//! [PropertyRegistry]'s pending list and attach to whatever entity is
//! finalized next - a primitive, an instance, or (at symbol close) the
//! cell itself. Re-scaling dispatches on the property id through a fixed
//! table of token-grammar masks: each id's payload is a known sequence of
//! whitespace-separated tokens, some coordinate-bearing and some verbatim.
//!

// Std-Lib
use std::collections::HashMap;

// Crates.io
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

// Local imports
use crate::data::CifMode;
use crate::error::CifWarning;
use crate::Int;

/// # Property Record
///
/// A numeric id and a verbatim string payload.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CifProperty {
    /// Property id number
    pub id: u32,
    /// Payload text, stored exactly as read
    pub payload: String,
}
impl CifProperty {
    /// Create a new [CifProperty]
    pub fn new(id: u32, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// Well-known property ids with coordinate-bearing payloads
pub mod ids {
    /// Cached cell bounding box: `x0 y0 x1 y1`
    pub const BOUND_BOX: u32 = 7;
    /// Cell origin offset: `x y`
    pub const ORIGIN: u32 = 11;
    /// Default wire parameters: `style width`
    pub const WIRE_DEFAULTS: u32 = 17;
    /// Named snap grid: `name gx gy`
    pub const SNAP_GRID: u32 = 21;
}

/// One token position in a property payload's mini-grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenRule {
    /// An integer coordinate, rescaled
    Coord,
    /// Passed through untouched
    Verbatim,
}

/// The fixed per-id payload grammars. Ids absent here pass through whole.
static REWRITE_RULES: Lazy<HashMap<u32, &'static [TokenRule]>> = Lazy::new(|| {
    use TokenRule::{Coord, Verbatim};
    let mut m: HashMap<u32, &'static [TokenRule]> = HashMap::new();
    m.insert(ids::BOUND_BOX, &[Coord, Coord, Coord, Coord]);
    m.insert(ids::ORIGIN, &[Coord, Coord]);
    m.insert(ids::WIRE_DEFAULTS, &[Verbatim, Coord]);
    m.insert(ids::SNAP_GRID, &[Verbatim, Coord, Coord]);
    m
});

/// Rescale `prop` for its owning `mode`, given the two modes' assembled
/// multipliers. A pure function: malformed payloads are returned unchanged
/// with a [CifWarning::Property], never dropped.
pub fn rescale(
    prop: &CifProperty,
    scale_a: f64,
    scale_b: f64,
    mode: CifMode,
) -> (CifProperty, Option<CifWarning>) {
    let mult = match mode {
        CifMode::Phys => scale_a,
        CifMode::Elec => scale_b,
    };
    let rules = match REWRITE_RULES.get(&prop.id) {
        Some(rules) => *rules,
        None => return (prop.clone(), None),
    };
    if mult == 1.0 {
        return (prop.clone(), None);
    }
    let tokens: Vec<&str> = prop.payload.split_whitespace().collect();
    if tokens.len() != rules.len() {
        return (
            prop.clone(),
            Some(CifWarning::Property {
                msg: format!(
                    "property {} payload has {} tokens, expected {}; left verbatim",
                    prop.id,
                    tokens.len(),
                    rules.len()
                ),
            }),
        );
    }
    let mut out = Vec::with_capacity(tokens.len());
    for (tok, rule) in tokens.iter().zip(rules.iter()) {
        match rule {
            TokenRule::Verbatim => out.push(tok.to_string()),
            TokenRule::Coord => match tok.parse::<Int>() {
                Ok(v) => out.push(((v as f64 * mult).round() as Int).to_string()),
                Err(_) => {
                    return (
                        prop.clone(),
                        Some(CifWarning::Property {
                            msg: format!(
                                "property {} token `{}` is not a coordinate; left verbatim",
                                prop.id, tok
                            ),
                        }),
                    )
                }
            },
        }
    }
    (CifProperty::new(prop.id, out.join(" ")), None)
}

/// # Pending Property Registry
///
/// The ordered list of properties awaiting their owner. `take_pending`
/// must run exactly once per finalized entity; finalizing without a take
/// is a leak in materialization mode and a protocol error in streaming.
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    pending: Vec<CifProperty>,
}
impl PropertyRegistry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self::default()
    }
    /// Queue a property for the next finalized entity
    pub fn queue(&mut self, id: u32, payload: impl Into<String>) {
        self.pending.push(CifProperty::new(id, payload));
    }
    /// Take the pending list, clearing it
    pub fn take_pending(&mut self) -> Vec<CifProperty> {
        std::mem::take(&mut self.pending)
    }
    /// Boolean indication of an empty pending list
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
    /// Number of pending records
    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_and_take() {
        let mut reg = PropertyRegistry::new();
        reg.queue(7, "0 0 10 10");
        reg.queue(99, "opaque payload");
        assert_eq!(reg.len(), 2);
        let taken = reg.take_pending();
        assert_eq!(taken.len(), 2);
        assert!(reg.is_empty());
        assert_eq!(taken[0], CifProperty::new(7, "0 0 10 10"));
    }
    #[test]
    fn bound_box_rescales() {
        let prop = CifProperty::new(ids::BOUND_BOX, "0 0 100 200");
        let (out, warn) = rescale(&prop, 0.5, 1.0, CifMode::Phys);
        assert!(warn.is_none());
        assert_eq!(out.payload, "0 0 50 100");
    }
    #[test]
    fn wire_defaults_keeps_style_token() {
        let prop = CifProperty::new(ids::WIRE_DEFAULTS, "1 40");
        let (out, warn) = rescale(&prop, 0.25, 1.0, CifMode::Phys);
        assert!(warn.is_none());
        assert_eq!(out.payload, "1 10");
    }
    #[test]
    fn unknown_id_passes_through() {
        let prop = CifProperty::new(12345, "anything at all ; here");
        let (out, warn) = rescale(&prop, 0.1, 1.0, CifMode::Phys);
        assert!(warn.is_none());
        assert_eq!(out, prop);
    }
    #[test]
    fn malformed_payload_is_left_verbatim() {
        let prop = CifProperty::new(ids::ORIGIN, "12 notanumber");
        let (out, warn) = rescale(&prop, 0.5, 1.0, CifMode::Phys);
        assert!(warn.is_some());
        assert_eq!(out, prop);

        let short = CifProperty::new(ids::BOUND_BOX, "1 2 3");
        let (out, warn) = rescale(&short, 0.5, 1.0, CifMode::Phys);
        assert!(warn.is_some());
        assert_eq!(out, short);
    }
    #[test]
    fn mode_selects_multiplier() {
        let prop = CifProperty::new(ids::ORIGIN, "100 100");
        let (a, _) = rescale(&prop, 0.5, 2.0, CifMode::Phys);
        let (b, _) = rescale(&prop, 0.5, 2.0, CifMode::Elec);
        assert_eq!(a.payload, "50 50");
        assert_eq!(b.payload, "200 200");
    }
}
