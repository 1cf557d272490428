//!
//! # Streaming Translation Backend
//!
//! Consumes the same parser event stream as the materialization backend,
//! but instead of building persistent objects re-emits each event -
//! transformed by the live transform stack, filtered (and optionally
//! clipped) against an area-of-interest window - to an [OutputSink].
//!
//! Hierarchy flattening replays each instance target's own event stream
//! through the digest layer under the pushed transform, rather than
//! writing a nested instance record. Recursion depth is bounded by the
//! transform stack's limit, which doubles as the cycle guard: the format
//! does not forbid self-referential hierarchies at the grammar level.
//!

// Std-Lib
use std::io::{Read, Seek};

// Crates.io
use log::warn;

// Local imports
use crate::data::{CifMode, TranslateOptions};
use crate::digest::{CifDigest, DigestBody};
use crate::error::{CifError, CifResult, CifWarning};
use crate::geom::{CifBox, CifShape, Point, ShapeTrait};
use crate::read::{CifEvent, CifParser};
use crate::symbols::ArraySpec;
use crate::write::OutputSink;
use crate::xform::{CifPlacement, TransformStack};

/// # CifTranslator
///
/// Re-emits a parsed stream to an [OutputSink], applying the
/// area-of-interest window, clipping, and flattening options.
pub struct CifTranslator<'s, S: OutputSink> {
    sink: &'s mut S,
    opts: TranslateOptions,
    stack: TransformStack,
    /// Header owed to the sink before the next record of each section
    pending_header: Option<CifMode>,
    warnings: Vec<CifWarning>,
}
impl<'s, S: OutputSink> CifTranslator<'s, S> {
    /// Create a new translator producing into `sink`
    pub fn new(sink: &'s mut S, opts: TranslateOptions) -> Self {
        Self {
            sink,
            opts,
            stack: TransformStack::default(),
            pending_header: Some(CifMode::Phys),
            warnings: Vec::new(),
        }
    }
    /// The warnings accumulated by this translation
    pub fn warnings(&self) -> &[CifWarning] {
        &self.warnings
    }
    /// Translate `parser`'s stream without flattening. Symbol names are
    /// taken from the parser's tables, so a discovery pass should have run
    /// (and the parser been restarted) when names matter on output.
    pub fn run<R: Read + Seek>(&mut self, parser: &mut CifParser<R>) -> CifResult<()> {
        if self.opts.flatten {
            return Err(CifError::Structural {
                msg: "flatten translation requires a digest; use run_flat".to_string(),
            });
        }
        loop {
            let event = match parser.next_event()? {
                Some(event) => event,
                None => break,
            };
            match event {
                CifEvent::SymbolBegin {
                    key, mode, number, ..
                } => {
                    self.flush_header()?;
                    let name = parser.table(mode).get(key).and_then(|s| s.name.clone());
                    self.sink
                        .write_symbol_begin(number, name.as_deref(), (1, 1))?;
                }
                CifEvent::SymbolNamed { .. } => (), // emitted with the begin record
                CifEvent::Layer(desc) => {
                    self.flush_header()?;
                    self.sink.write_layer(&desc)?;
                }
                CifEvent::Shape(shape) => {
                    self.flush_header()?;
                    self.emit_shape(&shape)?;
                }
                CifEvent::Instance {
                    target,
                    placement,
                    array,
                    ..
                } => {
                    self.flush_header()?;
                    let mode = parser.mode();
                    let (number, name, bbox) = match parser.table(mode).get(target) {
                        Some(sym) => (sym.number.unwrap_or(0), sym.name.clone(), sym.bbox),
                        None => continue,
                    };
                    // Window-filter instances only when the target extent is known
                    if let (Some(window), Some(bbox)) = (self.opts.window, bbox) {
                        let placed = CifShape::CifBox(CifBox::new(bbox.p0, bbox.p1))
                            .transformed(&placement.to_transform())
                            .shape_bbox();
                        if !placed.intersects(&window) {
                            continue;
                        }
                    }
                    self.sink.write_instance(
                        number,
                        name.as_deref(),
                        &placement,
                        array.as_ref(),
                    )?;
                }
                CifEvent::Property(prop) => {
                    self.flush_header()?;
                    self.sink.write_property(&prop)?;
                }
                CifEvent::SymbolEnd { .. } => self.sink.write_symbol_end()?,
                CifEvent::SectionEnd(mode) => {
                    self.flush_header()?;
                    self.sink.write_end()?;
                    if mode == CifMode::Phys {
                        self.pending_header = Some(CifMode::Elec);
                    }
                }
                CifEvent::End => break,
            }
        }
        Ok(())
    }
    /// Translate with hierarchy flattening: every instance body is replayed
    /// through `digest` under the composed transform.
    pub fn run_flat<R1, R2>(
        &mut self,
        parser: &mut CifParser<R1>,
        digest: &mut CifDigest<R2>,
    ) -> CifResult<()>
    where
        R1: Read + Seek,
        R2: Read + Seek,
    {
        loop {
            let event = match parser.next_event()? {
                Some(event) => event,
                None => break,
            };
            match event {
                CifEvent::SymbolBegin {
                    key, mode, number, ..
                } => {
                    self.flush_header()?;
                    let name = parser.table(mode).get(key).and_then(|s| s.name.clone());
                    self.sink
                        .write_symbol_begin(number, name.as_deref(), (1, 1))?;
                }
                CifEvent::SymbolNamed { .. } => (),
                CifEvent::Layer(desc) => {
                    self.flush_header()?;
                    self.sink.write_layer(&desc)?;
                }
                CifEvent::Shape(shape) => {
                    self.flush_header()?;
                    self.emit_shape(&shape)?;
                }
                CifEvent::Instance {
                    target,
                    placement,
                    array,
                    ..
                } => {
                    self.flush_header()?;
                    let mode = parser.mode();
                    let name = match parser.table(mode).get(target) {
                        Some(sym) => sym.display_name(),
                        None => continue,
                    };
                    self.replay(digest, mode, &name, &placement, array)?;
                }
                CifEvent::Property(prop) => {
                    self.flush_header()?;
                    self.sink.write_property(&prop)?;
                }
                CifEvent::SymbolEnd { .. } => self.sink.write_symbol_end()?,
                CifEvent::SectionEnd(mode) => {
                    self.flush_header()?;
                    self.sink.write_end()?;
                    if mode == CifMode::Phys {
                        self.pending_header = Some(CifMode::Elec);
                    }
                }
                CifEvent::End => break,
            }
        }
        Ok(())
    }
    /// Replay one instance: each array copy pushes its placement and
    /// re-emits the target's body in place of an instance record.
    fn replay<R2: Read + Seek>(
        &mut self,
        digest: &mut CifDigest<R2>,
        mode: CifMode,
        name: &str,
        placement: &CifPlacement,
        array: Option<ArraySpec>,
    ) -> CifResult<()> {
        let copies: Vec<Point> = match array {
            None => vec![Point::default()],
            Some(a) => {
                let mut offsets = Vec::with_capacity((a.nx * a.ny) as usize);
                for j in 0..a.ny {
                    for i in 0..a.nx {
                        offsets.push(Point::new(i * a.px, j * a.py));
                    }
                }
                offsets
            }
        };
        for offset in copies {
            let mut placed = placement.clone();
            placed.origin = placed.origin + offset;
            self.stack.push(&placed)?;
            let result = self.replay_body(digest, mode, name);
            self.stack.pop()?;
            result?;
        }
        Ok(())
    }
    /// Emit one target body under the current stack composition
    fn replay_body<R2: Read + Seek>(
        &mut self,
        digest: &mut CifDigest<R2>,
        mode: CifMode,
        name: &str,
    ) -> CifResult<()> {
        let key = match digest.find(name, mode) {
            Some(key) => key,
            None => {
                return Err(CifError::Structural {
                    msg: format!("flatten target `{}` is not in the digest", name),
                })
            }
        };
        match digest.seek_and_parse(key, mode)? {
            DigestBody::Parsed(events) => {
                for event in events {
                    match event {
                        CifEvent::Layer(desc) => self.sink.write_layer(&desc)?,
                        CifEvent::Shape(shape) => self.emit_shape(&shape)?,
                        CifEvent::Instance {
                            target,
                            placement,
                            array,
                            ..
                        } => {
                            let tname = match digest.symbol(target, mode) {
                                Some(sym) => sym.display_name(),
                                None => continue,
                            };
                            self.replay(digest, mode, &tname, &placement, array)?;
                        }
                        CifEvent::Property(prop) => self.sink.write_property(&prop)?,
                        _ => (),
                    }
                }
            }
            DigestBody::Override(cell) => {
                for element in cell.elements.iter() {
                    self.sink.write_layer(&element.layer)?;
                    self.emit_shape(&element.shape)?;
                }
                for inst in cell.instances.iter() {
                    self.replay(digest, mode, &inst.cell_name, &inst.placement, inst.array)?;
                }
            }
        }
        Ok(())
    }
    /// Emit `shape` through the transform stack, window filter, and clip
    fn emit_shape(&mut self, shape: &CifShape) -> CifResult<()> {
        let shape = if self.stack.depth() > 0 {
            shape.transformed(self.stack.top())
        } else {
            shape.clone()
        };
        let window = match self.opts.window {
            Some(window) => window,
            None => return self.sink.write_shape(&shape),
        };
        let bbox = shape.shape_bbox();
        if !bbox.intersects(&window) {
            // Disjoint from the area of interest: dropped, silently
            return Ok(());
        }
        let fully_inside = window.intersection(&bbox) == bbox;
        if !self.opts.clip || fully_inside {
            return self.sink.write_shape(&shape);
        }
        match &shape {
            CifShape::CifBox(b) => {
                let clipped = window.intersection(&b.shape_bbox());
                if !clipped.is_empty() {
                    self.sink.write_box(&CifBox::new(clipped.p0, clipped.p1))?;
                }
                Ok(())
            }
            CifShape::Polygon(p) => {
                if p.is_degenerate() {
                    return self.clip_fallback(&shape);
                }
                let clipped = p.clip(&window);
                match clipped.first() {
                    None => Ok(()),
                    Some(cp) if cp.is_degenerate() => self.clip_fallback(&shape),
                    Some(_) => {
                        for cp in clipped.iter() {
                            self.sink.write_polygon(cp)?;
                        }
                        Ok(())
                    }
                }
            }
            CifShape::Wire(w) => {
                // Clip through the outline form
                let (poly, warning) = w.to_polygon();
                if warning.is_some() || poly.is_degenerate() {
                    return self.clip_fallback(&shape);
                }
                let clipped = poly.clip(&window);
                match clipped.first() {
                    None => Ok(()),
                    Some(cp) if cp.is_degenerate() => self.clip_fallback(&shape),
                    Some(_) => {
                        for cp in clipped.iter() {
                            self.sink.write_polygon(cp)?;
                        }
                        Ok(())
                    }
                }
            }
            CifShape::Label(l) => {
                if window.contains(&l.loc) {
                    self.sink.write_label(l)?;
                }
                Ok(())
            }
        }
    }
    /// A clip failed on degenerate geometry: emit the unclipped primitive
    /// with a warning rather than dropping or corrupting it.
    fn clip_fallback(&mut self, shape: &CifShape) -> CifResult<()> {
        let warning = CifWarning::Clip {
            msg: "degenerate geometry survived unclipped".to_string(),
        };
        warn!("{}", warning);
        self.warnings.push(warning);
        self.sink.write_shape(shape)
    }
    /// Write any owed section header
    fn flush_header(&mut self) -> CifResult<()> {
        if let Some(mode) = self.pending_header.take() {
            self.sink.write_header(mode)?;
        }
        Ok(())
    }
}
