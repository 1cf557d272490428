//!
//! # Hierarchy Digest: Random-Access Re-Parsing
//!
//! A [CifDigest] wraps a parser whose discovery pass has already run, so
//! every defined symbol carries its byte offset. One symbol's body can
//! then be re-parsed in isolation by seeking straight to its definition,
//! bypassing any sequential re-scan. An override table substitutes fully
//! built in-memory cells - shared standard-via or parameterized-cell
//! masters - for their on-disk definitions, so shared sub-hierarchies are
//! parsed once, not per use.
//!

// Std-Lib
use std::collections::HashMap;
use std::io::{Read, Seek};

// Crates.io
use log::debug;

// Local imports
use crate::data::{
    CellKey, CifElement, CifInstance, CifLibrary, CifMode, CifReadOptions, DatabaseSink,
    EntityHandle,
};
use crate::error::{CifError, CifResult};
use crate::geom::BoundBox;
use crate::props::PropertyRegistry;
use crate::read::{CifEvent, CifParser, ProgressHook};
use crate::symbols::{Symbol, SymbolKey};

/// The result of one digest lookup: a freshly parsed event body, or the
/// substituted override cell.
#[derive(Debug, Clone)]
pub enum DigestBody {
    /// Events of the re-parsed definition, [CifEvent::SymbolBegin] through
    /// [CifEvent::SymbolEnd] inclusive
    Parsed(Vec<CifEvent>),
    /// The override cell standing in for the definition
    Override(crate::data::CifCell),
}

/// # CifDigest
///
/// Offset-addressed access to one file's symbol definitions.
pub struct CifDigest<R: Read + Seek> {
    parser: CifParser<R>,
    /// Override cells, keyed by (mode, symbol name)
    overrides: HashMap<(CifMode, String), crate::data::CifCell>,
}
impl<R: Read + Seek> CifDigest<R> {
    /// Build a digest by running a discovery pass over `src`
    pub fn scan(src: R, opts: CifReadOptions) -> CifResult<Self> {
        let mut parser = CifParser::new(src, opts)?;
        parser.scan()?;
        Ok(Self {
            parser,
            overrides: HashMap::new(),
        })
    }
    /// Build a digest around a parser that has already scanned
    pub fn from_parser(parser: CifParser<R>) -> Self {
        Self {
            parser,
            overrides: HashMap::new(),
        }
    }
    /// Install the progress/cancel callback
    pub fn set_progress(&mut self, hook: ProgressHook) {
        self.parser.set_progress(hook);
    }
    /// Count of raw reads issued to the underlying stream
    pub fn read_calls(&self) -> u64 {
        self.parser.read_calls()
    }
    /// Look up a symbol by name
    pub fn find(&self, name: &str, mode: CifMode) -> Option<SymbolKey> {
        self.parser.table(mode).find_name(name)
    }
    /// Look up a symbol by number
    pub fn find_number(&self, number: u32, mode: CifMode) -> Option<SymbolKey> {
        self.parser.table(mode).find_number(number)
    }
    /// Get the symbol at `key`
    pub fn symbol(&self, key: SymbolKey, mode: CifMode) -> Option<&Symbol> {
        self.parser.table(mode).get(key)
    }
    /// Iterate the defined symbols of `mode`
    pub fn symbols(&self, mode: CifMode) -> impl Iterator<Item = (SymbolKey, &Symbol)> {
        self.parser.table(mode).iter().filter(|(_, s)| s.defined)
    }
    /// The cached bounding box of `key`, if one has been recorded
    pub fn bbox_of(&self, key: SymbolKey, mode: CifMode) -> Option<BoundBox> {
        self.parser.table(mode).get(key).and_then(|s| s.bbox)
    }
    /// Register `cell` as the override for its (mode, name).
    ///
    /// Compatibility is checked here, once, not re-verified per use: the
    /// override must be fully built (bounding box cached), and its
    /// geometry must be in the same units the digest reads - the digest's
    /// geometry multiplier for the cell's mode must be one, which holds
    /// under no external scale or under library-mode reading where
    /// geometry is exempt from it.
    pub fn add_override(&mut self, cell: crate::data::CifCell) -> CifResult<()> {
        if cell.bbox.is_none() || cell.unread {
            return Err(CifError::Structural {
                msg: format!(
                    "override `{}` is not a fully built cell",
                    cell.name
                ),
            });
        }
        if self.parser.scale(cell.mode).multiplier() != 1.0 {
            return Err(CifError::Structural {
                msg: format!(
                    "override `{}` is not scale-compatible with this read context",
                    cell.name
                ),
            });
        }
        self.overrides
            .insert((cell.mode, cell.name.clone()), cell);
        Ok(())
    }
    /// Seek to `key`'s recorded definition and re-parse that one body.
    ///
    /// If an override is registered under the symbol's name, the stream is
    /// not touched at all: the symbol is marked `should_skip`, its bbox is
    /// taken from the override, and the override is returned.
    ///
    /// Failures are scoped to this one symbol; bodies materialized by
    /// earlier calls stay valid.
    pub fn seek_and_parse(&mut self, key: SymbolKey, mode: CifMode) -> CifResult<DigestBody> {
        let name = match self.parser.table(mode).get(key) {
            Some(sym) => sym.display_name(),
            None => {
                return Err(CifError::Structural {
                    msg: "digest lookup of a dangling symbol handle".to_string(),
                })
            }
        };
        if let Some(cell) = self.overrides.get(&(mode, name.clone())) {
            let bbox = cell.bbox;
            let cell = cell.clone();
            if let Some(sym) = self.parser.table_mut(mode).get_mut(key) {
                sym.should_skip = true;
                sym.bbox = bbox;
            }
            debug!("substituting override for `{}`", name);
            return Ok(DigestBody::Override(cell));
        }
        let events = self.parser.parse_symbol_at(key, mode)?;
        Ok(DigestBody::Parsed(events))
    }
    /// Re-parse (or substitute) `key` and materialize it into `sink`.
    /// The convenience form of [CifDigest::seek_and_parse] for callers
    /// building cells rather than streaming events.
    pub fn materialize_symbol<S: DatabaseSink>(
        &mut self,
        key: SymbolKey,
        mode: CifMode,
        sink: &mut S,
    ) -> CifResult<CellKey> {
        match self.seek_and_parse(key, mode)? {
            DigestBody::Override(cell) => {
                let out = sink.create_cell(&cell.name, mode)?;
                let bbox = cell.bbox;
                for mut element in cell.elements {
                    let props = std::mem::take(&mut element.properties);
                    let handle = sink.add_element(out, element)?;
                    sink.attach_properties(handle, props)?;
                }
                for mut inst in cell.instances {
                    let props = std::mem::take(&mut inst.properties);
                    let handle = sink.add_instance(out, inst)?;
                    sink.attach_properties(handle, props)?;
                }
                sink.attach_properties(EntityHandle::Cell(out), cell.properties)?;
                sink.finalize_cell(out, bbox)?;
                Ok(out)
            }
            DigestBody::Parsed(events) => self.materialize_events(key, mode, events, sink),
        }
    }
    /// Fold one symbol's event body into `sink`
    fn materialize_events<S: DatabaseSink>(
        &mut self,
        key: SymbolKey,
        mode: CifMode,
        events: Vec<CifEvent>,
        sink: &mut S,
    ) -> CifResult<CellKey> {
        let name = match self.parser.table(mode).get(key) {
            Some(sym) => sym.display_name(),
            None => {
                return Err(CifError::Structural {
                    msg: "digest materialization of a dangling handle".to_string(),
                })
            }
        };
        let out = sink.create_cell(&name, mode)?;
        let mut registry = PropertyRegistry::new();
        let mut layer: Option<crate::data::LayerDescriptor> = None;
        for event in events {
            match event {
                CifEvent::SymbolBegin { .. } | CifEvent::SymbolNamed { .. } => (),
                CifEvent::Layer(desc) => {
                    sink.ensure_layer(&desc)?;
                    layer = Some(desc);
                }
                CifEvent::Property(prop) => registry.queue(prop.id, prop.payload),
                CifEvent::Shape(shape) => {
                    let layer = match layer.clone() {
                        Some(layer) => layer,
                        None => continue,
                    };
                    let handle = sink.add_element(
                        out,
                        CifElement {
                            layer,
                            shape,
                            properties: Vec::new(),
                        },
                    )?;
                    sink.attach_properties(handle, registry.take_pending())?;
                }
                CifEvent::Instance {
                    target,
                    placement,
                    array,
                    ..
                } => {
                    let target_name = match self.parser.table(mode).get(target) {
                        Some(sym) => sym.display_name(),
                        None => continue,
                    };
                    if sink.find_cell(&target_name, mode).is_none() {
                        sink.create_placeholder(&target_name, mode)?;
                    }
                    let handle = sink.add_instance(
                        out,
                        CifInstance {
                            cell_name: target_name,
                            placement,
                            array,
                            properties: Vec::new(),
                        },
                    )?;
                    sink.attach_properties(handle, registry.take_pending())?;
                }
                CifEvent::SymbolEnd { .. } => {
                    sink.attach_properties(EntityHandle::Cell(out), registry.take_pending())?;
                }
                CifEvent::SectionEnd(_) | CifEvent::End => (),
            }
        }
        sink.finalize_cell(out, None)?;
        Ok(out)
    }
    /// Materialize every defined symbol of `mode` into a fresh library,
    /// override substitutions included.
    pub fn materialize_all(&mut self, mode: CifMode) -> CifResult<CifLibrary> {
        let keys: Vec<SymbolKey> = self
            .parser
            .table(mode)
            .iter()
            .filter(|(_, s)| s.defined)
            .map(|(k, _)| k)
            .collect();
        let mut lib = CifLibrary::new("digest");
        for key in keys {
            self.materialize_symbol(key, mode, &mut lib)?;
        }
        lib.finalize_bboxes();
        Ok(lib)
    }
}
