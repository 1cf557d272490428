//!
//! # Cif21 Hierarchical Layout Text Parser & Writer
//!
//! CIF-family text is the venerable line/record-oriented format for
//! interchanging IC layout: cells ("symbols") defined as nested records of
//! geometric primitives - boxes, polygons, wires, labels - plus instance
//! references carrying translation, direction-vector rotation, mirroring,
//! magnification, and rectangular arraying, with out-of-band numeric
//! property records and layer declarations woven between them.
//! Cif21 is a library for reading, writing, and streaming-translating this
//! format, designed as an interchange layer in the same mold as its
//! sibling codecs for binary hierarchical layout data.
//!
//! Layout data moves through three shapes:
//!
//! * A [CifLibrary] tree: cells ([CifCell]) holding elements and instance
//!   placements, one universe per file, split across a physical and an
//!   optional electrical mode section.
//! * An event stream ([read::CifEvent]): the parser's abstract record
//!   sequence, consumed either by the materialization backend (building a
//!   [CifLibrary] through the [data::DatabaseSink] interface) or by the
//!   streaming translation backend (re-emitting records, transformed and
//!   filtered, to a [write::OutputSink]).
//! * Text records on disk, never stored in memory beyond the lexer's
//!   single-byte lookahead.
//!
//! The [digest::CifDigest] layer adds random access on top: after one
//! discovery pass records every symbol's byte offset, any cell can be
//! re-parsed in isolation, with shared sub-masters substituted from an
//! in-memory override table instead of re-reading the stream.
//!
//! ## Usage
//!
//! Reading a library from file:
//!
//! ```skip
//! let (lib, stats) = cif21::read::import_file("sample.cif", Default::default())?;
//! ```
//!
//! Creating and saving a library:
//!
//! ```
//! use cif21::{CifLibrary, CifMode, data::DatabaseSink};
//! let mut lib = CifLibrary::new("mylib");
//! lib.create_cell("mycell", CifMode::Phys).unwrap();
//! cif21::write::to_string(&lib, Default::default()).unwrap();
//! ```
//!

// Internal modules
pub mod data;
pub mod digest;
pub mod error;
pub mod geom;
pub mod props;
pub mod read;
pub mod scale;
pub mod symbols;
pub mod translate;
pub mod write;
pub mod xform;
#[cfg(test)]
mod tests;

// Crate-wide re-exports
pub use data::{
    CifCell, CifInstance, CifLibrary, CifMode, CifReadOptions, CifWriteOptions, LabelStyle,
    LayerStyle, MergePolicy, NameStyle, TranslateOptions,
};
pub use error::{CifError, CifResult, CifWarning};
pub use geom::{BoundBox, CifBox, CifShape, EndStyle, Label, Point, Polygon, Wire};

/// Coordinate integer type, post-scale internal units
pub type Int = i64;

/// Transform-stack depth bound. Exceeding it is a structural error, which
/// doubles as the guard against cyclic instance hierarchies.
pub const MAX_HIERARCHY_DEPTH: usize = 40;
/// Byte cadence of the cooperative progress/cancel check
pub const PROGRESS_CADENCE: u64 = 4096;
/// Default (and minimum legal) file resolution
pub const DEFAULT_RESOLUTION: u32 = 100;
/// Maximum legal file resolution
pub const MAX_RESOLUTION: u32 = 10_000;
