//!
//! # Cif Data Model
//!
//! The mode and dialect enumerations, reader/writer/translator option
//! structs, and the in-memory cell model ([CifLibrary], [CifCell],
//! [CifInstance]) the materialization backend builds. The backend itself
//! only ever talks to the abstract [DatabaseSink] interface; [CifLibrary]
//! is its in-memory implementation, and any persistent cell database can
//! stand in behind the same trait.
//!

// Std-Lib
use std::collections::HashMap;

// Crates.io
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

// Local imports
use crate::error::{CifError, CifResult};
use crate::geom::{BoundBox, CifShape, ShapeTrait};
use crate::props::CifProperty;
use crate::symbols::ArraySpec;
use crate::xform::CifPlacement;
use crate::MAX_HIERARCHY_DEPTH;

new_key_type! {
    /// Keys for [CifCell] entries
    pub struct CellKey;
    /// Keys for [LayerDescriptor] entries
    pub struct LayerKey;
}

/// # Mode Enumeration
///
/// The two independent geometry domains processed by the codec, each with
/// its own symbol table and scale context. A file carries a physical
/// section and, optionally, an electrical one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CifMode {
    /// Physical (mask) geometry
    Phys,
    /// Electrical (schematic) geometry
    Elec,
}
impl Default for CifMode {
    fn default() -> Self {
        CifMode::Phys
    }
}
impl CifMode {
    /// Both modes, in file order
    pub const BOTH: [CifMode; 2] = [CifMode::Phys, CifMode::Elec];
}

/// # Symbol-Name Encoding Style
///
/// How symbol names are spelled on disk; several historical dialects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NameStyle {
    /// `9 name;` extension records
    Standard,
    /// `(9 name);` - the name record wrapped in a comment
    Icarus,
    /// `(name);` - a bare comment holding the name
    Sif,
    /// No name records at all; symbols are number-addressed only
    Indexed,
}
impl Default for NameStyle {
    fn default() -> Self {
        NameStyle::Standard
    }
}

/// # Layer Encoding Style
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LayerStyle {
    /// `L name;`
    ByName,
    /// `L index;`
    ByIndex,
}
impl Default for LayerStyle {
    fn default() -> Self {
        LayerStyle::ByName
    }
}

/// # Label Encoding Style
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LabelStyle {
    /// `94 text x y;` - anchor only
    Plain,
    /// `94 text x y orient [w h];`
    Extended,
    /// `94 "text with blanks" x y orient [w h];`
    Quoted,
}
impl Default for LabelStyle {
    fn default() -> Self {
        LabelStyle::Extended
    }
}

/// # Duplicate-Definition Merge Policy
///
/// Consulted when an incoming definition collides with an existing cell
/// that is neither an unread placeholder (always overwritten) nor a
/// shared sub-master (never overwritten).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MergePolicy {
    /// Replace the existing cell's content
    Overwrite,
    /// Keep the existing cell, discard the incoming definition
    Skip,
    /// Defer to the importer's merge hook, remembering the answer per cell
    /// name so the companion mode is not asked twice
    Ask,
}
impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy::Overwrite
    }
}

/// # Read Options
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
#[builder(setter(into))]
pub struct CifReadOptions {
    /// Caller-supplied overall scale applied on top of the file resolution
    #[builder(default = "1.0")]
    pub external_scale: f64,
    /// Duplicate-definition policy
    #[builder(default)]
    pub merge: MergePolicy,
    /// Symbol-name dialect
    #[builder(default)]
    pub name_style: NameStyle,
    /// Layer dialect
    #[builder(default)]
    pub layer_style: LayerStyle,
    /// Label dialect
    #[builder(default)]
    pub label_style: LabelStyle,
    /// Apply the layer alias table while reading
    #[builder(default)]
    pub allow_layer_mapping: bool,
    /// Reading library (shared sub-master) content: geometry is exempt
    /// from the external-scale term, instance placements are not
    #[builder(default)]
    pub library_mode: bool,
    /// Delete empty cells in the post-pass instead of merely logging them
    #[builder(default)]
    pub prune_empty: bool,
    /// Transform-stack bound, doubling as the hierarchy cycle guard
    #[builder(default = "MAX_HIERARCHY_DEPTH")]
    pub max_depth: usize,
    /// Cell renames applied on read
    #[builder(default)]
    pub cell_aliases: HashMap<String, String>,
    /// Layer renames applied on read, gated by `allow_layer_mapping`
    #[builder(default)]
    pub layer_aliases: HashMap<String, String>,
}
impl Default for CifReadOptions {
    fn default() -> Self {
        Self {
            external_scale: 1.0,
            merge: MergePolicy::default(),
            name_style: NameStyle::default(),
            layer_style: LayerStyle::default(),
            label_style: LabelStyle::default(),
            allow_layer_mapping: false,
            library_mode: false,
            prune_empty: false,
            max_depth: MAX_HIERARCHY_DEPTH,
            cell_aliases: HashMap::new(),
            layer_aliases: HashMap::new(),
        }
    }
}

/// # Write Options
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
#[builder(setter(into))]
pub struct CifWriteOptions {
    /// Symbol-name dialect
    #[builder(default)]
    pub name_style: NameStyle,
    /// Layer dialect
    #[builder(default)]
    pub layer_style: LayerStyle,
    /// Label dialect
    #[builder(default)]
    pub label_style: LabelStyle,
    /// Suppress non-essential extension records (properties, labels)
    #[builder(default)]
    pub strip_for_export: bool,
    /// Resolution declared in the output header
    #[builder(default = "crate::DEFAULT_RESOLUTION")]
    pub resolution: u32,
    /// Cell renames applied on write
    #[builder(default)]
    pub cell_aliases: HashMap<String, String>,
    /// Layer renames applied on write
    #[builder(default)]
    pub layer_aliases: HashMap<String, String>,
}
impl Default for CifWriteOptions {
    fn default() -> Self {
        Self {
            name_style: NameStyle::default(),
            layer_style: LayerStyle::default(),
            label_style: LabelStyle::default(),
            strip_for_export: false,
            resolution: crate::DEFAULT_RESOLUTION,
            cell_aliases: HashMap::new(),
            layer_aliases: HashMap::new(),
        }
    }
}

/// # Streaming-Translation Options
#[derive(Debug, Clone, Default, Builder, Serialize, Deserialize, PartialEq)]
#[builder(setter(into))]
pub struct TranslateOptions {
    /// Area-of-interest window: geometry disjoint from it is dropped
    #[builder(default, setter(strip_option))]
    pub window: Option<BoundBox>,
    /// Clip partially-overlapping geometry to the window
    #[builder(default)]
    pub clip: bool,
    /// Flatten hierarchy: replay instance bodies instead of emitting
    /// instance records
    #[builder(default)]
    pub flatten: bool,
}

/// # Layer Descriptor
///
/// Layer identity is (name, mode) in the default dialect, or the numeric
/// index in index-addressed dialects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LayerDescriptor {
    /// Layer name
    pub name: String,
    /// Optional numeric index
    pub index: Option<u16>,
    /// Owning mode
    pub mode: CifMode,
}
impl LayerDescriptor {
    /// Create a named layer in `mode`
    pub fn named(name: impl Into<String>, mode: CifMode) -> Self {
        Self {
            name: name.into(),
            index: None,
            mode,
        }
    }
    /// Create an index-addressed layer in `mode`, named after its index
    pub fn indexed(index: u16, mode: CifMode) -> Self {
        Self {
            name: format!("L{}", index),
            index: Some(index),
            mode,
        }
    }
}

/// # Layer Set & Manager
///
/// Keeps the active layers and indexes them by (mode, name) and (mode, index).
#[derive(Debug, Clone, Default)]
pub struct CifLayers {
    slots: SlotMap<LayerKey, LayerDescriptor>,
    by_name: HashMap<(CifMode, String), LayerKey>,
    by_index: HashMap<(CifMode, u16), LayerKey>,
}
impl CifLayers {
    /// Find or insert the layer described by `desc`
    pub fn ensure(&mut self, desc: &LayerDescriptor) -> LayerKey {
        if let Some(key) = self.by_name.get(&(desc.mode, desc.name.clone())) {
            return *key;
        }
        if let Some(index) = desc.index {
            if let Some(key) = self.by_index.get(&(desc.mode, index)) {
                return *key;
            }
        }
        let key = self.slots.insert(desc.clone());
        self.by_name.insert((desc.mode, desc.name.clone()), key);
        if let Some(index) = desc.index {
            self.by_index.insert((desc.mode, index), key);
        }
        key
    }
    /// Get the layer at `key`
    pub fn get(&self, key: LayerKey) -> Option<&LayerDescriptor> {
        self.slots.get(key)
    }
    /// Look up a layer by name
    pub fn find_name(&self, name: &str, mode: CifMode) -> Option<LayerKey> {
        self.by_name.get(&(mode, name.to_string())).copied()
    }
    /// Look up a layer by index
    pub fn find_index(&self, index: u16, mode: CifMode) -> Option<LayerKey> {
        self.by_index.get(&(mode, index)).copied()
    }
    /// Number of layers
    pub fn len(&self) -> usize {
        self.slots.len()
    }
    /// Boolean indication of an empty layer set
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// # Cell Element
///
/// One geometric primitive with its layer binding and attached properties.
/// The layer rides along by value, keeping cells self-contained: an
/// override cell handed to the digest layer carries everything it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CifElement {
    /// Layer binding
    pub layer: LayerDescriptor,
    /// Shape
    pub shape: CifShape,
    /// Attached properties
    pub properties: Vec<CifProperty>,
}

/// # Cell Instance
///
/// A placement of another cell, addressed by name: resolution of
/// as-yet-unseen targets is deferred to the post-pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CifInstance {
    /// Target cell name
    pub cell_name: String,
    /// Placement
    pub placement: CifPlacement,
    /// Optional rectangular array
    pub array: Option<ArraySpec>,
    /// Attached properties
    pub properties: Vec<CifProperty>,
}

/// # Cell Definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CifCell {
    /// Cell Name
    pub name: String,
    /// Owning mode
    pub mode: CifMode,
    /// Primitive elements
    pub elements: Vec<CifElement>,
    /// Cell instances
    pub instances: Vec<CifInstance>,
    /// Cell-level properties
    pub properties: Vec<CifProperty>,
    /// Cached bounding box, filled by the post-pass
    pub bbox: Option<BoundBox>,
    /// Shared sub-master (standard via, evaluated parameterized cell):
    /// never overwritten by incoming definitions
    pub submaster: bool,
    /// Placeholder created to satisfy a forward reference, content unread:
    /// always overwritten by an incoming definition
    pub unread: bool,
}
impl CifCell {
    /// Create a new, empty cell
    pub fn new(name: impl Into<String>, mode: CifMode) -> Self {
        Self {
            name: name.into(),
            mode,
            ..Default::default()
        }
    }
    /// Boolean indication of a cell with no content at all
    pub fn is_content_empty(&self) -> bool {
        self.elements.is_empty() && self.instances.is_empty()
    }
}

/// Status summary consulted by the duplicate-definition policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellStatus {
    /// Forward-reference placeholder, content never read
    pub unread: bool,
    /// Shared sub-master
    pub submaster: bool,
}

/// # Database Entity Handle
///
/// Returned by [DatabaseSink] creation calls; the handle properties
/// attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityHandle {
    Cell(CellKey),
    Element(CellKey, usize),
    Instance(CellKey, usize),
}

/// # Database Sink
///
/// The abstract cell-database interface the materialization backend
/// drives. The codec never touches persistent storage itself.
pub trait DatabaseSink {
    /// Look up an existing cell by name and mode
    fn find_cell(&self, name: &str, mode: CifMode) -> Option<CellKey>;
    /// Status of an existing cell, for the duplicate-definition policy
    fn cell_status(&self, key: CellKey) -> CellStatus;
    /// Create (or reset) the cell `name`, returning its handle
    fn create_cell(&mut self, name: &str, mode: CifMode) -> CifResult<CellKey>;
    /// Create an unread placeholder cell satisfying a forward reference
    fn create_placeholder(&mut self, name: &str, mode: CifMode) -> CifResult<CellKey>;
    /// Find or create the layer described by `desc`
    fn ensure_layer(&mut self, desc: &LayerDescriptor) -> CifResult<LayerKey>;
    /// Append a primitive element to `cell`
    fn add_element(&mut self, cell: CellKey, element: CifElement) -> CifResult<EntityHandle>;
    /// Append an instance to `cell`
    fn add_instance(&mut self, cell: CellKey, inst: CifInstance) -> CifResult<EntityHandle>;
    /// Attach `props` to the entity at `target`
    fn attach_properties(
        &mut self,
        target: EntityHandle,
        props: Vec<CifProperty>,
    ) -> CifResult<()>;
    /// Finalize `cell`, recording its computed bounding box
    fn finalize_cell(&mut self, key: CellKey, bbox: Option<BoundBox>) -> CifResult<()>;
    /// Boolean indication of a cell with no elements and no instances
    fn cell_is_empty(&self, key: CellKey) -> bool;
    /// Remove `cell` outright, for the empty-cell pruning policy
    fn remove_cell(&mut self, key: CellKey) -> CifResult<()>;
}

/// # In-Memory Cell Library
///
/// The default [DatabaseSink] implementation, and the value the
/// convenience read entry-points return.
#[derive(Debug, Clone, Default)]
pub struct CifLibrary {
    /// Library Name
    pub name: String,
    /// Layer definitions
    pub layers: CifLayers,
    /// Cell definitions
    pub cells: SlotMap<CellKey, CifCell>,
    by_name: HashMap<(CifMode, String), CellKey>,
}
impl CifLibrary {
    /// Create a new and empty library
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
    /// Get a reference to the cell named `name` in `mode`
    pub fn cell(&self, name: &str, mode: CifMode) -> Option<&CifCell> {
        let key = self.find_cell(name, mode)?;
        self.cells.get(key)
    }
    /// Get a mutable reference to the cell named `name` in `mode`
    pub fn cell_mut(&mut self, name: &str, mode: CifMode) -> Option<&mut CifCell> {
        let key = self.find_cell(name, mode)?;
        self.cells.get_mut(key)
    }
    /// Add `cell` wholesale, replacing any same-named entry's content
    pub fn add_cell(&mut self, cell: CifCell) -> CellKey {
        if let Some(key) = self.find_cell(&cell.name, cell.mode) {
            self.cells[key] = cell;
            return key;
        }
        let id = (cell.mode, cell.name.clone());
        let key = self.cells.insert(cell);
        self.by_name.insert(id, key);
        key
    }
    /// Iterate the cells of `mode` in insertion order
    pub fn cells_of(&self, mode: CifMode) -> impl Iterator<Item = &CifCell> {
        self.cells.values().filter(move |c| c.mode == mode)
    }
    /// Compute and cache every cell's bounding box, instances included.
    /// Runs as a post-pass once all definitions are in.
    pub fn finalize_bboxes(&mut self) {
        let keys: Vec<CellKey> = self.cells.keys().collect();
        for key in keys {
            self.bbox_of(key, 0);
        }
    }
    /// Recursively compute the bbox of `key`, memoized in the cell.
    /// Depth-bounded as a backstop against self-referential hierarchies.
    fn bbox_of(&mut self, key: CellKey, depth: usize) -> BoundBox {
        if depth > MAX_HIERARCHY_DEPTH {
            return BoundBox::empty();
        }
        if let Some(bb) = self.cells.get(key).and_then(|c| c.bbox) {
            return bb;
        }
        let (elems_bb, insts) = match self.cells.get(key) {
            None => return BoundBox::empty(),
            Some(cell) => {
                let mut bb = BoundBox::empty();
                for elem in cell.elements.iter() {
                    bb = bb.union(&elem.shape.shape_bbox());
                }
                let insts: Vec<(String, CifPlacement, Option<ArraySpec>)> = cell
                    .instances
                    .iter()
                    .map(|i| (i.cell_name.clone(), i.placement.clone(), i.array))
                    .collect();
                (bb, insts)
            }
        };
        let mode = self.cells[key].mode;
        let mut bb = elems_bb;
        for (name, placement, array) in insts {
            let target_bb = match self.find_cell(&name, mode) {
                Some(target) => self.bbox_of(target, depth + 1),
                None => BoundBox::empty(),
            };
            if target_bb.is_empty() {
                continue;
            }
            let t = placement.to_transform();
            let placed = crate::geom::CifShape::transformed(
                &crate::geom::CifShape::CifBox(crate::geom::CifBox::new(
                    target_bb.p0,
                    target_bb.p1,
                )),
                &t,
            )
            .shape_bbox();
            let mut whole = placed;
            if let Some(a) = array {
                // The array's extent is the first placement unioned with the last
                let shift = crate::geom::Point::new(
                    a.px * (a.nx - 1).max(0),
                    a.py * (a.ny - 1).max(0),
                );
                let mut last = placed;
                last.p0 = last.p0.shift(&shift);
                last.p1 = last.p1.shift(&shift);
                whole = whole.union(&last);
            }
            bb = bb.union(&whole);
        }
        if let Some(cell) = self.cells.get_mut(key) {
            cell.bbox = Some(bb);
        }
        bb
    }
}
impl DatabaseSink for CifLibrary {
    fn find_cell(&self, name: &str, mode: CifMode) -> Option<CellKey> {
        self.by_name.get(&(mode, name.to_string())).copied()
    }
    fn cell_status(&self, key: CellKey) -> CellStatus {
        match self.cells.get(key) {
            Some(cell) => CellStatus {
                unread: cell.unread,
                submaster: cell.submaster,
            },
            None => CellStatus::default(),
        }
    }
    fn create_cell(&mut self, name: &str, mode: CifMode) -> CifResult<CellKey> {
        if let Some(key) = self.find_cell(name, mode) {
            // Reset content, preserving identity
            let cell = &mut self.cells[key];
            cell.elements.clear();
            cell.instances.clear();
            cell.properties.clear();
            cell.bbox = None;
            cell.unread = false;
            return Ok(key);
        }
        Ok(self.add_cell(CifCell::new(name, mode)))
    }
    fn create_placeholder(&mut self, name: &str, mode: CifMode) -> CifResult<CellKey> {
        if let Some(key) = self.find_cell(name, mode) {
            return Ok(key);
        }
        let mut cell = CifCell::new(name, mode);
        cell.unread = true;
        Ok(self.add_cell(cell))
    }
    fn ensure_layer(&mut self, desc: &LayerDescriptor) -> CifResult<LayerKey> {
        Ok(self.layers.ensure(desc))
    }
    fn add_element(&mut self, cell: CellKey, element: CifElement) -> CifResult<EntityHandle> {
        let c = self
            .cells
            .get_mut(cell)
            .ok_or_else(|| CifError::msg("element added to a dangling cell handle"))?;
        c.elements.push(element);
        Ok(EntityHandle::Element(cell, c.elements.len() - 1))
    }
    fn add_instance(&mut self, cell: CellKey, inst: CifInstance) -> CifResult<EntityHandle> {
        let c = self
            .cells
            .get_mut(cell)
            .ok_or_else(|| CifError::msg("instance added to a dangling cell handle"))?;
        c.instances.push(inst);
        Ok(EntityHandle::Instance(cell, c.instances.len() - 1))
    }
    fn attach_properties(
        &mut self,
        target: EntityHandle,
        props: Vec<CifProperty>,
    ) -> CifResult<()> {
        if props.is_empty() {
            return Ok(());
        }
        match target {
            EntityHandle::Cell(key) => {
                let c = self
                    .cells
                    .get_mut(key)
                    .ok_or_else(|| CifError::msg("properties attached to a dangling cell"))?;
                c.properties.extend(props);
            }
            EntityHandle::Element(key, idx) => {
                let c = self
                    .cells
                    .get_mut(key)
                    .ok_or_else(|| CifError::msg("properties attached to a dangling cell"))?;
                let e = c
                    .elements
                    .get_mut(idx)
                    .ok_or_else(|| CifError::msg("properties attached to a missing element"))?;
                e.properties.extend(props);
            }
            EntityHandle::Instance(key, idx) => {
                let c = self
                    .cells
                    .get_mut(key)
                    .ok_or_else(|| CifError::msg("properties attached to a dangling cell"))?;
                let i = c
                    .instances
                    .get_mut(idx)
                    .ok_or_else(|| CifError::msg("properties attached to a missing instance"))?;
                i.properties.extend(props);
            }
        }
        Ok(())
    }
    fn finalize_cell(&mut self, key: CellKey, bbox: Option<BoundBox>) -> CifResult<()> {
        let c = self
            .cells
            .get_mut(key)
            .ok_or_else(|| CifError::msg("finalize of a dangling cell handle"))?;
        c.bbox = bbox;
        Ok(())
    }
    fn cell_is_empty(&self, key: CellKey) -> bool {
        self.cells
            .get(key)
            .map(|c| c.is_content_empty())
            .unwrap_or(false)
    }
    fn remove_cell(&mut self, key: CellKey) -> CifResult<()> {
        if let Some(cell) = self.cells.remove(key) {
            self.by_name.remove(&(cell.mode, cell.name));
        }
        Ok(())
    }
}

// Builder failures surface as plain message errors
impl From<CifReadOptionsBuilderError> for CifError {
    fn from(e: CifReadOptionsBuilderError) -> Self {
        CifError::Str(format!("{}", e))
    }
}
impl From<CifWriteOptionsBuilderError> for CifError {
    fn from(e: CifWriteOptionsBuilderError) -> Self {
        CifError::Str(format!("{}", e))
    }
}
impl From<TranslateOptionsBuilderError> for CifError {
    fn from(e: TranslateOptionsBuilderError) -> Self {
        CifError::Str(format!("{}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{CifBox, Point};

    #[test]
    fn library_cell_lifecycle() {
        let mut lib = CifLibrary::new("testlib");
        let key = lib.create_cell("inv", CifMode::Phys).unwrap();
        let layer = LayerDescriptor::named("METAL1", CifMode::Phys);
        lib.ensure_layer(&layer).unwrap();
        lib.add_element(
            key,
            CifElement {
                layer,
                shape: CifShape::CifBox(CifBox::new(Point::new(0, 0), Point::new(10, 10))),
                properties: Vec::new(),
            },
        )
        .unwrap();
        assert_eq!(lib.cell("inv", CifMode::Phys).unwrap().elements.len(), 1);
        assert!(lib.cell("inv", CifMode::Elec).is_none());
        // Re-creating resets content
        lib.create_cell("inv", CifMode::Phys).unwrap();
        assert!(lib.cell("inv", CifMode::Phys).unwrap().elements.is_empty());
    }
    #[test]
    fn bbox_finalization_spans_instances() {
        let mut lib = CifLibrary::new("testlib");
        let leaf = lib.create_cell("leaf", CifMode::Phys).unwrap();
        let layer = LayerDescriptor::named("M1", CifMode::Phys);
        lib.ensure_layer(&layer).unwrap();
        lib.add_element(
            leaf,
            CifElement {
                layer,
                shape: CifShape::CifBox(CifBox::new(Point::new(0, 0), Point::new(10, 10))),
                properties: Vec::new(),
            },
        )
        .unwrap();
        let top = lib.create_cell("top", CifMode::Phys).unwrap();
        lib.add_instance(
            top,
            CifInstance {
                cell_name: "leaf".to_string(),
                placement: CifPlacement::at(Point::new(100, 100)),
                array: Some(ArraySpec {
                    nx: 3,
                    ny: 1,
                    px: 50,
                    py: 0,
                }),
                properties: Vec::new(),
            },
        )
        .unwrap();
        lib.finalize_bboxes();
        let bb = lib.cell("top", CifMode::Phys).unwrap().bbox.unwrap();
        assert_eq!(bb.p0, Point::new(100, 100));
        assert_eq!(bb.p1, Point::new(210, 110));
    }
    #[test]
    fn options_builders() {
        let opts = CifReadOptionsBuilder::default()
            .external_scale(0.5)
            .merge(MergePolicy::Skip)
            .build()
            .unwrap();
        assert_eq!(opts.external_scale, 0.5);
        assert_eq!(opts.max_depth, MAX_HIERARCHY_DEPTH);
        let wopts = CifWriteOptionsBuilder::default()
            .strip_for_export(true)
            .build()
            .unwrap();
        assert!(wopts.strip_for_export);
        assert_eq!(wopts.resolution, crate::DEFAULT_RESOLUTION);
    }
}
