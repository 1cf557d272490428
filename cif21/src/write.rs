//!
//! # Cif Writing Module
//!
//! The [OutputSink] trait is the abstract serialization interface the
//! Streaming Translation Backend produces against; [CifWriter] is its
//! text-format implementation, honoring the dialect options. Library-level
//! entry points walk a [CifLibrary] and drive the same sink methods.
//!

// Std-Lib
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

// Local imports
use crate::data::{
    CifLibrary, CifMode, CifWriteOptions, LabelStyle, LayerDescriptor, LayerStyle, NameStyle,
};
use crate::error::CifResult;
use crate::geom::{CifBox, CifShape, EndStyle, Label, Point, Polygon, Wire};
use crate::props::CifProperty;
use crate::symbols::ArraySpec;
use crate::xform::CifPlacement;
use crate::{Int, DEFAULT_RESOLUTION};

/// Write `lib` to file `fname`
pub fn save(lib: &CifLibrary, fname: impl AsRef<Path>, opts: CifWriteOptions) -> CifResult<()> {
    let mut f = std::fs::File::create(fname)?;
    CifWriter::new(&mut f, opts).write_library(lib)?;
    f.flush()?;
    Ok(())
}
/// Write `lib` to a text-format [String]
pub fn to_string(lib: &CifLibrary, opts: CifWriteOptions) -> CifResult<String> {
    let mut buf = Vec::new();
    CifWriter::new(&mut buf, opts).write_library(lib)?;
    Ok(String::from_utf8_lossy(&buf).to_string())
}

/// # Output Sink
///
/// The abstract serializer interface. The Streaming Translation Backend
/// is a pure producer against this trait; [CifWriter] implements it for
/// the text format, and any sibling hierarchical-format serializer can
/// stand in.
pub trait OutputSink {
    /// Begin a mode section
    fn write_header(&mut self, mode: CifMode) -> CifResult<()>;
    /// Open a symbol definition
    fn write_symbol_begin(
        &mut self,
        number: u32,
        name: Option<&str>,
        ratio: (Int, Int),
    ) -> CifResult<()>;
    /// Close the open symbol definition
    fn write_symbol_end(&mut self) -> CifResult<()>;
    /// Select the current layer
    fn write_layer(&mut self, layer: &LayerDescriptor) -> CifResult<()>;
    /// Emit a box primitive
    fn write_box(&mut self, b: &CifBox) -> CifResult<()>;
    /// Emit a polygon primitive
    fn write_polygon(&mut self, p: &Polygon) -> CifResult<()>;
    /// Emit a wire primitive
    fn write_wire(&mut self, w: &Wire) -> CifResult<()>;
    /// Emit a label
    fn write_label(&mut self, l: &Label) -> CifResult<()>;
    /// Emit an instance reference
    fn write_instance(
        &mut self,
        target_number: u32,
        target_name: Option<&str>,
        placement: &CifPlacement,
        array: Option<&ArraySpec>,
    ) -> CifResult<()>;
    /// Emit a property record
    fn write_property(&mut self, prop: &CifProperty) -> CifResult<()>;
    /// End the current mode section
    fn write_end(&mut self) -> CifResult<()>;
    /// Dispatch a [CifShape] to its per-variant method
    fn write_shape(&mut self, shape: &CifShape) -> CifResult<()> {
        match shape {
            CifShape::CifBox(b) => self.write_box(b),
            CifShape::Polygon(p) => self.write_polygon(p),
            CifShape::Wire(w) => self.write_wire(w),
            CifShape::Label(l) => self.write_label(l),
        }
    }
}

/// # Cif Writing Helper
pub struct CifWriter<'wr> {
    /// Write Destination
    dest: Box<dyn Write + 'wr>,
    /// Output options
    opts: CifWriteOptions,
    /// Symbol numbers assigned per (mode, name)
    numbers: HashMap<(CifMode, String), u32>,
    next_number: u32,
    /// Last layer written, to suppress repeats
    last_layer: Option<String>,
}
impl<'wr> CifWriter<'wr> {
    /// Create a new [CifWriter] to destination `dest`.
    /// Destination is boxed internally.
    pub fn new(dest: impl Write + 'wr, opts: CifWriteOptions) -> Self {
        Self {
            dest: Box::new(dest),
            opts,
            numbers: HashMap::new(),
            next_number: 1,
            last_layer: None,
        }
    }
    /// Scale an internal-unit coordinate to the declared output resolution
    fn wscale(&self, x: Int) -> Int {
        if self.opts.resolution == DEFAULT_RESOLUTION {
            return x;
        }
        (x as f64 * self.opts.resolution as f64 / DEFAULT_RESOLUTION as f64).round() as Int
    }
    /// The symbol number for `name` in `mode`, assigning the next free one on first use
    fn number_for(&mut self, mode: CifMode, name: &str) -> u32 {
        if let Some(n) = self.numbers.get(&(mode, name.to_string())) {
            return *n;
        }
        let n = self.next_number;
        self.next_number += 1;
        self.numbers.insert((mode, name.to_string()), n);
        n
    }
    /// Apply the cell alias table
    fn alias_cell<'n>(&'n self, name: &'n str) -> &'n str {
        self.opts
            .cell_aliases
            .get(name)
            .map(|s| s.as_str())
            .unwrap_or(name)
    }
    /// Escape a payload for an extension record: literal `;` survives as `\;`
    fn escape(text: &str) -> String {
        text.replace('\\', "\\\\").replace(';', "\\;")
    }
    /// Write the whole of `lib`: the physical section, then the electrical
    /// section when it has content.
    pub fn write_library(&mut self, lib: &CifLibrary) -> CifResult<()> {
        for mode in CifMode::BOTH {
            let cells: Vec<_> = lib.cells_of(mode).collect();
            if cells.is_empty() && mode == CifMode::Elec {
                continue;
            }
            self.write_header(mode)?;
            for cell in cells {
                if cell.unread {
                    // Placeholders have no content to serialize
                    continue;
                }
                let name = self.alias_cell(&cell.name).to_string();
                let number = self.number_for(mode, &name);
                self.write_symbol_begin(number, Some(&name), (1, 1))?;
                for element in cell.elements.iter() {
                    self.write_layer(&element.layer)?;
                    for prop in element.properties.iter() {
                        self.write_property(prop)?;
                    }
                    self.write_shape(&element.shape)?;
                }
                for inst in cell.instances.iter() {
                    for prop in inst.properties.iter() {
                        self.write_property(prop)?;
                    }
                    let target = self.alias_cell(&inst.cell_name).to_string();
                    let target_number = self.number_for(mode, &target);
                    self.write_instance(
                        target_number,
                        Some(&target),
                        &inst.placement,
                        inst.array.as_ref(),
                    )?;
                }
                for prop in cell.properties.iter() {
                    self.write_property(prop)?;
                }
                self.write_symbol_end()?;
            }
            self.write_end()?;
        }
        Ok(())
    }
}
impl<'wr> OutputSink for CifWriter<'wr> {
    fn write_header(&mut self, mode: CifMode) -> CifResult<()> {
        self.last_layer = None;
        let banner = match mode {
            CifMode::Phys => "physical",
            CifMode::Elec => "electrical",
        };
        writeln!(self.dest, "( {} cells );", banner)?;
        writeln!(self.dest, "( RESOLUTION {} );", self.opts.resolution)?;
        Ok(())
    }
    fn write_symbol_begin(
        &mut self,
        number: u32,
        name: Option<&str>,
        ratio: (Int, Int),
    ) -> CifResult<()> {
        if ratio == (1, 1) {
            writeln!(self.dest, "DS {};", number)?;
        } else {
            writeln!(self.dest, "DS {} {} {};", number, ratio.0, ratio.1)?;
        }
        if let Some(name) = name {
            match self.opts.name_style {
                NameStyle::Standard => writeln!(self.dest, "9 {};", Self::escape(name))?,
                NameStyle::Icarus => writeln!(self.dest, "(9 {});", name)?,
                NameStyle::Sif => writeln!(self.dest, "({});", name)?,
                NameStyle::Indexed => (),
            }
        }
        // Layer state does not carry into a fresh definition on write
        self.last_layer = None;
        Ok(())
    }
    fn write_symbol_end(&mut self) -> CifResult<()> {
        writeln!(self.dest, "DF;")?;
        Ok(())
    }
    fn write_layer(&mut self, layer: &LayerDescriptor) -> CifResult<()> {
        let spelled = match (self.opts.layer_style, layer.index) {
            (LayerStyle::ByIndex, Some(index)) => index.to_string(),
            _ => {
                let name = layer.name.as_str();
                self.opts
                    .layer_aliases
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| name.to_string())
            }
        };
        if self.last_layer.as_deref() == Some(spelled.as_str()) {
            return Ok(());
        }
        writeln!(self.dest, "L {};", spelled)?;
        self.last_layer = Some(spelled);
        Ok(())
    }
    fn write_box(&mut self, b: &CifBox) -> CifResult<()> {
        let (w, h) = b.size();
        let c = Point {
            x: b.p0.x + w / 2,
            y: b.p0.y + h / 2,
        };
        writeln!(
            self.dest,
            "B {} {} {} {};",
            self.wscale(w),
            self.wscale(h),
            self.wscale(c.x),
            self.wscale(c.y)
        )?;
        Ok(())
    }
    fn write_polygon(&mut self, p: &Polygon) -> CifResult<()> {
        write!(self.dest, "P")?;
        // The closing point is implied on disk
        for pt in p.points.iter().take(p.points.len().saturating_sub(1)) {
            write!(self.dest, " {} {}", self.wscale(pt.x), self.wscale(pt.y))?;
        }
        writeln!(self.dest, ";")?;
        Ok(())
    }
    fn write_wire(&mut self, w: &Wire) -> CifResult<()> {
        // The default round style is spelled bare; others carry their digit
        match w.style {
            EndStyle::Round => write!(self.dest, "W {}", self.wscale(w.width))?,
            style => write!(self.dest, "W{} {}", style as u8, self.wscale(w.width))?,
        }
        for pt in w.points.iter() {
            write!(self.dest, " {} {}", self.wscale(pt.x), self.wscale(pt.y))?;
        }
        writeln!(self.dest, ";")?;
        Ok(())
    }
    fn write_label(&mut self, l: &Label) -> CifResult<()> {
        if self.opts.strip_for_export {
            return Ok(());
        }
        let text: String = match self.opts.label_style {
            LabelStyle::Quoted => format!("\"{}\"", l.text),
            _ => l.text.clone(),
        };
        write!(
            self.dest,
            "94 {} {} {}",
            text,
            self.wscale(l.loc.x),
            self.wscale(l.loc.y)
        )?;
        if self.opts.label_style != LabelStyle::Plain {
            if l.orient != 0 || l.width.is_some() {
                write!(self.dest, " {}", l.orient)?;
            }
            if let (Some(w), Some(h)) = (l.width, l.height) {
                write!(self.dest, " {} {}", self.wscale(w), self.wscale(h))?;
            }
        }
        writeln!(self.dest, ";")?;
        Ok(())
    }
    fn write_instance(
        &mut self,
        target_number: u32,
        _target_name: Option<&str>,
        placement: &CifPlacement,
        array: Option<&ArraySpec>,
    ) -> CifResult<()> {
        write!(self.dest, "C {}", target_number)?;
        // Canonical token order mirrors the placement decomposition:
        // mirror, rotate, magnify, translate.
        if placement.mirror_y {
            write!(self.dest, " MY")?;
        }
        if placement.axis != Point::new(1, 0) {
            write!(self.dest, " R {} {}", placement.axis.x, placement.axis.y)?;
        }
        if placement.mag != (1, 1) {
            write!(self.dest, " S {} {}", placement.mag.0, placement.mag.1)?;
        }
        if placement.origin != Point::default() {
            write!(
                self.dest,
                " T {} {}",
                self.wscale(placement.origin.x),
                self.wscale(placement.origin.y)
            )?;
        }
        if let Some(a) = array {
            write!(
                self.dest,
                " A {} {} {} {}",
                a.nx,
                a.ny,
                self.wscale(a.px),
                self.wscale(a.py)
            )?;
        }
        writeln!(self.dest, ";")?;
        Ok(())
    }
    fn write_property(&mut self, prop: &CifProperty) -> CifResult<()> {
        if self.opts.strip_for_export {
            return Ok(());
        }
        writeln!(self.dest, "5 {} {};", prop.id, Self::escape(&prop.payload))?;
        Ok(())
    }
    fn write_end(&mut self) -> CifResult<()> {
        writeln!(self.dest, "E")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CifElement, CifInstance};
    use crate::geom::Point;

    fn library_with_box() -> CifLibrary {
        let mut lib = CifLibrary::new("wtest");
        use crate::data::DatabaseSink;
        let key = lib.create_cell("unit", CifMode::Phys).unwrap();
        let layer = LayerDescriptor::named("M1", CifMode::Phys);
        lib.ensure_layer(&layer).unwrap();
        lib.add_element(
            key,
            CifElement {
                layer,
                shape: CifShape::CifBox(CifBox::new(Point::new(0, 0), Point::new(10, 20))),
                properties: Vec::new(),
            },
        )
        .unwrap();
        let top = lib.create_cell("top", CifMode::Phys).unwrap();
        lib.add_instance(
            top,
            CifInstance {
                cell_name: "unit".to_string(),
                placement: CifPlacement::at(Point::new(100, 0)),
                array: None,
                properties: Vec::new(),
            },
        )
        .unwrap();
        lib
    }
    #[test]
    fn it_writes_records() {
        let lib = library_with_box();
        let text = to_string(&lib, CifWriteOptions::default()).unwrap();
        assert!(text.contains("DS 1;"));
        assert!(text.contains("9 unit;"));
        assert!(text.contains("L M1;"));
        assert!(text.contains("B 10 20 5 10;"));
        assert!(text.contains("C 1 T 100 0;"));
        assert!(text.trim_end().ends_with('E'));
    }
    #[test]
    fn strip_for_export_drops_extensions() {
        let mut lib = library_with_box();
        lib.cell_mut("unit", CifMode::Phys)
            .unwrap()
            .properties
            .push(CifProperty::new(7, "0 0 10 20"));
        let opts = CifWriteOptions {
            strip_for_export: true,
            ..Default::default()
        };
        let text = to_string(&lib, opts).unwrap();
        assert!(!text.contains("5 7"));
        // Name records are essential and survive
        assert!(text.contains("9 unit;"));
    }
    #[test]
    fn indexed_name_style_omits_names() {
        let lib = library_with_box();
        let opts = CifWriteOptions {
            name_style: NameStyle::Indexed,
            ..Default::default()
        };
        let text = to_string(&lib, opts).unwrap();
        assert!(!text.contains("9 unit"));
        assert!(text.contains("DS 1;"));
    }
    #[test]
    fn resolution_rescales_output() {
        let lib = library_with_box();
        let opts = CifWriteOptions {
            resolution: 1000,
            ..Default::default()
        };
        let text = to_string(&lib, opts).unwrap();
        assert!(text.contains("( RESOLUTION 1000 );"));
        assert!(text.contains("B 100 200 50 100;"));
    }
}
