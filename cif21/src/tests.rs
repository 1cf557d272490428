//!
//! # Cif21 Integration Tests
//!
//! End-to-end scenarios across the parser, both backends, the digest
//! layer, and the writer.
//!

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::data::{CifCell, CifElement, CifInstance, DatabaseSink, LayerDescriptor};
use crate::digest::{CifDigest, DigestBody};
use crate::read::{import_str, CifImporter, CifParser};
use crate::symbols::ArraySpec;
use crate::translate::CifTranslator;
use crate::write::{to_string, CifWriter};
use crate::xform::CifPlacement;
use crate::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
fn cursor(src: &str) -> Cursor<Vec<u8>> {
    Cursor::new(src.as_bytes().to_vec())
}

const SIMPLE: &str = r#"( sample );
( RESOLUTION 100 );
DS 1;
9 unit;
L M1;
5 7 0 0 10 20;
B 10 20 5 10;
DF;
DS 2;
9 top;
C 1 T 100 0;
5 99 just a note;
DF;
E
"#;

#[test]
fn it_reads() -> CifResult<()> {
    init_logging();
    let (lib, stats) = import_str(SIMPLE, CifReadOptions::default())?;
    assert_eq!(stats.symbols, 2);
    assert_eq!(stats.shapes, 1);
    assert_eq!(stats.instances, 1);
    assert_eq!(stats.warnings, 0);

    let unit = lib.cell("unit", CifMode::Phys).expect("unit cell");
    assert_eq!(unit.elements.len(), 1);
    assert_eq!(unit.elements[0].layer.name, "M1");
    assert_eq!(
        unit.elements[0].shape,
        CifShape::CifBox(CifBox::new(Point::new(0, 0), Point::new(10, 20)))
    );
    // The property queued before the box landed on the box
    assert_eq!(unit.elements[0].properties.len(), 1);
    assert_eq!(unit.elements[0].properties[0].id, 7);

    let top = lib.cell("top", CifMode::Phys).expect("top cell");
    assert_eq!(top.instances.len(), 1);
    assert_eq!(top.instances[0].cell_name, "unit");
    assert_eq!(top.instances[0].placement.origin, Point::new(100, 0));
    // The trailing property attached to the cell itself
    assert_eq!(top.properties.len(), 1);
    assert_eq!(top.properties[0].payload, "just a note");

    // Bounding boxes were finalized, instances included
    assert_eq!(
        top.bbox,
        Some(BoundBox::from_points(
            Point::new(100, 0),
            Point::new(110, 20)
        ))
    );
    Ok(())
}

#[test]
fn it_round_trips() -> CifResult<()> {
    init_logging();
    let mut lib = CifLibrary::new("rt");
    let layer = LayerDescriptor::named("M1", CifMode::Phys);
    lib.ensure_layer(&layer)?;
    let leaf = lib.create_cell("leaf", CifMode::Phys)?;
    lib.add_element(
        leaf,
        CifElement {
            layer: layer.clone(),
            shape: CifShape::CifBox(CifBox::new(Point::new(-4, -4), Point::new(4, 4))),
            properties: vec![crate::props::CifProperty::new(7, "-4 -4 4 4")],
        },
    )?;
    lib.add_element(
        leaf,
        CifElement {
            layer: layer.clone(),
            shape: CifShape::Polygon(Polygon::new(vec![
                Point::new(0, 0),
                Point::new(20, 0),
                Point::new(0, 20),
            ])),
            properties: Vec::new(),
        },
    )?;
    lib.add_element(
        leaf,
        CifElement {
            layer: layer.clone(),
            shape: CifShape::Wire(Wire::new(
                4,
                EndStyle::Flush,
                vec![Point::new(0, 0), Point::new(40, 0), Point::new(40, 40)],
            )),
            properties: Vec::new(),
        },
    )?;
    lib.add_element(
        leaf,
        CifElement {
            layer,
            shape: CifShape::Label(Label::new("out", Point::new(7, 9))),
            properties: Vec::new(),
        },
    )?;
    let top = lib.create_cell("top", CifMode::Phys)?;
    lib.add_instance(
        top,
        CifInstance {
            cell_name: "leaf".to_string(),
            placement: CifPlacement {
                mirror_y: true,
                axis: Point::new(0, 1),
                mag: (2, 1),
                origin: Point::new(300, -50),
            },
            array: Some(ArraySpec {
                nx: 2,
                ny: 3,
                px: 100,
                py: 120,
            }),
            properties: Vec::new(),
        },
    )?;
    lib.finalize_bboxes();

    let text = to_string(&lib, CifWriteOptions::default())?;
    let (back, stats) = import_str(&text, CifReadOptions::default())?;
    assert_eq!(stats.symbols, 2);
    assert_eq!(stats.warnings, 0);
    let a = lib.cell("leaf", CifMode::Phys).expect("leaf");
    let b = back.cell("leaf", CifMode::Phys).expect("leaf back");
    assert_eq!(a, b);
    let a = lib.cell("top", CifMode::Phys).expect("top");
    let b = back.cell("top", CifMode::Phys).expect("top back");
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn it_file_round_trips() -> CifResult<()> {
    init_logging();
    let (lib, _) = import_str(SIMPLE, CifReadOptions::default())?;
    let dir = tempfile::tempdir().map_err(|e| CifError::Io(format!("{:?}", e)))?;
    let path = dir.path().join("rt.cif");
    crate::write::save(&lib, &path, CifWriteOptions::default())?;
    let (back, _) = crate::read::import_file(&path, CifReadOptions::default())?;
    assert_eq!(
        lib.cell("unit", CifMode::Phys),
        back.cell("unit", CifMode::Phys)
    );
    assert_eq!(
        lib.cell("top", CifMode::Phys),
        back.cell("top", CifMode::Phys)
    );
    Ok(())
}

#[test]
fn forward_references_resolve_to_one_entity() -> CifResult<()> {
    init_logging();
    let src = r#"( fwd );
DS 1;
9 top;
C 5 T 0 0;
C 5 T 50 0;
DF;
DS 5;
9 leaf;
L M1;
B 2 2 1 1;
DF;
E
"#;
    let (lib, stats) = import_str(src, CifReadOptions::default())?;
    assert_eq!(stats.symbols, 2);
    assert_eq!(lib.cells_of(CifMode::Phys).count(), 2);
    let top = lib.cell("top", CifMode::Phys).expect("top");
    assert_eq!(top.instances.len(), 2);
    assert!(top.instances.iter().all(|i| i.cell_name == "leaf"));
    // The leaf cell itself is the defined one, not an unread placeholder
    assert!(!lib.cell("leaf", CifMode::Phys).unwrap().unread);
    Ok(())
}

#[test]
fn never_defined_reference_synthesizes_a_placeholder() -> CifResult<()> {
    init_logging();
    let src = r#"( dangling );
DS 1;
9 top;
C 5 T 0 0;
DF;
E
"#;
    let (lib, stats) = import_str(src, CifReadOptions::default())?;
    let top = lib.cell("top", CifMode::Phys).expect("top");
    assert_eq!(top.instances[0].cell_name, "Symbol5");
    let ph = lib.cell("Symbol5", CifMode::Phys).expect("placeholder");
    assert!(ph.unread);
    assert!(stats.warnings > 0);
    Ok(())
}

#[test]
fn depth_guard_trips_on_cycles() -> CifResult<()> {
    init_logging();
    let src = r#"( cyclic );
DS 1;
9 ouro;
L M1;
B 2 2 0 0;
C 1 T 10 10;
DF;
E
"#;
    let mut parser = CifParser::new(cursor(src), CifReadOptions::default())?;
    parser.scan()?;
    parser.restart()?;
    let mut digest = CifDigest::scan(cursor(src), CifReadOptions::default())?;
    let mut out = Vec::new();
    let mut writer = CifWriter::new(&mut out, CifWriteOptions::default());
    let opts = TranslateOptions {
        flatten: true,
        ..Default::default()
    };
    let mut translator = CifTranslator::new(&mut writer, opts);
    match translator.run_flat(&mut parser, &mut digest) {
        Err(CifError::Structural { msg }) => assert!(msg.contains("deep")),
        other => panic!("expected a structural depth error, got {:?}", other),
    }
    Ok(())
}

#[test]
fn depth_guard_trips_past_the_bound() -> CifResult<()> {
    init_logging();
    // A chain of single-instance symbols deeper than the stack bound
    let depth = MAX_HIERARCHY_DEPTH + 5;
    let mut src = String::from("( deep );\n");
    for k in 1..=depth {
        src.push_str(&format!("DS {};\n", k));
        if k < depth {
            src.push_str(&format!("C {} T 0 0;\n", k + 1));
        } else {
            src.push_str("L M1;\nB 2 2 0 0;\n");
        }
        src.push_str("DF;\n");
    }
    src.push_str("E\n");

    let mut parser = CifParser::new(cursor(&src), CifReadOptions::default())?;
    parser.scan()?;
    parser.restart()?;
    let mut digest = CifDigest::scan(cursor(&src), CifReadOptions::default())?;
    let mut out = Vec::new();
    let mut writer = CifWriter::new(&mut out, CifWriteOptions::default());
    let opts = TranslateOptions {
        flatten: true,
        ..Default::default()
    };
    let mut translator = CifTranslator::new(&mut writer, opts);
    assert!(matches!(
        translator.run_flat(&mut parser, &mut digest),
        Err(CifError::Structural { .. })
    ));
    Ok(())
}

#[test]
fn area_filter_drops_disjoint_geometry() -> CifResult<()> {
    init_logging();
    let src = r#"( t );
DS 1;
9 win;
L M1;
B 10 10 5 5;
B 10 10 1005 1005;
DF;
E
"#;
    let mut parser = CifParser::new(cursor(src), CifReadOptions::default())?;
    parser.scan()?;
    parser.restart()?;
    let mut out = Vec::new();
    let mut writer = CifWriter::new(&mut out, CifWriteOptions::default());
    let opts = TranslateOptions {
        window: Some(BoundBox::from_points(Point::new(0, 0), Point::new(20, 20))),
        ..Default::default()
    };
    let mut translator = CifTranslator::new(&mut writer, opts);
    translator.run(&mut parser)?;
    let warnings = translator.warnings().to_vec();
    drop(translator);
    drop(writer);
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("B 10 10 5 5;"));
    assert!(!text.contains("1005"));
    assert!(warnings.is_empty());
    Ok(())
}

#[test]
fn clip_trims_overlapping_geometry() -> CifResult<()> {
    init_logging();
    let src = r#"( c );
DS 1;
9 clipme;
L M1;
B 20 20 10 10;
DF;
E
"#;
    let mut parser = CifParser::new(cursor(src), CifReadOptions::default())?;
    parser.scan()?;
    parser.restart()?;
    let mut out = Vec::new();
    let mut writer = CifWriter::new(&mut out, CifWriteOptions::default());
    let opts = TranslateOptions {
        window: Some(BoundBox::from_points(Point::new(0, 0), Point::new(5, 5))),
        clip: true,
        ..Default::default()
    };
    let mut translator = CifTranslator::new(&mut writer, opts);
    translator.run(&mut parser)?;
    drop(translator);
    drop(writer);
    let text = String::from_utf8_lossy(&out);
    // The 20x20 box at (0,0)-(20,20) clipped to the 5x5 window
    assert!(text.contains("B 5 5 2 2;"));
    Ok(())
}

#[test]
fn degenerate_wire_clip_falls_back_with_warning() -> CifResult<()> {
    init_logging();
    // Flush wire of width 10 whose only segment is length 4: shorter than
    // the end retraction, so its outline degenerates.
    let src = r#"( w );
DS 1;
9 stub;
L M1;
W0 10 0 0 4 0;
DF;
E
"#;
    let mut parser = CifParser::new(cursor(src), CifReadOptions::default())?;
    parser.scan()?;
    parser.restart()?;
    let mut out = Vec::new();
    let mut writer = CifWriter::new(&mut out, CifWriteOptions::default());
    let opts = TranslateOptions {
        window: Some(BoundBox::from_points(Point::new(0, 0), Point::new(2, 2))),
        clip: true,
        ..Default::default()
    };
    let mut translator = CifTranslator::new(&mut writer, opts);
    translator.run(&mut parser)?;
    let warnings = translator.warnings().to_vec();
    drop(translator);
    drop(writer);
    let text = String::from_utf8_lossy(&out);
    // Emitted unclipped, with a warning, rather than dropped or corrupted
    assert!(text.contains("W0 10 0 0 4 0;"));
    assert_eq!(warnings.len(), 1);
    Ok(())
}

#[test]
fn flatten_replays_instance_bodies() -> CifResult<()> {
    init_logging();
    let mut parser = CifParser::new(cursor(SIMPLE), CifReadOptions::default())?;
    parser.scan()?;
    parser.restart()?;
    let mut digest = CifDigest::scan(cursor(SIMPLE), CifReadOptions::default())?;
    let mut out = Vec::new();
    let mut writer = CifWriter::new(&mut out, CifWriteOptions::default());
    let opts = TranslateOptions {
        flatten: true,
        ..Default::default()
    };
    let mut translator = CifTranslator::new(&mut writer, opts);
    translator.run_flat(&mut parser, &mut digest)?;
    drop(translator);
    drop(writer);
    let text = String::from_utf8_lossy(&out);
    // No instance records remain; the unit box reappears shifted into top
    assert!(!text.contains("C 1"));
    assert!(text.contains("B 10 20 105 10;"));
    Ok(())
}

#[test]
fn digest_reparses_one_symbol() -> CifResult<()> {
    init_logging();
    let mut digest = CifDigest::scan(cursor(SIMPLE), CifReadOptions::default())?;
    let key = digest.find("top", CifMode::Phys).expect("top in digest");
    let mut lib = CifLibrary::new("partial");
    digest.materialize_symbol(key, CifMode::Phys, &mut lib)?;
    let top = lib.cell("top", CifMode::Phys).expect("top");
    assert_eq!(top.instances.len(), 1);
    assert_eq!(top.instances[0].cell_name, "unit");
    // Only the requested body was materialized; the target is a placeholder
    assert!(lib.cell("unit", CifMode::Phys).unwrap().unread);
    Ok(())
}

#[test]
fn digest_override_skips_the_stream() -> CifResult<()> {
    init_logging();
    let mut digest = CifDigest::scan(cursor(SIMPLE), CifReadOptions::default())?;
    let key = digest.find("unit", CifMode::Phys).expect("unit in digest");

    let mut master = CifCell::new("unit", CifMode::Phys);
    master.submaster = true;
    master.elements.push(CifElement {
        layer: LayerDescriptor::named("V1", CifMode::Phys),
        shape: CifShape::CifBox(CifBox::new(Point::new(0, 0), Point::new(8, 8))),
        properties: Vec::new(),
    });
    master.bbox = Some(BoundBox::from_points(Point::new(0, 0), Point::new(8, 8)));
    digest.add_override(master)?;

    let reads_before = digest.read_calls();
    let body = digest.seek_and_parse(key, CifMode::Phys)?;
    // The input stream was not touched for the overridden symbol
    assert_eq!(digest.read_calls(), reads_before);
    match body {
        DigestBody::Override(cell) => assert_eq!(cell.elements.len(), 1),
        DigestBody::Parsed(_) => panic!("expected the override body"),
    }
    // And the override's own bounding box is what the digest reports
    assert_eq!(
        digest.bbox_of(key, CifMode::Phys),
        Some(BoundBox::from_points(Point::new(0, 0), Point::new(8, 8)))
    );
    assert!(digest.symbol(key, CifMode::Phys).unwrap().should_skip);
    Ok(())
}

#[test]
fn override_must_be_fully_built() {
    init_logging();
    let mut digest = CifDigest::scan(cursor(SIMPLE), CifReadOptions::default()).unwrap();
    // No bbox: not a fully built cell
    let master = CifCell::new("unit", CifMode::Phys);
    assert!(matches!(
        digest.add_override(master),
        Err(CifError::Structural { .. })
    ));
}

#[test]
fn dual_mode_sections() -> CifResult<()> {
    init_logging();
    let src = r#"( phys );
DS 1;
9 cellA;
L M1;
B 10 10 5 5;
DF;
E
( elec );
DS 1;
9 cellA;
L W1;
B 4 4 2 2;
DF;
E
"#;
    let (lib, stats) = import_str(src, CifReadOptions::default())?;
    assert_eq!(stats.symbols, 2);
    let phys = lib.cell("cellA", CifMode::Phys).expect("phys cellA");
    let elec = lib.cell("cellA", CifMode::Elec).expect("elec cellA");
    assert_eq!(phys.elements[0].layer.name, "M1");
    assert_eq!(elec.elements[0].layer.name, "W1");
    Ok(())
}

#[test]
fn merge_decision_is_remembered_across_modes() -> CifResult<()> {
    init_logging();
    let src = r#"( both );
DS 1;
9 dup;
L M1;
B 10 10 5 5;
DF;
E
( elec );
DS 1;
9 dup;
L W1;
B 4 4 2 2;
DF;
E
"#;
    // First read populates the library in both modes
    let (mut lib, _) = import_str(src, CifReadOptions::default())?;
    // Second read over the same content, with an asking merge policy
    let asked = Arc::new(AtomicUsize::new(0));
    let asked_inner = asked.clone();
    let opts = CifReadOptions {
        merge: MergePolicy::Ask,
        ..Default::default()
    };
    let mut parser = CifParser::new(cursor(src), opts.clone())?;
    let mut importer = CifImporter::new(&mut lib, opts);
    importer.set_merge_hook(Box::new(move |_name| {
        asked_inner.fetch_add(1, Ordering::SeqCst);
        true
    }));
    importer.import(&mut parser)?;
    // One collision per mode, but the per-name answer is asked once
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn skip_policy_preserves_existing_content() -> CifResult<()> {
    init_logging();
    let first = r#"( a );
DS 1;
9 keeper;
L M1;
B 10 10 5 5;
DF;
E
"#;
    let second = r#"( b );
DS 1;
9 keeper;
L M1;
B 2 2 1 1;
B 2 2 3 3;
DF;
E
"#;
    let (mut lib, _) = import_str(first, CifReadOptions::default())?;
    let opts = CifReadOptions {
        merge: MergePolicy::Skip,
        ..Default::default()
    };
    let mut parser = CifParser::new(cursor(second), opts.clone())?;
    let mut importer = CifImporter::new(&mut lib, opts);
    importer.import(&mut parser)?;
    assert!(!importer.warnings().is_empty());
    let cell = lib.cell("keeper", CifMode::Phys).expect("keeper");
    assert_eq!(cell.elements.len(), 1);
    assert_eq!(
        cell.elements[0].shape,
        CifShape::CifBox(CifBox::new(Point::new(0, 0), Point::new(10, 10)))
    );
    Ok(())
}

#[test]
fn submasters_are_never_overwritten() -> CifResult<()> {
    init_logging();
    let (mut lib, _) = import_str(SIMPLE, CifReadOptions::default())?;
    lib.cell_mut("unit", CifMode::Phys).unwrap().submaster = true;
    let replacement = r#"( r );
DS 1;
9 unit;
L M1;
B 2 2 1 1;
DF;
E
"#;
    let opts = CifReadOptions::default();
    let mut parser = CifParser::new(cursor(replacement), opts.clone())?;
    let mut importer = CifImporter::new(&mut lib, opts);
    importer.import(&mut parser)?;
    assert!(!importer.warnings().is_empty());
    let unit = lib.cell("unit", CifMode::Phys).expect("unit");
    assert_eq!(
        unit.elements[0].shape,
        CifShape::CifBox(CifBox::new(Point::new(0, 0), Point::new(10, 20)))
    );
    Ok(())
}

#[test]
fn resolution_directive_rescales() -> CifResult<()> {
    init_logging();
    let src = r#"( RESOLUTION 1000 );
DS 1;
9 res;
L M1;
B 1000 1000 500 500;
DF;
E
"#;
    let (lib, _) = import_str(src, CifReadOptions::default())?;
    let cell = lib.cell("res", CifMode::Phys).expect("res");
    assert_eq!(
        cell.elements[0].shape,
        CifShape::CifBox(CifBox::new(Point::new(0, 0), Point::new(100, 100)))
    );
    Ok(())
}

#[test]
fn symbol_ratio_applies_per_symbol() -> CifResult<()> {
    init_logging();
    let src = r#"( ratio );
DS 1 3 1;
9 tripled;
L M1;
B 10 10 5 5;
DF;
DS 2;
9 plain;
L M1;
B 10 10 5 5;
DF;
E
"#;
    let (lib, _) = import_str(src, CifReadOptions::default())?;
    assert_eq!(
        lib.cell("tripled", CifMode::Phys).unwrap().elements[0].shape,
        CifShape::CifBox(CifBox::new(Point::new(0, 0), Point::new(30, 30)))
    );
    // The ratio reset at the next symbol
    assert_eq!(
        lib.cell("plain", CifMode::Phys).unwrap().elements[0].shape,
        CifShape::CifBox(CifBox::new(Point::new(0, 0), Point::new(10, 10)))
    );
    Ok(())
}

#[test]
fn malformed_primitives_warn_and_drop() -> CifResult<()> {
    init_logging();
    let src = r#"( bad );
DS 1;
9 messy;
L M1;
P 0 0 10 10;
W 0 0 0 10 0;
B 10 10 5 5;
DF;
E
"#;
    let (lib, stats) = import_str(src, CifReadOptions::default())?;
    let cell = lib.cell("messy", CifMode::Phys).expect("messy");
    // The two-point polygon and zero-width wire dropped; the box survived
    assert_eq!(cell.elements.len(), 1);
    assert_eq!(stats.warnings, 2);
    Ok(())
}

#[test]
fn truncated_file_is_fatal() {
    init_logging();
    let src = "( t );\nDS 1;\n9 cut;\nL M1;\nB 10 10 5";
    match import_str(src, CifReadOptions::default()) {
        Err(CifError::Syntax { .. }) => (),
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn cancellation_is_distinct_from_syntax_errors() -> CifResult<()> {
    init_logging();
    // Enough content to cross the progress cadence
    let mut src = String::from("( big );\nDS 1;\n9 wide;\nL M1;\n");
    for k in 0..600 {
        src.push_str(&format!("B 10 10 {} {};\n", k * 20, k * 20));
    }
    src.push_str("DF;\nE\n");
    let opts = CifReadOptions::default();
    let mut parser = CifParser::new(cursor(&src), opts.clone())?;
    parser.set_progress(Box::new(|_pos| false));
    let mut lib = CifLibrary::new("cancelled");
    let result = CifImporter::new(&mut lib, opts).import(&mut parser);
    match result {
        Err(CifError::Interrupted { bytepos }) => assert!(bytepos >= PROGRESS_CADENCE),
        other => panic!("expected an interruption, got {:?}", other),
    }
    Ok(())
}

#[test]
fn empty_cells_prune_under_policy() -> CifResult<()> {
    init_logging();
    let src = r#"( e );
DS 1;
9 hollow;
DF;
DS 2;
9 solid;
L M1;
B 2 2 1 1;
DF;
E
"#;
    let (lib, _) = import_str(src, CifReadOptions::default())?;
    assert!(lib.cell("hollow", CifMode::Phys).is_some());
    let opts = CifReadOptions {
        prune_empty: true,
        ..Default::default()
    };
    let (lib, _) = import_str(src, opts)?;
    assert!(lib.cell("hollow", CifMode::Phys).is_none());
    assert!(lib.cell("solid", CifMode::Phys).is_some());
    Ok(())
}

const SCALED: &str = r#"( s );
DS 1;
9 unit;
L M1;
B 20 40 10 20;
DF;
DS 2;
9 top;
C 1 T 100 0;
DF;
E
"#;

#[test]
fn external_scale_applies_everywhere() -> CifResult<()> {
    init_logging();
    let opts = CifReadOptions {
        external_scale: 0.5,
        ..Default::default()
    };
    let (lib, _) = import_str(SCALED, opts)?;
    let unit = lib.cell("unit", CifMode::Phys).expect("unit");
    assert_eq!(
        unit.elements[0].shape,
        CifShape::CifBox(CifBox::new(Point::new(0, 0), Point::new(10, 20)))
    );
    let top = lib.cell("top", CifMode::Phys).expect("top");
    assert_eq!(top.instances[0].placement.origin, Point::new(50, 0));
    Ok(())
}

#[test]
fn library_mode_exempts_geometry_from_external_scale() -> CifResult<()> {
    init_logging();
    let opts = CifReadOptions {
        external_scale: 0.5,
        library_mode: true,
        ..Default::default()
    };
    let (lib, _) = import_str(SCALED, opts)?;
    // Geometry unscaled, placement scaled
    let unit = lib.cell("unit", CifMode::Phys).expect("unit");
    assert_eq!(
        unit.elements[0].shape,
        CifShape::CifBox(CifBox::new(Point::new(0, 0), Point::new(20, 40)))
    );
    let top = lib.cell("top", CifMode::Phys).expect("top");
    assert_eq!(top.instances[0].placement.origin, Point::new(50, 0));
    Ok(())
}

#[test]
fn aliases_rename_on_read() -> CifResult<()> {
    init_logging();
    let mut opts = CifReadOptions::default();
    opts.cell_aliases
        .insert("unit".to_string(), "via_std".to_string());
    opts.allow_layer_mapping = true;
    opts.layer_aliases
        .insert("M1".to_string(), "METAL1".to_string());
    let (lib, _) = import_str(SIMPLE, opts)?;
    let cell = lib.cell("via_std", CifMode::Phys).expect("aliased cell");
    assert_eq!(cell.elements[0].layer.name, "METAL1");
    assert_eq!(
        lib.cell("top", CifMode::Phys).unwrap().instances[0].cell_name,
        "via_std"
    );
    Ok(())
}

#[test]
fn icarus_name_dialect() -> CifResult<()> {
    init_logging();
    let src = r#"( i );
DS 1;
(9 wrapped);
L M1;
B 2 2 1 1;
DF;
E
"#;
    let opts = CifReadOptions {
        name_style: NameStyle::Icarus,
        ..Default::default()
    };
    let (lib, _) = import_str(src, opts)?;
    assert!(lib.cell("wrapped", CifMode::Phys).is_some());
    Ok(())
}

#[test]
fn quoted_labels_keep_blanks() -> CifResult<()> {
    init_logging();
    let src = r#"( q );
DS 1;
9 lbl;
L M1;
94 "net a" 5 7;
DF;
E
"#;
    let (lib, _) = import_str(src, CifReadOptions::default())?;
    let cell = lib.cell("lbl", CifMode::Phys).expect("lbl");
    match &cell.elements[0].shape {
        CifShape::Label(l) => {
            assert_eq!(l.text, "net a");
            assert_eq!(l.loc, Point::new(5, 7));
        }
        other => panic!("expected a label, got {:?}", other),
    }
    Ok(())
}
