//! End-to-end round trip through the public API: build a drawing, save it,
//! extract its text, export the translation table, fill in translations,
//! and back-fill them into the drawing.
//!
//! This test exercises the same code paths the `dxf-translate` binary uses
//! in production.

use dxf_translate_toolkit::backfill::{
    process_directory, translate_document, EntityCounters, SubstitutionConfig,
};
use dxf_translate_toolkit::document::{
    load_document, parse_document, render_document, save_document, Document, Entity, Point3,
    TextEntity, MODEL_LAYOUT,
};
use dxf_translate_toolkit::export::export_csv;
use dxf_translate_toolkit::extract::{ExtractionConfig, ExtractionEngine};
use dxf_translate_toolkit::translate::{load_csv, smart_match, MatchMethod, TranslationMap};
use std::collections::BTreeSet;

fn drawing_with_texts(texts: &[(&str, f64)]) -> Document {
    let mut doc = Document::new();
    for (text, height) in texts {
        let handle = doc.alloc_handle();
        doc.layout_mut(MODEL_LAYOUT)
            .unwrap()
            .entities
            .push(Entity::Text(TextEntity {
                handle,
                text: text.to_string(),
                insert: Some(Point3::new(10.0, 20.0, 0.0)),
                height: Some(*height),
                rotation: 0.0,
                style: None,
                layer: "0".to_string(),
            }));
    }
    doc
}

#[test]
fn test_extract_fill_backfill_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let drawings = dir.path().join("drawings");
    std::fs::create_dir_all(&drawings).unwrap();

    // A drawing with translatable text plus noise that must not be exported.
    let doc = drawing_with_texts(&[("配电室", 10.0), ("1234", 5.0), ("电缆桥架", 8.0)]);
    let input = drawings.join("site.dxf");
    save_document(&doc, &input).unwrap();

    // Extract.
    let engine = ExtractionEngine::new(&ExtractionConfig::default()).unwrap();
    let outcome = engine.extract_file(&input);
    assert!(!outcome.degraded);
    let texts: BTreeSet<&str> = outcome.records.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, BTreeSet::from(["配电室", "电缆桥架"]));

    // Export the table and simulate the translator filling it in.
    let exported = dir.path().join("texts.csv");
    export_csv(&outcome.records, &exported).unwrap();

    let mut reader = csv::Reader::from_path(&exported).unwrap();
    let headers = reader.headers().unwrap().clone();
    let filled = dir.path().join("filled.csv");
    let mut writer = csv::Writer::from_path(&filled).unwrap();
    writer.write_record(&headers).unwrap();
    for row in reader.records() {
        let row = row.unwrap();
        let mut cells: Vec<String> = row.iter().map(|s| s.to_string()).collect();
        cells[2] = match cells[1].as_str() {
            "配电室" => "Switch room".to_string(),
            "电缆桥架" => "Cable tray".to_string(),
            _ => String::new(),
        };
        writer.write_record(&cells).unwrap();
    }
    writer.flush().unwrap();

    // Load the filled table and back-fill the whole directory.
    let map = load_csv(&filled);
    assert_eq!(map.len(), 2);

    let output_dir = dir.path().join("translated");
    let config = SubstitutionConfig {
        font_name: "Arial".to_string(),
        replace_mode: true,
        font_size_reduction: 4.0,
    };
    let summary =
        process_directory(&drawings, &output_dir, &map, &config, None, |_| true).unwrap();

    assert_eq!(summary.files, 1);
    assert_eq!(summary.succeeded, 1);
    // Three text entities processed; the numeric one has no table entry.
    assert_eq!(summary.counters.processed, 3);
    assert_eq!(summary.counters.translated, 2);
    assert_eq!(summary.counters.skipped, 1);
    assert_eq!(summary.counters.errors, 0);

    // Verify the saved drawing.
    let translated = load_document(&output_dir.join("site_translated.dxf")).unwrap();
    let texts: BTreeSet<String> = translated
        .modelspace()
        .entities
        .iter()
        .filter_map(|e| match e {
            Entity::Text(t) => Some(t.text.clone()),
            _ => None,
        })
        .collect();
    assert!(texts.contains("Switch room"));
    assert!(texts.contains("Cable tray"));
    assert!(texts.contains("1234"));

    // Exactly one style record backs all translated text.
    let styles: Vec<_> = translated
        .styles()
        .filter(|s| s.name == "TranslatedStyle_Arial")
        .collect();
    assert_eq!(styles.len(), 1);
    assert_eq!(styles[0].font, "Arial");
}

#[test]
fn test_replace_mode_single_text() {
    // Drawing with one TEXT "Hello World" at height 10, mapping to
    // "Bonjour le monde", replace mode, font Arial, reduction 4.
    let mut doc = drawing_with_texts(&[("Hello World", 10.0)]);
    let mut map = TranslationMap::new();
    map.insert("Hello World".to_string(), "Bonjour le monde".to_string());

    let config = SubstitutionConfig {
        font_name: "Arial".to_string(),
        replace_mode: true,
        font_size_reduction: 4.0,
    };
    let counters = translate_document(&mut doc, &map, &config);
    assert_eq!(
        counters,
        EntityCounters {
            processed: 1,
            translated: 1,
            skipped: 0,
            errors: 0
        }
    );

    match &doc.modelspace().entities[0] {
        Entity::Text(e) => {
            assert_eq!(e.text, "Bonjour le monde");
            assert_eq!(e.height, Some(6.0));
            assert_eq!(e.style.as_deref(), Some("TranslatedStyle_Arial"));
        }
        other => panic!("expected TEXT, got {}", other.kind_name()),
    }
    assert_eq!(doc.style("TranslatedStyle_Arial").unwrap().font, "Arial");
}

#[test]
fn test_empty_mapping_leaves_drawing_unchanged() {
    let mut doc = drawing_with_texts(&[("Hello World", 10.0)]);
    let map = TranslationMap::new();
    let config = SubstitutionConfig {
        font_name: "Arial".to_string(),
        replace_mode: true,
        font_size_reduction: 4.0,
    };
    let counters = translate_document(&mut doc, &map, &config);
    assert_eq!(
        counters,
        EntityCounters {
            processed: 1,
            translated: 0,
            skipped: 1,
            errors: 0
        }
    );
    match &doc.modelspace().entities[0] {
        Entity::Text(e) => {
            assert_eq!(e.text, "Hello World");
            assert_eq!(e.height, Some(10.0));
        }
        other => panic!("expected TEXT, got {}", other.kind_name()),
    }
}

#[test]
fn test_matcher_precedence_and_cascade() {
    let mut map = TranslationMap::new();
    map.insert("Hello".to_string(), "Bonjour".to_string());
    let (translation, method) = smart_match("Hello", &map);
    assert_eq!(translation.as_deref(), Some("Bonjour"));
    assert_eq!(method, MatchMethod::Direct);

    let mut map = TranslationMap::new();
    map.insert("A B".to_string(), "X".to_string());
    let (translation, method) = smart_match("A  B", &map);
    assert_eq!(translation.as_deref(), Some("X"));
    match method {
        MatchMethod::Normalized { method, .. } => assert_eq!(method, "strip-all-whitespace"),
        other => panic!("expected normalized match, got {:?}", other),
    }
}

#[test]
fn test_damaged_drawing_still_yields_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("damaged.dxf");
    // Structurally broken (SECTION without a name) but full of tag pairs.
    std::fs::write(
        &path,
        "  0\nSECTION\n  1\n高压开关柜\n  1\n42\n  8\n0\n  1\n低压配电屏\n",
    )
    .unwrap();

    let engine = ExtractionEngine::new(&ExtractionConfig::default()).unwrap();
    let outcome = engine.extract_file(&path);
    assert!(outcome.degraded);
    let texts: BTreeSet<&str> = outcome.records.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, BTreeSet::from(["高压开关柜", "低压配电屏"]));
    assert!(outcome.records.iter().all(|r| r.handle.is_none()));
}

#[test]
fn test_render_parse_preserves_unmodeled_entities() {
    let mut doc = drawing_with_texts(&[("标注说明", 5.0)]);
    // An entity kind the translator does not model survives the round trip.
    let handle = doc.alloc_handle();
    doc.layout_mut(MODEL_LAYOUT)
        .unwrap()
        .entities
        .push(Entity::Other {
            kind: "CIRCLE".to_string(),
            handle: handle.clone(),
            layer: "0".to_string(),
            tags: vec![
                (5, handle),
                (8, "0".to_string()),
                (10, "1.0".to_string()),
                (20, "2.0".to_string()),
                (40, "3.5".to_string()),
            ],
        });

    let reloaded = parse_document(&render_document(&doc)).unwrap();
    let kinds: Vec<&str> = reloaded
        .modelspace()
        .entities
        .iter()
        .map(|e| e.kind_name())
        .collect();
    assert!(kinds.contains(&"TEXT"));
    assert!(kinds.contains(&"CIRCLE"));
}
