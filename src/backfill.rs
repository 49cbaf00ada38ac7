//! Translation substitution and the batch back-fill driver.
//!
//! The substitution pass re-walks a document region by region (model space
//! first, then paper-space layouts, then named block definitions), matches
//! each text-bearing entity against the translation map and rewrites it in
//! one of two modes. Batch processing is parallel per document; a document
//! is never touched by more than one worker.

use crate::document::{
    load_document, save_document, Document, Entity, Point3, TextEntity, DEFAULT_LAYER,
    MODEL_LAYOUT,
};
use crate::extract::strip_mtext_markup;
use crate::translate::{smart_match, TranslationMap};
use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Text height never drops below this, whatever the reduction.
pub const MIN_TEXT_HEIGHT: f64 = 1.0;

/// Width factor given to styles created for translated text.
pub const TRANSLATED_STYLE_WIDTH: f64 = 0.8;

/// Fallback height when an entity has none.
const DEFAULT_TEXT_HEIGHT: f64 = 2.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstitutionConfig {
    /// Font backing the style assigned to translated text.
    pub font_name: String,
    /// True: mutate entities in place. False: recreate each translated
    /// entity as a fresh plain-text entity and delete the original.
    pub replace_mode: bool,
    /// Amount subtracted from the original text height.
    pub font_size_reduction: f64,
}

impl Default for SubstitutionConfig {
    fn default() -> Self {
        Self {
            font_name: "Times New Roman".to_string(),
            replace_mode: false,
            font_size_reduction: 4.0,
        }
    }
}

/// Per-entity counters, summed over regions, documents and batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounters {
    pub processed: usize,
    pub translated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl EntityCounters {
    pub fn absorb(&mut self, other: &EntityCounters) {
        self.processed += other.processed;
        self.translated += other.translated;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

/// Result of back-filling one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub file: PathBuf,
    pub counters: EntityCounters,
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub error_message: Option<String>,
}

/// Deterministic style name for a requested font.
pub fn style_name_for_font(font: &str) -> String {
    format!("TranslatedStyle_{}", font.replace(' ', "_"))
}

fn reduced_height(height: f64, reduction: f64) -> f64 {
    (height - reduction).max(MIN_TEXT_HEIGHT)
}

// ============================================================================
// Region addressing
// ============================================================================

/// Names one region of a document for the substitution walk.
#[derive(Debug, Clone)]
enum RegionSel {
    Layout(String),
    Block(String),
}

impl RegionSel {
    fn describe(&self) -> String {
        match self {
            RegionSel::Layout(name) => format!("layout {}", name),
            RegionSel::Block(name) => format!("block {}", name),
        }
    }
}

/// Region walk order: primary layout, remaining layouts, named blocks.
fn region_order(doc: &Document) -> Vec<RegionSel> {
    let mut regions = vec![RegionSel::Layout(MODEL_LAYOUT.to_string())];
    for layout in doc.paper_layouts() {
        regions.push(RegionSel::Layout(layout.name.clone()));
    }
    for block in doc.blocks() {
        if !block.is_anonymous() {
            regions.push(RegionSel::Block(block.name.clone()));
        }
    }
    regions
}

fn region_entities_mut<'a>(
    doc: &'a mut Document,
    region: &RegionSel,
) -> Option<&'a mut Vec<Entity>> {
    match region {
        RegionSel::Layout(name) => doc.layout_mut(name).map(|l| &mut l.entities),
        RegionSel::Block(name) => doc.block_mut(name).map(|b| &mut b.entities),
    }
}

// ============================================================================
// Per-entity substitution
// ============================================================================

/// Snapshot of a text-bearing entity's fields used to plan a substitution.
struct TextSnapshot {
    source: String,
    insert: Option<Point3>,
    height: Option<f64>,
    rotation: f64,
    layer: String,
}

fn snapshot(entity: &Entity) -> Option<TextSnapshot> {
    match entity {
        Entity::Text(e) => Some(TextSnapshot {
            source: e.text.clone(),
            insert: e.insert,
            height: e.height,
            rotation: e.rotation,
            layer: e.layer.clone(),
        }),
        Entity::MText(e) => Some(TextSnapshot {
            // Matching runs against the markup-stripped content, the same
            // form the extraction phase exported.
            source: strip_mtext_markup(&e.content),
            insert: e.insert,
            height: e.char_height,
            rotation: e.rotation,
            layer: e.layer.clone(),
        }),
        _ => None,
    }
}

/// Apply a matched translation to the entity at `idx` of `region`.
fn apply_translation(
    doc: &mut Document,
    region: &RegionSel,
    idx: usize,
    snapshot: &TextSnapshot,
    translated: &str,
    config: &SubstitutionConfig,
) -> Result<()> {
    let style_name = style_name_for_font(&config.font_name);
    doc.ensure_style(&style_name, &config.font_name, TRANSLATED_STYLE_WIDTH);

    if config.replace_mode {
        let entities = region_entities_mut(doc, region)
            .ok_or_else(|| anyhow::anyhow!("region {} vanished mid-pass", region.describe()))?;
        match entities.get_mut(idx) {
            Some(Entity::Text(e)) => {
                e.text = translated.to_string();
                e.style = Some(style_name);
                if let Some(height) = e.height {
                    e.height = Some(reduced_height(height, config.font_size_reduction));
                }
            }
            Some(Entity::MText(e)) => {
                e.content = translated.to_string();
                e.style = Some(style_name);
                if let Some(height) = e.char_height {
                    e.char_height = Some(reduced_height(height, config.font_size_reduction));
                }
            }
            _ => {
                return Err(anyhow::anyhow!(
                    "entity {} in {} is no longer text-bearing",
                    idx,
                    region.describe()
                ));
            }
        }
    } else {
        // New-entity mode: a fresh plain-text entity takes the slot of the
        // original, which is deleted. Converting paragraph text in place is
        // not a safe edit; recreation is.
        let handle = doc.alloc_handle();
        let replacement = Entity::Text(TextEntity {
            handle,
            text: translated.to_string(),
            insert: Some(snapshot.insert.unwrap_or(Point3::ORIGIN)),
            height: Some(reduced_height(
                snapshot.height.unwrap_or(DEFAULT_TEXT_HEIGHT),
                config.font_size_reduction,
            )),
            rotation: snapshot.rotation,
            style: Some(style_name),
            layer: if snapshot.layer.is_empty() {
                DEFAULT_LAYER.to_string()
            } else {
                snapshot.layer.clone()
            },
        });
        let entities = region_entities_mut(doc, region)
            .ok_or_else(|| anyhow::anyhow!("region {} vanished mid-pass", region.describe()))?;
        if idx >= entities.len() {
            return Err(anyhow::anyhow!(
                "entity index {} out of bounds in {}",
                idx,
                region.describe()
            ));
        }
        entities[idx] = replacement;
    }
    Ok(())
}

fn translate_region(
    doc: &mut Document,
    region: &RegionSel,
    map: &TranslationMap,
    config: &SubstitutionConfig,
) -> EntityCounters {
    let mut counters = EntityCounters::default();
    let len = match region_entities_mut(doc, region) {
        Some(entities) => entities.len(),
        None => return counters,
    };

    for idx in 0..len {
        let snap = {
            let entities = match region_entities_mut(doc, region) {
                Some(entities) => entities,
                None => break,
            };
            match entities.get(idx).and_then(snapshot) {
                Some(snap) => snap,
                None => continue,
            }
        };

        counters.processed += 1;

        if snap.source.trim().is_empty() {
            counters.skipped += 1;
            continue;
        }

        let (translated, method) = smart_match(&snap.source, map);
        let translated = match translated {
            Some(translated) => translated,
            None => {
                log::debug!(
                    "skipping {:?} in {}: {}",
                    snap.source,
                    region.describe(),
                    method.describe()
                );
                counters.skipped += 1;
                continue;
            }
        };

        log::info!(
            "translating {:?} -> {:?} ({})",
            snap.source,
            translated,
            method.describe()
        );

        match apply_translation(doc, region, idx, &snap, &translated, config) {
            Ok(()) => counters.translated += 1,
            Err(e) => {
                log::error!("substitution failed in {}: {}", region.describe(), e);
                counters.errors += 1;
            }
        }
    }

    counters
}

/// Back-fill translations into every region of one document.
///
/// `keep_going` is consulted between regions; return `false` to stop the
/// walk early. An individual entity substitution is never interrupted.
pub fn translate_document_cancellable(
    doc: &mut Document,
    map: &TranslationMap,
    config: &SubstitutionConfig,
    mut keep_going: impl FnMut() -> bool,
) -> EntityCounters {
    let mut counters = EntityCounters::default();
    for region in region_order(doc) {
        if !keep_going() {
            log::info!("substitution cancelled before {}", region.describe());
            break;
        }
        let region_counters = translate_region(doc, &region, map, config);
        if region_counters.processed > 0 {
            log::debug!(
                "{}: processed {}, translated {}",
                region.describe(),
                region_counters.processed,
                region_counters.translated
            );
        }
        counters.absorb(&region_counters);
    }
    counters
}

/// Back-fill translations into every region of one document.
pub fn translate_document(
    doc: &mut Document,
    map: &TranslationMap,
    config: &SubstitutionConfig,
) -> EntityCounters {
    translate_document_cancellable(doc, map, config, || true)
}

// ============================================================================
// Per-file and batch drivers
// ============================================================================

/// Output path for a translated drawing: `<stem>_translated.dxf` under
/// `output_dir`.
pub fn translated_output_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("drawing");
    output_dir.join(format!("{}_translated.dxf", stem))
}

/// Load, translate and save one drawing. Open and save failures mark the
/// document unsuccessful without panicking or aborting a batch.
pub fn translate_file(
    input: &Path,
    output_dir: &Path,
    map: &TranslationMap,
    config: &SubstitutionConfig,
) -> DocumentSummary {
    log::info!("processing {}", input.display());

    let mut doc = match load_document(input) {
        Ok(doc) => doc,
        Err(e) => {
            log::error!("cannot open {}: {}", input.display(), e);
            return DocumentSummary {
                file: input.to_path_buf(),
                counters: EntityCounters::default(),
                success: false,
                output_path: None,
                error_message: Some(e.to_string()),
            };
        }
    };

    let counters = translate_document(&mut doc, map, config);

    let output_path = translated_output_path(input, output_dir);
    match save_document(&doc, &output_path) {
        Ok(()) => {
            log::info!(
                "saved {} (processed {}, translated {}, skipped {}, errors {})",
                output_path.display(),
                counters.processed,
                counters.translated,
                counters.skipped,
                counters.errors
            );
            DocumentSummary {
                file: input.to_path_buf(),
                counters,
                success: true,
                output_path: Some(output_path),
                error_message: None,
            }
        }
        Err(e) => {
            log::error!("cannot save {}: {}", output_path.display(), e);
            DocumentSummary {
                file: input.to_path_buf(),
                counters,
                success: false,
                output_path: None,
                error_message: Some(e.to_string()),
            }
        }
    }
}

/// Recursively collect drawing files (.dxf, case-insensitive) under `dir`.
pub fn find_drawing_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_drawing_files(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_drawing_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_drawing_files(&path, files)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("dxf"))
            .unwrap_or(false)
        {
            files.push(path);
        }
    }
    Ok(())
}

/// Progress information reported after each document in a batch.
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub errors: usize,
}

/// Totals across one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub files: usize,
    pub succeeded: usize,
    pub counters: EntityCounters,
    pub documents: Vec<DocumentSummary>,
}

impl BatchSummary {
    fn from_documents(mut documents: Vec<DocumentSummary>) -> Self {
        documents.sort_by(|a, b| a.file.cmp(&b.file));
        let mut counters = EntityCounters::default();
        for doc in &documents {
            counters.absorb(&doc.counters);
        }
        Self {
            files: documents.len(),
            succeeded: documents.iter().filter(|d| d.success).count(),
            counters,
            documents,
        }
    }
}

/// Translate every drawing under `input_dir` in parallel, one worker owning
/// one document end to end.
///
/// `on_progress` is called after each document; return `false` to cancel.
/// Cancellation is cooperative: documents already in flight run to
/// completion, unstarted documents are skipped.
pub fn process_directory(
    input_dir: &Path,
    output_dir: &Path,
    map: &TranslationMap,
    config: &SubstitutionConfig,
    threads: Option<usize>,
    on_progress: impl Fn(&BatchProgress) -> bool + Sync,
) -> Result<BatchSummary> {
    if let Some(n) = threads {
        // The global pool can only be sized once per process.
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .ok();
    }

    std::fs::create_dir_all(output_dir)?;
    let files = find_drawing_files(input_dir)?;
    let total = files.len();
    log::info!("found {} drawing files under {}", total, input_dir.display());

    let completed = AtomicUsize::new(0);
    let error_docs = AtomicUsize::new(0);
    let cancelled = AtomicBool::new(false);
    let documents: Mutex<Vec<DocumentSummary>> = Mutex::new(Vec::new());

    files.par_iter().for_each(|file| {
        if cancelled.load(Ordering::Relaxed) {
            return;
        }

        let summary = translate_file(file, output_dir, map, config);
        if !summary.success {
            error_docs.fetch_add(1, Ordering::Relaxed);
        }
        documents.lock().unwrap().push(summary);

        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        let keep_going = on_progress(&BatchProgress {
            completed: done,
            total,
            errors: error_docs.load(Ordering::Relaxed),
        });
        if !keep_going {
            cancelled.store(true, Ordering::Relaxed);
        }
    });

    Ok(BatchSummary::from_documents(
        documents.into_inner().unwrap(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Block, Entity, MTextEntity};

    fn doc_with_text(text: &str, height: Option<f64>) -> Document {
        let mut doc = Document::new();
        let handle = doc.alloc_handle();
        doc.layout_mut(MODEL_LAYOUT)
            .unwrap()
            .entities
            .push(Entity::Text(TextEntity {
                handle,
                text: text.to_string(),
                insert: Some(Point3::new(5.0, 5.0, 0.0)),
                height,
                rotation: 0.0,
                style: None,
                layer: DEFAULT_LAYER.to_string(),
            }));
        doc
    }

    fn map_of(pairs: &[(&str, &str)]) -> TranslationMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn replace_config(font: &str) -> SubstitutionConfig {
        SubstitutionConfig {
            font_name: font.to_string(),
            replace_mode: true,
            font_size_reduction: 4.0,
        }
    }

    #[test]
    fn test_replace_mode_end_to_end() {
        let mut doc = doc_with_text("Hello World", Some(10.0));
        let map = map_of(&[("Hello World", "Bonjour le monde")]);
        let counters = translate_document(&mut doc, &map, &replace_config("Arial"));

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
        let style = doc.style("TranslatedStyle_Arial").unwrap();
        assert_eq!(style.font, "Arial");
        assert_eq!(style.width_factor, TRANSLATED_STYLE_WIDTH);
    }

    #[test]
    fn test_empty_map_skips_and_leaves_entity_unchanged() {
        let mut doc = doc_with_text("Hello World", Some(10.0));
        let map = TranslationMap::new();
        let counters = translate_document(&mut doc, &map, &replace_config("Arial"));

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
                assert_eq!(e.style, None);
            }
            other => panic!("expected TEXT, got {}", other.kind_name()),
        }
    }

    #[test]
    fn test_height_floor() {
        let mut doc = doc_with_text("限高", Some(3.0));
        let map = map_of(&[("限高", "Max height")]);
        translate_document(&mut doc, &map, &replace_config("Arial"));
        match &doc.modelspace().entities[0] {
            Entity::Text(e) => assert_eq!(e.height, Some(MIN_TEXT_HEIGHT)),
            other => panic!("expected TEXT, got {}", other.kind_name()),
        }
    }

    #[test]
    fn test_style_creation_is_idempotent_across_entities() {
        let mut doc = Document::new();
        for _ in 0..100 {
            let handle = doc.alloc_handle();
            doc.layout_mut(MODEL_LAYOUT)
                .unwrap()
                .entities
                .push(Entity::Text(TextEntity {
                    handle,
                    text: "泵房".to_string(),
                    insert: None,
                    height: Some(5.0),
                    rotation: 0.0,
                    style: None,
                    layer: DEFAULT_LAYER.to_string(),
                }));
        }
        let map = map_of(&[("泵房", "Pump house")]);
        let counters = translate_document(&mut doc, &map, &replace_config("Arial"));
        assert_eq!(counters.translated, 100);
        assert_eq!(
            doc.styles()
                .filter(|s| s.name == "TranslatedStyle_Arial")
                .count(),
            1
        );
    }

    #[test]
    fn test_new_entity_mode_replaces_mtext() {
        let mut doc = Document::new();
        let handle = doc.alloc_handle();
        let original_handle = handle.clone();
        doc.layout_mut(MODEL_LAYOUT)
            .unwrap()
            .entities
            .push(Entity::MText(MTextEntity {
                handle,
                content: r"\fSimSun;设计说明".to_string(),
                insert: Some(Point3::new(2.0, 3.0, 0.0)),
                char_height: Some(7.0),
                rotation: 15.0,
                style: None,
                layer: "NOTES".to_string(),
            }));

        let map = map_of(&[("设计说明", "Design notes")]);
        let config = SubstitutionConfig {
            font_name: "Arial".to_string(),
            replace_mode: false,
            font_size_reduction: 4.0,
        };
        let counters = translate_document(&mut doc, &map, &config);
        assert_eq!(counters.translated, 1);

        match &doc.modelspace().entities[0] {
            Entity::Text(e) => {
                assert_eq!(e.text, "Design notes");
                assert_eq!(e.insert, Some(Point3::new(2.0, 3.0, 0.0)));
                assert_eq!(e.height, Some(3.0));
                assert_eq!(e.rotation, 15.0);
                assert_eq!(e.layer, "NOTES");
                assert_ne!(e.handle, original_handle);
            }
            other => panic!("expected recreated TEXT, got {}", other.kind_name()),
        }
    }

    #[test]
    fn test_new_entity_mode_defaults() {
        let mut doc = doc_with_text("阀门间", None);
        match doc.layout_mut(MODEL_LAYOUT).unwrap().entities.get_mut(0) {
            Some(Entity::Text(e)) => e.insert = None,
            _ => unreachable!(),
        }
        let map = map_of(&[("阀门间", "Valve room")]);
        let config = SubstitutionConfig {
            replace_mode: false,
            ..replace_config("Arial")
        };
        translate_document(&mut doc, &map, &config);
        match &doc.modelspace().entities[0] {
            Entity::Text(e) => {
                assert_eq!(e.insert, Some(Point3::ORIGIN));
                // 2.5 default minus 4, floored.
                assert_eq!(e.height, Some(MIN_TEXT_HEIGHT));
            }
            other => panic!("expected TEXT, got {}", other.kind_name()),
        }
    }

    #[test]
    fn test_blocks_and_layouts_are_walked() {
        let mut doc = Document::new();
        let layout_handle = doc.alloc_handle();
        doc.ensure_layout("Layout1")
            .entities
            .push(Entity::Text(TextEntity {
                handle: layout_handle,
                text: "图框".to_string(),
                insert: None,
                height: Some(5.0),
                rotation: 0.0,
                style: None,
                layer: DEFAULT_LAYER.to_string(),
            }));
        let block_handle = doc.alloc_handle();
        doc.add_block(Block {
            name: "NOTES".to_string(),
            base: Point3::ORIGIN,
            entities: vec![Entity::Text(TextEntity {
                handle: block_handle,
                text: "图框".to_string(),
                insert: None,
                height: Some(5.0),
                rotation: 0.0,
                style: None,
                layer: DEFAULT_LAYER.to_string(),
            })],
        });
        let anon_handle = doc.alloc_handle();
        doc.add_block(Block {
            name: "*X17".to_string(),
            base: Point3::ORIGIN,
            entities: vec![Entity::Text(TextEntity {
                handle: anon_handle,
                text: "图框".to_string(),
                insert: None,
                height: Some(5.0),
                rotation: 0.0,
                style: None,
                layer: DEFAULT_LAYER.to_string(),
            })],
        });

        let map = map_of(&[("图框", "Title frame")]);
        let counters = translate_document(&mut doc, &map, &replace_config("Arial"));
        // Anonymous block entities are not visited.
        assert_eq!(counters.processed, 2);
        assert_eq!(counters.translated, 2);
    }

    #[test]
    fn test_cancellation_between_regions() {
        let mut doc = doc_with_text("大门", Some(5.0));
        let layout_handle = doc.alloc_handle();
        doc.ensure_layout("Layout1")
            .entities
            .push(Entity::Text(TextEntity {
                handle: layout_handle,
                text: "大门".to_string(),
                insert: None,
                height: Some(5.0),
                rotation: 0.0,
                style: None,
                layer: DEFAULT_LAYER.to_string(),
            }));

        let map = map_of(&[("大门", "Gate")]);
        let mut allowed = 1;
        let counters =
            translate_document_cancellable(&mut doc, &map, &replace_config("Arial"), || {
                if allowed == 0 {
                    false
                } else {
                    allowed -= 1;
                    true
                }
            });
        // Only the model region ran before cancellation.
        assert_eq!(counters.processed, 1);
    }

    #[test]
    fn test_translate_file_and_batch() {
        let dir = tempfile::tempdir().unwrap();
        let input_dir = dir.path().join("drawings");
        let nested = input_dir.join("site");
        std::fs::create_dir_all(&nested).unwrap();

        let doc = doc_with_text("水泵房", Some(8.0));
        crate::document::save_document(&doc, &input_dir.join("a.dxf")).unwrap();
        let doc = doc_with_text("水泵房", Some(8.0));
        crate::document::save_document(&doc, &nested.join("b.dxf")).unwrap();
        // A file that cannot be opened structurally.
        std::fs::write(input_dir.join("broken.dxf"), "  0\nSECTION\n  9\nnope\n").unwrap();

        let map = map_of(&[("水泵房", "Pump station")]);
        let output_dir = dir.path().join("translated");
        let summary = process_directory(
            &input_dir,
            &output_dir,
            &map,
            &replace_config("Arial"),
            None,
            |_| true,
        )
        .unwrap();

        assert_eq!(summary.files, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.counters.translated, 2);
        // Failed documents contribute zero counters but are flagged failed.
        let failed: Vec<_> = summary.documents.iter().filter(|d| !d.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].counters, EntityCounters::default());

        let translated = output_dir.join("a_translated.dxf");
        let reloaded = load_document(&translated).unwrap();
        match &reloaded.modelspace().entities[0] {
            Entity::Text(e) => {
                assert_eq!(e.text, "Pump station");
                assert_eq!(e.height, Some(4.0));
            }
            other => panic!("expected TEXT, got {}", other.kind_name()),
        }
    }
}
