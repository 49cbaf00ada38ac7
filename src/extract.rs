//! Multi-strategy text extraction.
//!
//! One strategy per structural region of a drawing (model space, paper-space
//! layouts, block definitions), plus a degenerate raw tag scan used as a
//! repair path when a drawing cannot be opened structurally. All strategies
//! run independently and their output is unioned, deduplicated and filtered
//! into the final record list.

use crate::document::{
    load_document, read_drawing_text, Document, Entity, EntityKind, Point3, MODEL_LAYOUT,
};
use crate::filter::{
    clean_text, is_meaningful_text, NoiseFilter, NoiseFilterConfig, TextFilter, TextFilterConfig,
};
use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

/// Group codes whose values may carry human-readable or label text in the
/// raw tag stream: primary text, extended text chunk, style name, layer name.
const RAW_TEXT_GROUP_CODES: &[i32] = &[1, 3, 7, 8];

// ============================================================================
// Data model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceRegion {
    ModelSpace,
    PaperSpace,
    BlockDefinition,
    RawRecord,
}

impl SourceRegion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceRegion::ModelSpace => "model_space",
            SourceRegion::PaperSpace => "paper_space",
            SourceRegion::BlockDefinition => "block_definitions",
            SourceRegion::RawRecord => "raw_tags",
        }
    }
}

/// One extracted piece of text with its provenance. Records from the raw
/// tag path carry no handle and no positional provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRecord {
    pub region: SourceRegion,
    pub handle: Option<String>,
    pub text: String,
    pub layer: String,
    pub position: Option<Point3>,
    pub height: f64,
    pub rotation: f64,
    pub style: String,
    pub kind: Option<EntityKind>,
}

impl TextRecord {
    fn raw(text: String) -> Self {
        Self {
            region: SourceRegion::RawRecord,
            handle: None,
            text,
            layer: String::new(),
            position: None,
            height: 0.0,
            rotation: 0.0,
            style: String::new(),
            kind: None,
        }
    }
}

/// Outcome of one strategy run. A failed strategy contributes no records
/// but never aborts its siblings.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub region: SourceRegion,
    pub records: Vec<TextRecord>,
    pub success: bool,
    pub error: Option<String>,
}

impl ExtractionResult {
    fn ok(region: SourceRegion, records: Vec<TextRecord>) -> Self {
        Self {
            region,
            records,
            success: true,
            error: None,
        }
    }

    fn failed(region: SourceRegion, error: String) -> Self {
        Self {
            region,
            records: Vec::new(),
            success: false,
            error: Some(error),
        }
    }
}

// ============================================================================
// MTEXT markup stripping
// ============================================================================

lazy_static! {
    // Inline control sequences: backslash, one letter, a run of
    // non-semicolon characters, semicolon. Deleted wholesale.
    static ref MTEXT_CONTROL: Regex = Regex::new(r"\\[A-Za-z][^;]*;").unwrap();
    // Brace-delimited grouping markers, deleted wholesale.
    static ref MTEXT_BRACES: Regex = Regex::new(r"\{[^}]*\}").unwrap();
}

/// Remove inline formatting codes from paragraph-text content.
pub fn strip_mtext_markup(content: &str) -> String {
    let stripped = MTEXT_CONTROL.replace_all(content, "");
    MTEXT_BRACES.replace_all(&stripped, "").trim().to_string()
}

// ============================================================================
// Strategies
// ============================================================================

/// A text extraction strategy over one structural region.
pub trait TextSource {
    fn region(&self) -> SourceRegion;
    fn extract(&self, doc: &Document) -> Result<Vec<TextRecord>>;
}

fn record_from_entity(entity: &Entity, region: SourceRegion) -> Vec<TextRecord> {
    let mut records = Vec::new();
    match entity {
        Entity::Text(e) => {
            let text = e.text.trim();
            if !text.is_empty() {
                records.push(TextRecord {
                    region,
                    handle: Some(e.handle.clone()),
                    text: text.to_string(),
                    layer: e.layer.clone(),
                    position: e.insert,
                    height: e.height.unwrap_or(0.0),
                    rotation: e.rotation,
                    style: e.style.clone().unwrap_or_default(),
                    kind: Some(EntityKind::Text),
                });
            }
        }
        Entity::MText(e) => {
            let text = strip_mtext_markup(&e.content);
            if !text.is_empty() {
                records.push(TextRecord {
                    region,
                    handle: Some(e.handle.clone()),
                    text,
                    layer: e.layer.clone(),
                    position: e.insert,
                    height: e.char_height.unwrap_or(0.0),
                    rotation: e.rotation,
                    style: e.style.clone().unwrap_or_default(),
                    kind: Some(EntityKind::MText),
                });
            }
        }
        Entity::Insert(e) => {
            for attrib in &e.attribs {
                let text = attrib.text.trim();
                if !text.is_empty() {
                    records.push(TextRecord {
                        region,
                        handle: Some(attrib.handle.clone()),
                        text: text.to_string(),
                        layer: attrib.layer.clone(),
                        position: attrib.insert,
                        height: attrib.height.unwrap_or(0.0),
                        rotation: attrib.rotation,
                        style: attrib.style.clone().unwrap_or_default(),
                        kind: Some(EntityKind::Attrib),
                    });
                }
            }
        }
        Entity::Dimension(e) => {
            // Dimensions with no override text display the measured value,
            // recorded as the conventional "<>" placeholder.
            let text = e
                .text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or("<>");
            records.push(TextRecord {
                region,
                handle: Some(e.handle.clone()),
                text: text.to_string(),
                layer: e.layer.clone(),
                position: None,
                height: e.text_height.unwrap_or(0.0),
                rotation: 0.0,
                style: e.dim_style.clone().unwrap_or_default(),
                kind: Some(EntityKind::Dimension),
            });
        }
        Entity::AttDef(_) | Entity::Other { .. } => {}
    }
    records
}

/// Scans the primary drawing area.
pub struct ModelSpaceSource;

impl TextSource for ModelSpaceSource {
    fn region(&self) -> SourceRegion {
        SourceRegion::ModelSpace
    }

    fn extract(&self, doc: &Document) -> Result<Vec<TextRecord>> {
        let mut records = Vec::new();
        for entity in &doc.modelspace().entities {
            records.extend(record_from_entity(entity, SourceRegion::ModelSpace));
        }
        Ok(records)
    }
}

/// Scans every named layout except the reserved primary one.
pub struct PaperSpaceSource;

impl TextSource for PaperSpaceSource {
    fn region(&self) -> SourceRegion {
        SourceRegion::PaperSpace
    }

    fn extract(&self, doc: &Document) -> Result<Vec<TextRecord>> {
        let mut records = Vec::new();
        for layout in doc.paper_layouts() {
            debug_assert_ne!(layout.name, MODEL_LAYOUT);
            for entity in &layout.entities {
                records.extend(record_from_entity(entity, SourceRegion::PaperSpace));
            }
        }
        Ok(records)
    }
}

/// Scans named block definitions, skipping anonymous blocks. Attribute
/// definitions contribute both their default text and their tag name; the
/// tag record is value-keyed (no handle) so the two never collide in
/// handle-based deduplication.
pub struct BlockDefinitionSource;

impl TextSource for BlockDefinitionSource {
    fn region(&self) -> SourceRegion {
        SourceRegion::BlockDefinition
    }

    fn extract(&self, doc: &Document) -> Result<Vec<TextRecord>> {
        let mut records = Vec::new();
        for block in doc.blocks() {
            if block.is_anonymous() {
                continue;
            }
            for entity in &block.entities {
                match entity {
                    Entity::AttDef(attdef) => {
                        let default_text = attdef.default_text.trim();
                        if !default_text.is_empty() {
                            records.push(TextRecord {
                                region: SourceRegion::BlockDefinition,
                                handle: Some(attdef.handle.clone()),
                                text: default_text.to_string(),
                                layer: attdef.layer.clone(),
                                position: attdef.insert,
                                height: attdef.height.unwrap_or(0.0),
                                rotation: attdef.rotation,
                                style: String::new(),
                                kind: Some(EntityKind::AttDef),
                            });
                        }
                        let tag = attdef.tag.trim();
                        if !tag.is_empty() {
                            let mut record = TextRecord::raw(tag.to_string());
                            record.region = SourceRegion::BlockDefinition;
                            record.layer = attdef.layer.clone();
                            record.kind = Some(EntityKind::AttDef);
                            records.push(record);
                        }
                    }
                    other => {
                        records.extend(record_from_entity(other, SourceRegion::BlockDefinition));
                    }
                }
            }
        }
        Ok(records)
    }
}

/// Repair-path scan over the raw tag stream, used when structured parsing
/// fails. Values are vetted by the noise filter only; no schema knowledge,
/// no provenance.
pub fn extract_raw_tags(path: &Path) -> Result<Vec<TextRecord>> {
    let text = read_drawing_text(path)?;
    let lines: Vec<&str> = text.lines().collect();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    let mut i = 0;
    while i + 1 < lines.len() {
        let code = match lines[i].trim().parse::<i32>() {
            Ok(code) => code,
            Err(_) => {
                i += 2;
                continue;
            }
        };
        let value = lines[i + 1].trim();
        if RAW_TEXT_GROUP_CODES.contains(&code) && !value.is_empty() && is_meaningful_text(value) {
            seen.insert(value.to_string());
        }
        i += 2;
    }

    Ok(seen.into_iter().map(TextRecord::raw).collect())
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub filter: TextFilterConfig,
    pub noise: NoiseFilterConfig,
    /// Keep only records containing at least one CJK ideograph.
    pub cjk_only: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            filter: TextFilterConfig::default(),
            noise: NoiseFilterConfig::default(),
            cjk_only: false,
        }
    }
}

/// Aggregated output of one extraction run.
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub records: Vec<TextRecord>,
    /// Per-strategy results, in registration order.
    pub strategy_results: Vec<ExtractionResult>,
    /// Final record count per entity kind tag ("TEXT", "MTEXT", ...).
    pub stats: BTreeMap<String, usize>,
    /// True when the structured open failed and only the raw tag path ran.
    pub degraded: bool,
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

pub struct ExtractionEngine {
    filter: TextFilter,
    noise: NoiseFilter,
    cjk_only: bool,
}

impl ExtractionEngine {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        Ok(Self {
            filter: TextFilter::new(&config.filter)?,
            noise: NoiseFilter::new(config.noise.clone()),
            cjk_only: config.cjk_only,
        })
    }

    fn sources() -> Vec<Box<dyn TextSource>> {
        // Fixed, deterministic registration order.
        vec![
            Box::new(ModelSpaceSource),
            Box::new(PaperSpaceSource),
            Box::new(BlockDefinitionSource),
        ]
    }

    /// Run every structured strategy against an opened document.
    pub fn extract_document(&self, doc: &Document) -> ExtractionOutcome {
        let mut results = Vec::new();
        for source in Self::sources() {
            let region = source.region();
            let result = match source.extract(doc) {
                Ok(records) => {
                    log::debug!(
                        "{} extracted {} candidate records",
                        region.as_str(),
                        records.len()
                    );
                    ExtractionResult::ok(region, records)
                }
                Err(e) => {
                    log::warn!("{} extraction failed: {}", region.as_str(), e);
                    ExtractionResult::failed(region, e.to_string())
                }
            };
            results.push(result);
        }
        self.finish(results, false)
    }

    /// Open a drawing file and extract. A structural parse failure falls
    /// back to the raw tag scan, with reduced result quality (no layer,
    /// position or style provenance).
    pub fn extract_file(&self, path: &Path) -> ExtractionOutcome {
        match load_document(path) {
            Ok(doc) => self.extract_document(&doc),
            Err(e) => {
                log::warn!(
                    "structured parse of {} failed ({}); falling back to raw tag scan, \
                     result quality reduced",
                    path.display(),
                    e
                );
                let result = match extract_raw_tags(path) {
                    Ok(records) => {
                        ExtractionResult::ok(SourceRegion::RawRecord, records)
                    }
                    Err(e) => {
                        log::error!("raw tag scan of {} failed: {}", path.display(), e);
                        ExtractionResult::failed(SourceRegion::RawRecord, e.to_string())
                    }
                };
                self.finish(vec![result], true)
            }
        }
    }

    /// Union, clean, filter and deduplicate the per-strategy results.
    fn finish(&self, results: Vec<ExtractionResult>, degraded: bool) -> ExtractionOutcome {
        let mut seen_handles: HashSet<String> = HashSet::new();
        let mut seen_values: HashSet<String> = HashSet::new();
        let mut records: Vec<TextRecord> = Vec::new();

        for result in results.iter().filter(|r| r.success) {
            for record in &result.records {
                let cleaned = clean_text(&record.text);
                // Every kept value passes both gates a final time; strategies
                // may feed values that bypassed per-strategy assumptions.
                if !self.noise.is_meaningful(&cleaned) || !self.filter.is_valid(&cleaned) {
                    continue;
                }
                if self.cjk_only && !contains_cjk(&cleaned) {
                    continue;
                }
                match record.handle {
                    Some(ref handle) if !handle.is_empty() => {
                        if !seen_handles.insert(handle.clone()) {
                            log::debug!("dropping duplicate handle {}", handle);
                            continue;
                        }
                        seen_values.insert(cleaned.clone());
                    }
                    _ => {
                        if !seen_values.insert(cleaned.clone()) {
                            continue;
                        }
                    }
                }
                let mut kept = record.clone();
                kept.text = cleaned;
                records.push(kept);
            }
        }

        let mut stats: BTreeMap<String, usize> = BTreeMap::new();
        for record in &records {
            let key = record
                .kind
                .map(|k| k.as_str().to_string())
                .unwrap_or_else(|| "RAW".to_string());
            *stats.entry(key).or_insert(0) += 1;
        }

        ExtractionOutcome {
            records,
            strategy_results: results,
            stats,
            degraded,
        }
    }
}
