//! In-memory drawing document model plus ASCII DXF load/save.
//!
//! The model is deliberately explicit about optional fields: every entity
//! kind is its own struct, and attributes that a kind may lack (style,
//! insertion point, height) are `Option`s instead of being probed at
//! runtime. Entities the translator does not care about are carried as
//! raw group-code/value tag runs so a loaded drawing can be written back
//! without losing them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reserved name of the primary (model space) layout.
pub const MODEL_LAYOUT: &str = "Model";

/// Default layer assigned when an entity carries none.
pub const DEFAULT_LAYER: &str = "0";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read drawing {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write drawing {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid drawing structure: {0}")]
    Invalid(String),
}

impl DocumentError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

// ============================================================================
// Geometry and entity types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const ORIGIN: Point3 = Point3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Tag identifying what kind of text-bearing entity a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Text,
    MText,
    Attrib,
    AttDef,
    Dimension,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Text => "TEXT",
            EntityKind::MText => "MTEXT",
            EntityKind::Attrib => "ATTRIB",
            EntityKind::AttDef => "ATTDEF",
            EntityKind::Dimension => "DIMENSION",
        }
    }
}

/// Single-line text entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEntity {
    pub handle: String,
    pub text: String,
    pub insert: Option<Point3>,
    pub height: Option<f64>,
    /// Rotation in degrees.
    pub rotation: f64,
    pub style: Option<String>,
    pub layer: String,
}

/// Paragraph text entity. `content` keeps the raw inline formatting codes;
/// callers strip them when they want the human-readable text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MTextEntity {
    pub handle: String,
    pub content: String,
    pub insert: Option<Point3>,
    pub char_height: Option<f64>,
    pub rotation: f64,
    pub style: Option<String>,
    pub layer: String,
}

/// Named text value attached to one block insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttribEntity {
    pub handle: String,
    pub tag: String,
    pub text: String,
    pub insert: Option<Point3>,
    pub height: Option<f64>,
    pub rotation: f64,
    pub style: Option<String>,
    pub layer: String,
}

/// Block insertion, possibly carrying attribute values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertEntity {
    pub handle: String,
    pub block_name: String,
    pub insert: Option<Point3>,
    pub rotation: f64,
    pub layer: String,
    pub attribs: Vec<AttribEntity>,
}

/// Attribute template living inside a block definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttDefEntity {
    pub handle: String,
    pub tag: String,
    pub default_text: String,
    pub prompt: Option<String>,
    pub insert: Option<Point3>,
    pub height: Option<f64>,
    pub rotation: f64,
    pub layer: String,
}

/// Dimension entity; only the text-bearing attributes are modeled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionEntity {
    pub handle: String,
    /// Override text; `None` means the measured value is displayed.
    pub text: Option<String>,
    pub dim_style: Option<String>,
    pub text_height: Option<f64>,
    pub layer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Entity {
    Text(TextEntity),
    MText(MTextEntity),
    Insert(InsertEntity),
    AttDef(AttDefEntity),
    Dimension(DimensionEntity),
    /// Any entity the translator does not model, carried verbatim as its
    /// raw tag run (excluding the leading `0`/kind pair).
    Other {
        kind: String,
        handle: String,
        layer: String,
        tags: Vec<(i32, String)>,
    },
}

impl Entity {
    pub fn handle(&self) -> &str {
        match self {
            Entity::Text(e) => &e.handle,
            Entity::MText(e) => &e.handle,
            Entity::Insert(e) => &e.handle,
            Entity::AttDef(e) => &e.handle,
            Entity::Dimension(e) => &e.handle,
            Entity::Other { handle, .. } => handle,
        }
    }

    pub fn layer(&self) -> &str {
        match self {
            Entity::Text(e) => &e.layer,
            Entity::MText(e) => &e.layer,
            Entity::Insert(e) => &e.layer,
            Entity::AttDef(e) => &e.layer,
            Entity::Dimension(e) => &e.layer,
            Entity::Other { layer, .. } => layer,
        }
    }

    pub fn set_layer(&mut self, name: &str) {
        match self {
            Entity::Text(e) => e.layer = name.to_string(),
            Entity::MText(e) => e.layer = name.to_string(),
            Entity::Insert(e) => e.layer = name.to_string(),
            Entity::AttDef(e) => e.layer = name.to_string(),
            Entity::Dimension(e) => e.layer = name.to_string(),
            Entity::Other { layer, tags, .. } => {
                *layer = name.to_string();
                for (code, value) in tags.iter_mut() {
                    if *code == 8 {
                        *value = name.to_string();
                    }
                }
            }
        }
    }

    pub fn kind_name(&self) -> &str {
        match self {
            Entity::Text(_) => "TEXT",
            Entity::MText(_) => "MTEXT",
            Entity::Insert(_) => "INSERT",
            Entity::AttDef(_) => "ATTDEF",
            Entity::Dimension(_) => "DIMENSION",
            Entity::Other { kind, .. } => kind,
        }
    }
}

// ============================================================================
// Regions, style table, document
// ============================================================================

/// One drawing region: the primary model space or a named paper-space tab.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    pub name: String,
    pub entities: Vec<Entity>,
}

impl Layout {
    pub fn is_model(&self) -> bool {
        self.name == MODEL_LAYOUT
    }
}

/// Named reusable template of entities; names starting with `*` denote
/// anonymous system blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub base: Point3,
    pub entities: Vec<Entity>,
}

impl Block {
    pub fn is_anonymous(&self) -> bool {
        self.name.starts_with('*')
    }
}

/// One record in the document's text style table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleRecord {
    pub name: String,
    pub font: String,
    pub width_factor: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    layouts: Vec<Layout>,
    blocks: Vec<Block>,
    styles: BTreeMap<String, StyleRecord>,
    layers: BTreeSet<String>,
    /// Header section tags carried verbatim from load to save.
    header: Vec<(i32, String)>,
    next_handle: u64,
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            next_handle: 0x100,
            ..Self::default()
        };
        doc.layouts.push(Layout {
            name: MODEL_LAYOUT.to_string(),
            entities: Vec::new(),
        });
        doc.layers.insert(DEFAULT_LAYER.to_string());
        doc
    }

    /// Allocate a fresh document-unique entity handle.
    pub fn alloc_handle(&mut self) -> String {
        let handle = format!("{:X}", self.next_handle);
        self.next_handle += 1;
        handle
    }

    pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
        self.layers.insert(name.as_ref().to_string());
    }

    pub fn layers(&self) -> impl Iterator<Item = &String> {
        self.layers.iter()
    }

    pub fn modelspace(&self) -> &Layout {
        // Constructed in new() and never removed.
        self.layouts
            .iter()
            .find(|l| l.is_model())
            .unwrap_or(&self.layouts[0])
    }

    pub fn layouts(&self) -> impl Iterator<Item = &Layout> {
        self.layouts.iter()
    }

    /// Paper-space layouts only, i.e. everything but the model region.
    pub fn paper_layouts(&self) -> impl Iterator<Item = &Layout> {
        self.layouts.iter().filter(|l| !l.is_model())
    }

    pub fn layout_mut(&mut self, name: &str) -> Option<&mut Layout> {
        self.layouts.iter_mut().find(|l| l.name == name)
    }

    /// Fetch a layout by name, creating an empty one if absent.
    pub fn ensure_layout(&mut self, name: &str) -> &mut Layout {
        if let Some(idx) = self.layouts.iter().position(|l| l.name == name) {
            return &mut self.layouts[idx];
        }
        self.layouts.push(Layout {
            name: name.to_string(),
            entities: Vec::new(),
        });
        self.layouts.last_mut().expect("layout just pushed")
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    pub fn block_mut(&mut self, name: &str) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.name == name)
    }

    pub fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn has_style(&self, name: &str) -> bool {
        self.styles.contains_key(name)
    }

    pub fn style(&self, name: &str) -> Option<&StyleRecord> {
        self.styles.get(name)
    }

    pub fn styles(&self) -> impl Iterator<Item = &StyleRecord> {
        self.styles.values()
    }

    /// Check-then-create style insertion: a second call with the same name
    /// leaves the existing record untouched.
    pub fn ensure_style(&mut self, name: &str, font: &str, width_factor: f64) {
        self.styles
            .entry(name.to_string())
            .or_insert_with(|| StyleRecord {
                name: name.to_string(),
                font: font.to_string(),
                width_factor,
            });
    }

    /// Count of entities across all layouts and blocks.
    pub fn entity_count(&self) -> usize {
        self.layouts
            .iter()
            .map(|l| l.entities.len())
            .chain(self.blocks.iter().map(|b| b.entities.len()))
            .sum()
    }
}

// ============================================================================
// Tolerant text decoding
// ============================================================================

/// Decode drawing bytes as UTF-8, falling back to GB18030 and finally to
/// lossy UTF-8. Drawings exported by Chinese CAD installs are routinely
/// GBK-encoded; invalid bytes must never abort a load.
pub fn decode_drawing_bytes(data: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(data) {
        return text.to_string();
    }
    let (decoded, _, had_errors) = encoding_rs::GB18030.decode(data);
    if !had_errors {
        return decoded.into_owned();
    }
    String::from_utf8_lossy(data).into_owned()
}

/// Read a drawing file into a tolerantly decoded string.
pub fn read_drawing_text(path: &Path) -> Result<String, DocumentError> {
    let data = std::fs::read(path).map_err(|source| DocumentError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decode_drawing_bytes(&data))
}

// ============================================================================
// Tag reader
// ============================================================================

/// Line-pair reader over the ASCII DXF tag stream: one integer group code
/// line followed by one value line, repeated.
pub struct TagReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> TagReader<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    pub fn next_pair(&mut self) -> Result<Option<(i32, String)>, DocumentError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }
        let code_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => return Ok(None),
        };
        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DocumentError::invalid(format!(
                    "file ends at line {} with a group code but no value",
                    self.line_number
                )));
            }
        };
        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DocumentError::invalid(format!(
                "group code {:?} at line {} is not an integer",
                code_line.trim(),
                self.line_number - 1
            ))
        })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    pub fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "double put_back on TagReader");
        self.buffer = Some(pair);
    }
}

// ============================================================================
// Loader
// ============================================================================

/// Load a drawing from disk into the structured model.
pub fn load_document(path: &Path) -> Result<Document, DocumentError> {
    let text = read_drawing_text(path)?;
    parse_document(&text)
}

/// Parse an ASCII DXF tag stream into the structured model.
pub fn parse_document(source: &str) -> Result<Document, DocumentError> {
    let mut reader = TagReader::new(source);
    let mut doc = Document::new();
    let mut max_handle: u64 = doc.next_handle;

    while let Some((code, value)) = reader.next_pair()? {
        if code != 0 {
            continue;
        }
        match value.trim() {
            "SECTION" => {
                let name = match reader.next_pair()? {
                    Some((2, name)) => name.trim().to_string(),
                    _ => return Err(DocumentError::invalid("SECTION without a name tag")),
                };
                match name.as_str() {
                    "HEADER" => parse_header(&mut reader, &mut doc)?,
                    "ENTITIES" => parse_entities(&mut reader, &mut doc, &mut max_handle)?,
                    "BLOCKS" => parse_blocks(&mut reader, &mut doc, &mut max_handle)?,
                    "TABLES" => parse_tables(&mut reader, &mut doc)?,
                    _ => skip_section(&mut reader)?,
                }
            }
            "EOF" => break,
            _ => {}
        }
    }

    doc.next_handle = max_handle + 1;
    Ok(doc)
}

fn skip_section(reader: &mut TagReader) -> Result<(), DocumentError> {
    while let Some((code, value)) = reader.next_pair()? {
        if code == 0 && value.trim() == "ENDSEC" {
            return Ok(());
        }
    }
    Err(DocumentError::invalid("unterminated SECTION"))
}

fn parse_header(reader: &mut TagReader, doc: &mut Document) -> Result<(), DocumentError> {
    while let Some((code, value)) = reader.next_pair()? {
        if code == 0 && value.trim() == "ENDSEC" {
            return Ok(());
        }
        doc.header.push((code, value));
    }
    Err(DocumentError::invalid("unterminated HEADER section"))
}

fn parse_tables(reader: &mut TagReader, doc: &mut Document) -> Result<(), DocumentError> {
    // Only STYLE and LAYER records are lifted into the model; everything
    // else inside TABLES is skipped.
    while let Some((code, value)) = reader.next_pair()? {
        if code != 0 {
            continue;
        }
        match value.trim() {
            "ENDSEC" => return Ok(()),
            "STYLE" => parse_style_record(reader, doc)?,
            "LAYER" => parse_layer_record(reader, doc)?,
            _ => {}
        }
    }
    Err(DocumentError::invalid("unterminated TABLES section"))
}

fn parse_style_record(reader: &mut TagReader, doc: &mut Document) -> Result<(), DocumentError> {
    let mut name = None;
    let mut font = String::new();
    let mut width_factor = 1.0;
    while let Some((code, value)) = reader.next_pair()? {
        match code {
            0 => {
                reader.put_back((0, value));
                break;
            }
            2 => name = Some(value.trim().to_string()),
            3 => font = value.trim().to_string(),
            41 => width_factor = value.trim().parse::<f64>().unwrap_or(1.0),
            _ => {}
        }
    }
    if let Some(name) = name {
        doc.ensure_style(&name, &font, width_factor);
    }
    Ok(())
}

fn parse_layer_record(reader: &mut TagReader, doc: &mut Document) -> Result<(), DocumentError> {
    while let Some((code, value)) = reader.next_pair()? {
        match code {
            0 => {
                reader.put_back((0, value));
                break;
            }
            2 => doc.ensure_layer(value.trim()),
            _ => {}
        }
    }
    Ok(())
}

fn parse_blocks(
    reader: &mut TagReader,
    doc: &mut Document,
    max_handle: &mut u64,
) -> Result<(), DocumentError> {
    while let Some((code, value)) = reader.next_pair()? {
        if code != 0 {
            continue;
        }
        match value.trim() {
            "ENDSEC" => return Ok(()),
            "BLOCK" => {
                let block = parse_block_definition(reader, max_handle)?;
                doc.blocks.push(block);
            }
            _ => {}
        }
    }
    Err(DocumentError::invalid("unterminated BLOCKS section"))
}

fn parse_block_definition(
    reader: &mut TagReader,
    max_handle: &mut u64,
) -> Result<Block, DocumentError> {
    let mut name = String::new();
    let mut base = Point3::ORIGIN;
    let mut entities = Vec::new();

    // Block header tags until the first contained entity or ENDBLK.
    while let Some((code, value)) = reader.next_pair()? {
        match code {
            0 => {
                reader.put_back((0, value));
                break;
            }
            2 => name = value.trim().to_string(),
            10 => base.x = value.trim().parse().unwrap_or(0.0),
            20 => base.y = value.trim().parse().unwrap_or(0.0),
            30 => base.z = value.trim().parse().unwrap_or(0.0),
            _ => {}
        }
    }

    while let Some((code, value)) = reader.next_pair()? {
        if code != 0 {
            continue;
        }
        let kind = value.trim().to_string();
        if kind == "ENDBLK" {
            skip_entity_tags(reader)?;
            break;
        }
        let (entity, _space) = parse_entity(reader, &kind, max_handle)?;
        entities.push(entity);
    }

    Ok(Block {
        name,
        base,
        entities,
    })
}

fn skip_entity_tags(reader: &mut TagReader) -> Result<(), DocumentError> {
    while let Some((code, value)) = reader.next_pair()? {
        if code == 0 {
            reader.put_back((0, value));
            return Ok(());
        }
    }
    Ok(())
}

fn parse_entities(
    reader: &mut TagReader,
    doc: &mut Document,
    max_handle: &mut u64,
) -> Result<(), DocumentError> {
    while let Some((code, value)) = reader.next_pair()? {
        if code != 0 {
            continue;
        }
        let kind = value.trim().to_string();
        if kind == "ENDSEC" {
            return Ok(());
        }
        let (entity, space) = parse_entity(reader, &kind, max_handle)?;
        doc.ensure_layer(entity.layer());
        let layout_name = space.unwrap_or_else(|| MODEL_LAYOUT.to_string());
        doc.ensure_layout(&layout_name).entities.push(entity);
    }
    Err(DocumentError::invalid("unterminated ENTITIES section"))
}

/// Common per-entity fields recognized while scanning its tag run.
#[derive(Default)]
struct CommonTags {
    handle: Option<String>,
    layer: Option<String>,
    paper_space: bool,
    layout_name: Option<String>,
}

impl CommonTags {
    /// Layout the entity belongs to, if not the model region.
    fn space(&self) -> Option<String> {
        if let Some(ref name) = self.layout_name {
            if name != MODEL_LAYOUT {
                return Some(name.clone());
            }
        }
        if self.paper_space {
            return Some("Layout1".to_string());
        }
        None
    }

    fn note(&mut self, code: i32, value: &str) -> bool {
        match code {
            5 => self.handle = Some(value.trim().to_string()),
            8 => self.layer = Some(value.trim().to_string()),
            67 => self.paper_space = value.trim() == "1",
            410 => self.layout_name = Some(value.trim().to_string()),
            _ => return false,
        }
        true
    }
}

fn bump_handle(handle: &str, max_handle: &mut u64) {
    if let Ok(parsed) = u64::from_str_radix(handle.trim(), 16) {
        if parsed > *max_handle {
            *max_handle = parsed;
        }
    }
}

fn parse_entity(
    reader: &mut TagReader,
    kind: &str,
    max_handle: &mut u64,
) -> Result<(Entity, Option<String>), DocumentError> {
    match kind {
        "TEXT" => parse_text(reader, max_handle),
        "MTEXT" => parse_mtext(reader, max_handle),
        "INSERT" => parse_insert(reader, max_handle),
        "ATTDEF" => parse_attdef(reader, max_handle),
        "DIMENSION" => parse_dimension(reader, max_handle),
        _ => parse_other(reader, kind, max_handle),
    }
}

fn parse_text(
    reader: &mut TagReader,
    max_handle: &mut u64,
) -> Result<(Entity, Option<String>), DocumentError> {
    let mut common = CommonTags::default();
    let mut insert: Option<Point3> = None;
    let mut height = None;
    let mut rotation = 0.0;
    let mut style = None;
    let mut text = String::new();

    while let Some((code, value)) = reader.next_pair()? {
        if code == 0 {
            reader.put_back((0, value));
            break;
        }
        if common.note(code, &value) {
            continue;
        }
        match code {
            1 => text = value,
            7 => style = Some(value.trim().to_string()),
            10 => insert.get_or_insert(Point3::ORIGIN).x = value.trim().parse().unwrap_or(0.0),
            20 => insert.get_or_insert(Point3::ORIGIN).y = value.trim().parse().unwrap_or(0.0),
            30 => insert.get_or_insert(Point3::ORIGIN).z = value.trim().parse().unwrap_or(0.0),
            40 => height = value.trim().parse().ok(),
            50 => rotation = value.trim().parse().unwrap_or(0.0),
            _ => {}
        }
    }

    let handle = common.handle.clone().unwrap_or_default();
    bump_handle(&handle, max_handle);
    let space = common.space();
    Ok((
        Entity::Text(TextEntity {
            handle,
            text,
            insert,
            height,
            rotation,
            style,
            layer: common.layer.unwrap_or_else(|| DEFAULT_LAYER.to_string()),
        }),
        space,
    ))
}

fn parse_mtext(
    reader: &mut TagReader,
    max_handle: &mut u64,
) -> Result<(Entity, Option<String>), DocumentError> {
    let mut common = CommonTags::default();
    let mut insert: Option<Point3> = None;
    let mut char_height = None;
    let mut rotation = 0.0;
    let mut style = None;
    let mut content = String::new();

    while let Some((code, value)) = reader.next_pair()? {
        if code == 0 {
            reader.put_back((0, value));
            break;
        }
        if common.note(code, &value) {
            continue;
        }
        match code {
            // Code 3 carries continuation chunks preceding the final code 1.
            3 => content.push_str(&value),
            1 => content.push_str(&value),
            7 => style = Some(value.trim().to_string()),
            10 => insert.get_or_insert(Point3::ORIGIN).x = value.trim().parse().unwrap_or(0.0),
            20 => insert.get_or_insert(Point3::ORIGIN).y = value.trim().parse().unwrap_or(0.0),
            30 => insert.get_or_insert(Point3::ORIGIN).z = value.trim().parse().unwrap_or(0.0),
            40 => char_height = value.trim().parse().ok(),
            50 => rotation = value.trim().parse().unwrap_or(0.0),
            _ => {}
        }
    }

    let handle = common.handle.clone().unwrap_or_default();
    bump_handle(&handle, max_handle);
    let space = common.space();
    Ok((
        Entity::MText(MTextEntity {
            handle,
            content,
            insert,
            char_height,
            rotation,
            style,
            layer: common.layer.unwrap_or_else(|| DEFAULT_LAYER.to_string()),
        }),
        space,
    ))
}

fn parse_insert(
    reader: &mut TagReader,
    max_handle: &mut u64,
) -> Result<(Entity, Option<String>), DocumentError> {
    let mut common = CommonTags::default();
    let mut block_name = String::new();
    let mut insert: Option<Point3> = None;
    let mut rotation = 0.0;
    let mut has_attribs = false;

    while let Some((code, value)) = reader.next_pair()? {
        if code == 0 {
            reader.put_back((0, value));
            break;
        }
        if common.note(code, &value) {
            continue;
        }
        match code {
            2 => block_name = value.trim().to_string(),
            10 => insert.get_or_insert(Point3::ORIGIN).x = value.trim().parse().unwrap_or(0.0),
            20 => insert.get_or_insert(Point3::ORIGIN).y = value.trim().parse().unwrap_or(0.0),
            30 => insert.get_or_insert(Point3::ORIGIN).z = value.trim().parse().unwrap_or(0.0),
            50 => rotation = value.trim().parse().unwrap_or(0.0),
            66 => has_attribs = value.trim() == "1",
            _ => {}
        }
    }

    let mut attribs = Vec::new();
    if has_attribs {
        while let Some((code, value)) = reader.next_pair()? {
            if code != 0 {
                continue;
            }
            match value.trim() {
                "ATTRIB" => attribs.push(parse_attrib(reader, max_handle)?),
                "SEQEND" => {
                    skip_entity_tags(reader)?;
                    break;
                }
                other => {
                    let other = other.to_string();
                    reader.put_back((0, other));
                    break;
                }
            }
        }
    }

    let handle = common.handle.clone().unwrap_or_default();
    bump_handle(&handle, max_handle);
    let space = common.space();
    Ok((
        Entity::Insert(InsertEntity {
            handle,
            block_name,
            insert,
            rotation,
            layer: common.layer.unwrap_or_else(|| DEFAULT_LAYER.to_string()),
            attribs,
        }),
        space,
    ))
}

fn parse_attrib(reader: &mut TagReader, max_handle: &mut u64) -> Result<AttribEntity, DocumentError> {
    let mut common = CommonTags::default();
    let mut tag = String::new();
    let mut text = String::new();
    let mut insert: Option<Point3> = None;
    let mut height = None;
    let mut rotation = 0.0;
    let mut style = None;

    while let Some((code, value)) = reader.next_pair()? {
        if code == 0 {
            reader.put_back((0, value));
            break;
        }
        if common.note(code, &value) {
            continue;
        }
        match code {
            1 => text = value,
            2 => tag = value.trim().to_string(),
            7 => style = Some(value.trim().to_string()),
            10 => insert.get_or_insert(Point3::ORIGIN).x = value.trim().parse().unwrap_or(0.0),
            20 => insert.get_or_insert(Point3::ORIGIN).y = value.trim().parse().unwrap_or(0.0),
            30 => insert.get_or_insert(Point3::ORIGIN).z = value.trim().parse().unwrap_or(0.0),
            40 => height = value.trim().parse().ok(),
            50 => rotation = value.trim().parse().unwrap_or(0.0),
            _ => {}
        }
    }

    let handle = common.handle.unwrap_or_default();
    bump_handle(&handle, max_handle);
    Ok(AttribEntity {
        handle,
        tag,
        text,
        insert,
        height,
        rotation,
        style,
        layer: common.layer.unwrap_or_else(|| DEFAULT_LAYER.to_string()),
    })
}

fn parse_attdef(
    reader: &mut TagReader,
    max_handle: &mut u64,
) -> Result<(Entity, Option<String>), DocumentError> {
    let mut common = CommonTags::default();
    let mut tag = String::new();
    let mut default_text = String::new();
    let mut prompt = None;
    let mut insert: Option<Point3> = None;
    let mut height = None;
    let mut rotation = 0.0;

    while let Some((code, value)) = reader.next_pair()? {
        if code == 0 {
            reader.put_back((0, value));
            break;
        }
        if common.note(code, &value) {
            continue;
        }
        match code {
            1 => default_text = value,
            2 => tag = value.trim().to_string(),
            3 => prompt = Some(value),
            10 => insert.get_or_insert(Point3::ORIGIN).x = value.trim().parse().unwrap_or(0.0),
            20 => insert.get_or_insert(Point3::ORIGIN).y = value.trim().parse().unwrap_or(0.0),
            30 => insert.get_or_insert(Point3::ORIGIN).z = value.trim().parse().unwrap_or(0.0),
            40 => height = value.trim().parse().ok(),
            50 => rotation = value.trim().parse().unwrap_or(0.0),
            _ => {}
        }
    }

    let handle = common.handle.clone().unwrap_or_default();
    bump_handle(&handle, max_handle);
    let space = common.space();
    Ok((
        Entity::AttDef(AttDefEntity {
            handle,
            tag,
            default_text,
            prompt,
            insert,
            height,
            rotation,
            layer: common.layer.unwrap_or_else(|| DEFAULT_LAYER.to_string()),
        }),
        space,
    ))
}

fn parse_dimension(
    reader: &mut TagReader,
    max_handle: &mut u64,
) -> Result<(Entity, Option<String>), DocumentError> {
    let mut common = CommonTags::default();
    let mut text = None;
    let mut dim_style = None;
    let mut text_height = None;

    while let Some((code, value)) = reader.next_pair()? {
        if code == 0 {
            reader.put_back((0, value));
            break;
        }
        if common.note(code, &value) {
            continue;
        }
        match code {
            1 => {
                if !value.trim().is_empty() {
                    text = Some(value);
                }
            }
            3 => dim_style = Some(value.trim().to_string()),
            140 => text_height = value.trim().parse().ok(),
            _ => {}
        }
    }

    let handle = common.handle.clone().unwrap_or_default();
    bump_handle(&handle, max_handle);
    let space = common.space();
    Ok((
        Entity::Dimension(DimensionEntity {
            handle,
            text,
            dim_style,
            text_height,
            layer: common.layer.unwrap_or_else(|| DEFAULT_LAYER.to_string()),
        }),
        space,
    ))
}

fn parse_other(
    reader: &mut TagReader,
    kind: &str,
    max_handle: &mut u64,
) -> Result<(Entity, Option<String>), DocumentError> {
    let mut common = CommonTags::default();
    let mut tags = Vec::new();

    while let Some((code, value)) = reader.next_pair()? {
        if code == 0 {
            reader.put_back((0, value));
            break;
        }
        common.note(code, &value);
        tags.push((code, value));
    }

    let handle = common.handle.clone().unwrap_or_default();
    bump_handle(&handle, max_handle);
    let space = common.space();
    Ok((
        Entity::Other {
            kind: kind.to_string(),
            handle,
            layer: common.layer.unwrap_or_else(|| DEFAULT_LAYER.to_string()),
            tags,
        },
        space,
    ))
}

// ============================================================================
// Writer
// ============================================================================

/// Save the document as ASCII DXF.
pub fn save_document(doc: &Document, path: &Path) -> Result<(), DocumentError> {
    let text = render_document(doc);
    std::fs::write(path, text).map_err(|source| DocumentError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Render the document to an ASCII DXF tag stream.
pub fn render_document(doc: &Document) -> String {
    let mut out = String::new();

    push_tag(&mut out, 0, "SECTION");
    push_tag(&mut out, 2, "HEADER");
    if doc.header.is_empty() {
        push_tag(&mut out, 9, "$ACADVER");
        push_tag(&mut out, 1, "AC1015");
    } else {
        for (code, value) in &doc.header {
            push_tag(&mut out, *code, value);
        }
    }
    push_tag(&mut out, 0, "ENDSEC");

    push_tag(&mut out, 0, "SECTION");
    push_tag(&mut out, 2, "TABLES");
    push_tag(&mut out, 0, "TABLE");
    push_tag(&mut out, 2, "LAYER");
    push_tag(&mut out, 70, &doc.layers.len().to_string());
    for layer in &doc.layers {
        push_tag(&mut out, 0, "LAYER");
        push_tag(&mut out, 2, layer);
        push_tag(&mut out, 70, "0");
        push_tag(&mut out, 62, "7");
        push_tag(&mut out, 6, "CONTINUOUS");
    }
    push_tag(&mut out, 0, "ENDTAB");
    push_tag(&mut out, 0, "TABLE");
    push_tag(&mut out, 2, "STYLE");
    push_tag(&mut out, 70, &doc.styles.len().to_string());
    for style in doc.styles.values() {
        push_tag(&mut out, 0, "STYLE");
        push_tag(&mut out, 2, &style.name);
        push_tag(&mut out, 70, "0");
        push_tag(&mut out, 40, "0.0");
        push_tag(&mut out, 41, &format!("{}", style.width_factor));
        push_tag(&mut out, 50, "0.0");
        push_tag(&mut out, 71, "0");
        push_tag(&mut out, 42, "2.5");
        push_tag(&mut out, 3, &style.font);
    }
    push_tag(&mut out, 0, "ENDTAB");
    push_tag(&mut out, 0, "ENDSEC");

    push_tag(&mut out, 0, "SECTION");
    push_tag(&mut out, 2, "BLOCKS");
    for block in &doc.blocks {
        push_tag(&mut out, 0, "BLOCK");
        push_tag(&mut out, 8, DEFAULT_LAYER);
        push_tag(&mut out, 2, &block.name);
        push_tag(&mut out, 70, "0");
        push_tag(&mut out, 10, &format!("{}", block.base.x));
        push_tag(&mut out, 20, &format!("{}", block.base.y));
        push_tag(&mut out, 30, &format!("{}", block.base.z));
        for entity in &block.entities {
            render_entity(&mut out, entity, None);
        }
        push_tag(&mut out, 0, "ENDBLK");
        push_tag(&mut out, 8, DEFAULT_LAYER);
    }
    push_tag(&mut out, 0, "ENDSEC");

    push_tag(&mut out, 0, "SECTION");
    push_tag(&mut out, 2, "ENTITIES");
    for layout in &doc.layouts {
        let space = if layout.is_model() {
            None
        } else {
            Some(layout.name.as_str())
        };
        for entity in &layout.entities {
            render_entity(&mut out, entity, space);
        }
    }
    push_tag(&mut out, 0, "ENDSEC");
    push_tag(&mut out, 0, "EOF");

    out
}

fn push_tag(out: &mut String, code: i32, value: &str) {
    let _ = writeln!(out, "{:3}", code);
    let _ = writeln!(out, "{}", value);
}

fn push_point(out: &mut String, point: &Point3) {
    push_tag(out, 10, &format!("{}", point.x));
    push_tag(out, 20, &format!("{}", point.y));
    push_tag(out, 30, &format!("{}", point.z));
}

fn push_space(out: &mut String, space: Option<&str>) {
    if let Some(name) = space {
        push_tag(out, 67, "1");
        push_tag(out, 410, name);
    }
}

fn render_entity(out: &mut String, entity: &Entity, space: Option<&str>) {
    match entity {
        Entity::Text(e) => {
            push_tag(out, 0, "TEXT");
            push_tag(out, 5, &e.handle);
            push_tag(out, 8, &e.layer);
            push_space(out, space);
            if let Some(ref insert) = e.insert {
                push_point(out, insert);
            }
            if let Some(height) = e.height {
                push_tag(out, 40, &format!("{}", height));
            }
            push_tag(out, 1, &e.text);
            push_tag(out, 50, &format!("{}", e.rotation));
            if let Some(ref style) = e.style {
                push_tag(out, 7, style);
            }
        }
        Entity::MText(e) => {
            push_tag(out, 0, "MTEXT");
            push_tag(out, 5, &e.handle);
            push_tag(out, 8, &e.layer);
            push_space(out, space);
            if let Some(ref insert) = e.insert {
                push_point(out, insert);
            }
            if let Some(height) = e.char_height {
                push_tag(out, 40, &format!("{}", height));
            }
            push_tag(out, 1, &e.content);
            push_tag(out, 50, &format!("{}", e.rotation));
            if let Some(ref style) = e.style {
                push_tag(out, 7, style);
            }
        }
        Entity::Insert(e) => {
            push_tag(out, 0, "INSERT");
            push_tag(out, 5, &e.handle);
            push_tag(out, 8, &e.layer);
            push_space(out, space);
            if !e.attribs.is_empty() {
                push_tag(out, 66, "1");
            }
            push_tag(out, 2, &e.block_name);
            if let Some(ref insert) = e.insert {
                push_point(out, insert);
            }
            push_tag(out, 50, &format!("{}", e.rotation));
            for attrib in &e.attribs {
                push_tag(out, 0, "ATTRIB");
                push_tag(out, 5, &attrib.handle);
                push_tag(out, 8, &attrib.layer);
                if let Some(ref insert) = attrib.insert {
                    push_point(out, insert);
                }
                if let Some(height) = attrib.height {
                    push_tag(out, 40, &format!("{}", height));
                }
                push_tag(out, 1, &attrib.text);
                push_tag(out, 2, &attrib.tag);
                push_tag(out, 50, &format!("{}", attrib.rotation));
                if let Some(ref style) = attrib.style {
                    push_tag(out, 7, style);
                }
            }
            if !e.attribs.is_empty() {
                push_tag(out, 0, "SEQEND");
                push_tag(out, 8, &e.layer);
            }
        }
        Entity::AttDef(e) => {
            push_tag(out, 0, "ATTDEF");
            push_tag(out, 5, &e.handle);
            push_tag(out, 8, &e.layer);
            push_space(out, space);
            if let Some(ref insert) = e.insert {
                push_point(out, insert);
            }
            if let Some(height) = e.height {
                push_tag(out, 40, &format!("{}", height));
            }
            push_tag(out, 1, &e.default_text);
            if let Some(ref prompt) = e.prompt {
                push_tag(out, 3, prompt);
            }
            push_tag(out, 2, &e.tag);
            push_tag(out, 50, &format!("{}", e.rotation));
        }
        Entity::Dimension(e) => {
            push_tag(out, 0, "DIMENSION");
            push_tag(out, 5, &e.handle);
            push_tag(out, 8, &e.layer);
            push_space(out, space);
            if let Some(ref text) = e.text {
                push_tag(out, 1, text);
            }
            if let Some(ref dim_style) = e.dim_style {
                push_tag(out, 3, dim_style);
            }
            if let Some(text_height) = e.text_height {
                push_tag(out, 140, &format!("{}", text_height));
            }
        }
        Entity::Other { kind, tags, .. } => {
            push_tag(out, 0, kind);
            for (code, value) in tags {
                push_tag(out, *code, value);
            }
        }
    }
}
