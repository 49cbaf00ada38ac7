//! Translation table loading and fuzzy source-string matching.
//!
//! The table is a plain source-to-target map built from any ordered rows of
//! cells (spreadsheet, CSV, in-memory). Matching tries the exact key first
//! and then a fixed cascade of whitespace normalizations, because
//! hand-edited spreadsheets routinely gain or lose incidental whitespace
//! relative to the extracted text.

use anyhow::Result;
use calamine::{open_workbook_auto, Data, Reader};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

/// Target cell values treated as "no translation provided".
const PLACEHOLDER_TARGETS: &[&str] = &["", "nan", "none", "null", "n/a", "na"];

/// Source-to-target translation mapping. Keys keep table row order, so the
/// normalization cascade scans them in the order the translator wrote them.
pub type TranslationMap = IndexMap<String, String>;

fn is_placeholder(target: &str) -> bool {
    let lowered = target.to_lowercase();
    PLACEHOLDER_TARGETS.contains(&lowered.as_str())
}

/// Build the mapping from ordered rows of cells.
///
/// Rows with 3 or more cells are read as (index 1 = source, index 2 =
/// target); rows with exactly 2 cells as (0, 1); shorter rows are skipped
/// with a warning. Blank and placeholder targets are dropped. A later valid
/// row for the same source overwrites the earlier one.
pub fn from_rows<R, C>(rows: R) -> TranslationMap
where
    R: IntoIterator<Item = Vec<C>>,
    C: AsRef<str>,
{
    let mut map = TranslationMap::new();
    for (row_num, row) in rows.into_iter().enumerate() {
        let (source, target) = if row.len() >= 3 {
            (row[1].as_ref(), row[2].as_ref())
        } else if row.len() == 2 {
            (row[0].as_ref(), row[1].as_ref())
        } else {
            log::warn!("skipping malformed translation row {}", row_num + 1);
            continue;
        };
        let source = source.trim().to_string();
        let target = target.trim();
        if target.is_empty() || is_placeholder(target) {
            log::debug!("skipping row {} with blank translation for {:?}", row_num + 1, source);
            continue;
        }
        map.insert(source, target.to_string());
    }
    map
}

/// Load a translation table from a CSV file. The first row is assumed to be
/// a header and skipped. A missing or unreadable file yields an empty map;
/// the caller decides whether that is fatal for the run.
pub fn load_csv(path: &Path) -> TranslationMap {
    let reader = match csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_path(path)
    {
        Ok(reader) => reader,
        Err(e) => {
            log::error!("cannot open translation table {}: {}", path.display(), e);
            return TranslationMap::new();
        }
    };
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.into_records() {
        match record {
            Ok(record) => rows.push(record.iter().map(|s| s.to_string()).collect()),
            Err(e) => log::warn!("skipping unreadable CSV row: {}", e),
        }
    }
    let map = from_rows(rows);
    log::info!(
        "loaded {} translation entries from {}",
        map.len(),
        path.display()
    );
    map
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{:.0}", f)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => format!("{}", dt),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}

/// Load a translation table from the first worksheet of an xlsx/xls
/// workbook. The first row is assumed to be a header and skipped. A missing
/// or unreadable file yields an empty map.
pub fn load_xlsx(path: &Path) -> TranslationMap {
    let mut workbook = match open_workbook_auto(path) {
        Ok(workbook) => workbook,
        Err(e) => {
            log::error!("cannot open translation workbook {}: {}", path.display(), e);
            return TranslationMap::new();
        }
    };
    let range = match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => range,
        Some(Err(e)) => {
            log::error!("cannot read worksheet in {}: {}", path.display(), e);
            return TranslationMap::new();
        }
        None => {
            log::error!("translation workbook {} has no worksheets", path.display());
            return TranslationMap::new();
        }
    };
    let rows: Vec<Vec<String>> = range
        .rows()
        .skip(1)
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();
    let map = from_rows(rows);
    log::info!(
        "loaded {} translation entries from {}",
        map.len(),
        path.display()
    );
    map
}

/// Load a translation table, picking the reader from the file extension.
pub fn load_table(path: &Path) -> Result<TranslationMap> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let map = match ext.as_str() {
        "csv" => load_csv(path),
        "xlsx" | "xls" | "xlsm" => load_xlsx(path),
        other => anyhow::bail!(
            "unsupported translation table format {:?} for {} (expected .csv or .xlsx)",
            other,
            path.display()
        ),
    };
    Ok(map)
}

// ============================================================================
// Smart matcher
// ============================================================================

/// How a match was found, carried into the substitution summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchMethod {
    /// Exact key lookup.
    Direct,
    /// Matched after a normalization; carries the method name and the
    /// original mapping key that matched.
    Normalized { method: &'static str, key: String },
    /// The key exists but its stored target is blank.
    EmptyTranslation,
    NoMatch,
}

impl MatchMethod {
    pub fn describe(&self) -> String {
        match self {
            MatchMethod::Direct => "direct".to_string(),
            MatchMethod::Normalized { method, key } => format!("{} ({})", method, key),
            MatchMethod::EmptyTranslation => "empty translation".to_string(),
            MatchMethod::NoMatch => "no match".to_string(),
        }
    }
}

lazy_static! {
    static ref ANY_WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

fn strip_all_whitespace(text: &str) -> String {
    ANY_WHITESPACE.replace_all(text, "").into_owned()
}

fn single_space(text: &str) -> String {
    ANY_WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn trim_only(text: &str) -> String {
    text.trim().to_string()
}

/// The normalization cascade, in the order it must be tried.
const NORMALIZATIONS: &[(&str, fn(&str) -> String)] = &[
    ("strip-all-whitespace", strip_all_whitespace),
    ("single-space", single_space),
    ("trim-only", trim_only),
];

/// Resolve `text` against the mapping.
///
/// Exact lookup wins outright; an exact hit on a blank stored target stops
/// the cascade (the key is already identified, falling through would match
/// the same key again). Otherwise each normalization is applied to the
/// input and compared against every key under the same normalization,
/// method-major: the whole mapping is scanned under one method before the
/// next method is tried, which fixes the tie-break when several keys could
/// match under different methods.
pub fn smart_match(text: &str, map: &TranslationMap) -> (Option<String>, MatchMethod) {
    if let Some(target) = map.get(text) {
        if target.trim().is_empty() {
            return (None, MatchMethod::EmptyTranslation);
        }
        return (Some(target.clone()), MatchMethod::Direct);
    }

    for (method, normalize) in NORMALIZATIONS.iter().copied() {
        let wanted = normalize(text);
        for (key, target) in map {
            if normalize(key) == wanted {
                if target.trim().is_empty() {
                    return (None, MatchMethod::EmptyTranslation);
                }
                log::debug!(
                    "matched {:?} via {} against key {:?}",
                    text,
                    method,
                    key
                );
                return (
                    Some(target.clone()),
                    MatchMethod::Normalized {
                        method,
                        key: key.clone(),
                    },
                );
            }
        }
    }

    (None, MatchMethod::NoMatch)
}
