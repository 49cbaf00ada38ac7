//! DXF Translate Toolkit
//!
//! Tools for translating the human-readable text inside CAD drawings:
//! extract every piece of drawing text into a spreadsheet, let a translator
//! fill in the target column, then back-fill the translations into the
//! drawing without disturbing unrelated structure.
//!
//! This library provides:
//! - `document`: in-memory drawing model with ASCII DXF load/save
//! - `filter`: text validity filtering and whitespace cleanup
//! - `extract`: multi-strategy text extraction with a raw-tag repair path
//! - `translate`: translation table loading and fuzzy source matching
//! - `backfill`: substitution engine and parallel batch driver
//! - `export`: translation workbook / CSV export
//! - `cleaner`: layer-name repair for damaged drawings
//!
//! Binaries:
//! - `dxf-translate`: extract / backfill / clean subcommands

pub mod backfill;
pub mod cleaner;
pub mod document;
pub mod export;
pub mod extract;
pub mod filter;
pub mod translate;

// Re-export the types most callers touch.
pub use backfill::{BatchSummary, DocumentSummary, EntityCounters, SubstitutionConfig};
pub use document::{Document, Entity, EntityKind};
pub use extract::{ExtractionConfig, ExtractionEngine, TextRecord};
pub use translate::{smart_match, MatchMethod, TranslationMap};
