//! Text validity filtering and cleanup.
//!
//! Two gates with different strictness: [`is_meaningful_text`] is the loose
//! classifier used while scanning raw tag streams (where no schema context
//! exists), and [`TextFilter`] is the stricter, configurable gate applied to
//! every value before it is accepted into the final extraction output.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Reserved layer names that never count as drawing text.
const RESERVED_LAYER_NAMES: &[&str] = &["0", "DEFPOINTS", "TEXT", "DIM", "HATCH"];

/// Naming-convention prefixes that mark a value as a layer name.
const LAYER_NAME_PREFIXES: &[&str] = &["LAYER_", "L_", "LAY_"];

/// Structural keywords and entity-type names that appear as tag values but
/// are never human text.
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SECTION", "ENDSEC", "HEADER", "CLASSES", "TABLES", "BLOCKS", "ENTITIES", "OBJECTS", "EOF",
    "LINE", "CIRCLE", "ARC", "TEXT", "MTEXT", "INSERT", "POLYLINE", "LWPOLYLINE", "POINT",
    "ELLIPSE", "SPLINE", "HATCH", "DIMENSION", "LEADER", "VIEWPORT", "ACDBTEXT", "ACDBMTEXT",
];

fn is_numeric_literal(value: &str) -> bool {
    value.parse::<f64>().is_ok()
}

/// Coordinate-like values: comma-separated groups of digits with optional
/// leading minus and at most one decimal point each.
fn is_coordinate_like(value: &str) -> bool {
    if !value.contains(',') {
        return false;
    }
    value.split(',').all(|part| {
        let part = part.strip_prefix('-').unwrap_or(part);
        !part.is_empty()
            && part.chars().filter(|c| *c == '.').count() <= 1
            && part.chars().all(|c| c.is_ascii_digit() || c == '.')
    })
}

fn is_hex_string(value: &str, max_len: usize) -> bool {
    !value.is_empty() && value.len() <= max_len && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Token lists the noise classifier rejects. Callers may substitute or
/// extend any of the lists; the defaults are the baseline behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseFilterConfig {
    pub reserved_layer_names: Vec<String>,
    pub layer_name_prefixes: Vec<String>,
    pub structural_keywords: Vec<String>,
}

impl Default for NoiseFilterConfig {
    fn default() -> Self {
        Self {
            reserved_layer_names: RESERVED_LAYER_NAMES.iter().map(|s| s.to_string()).collect(),
            layer_name_prefixes: LAYER_NAME_PREFIXES.iter().map(|s| s.to_string()).collect(),
            structural_keywords: STRUCTURAL_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Classifier separating meaningful drawing text from noise.
///
/// The rejection rules run in a fixed order and short-circuit: empty,
/// numeric literal, coordinate pattern, handle-like hex (len <= 8),
/// reserved layer name, short hex (len <= 4, redundant with the handle rule
/// but kept as written), structural keyword, then a minimum length of 2.
#[derive(Debug, Clone, Default)]
pub struct NoiseFilter {
    config: NoiseFilterConfig,
}

impl NoiseFilter {
    pub fn new(config: NoiseFilterConfig) -> Self {
        Self { config }
    }

    fn is_layer_name(&self, value: &str) -> bool {
        self.config.reserved_layer_names.iter().any(|n| n == value)
            || self
                .config
                .layer_name_prefixes
                .iter()
                .any(|p| value.starts_with(p.as_str()))
    }

    fn is_structural_keyword(&self, value: &str) -> bool {
        let upper = value.to_uppercase();
        self.config.structural_keywords.iter().any(|k| *k == upper)
    }

    pub fn is_meaningful(&self, value: &str) -> bool {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return false;
        }
        if is_numeric_literal(trimmed) {
            return false;
        }
        if is_coordinate_like(trimmed) {
            return false;
        }
        if is_hex_string(trimmed, 8) {
            return false;
        }
        if self.is_layer_name(trimmed) {
            return false;
        }
        if is_hex_string(trimmed, 4) {
            return false;
        }
        if self.is_structural_keyword(trimmed) {
            return false;
        }
        if trimmed.chars().count() < 2 {
            return false;
        }
        true
    }
}

lazy_static! {
    static ref BASELINE_NOISE_FILTER: NoiseFilter = NoiseFilter::default();
}

/// Classify a raw tag value with the baseline rule sets.
pub fn is_meaningful_text(value: &str) -> bool {
    BASELINE_NOISE_FILTER.is_meaningful(value)
}

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Collapse whitespace runs to single spaces and trim the ends.
pub fn clean_text(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

/// Default exclusion patterns for [`TextFilter`]: blank-only, pure
/// digits/signs/dots/spaces, single ASCII letter, pure hexadecimal, and
/// separator-only values.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    r"^\s*$",
    r"^[\d\.\-\+\s]*$",
    r"^[A-Za-z]$",
    r"^[A-Fa-f0-9]+$",
    r"^[\s\-_\.]+$",
];

/// Length-window and pattern-based filter applied at aggregation time.
/// Both the window and the pattern set are caller-configurable; the
/// defaults are the baseline behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextFilterConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub exclude_patterns: Vec<String>,
}

impl Default for TextFilterConfig {
    fn default() -> Self {
        Self {
            min_length: 1,
            max_length: 1000,
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

pub struct TextFilter {
    min_length: usize,
    max_length: usize,
    exclude: Vec<Regex>,
}

impl TextFilter {
    pub fn new(config: &TextFilterConfig) -> anyhow::Result<Self> {
        let exclude = config
            .exclude_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| anyhow::anyhow!("bad exclusion pattern {:?}: {}", p, e)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            min_length: config.min_length,
            max_length: config.max_length,
            exclude,
        })
    }

    /// True when the trimmed value passes the length window and matches no
    /// exclusion pattern.
    pub fn is_valid(&self, text: &str) -> bool {
        let trimmed = text.trim();
        let len = trimmed.chars().count();
        if len < self.min_length || len > self.max_length {
            return false;
        }
        !self.exclude.iter().any(|re| re.is_match(trimmed))
    }
}

impl Default for TextFilter {
    fn default() -> Self {
        // The baseline patterns are compile-checked constants.
        Self::new(&TextFilterConfig::default()).expect("default filter patterns are valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_whitespace() {
        assert!(!is_meaningful_text(""));
        assert!(!is_meaningful_text("   "));
        assert!(!is_meaningful_text("\t\n"));
    }

    #[test]
    fn test_rejects_numeric_literals() {
        assert!(!is_meaningful_text("42"));
        assert!(!is_meaningful_text("-3.75"));
        assert!(!is_meaningful_text("1e6"));
    }

    #[test]
    fn test_rejects_coordinates() {
        assert!(!is_meaningful_text("12.5,40.0"));
        assert!(!is_meaningful_text("-1,2,-3.5"));
        // A comma in prose is not a coordinate.
        assert!(is_meaningful_text("已完成,待审核"));
    }

    #[test]
    fn test_rejects_handles_and_short_hex() {
        assert!(!is_meaningful_text("1F2A"));
        assert!(!is_meaningful_text("DEADBEEF"));
        assert!(!is_meaningful_text("ff"));
        // Nine hex digits no longer look like a handle.
        assert!(is_meaningful_text("DEADBEEF1"));
    }

    #[test]
    fn test_rejects_layer_names_and_keywords() {
        assert!(!is_meaningful_text("DEFPOINTS"));
        assert!(!is_meaningful_text("LAYER_WALLS"));
        assert!(!is_meaningful_text("L_1"));
        assert!(!is_meaningful_text("mtext"));
        assert!(!is_meaningful_text("ENDSEC"));
    }

    #[test]
    fn test_rejects_single_characters() {
        assert!(!is_meaningful_text("字"));
        assert!(!is_meaningful_text("!"));
    }

    #[test]
    fn test_accepts_meaningful_phrases() {
        assert!(is_meaningful_text("总平面图"));
        assert!(is_meaningful_text("Hello World"));
        assert!(is_meaningful_text("电缆沟 2-2 剖面"));
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a \t b\n\nc  "), "a b c");
        assert_eq!(clean_text("single"), "single");
    }

    #[test]
    fn test_text_filter_window() {
        let filter = TextFilter::default();
        assert!(filter.is_valid("设计说明"));
        assert!(!filter.is_valid(""));
        assert!(!filter.is_valid("12345"));
        assert!(!filter.is_valid("A"));
        assert!(!filter.is_valid("ABCDEF"));
        assert!(!filter.is_valid("-_."));
        let long = "长".repeat(1001);
        assert!(!filter.is_valid(&long));
    }

    #[test]
    fn test_noise_filter_custom_token_lists() {
        let mut config = NoiseFilterConfig::default();
        config.reserved_layer_names.push("GRID".to_string());
        config.structural_keywords.push("WIPEOUT".to_string());
        let filter = NoiseFilter::new(config);
        assert!(!filter.is_meaningful("GRID"));
        assert!(!filter.is_meaningful("wipeout"));
        // The baseline classifier still accepts both.
        assert!(is_meaningful_text("GRID"));
        assert!(is_meaningful_text("wipeout"));
    }

    #[test]
    fn test_text_filter_custom_patterns() {
        let config = TextFilterConfig {
            min_length: 3,
            max_length: 10,
            exclude_patterns: vec![r"^DRAFT".to_string()],
        };
        let filter = TextFilter::new(&config).unwrap();
        assert!(!filter.is_valid("DRAFT v2"));
        assert!(!filter.is_valid("ab"));
        assert!(filter.is_valid("说明文字"));
    }
}
