//! Layer-name repair for drawings with invalid layer references.
//!
//! Some converters emit entities whose layer names carry characters the
//! format forbids, or no layer at all; both break saves in stricter tools.
//! The repair pass rewrites every such reference to a sanitized name.

use crate::document::{Document, DEFAULT_LAYER};
use lazy_static::lazy_static;
use regex::Regex;

/// Layer names are capped at this length.
const MAX_LAYER_NAME_LEN: usize = 255;

lazy_static! {
    static ref INVALID_LAYER_CHARS: Regex = Regex::new(r"[^\w\-_.]").unwrap();
}

/// Sanitize a layer name: strip invalid characters, fall back to the
/// default layer when nothing remains, prefix names that start with a
/// digit, and cap the length.
pub fn clean_layer_name(name: &str) -> String {
    let cleaned = INVALID_LAYER_CHARS.replace_all(name, "").into_owned();
    if cleaned.is_empty() || cleaned.chars().all(char::is_whitespace) {
        return DEFAULT_LAYER.to_string();
    }
    let cleaned = if cleaned.chars().next().is_some_and(|c| c.is_ascii_digit()) && cleaned != DEFAULT_LAYER
    {
        format!("Layer_{}", cleaned)
    } else {
        cleaned
    };
    cleaned.chars().take(MAX_LAYER_NAME_LEN).collect()
}

/// Rewrite every invalid layer reference in the document. Returns the
/// number of entities fixed.
pub fn fix_layer_names(doc: &mut Document) -> usize {
    let mut fixed = 0;

    let layout_names: Vec<String> = doc.layouts().map(|l| l.name.clone()).collect();
    for name in layout_names {
        if let Some(layout) = doc.layout_mut(&name) {
            for entity in layout.entities.iter_mut() {
                let original = entity.layer().to_string();
                let cleaned = clean_layer_name(&original);
                if cleaned != original {
                    log::info!(
                        "fixing {} layer {:?} -> {:?}",
                        entity.kind_name(),
                        original,
                        cleaned
                    );
                    entity.set_layer(&cleaned);
                    fixed += 1;
                }
            }
        }
    }

    let block_names: Vec<String> = doc.blocks().map(|b| b.name.clone()).collect();
    for name in block_names {
        if let Some(block) = doc.block_mut(&name) {
            for entity in block.entities.iter_mut() {
                let original = entity.layer().to_string();
                let cleaned = clean_layer_name(&original);
                if cleaned != original {
                    entity.set_layer(&cleaned);
                    fixed += 1;
                }
            }
        }
    }

    // Register the sanitized names so the layer table stays consistent.
    let mut referenced: Vec<String> = Vec::new();
    for layout in doc.layouts() {
        for entity in &layout.entities {
            referenced.push(entity.layer().to_string());
        }
    }
    for name in referenced {
        doc.ensure_layer(name);
    }

    fixed
}
