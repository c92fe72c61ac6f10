//! Deterministic preprocessing applied before calling the provider — and the
//! content-addressed cache key, which is deliberately computed from the
//! *raw*, pre-preprocessing text (spec §4.3).

use sha2::{Digest, Sha256};

use crate::document::{Document, DocumentType};

/// 1. trim, 2. tabs/newlines -> space, 3. collapse runs of spaces, 4. lowercase.
pub fn preprocess(text: &str) -> String {
    let trimmed = text.trim();
    let no_newlines: String = trimmed
        .chars()
        .map(|c| if c == '\t' || c == '\n' || c == '\r' { ' ' } else { c })
        .collect();

    let mut collapsed = String::with_capacity(no_newlines.len());
    let mut prev_space = false;
    for c in no_newlines.chars() {
        if c == ' ' {
            if !prev_space {
                collapsed.push(' ');
            }
            prev_space = true;
        } else {
            collapsed.push(c);
            prev_space = false;
        }
    }

    collapsed.to_ascii_lowercase()
}

/// Cache key: a 128-bit digest of the raw input, hex-encoded. Computed from
/// `text` *before* [`preprocess`] runs, so differently-cased inputs that
/// preprocess identically still occupy distinct cache entries.
pub fn cache_key(raw_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_text.as_bytes());
    let digest = hasher.finalize();
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

/// Document-type-specific augmentation of `content` with metadata-derived
/// tokens, applied before embedding (spec §4.3).
pub fn augmented_content(doc: &Document) -> String {
    match doc.doc_type {
        DocumentType::Schema => {
            let mut out = String::new();
            if let Some(table) = doc.metadata_str("table_name") {
                out.push_str("table: ");
                out.push_str(table);
                out.push(' ');
            }
            if let Some(columns) = doc.metadata_array("columns") {
                for col in columns {
                    let name = col.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                    let ty = col.get("type").and_then(|v| v.as_str()).unwrap_or_default();
                    out.push_str(&format!("column {name} type {ty} "));
                }
            }
            if let Some(relationships) = doc.metadata_array("relationships") {
                for rel in relationships {
                    if let Some(target) = rel.get("target_table").and_then(|v| v.as_str()) {
                        out.push_str(&format!("relates to {target} "));
                    }
                }
            }
            out.push_str(&doc.content);
            out
        }
        DocumentType::Query => {
            let mut out = String::new();
            if let Some(query_type) = doc.metadata_str("query_type") {
                out.push_str(&format!("type: {query_type} "));
            }
            if let Some(tables) = doc.metadata_array("tables") {
                let joined: Vec<&str> = tables.iter().filter_map(|v| v.as_str()).collect();
                out.push_str(&format!("tables: {} ", joined.join(", ")));
            }
            out.push_str(&doc.content);
            out
        }
        _ => doc.content.clone(),
    }
}
