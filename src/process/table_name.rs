use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9_]+").expect("separator pattern should compile"));

/// Derive a table name from a source filename.
///
/// `order-details.csv` becomes `order_details`: the extension and any leading
/// path are dropped, the name is lowercased, and every run of characters
/// outside `[a-z0-9_]` turns into one underscore.
pub fn table_name(source: &str) -> Result<String> {
    let file_name = source.rsplit('/').next().unwrap_or(source);
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    let lowered = stem.to_lowercase();
    let name = SEPARATORS.replace_all(&lowered, "_");
    let name = name.trim_matches('_');
    if name.is_empty() {
        bail!("source {:?} does not yield a table name", source);
    }
    Ok(name.to_string())
}
