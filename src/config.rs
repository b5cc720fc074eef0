use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::fetch::{NORTHWIND_BASE_URL, NORTHWIND_SOURCES};
use crate::process::normalize::{Normalizer, ShortRowPolicy, DEFAULT_PLACEHOLDER};

/// Run settings. Every field has a default, so a YAML file only needs the
/// keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory URL the sources are fetched from.
    pub base_url: String,
    /// Source filenames, loaded in this order.
    pub sources: Vec<String>,
    /// Prepended to every derived table name.
    pub table_prefix: String,
    /// Replaces delimiters inside fields and joins overflow fields.
    pub placeholder: char,
    pub short_rows: ShortRowPolicy,
    /// Unprefixed table shown after the run, if any.
    pub preview_table: Option<String>,
    pub preview_rows: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: NORTHWIND_BASE_URL.to_string(),
            sources: NORTHWIND_SOURCES.iter().map(|s| s.to_string()).collect(),
            table_prefix: "nw_".to_string(),
            placeholder: DEFAULT_PLACEHOLDER,
            short_rows: ShortRowPolicy::Pad,
            preview_table: Some("customers".to_string()),
            preview_rows: 5,
        }
    }
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("parsing YAML configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading config {}", path.display()))
    }

    pub fn normalizer(&self) -> Result<Normalizer> {
        Normalizer::new(self.placeholder, self.short_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_cover_northwind() {
        let cfg = Config::default();
        assert_eq!(cfg.sources.len(), 8);
        assert_eq!(cfg.sources[3], "order-details.csv");
        assert_eq!(cfg.table_prefix, "nw_");
        assert_eq!(cfg.placeholder, ' ');
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() -> Result<()> {
        let cfg = Config::from_yaml_str(
            "placeholder: \"_\"\nshort_rows: drop\nsources:\n  - shippers.csv\n",
        )?;
        assert_eq!(cfg.placeholder, '_');
        assert_eq!(cfg.short_rows, ShortRowPolicy::Drop);
        assert_eq!(cfg.sources, vec!["shippers.csv"]);
        assert_eq!(cfg.base_url, NORTHWIND_BASE_URL);
        assert_eq!(cfg.preview_rows, 5);
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_yaml_str("placeholdr: x\n").is_err());
    }

    #[test]
    fn load_reads_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "table_prefix: demo_\npreview_table: null")?;
        let cfg = Config::load(file.path())?;
        assert_eq!(cfg.table_prefix, "demo_");
        assert_eq!(cfg.preview_table, None);
        Ok(())
    }

    #[test]
    fn delimiter_placeholder_fails_at_normalizer() -> Result<()> {
        let cfg = Config::from_yaml_str("placeholder: \",\"\n")?;
        assert!(cfg.normalizer().is_err());
        Ok(())
    }
}
