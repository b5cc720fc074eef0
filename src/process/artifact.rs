use anyhow::{Context, Result};
use std::io::BufWriter;
use std::path::Path;
use tempfile::NamedTempFile;

use super::{normalize_csv, NormalizeSummary, Normalizer};

/// Normalized text parked in a temporary file for the bulk loader.
///
/// The file is removed when this value is dropped, whichever way the load
/// went.
#[derive(Debug)]
pub struct CleanedCsv {
    file: NamedTempFile,
    summary: NormalizeSummary,
}

impl CleanedCsv {
    /// Normalize `text` into a fresh temporary file.
    pub fn write(text: &str, normalizer: &Normalizer) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("nwload-")
            .suffix(".csv")
            .tempfile()
            .context("creating transient CSV file")?;

        let summary = normalize_csv(
            text.as_bytes(),
            BufWriter::new(file.as_file_mut()),
            normalizer,
        )?;

        Ok(Self { file, summary })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn summary(&self) -> &NormalizeSummary {
        &self.summary
    }

    /// Remove the file and keep only the counters.
    pub fn into_summary(self) -> NormalizeSummary {
        self.summary
    }
}
