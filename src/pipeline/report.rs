use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::process::NormalizeSummary;

/// A table that made it into the destination.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedTable {
    pub table: String,
    pub rows: u64,
    pub normalize: NormalizeSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Loaded(LoadedTable),
    Failed { reason: String },
    /// Not attempted because an earlier source failed under fail-fast.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub url: Option<String>,
    pub outcome: Outcome,
}

impl SourceReport {
    /// The loaded table name, or why there is none.
    pub fn result(&self) -> std::result::Result<&str, &str> {
        match &self.outcome {
            Outcome::Loaded(t) => Ok(t.table.as_str()),
            Outcome::Failed { reason } => Err(reason.as_str()),
            Outcome::Skipped => Err("skipped after an earlier failure"),
        }
    }
}

/// Everything one run did, source by source.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub destination: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
}

impl RunReport {
    pub fn loaded(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Loaded(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped))
    }

    /// True when every source was loaded.
    pub fn is_clean(&self) -> bool {
        self.loaded() == self.sources.len()
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.sources.iter().filter(|s| pred(&s.outcome)).count()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("creating report file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("writing report {}", path.display()))?;
        writer.flush().context("flushing report")
    }
}
