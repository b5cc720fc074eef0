// src/process/mod.rs
use anyhow::{bail, Context, Result};
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use serde::Serialize;
use std::io::{Read, Write};
use tracing::{debug, trace, warn};

pub mod artifact;
pub mod normalize;
pub mod table_name;

pub use artifact::CleanedCsv;
pub use normalize::{normalize, Normalizer, RowFix, ShortRowPolicy};
pub use table_name::table_name;

/// A row whose shape was changed on the way through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRepair {
    /// Line of the row in the fetched text (the header is line 1).
    pub line: u64,
    pub original: Vec<String>,
    /// `None` when the row was dropped.
    pub repaired: Option<Vec<String>>,
}

/// How many repaired rows a summary keeps verbatim. The counters still cover
/// every row.
pub const MAX_RECORDED_REPAIRS: usize = 20;

/// Counters for one pass of [`normalize_csv`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeSummary {
    pub columns: usize,
    pub rows_read: u64,
    pub rows_written: u64,
    pub merged: u64,
    pub padded: u64,
    pub dropped: u64,
    /// The first [`MAX_RECORDED_REPAIRS`] repaired rows.
    pub repairs: Vec<RowRepair>,
}

/// Stream delimited text from `input` to `output`, reshaping every data row
/// to the header's width.
///
/// The header line is copied unchanged. Every output field is quoted.
pub fn normalize_csv<R: Read, W: Write>(
    input: R,
    output: W,
    normalizer: &Normalizer,
) -> Result<NormalizeSummary> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // raw rows may be wider or narrower than the header
        .from_reader(input);
    let mut wtr = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(output);

    let mut records = rdr.records();
    let header = match records.next() {
        Some(rec) => rec.context("reading header row")?,
        None => bail!("input has no header row"),
    };
    if header.is_empty() {
        bail!("header row has no fields");
    }
    wtr.write_record(&header).context("writing header row")?;

    let width = header.len();
    let mut summary = NormalizeSummary {
        columns: width,
        ..Default::default()
    };

    for result in records {
        let record = result.context("parsing CSV record")?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let fields: Vec<&str> = record.iter().collect();
        summary.rows_read += 1;

        let fix = normalizer
            .normalize_row(width, &fields)
            .with_context(|| format!("normalizing line {}", line))?;

        match &fix {
            RowFix::Clean(_) => trace!(line, "row kept"),
            RowFix::Merged(repaired) => {
                warn!(line, original = ?fields, repaired = ?repaired, "merged overflow fields");
                summary.merged += 1;
            }
            RowFix::Padded(repaired) => {
                debug!(line, original = ?fields, repaired = ?repaired, "padded short row");
                summary.padded += 1;
            }
            RowFix::Dropped => {
                warn!(line, original = ?fields, "dropped short row");
                summary.dropped += 1;
            }
        }
        if !matches!(fix, RowFix::Clean(_)) && summary.repairs.len() < MAX_RECORDED_REPAIRS {
            summary.repairs.push(RowRepair {
                line,
                original: fields.iter().map(|f| f.to_string()).collect(),
                repaired: fix.fields().map(<[String]>::to_vec),
            });
        }

        if let Some(out) = fix.into_fields() {
            wtr.write_record(&out)
                .with_context(|| format!("writing line {}", line))?;
            summary.rows_written += 1;
        }
    }

    wtr.flush().context("flushing normalized rows")?;
    Ok(summary)
}
