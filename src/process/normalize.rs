use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Field delimiter of both the fetched text and the transient artifact.
pub const DELIMITER: char = ',';
/// Quote character of the transient artifact.
pub const QUOTE: char = '"';
pub const DEFAULT_PLACEHOLDER: char = ' ';

/// What to do with a data row that has fewer fields than the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ShortRowPolicy {
    /// Append empty fields until the row is as wide as the header.
    #[default]
    Pad,
    /// Discard the row.
    Drop,
    /// Abort the whole source.
    Fail,
}

/// Result of normalizing one raw row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFix {
    /// Row already had the header's width; only field content was scrubbed.
    Clean(Vec<String>),
    /// Overflow fields were merged into the last column.
    Merged(Vec<String>),
    /// Row was short and got empty trailing fields.
    Padded(Vec<String>),
    /// Row was short and discarded.
    Dropped,
}

impl RowFix {
    pub fn fields(&self) -> Option<&[String]> {
        match self {
            RowFix::Clean(f) | RowFix::Merged(f) | RowFix::Padded(f) => Some(f),
            RowFix::Dropped => None,
        }
    }

    pub fn into_fields(self) -> Option<Vec<String>> {
        match self {
            RowFix::Clean(f) | RowFix::Merged(f) | RowFix::Padded(f) => Some(f),
            RowFix::Dropped => None,
        }
    }
}

/// Reshapes raw rows so every row matches the header width.
///
/// Delimiters found inside a field are swapped for the placeholder. Rows
/// wider than the header keep their first `width - 1` fields and fold the
/// rest into the last one, joined by the placeholder. Rows narrower than the
/// header follow the [`ShortRowPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    placeholder: char,
    short_rows: ShortRowPolicy,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            placeholder: DEFAULT_PLACEHOLDER,
            short_rows: ShortRowPolicy::default(),
        }
    }
}

impl Normalizer {
    pub fn new(placeholder: char, short_rows: ShortRowPolicy) -> Result<Self> {
        if placeholder == DELIMITER || placeholder == QUOTE {
            bail!(
                "placeholder {:?} clashes with the CSV delimiter or quote character",
                placeholder
            );
        }
        Ok(Self {
            placeholder,
            short_rows,
        })
    }

    fn scrub(&self, field: &str) -> String {
        field
            .chars()
            .map(|c| if c == DELIMITER { self.placeholder } else { c })
            .collect()
    }

    /// Normalize one raw row against a header of `width` fields.
    pub fn normalize_row<S: AsRef<str>>(&self, width: usize, row: &[S]) -> Result<RowFix> {
        if width == 0 {
            bail!("header has no fields");
        }

        match row.len().cmp(&width) {
            Ordering::Equal => Ok(RowFix::Clean(
                row.iter().map(|f| self.scrub(f.as_ref())).collect(),
            )),
            Ordering::Greater => {
                let mut fields: Vec<String> = row[..width - 1]
                    .iter()
                    .map(|f| self.scrub(f.as_ref()))
                    .collect();

                let mut buf = [0u8; 4];
                let sep = self.placeholder.encode_utf8(&mut buf);
                let tail = row[width - 1..]
                    .iter()
                    .map(|f| f.as_ref())
                    .collect::<Vec<&str>>()
                    .join(&*sep);
                fields.push(tail);

                Ok(RowFix::Merged(fields))
            }
            Ordering::Less => {
                let mut fields: Vec<String> =
                    row.iter().map(|f| self.scrub(f.as_ref())).collect();
                match self.short_rows {
                    ShortRowPolicy::Pad => {
                        fields.resize(width, String::new());
                        Ok(RowFix::Padded(fields))
                    }
                    ShortRowPolicy::Drop => Ok(RowFix::Dropped),
                    ShortRowPolicy::Fail => bail!(
                        "row has {} fields but the header has {}",
                        row.len(),
                        width
                    ),
                }
            }
        }
    }
}

/// Normalize `rows` against `header`, preserving order.
///
/// Dropped rows are left out of the result.
pub fn normalize<H, I, R, F>(
    header: &[H],
    rows: I,
    normalizer: &Normalizer,
) -> Result<Vec<Vec<String>>>
where
    H: AsRef<str>,
    I: IntoIterator<Item = R>,
    R: AsRef<[F]>,
    F: AsRef<str>,
{
    let width = header.len();
    let mut out = Vec::new();
    for (idx, row) in rows.into_iter().enumerate() {
        let fix = normalizer
            .normalize_row(width, row.as_ref())
            .with_context(|| format!("data row {}", idx + 1))?;
        if let Some(fields) = fix.into_fields() {
            out.push(fields);
        }
    }
    Ok(out)
}
