use anyhow::{bail, Context, Result};
use duckdb::Connection;
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Target string that selects an in-memory database.
pub const MEMORY: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Memory,
    File(PathBuf),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Memory => f.write_str(MEMORY),
            Location::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// The DuckDB database that receives one table per source.
///
/// Owned by the caller and handed to the pipeline by reference; statements
/// run one at a time on the single connection.
pub struct Destination {
    conn: Connection,
    location: Location,
}

impl Destination {
    /// Open `target` (a file path or `:memory:`).
    ///
    /// A file that cannot be opened is logged and replaced by an in-memory
    /// database, so the run can go on.
    pub fn open(target: &str) -> Result<Self> {
        if target.is_empty() || target == MEMORY {
            return Self::open_in_memory();
        }

        match Connection::open(target) {
            Ok(conn) => {
                info!(path = target, "using database file");
                Ok(Self {
                    conn,
                    location: Location::File(PathBuf::from(target)),
                })
            }
            Err(err) => {
                warn!(path = target, error = %err, "cannot open database file, using an in-memory database instead");
                Self::open_in_memory()
            }
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory DuckDB")?;
        Ok(Self {
            conn,
            location: Location::Memory,
        })
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create or replace `table` from a quoted, comma-separated file with a
    /// header line, letting DuckDB infer the column types.
    ///
    /// Returns the number of rows in the new table.
    pub fn replace_table_from_csv(&self, table: &str, csv_path: &Path) -> Result<u64> {
        let sql = format!(
            "CREATE OR REPLACE TABLE {} AS \
             SELECT * FROM read_csv({}, delim = ',', header = true, quote = '\"', auto_detect = true)",
            quote_ident(table),
            quote_literal(&csv_path.to_string_lossy()),
        );
        debug!(%sql, "loading table");
        self.conn
            .execute_batch(&sql)
            .with_context(|| format!("creating table {} from {}", table, csv_path.display()))?;

        self.row_count(table)
    }

    pub fn row_count(&self, table: &str) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row(
                &format!("SELECT count(*) FROM {}", quote_ident(table)),
                [],
                |row| row.get(0),
            )
            .with_context(|| format!("counting rows of {}", table))?;
        Ok(n as u64)
    }

    /// Names of the tables starting with `prefix`, sorted.
    pub fn table_names(&self, prefix: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE starts_with(table_name, ?) ORDER BY table_name",
        )?;
        let names = stmt
            .query_map([prefix], |row| row.get::<_, String>(0))?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("listing tables")?;
        Ok(names)
    }

    pub fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_name = ? ORDER BY ordinal_position",
        )?;
        let names = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<duckdb::Result<Vec<_>>>()
            .with_context(|| format!("reading columns of {}", table))?;
        Ok(names)
    }

    /// First `limit` rows of `table`, every value rendered as text.
    pub fn preview(&self, table: &str, limit: usize) -> Result<Vec<Vec<Option<String>>>> {
        let columns = self.column_names(table)?;
        if columns.is_empty() {
            bail!("table {} does not exist", table);
        }

        let select = columns
            .iter()
            .map(|c| format!("CAST({} AS VARCHAR)", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} LIMIT {}",
            select,
            quote_ident(table),
            limit
        );

        let width = columns.len();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, Option<String>>(i))
                    .collect::<duckdb::Result<Vec<_>>>()
            })?
            .collect::<duckdb::Result<Vec<_>>>()
            .with_context(|| format!("previewing {}", table))?;
        Ok(rows)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
