use anyhow::{bail, Result};
use clap::Parser;
use nwload::{
    config::Config,
    duck::{self, Destination},
    fetch, logging,
    pipeline::{self, RunOptions},
    process::ShortRowPolicy,
};
use std::path::PathBuf;
use tracing::{info, warn};

/// Fetch CSV sources, repair their rows, and load each one into a DuckDB table.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// DuckDB database file; `:memory:` keeps everything in memory
    #[arg(long, default_value = duck::MEMORY)]
    db: String,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory URL the sources are fetched from
    #[arg(long)]
    base_url: Option<String>,

    /// Character that replaces commas inside fields
    #[arg(long)]
    placeholder: Option<char>,

    /// What to do with rows shorter than the header
    #[arg(long, value_enum)]
    short_rows: Option<ShortRowPolicy>,

    /// Prefix for every created table
    #[arg(long)]
    prefix: Option<String>,

    /// Source filename to load (repeatable); replaces the configured list
    #[arg(long = "source")]
    sources: Vec<String>,

    /// Write the run report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Stop at the first source that fails
    #[arg(long, default_value_t = false)]
    fail_fast: bool,

    /// Exit with an error if any source failed
    #[arg(long, default_value_t = false)]
    strict: bool,
}

impl Args {
    fn resolve_config(&self) -> Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(url) = &self.base_url {
            cfg.base_url = url.clone();
        }
        if let Some(c) = self.placeholder {
            cfg.placeholder = c;
        }
        if let Some(policy) = self.short_rows {
            cfg.short_rows = policy;
        }
        if let Some(prefix) = &self.prefix {
            cfg.table_prefix = prefix.clone();
        }
        if !self.sources.is_empty() {
            cfg.sources = self.sources.clone();
        }
        Ok(cfg)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    logging::init();

    // ─── 2) configuration ────────────────────────────────────────────
    let args = Args::parse();
    let config = args.resolve_config()?;

    // ─── 3) destination ──────────────────────────────────────────────
    let dest = Destination::open(&args.db)?;
    info!(destination = %dest.location(), "destination ready");

    // ─── 4) fetch, normalize, load ───────────────────────────────────
    let client = fetch::build_client()?;
    let options = RunOptions {
        fail_fast: args.fail_fast,
    };
    let report = pipeline::run(&client, &dest, &config, options).await?;
    info!(
        loaded = report.loaded(),
        failed = report.failed(),
        skipped = report.skipped(),
        "run finished"
    );

    if let Some(path) = &args.report {
        report.write_json(path)?;
        info!(path = %path.display(), "wrote run report");
    }

    // ─── 5) show what landed ─────────────────────────────────────────
    println!("\nTables in the DuckDB database:");
    for name in dest.table_names(&config.table_prefix)? {
        println!("{}", name);
    }

    if let Some(table) = &config.preview_table {
        let table = format!("{}{}", config.table_prefix, table);
        println!("\nFirst {} rows of '{}':", config.preview_rows, table);
        match dest.preview(&table, config.preview_rows) {
            Ok(rows) => {
                for row in rows {
                    let cells: Vec<&str> = row
                        .iter()
                        .map(|v| v.as_deref().unwrap_or("NULL"))
                        .collect();
                    println!("({})", cells.join(", "));
                }
            }
            Err(e) => warn!(table = %table, error = %format!("{:#}", e), "preview failed"),
        }
    }

    if args.strict && !report.is_clean() {
        bail!(
            "{} of {} sources were not loaded",
            report.sources.len() - report.loaded(),
            report.sources.len()
        );
    }
    Ok(())
}
