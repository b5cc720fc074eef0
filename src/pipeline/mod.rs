// src/pipeline/mod.rs

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use std::collections::HashMap;
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::duck::Destination;
use crate::fetch::{base_url, fetch_text, source_url};
use crate::process::{table_name, CleanedCsv, Normalizer};

pub mod report;

pub use report::{LoadedTable, Outcome, RunReport, SourceReport};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop at the first failed source and mark the rest as skipped.
    pub fail_fast: bool,
}

/// Where one source comes from and which table it lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: Url,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSource {
    pub source: String,
    pub target: std::result::Result<Target, String>,
}

/// Resolve URL and table for every configured source.
///
/// A source whose table name is already taken by an earlier source is
/// planned as failed, so it can never overwrite that table.
pub fn plan(config: &Config) -> Result<Vec<PlannedSource>> {
    let base = base_url(&config.base_url)?;
    let mut claimed: HashMap<String, &str> = HashMap::new();
    let mut planned = Vec::with_capacity(config.sources.len());

    for source in &config.sources {
        let target = resolve(&base, &config.table_prefix, source)
            .map_err(|e| format!("{:#}", e))
            .and_then(|t| match claimed.get(&t.table) {
                Some(earlier) => Err(format!(
                    "table {} is already claimed by source {}",
                    t.table, earlier
                )),
                None => {
                    claimed.insert(t.table.clone(), source);
                    Ok(t)
                }
            });

        if let Err(reason) = &target {
            warn!(source = %source, %reason, "source cannot be loaded");
        }
        planned.push(PlannedSource {
            source: source.clone(),
            target,
        });
    }

    Ok(planned)
}

fn resolve(base: &Url, prefix: &str, source: &str) -> Result<Target> {
    let url = source_url(base, source)?;
    let table = format!("{}{}", prefix, table_name(source)?);
    Ok(Target { url, table })
}

/// Normalize `text` and load it into `table`, replacing any previous table.
#[instrument(level = "info", skip(dest, text, normalizer), fields(bytes = text.len()))]
pub fn load_text(
    dest: &Destination,
    table: &str,
    text: &str,
    normalizer: &Normalizer,
) -> Result<LoadedTable> {
    let cleaned = CleanedCsv::write(text, normalizer)
        .with_context(|| format!("normalizing rows for {}", table))?;
    let rows = dest.replace_table_from_csv(table, cleaned.path())?;

    Ok(LoadedTable {
        table: table.to_string(),
        rows,
        normalize: cleaned.into_summary(),
    })
}

async fn load_source(
    client: &Client,
    dest: &Destination,
    target: &Target,
    normalizer: &Normalizer,
) -> Result<LoadedTable> {
    let text = fetch_text(client, &target.url).await?;
    load_text(dest, &target.table, &text, normalizer)
}

/// Fetch and load every configured source, one after the other.
///
/// Per-source failures end up in the report; only configuration problems
/// are returned as errors.
pub async fn run(
    client: &Client,
    dest: &Destination,
    config: &Config,
    options: RunOptions,
) -> Result<RunReport> {
    let normalizer = config.normalizer()?;
    let planned = plan(config)?;
    let started_at = Utc::now();
    info!(sources = planned.len(), destination = %dest.location(), "loading sources");

    let mut sources = Vec::with_capacity(planned.len());
    let mut halted = false;

    for PlannedSource { source, target } in planned {
        let url = target.as_ref().ok().map(|t| t.url.to_string());

        let outcome = if halted {
            Outcome::Skipped
        } else {
            match target {
                Err(reason) => Outcome::Failed { reason },
                Ok(target) => match load_source(client, dest, &target, &normalizer).await {
                    Ok(loaded) => {
                        info!(
                            source = %source,
                            table = %loaded.table,
                            rows = loaded.rows,
                            merged = loaded.normalize.merged,
                            padded = loaded.normalize.padded,
                            dropped = loaded.normalize.dropped,
                            "table created or replaced"
                        );
                        Outcome::Loaded(loaded)
                    }
                    Err(err) => {
                        let reason = format!("{:#}", err);
                        error!(source = %source, table = %target.table, %reason, "load failed");
                        Outcome::Failed { reason }
                    }
                },
            }
        };

        if options.fail_fast && matches!(outcome, Outcome::Failed { .. }) {
            halted = true;
        }
        sources.push(SourceReport {
            source,
            url,
            outcome,
        });
    }

    Ok(RunReport {
        destination: dest.location().to_string(),
        started_at,
        finished_at: Utc::now(),
        sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::build_client;
    use crate::process::ShortRowPolicy;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,nwload=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    const CUSTOMERS: &str = "\
customerID,companyName,city,country
ALFKI,Alfreds Futterkiste,Berlin,Germany
ANATR,Ana Trujillo Emparedados y helados,México D.F.,Mexico
AROUT,\"Around the Horn, Ltd\",London,UK
BERGS,Berglunds snabbköp,Luleå,Sweden,Extra
";

    fn config_with(sources: &[&str]) -> Config {
        Config {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            ..Config::default()
        }
    }

    #[test]
    fn default_plan_targets_prefixed_tables() -> Result<()> {
        let planned = plan(&Config::default())?;
        let tables: Vec<_> = planned
            .iter()
            .map(|p| p.target.as_ref().unwrap().table.as_str())
            .collect();
        assert_eq!(
            tables,
            vec![
                "nw_categories",
                "nw_customers",
                "nw_employees",
                "nw_order_details",
                "nw_orders",
                "nw_products",
                "nw_shippers",
                "nw_suppliers",
            ]
        );
        assert!(planned[3]
            .target
            .as_ref()
            .unwrap()
            .url
            .as_str()
            .ends_with("/data/order-details.csv"));
        Ok(())
    }

    #[test]
    fn colliding_table_names_fail_the_later_source() -> Result<()> {
        let planned = plan(&config_with(&["order-details.csv", "Order_Details.csv", "orders.csv"]))?;
        assert!(planned[0].target.is_ok());
        let reason = planned[1].target.as_ref().unwrap_err();
        assert!(reason.contains("nw_order_details"));
        assert!(reason.contains("order-details.csv"));
        assert!(planned[2].target.is_ok());
        Ok(())
    }

    #[test]
    fn load_text_repairs_rows_and_creates_table() -> Result<()> {
        init_test_logging();
        let dest = Destination::open_in_memory()?;
        let loaded = load_text(&dest, "nw_customers", CUSTOMERS, &Normalizer::default())?;

        assert_eq!(loaded.rows, 4);
        assert_eq!(loaded.normalize.merged, 1);
        assert_eq!(
            dest.column_names("nw_customers")?,
            vec!["customerID", "companyName", "city", "country"]
        );

        let rows = dest.preview("nw_customers", 5)?;
        assert_eq!(rows[2][1].as_deref(), Some("Around the Horn  Ltd"));
        assert_eq!(rows[3][3].as_deref(), Some("Sweden Extra"));
        Ok(())
    }

    #[test]
    fn load_text_failure_keeps_no_table() -> Result<()> {
        let dest = Destination::open_in_memory()?;
        let failing = Normalizer::new(' ', ShortRowPolicy::Fail)?;
        let err = load_text(&dest, "nw_broken", "a,b\n1\n", &failing).unwrap_err();
        assert!(format!("{:#}", err).contains("nw_broken"));
        assert!(dest.table_names("nw_")?.is_empty());
        Ok(())
    }

    #[test]
    fn fallback_destination_still_receives_every_table() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let bad = dir.path().join("no").join("such").join("dir.duckdb");
        let dest = Destination::open(&bad.to_string_lossy())?;
        assert_eq!(dest.location(), &crate::duck::Location::Memory);

        let normalizer = Normalizer::default();
        load_text(&dest, "nw_customers", CUSTOMERS, &normalizer)?;
        load_text(&dest, "nw_shippers", "shipperID,companyName\n1,Speedy Express\n", &normalizer)?;
        assert_eq!(dest.table_names("nw_")?, vec!["nw_customers", "nw_shippers"]);
        Ok(())
    }

    #[tokio::test]
    async fn fail_fast_skips_remaining_sources() -> Result<()> {
        let dest = Destination::open_in_memory()?;
        let client = build_client()?;
        let config = config_with(&["", "customers.csv", "orders.csv"]);

        let report = run(&client, &dest, &config, RunOptions { fail_fast: true }).await?;
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 2);
        assert!(report.sources[0].result().is_err());
        assert_eq!(report.destination, ":memory:");
        Ok(())
    }

    #[tokio::test]
    async fn invalid_placeholder_aborts_before_any_fetch() -> Result<()> {
        let dest = Destination::open_in_memory()?;
        let client = build_client()?;
        let config = Config {
            placeholder: '"',
            ..Config::default()
        };
        assert!(run(&client, &dest, &config, RunOptions::default()).await.is_err());
        Ok(())
    }

    /// Serve `files` over plain HTTP on a local port; any other path is a 404.
    /// Returns the base URL.
    async fn serve(files: &'static [(&'static str, &'static str)]) -> Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&buf);
                let path = request.split_whitespace().nth(1).unwrap_or("/");

                let (status, body) = match files.iter().find(|(name, _)| path == format!("/{}", name)) {
                    Some((_, body)) => ("200 OK", *body),
                    None => ("404 Not Found", "not found"),
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });

        Ok(format!("http://{}/", addr))
    }

    #[tokio::test]
    async fn run_records_fetch_failure_load_and_collision() -> Result<()> {
        init_test_logging();
        let base = serve(&[("good.csv", "id,name\n1,Acme,Inc\n2,\"Foo,Bar\"\n3\n")]).await?;
        let dest = Destination::open_in_memory()?;
        let client = Client::builder().no_proxy().build()?;
        let config = Config {
            base_url: base,
            ..config_with(&["missing.csv", "good.csv", "Good.csv"])
        };

        let report = run(&client, &dest, &config, RunOptions::default()).await?;
        assert_eq!(report.sources.len(), 3);
        assert_eq!(report.loaded(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.skipped(), 0);

        let missing = report.sources[0].result().unwrap_err();
        assert!(missing.contains("404"), "{}", missing);
        assert_eq!(report.sources[1].result(), Ok("nw_good"));
        let collision = report.sources[2].result().unwrap_err();
        assert!(collision.contains("already claimed"), "{}", collision);
        assert!(report.sources[2].url.is_none());

        match &report.sources[1].outcome {
            Outcome::Loaded(loaded) => {
                assert_eq!(loaded.rows, 3);
                assert_eq!(loaded.normalize.merged, 1);
                assert_eq!(loaded.normalize.padded, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(dest.table_names("nw_")?, vec!["nw_good"]);
        let rows = dest.preview("nw_good", 5)?;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![Some("1".to_string()), Some("Acme Inc".to_string())]);
        assert_eq!(rows[1], vec![Some("2".to_string()), Some("Foo Bar".to_string())]);
        assert_eq!(rows[2], vec![Some("3".to_string()), None]);
        Ok(())
    }
}
