use anyhow::Result;
use clap::Parser;
use nwload::fetch::{self, NORTHWIND_BASE_URL, PREVIEW_SOURCES};
use nwload::logging;
use tracing::error;
use url::Url;

/// Print the first characters of a few remote CSV files.
#[derive(Parser, Debug)]
struct Args {
    /// URLs to inspect; defaults to a few Northwind files
    urls: Vec<String>,

    /// How many characters of each body to print
    #[arg(long, default_value_t = 500)]
    chars: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    logging::init();

    let args = Args::parse();
    let urls = if args.urls.is_empty() {
        let base = fetch::base_url(NORTHWIND_BASE_URL)?;
        PREVIEW_SOURCES
            .iter()
            .map(|s| fetch::source_url(&base, s).map(|u| u.to_string()))
            .collect::<Result<Vec<_>>>()?
    } else {
        args.urls
    };

    let client = fetch::build_client()?;
    for raw in urls {
        println!("\nInspecting {}:", raw);
        let url = match Url::parse(&raw) {
            Ok(u) => u,
            Err(e) => {
                error!(url = %raw, error = %e, "invalid URL");
                continue;
            }
        };
        match fetch::fetch_text(&client, &url).await {
            Ok(text) => println!("{}", fetch::preview(&text, args.chars)),
            Err(e) => error!(url = %url, error = %format!("{:#}", e), "fetch failed"),
        }
    }

    Ok(())
}
