// src/fetch/mod.rs

use anyhow::{bail, Context, Result};
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Where the Northwind CSV files live.
pub const NORTHWIND_BASE_URL: &str =
    "https://raw.githubusercontent.com/neo4j-contrib/northwind-neo4j/master/data/";

/// The files loaded by default, in load order.
pub static NORTHWIND_SOURCES: &[&str] = &[
    "categories.csv",
    "customers.csv",
    "employees.csv",
    "order-details.csv",
    "orders.csv",
    "products.csv",
    "shippers.csv",
    "suppliers.csv",
];

/// The files shown by `preview_sources` when no URL is given.
pub static PREVIEW_SOURCES: &[&str] = &["customers.csv", "orders.csv", "suppliers.csv"];

/// HTTP client shared by every download of a run.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")
}

/// Parse a base URL, treating it as a directory even without a trailing `/`.
pub fn base_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&with_slash).with_context(|| format!("parsing base URL {}", raw))
}

/// URL of one source under `base`. Absolute URLs are taken as they are.
pub fn source_url(base: &Url, name: &str) -> Result<Url> {
    if name.trim().is_empty() {
        bail!("source name is empty");
    }
    base.join(name)
        .with_context(|| format!("joining {} onto {}", name, base))
}

/// GET `url` and return the body as text.
pub async fn fetch_text(client: &Client, url: &Url) -> Result<String> {
    debug!(%url, "fetching");
    client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("non-success status from {}", url))?
        .text()
        .await
        .with_context(|| format!("reading text from {}", url))
}

/// At most `max_chars` characters from the start of `text`.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
