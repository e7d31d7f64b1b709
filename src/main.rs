use anyhow::{Context, Result};
use blobscan::{
    config::AppConfig,
    routes::routes::{Outcome, dispatch},
    services::ListingClient,
};
use std::io;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup (stderr, so tables on stdout stay clean) ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;
    tracing::debug!("Starting blobscan with config: {:?}", cfg);

    // --- Shared HTTP client (anonymous, follows redirects) ---
    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;

    // --- List the container ---
    let objects = ListingClient::new(http.clone())
        .with_endpoint(cfg.endpoint.clone())
        .list(&cfg.account, &cfg.container)
        .await
        .with_context(|| format!("listing {}/{}", cfg.account, cfg.container))?;

    // --- Filter and run the selected mode ---
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match dispatch(&cfg, http, &objects, &mut out).await? {
        Outcome::Downloaded(report) if !report.failed.is_empty() => {
            tracing::warn!(
                "{} of {} downloads failed",
                report.failed.len(),
                report.scheduled
            );
        }
        _ => {}
    }

    Ok(())
}
