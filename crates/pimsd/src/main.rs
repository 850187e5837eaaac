use anyhow::{Context, Result};
use pims_core::PersonStore;
use tracing_subscriber::EnvFilter;

mod api;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env()?;
    let store = PersonStore::open(&config.database_url).context("opening person store")?;
    tracing::info!(db = %store.url(), "pimsd starting");

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "pimsd ready");

    axum::serve(listener, api::router(store))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("pimsd shutting down");
    Ok(())
}
