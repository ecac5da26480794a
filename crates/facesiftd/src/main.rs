use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod error;
mod routes;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facesiftd starting");

    let config = config::Config::load()?;
    server::run(config).await
}
