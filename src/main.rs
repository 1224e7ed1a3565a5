use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use majic_core::{AppError, Config, ConfigError};
use majic_feed::FeedFetcher;

#[tokio::main]
async fn main() -> Result<()> {
    majic_core::init()?;

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        eprintln!("{}", e.user_message());
        return Err(e.into());
    }

    Ok(())
}

async fn run() -> Result<(), AppError> {
    let (config, _warnings) = Config::load_validated()?;

    let host: IpAddr = config
        .server
        .host
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("server.host: {}", e)))?;
    let addr = SocketAddr::new(host, config.server.port);

    let fetcher = FeedFetcher::new(&config.feed)
        .context("Failed to build the feed fetcher")?;

    tracing::info!(
        timeout_secs = config.feed.timeout_secs,
        "Majic calendar proxy starting"
    );

    majic_proxy::serve(fetcher, addr).await?;
    Ok(())
}
