//! Upstream calendar fetcher.

use std::future::Future;
use std::time::Duration;

use majic_core::{FeedConfig, ReqwestErrorExt};
use tracing::instrument;

use crate::error::FeedError;
use crate::window::FeedWindow;

/// Raw upstream document, alive only between fetch and normalization.
#[derive(Debug, Clone)]
pub struct RawFeed {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Anything able to produce the raw feed document.
pub trait FeedSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<RawFeed, FeedError>> + Send;
}

/// Single-shot GET against the upstream feed with a hard timeout.
///
/// Retries are the caller's business.
pub struct FeedFetcher {
    client: reqwest::Client,
    url_template: String,
    timeout: Duration,
}

impl FeedFetcher {
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        Self::build(
            &config.url_template,
            Duration::from_secs(config.timeout_secs),
            &config.user_agent,
        )
    }

    /// Fetcher for a fixed URL (no date placeholders needed).
    pub fn with_url(url: &str, timeout: Duration) -> Result<Self, FeedError> {
        Self::build(url, timeout, &FeedConfig::default().user_agent)
    }

    fn build(url_template: &str, timeout: Duration, user_agent: &str) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FeedError::Unknown(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            url_template: url_template.to_string(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn target_url(&self, window: FeedWindow) -> String {
        window.fill(&self.url_template)
    }

    /// Fetch the feed for the given date window.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch_window(&self, window: FeedWindow) -> Result<RawFeed, FeedError> {
        let url = self.target_url(window);
        tracing::info!(%url, first = %window.first, last = %window.last, "Fetching calendar feed");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::from(e.into_network_error()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                body = %preview(&body),
                "Calendar server answered with an error status"
            );
            return Err(FeedError::UpstreamHttpError {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::from(e.into_network_error()))?;

        tracing::info!(
            status = status.as_u16(),
            bytes = body.len(),
            "Calendar feed retrieved"
        );

        Ok(RawFeed {
            url,
            status: status.as_u16(),
            body,
        })
    }
}

impl FeedSource for FeedFetcher {
    fn fetch(&self) -> impl Future<Output = Result<RawFeed, FeedError>> + Send {
        self.fetch_window(FeedWindow::current())
    }
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
