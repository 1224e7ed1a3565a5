//! Foreground calendar loader.

use std::time::Duration;

use majic_agent::AgentResponse;
use majic_core::{Config, NetworkError, ReqwestErrorExt};
use majic_feed::{sort_by_start, CalendarEvent};
use majic_proxy::ErrorBody;
use tracing::instrument;

use crate::error::ClientError;
use crate::retry::{with_retry, RetryConfig, RetryError, RetryStatus};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Calls the calendar endpoint and hands back events ordered by start.
pub struct ScheduleClient {
    client: reqwest::Client,
    url: String,
    retry: RetryConfig,
}

impl ScheduleClient {
    pub fn new(origin: &str, api_path: &str, retry: RetryConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NetworkError::ConnectionFailed(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}{}", origin.trim_end_matches('/'), api_path),
            retry,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::new(
            &config.agent.origin,
            &config.agent.api_path,
            RetryConfig::from_config(&config.client),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One attempt, no retries.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch_events(&self) -> Result<Vec<CalendarEvent>, ClientError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| e.into_network_error())?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| e.into_network_error())?;

        let events = decode_events(status, &body)?;
        tracing::debug!(count = events.len(), "Calendar loaded");
        Ok(events)
    }

    /// Load with retries. `on_status` receives a display line before each retry.
    pub async fn load_events<S>(
        &self,
        on_status: S,
    ) -> Result<Vec<CalendarEvent>, RetryError<ClientError>>
    where
        S: FnMut(&RetryStatus),
    {
        with_retry(&self.retry, on_status, || self.fetch_events()).await
    }
}

/// Decode an endpoint answer: an event array on 2xx, an `ErrorBody` otherwise.
pub fn decode_events(status: u16, body: &[u8]) -> Result<Vec<CalendarEvent>, ClientError> {
    if !(200..300).contains(&status) {
        return Err(match serde_json::from_slice::<ErrorBody>(body) {
            Ok(err) => ClientError::Api {
                status,
                error: err.error,
                details: err.details,
            },
            Err(_) => ClientError::Api {
                status,
                error: format!("Calendar request failed (HTTP {})", status),
                details: String::from_utf8_lossy(body).into_owned(),
            },
        });
    }

    let mut events: Vec<CalendarEvent> =
        serde_json::from_slice(body).map_err(|e| ClientError::InvalidPayload(e.to_string()))?;
    sort_by_start(&mut events);
    Ok(events)
}

/// Events from a response the caching agent served.
pub fn events_from_agent(response: &AgentResponse) -> Result<Vec<CalendarEvent>, ClientError> {
    decode_events(response.status, &response.body)
}
