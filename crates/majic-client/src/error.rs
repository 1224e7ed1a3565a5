use majic_core::NetworkError;
use thiserror::Error;

use crate::retry::{RetryDecision, Retryable};

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// The endpoint answered with a non-2xx status.
    #[error("{error} (HTTP {status}): {details}")]
    Api {
        status: u16,
        error: String,
        details: String,
    },

    #[error("Unexpected calendar payload: {0}")]
    InvalidPayload(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Network(e) => e.status(),
            ClientError::InvalidPayload(_) => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ClientError::Network(e) => e.user_message().to_string(),
            ClientError::Api { error, .. } => error.clone(),
            ClientError::InvalidPayload(_) => {
                "Unable to load the calendar. Check your connection or the server.".to_string()
            }
        }
    }
}

impl Retryable for ClientError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            ClientError::Network(NetworkError::InvalidResponse(_)) => RetryDecision::NoRetry,
            ClientError::Network(NetworkError::ServerError { status, .. })
            | ClientError::Api { status, .. } => RetryDecision::for_status(*status),
            ClientError::Network(_) => RetryDecision::Retry,
            ClientError::InvalidPayload(_) => RetryDecision::NoRetry,
        }
    }
}
