//! Feed-specific error types.

use majic_core::NetworkError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum FeedError {
    /// DNS lookup failed or the connection was refused.
    #[error("Connection to calendar server failed: {0}")]
    ConnectionFailure(String),

    #[error("Calendar server did not answer in time")]
    Timeout,

    #[error("Calendar server returned HTTP {status}")]
    UpstreamHttpError { status: u16, body: String },

    #[error("Invalid calendar data: {0}")]
    ParseError(String),

    #[error("Unexpected feed error: {0}")]
    Unknown(String),
}

/// Failure classification without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ConnectionFailure,
    Timeout,
    UpstreamHttpError,
    ParseError,
    Unknown,
}

impl FeedError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ConnectionFailure(_) => FailureKind::ConnectionFailure,
            Self::Timeout => FailureKind::Timeout,
            Self::UpstreamHttpError { .. } => FailureKind::UpstreamHttpError,
            Self::ParseError(_) => FailureKind::ParseError,
            Self::Unknown(_) => FailureKind::Unknown,
        }
    }

    /// Status code reported by the upstream server, if it answered at all.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamHttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// User-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::ConnectionFailure(_) => "Calendar server unreachable.".to_string(),
            Self::Timeout => "Timed out while fetching the calendar.".to_string(),
            Self::UpstreamHttpError { status, .. } => {
                format!("Calendar server error ({})", status)
            }
            Self::ParseError(_) | Self::Unknown(_) => {
                "Unable to retrieve calendar data.".to_string()
            }
        }
    }

    /// Whether calling again later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailure(_) | Self::Timeout => true,
            Self::UpstreamHttpError { status, .. } => *status >= 500 || *status == 429,
            Self::ParseError(_) | Self::Unknown(_) => false,
        }
    }
}

impl From<NetworkError> for FeedError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::ConnectionFailed(msg) => Self::ConnectionFailure(msg),
            NetworkError::Timeout => Self::Timeout,
            NetworkError::ServerError { status, message } => Self::UpstreamHttpError {
                status,
                body: message,
            },
            NetworkError::InvalidResponse(msg) => Self::Unknown(msg),
        }
    }
}
