//! Per-request outcome and its HTTP rendering.

use chrono::{SecondsFormat, Utc};
use majic_feed::{CalendarEvent, FailureKind, FeedError};
use serde::{Deserialize, Serialize};

/// Outcome of one proxy call. Built fresh for every request.
#[derive(Debug, Clone)]
pub enum ProxyResult {
    Ok(Vec<CalendarEvent>),
    Failure {
        kind: FailureKind,
        message: String,
        upstream_status: Option<u16>,
    },
}

/// Body sent with every non-2xx answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: String,
    pub timestamp: String,
}

/// HTTP status for a feed failure.
pub fn status_for(err: &FeedError) -> u16 {
    match err {
        FeedError::ConnectionFailure(_) => 503,
        FeedError::Timeout => 504,
        FeedError::UpstreamHttpError { status, .. } => *status,
        FeedError::ParseError(_) | FeedError::Unknown(_) => 500,
    }
}

impl ProxyResult {
    pub fn from_error(err: &FeedError) -> Self {
        Self::Failure {
            kind: err.kind(),
            message: err.to_string(),
            upstream_status: err.upstream_status(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Ok(_) => 200,
            Self::Failure {
                kind,
                upstream_status,
                ..
            } => match kind {
                FailureKind::ConnectionFailure => 503,
                FailureKind::Timeout => 504,
                FailureKind::UpstreamHttpError => upstream_status.unwrap_or(502),
                FailureKind::ParseError | FailureKind::Unknown => 500,
            },
        }
    }

    /// Error body for a failure; `None` on success.
    pub fn error_body(&self) -> Option<ErrorBody> {
        match self {
            Self::Ok(_) => None,
            Self::Failure {
                kind,
                message,
                upstream_status,
            } => Some(ErrorBody {
                error: headline(*kind, *upstream_status),
                details: message.clone(),
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            }),
        }
    }
}

fn headline(kind: FailureKind, upstream_status: Option<u16>) -> String {
    match kind {
        FailureKind::ConnectionFailure => "Calendar server unreachable.".to_string(),
        FailureKind::Timeout => "Timed out while fetching the calendar.".to_string(),
        FailureKind::UpstreamHttpError => match upstream_status {
            Some(status) => format!("Calendar server error ({})", status),
            None => "Calendar server error".to_string(),
        },
        FailureKind::ParseError | FailureKind::Unknown => {
            "Unable to retrieve calendar data.".to_string()
        }
    }
}
