use majic_core::{NetworkError, StorageError};
use thiserror::Error;

use crate::agent::AgentState;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: AgentState,
    },

    #[error("Failed to precache {asset}: {reason}")]
    InstallFailed { asset: String, reason: String },

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AgentError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AgentError::InvalidState { .. } => "The offline cache is updating. Please reload.",
            AgentError::InstallFailed { .. } => "Offline mode could not be set up.",
            AgentError::Network(e) => e.user_message(),
            AgentError::Storage(e) => e.user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = AgentError::InvalidState {
            action: "handle requests",
            state: AgentState::Waiting,
        };
        assert_eq!(err.to_string(), "Cannot handle requests while waiting");

        let err = AgentError::InstallFailed {
            asset: "/style.css".into(),
            reason: "HTTP 404".into(),
        };
        assert!(err.to_string().contains("/style.css"));
    }

    #[test]
    fn test_network_message_passthrough() {
        let err = AgentError::from(NetworkError::Timeout);
        assert_eq!(err.user_message(), NetworkError::Timeout.user_message());
    }
}
