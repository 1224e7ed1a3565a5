//! Foreground side of the schedule pipeline: fetching events with retries
//! and reacting to agent notifications.

pub mod client;
pub mod error;
pub mod notifications;
pub mod retry;

pub use client::{decode_events, events_from_agent, ScheduleClient};
pub use error::ClientError;
pub use notifications::{Banner, NotificationCenter};
pub use retry::{with_retry, RetryConfig, RetryDecision, RetryError, RetryStatus, Retryable};
