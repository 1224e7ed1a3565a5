//! Upstream schedule feed: fetching and normalization.
//!
//! Fetches the iCalendar document and projects its VEVENT components into
//! `CalendarEvent` records.

pub mod error;
pub mod fetcher;
pub mod normalize;
pub mod types;
pub mod window;

pub use error::{FailureKind, FeedError};
pub use fetcher::{FeedFetcher, FeedSource, RawFeed};
pub use normalize::normalize;
pub use types::{sort_by_start, CalendarEvent};
pub use window::FeedWindow;
