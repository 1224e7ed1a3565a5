//! Date range requested from the upstream feed.

use chrono::{Datelike, NaiveDate, Utc};

/// Inclusive range of days requested from the upstream calendar.
///
/// Starts on the first day of the previous month and ends on the first day of
/// the same month one year later, so the schedule covers the recent past and
/// the whole coming year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedWindow {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl FeedWindow {
    pub fn around(today: NaiveDate) -> Self {
        let (prev_year, prev_month) = if today.month() == 1 {
            (today.year() - 1, 12)
        } else {
            (today.year(), today.month() - 1)
        };

        let first = NaiveDate::from_ymd_opt(prev_year, prev_month, 1).unwrap_or(today);
        let last = NaiveDate::from_ymd_opt(today.year() + 1, today.month(), 1).unwrap_or(today);

        Self { first, last }
    }

    pub fn current() -> Self {
        Self::around(Utc::now().date_naive())
    }

    /// Substitute `{first_date}` / `{last_date}` in a URL template.
    pub fn fill(&self, template: &str) -> String {
        template
            .replace("{first_date}", &self.first.format("%Y-%m-%d").to_string())
            .replace("{last_date}", &self.last.format("%Y-%m-%d").to_string())
    }
}
