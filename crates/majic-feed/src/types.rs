//! Normalized event model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A single scheduled event as served by the proxy endpoint.
///
/// Serialized with the upstream identifier under `uid` and timestamps as
/// ISO-8601 strings. Absent optional fields are omitted, never replaced with
/// placeholder text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    #[serde(rename = "uid")]
    pub id: String,
    #[serde(default)]
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CalendarEvent {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Upstream data occasionally has `end` before `start`; nothing in the
    /// pipeline rejects such events, callers can check here.
    pub fn is_well_ordered(&self) -> bool {
        self.start <= self.end
    }
}

/// Sort events chronologically, ties broken by identifier so the order is stable
/// across refreshes.
pub fn sort_by_start(events: &mut [CalendarEvent]) {
    events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::TimeZone;

    fn event(id: &str, start_hour: u32, end_hour: u32) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            summary: format!("Course {}", id),
            start: Utc.with_ymd_and_hms(2025, 9, 1, start_hour, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 9, 1, end_hour, 0, 0).unwrap(),
            location: None,
            description: None,
        }
    }

    #[test]
    fn test_wire_field_names() {
        let mut e = event("abc", 8, 10);
        e.location = Some("Amphi A".to_string());
        let json = serde_json::to_value(&e).unwrap();

        assert_eq!(json["uid"], "abc");
        assert_eq!(json["start"], "2025-09-01T08:00:00Z");
        assert_eq!(json["location"], "Amphi A");
        assert!(json.get("description").is_none());
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_deserialize_without_optional_fields() {
        let e: CalendarEvent = serde_json::from_str(
            r#"{"uid":"x","summary":"TD","start":"2025-09-01T08:00:00.000Z","end":"2025-09-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(e.id, "x");
        assert_eq!(e.location, None);
        assert_eq!(e.duration(), Duration::hours(2));
    }

    #[test]
    fn test_sort_by_start() {
        let mut events = vec![event("c", 14, 16), event("b", 8, 10), event("a", 8, 9)];
        sort_by_start(&mut events);
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_inverted_event_is_flagged_not_rejected() {
        let e = event("bad", 10, 8);
        assert!(!e.is_well_ordered());
        assert!(e.duration() < Duration::zero());
    }
}
