//! iCalendar → `CalendarEvent` projection.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use icalendar::parser::{read_calendar, unfold, Component};
use icalendar::{CalendarDateTime, DatePerhapsTime};

use crate::error::FeedError;
use crate::types::CalendarEvent;

/// Parse a raw feed document and keep only its events.
///
/// The output preserves document order. A VEVENT missing its UID or a usable
/// DTSTART is skipped with a warning; a document the parser cannot read at all
/// fails as a whole with `ParseError`.
pub fn normalize(raw: &str) -> Result<Vec<CalendarEvent>, FeedError> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    if raw.trim().is_empty() {
        return Err(FeedError::ParseError("empty calendar document".to_string()));
    }

    let first_line = raw.trim_start().lines().next().unwrap_or_default().trim();
    if !first_line.eq_ignore_ascii_case("BEGIN:VCALENDAR") {
        return Err(FeedError::ParseError(
            "document does not start with BEGIN:VCALENDAR".to_string(),
        ));
    }

    let unfolded = unfold(raw);
    let calendar = read_calendar(&unfolded).map_err(|e| FeedError::ParseError(e.to_string()))?;

    let mut vevents = Vec::new();
    collect_events(&calendar.components, &mut vevents);

    let total = vevents.len();
    let events: Vec<CalendarEvent> = vevents.into_iter().filter_map(to_event).collect();

    if events.len() < total {
        tracing::warn!(
            skipped = total - events.len(),
            kept = events.len(),
            "Skipped malformed calendar events"
        );
    }
    tracing::debug!(count = events.len(), "Calendar events normalized");

    Ok(events)
}

/// Walk the component tree; VEVENTs may sit directly at the root or inside a
/// VCALENDAR wrapper depending on how the parser unwrapped the document.
fn collect_events<'a>(components: &'a [Component<'a>], out: &mut Vec<&'a Component<'a>>) {
    for component in components {
        let name = component.name.as_ref();
        if name.eq_ignore_ascii_case("VEVENT") {
            out.push(component);
        } else if name.eq_ignore_ascii_case("VCALENDAR") {
            collect_events(&component.components, out);
        }
    }
}

fn to_event(vevent: &Component<'_>) -> Option<CalendarEvent> {
    let Some(uid) = text_prop(vevent, "UID") else {
        tracing::warn!("VEVENT without UID skipped");
        return None;
    };

    let Some((start, all_day)) = vevent
        .find_prop("DTSTART")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_utc)
    else {
        tracing::warn!(%uid, "VEVENT without usable DTSTART skipped");
        return None;
    };

    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(|dpt| to_utc(dpt).0)
        .or_else(|| {
            vevent
                .find_prop("DURATION")
                .and_then(|p| {
                    let value: &str = p.val.as_ref();
                    let end = parse_duration(value).and_then(|d| start.checked_add_signed(d));
                    if end.is_none() {
                        tracing::warn!(%uid, duration = value, "Unusable DURATION ignored");
                    }
                    end
                })
        })
        .unwrap_or_else(|| {
            if all_day {
                Duration::try_days(1)
                    .and_then(|day| start.checked_add_signed(day))
                    .unwrap_or(start)
            } else {
                start
            }
        });

    Some(CalendarEvent {
        id: uid,
        summary: text_prop(vevent, "SUMMARY").unwrap_or_default(),
        start,
        end,
        location: text_prop(vevent, "LOCATION"),
        description: text_prop(vevent, "DESCRIPTION"),
    })
}

fn text_prop(component: &Component<'_>, name: &str) -> Option<String> {
    component
        .find_prop(name)
        .map(|p| unescape_text(p.val.as_ref()))
        .filter(|v| !v.is_empty())
}

/// Convert to UTC. Returns whether the value was a bare date.
fn to_utc(dpt: DatePerhapsTime) -> (DateTime<Utc>, bool) {
    match dpt {
        DatePerhapsTime::Date(d) => {
            let midnight = d.and_hms_opt(0, 0, 0).unwrap_or_default();
            (midnight.and_utc(), true)
        }
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => (dt, false),
            CalendarDateTime::Floating(naive) => (naive.and_utc(), false),
            CalendarDateTime::WithTimezone { date_time, tzid } => {
                (zoned_to_utc(date_time, &tzid), false)
            }
        },
    }
}

fn zoned_to_utc(local: NaiveDateTime, tzid: &str) -> DateTime<Utc> {
    let resolved = tzid
        .trim_start_matches('/')
        .parse::<chrono_tz::Tz>()
        .ok()
        .and_then(|tz| tz.from_local_datetime(&local).earliest())
        .map(|dt| dt.with_timezone(&Utc));

    match resolved {
        Some(dt) => dt,
        None => {
            tracing::warn!(%tzid, "Unknown timezone, treating local time as UTC");
            local.and_utc()
        }
    }
}

/// Decode RFC 5545 TEXT escapes.
fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(',') => out.push(','),
            Some(';') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Parse an RFC 5545 DURATION value such as `PT1H30M`, `P1D` or `-PT15M`.
///
/// Values outside chrono's range yield `None`.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (negative, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let rest = rest.strip_prefix('P')?;

    let mut total = Duration::zero();
    let mut number = String::new();
    let mut in_time = false;
    let mut saw_component = false;

    for c in rest.chars() {
        match c {
            'T' => in_time = true,
            '0'..='9' => number.push(c),
            unit => {
                let n: i64 = number.parse().ok()?;
                number.clear();
                let part = match (unit, in_time) {
                    ('W', false) => Duration::try_weeks(n),
                    ('D', false) => Duration::try_days(n),
                    ('H', true) => Duration::try_hours(n),
                    ('M', true) => Duration::try_minutes(n),
                    ('S', true) => Duration::try_seconds(n),
                    _ => return None,
                }?;
                total = total.checked_add(&part)?;
                saw_component = true;
            }
        }
    }

    if !number.is_empty() || !saw_component {
        return None;
    }

    Some(if negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    const TWO_EVENTS_AND_TZ: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
PRODID:-//ADE/version 6.0\r
BEGIN:VTIMEZONE\r
TZID:Europe/Paris\r
BEGIN:STANDARD\r
DTSTART:19701025T030000\r
TZOFFSETFROM:+0200\r
TZOFFSETTO:+0100\r
END:STANDARD\r
END:VTIMEZONE\r
BEGIN:VEVENT\r
UID:ADE-1\r
DTSTAMP:20250901T000000Z\r
DTSTART:20250915T080000Z\r
DTEND:20250915T100000Z\r
SUMMARY:CM Algorithmique\r
LOCATION:Amphi 1\r
DESCRIPTION:\\nM1 Informatique\\nDUPONT Jean\\n\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:ADE-2\r
DTSTAMP:20250901T000000Z\r
DTSTART:20250916T133000Z\r
DTEND:20250916T153000Z\r
SUMMARY:TD Réseaux\\, groupe 2\r
END:VEVENT\r
END:VCALENDAR\r
";

    #[test]
    fn test_events_kept_timezone_ignored() {
        let events = normalize(TWO_EVENTS_AND_TZ).unwrap();
        assert_eq!(events.len(), 2);

        assert_eq!(events[0].id, "ADE-1");
        assert_eq!(events[0].summary, "CM Algorithmique");
        assert_eq!(
            events[0].start,
            Utc.with_ymd_and_hms(2025, 9, 15, 8, 0, 0).unwrap()
        );
        assert_eq!(events[0].end, Utc.with_ymd_and_hms(2025, 9, 15, 10, 0, 0).unwrap());
        assert_eq!(events[0].location.as_deref(), Some("Amphi 1"));
        assert_eq!(
            events[0].description.as_deref(),
            Some("\nM1 Informatique\nDUPONT Jean\n")
        );
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let events = normalize(TWO_EVENTS_AND_TZ).unwrap();
        assert_eq!(events[1].summary, "TD Réseaux, groupe 2");
        assert_eq!(events[1].location, None);
        assert_eq!(events[1].description, None);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let first = serde_json::to_vec(&normalize(TWO_EVENTS_AND_TZ).unwrap()).unwrap();
        let second = serde_json::to_vec(&normalize(TWO_EVENTS_AND_TZ).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_document_is_parse_error() {
        assert!(matches!(normalize(""), Err(FeedError::ParseError(_))));
        assert!(matches!(normalize("  \r\n "), Err(FeedError::ParseError(_))));
    }

    #[test]
    fn test_html_error_page_is_parse_error() {
        let err = normalize("<html><body>Maintenance</body></html>").unwrap_err();
        assert!(matches!(err, FeedError::ParseError(_)));
    }

    #[test]
    fn test_event_without_uid_is_skipped() {
        let feed = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
DTSTART:20250915T080000Z\r
DTEND:20250915T100000Z\r
SUMMARY:Orphan\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:kept\r
DTSTART:20250915T080000Z\r
DTEND:20250915T100000Z\r
SUMMARY:Kept\r
END:VEVENT\r
END:VCALENDAR\r
";
        let events = normalize(feed).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "kept");
    }

    #[test]
    fn test_zoned_all_day_and_duration_events() {
        let feed = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
UID:zoned\r
DTSTART;TZID=Europe/Paris:20250915T080000\r
DURATION:PT1H30M\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:allday\r
DTSTART;VALUE=DATE:20251101\r
END:VEVENT\r
END:VCALENDAR\r
";
        let events = normalize(feed).unwrap();
        assert_eq!(events.len(), 2);

        // Paris is UTC+2 in September.
        assert_eq!(events[0].start, Utc.with_ymd_and_hms(2025, 9, 15, 6, 0, 0).unwrap());
        assert_eq!(events[0].end, Utc.with_ymd_and_hms(2025, 9, 15, 7, 30, 0).unwrap());

        assert_eq!(events[1].start, Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap());
        assert_eq!(events[1].end, Utc.with_ymd_and_hms(2025, 11, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_end_before_start_is_passed_through() {
        let feed = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
UID:inverted\r
DTSTART:20250915T100000Z\r
DTEND:20250915T080000Z\r
END:VEVENT\r
END:VCALENDAR\r
";
        let events = normalize(feed).unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_well_ordered());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("PT1H30M"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("P1W"), Some(Duration::weeks(1)));
        assert_eq!(parse_duration("P1DT2H"), Some(Duration::hours(26)));
        assert_eq!(parse_duration("-PT15M"), Some(Duration::minutes(-15)));
        assert_eq!(parse_duration("PT"), None);
        assert_eq!(parse_duration("1H"), None);
        assert_eq!(parse_duration("PT5"), None);
    }

    #[test]
    fn test_parse_duration_out_of_range() {
        assert_eq!(parse_duration("P99999999999999W"), None);
        assert_eq!(parse_duration("PT9223372036854775807S"), None);
        assert_eq!(parse_duration("P99999999999999999999D"), None);
        assert!(parse_duration("P999999999D").is_some());
    }

    #[test]
    fn test_oversized_duration_falls_back_to_start() {
        let feed = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
UID:huge-days\r
DTSTART:20250915T080000Z\r
DURATION:P999999999D\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:huge-weeks\r
DTSTART:20250915T080000Z\r
DURATION:P99999999999999W\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:normal\r
DTSTART:20250915T080000Z\r
DURATION:PT2H\r
END:VEVENT\r
END:VCALENDAR\r
";
        let events = normalize(feed).unwrap();
        assert_eq!(events.len(), 3);

        let start = Utc.with_ymd_and_hms(2025, 9, 15, 8, 0, 0).unwrap();
        assert_eq!(events[0].end, start);
        assert_eq!(events[1].end, start);
        assert_eq!(events[2].end, Utc.with_ymd_and_hms(2025, 9, 15, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_leading_byte_order_mark_is_accepted() {
        let feed = format!("\u{feff}{}", TWO_EVENTS_AND_TZ);
        let events = normalize(&feed).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "ADE-1");
    }

    #[test]
    fn test_unescape_text() {
        assert_eq!(unescape_text("a\\, b\\; c\\\\d\\Ne"), "a, b; c\\d\ne");
        assert_eq!(unescape_text("trailing\\"), "trailing\\");
    }
}
