//! Minimal iCalendar (RFC 5545) reader for booking feeds.
//!
//! Only `VEVENT` components are read. Properties are kept as unescaped text;
//! `DTSTART`/`DTEND` are decoded into [`IcalTime`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;
use tracing::warn;

use crate::{Error, Result};

/// A date or date-time value from a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcalTime {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl IcalTime {
    /// Resolve to a date-time, placing bare dates at `time_of_day`.
    pub fn at_or(&self, time_of_day: NaiveTime) -> NaiveDateTime {
        match self {
            IcalTime::Date(date) => date.and_time(time_of_day),
            IcalTime::DateTime(dt) => *dt,
        }
    }
}

/// One `VEVENT` of a feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IcalEvent {
    properties: HashMap<String, String>,
    pub start: Option<IcalTime>,
    pub end: Option<IcalTime>,
}

impl IcalEvent {
    /// Unescaped text of a property, by upper-case name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Property text, or empty when absent.
    pub fn text(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }
}

struct ContentLine<'a> {
    name: String,
    params: Vec<(String, String)>,
    value: &'a str,
}

/// Parse every `VEVENT` in a calendar document.
///
/// Events with undecodable dates are dropped with a warning; a document
/// without `BEGIN:VCALENDAR` is rejected.
pub fn parse_events(input: &str) -> Result<Vec<IcalEvent>> {
    let lines = unfold(input);
    if !lines
        .iter()
        .any(|line| line.trim().eq_ignore_ascii_case("BEGIN:VCALENDAR"))
    {
        return Err(Error::Ical("missing BEGIN:VCALENDAR".to_string()));
    }

    let mut events = Vec::new();
    let mut current: Option<IcalEvent> = None;
    let mut valid = true;
    // Depth of components nested inside the current VEVENT (VALARM etc.)
    let mut nested = 0usize;

    for line in &lines {
        let Some(content) = parse_line(line) else {
            continue;
        };

        match (content.name.as_str(), content.value.trim().to_ascii_uppercase().as_str()) {
            ("BEGIN", "VEVENT") if current.is_none() => {
                current = Some(IcalEvent::default());
                valid = true;
                nested = 0;
            }
            ("BEGIN", _) if current.is_some() => nested += 1,
            ("END", "VEVENT") if nested == 0 => {
                if let Some(event) = current.take() {
                    if valid {
                        events.push(event);
                    }
                }
            }
            ("END", _) if nested > 0 => nested -= 1,
            _ => {
                let Some(event) = current.as_mut() else {
                    continue;
                };
                if nested > 0 {
                    continue;
                }
                match content.name.as_str() {
                    "DTSTART" | "DTEND" => match parse_time(content.value, &content.params) {
                        Ok(time) => {
                            if content.name == "DTSTART" {
                                event.start = Some(time);
                            } else {
                                event.end = Some(time);
                            }
                        }
                        Err(e) => {
                            warn!("Skipping event with bad {}: {}", content.name, e);
                            valid = false;
                        }
                    },
                    _ => {
                        event
                            .properties
                            .insert(content.name.clone(), unescape(content.value));
                    }
                }
            }
        }
    }

    Ok(events)
}

/// Download a feed, bypassing intermediary caches so new bookings show up.
pub async fn fetch_feed(http: &reqwest::Client, url: &str) -> Result<String> {
    let response = http
        .get(url)
        .header("Cache-Control", "no-cache, no-store, must-revalidate")
        .header("Pragma", "no-cache")
        .header("Expires", "0")
        .send()
        .await?
        .error_for_status()?;

    Ok(response.text().await?)
}

/// Join folded lines. A line starting with a space or tab continues the previous one.
fn unfold(input: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in input.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(rest) = raw.strip_prefix(' ').or_else(|| raw.strip_prefix('\t')) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        if !raw.is_empty() {
            lines.push(raw.to_string());
        }
    }
    lines
}

fn parse_line(line: &str) -> Option<ContentLine<'_>> {
    // The value starts at the first colon outside a quoted parameter
    let mut in_quotes = false;
    let mut split_at = None;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => {
                split_at = Some(idx);
                break;
            }
            _ => {}
        }
    }
    let split_at = split_at?;
    let (head, value) = (&line[..split_at], &line[split_at + 1..]);

    let mut parts = head.split(';');
    let name = parts.next()?.trim().to_ascii_uppercase();
    if name.is_empty() {
        return None;
    }
    let params = parts
        .filter_map(|param| {
            let (key, val) = param.split_once('=')?;
            Some((key.trim().to_ascii_uppercase(), val.trim_matches('"').to_string()))
        })
        .collect();

    Some(ContentLine { name, params, value })
}

fn parse_time(value: &str, params: &[(String, String)]) -> Result<IcalTime> {
    let value = value.trim();
    let is_date = params
        .iter()
        .any(|(k, v)| k == "VALUE" && v.eq_ignore_ascii_case("DATE"))
        || (value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()));

    if is_date {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(IcalTime::Date)
            .map_err(|e| Error::Ical(format!("invalid date '{}': {}", value, e)));
    }

    let stamp = value.strip_suffix('Z').unwrap_or(value);
    NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%S")
        .map(IcalTime::DateTime)
        .map_err(|e| Error::Ical(format!("invalid date-time '{}': {}", value, e)))
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:abc@hipcamp\r\n\
DTSTART;VALUE=DATE:20250601\r\n\
DTEND;VALUE=DATE:20250603\r\n\
SUMMARY:Reserved\r\n\
DESCRIPTION:Jane Doe - +15551234567\\nBooking ID: #48213\\nGuests: 2\\, plus\r\n \x20dog\r\n\
BEGIN:VALARM\r\n\
DESCRIPTION:reminder\r\n\
END:VALARM\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
DTSTART:20250710T160000Z\r\n\
DTEND;TZID=America/New_York:20250712T110000\r\n\
URL:https://example.checkfront.com/booking/ABCD-123\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_parse_dates_and_text() {
        let events = parse_events(FEED).unwrap();
        assert_eq!(events.len(), 2);

        let first = &events[0];
        assert_eq!(first.get("UID"), Some("abc@hipcamp"));
        assert_eq!(
            first.start,
            Some(IcalTime::Date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()))
        );
        assert_eq!(
            first.text("DESCRIPTION"),
            "Jane Doe - +15551234567\nBooking ID: #48213\nGuests: 2, plus dog"
        );

        let second = &events[1];
        let start = second.start.unwrap().at_or(NaiveTime::MIN);
        assert_eq!(start.to_string(), "2025-07-10 16:00:00");
        let end = second.end.unwrap().at_or(NaiveTime::MIN);
        assert_eq!(end.to_string(), "2025-07-12 11:00:00");
        assert_eq!(second.text("SUMMARY"), "");
    }

    #[test]
    fn test_bad_date_drops_only_that_event() {
        let feed = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nDTSTART:2025-06-01\nEND:VEVENT\nBEGIN:VEVENT\nDTSTART:20250601\nEND:VEVENT\nEND:VCALENDAR\n";
        let events = parse_events(feed).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_rejects_non_calendar() {
        let err = parse_events("<html>Not found</html>").unwrap_err();
        assert!(matches!(err, Error::Ical(_)));
    }

    #[test]
    fn test_quoted_param_with_colon() {
        let feed = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nLOCATION;ALTREP=\"http://x:80/\":HT2 - HillTop Site#2\nEND:VEVENT\nEND:VCALENDAR";
        let events = parse_events(feed).unwrap();
        assert_eq!(events[0].text("LOCATION"), "HT2 - HillTop Site#2");
    }
}
