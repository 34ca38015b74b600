//! Shared data models.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// System a booking originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    #[serde(rename = "hipcamp")]
    HipCamp,
    Checkfront,
    GoogleCalendar,
}

impl Source {
    /// Tag used in logs and extended property keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::HipCamp => "hipcamp",
            Source::Checkfront => "checkfront",
            Source::GoogleCalendar => "google_calendar",
        }
    }

    /// Suffix appended to synced event summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Source::HipCamp => "Hipcamp",
            Source::Checkfront => "Checkfront",
            Source::GoogleCalendar => "Google_calendar",
        }
    }

    /// Private extended property holding the booking id.
    pub fn property_key(&self) -> String {
        format!("{}_booking_id", self.as_str())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity used to match the same booking across systems.
pub type SyncKey = (Source, String);

/// A calendar event from any source.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    /// Wall-clock start
    pub start: NaiveDateTime,
    /// Wall-clock end
    pub end: NaiveDateTime,
    pub summary: String,
    pub description: Option<String>,
    pub source: Source,
    /// Booking id in the source system
    pub source_id: Option<String>,
    /// Event id in Google Calendar, once synced
    pub google_event_id: Option<String>,
    /// Checkfront mirror booking linked to a HipCamp event
    pub checkfront_booking_id: Option<String>,
}

impl CalendarEvent {
    pub fn new(
        start: NaiveDateTime,
        end: NaiveDateTime,
        summary: impl Into<String>,
        source: Source,
        source_id: Option<String>,
    ) -> Self {
        Self {
            start,
            end,
            summary: summary.into(),
            description: None,
            source,
            source_id,
            google_event_id: None,
            checkfront_booking_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn key(&self) -> Option<SyncKey> {
        self.source_id.as_ref().map(|id| (self.source, id.clone()))
    }

    /// Whether the event is over. Wall-clock times are read as UTC.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end.and_utc() <= now
    }

    /// Date range for log lines, e.g. `(2025-06-01 to 2025-06-03)`.
    pub fn date_range(&self) -> String {
        let start = self.start.format("%Y-%m-%d").to_string();
        let end = self.end.format("%Y-%m-%d").to_string();
        if start == end {
            format!("({})", start)
        } else {
            format!("({} to {})", start, end)
        }
    }
}

/// Events fetched from a source, and whether every feed answered.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub events: Vec<CalendarEvent>,
    pub complete: bool,
}

impl Snapshot {
    pub fn complete(events: Vec<CalendarEvent>) -> Self {
        Self {
            events,
            complete: true,
        }
    }
}

/// Request to run a sync, carried through the webhook and the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Who asked for the sync (webhook name, schedule, manual)
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl SyncRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            requested_at: None,
            request_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_source_tags() {
        assert_eq!(Source::HipCamp.property_key(), "hipcamp_booking_id");
        assert_eq!(Source::Checkfront.label(), "Checkfront");
        assert_eq!(serde_json::to_string(&Source::HipCamp).unwrap(), "\"hipcamp\"");
    }

    #[test]
    fn test_date_range() {
        let event = CalendarEvent::new(at(2025, 6, 1, 14), at(2025, 6, 3, 12), "HT1 - Ann", Source::HipCamp, None);
        assert_eq!(event.date_range(), "(2025-06-01 to 2025-06-03)");

        let same_day = CalendarEvent::new(at(2025, 6, 1, 9), at(2025, 6, 1, 17), "x", Source::Checkfront, None);
        assert_eq!(same_day.date_range(), "(2025-06-01)");
    }

    #[test]
    fn test_has_ended() {
        let event = CalendarEvent::new(at(2025, 6, 1, 14), at(2025, 6, 3, 12), "x", Source::HipCamp, Some("1".into()));
        assert!(!event.has_ended(at(2025, 6, 3, 11).and_utc()));
        assert!(event.has_ended(at(2025, 6, 3, 12).and_utc()));
        assert_eq!(event.key(), Some((Source::HipCamp, "1".to_string())));
    }
}
