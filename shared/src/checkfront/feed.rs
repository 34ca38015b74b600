//! Checkfront bookings from the account's iCal export.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, trace};

use crate::hipcamp::{check_in, check_out};
use crate::ical::{self, IcalEvent};
use crate::models::{CalendarEvent, Snapshot, Source};
use crate::{Error, Result};

/// Guest name marker on bookings mirrored from HipCamp.
pub const HIPCAMP_MARKER: &str = "(HipCamp)";

fn booking_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/booking/([^/]+)$").expect("valid regex"))
}

/// Booking code from a Checkfront booking URL.
pub fn extract_booking_id(url: &str) -> Option<String> {
    booking_url_pattern()
        .captures(url.trim())
        .map(|caps| caps[1].to_string())
}

/// Site code from a location such as `"HT2 - HillTop Site#2"`.
pub fn site_code(location: &str) -> &str {
    location.split("- ").next().unwrap_or("").trim()
}

/// Convert the Checkfront feed into calendar events.
pub fn events_from_feed(feed: &str) -> Result<Vec<CalendarEvent>> {
    let events = ical::parse_events(feed)?
        .iter()
        .filter_map(to_calendar_event)
        .collect();
    Ok(events)
}

fn to_calendar_event(event: &IcalEvent) -> Option<CalendarEvent> {
    let booking_id = extract_booking_id(event.text("URL"))?;
    let guest = event.text("SUMMARY");

    if guest.contains(HIPCAMP_MARKER) {
        debug!("Skipping Checkfront event from HipCamp: {}", guest);
        return None;
    }

    let (Some(start), Some(end)) = (event.start, event.end) else {
        debug!("Checkfront booking {} has no start or end, skipping", booking_id);
        return None;
    };

    let location = site_code(event.text("LOCATION"));
    trace!(booking_id = %booking_id, location, guest, "Parsed Checkfront booking");

    let mut calendar_event = CalendarEvent::new(
        start.at_or(check_in()),
        end.at_or(check_out()),
        format!("{} - {}", location, guest),
        Source::Checkfront,
        Some(booking_id),
    );
    calendar_event.description = Some(event.text("DESCRIPTION").to_string());
    Some(calendar_event)
}

/// Fetch the Checkfront feed. Unlike HipCamp feeds, a failure here is fatal.
pub async fn fetch_events(http: &reqwest::Client, url: &str) -> Result<Snapshot> {
    if url.is_empty() {
        return Err(Error::Config("CHECKFRONT_ICAL_URL is not configured".to_string()));
    }

    let feed = ical::fetch_feed(http, url).await?;
    trace!("Checkfront feed size: {} characters", feed.len());

    let events = events_from_feed(&feed)?;
    info!("Found {} events in Checkfront", events.len());
    Ok(Snapshot::complete(events))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "BEGIN:VCALENDAR\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20300701\n\
DTEND;VALUE=DATE:20300704\n\
SUMMARY:Sam Smith\n\
LOCATION:HT2 - HillTop Site#2\n\
URL:https://dbr.checkfront.com/reserve/booking/DBRX-010725\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20300701\n\
DTEND;VALUE=DATE:20300702\n\
SUMMARY:Jane Doe (HipCamp)\n\
LOCATION:HT1 - HillTop Site#1\n\
URL:https://dbr.checkfront.com/reserve/booking/DBRX-010726\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20300701\n\
DTEND;VALUE=DATE:20300702\n\
SUMMARY:No link\n\
END:VEVENT\n\
END:VCALENDAR\n";

    #[test]
    fn test_extract_booking_id() {
        assert_eq!(
            extract_booking_id("https://x.checkfront.com/reserve/booking/ABC-1"),
            Some("ABC-1".to_string())
        );
        assert_eq!(extract_booking_id("https://x.checkfront.com/booking/"), None);
        assert_eq!(extract_booking_id(""), None);
    }

    #[test]
    fn test_site_code() {
        assert_eq!(site_code("HT2 - HillTop Site#2"), "HT2");
        assert_eq!(site_code("CR1"), "CR1");
    }

    #[test]
    fn test_skips_mirrored_and_unlinked() {
        let events = events_from_feed(FEED).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.summary, "HT2 - Sam Smith");
        assert_eq!(event.source, Source::Checkfront);
        assert_eq!(event.source_id.as_deref(), Some("DBRX-010725"));
        assert_eq!(event.start.to_string(), "2030-07-01 14:00:00");
    }
}
