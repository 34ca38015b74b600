//! HipCamp reservations, read from one iCal feed per site.

use chrono::NaiveTime;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::ical::{self, IcalEvent};
use crate::models::{CalendarEvent, Snapshot, Source};
use crate::site_config::SiteConfiguration;
use crate::Result;

/// Check-in time used for all-day bookings.
pub fn check_in() -> NaiveTime {
    NaiveTime::from_hms_opt(14, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Check-out time used for all-day bookings.
pub fn check_out() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn booking_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Booking ID: #(\d+)").expect("valid regex"))
}

fn phone_suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s*-\s*\+\d+.*$").expect("valid regex"))
}

/// Booking number from a HipCamp event description.
pub fn extract_booking_id(description: &str) -> Option<String> {
    booking_id_pattern()
        .captures(description)
        .map(|caps| caps[1].to_string())
}

/// First description line without the trailing phone number.
pub fn guest_line(description: &str) -> String {
    let first = description.lines().next().unwrap_or("");
    phone_suffix_pattern().replace(first, "").into_owned()
}

/// Convert one site's feed into calendar events.
pub fn events_from_feed(site: &str, feed: &str, config: &SiteConfiguration) -> Result<Vec<CalendarEvent>> {
    let display_name = config.display_name(site);
    let events = ical::parse_events(feed)?
        .iter()
        .filter_map(|event| to_calendar_event(event, display_name))
        .collect();
    Ok(events)
}

fn to_calendar_event(event: &IcalEvent, display_name: &str) -> Option<CalendarEvent> {
    let description = event.text("DESCRIPTION");
    let booking_id = extract_booking_id(description)?;

    let (Some(start), Some(end)) = (event.start, event.end) else {
        warn!("HipCamp booking {} has no start or end, skipping", booking_id);
        return None;
    };

    let summary = format!("{} - {}", display_name, guest_line(description));
    Some(
        CalendarEvent::new(
            start.at_or(check_in()),
            end.at_or(check_out()),
            summary,
            Source::HipCamp,
            Some(booking_id),
        )
        .with_description(description),
    )
}

/// Fetch every configured HipCamp feed.
///
/// A failing feed is logged and skipped; the snapshot is then incomplete so
/// its bookings are not treated as cancelled.
pub async fn fetch_events(http: &reqwest::Client, config: &SiteConfiguration) -> Snapshot {
    let mut snapshot = Snapshot::complete(Vec::new());

    for (site, url) in &config.hipcamp_ical_urls {
        if url.is_empty() {
            continue;
        }

        let result = match ical::fetch_feed(http, url).await {
            Ok(feed) => events_from_feed(site, &feed, config),
            Err(e) => Err(e),
        };

        match result {
            Ok(events) => {
                debug!("Fetched {} HipCamp events for {}", events.len(), site);
                snapshot.events.extend(events);
            }
            Err(e) => {
                warn!("Error fetching events for {}: {}", site, e);
                snapshot.complete = false;
            }
        }
    }

    info!("Found {} events in HipCamp", snapshot.events.len());
    snapshot
}

/// Guest details for a Checkfront mirror booking.
pub fn customer_info(event: &CalendarEvent) -> BTreeMap<String, String> {
    let mut info = BTreeMap::new();
    let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) else {
        return info;
    };

    let first = description.lines().next().unwrap_or("");
    let name = first.split(" - ").next().unwrap_or("").trim();
    // The suffix marks mirror bookings so the Checkfront feed can skip them
    info.insert("name".to_string(), format!("{} (HipCamp)", name));

    let email = description
        .lines()
        .find(|line| line.contains('@') && line.contains('.'))
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| {
            let sanitized: String = name
                .to_lowercase()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect();
            format!("{}@example.com", sanitized)
        });
    info.insert("email".to_string(), email);

    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = "BEGIN:VCALENDAR\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20300601\n\
DTEND;VALUE=DATE:20300603\n\
DESCRIPTION:Jane Doe - +15551234567\\nBooking ID: #48213\\njane@example.org\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20300610\n\
DTEND;VALUE=DATE:20300611\n\
DESCRIPTION:Blocked by host\n\
END:VEVENT\n\
END:VCALENDAR\n";

    fn config(urls: &[(&str, &str)]) -> SiteConfiguration {
        let mut config = SiteConfiguration::default();
        config
            .site_display_names
            .insert("HillTop Site #1".into(), "HT1".into());
        for (site, url) in urls {
            config
                .hipcamp_ical_urls
                .insert(site.to_string(), url.to_string());
        }
        config
    }

    #[test]
    fn test_extract_booking_id() {
        assert_eq!(extract_booking_id("x\nBooking ID: #123\n"), Some("123".to_string()));
        assert_eq!(extract_booking_id("Booking ID: 123"), None);
        assert_eq!(extract_booking_id(""), None);
    }

    #[test]
    fn test_guest_line_strips_phone() {
        assert_eq!(guest_line("Jane Doe - +15551234567\nmore"), "Jane Doe");
        assert_eq!(guest_line("Bob Ray"), "Bob Ray");
    }

    #[test]
    fn test_events_from_feed() {
        let events = events_from_feed("HillTop Site #1", FEED, &config(&[])).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.summary, "HT1 - Jane Doe");
        assert_eq!(event.source_id.as_deref(), Some("48213"));
        assert_eq!(event.start.to_string(), "2030-06-01 14:00:00");
        assert_eq!(event.end.to_string(), "2030-06-03 12:00:00");
    }

    #[test]
    fn test_customer_info() {
        let events = events_from_feed("HillTop Site #1", FEED, &config(&[])).unwrap();
        let info = customer_info(&events[0]);
        assert_eq!(info["name"], "Jane Doe (HipCamp)");
        assert_eq!(info["email"], "jane@example.org");

        let mut no_email = events[0].clone();
        no_email.description = Some("Mary-Ann O'Neil\nBooking ID: #1".into());
        let info = customer_info(&no_email);
        assert_eq!(info["email"], "maryannoneil@example.com");
    }

    #[tokio::test]
    async fn test_fetch_marks_failed_feed_incomplete() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/good.ics"))
            .and(header("Pragma", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bad.ics"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let good = format!("{}/good.ics", server.uri());
        let bad = format!("{}/bad.ics", server.uri());
        let config = config(&[("HillTop Site #1", good.as_str()), ("Creek", bad.as_str()), ("Unused", "")]);

        let snapshot = fetch_events(&reqwest::Client::new(), &config).await;
        assert_eq!(snapshot.events.len(), 1);
        assert!(!snapshot.complete);
    }
}
