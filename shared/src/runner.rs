//! One full sync run: the main calendar plus every per-site Checkfront calendar.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::checkfront::{self, CheckfrontClient};
use crate::config::Config;
use crate::google::{self, CalendarListEntry, GoogleCalendarClient};
use crate::hipcamp;
use crate::models::Snapshot;
use crate::secrets::Credentials;
use crate::site_config::SiteConfiguration;
use crate::sync::{self, BookingSystem, Reconciler, SyncReport};
use crate::{Error, Result};

/// Calendars named like `"HT1 Checkfront"` hold one site's Checkfront bookings.
pub const SITE_CALENDAR_SUFFIX: &str = " Checkfront";

/// Events read from each system during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub google: usize,
    pub hipcamp: usize,
    pub checkfront: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub events: SourceCounts,
    pub calendars: Vec<SyncReport>,
}

/// Calendars a run writes to.
#[derive(Debug, Clone)]
pub struct CalendarTargets {
    pub main: CalendarListEntry,
    /// Site code -> calendar
    pub sites: BTreeMap<String, CalendarListEntry>,
}

/// Pick the main calendar and the site calendars from the calendar list.
pub fn find_calendars(calendars: Vec<CalendarListEntry>, main_name: &str) -> Result<CalendarTargets> {
    let mut main = None;
    let mut sites = BTreeMap::new();

    for calendar in calendars {
        if calendar.summary == main_name {
            main = Some(calendar);
        } else if calendar.summary.ends_with(SITE_CALENDAR_SUFFIX) {
            let code = calendar
                .summary
                .split(' ')
                .next()
                .unwrap_or_default()
                .to_string();
            sites.insert(code, calendar);
        }
    }

    let main = main.ok_or_else(|| Error::NotFound(format!("Main '{}' calendar not found", main_name)))?;
    Ok(CalendarTargets { main, sites })
}

/// Runs the reconciliation against live systems.
pub struct SyncRunner<'a> {
    http: &'a reqwest::Client,
    google: &'a GoogleCalendarClient,
    bookings: &'a dyn BookingSystem,
    site_config: &'a SiteConfiguration,
    calendar_name: &'a str,
    sync_range_days: i64,
}

impl<'a> SyncRunner<'a> {
    pub fn new(
        http: &'a reqwest::Client,
        google: &'a GoogleCalendarClient,
        bookings: &'a dyn BookingSystem,
        site_config: &'a SiteConfiguration,
        calendar_name: &'a str,
        sync_range_days: i64,
    ) -> Self {
        Self {
            http,
            google,
            bookings,
            site_config,
            calendar_name,
            sync_range_days,
        }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<SyncSummary> {
        let targets = find_calendars(self.google.list_calendars().await?, self.calendar_name)?;
        info!("Found main calendar: {} (ID: {})", targets.main.summary, targets.main.id);
        info!("Found {} site-specific calendars", targets.sites.len());

        let since = now - Duration::days(self.sync_range_days);
        let existing = self.google.list_events(&targets.main.id, since).await?;
        info!("Found {} events in Google Calendar", existing.len());

        let hipcamp = hipcamp::fetch_events(self.http, self.site_config).await;
        if !hipcamp.complete {
            warn!("HipCamp feeds incomplete, HipCamp bookings will not be removed this run");
        }
        let checkfront = checkfront::feed::fetch_events(self.http, &self.site_config.checkfront_ical_url).await?;

        let counts = SourceCounts {
            google: existing.len(),
            hipcamp: hipcamp.events.len(),
            checkfront: checkfront.events.len(),
        };

        let mut main_report = SyncReport {
            calendar: targets.main.summary.clone(),
            ..Default::default()
        };
        let plan = sync::plan(&hipcamp, &checkfront, &existing, now);
        Reconciler::new(self.google, self.bookings, &targets.main.id)
            .execute(plan, &mut main_report)
            .await;
        log_report(&main_report);

        let mut calendars = vec![main_report];
        for (code, calendar) in &targets.sites {
            info!("Syncing events to {} Checkfront calendar...", code);
            let site_existing = self.google.list_events(&calendar.id, since).await?;

            let prefix = format!("{} -", code);
            let site_checkfront = Snapshot {
                events: checkfront
                    .events
                    .iter()
                    .filter(|event| event.summary.starts_with(&prefix))
                    .cloned()
                    .collect(),
                complete: checkfront.complete,
            };
            info!(
                "Found {} events in {} Checkfront calendar, {} Checkfront bookings for the site",
                site_existing.len(),
                code,
                site_checkfront.events.len()
            );

            let mut report = SyncReport {
                calendar: calendar.summary.clone(),
                ..Default::default()
            };
            let plan = sync::plan(&Snapshot::complete(Vec::new()), &site_checkfront, &site_existing, now);
            Reconciler::new(self.google, self.bookings, &calendar.id)
                .without_mirror_bookings()
                .execute(plan, &mut report)
                .await;
            log_report(&report);
            calendars.push(report);
        }

        Ok(SyncSummary {
            events: counts,
            calendars,
        })
    }
}

fn log_report(report: &SyncReport) {
    info!(
        calendar = %report.calendar,
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        deleted = report.deleted,
        skipped_past = report.skipped_past,
        bookings_created = report.bookings_created,
        bookings_deleted = report.bookings_deleted,
        errors = report.errors.len(),
        "Calendar sync complete"
    );
}

/// Authenticate with Google and Checkfront, then run one sync.
pub async fn run_sync(
    http: &reqwest::Client,
    config: &Config,
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> Result<SyncSummary> {
    info!("Authenticating with Google Calendar...");
    let access_token = google::access_token(http, &credentials.google_client, &credentials.google_token).await?;
    let google = GoogleCalendarClient::new(http.clone(), access_token, config.timezone.as_str());

    let site_config = Arc::new(credentials.site_config.clone());
    let checkfront = CheckfrontClient::new(http.clone(), credentials.checkfront.clone(), Arc::clone(&site_config))?;

    SyncRunner::new(
        http,
        &google,
        &checkfront,
        &site_config,
        &config.calendar_name,
        config.sync_range_days,
    )
    .run(now)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CalendarEvent;
    use crate::sync::BookingOutcome;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoBookings;

    #[async_trait]
    impl BookingSystem for NoBookings {
        async fn hipcamp_mapping(&self) -> Result<HashMap<String, String>> {
            Ok(HashMap::new())
        }

        async fn create_mirror_booking(&self, _event: &CalendarEvent) -> Result<BookingOutcome> {
            Ok(BookingOutcome::AlreadyBooked)
        }

        async fn delete_mirror_booking(&self, _hipcamp_id: &str, _linked: Option<&str>) -> Result<bool> {
            Ok(false)
        }
    }

    const HIPCAMP_FEED: &str = "BEGIN:VCALENDAR\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20300601\n\
DTEND;VALUE=DATE:20300603\n\
DESCRIPTION:Jane Doe\\nBooking ID: #48213\n\
END:VEVENT\n\
END:VCALENDAR\n";

    const CHECKFRONT_FEED: &str = "BEGIN:VCALENDAR\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20300701\n\
DTEND;VALUE=DATE:20300704\n\
SUMMARY:Sam Smith\n\
LOCATION:HT2 - HillTop Site#2\n\
URL:https://dbr.checkfront.com/reserve/booking/DBRX-010725\n\
END:VEVENT\n\
END:VCALENDAR\n";

    fn entry(id: &str, summary: &str) -> CalendarListEntry {
        CalendarListEntry {
            id: id.into(),
            summary: summary.into(),
        }
    }

    #[test]
    fn test_find_calendars() {
        let targets = find_calendars(
            vec![
                entry("p", "Personal"),
                entry("m", "DBR Camping"),
                entry("h", "HT1 Checkfront"),
            ],
            "DBR Camping",
        )
        .unwrap();
        assert_eq!(targets.main.id, "m");
        assert_eq!(targets.sites["HT1"].id, "h");
        assert_eq!(targets.sites.len(), 1);

        let err = find_calendars(vec![entry("p", "Personal")], "DBR Camping").unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_run_syncs_main_and_site_calendars() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/calendarList"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": "main", "summary": "DBR Camping"},
                    {"id": "ht2", "summary": "HT2 Checkfront"},
                    {"id": "me", "summary": "Personal"}
                ]
            })))
            .mount(&server)
            .await;
        for calendar in ["main", "ht2"] {
            Mock::given(method("GET"))
                .and(path(format!("/calendars/{}/events", calendar)))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
                .mount(&server)
                .await;
        }
        Mock::given(method("POST"))
            .and(path("/calendars/main/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "new"})))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/calendars/ht2/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "new"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feeds/ht1.ics"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HIPCAMP_FEED))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feeds/checkfront.ics"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CHECKFRONT_FEED))
            .mount(&server)
            .await;

        let mut site_config = SiteConfiguration::default();
        site_config
            .site_display_names
            .insert("HillTop Site #1".into(), "HT1".into());
        site_config
            .hipcamp_ical_urls
            .insert("HillTop Site #1".into(), format!("{}/feeds/ht1.ics", server.uri()));
        site_config.checkfront_ical_url = format!("{}/feeds/checkfront.ics", server.uri());

        let http = reqwest::Client::new();
        let google = GoogleCalendarClient::with_base_url(http.clone(), server.uri(), "token", "America/New_York");
        let summary = SyncRunner::new(&http, &google, &NoBookings, &site_config, "DBR Camping", 90)
            .run(Utc::now())
            .await
            .unwrap();

        assert_eq!(
            summary.events,
            SourceCounts {
                google: 0,
                hipcamp: 1,
                checkfront: 1
            }
        );
        assert_eq!(summary.calendars.len(), 2);
        assert_eq!(summary.calendars[0].calendar, "DBR Camping");
        assert_eq!(summary.calendars[0].created, 2);
        assert_eq!(summary.calendars[1].calendar, "HT2 Checkfront");
        assert_eq!(summary.calendars[1].created, 1);
    }

    #[tokio::test]
    async fn test_checkfront_feed_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/calendarList"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": "main", "summary": "DBR Camping"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/main/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feeds/checkfront.ics"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "new"})))
            .expect(0)
            .mount(&server)
            .await;

        let site_config = SiteConfiguration {
            checkfront_ical_url: format!("{}/feeds/checkfront.ics", server.uri()),
            ..Default::default()
        };
        let http = reqwest::Client::new();
        let google = GoogleCalendarClient::with_base_url(http.clone(), server.uri(), "token", "America/New_York");
        let result = SyncRunner::new(&http, &google, &NoBookings, &site_config, "DBR Camping", 90)
            .run(Utc::now())
            .await;
        assert!(result.is_err());
    }
}
