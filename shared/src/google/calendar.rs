//! Google Calendar v3 REST client.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

use crate::models::{CalendarEvent, Source};
use crate::sync::{labeled_summary, CalendarStore};
use crate::{Error, Result};

pub const GOOGLE_CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

/// Property marking events this integration owns.
pub const SYNCED_BY_SCRIPT: &str = "synced_by_script";

/// Entry of the user's calendar list.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarListEntry {
    pub id: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

/// Start or end of an event. All-day events use `date`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedProperties {
    #[serde(default)]
    pub private: BTreeMap<String, String>,
}

/// Event as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleEvent {
    pub id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
    #[serde(rename = "extendedProperties")]
    pub extended_properties: Option<ExtendedProperties>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

/// Request body for insert and update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBody {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(rename = "extendedProperties")]
    pub extended_properties: ExtendedProperties,
}

/// Build the all-day event written for a booking.
pub fn event_body(event: &CalendarEvent, timezone: &str) -> EventBody {
    let all_day = |at: NaiveDateTime| EventTime {
        date_time: None,
        date: Some(at.format("%Y-%m-%d").to_string()),
        time_zone: Some(timezone.to_string()),
    };

    let mut private = BTreeMap::new();
    if let Some(id) = &event.source_id {
        private.insert(event.source.property_key(), id.clone());
    }
    private.insert(SYNCED_BY_SCRIPT.to_string(), "true".to_string());
    if event.source == Source::HipCamp {
        if let Some(linked) = &event.checkfront_booking_id {
            private.insert(Source::Checkfront.property_key(), linked.clone());
        }
    }

    EventBody {
        summary: labeled_summary(event),
        description: event.description.clone(),
        start: all_day(event.start),
        end: all_day(event.end),
        extended_properties: ExtendedProperties { private },
    }
}

fn parse_time(time: &EventTime) -> Option<NaiveDateTime> {
    if let Some(date_time) = &time.date_time {
        return DateTime::parse_from_rfc3339(date_time)
            .ok()
            .map(|dt| dt.naive_local());
    }
    time.date
        .as_deref()
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Convert a listed event, classifying it by its booking id property.
pub fn to_calendar_event(event: GoogleEvent) -> Option<CalendarEvent> {
    let (Some(start), Some(end)) = (parse_time(&event.start), parse_time(&event.end)) else {
        warn!("Skipping Google event {} with unreadable start or end", event.id);
        return None;
    };

    let private = event
        .extended_properties
        .map(|props| props.private)
        .unwrap_or_default();
    let hipcamp_id = private.get(&Source::HipCamp.property_key()).cloned();
    let checkfront_id = private.get(&Source::Checkfront.property_key()).cloned();

    let (source, source_id, linked) = match (hipcamp_id, checkfront_id) {
        (Some(hipcamp), linked) => (Source::HipCamp, Some(hipcamp), linked),
        (None, Some(checkfront)) => (Source::Checkfront, Some(checkfront), None),
        (None, None) => (Source::GoogleCalendar, None, None),
    };

    let mut calendar_event = CalendarEvent::new(start, end, event.summary.unwrap_or_default(), source, source_id);
    calendar_event.description = event.description;
    calendar_event.google_event_id = Some(event.id);
    calendar_event.checkfront_booking_id = linked;
    Some(calendar_event)
}

/// Turn a non-success response into [`Error::Google`], keeping the error reasons.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
    let error = &body["error"];

    let mut message = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| text.clone());
    let reasons: Vec<&str> = error["errors"]
        .as_array()
        .map(|errors| errors.iter().filter_map(|e| e["reason"].as_str()).collect())
        .unwrap_or_default();
    if !reasons.is_empty() {
        message = format!("{} [{}]", message, reasons.join(", "));
    }

    let err = Error::Google {
        status: status.as_u16(),
        message,
    };
    if err.is_insufficient_permissions() {
        warn!("Google token lacks the https://www.googleapis.com/auth/calendar scope; re-authorize the account");
    }
    Err(err)
}

/// Authorized Google Calendar client.
#[derive(Clone)]
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    timezone: String,
}

impl GoogleCalendarClient {
    pub fn new(http: reqwest::Client, access_token: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self::with_base_url(http, GOOGLE_CALENDAR_API, access_token, timezone)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            timezone: timezone.into(),
        }
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!("{}/calendars/{}/events", self.base_url, urlencoding::encode(calendar_id))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.access_token))
    }

    pub async fn list_calendars(&self) -> Result<Vec<CalendarListEntry>> {
        let url = format!("{}/users/me/calendarList", self.base_url);
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.authorized(self.http.get(&url));
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page: CalendarListResponse = check(request.send().await?).await?.json().await?;
            calendars.extend(page.items);

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        debug!("Found {} calendars", calendars.len());
        Ok(calendars)
    }

    /// Events starting from `time_min`, expanded and ordered by start time.
    pub async fn list_events(&self, calendar_id: &str, time_min: DateTime<Utc>) -> Result<Vec<CalendarEvent>> {
        let url = self.events_url(calendar_id);
        let time_min = time_min.to_rfc3339();
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeMin", time_min.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("maxResults", "250"),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.as_str()));
            }

            let request = self.authorized(self.http.get(&url)).query(&query);
            let page: EventListResponse = check(request.send().await?).await?.json().await?;
            trace!("Fetched page of {} Google events", page.items.len());

            events.extend(
                page.items
                    .into_iter()
                    .filter(|event| event.status.as_deref() != Some("cancelled"))
                    .filter_map(to_calendar_event),
            );

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(events)
    }
}

#[async_trait]
impl CalendarStore for GoogleCalendarClient {
    async fn insert_event(&self, calendar_id: &str, event: &CalendarEvent) -> Result<String> {
        let body = event_body(event, &self.timezone);
        let request = self.authorized(self.http.post(self.events_url(calendar_id))).json(&body);
        let created: CreatedEvent = check(request.send().await?).await?.json().await?;
        Ok(created.id)
    }

    async fn update_event(&self, calendar_id: &str, event_id: &str, event: &CalendarEvent) -> Result<()> {
        let body = event_body(event, &self.timezone);
        let url = format!("{}/{}", self.events_url(calendar_id), urlencoding::encode(event_id));
        let request = self.authorized(self.http.put(url)).json(&body);
        check(request.send().await?).await?;
        Ok(())
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<()> {
        let url = format!("{}/{}", self.events_url(calendar_id), urlencoding::encode(event_id));
        let response = self.authorized(self.http.delete(url)).send().await?;
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            debug!("Google event {} already deleted", event_id);
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }
}
