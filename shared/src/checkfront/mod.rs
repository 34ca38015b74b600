//! Checkfront REST API (v3.0) client and iCal feed.
//!
//! HipCamp reservations are mirrored into Checkfront as real bookings so the
//! site cannot be sold twice. A mirror booking goes through the public
//! booking flow: open a session, rate the item to obtain a SLIP, add the SLIP
//! to the session, then create the booking with the guest form.

pub mod feed;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use regex::Regex;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, trace, warn};

use crate::hipcamp;
use crate::models::CalendarEvent;
use crate::site_config::SiteConfiguration;
use crate::sync::{BookingOutcome, BookingSystem};
use crate::{Error, Result};

/// Checkfront API credentials from the `checkfront_credentials` secret.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckfrontCredentials {
    pub api_key: String,
    pub api_secret: String,
}

/// Note written on mirror bookings, used to find them again.
pub fn hipcamp_note(hipcamp_id: &str) -> String {
    format!("HipCamp Booking ID: {}", hipcamp_id)
}

fn hipcamp_note_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"HipCamp Booking ID: (\d+)").expect("valid regex"))
}

/// An open booking session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingSession {
    pub id: String,
}

/// Checkfront API client.
#[derive(Clone)]
pub struct CheckfrontClient {
    http: reqwest::Client,
    base_url: String,
    credentials: CheckfrontCredentials,
    site_config: Arc<SiteConfiguration>,
}

impl CheckfrontClient {
    /// Client for the account host named in the site configuration.
    pub fn new(
        http: reqwest::Client,
        credentials: CheckfrontCredentials,
        site_config: Arc<SiteConfiguration>,
    ) -> Result<Self> {
        if site_config.checkfront_host.is_empty() {
            return Err(Error::Config("CHECKFRONT_HOST is not configured".to_string()));
        }
        let base_url = format!("https://{}/api/3.0", site_config.checkfront_host);
        Ok(Self::with_base_url(http, base_url, credentials, site_config))
    }

    pub fn with_base_url(
        http: reqwest::Client,
        base_url: impl Into<String>,
        credentials: CheckfrontCredentials,
        site_config: Arc<SiteConfiguration>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            site_config,
        }
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, endpoint);
        trace!(%method, %url, ?query, ?body, "Checkfront request");

        let mut request = self
            .http
            .request(method.clone(), &url)
            .basic_auth(&self.credentials.api_key, Some(&self.credentials.api_secret))
            .header("Content-Type", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        trace!(status = status.as_u16(), body = %text, "Checkfront response");

        if !status.is_success() {
            return Err(Error::Checkfront(format!(
                "{} {} failed with {}: {}",
                method, endpoint, status, text
            )));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Events (including unavailable blocks) in an optional date range.
    pub async fn get_events(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Vec<Value>> {
        let mut query = Vec::new();
        if let Some(start) = start {
            query.push(("start_date".to_string(), start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = end {
            query.push(("end_date".to_string(), end.format("%Y-%m-%d").to_string()));
        }

        let response = self.request(Method::GET, "event", &query, None).await?;
        Ok(collection(&response["events"]))
    }

    /// HipCamp booking id -> Checkfront id, read from notes of the next year's events.
    pub async fn hipcamp_event_mapping(&self) -> Result<HashMap<String, String>> {
        let end = Utc::now().date_naive() + Duration::days(365);
        let events = self.get_events(None, Some(end)).await?;

        let mut mapping = HashMap::new();
        for event in events {
            let notes = event["notes"].as_str().unwrap_or("");
            let Some(caps) = hipcamp_note_pattern().captures(notes) else {
                continue;
            };
            if let Some(event_id) = value_to_string(&event["event_id"]) {
                debug!("Found Checkfront event {} for HipCamp booking {}", event_id, &caps[1]);
                mapping.insert(caps[1].to_string(), event_id);
            }
        }
        Ok(mapping)
    }

    /// Block an item for a date range. Returns the new event id.
    pub async fn create_unavailable_event(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        name: &str,
        category_id: &str,
        item_id: &str,
        notes: Option<&str>,
    ) -> Result<Option<String>> {
        let mut body = json!({
            "start_date": start.format("%Y-%m-%d").to_string(),
            "end_date": end.format("%Y-%m-%d").to_string(),
            "name": format!("{} - Unavailable", name),
            "status": "U",
            "apply_to": {
                "category_id": category_id,
                "item_id": item_id,
            },
        });
        if let Some(notes) = notes {
            body["notes"] = json!(notes);
        }

        let response = self.request(Method::POST, "event", &[], Some(&body)).await?;
        Ok(value_to_string(&response["event_id"]))
    }

    pub async fn create_booking_session(&self) -> Result<BookingSession> {
        let response = self
            .request(Method::POST, "booking/session", &[], None)
            .await?;

        let id = value_to_string(&response["booking"]["session"]["id"]).ok_or_else(|| {
            Error::Checkfront(format!("No session ID found in Checkfront API response: {}", response))
        })?;
        debug!("Created booking session: {}", id);
        Ok(BookingSession { id })
    }

    /// Rate an item for the stay and return its SLIP.
    pub async fn rate_item(&self, item_id: &str, start: NaiveDate, end: NaiveDate, quantity: u32) -> Result<String> {
        let query = vec![
            ("start_date".to_string(), start.format("%Y%m%d").to_string()),
            ("end_date".to_string(), end.format("%Y%m%d").to_string()),
            ("param[qty]".to_string(), quantity.to_string()),
        ];
        debug!("Getting availability for {} ({} to {})", item_id, start, end);

        let response = self
            .request(Method::GET, &format!("item/{}", item_id), &query, None)
            .await?;
        let rate = &response["item"]["rate"];

        match rate["status"].as_str() {
            Some("AVAILABLE") => {}
            Some("ERROR") => {
                let error = &rate["error"];
                let title = error["title"].as_str().unwrap_or("Unknown error");
                let id = value_to_string(&error["id"]).unwrap_or_default();
                return Err(Error::Unavailable {
                    item_id: item_id.to_string(),
                    reason: format!("{} (Error ID: {})", title, id),
                });
            }
            other => {
                return Err(Error::Unavailable {
                    item_id: item_id.to_string(),
                    reason: format!("unexpected status {}", other.unwrap_or("none")),
                });
            }
        }

        rate["slip"]
            .as_str()
            .filter(|slip| !slip.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::Checkfront(format!("No SLIP returned for item {}", item_id)))
    }

    pub async fn add_to_session(&self, session: &BookingSession, slip: &str) -> Result<()> {
        let body = json!({ "session_id": session.id, "slip": slip });
        let response = self
            .request(Method::POST, "booking/session", &[], Some(&body))
            .await?;

        let items = &response["booking"]["session"]["item"];
        let empty = match items {
            Value::Array(list) => list.is_empty(),
            Value::Object(map) => map.is_empty(),
            _ => true,
        };
        if empty {
            return Err(Error::Checkfront(format!(
                "Failed to add item to session {} - no items in session",
                session.id
            )));
        }
        trace!(session = %session.id, total = %response["booking"]["session"]["total"], "Session after adding item");
        Ok(())
    }

    /// Booking form fields guests must fill, as `(field, label)`.
    pub async fn required_form_fields(&self) -> Result<Vec<(String, String)>> {
        let response = self.request(Method::GET, "booking/form", &[], None).await?;
        Ok(required_fields(&response["booking_form_ui"]))
    }

    /// Turn the session into a booking.
    pub async fn create_booking(
        &self,
        session: &BookingSession,
        customer_info: &BTreeMap<String, String>,
        notes: Option<&str>,
    ) -> Result<Value> {
        let required = self.required_form_fields().await?;
        let form = customer_form(customer_info);

        let missing: Vec<&str> = required
            .iter()
            .filter(|(field, _)| form.get(field).map_or(true, |v| v.is_empty()))
            .map(|(_, label)| label.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "Missing required customer fields: {}",
                missing.join(", ")
            )));
        }

        let mut body = json!({ "session_id": session.id, "form": form });
        if let Some(notes) = notes {
            body["notes"] = json!(notes);
        }

        let response = self
            .request(Method::POST, "booking/create", &[], Some(&body))
            .await?;

        let request_status = &response["request"];
        if request_status["status"].as_str() == Some("ERROR") {
            let error = &request_status["error"];
            let mut message = format!(
                "Booking creation failed: {}",
                error["title"].as_str().unwrap_or("Unknown error")
            );
            if let Some(details) = error["details"].as_str().filter(|d| !d.is_empty()) {
                message.push_str(" - ");
                message.push_str(details);
            }
            return Err(Error::Checkfront(message));
        }

        Ok(response)
    }

    /// Mirror a HipCamp event as a Checkfront booking.
    pub async fn create_hipcamp_booking(
        &self,
        event: &CalendarEvent,
        customer_info: &BTreeMap<String, String>,
    ) -> Result<BookingOutcome> {
        let hipcamp_id = event.source_id.as_deref().unwrap_or_default();
        let Some((site, mapping)) = self.site_config.mapping_for_summary(&event.summary) else {
            let site_name = event.summary.split(" - ").next().unwrap_or_default();
            warn!("No Checkfront mapping found for site {}", site_name);
            return Ok(BookingOutcome::Unmapped(site_name.to_string()));
        };
        info!(
            "Creating Checkfront booking for {} (HipCamp ID: {}) {}",
            site,
            hipcamp_id,
            event.date_range()
        );

        let session = self.create_booking_session().await?;
        let slip = match self
            .rate_item(&mapping.item_id, event.start.date(), event.end.date(), 1)
            .await
        {
            Ok(slip) => slip,
            Err(Error::Unavailable { reason, .. }) => {
                info!(
                    "Checkfront indicates dates are unavailable for {} (HipCamp ID: {}) {}: {}. Skipping booking creation.",
                    site,
                    hipcamp_id,
                    event.date_range(),
                    reason
                );
                return Ok(BookingOutcome::AlreadyBooked);
            }
            Err(e) => return Err(e),
        };
        self.add_to_session(&session, &slip).await?;

        let booking = self
            .create_booking(&session, customer_info, Some(&hipcamp_note(hipcamp_id)))
            .await?;

        match booking_id(&booking) {
            Some(id) => Ok(BookingOutcome::Created(id)),
            None => Err(Error::Checkfront(format!(
                "No booking ID in create response for HipCamp ID {}",
                hipcamp_id
            ))),
        }
    }

    pub async fn delete_booking(&self, booking_id: &str) -> Result<()> {
        self.request(Method::DELETE, &format!("booking/{}", booking_id), &[], None)
            .await?;
        info!("Deleted Checkfront booking: {}", booking_id);
        Ok(())
    }

    /// Delete the mirror of a HipCamp booking. Returns false when none exists.
    pub async fn delete_hipcamp_booking(&self, hipcamp_id: &str, linked: Option<&str>) -> Result<bool> {
        let booking_id = match linked {
            Some(id) => id.to_string(),
            None => match self.hipcamp_event_mapping().await?.remove(hipcamp_id) {
                Some(id) => id,
                None => {
                    debug!("No Checkfront booking found for HipCamp ID: {}", hipcamp_id);
                    return Ok(false);
                }
            },
        };

        info!(
            "Found Checkfront booking {} for HipCamp booking {}, deleting...",
            booking_id, hipcamp_id
        );
        self.delete_booking(&booking_id).await?;
        Ok(true)
    }
}

#[async_trait]
impl BookingSystem for CheckfrontClient {
    async fn hipcamp_mapping(&self) -> Result<HashMap<String, String>> {
        self.hipcamp_event_mapping().await
    }

    async fn create_mirror_booking(&self, event: &CalendarEvent) -> Result<BookingOutcome> {
        let customer = hipcamp::customer_info(event);
        self.create_hipcamp_booking(event, &customer).await
    }

    async fn delete_mirror_booking(&self, hipcamp_id: &str, linked: Option<&str>) -> Result<bool> {
        self.delete_hipcamp_booking(hipcamp_id, linked).await
    }
}

/// Checkfront returns lists either as arrays or as objects keyed by id.
fn collection(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map.values().cloned().collect(),
        _ => Vec::new(),
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Booking id from a `booking/create` response.
pub fn booking_id(response: &Value) -> Option<String> {
    [
        &response["booking"]["id"],
        &response["booking_id"],
        &response["id"],
        &response["booking"]["booking_id"],
    ]
    .into_iter()
    .find_map(value_to_string)
}

fn required_fields(form_ui: &Value) -> Vec<(String, String)> {
    let Value::Object(fields) = form_ui else {
        return Vec::new();
    };

    fields
        .iter()
        .filter_map(|(name, field)| {
            let layout = &field["define"]["layout"];
            let required = layout["customer"]["required"].as_i64() == Some(1);
            required.then(|| {
                let label = layout["lbl"].as_str().unwrap_or(name).to_string();
                (name.clone(), label)
            })
        })
        .collect()
}

/// Build the booking form: defaults for every field the DBR form asks for,
/// overridden by non-empty guest details under their Checkfront names.
pub fn customer_form(customer_info: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut form: BTreeMap<String, String> = [
        ("customer_name", "Guest"),
        ("customer_email", "guest@example.com"),
        ("customer_phone", "555-555-5555"),
        ("camping_setup", "No"),
        ("vehicle__trailer_camping", "No"),
        ("RV_details", "N/A"),
        ("trailer_details", "N/A"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    for (key, value) in customer_info {
        if value.is_empty() {
            continue;
        }
        let field = match key.as_str() {
            "name" => "customer_name",
            "email" => "customer_email",
            "phone" => "customer_phone",
            "tent_camping" => "camping_setup",
            "vehicle_trailer_camping" => "vehicle__trailer_camping",
            "rv_details" => "RV_details",
            other => other,
        };
        form.insert(field.to_string(), value.clone());
    }

    form
}
