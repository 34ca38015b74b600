//! Booking reconciliation between the source snapshots and a Google calendar.
//!
//! Planning is pure: it compares the desired events (HipCamp and Checkfront
//! bookings that have not ended) with the events already synced into the
//! calendar, keyed by `(source, booking id)`. Execution applies the plan
//! through the [`CalendarStore`] and [`BookingSystem`] ports and collects
//! per-event failures into a [`SyncReport`] instead of aborting the run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::models::{CalendarEvent, Snapshot, Source, SyncKey};
use crate::Result;

/// Result of mirroring a HipCamp booking into Checkfront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    Created(String),
    /// The dates are already taken in Checkfront
    AlreadyBooked,
    /// No Checkfront item for this site
    Unmapped(String),
}

/// Booking system that holds mirror bookings of HipCamp reservations.
#[async_trait]
pub trait BookingSystem: Send + Sync {
    /// HipCamp booking id -> mirror booking id.
    async fn hipcamp_mapping(&self) -> Result<HashMap<String, String>>;

    async fn create_mirror_booking(&self, event: &CalendarEvent) -> Result<BookingOutcome>;

    /// Returns whether a mirror booking was found and deleted.
    async fn delete_mirror_booking(&self, hipcamp_id: &str, linked: Option<&str>) -> Result<bool>;
}

/// Calendar the bookings are synced into.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Returns the new event id.
    async fn insert_event(&self, calendar_id: &str, event: &CalendarEvent) -> Result<String>;

    async fn update_event(&self, calendar_id: &str, event_id: &str, event: &CalendarEvent) -> Result<()>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<()>;
}

/// Summary as written to the calendar, e.g. `"HT1 - Jane Doe Hipcamp"`.
pub fn labeled_summary(event: &CalendarEvent) -> String {
    let suffix = format!(" {}", event.source.label());
    if event.summary.ends_with(&suffix) {
        event.summary.clone()
    } else {
        format!("{}{}", event.summary, suffix)
    }
}

/// Whether the calendar copy differs from the source booking.
fn content_differs(desired: &CalendarEvent, existing: &CalendarEvent) -> bool {
    labeled_summary(desired) != existing.summary
        || desired.description.as_deref().unwrap_or("") != existing.description.as_deref().unwrap_or("")
        || desired.start.date() != existing.start.date()
        || desired.end.date() != existing.end.date()
}

/// Changes needed to bring a calendar in line with the sources.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub creates: Vec<CalendarEvent>,
    /// Desired events carrying the calendar event id to overwrite
    pub updates: Vec<CalendarEvent>,
    /// Calendar events whose booking is gone
    pub deletes: Vec<CalendarEvent>,
    /// Extra calendar copies of a key already present
    pub duplicates: Vec<CalendarEvent>,
    /// Unchanged HipCamp events with no linked mirror booking yet
    pub unlinked: Vec<CalendarEvent>,
    pub unchanged: usize,
    pub skipped_past: usize,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty()
            && self.updates.is_empty()
            && self.deletes.is_empty()
            && self.duplicates.is_empty()
            && self.unlinked.is_empty()
    }
}

/// Plan the changes for one calendar.
pub fn plan(
    hipcamp: &Snapshot,
    checkfront: &Snapshot,
    existing: &[CalendarEvent],
    now: DateTime<Utc>,
) -> SyncPlan {
    let mut plan = SyncPlan::default();

    let mut current: BTreeMap<SyncKey, &CalendarEvent> = BTreeMap::new();
    for event in existing {
        let Some(key) = event.key() else {
            continue;
        };
        if current.contains_key(&key) {
            debug!("Duplicate calendar event for {} booking {}", key.0, key.1);
            if !event.has_ended(now) {
                plan.duplicates.push(event.clone());
            }
            continue;
        }
        current.insert(key, event);
    }

    let mut desired: BTreeMap<SyncKey, &CalendarEvent> = BTreeMap::new();
    for event in hipcamp.events.iter().chain(&checkfront.events) {
        let Some(key) = event.key() else {
            continue;
        };
        if event.has_ended(now) {
            plan.skipped_past += 1;
            continue;
        }
        desired.insert(key, event);
    }

    for (key, event) in &current {
        if desired.contains_key(key) || event.has_ended(now) {
            continue;
        }
        let snapshot_complete = match key.0 {
            Source::HipCamp => hipcamp.complete,
            Source::Checkfront => checkfront.complete,
            Source::GoogleCalendar => false,
        };
        if snapshot_complete {
            plan.deletes.push((*event).clone());
        } else {
            debug!("Keeping {} booking {}: source snapshot incomplete", key.0, key.1);
        }
    }

    for (key, event) in desired {
        match current.get(&key) {
            None => plan.creates.push(event.clone()),
            Some(existing) => {
                let mut update = event.clone();
                update.google_event_id = existing.google_event_id.clone();
                if update.checkfront_booking_id.is_none() {
                    update.checkfront_booking_id = existing.checkfront_booking_id.clone();
                }
                if content_differs(event, existing) {
                    plan.updates.push(update);
                } else if update.source == Source::HipCamp && update.checkfront_booking_id.is_none() {
                    plan.unlinked.push(update);
                } else {
                    plan.unchanged += 1;
                }
            }
        }
    }

    plan
}

/// Outcome of syncing one calendar.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub calendar: String,
    pub created: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub deleted: u32,
    pub skipped_past: u32,
    pub bookings_created: u32,
    pub bookings_deleted: u32,
    pub errors: Vec<String>,
}

/// Applies a [`SyncPlan`] to one calendar.
pub struct Reconciler<'a> {
    calendar: &'a dyn CalendarStore,
    bookings: &'a dyn BookingSystem,
    calendar_id: &'a str,
    mirror_bookings: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(calendar: &'a dyn CalendarStore, bookings: &'a dyn BookingSystem, calendar_id: &'a str) -> Self {
        Self {
            calendar,
            bookings,
            calendar_id,
            mirror_bookings: true,
        }
    }

    /// Disable Checkfront mirror bookings (per-site calendars).
    pub fn without_mirror_bookings(mut self) -> Self {
        self.mirror_bookings = false;
        self
    }

    pub async fn execute(&self, plan: SyncPlan, report: &mut SyncReport) {
        report.unchanged += plan.unchanged as u32;
        report.skipped_past += plan.skipped_past as u32;

        for event in &plan.duplicates {
            if let Some(event_id) = event.google_event_id.as_deref() {
                match self.calendar.delete_event(self.calendar_id, event_id).await {
                    Ok(()) => info!("Removed duplicate event: {}", event.summary),
                    Err(e) => self.record(report, format!("Error removing duplicate {}: {}", event.summary, e)),
                }
            }
        }

        for event in &plan.deletes {
            self.delete(event, report).await;
        }

        let mapping = self.load_mapping(&plan, report).await;

        for mut event in plan.creates {
            let event_id = match self.calendar.insert_event(self.calendar_id, &event).await {
                Ok(id) => {
                    info!("Created event: {} {}", event.summary, event.date_range());
                    debug!("New event id: {}", id);
                    report.created += 1;
                    id
                }
                Err(e) => {
                    self.record(report, format!("Error creating {}: {}", event.summary, e));
                    continue;
                }
            };
            if self.mirror(&mut event, mapping.as_ref(), report).await {
                self.write_link(&event_id, &event, report).await;
            }
        }

        for mut event in plan.unlinked {
            let Some(event_id) = event.google_event_id.clone() else {
                continue;
            };
            if !self.mirror(&mut event, mapping.as_ref(), report).await {
                report.unchanged += 1;
                continue;
            }
            if self.write_link(&event_id, &event, report).await {
                report.updated += 1;
            }
        }

        for mut event in plan.updates {
            let Some(event_id) = event.google_event_id.clone() else {
                continue;
            };
            self.mirror(&mut event, mapping.as_ref(), report).await;
            match self.calendar.update_event(self.calendar_id, &event_id, &event).await {
                Ok(()) => {
                    info!("Updated event: {} {}", event.summary, event.date_range());
                    report.updated += 1;
                }
                Err(e) => self.record(report, format!("Error updating {}: {}", event.summary, e)),
            }
        }
    }

    async fn delete(&self, event: &CalendarEvent, report: &mut SyncReport) {
        let Some(event_id) = event.google_event_id.as_deref() else {
            return;
        };
        if let Err(e) = self.calendar.delete_event(self.calendar_id, event_id).await {
            self.record(report, format!("Error deleting {}: {}", event.summary, e));
            return;
        }
        info!("Deleted event: {} {}", event.summary, event.date_range());
        report.deleted += 1;

        if !self.mirror_bookings || event.source != Source::HipCamp {
            return;
        }
        let Some(hipcamp_id) = event.source_id.as_deref() else {
            return;
        };
        match self
            .bookings
            .delete_mirror_booking(hipcamp_id, event.checkfront_booking_id.as_deref())
            .await
        {
            Ok(true) => report.bookings_deleted += 1,
            Ok(false) => {}
            Err(e) => self.record(
                report,
                format!("Error deleting Checkfront booking for HipCamp ID {}: {}", hipcamp_id, e),
            ),
        }
    }

    async fn load_mapping(&self, plan: &SyncPlan, report: &mut SyncReport) -> Option<HashMap<String, String>> {
        let needs_mapping = plan
            .creates
            .iter()
            .chain(&plan.updates)
            .chain(&plan.unlinked)
            .any(|event| event.source == Source::HipCamp && event.checkfront_booking_id.is_none());
        if !self.mirror_bookings || !needs_mapping {
            return None;
        }

        match self.bookings.hipcamp_mapping().await {
            Ok(mapping) => {
                debug!("Loaded {} Checkfront mirror bookings", mapping.len());
                Some(mapping)
            }
            Err(e) => {
                // Without the mapping a new booking could duplicate an existing one
                self.record(report, format!("Error loading Checkfront mapping: {}", e));
                None
            }
        }
    }

    /// Ensure a HipCamp event has a Checkfront mirror.
    ///
    /// Returns whether a link was newly set on the event.
    async fn mirror(
        &self,
        event: &mut CalendarEvent,
        mapping: Option<&HashMap<String, String>>,
        report: &mut SyncReport,
    ) -> bool {
        if !self.mirror_bookings || event.source != Source::HipCamp || event.checkfront_booking_id.is_some() {
            return false;
        }
        let (Some(mapping), Some(hipcamp_id)) = (mapping, event.source_id.clone()) else {
            return false;
        };

        if let Some(linked) = mapping.get(&hipcamp_id) {
            debug!("HipCamp booking {} already in Checkfront as {}", hipcamp_id, linked);
            event.checkfront_booking_id = Some(linked.clone());
            return true;
        }

        match self.bookings.create_mirror_booking(event).await {
            Ok(BookingOutcome::Created(id)) => {
                info!("Created Checkfront booking {} for HipCamp ID {}", id, hipcamp_id);
                event.checkfront_booking_id = Some(id);
                report.bookings_created += 1;
                true
            }
            Ok(BookingOutcome::AlreadyBooked) => {
                debug!("Checkfront already holds the dates for HipCamp ID {}", hipcamp_id);
                false
            }
            Ok(BookingOutcome::Unmapped(site)) => {
                debug!("No Checkfront item for {}, HipCamp ID {} not mirrored", site, hipcamp_id);
                false
            }
            Err(e) => {
                self.record(
                    report,
                    format!("Error creating Checkfront booking for HipCamp ID {}: {}", hipcamp_id, e),
                );
                false
            }
        }
    }

    /// Store the mirror booking id on an existing calendar event.
    async fn write_link(&self, event_id: &str, event: &CalendarEvent, report: &mut SyncReport) -> bool {
        match self.calendar.update_event(self.calendar_id, event_id, event).await {
            Ok(()) => {
                debug!(
                    "Linked {} to Checkfront booking {}",
                    event.summary,
                    event.checkfront_booking_id.as_deref().unwrap_or("-")
                );
                true
            }
            Err(e) => {
                self.record(report, format!("Error linking {}: {}", event.summary, e));
                false
            }
        }
    }

    fn record(&self, report: &mut SyncReport, message: String) {
        warn!("{}", message);
        report.errors.push(message);
    }
}
