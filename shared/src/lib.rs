//! Shared library for the Camp Sync Lambda functions.
//!
//! Reads bookings from HipCamp and Checkfront iCal feeds, reconciles them into
//! Google Calendar, and mirrors HipCamp reservations into Checkfront.

pub mod checkfront;
pub mod config;
pub mod error;
pub mod google;
pub mod hipcamp;
pub mod http;
pub mod ical;
pub mod logging;
pub mod models;
pub mod runner;
pub mod secrets;
pub mod site_config;
pub mod sync;
pub mod triggers;

pub use config::Config;
pub use error::{Error, Result};
pub use models::{CalendarEvent, Snapshot, Source, SyncRequest};
pub use runner::{run_sync, SourceCounts, SyncSummary};
pub use secrets::{CredentialSource, Credentials};
pub use site_config::SiteConfiguration;
pub use sync::{BookingOutcome, BookingSystem, CalendarStore, SyncReport};
pub use triggers::{SqsMessage, Trigger};
