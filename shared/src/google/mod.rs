//! Google Calendar access: OAuth token handling and the Calendar v3 API.

pub mod calendar;
pub mod oauth;

pub use calendar::{event_body, CalendarListEntry, EventBody, GoogleCalendarClient};
pub use oauth::{access_token, AuthorizedUserToken, ClientSecrets};
