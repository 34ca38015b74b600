//! Error types for Camp Sync Lambda functions.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while syncing bookings.
#[derive(Error, Debug)]
pub enum Error {
    /// Outbound HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed iCalendar data
    #[error("iCal error: {0}")]
    Ical(String),

    /// Checkfront API rejected a request
    #[error("Checkfront error: {0}")]
    Checkfront(String),

    /// Checkfront reports the requested dates cannot be booked
    #[error("Item {item_id} is unavailable: {reason}")]
    Unavailable { item_id: String, reason: String },

    /// Google Calendar or OAuth API error
    #[error("Google API error ({status}): {message}")]
    Google { status: u16, message: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::Serialization(_) => 400,
            Error::NotFound(_) => 404,
            Error::Unavailable { .. } => 409,
            Error::Http(_) | Error::Checkfront(_) | Error::Google { .. } => 502,
            _ => 500,
        }
    }

    /// Whether Google rejected the call for missing calendar scopes.
    pub fn is_insufficient_permissions(&self) -> bool {
        matches!(self, Error::Google { status: 403, message } if message.contains("insufficientPermissions"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Validation("bad".into()).status_code(), 400);
        assert_eq!(Error::NotFound("calendar".into()).status_code(), 404);
        assert_eq!(
            Error::Unavailable {
                item_id: "12".into(),
                reason: "SOLDOUT".into()
            }
            .status_code(),
            409
        );
        assert_eq!(Error::Config("missing".into()).status_code(), 500);
    }

    #[test]
    fn test_insufficient_permissions() {
        let err = Error::Google {
            status: 403,
            message: "reason: insufficientPermissions".into(),
        };
        assert!(err.is_insufficient_permissions());

        let err = Error::Google {
            status: 404,
            message: "Not Found".into(),
        };
        assert!(!err.is_insufficient_permissions());
    }
}
