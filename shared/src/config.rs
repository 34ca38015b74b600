//! Configuration management for Lambda functions.

use std::env;
use std::path::PathBuf;

use crate::{Error, Result};

/// Default name of the consolidated calendar in Google.
pub const DEFAULT_CALENDAR_NAME: &str = "DBR Camping";

/// Longest look-back window accepted for existing Google events.
pub const MAX_SYNC_RANGE_DAYS: i64 = 3650;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Summary of the main Google calendar
    pub calendar_name: String,
    /// How many days back to read existing Google events
    pub sync_range_days: i64,
    /// Time zone attached to all-day Google events
    pub timezone: String,
    /// Secret holding Checkfront API credentials
    pub checkfront_secret_name: String,
    /// Secret holding the Google OAuth client
    pub google_credentials_secret_name: String,
    /// Secret holding the Google authorized-user token
    pub google_token_secret_name: String,
    /// Secret holding the site configuration JSON
    pub site_config_secret_name: String,
    /// AWS region
    pub aws_region: String,
    /// Credential files used instead of Secrets Manager outside Lambda
    pub local_files: Option<LocalCredentialFiles>,
}

/// Paths of credential files for local runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCredentialFiles {
    pub checkfront_credentials: PathBuf,
    pub google_credentials: PathBuf,
    pub google_token: PathBuf,
    pub site_config: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let sync_range_days = match lookup("SYNC_RANGE_DAYS") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|days| (0..=MAX_SYNC_RANGE_DAYS).contains(days))
                .ok_or_else(|| {
                    Error::Config(format!(
                        "SYNC_RANGE_DAYS must be an integer between 0 and {}, got '{}'",
                        MAX_SYNC_RANGE_DAYS, raw
                    ))
                })?,
            None => 90,
        };

        // Inside Lambda the function name is always set
        let running_locally = lookup("AWS_LAMBDA_FUNCTION_NAME").is_none();
        let local_files = if running_locally {
            match (
                lookup("CHECKFRONT_CREDENTIALS_PATH"),
                lookup("GOOGLE_CREDENTIALS_PATH"),
                lookup("GOOGLE_TOKEN_PATH"),
                lookup("SITE_CONFIG_PATH"),
            ) {
                (Some(checkfront), Some(google), Some(token), Some(site)) => Some(LocalCredentialFiles {
                    checkfront_credentials: checkfront.into(),
                    google_credentials: google.into(),
                    google_token: token.into(),
                    site_config: site.into(),
                }),
                _ => None,
            }
        } else {
            None
        };

        Ok(Self {
            calendar_name: var_or("CALENDAR_NAME", DEFAULT_CALENDAR_NAME),
            sync_range_days,
            timezone: var_or("TIMEZONE", "America/New_York"),
            checkfront_secret_name: var_or("CHECKFRONT_SECRET_NAME", "checkfront_credentials"),
            google_credentials_secret_name: var_or("GOOGLE_CREDENTIALS_SECRET_NAME", "google_credentials"),
            google_token_secret_name: var_or("GOOGLE_TOKEN_SECRET_NAME", "google_token"),
            site_config_secret_name: var_or("SITE_CONFIG_SECRET_NAME", "site_configuration"),
            aws_region: var_or("AWS_REGION", "us-east-1"),
            local_files,
        })
    }
}

/// Read a required environment variable.
pub fn required_var(key: &str) -> Result<String> {
    env::var(key).map_err(|_| Error::Config(format!("{} not set", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("AWS_LAMBDA_FUNCTION_NAME", "camp-sync")]).unwrap();
        assert_eq!(config.calendar_name, "DBR Camping");
        assert_eq!(config.sync_range_days, 90);
        assert_eq!(config.timezone, "America/New_York");
        assert_eq!(config.site_config_secret_name, "site_configuration");
        assert!(config.local_files.is_none());
    }

    #[test]
    fn test_local_files_require_all_paths() {
        let partial = config_from(&[("SITE_CONFIG_PATH", "/tmp/site.json")]).unwrap();
        assert!(partial.local_files.is_none());

        let full = config_from(&[
            ("CHECKFRONT_CREDENTIALS_PATH", "cf.json"),
            ("GOOGLE_CREDENTIALS_PATH", "google.json"),
            ("GOOGLE_TOKEN_PATH", "token.json"),
            ("SITE_CONFIG_PATH", "site.json"),
        ])
        .unwrap();
        let files = full.local_files.unwrap();
        assert_eq!(files.google_token, PathBuf::from("token.json"));
    }

    #[test]
    fn test_local_files_ignored_inside_lambda() {
        let config = config_from(&[
            ("AWS_LAMBDA_FUNCTION_NAME", "camp-sync"),
            ("CHECKFRONT_CREDENTIALS_PATH", "cf.json"),
            ("GOOGLE_CREDENTIALS_PATH", "google.json"),
            ("GOOGLE_TOKEN_PATH", "token.json"),
            ("SITE_CONFIG_PATH", "site.json"),
        ])
        .unwrap();
        assert!(config.local_files.is_none());
    }

    #[test]
    fn test_invalid_sync_range() {
        let err = config_from(&[("SYNC_RANGE_DAYS", "soon")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = config_from(&[("SYNC_RANGE_DAYS", "-1")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_sync_range_is_capped() {
        let config = config_from(&[("SYNC_RANGE_DAYS", "3650")]).unwrap();
        assert_eq!(config.sync_range_days, MAX_SYNC_RANGE_DAYS);

        let err = config_from(&[("SYNC_RANGE_DAYS", "100000000")]).unwrap_err();
        assert!(err.to_string().contains("between 0 and 3650"));
    }
}
