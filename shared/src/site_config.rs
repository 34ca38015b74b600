//! Site configuration: display names, Checkfront item mapping and feed URLs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::{Validate, ValidationError};

use crate::Result;

/// Checkfront item that mirrors a HipCamp site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckfrontMapping {
    pub item_id: String,
    #[serde(default)]
    pub category_id: String,
}

/// Site configuration as stored in the `site_configuration` secret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SiteConfiguration {
    /// HipCamp site name -> short display code (e.g. "HT1")
    #[serde(rename = "SITE_DISPLAY_NAMES", default)]
    pub site_display_names: BTreeMap<String, String>,

    /// HipCamp site name -> Checkfront item
    #[serde(rename = "HIPCAMP_TO_CHECKFRONT", default)]
    #[validate(custom(function = "validate_mappings"))]
    pub hipcamp_to_checkfront: BTreeMap<String, CheckfrontMapping>,

    /// HipCamp site name -> iCal feed URL
    #[serde(rename = "HIPCAMP_ICAL_URLS", default)]
    #[validate(custom(function = "validate_feed_urls"))]
    pub hipcamp_ical_urls: BTreeMap<String, String>,

    #[serde(rename = "CHECKFRONT_ICAL_URL", default)]
    pub checkfront_ical_url: String,

    #[serde(rename = "CHECKFRONT_HOST", default)]
    pub checkfront_host: String,
}

impl SiteConfiguration {
    /// Parse and validate the configuration JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SiteConfiguration = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Display name for a HipCamp site, falling back to the site name.
    pub fn display_name<'a>(&'a self, site: &'a str) -> &'a str {
        self.site_display_names
            .get(site)
            .map(String::as_str)
            .unwrap_or(site)
    }

    /// HipCamp site whose display name matches.
    pub fn site_for_display_name(&self, display_name: &str) -> Option<&str> {
        self.site_display_names
            .iter()
            .find(|(_, display)| display.as_str() == display_name)
            .map(|(site, _)| site.as_str())
    }

    /// Checkfront item for an event summary of the form `"HT1 - Guest"`.
    pub fn mapping_for_summary(&self, summary: &str) -> Option<(&str, &CheckfrontMapping)> {
        let display = summary.split(" - ").next().unwrap_or(summary);
        let site = self.site_for_display_name(display)?;
        self.hipcamp_to_checkfront
            .get(site)
            .map(|mapping| (site, mapping))
    }
}

fn validate_mappings(mappings: &BTreeMap<String, CheckfrontMapping>) -> std::result::Result<(), ValidationError> {
    if mappings.values().any(|m| m.item_id.trim().is_empty()) {
        return Err(ValidationError::new("empty_item_id"));
    }
    Ok(())
}

fn validate_feed_urls(urls: &BTreeMap<String, String>) -> std::result::Result<(), ValidationError> {
    let bad = urls
        .values()
        .filter(|url| !url.is_empty())
        .any(|url| reqwest::Url::parse(url).is_err());
    if bad {
        return Err(ValidationError::new("invalid_feed_url"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "SITE_DISPLAY_NAMES": {"HillTop Site #1": "HT1", "Creek Site": "CR1"},
        "HIPCAMP_TO_CHECKFRONT": {"HillTop Site #1": {"item_id": "12", "category_id": "3"}},
        "HIPCAMP_ICAL_URLS": {"HillTop Site #1": "https://www.hipcamp.com/ical/abc.ics", "Creek Site": ""},
        "CHECKFRONT_ICAL_URL": "https://dbr.checkfront.com/view/bookings/ics/?id=1",
        "CHECKFRONT_HOST": "dbr.checkfront.com"
    }"#;

    #[test]
    fn test_parse_and_lookup() {
        let config = SiteConfiguration::from_json(CONFIG).unwrap();
        assert_eq!(config.display_name("HillTop Site #1"), "HT1");
        assert_eq!(config.display_name("Unknown"), "Unknown");
        assert_eq!(config.site_for_display_name("CR1"), Some("Creek Site"));

        let (site, mapping) = config.mapping_for_summary("HT1 - Jane Doe").unwrap();
        assert_eq!(site, "HillTop Site #1");
        assert_eq!(mapping.item_id, "12");
        assert!(config.mapping_for_summary("CR1 - Bob").is_none());
    }

    #[test]
    fn test_missing_keys_default_empty() {
        let config = SiteConfiguration::from_json("{}").unwrap();
        assert!(config.hipcamp_ical_urls.is_empty());
        assert_eq!(config.checkfront_host, "");
    }

    #[test]
    fn test_rejects_invalid_url() {
        let json = r#"{"HIPCAMP_ICAL_URLS": {"Site": "not a url"}}"#;
        assert!(SiteConfiguration::from_json(json).is_err());
    }

    #[test]
    fn test_rejects_empty_item_id() {
        let json = r#"{"HIPCAMP_TO_CHECKFRONT": {"Site": {"item_id": " "}}}"#;
        assert!(SiteConfiguration::from_json(json).is_err());
    }
}
