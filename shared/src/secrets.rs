//! Credential loading from AWS Secrets Manager or, outside Lambda, local files.

use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::checkfront::CheckfrontCredentials;
use crate::config::{Config, LocalCredentialFiles};
use crate::google::{AuthorizedUserToken, ClientSecrets};
use crate::site_config::SiteConfiguration;
use crate::{Error, Result};

/// Cached secrets with lazy initialization.
static SECRETS_CACHE: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();

fn get_cache() -> &'static RwLock<HashMap<String, String>> {
    SECRETS_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Get a secret value from Secrets Manager with caching.
pub async fn get_secret(client: &SecretsClient, secret_id: &str) -> Result<String> {
    {
        let cache = get_cache().read().await;
        if let Some(value) = cache.get(secret_id) {
            return Ok(value.clone());
        }
    }

    let response = client
        .get_secret_value()
        .secret_id(secret_id)
        .send()
        .await
        .map_err(|e| Error::Aws(format!("Failed to get secret {}: {}", secret_id, e)))?;

    let secret_string = response
        .secret_string()
        .ok_or_else(|| Error::Aws(format!("Secret {} has no string value", secret_id)))?
        .to_string();

    {
        let mut cache = get_cache().write().await;
        cache.insert(secret_id.to_string(), secret_string.clone());
    }

    Ok(secret_string)
}

/// Everything a sync run needs to talk to the three systems.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub checkfront: CheckfrontCredentials,
    pub google_client: ClientSecrets,
    pub google_token: AuthorizedUserToken,
    pub site_config: SiteConfiguration,
}

/// Where credentials are read from.
pub enum CredentialSource {
    SecretsManager(SecretsClient),
    LocalFiles(LocalCredentialFiles),
}

impl CredentialSource {
    /// Local files when configured, otherwise Secrets Manager.
    pub async fn from_config(config: &Config) -> Self {
        match &config.local_files {
            Some(files) => {
                info!("Loading credentials from local files");
                CredentialSource::LocalFiles(files.clone())
            }
            None => {
                let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(aws_config::Region::new(config.aws_region.clone()))
                    .load()
                    .await;
                CredentialSource::SecretsManager(SecretsClient::new(&aws_config))
            }
        }
    }

    async fn read(&self, secret_name: &str, path: impl Fn(&LocalCredentialFiles) -> &Path) -> Result<String> {
        match self {
            CredentialSource::SecretsManager(client) => {
                debug!("Loading secret {}", secret_name);
                get_secret(client, secret_name).await
            }
            CredentialSource::LocalFiles(files) => {
                let path = path(files);
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))
            }
        }
    }

    pub async fn load(&self, config: &Config) -> Result<Credentials> {
        let checkfront = self
            .read(&config.checkfront_secret_name, |f| f.checkfront_credentials.as_path())
            .await?;
        let google_client = self
            .read(&config.google_credentials_secret_name, |f| f.google_credentials.as_path())
            .await?;
        let google_token = self
            .read(&config.google_token_secret_name, |f| f.google_token.as_path())
            .await?;
        let site_config = self
            .read(&config.site_config_secret_name, |f| f.site_config.as_path())
            .await?;

        Ok(Credentials {
            checkfront: parse_secret("Checkfront credentials", &checkfront)?,
            google_client: parse_secret("Google credentials", &google_client)?,
            google_token: parse_secret("Google token", &google_token)?,
            site_config: SiteConfiguration::from_json(&site_config)
                .map_err(|e| Error::Config(format!("Invalid site configuration: {}", e)))?,
        })
    }
}

fn parse_secret<T: DeserializeOwned>(what: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::Config(format!("Failed to parse {}: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", uuid::Uuid::new_v4(), name));
        tokio::fs::write(&path, contents).await.unwrap();
        path
    }

    #[test]
    fn test_parse_checkfront_credentials() {
        let creds: CheckfrontCredentials =
            parse_secret("Checkfront credentials", r#"{"api_key":"k","api_secret":"s"}"#).unwrap();
        assert_eq!(creds.api_key, "k");

        let err = parse_secret::<CheckfrontCredentials>("Checkfront credentials", r#"{"api_key":"k"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_load_local_files() {
        let files = LocalCredentialFiles {
            checkfront_credentials: write_temp("cf.json", r#"{"api_key":"k","api_secret":"s"}"#).await,
            google_credentials: write_temp(
                "credentials.json",
                r#"{"installed":{"client_id":"id","client_secret":"secret"}}"#,
            )
            .await,
            google_token: write_temp("token.json", r#"{"refresh_token":"r"}"#).await,
            site_config: write_temp(
                "site.json",
                r#"{"SITE_DISPLAY_NAMES":{"HillTop Site #1":"HT1"},"CHECKFRONT_HOST":"dbr.checkfront.com"}"#,
            )
            .await,
        };
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.local_files = Some(files.clone());

        let source = CredentialSource::from_config(&config).await;
        let credentials = source.load(&config).await.unwrap();
        assert_eq!(credentials.checkfront.api_secret, "s");
        assert_eq!(credentials.google_token.refresh_token.as_deref(), Some("r"));
        assert_eq!(credentials.site_config.display_name("HillTop Site #1"), "HT1");

        for path in [
            files.checkfront_credentials,
            files.google_credentials,
            files.google_token,
            files.site_config,
        ] {
            let _ = tokio::fs::remove_file(path).await;
        }
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let files = LocalCredentialFiles {
            checkfront_credentials: PathBuf::from("/nonexistent/cf.json"),
            google_credentials: PathBuf::from("/nonexistent/credentials.json"),
            google_token: PathBuf::from("/nonexistent/token.json"),
            site_config: PathBuf::from("/nonexistent/site.json"),
        };
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.local_files = Some(files.clone());

        let err = CredentialSource::LocalFiles(files)
            .load(&config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cf.json"));
    }
}
