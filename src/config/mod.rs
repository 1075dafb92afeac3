//! Process configuration loaded from environment variables.
//!
//! | Variable                         | Default                                            |
//! |----------------------------------|----------------------------------------------------|
//! | `HOST`                           | `0.0.0.0`                                          |
//! | `PORT`                           | `8080`                                             |
//! | `API_NAME`                       | `epicache`                                         |
//! | `API_VER`                        | `alpha`                                            |
//! | `BQ_ENDPOINT`                    | `https://bigquery.googleapis.com/bigquery/v2`      |
//! | `BQ_PROJECT_ID`                  | *(unset; taken from the service-account key)*      |
//! | `BQ_ACCESS_TOKEN`                | *(unset)*                                          |
//! | `BQ_ACCESS_TOKEN_FILE`           | *(unset)*                                          |
//! | `BQ_SA_KEY_JSON_FILE`            | *(unset)*                                          |
//! | `GOOGLE_APPLICATION_CREDENTIALS` | *(unset)*                                          |
//! | `BQ_USE_METADATA_SERVER`         | `false`                                            |
//! | `BQ_TIMEOUT_SECS`                | `30`                                               |
//!
//! Credentials come from the first source that is set, in table order. A
//! token file is re-read whenever the cached token is dropped, and a
//! service-account key mints its own tokens. With no source the backend
//! reports itself unavailable.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default BigQuery v2 REST endpoint.
pub const DEFAULT_BQ_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Token endpoint used when a service-account key omits `token_uri`.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to read {path}: {source}")]
    TokenFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read service-account key {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed service-account key {path}: {source}")]
    KeyFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The fields of a Google service-account JSON key needed to mint tokens.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_owned()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Where BigQuery access tokens come from.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A pre-issued bearer token.
    AccessToken(String),
    /// A file holding a bearer token that something else keeps current.
    TokenFile(PathBuf),
    /// A service-account key; tokens are minted and renewed before expiry.
    ServiceAccount(ServiceAccountKey),
    /// The default service account of the GCE metadata server.
    MetadataServer,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
            Self::TokenFile(path) => f.debug_tuple("TokenFile").field(path).finish(),
            Self::ServiceAccount(key) => f.debug_tuple("ServiceAccount").field(key).finish(),
            Self::MetadataServer => f.write_str("MetadataServer"),
        }
    }
}

/// Connection settings for the remote query engine.
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub endpoint: String,
    pub project_id: Option<String>,
    pub credentials: Option<Credentials>,
    /// Applied both as the HTTP request timeout and the engine-side `timeoutMs`.
    pub timeout: Duration,
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_BQ_ENDPOINT.to_owned(),
            project_id: None,
            credentials: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub api_name: String,
    pub api_version: String,
    pub bigquery: BigQueryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            api_name: "epicache".to_owned(),
            api_version: "alpha".to_owned(),
            bigquery: BigQueryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparsable numbers or flags,
    /// [`ConfigError::TokenFile`] if `BQ_ACCESS_TOKEN_FILE` cannot be read, and
    /// [`ConfigError::KeyFile`] or [`ConfigError::KeyFormat`] for an unreadable
    /// or malformed service-account key.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Loads configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                reason: e.to_string(),
            })?,
            None => defaults.port,
        };

        let timeout = match get("BQ_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) => {
                    return Err(ConfigError::Invalid {
                        name: "BQ_TIMEOUT_SECS",
                        reason: "must be > 0".to_owned(),
                    });
                }
                Ok(secs) => Duration::from_secs(secs),
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        name: "BQ_TIMEOUT_SECS",
                        reason: e.to_string(),
                    });
                }
            },
            None => defaults.bigquery.timeout,
        };

        let use_metadata = match get("BQ_USE_METADATA_SERVER") {
            Some(raw) => parse_flag(&raw).ok_or_else(|| ConfigError::Invalid {
                name: "BQ_USE_METADATA_SERVER",
                reason: format!("expected true or false, got {raw:?}"),
            })?,
            None => false,
        };

        let credentials = if let Some(token) = get("BQ_ACCESS_TOKEN") {
            Some(Credentials::AccessToken(token))
        } else if let Some(path) = get("BQ_ACCESS_TOKEN_FILE") {
            // Fail at startup on a bad path; the contents are read per refresh.
            if let Err(source) = std::fs::metadata(&path) {
                return Err(ConfigError::TokenFile { path, source });
            }
            Some(Credentials::TokenFile(PathBuf::from(path)))
        } else if let Some(path) =
            get("BQ_SA_KEY_JSON_FILE").or_else(|| get("GOOGLE_APPLICATION_CREDENTIALS"))
        {
            Some(Credentials::ServiceAccount(read_service_account_key(path)?))
        } else if use_metadata {
            Some(Credentials::MetadataServer)
        } else {
            None
        };

        let project_id = get("BQ_PROJECT_ID").or_else(|| match &credentials {
            Some(Credentials::ServiceAccount(key)) => key.project_id.clone(),
            _ => None,
        });

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port,
            api_name: get("API_NAME").unwrap_or(defaults.api_name),
            api_version: get("API_VER").unwrap_or(defaults.api_version),
            bigquery: BigQueryConfig {
                endpoint: get("BQ_ENDPOINT").unwrap_or(defaults.bigquery.endpoint),
                project_id,
                credentials,
                timeout,
            },
        })
    }

    /// `host:port` string suitable for [`crate::server::Server::bind`].
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn read_service_account_key(path: String) -> Result<ServiceAccountKey, ConfigError> {
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(source) => return Err(ConfigError::KeyFile { path, source }),
    };
    serde_json::from_str(&raw).map_err(|source| ConfigError::KeyFormat { path, source })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn fixture_key() -> &'static str {
        concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/service_account.json")
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = AppConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.api_name, "epicache");
        assert_eq!(cfg.api_version, "alpha");
        assert_eq!(cfg.bigquery.endpoint, DEFAULT_BQ_ENDPOINT);
        assert!(cfg.bigquery.project_id.is_none());
        assert!(cfg.bigquery.credentials.is_none());
        assert_eq!(cfg.bigquery.timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = AppConfig::from_vars(&vars(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
            ("API_NAME", "covid-api"),
            ("BQ_PROJECT_ID", "my-project"),
            ("BQ_ACCESS_TOKEN", " ya29.token "),
            ("BQ_TIMEOUT_SECS", "10"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:9000");
        assert_eq!(cfg.api_name, "covid-api");
        assert_eq!(cfg.bigquery.project_id.as_deref(), Some("my-project"));
        assert_eq!(
            cfg.bigquery.credentials,
            Some(Credentials::AccessToken("ya29.token".to_owned()))
        );
        assert_eq!(cfg.bigquery.timeout, Duration::from_secs(10));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = AppConfig::from_vars(&vars(&[("PORT", "  "), ("BQ_PROJECT_ID", "")])).unwrap();
        assert_eq!(cfg.port, 8080);
        assert!(cfg.bigquery.project_id.is_none());
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = AppConfig::from_vars(&vars(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = AppConfig::from_vars(&vars(&[("BQ_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BQ_TIMEOUT_SECS", .. }));
    }

    #[test]
    fn missing_token_file_is_an_error() {
        let err = AppConfig::from_vars(&vars(&[(
            "BQ_ACCESS_TOKEN_FILE",
            "/nonexistent_dir/nonexistent_token",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::TokenFile { .. }));
    }

    #[test]
    fn token_file_is_used_when_no_inline_token() {
        let path = std::env::temp_dir().join(format!("epicache-token-{}", std::process::id()));
        std::fs::write(&path, "file-token\n").unwrap();

        let cfg = AppConfig::from_vars(&vars(&[(
            "BQ_ACCESS_TOKEN_FILE",
            path.to_str().unwrap(),
        )]))
        .unwrap();
        assert_eq!(cfg.bigquery.credentials, Some(Credentials::TokenFile(path.clone())));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn service_account_key_file_is_loaded() {
        let cfg = AppConfig::from_vars(&vars(&[("BQ_SA_KEY_JSON_FILE", fixture_key())])).unwrap();
        let Some(Credentials::ServiceAccount(key)) = &cfg.bigquery.credentials else {
            panic!("expected service-account credentials, got {:?}", cfg.bigquery.credentials);
        };
        assert_eq!(key.client_email, "epicache@epicache-test.iam.gserviceaccount.com");
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(cfg.bigquery.project_id.as_deref(), Some("epicache-test"));
        assert!(!format!("{:?}", cfg.bigquery).contains("PRIVATE KEY"));
    }

    #[test]
    fn application_default_key_is_a_fallback() {
        let cfg = AppConfig::from_vars(&vars(&[
            ("GOOGLE_APPLICATION_CREDENTIALS", fixture_key()),
            ("BQ_PROJECT_ID", "billing-project"),
        ]))
        .unwrap();
        assert!(matches!(cfg.bigquery.credentials, Some(Credentials::ServiceAccount(_))));
        assert_eq!(cfg.bigquery.project_id.as_deref(), Some("billing-project"));
    }

    #[test]
    fn missing_key_file_is_an_error() {
        let err = AppConfig::from_vars(&vars(&[(
            "BQ_SA_KEY_JSON_FILE",
            "/non_existent_dir/non_existent_file",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::KeyFile { .. }));
    }

    #[test]
    fn malformed_key_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("epicache-key-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"client_email": "x@example.test"}"#).unwrap();

        let err = AppConfig::from_vars(&vars(&[(
            "BQ_SA_KEY_JSON_FILE",
            path.to_str().unwrap(),
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::KeyFormat { .. }));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn metadata_server_is_opt_in_and_lowest_priority() {
        let cfg = AppConfig::from_vars(&vars(&[("BQ_USE_METADATA_SERVER", "true")])).unwrap();
        assert_eq!(cfg.bigquery.credentials, Some(Credentials::MetadataServer));

        let cfg = AppConfig::from_vars(&vars(&[
            ("BQ_USE_METADATA_SERVER", "1"),
            ("BQ_ACCESS_TOKEN", "inline"),
        ]))
        .unwrap();
        assert_eq!(
            cfg.bigquery.credentials,
            Some(Credentials::AccessToken("inline".to_owned()))
        );

        let err = AppConfig::from_vars(&vars(&[("BQ_USE_METADATA_SERVER", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BQ_USE_METADATA_SERVER", .. }));
    }
}
