//! OAuth access tokens for the BigQuery REST API.
//!
//! [`TokenProvider`] hands out a bearer token and caches it until shortly
//! before it expires. Depending on [`Credentials`] a fresh token is:
//!
//! - the inline token, unchanged;
//! - re-read from the token file;
//! - minted by signing an RS256 JWT assertion with a service-account key and
//!   exchanging it at the key's `token_uri`;
//! - fetched from the GCE metadata server.
//!
//! [`TokenProvider::invalidate`] drops the cached token so the next call
//! fetches a new one, which is what the backend does after a `401`.

use std::path::PathBuf;
use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::BackendError;
use crate::config::{Credentials, ServiceAccountKey};

/// OAuth scope requested for minted tokens.
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Token endpoint of the GCE metadata server.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for a signed assertion.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are renewed this long before their reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// How long a token read from a file is trusted before the file is re-read.
const FILE_TOKEN_TTL: Duration = Duration::from_secs(300);

enum TokenSource {
    Static(String),
    File(PathBuf),
    ServiceAccount {
        client_email: String,
        token_uri: String,
        key: EncodingKey,
    },
    Metadata {
        url: String,
    },
}

impl TokenSource {
    fn kind(&self) -> &'static str {
        match self {
            Self::Static(_) => "static",
            Self::File(_) => "file",
            Self::ServiceAccount { .. } => "service_account",
            Self::Metadata { .. } => "metadata",
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_usable(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now + EXPIRY_MARGIN < at)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Issues bearer tokens for one set of credentials, renewing them on expiry.
pub struct TokenProvider {
    source: TokenSource,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("source", &self.source.kind())
            .finish_non_exhaustive()
    }
}

impl TokenProvider {
    /// Builds a provider that makes its token requests through `client`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Auth`] if a service-account private key is not
    /// a valid RSA PEM.
    pub fn new(credentials: &Credentials, client: reqwest::Client) -> Result<Self, BackendError> {
        let source = match credentials {
            Credentials::AccessToken(token) => TokenSource::Static(token.clone()),
            Credentials::TokenFile(path) => TokenSource::File(path.clone()),
            Credentials::ServiceAccount(key) => service_account_source(key)?,
            Credentials::MetadataServer => TokenSource::Metadata {
                url: METADATA_TOKEN_URL.to_owned(),
            },
        };
        Ok(Self {
            source,
            client,
            cached: Mutex::new(None),
        })
    }

    /// Points a metadata-server provider at another URL.
    #[must_use]
    pub fn with_metadata_url(mut self, url: impl Into<String>) -> Self {
        if let TokenSource::Metadata { url: current } = &mut self.source {
            *current = url.into();
        }
        self
    }

    /// `false` for an inline token, where invalidating cannot produce a new one.
    pub fn can_refresh(&self) -> bool {
        !matches!(self.source, TokenSource::Static(_))
    }

    /// Returns a token that is not within the expiry margin, fetching one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Auth`] if no token can be obtained, or
    /// [`BackendError::Transport`] if the token endpoint is unreachable.
    pub async fn token(&self) -> Result<String, BackendError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_usable(Instant::now())) {
            return Ok(token.value.clone());
        }

        let fresh = self.fetch().await?;
        debug!(source = self.source.kind(), "access token renewed");
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    /// Drops the cached token.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn fetch(&self) -> Result<CachedToken, BackendError> {
        match &self.source {
            TokenSource::Static(token) => Ok(CachedToken {
                value: token.clone(),
                expires_at: None,
            }),
            TokenSource::File(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| BackendError::Auth(format!("reading {}: {e}", path.display())))?;
                let value = raw.trim();
                if value.is_empty() {
                    return Err(BackendError::Auth(format!("{} is empty", path.display())));
                }
                Ok(CachedToken {
                    value: value.to_owned(),
                    expires_at: Some(Instant::now() + FILE_TOKEN_TTL),
                })
            }
            TokenSource::ServiceAccount {
                client_email,
                token_uri,
                key,
            } => {
                let iat = chrono::Utc::now().timestamp();
                let claims = AssertionClaims {
                    iss: client_email,
                    scope: BIGQUERY_SCOPE,
                    aud: token_uri,
                    iat,
                    exp: iat + ASSERTION_LIFETIME_SECS,
                };
                let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, key)
                    .map_err(|e| BackendError::Auth(format!("signing assertion: {e}")))?;

                let resp = self
                    .client
                    .post(token_uri)
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
                    .send()
                    .await?;
                read_token_response(resp).await
            }
            TokenSource::Metadata { url } => {
                let resp = self
                    .client
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?;
                read_token_response(resp).await
            }
        }
    }
}

fn service_account_source(key: &ServiceAccountKey) -> Result<TokenSource, BackendError> {
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| BackendError::Auth(format!("invalid private key for {}: {e}", key.client_email)))?;
    Ok(TokenSource::ServiceAccount {
        client_email: key.client_email.clone(),
        token_uri: key.token_uri.clone(),
        key: encoding_key,
    })
}

async fn read_token_response(resp: reqwest::Response) -> Result<CachedToken, BackendError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(BackendError::Auth(format!(
            "token endpoint returned {}: {}",
            status.as_u16(),
            body.chars().take(200).collect::<String>()
        )));
    }

    let token: TokenResponse = resp
        .json()
        .await
        .map_err(|e| BackendError::Auth(format!("malformed token response: {e}")))?;
    Ok(CachedToken {
        value: token.access_token,
        expires_at: token
            .expires_in
            .map(|secs| Instant::now() + Duration::from_secs(secs)),
    })
}
