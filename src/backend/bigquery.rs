//! BigQuery REST backend (`jobs.query` + `jobs.getQueryResults`).
//!
//! Requests carry a bearer token from [`TokenProvider`]. A `401` drops the
//! cached token and the request is sent once more with a fresh one.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{BackendError, FieldValue, QueryBackend, Record, TokenProvider};
use crate::config::BigQueryConfig;

/// Maximum number of bytes of an error body echoed into [`BackendError::QueryFailed`].
const MAX_ERROR_BODY: usize = 500;

/// Query backend talking to the BigQuery v2 REST API.
#[derive(Debug, Clone)]
pub struct BigQueryBackend {
    client: reqwest::Client,
    endpoint: String,
    project_id: Option<String>,
    tokens: Option<Arc<TokenProvider>>,
    timeout_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    job_reference: Option<JobReference>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<SchemaField>,
}

#[derive(Debug, Clone, Deserialize)]
struct SchemaField {
    name: String,
    #[serde(rename = "type", default)]
    field_type: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl BigQueryBackend {
    /// Builds the HTTP client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Transport`] if the TLS backend cannot be
    /// initialised, or [`BackendError::Auth`] for an unusable private key.
    pub fn new(config: &BigQueryConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("epicache/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(4)
            .timeout(config.timeout)
            .build()?;
        let tokens = match &config.credentials {
            Some(credentials) => Some(Arc::new(TokenProvider::new(credentials, client.clone())?)),
            None => None,
        };

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            project_id: config.project_id.clone(),
            tokens,
            timeout_ms: config.timeout.as_millis() as u64,
        })
    }

    fn credentials(&self) -> Result<(&str, &TokenProvider), BackendError> {
        match (self.project_id.as_deref(), self.tokens.as_deref()) {
            (Some(project), Some(tokens)) => Ok((project, tokens)),
            _ => Err(BackendError::Unavailable),
        }
    }

    // Sends `build()` with a bearer token, retrying once with a fresh token
    // if the first one is rejected.
    async fn send_authorized<F>(&self, tokens: &TokenProvider, build: F) -> Result<reqwest::Response, BackendError>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let token = tokens.token().await?;
        let resp = build().bearer_auth(&token).send().await?;
        if resp.status() != reqwest::StatusCode::UNAUTHORIZED || !tokens.can_refresh() {
            return Ok(resp);
        }

        warn!("access token rejected; retrying with a fresh token");
        tokens.invalidate().await;
        let token = tokens.token().await?;
        Ok(build().bearer_auth(&token).send().await?)
    }

    async fn read_response(resp: reqwest::Response) -> Result<QueryResponse, BackendError> {
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.chars().take(MAX_ERROR_BODY).collect());
            return Err(BackendError::QueryFailed { status, message });
        }

        resp.json::<QueryResponse>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl QueryBackend for BigQueryBackend {
    fn available(&self) -> bool {
        self.credentials().is_ok()
    }

    async fn execute(&self, query: &str) -> Result<Vec<Record>, BackendError> {
        let (project, tokens) = self.credentials()?;
        let url = format!("{}/projects/{project}/queries", self.endpoint);
        let body = QueryRequest {
            query,
            use_legacy_sql: false,
            timeout_ms: self.timeout_ms,
        };

        debug!(url = %url, "submitting query");
        let resp = self
            .send_authorized(tokens, || self.client.post(&url).json(&body))
            .await?;
        let mut page = Self::read_response(resp).await?;

        if !page.job_complete {
            return Err(BackendError::QueryFailed {
                status: 200,
                message: "job did not complete within the request timeout".to_owned(),
            });
        }

        let schema = page.schema.take().unwrap_or_default();
        let mut records = decode_rows(&schema, std::mem::take(&mut page.rows))?;

        while let Some(page_token) = page.page_token.take() {
            let Some(job) = page.job_reference.take() else {
                return Err(BackendError::Decode(
                    "page token returned without a job reference".to_owned(),
                ));
            };

            debug!(job_id = %job.job_id, rows = records.len(), "fetching next result page");
            let url = format!("{}/projects/{project}/queries/{}", self.endpoint, job.job_id);
            let mut params = vec![("pageToken", page_token)];
            if let Some(location) = &job.location {
                params.push(("location", location.clone()));
            }

            let resp = self
                .send_authorized(tokens, || self.client.get(&url).query(&params))
                .await?;
            page = Self::read_response(resp).await?;
            records.extend(decode_rows(&schema, std::mem::take(&mut page.rows))?);
            if page.job_reference.is_none() {
                page.job_reference = Some(job);
            }
        }

        Ok(records)
    }
}

// Map one page of `rows[].f[].v` cells onto the schema's column names and types.
fn decode_rows(schema: &TableSchema, rows: Vec<TableRow>) -> Result<Vec<Record>, BackendError> {
    rows.into_iter()
        .map(|row| {
            if row.f.len() != schema.fields.len() {
                return Err(BackendError::Decode(format!(
                    "row has {} cells but schema has {} fields",
                    row.f.len(),
                    schema.fields.len()
                )));
            }

            let mut record = Record::new();
            for (field, cell) in schema.fields.iter().zip(row.f) {
                record.insert(field.name.clone(), decode_cell(field, cell.v)?);
            }
            Ok(record)
        })
        .collect()
}

fn decode_cell(field: &SchemaField, value: Value) -> Result<FieldValue, BackendError> {
    let raw = match value {
        Value::Null => return Ok(FieldValue::Null),
        Value::String(s) => s,
        other => return Ok(FieldValue::Text(other.to_string())),
    };

    let bad = |kind: &str| BackendError::Decode(format!("column {} is not a valid {kind}: {raw:?}", field.name));

    match field.field_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT64" => raw.parse().map(FieldValue::Integer).map_err(|_| bad("integer")),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => {
            raw.parse().map(FieldValue::Float).map_err(|_| bad("float"))
        }
        _ => Ok(FieldValue::Text(raw)),
    }
}
