//! JSON API routes over the content cache.
//!
//! Request validation lives here: the cache substitutes parameter values into
//! query templates verbatim, so everything that reaches it must already be a
//! plausible country name or a `YYYY-MM-DD` date.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::cache::ContentCache;
use crate::content::{ContentError, ContentParams};
use crate::context::Context;
use crate::{Response, Router, StatusCode};

/// Longest accepted country name, in characters.
const MAX_COUNTRY_LEN: usize = 100;

/// Punctuation allowed in country names besides letters, digits and spaces.
const COUNTRY_PUNCTUATION: &[char] = &['-', '.', ',', '(', ')', '&', '*'];

/// Request validation failures, reported as `400`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("invalid country name: {0:?}")]
    InvalidCountry(String),

    #[error("invalid start_date {0:?}: expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Shared state owned by the composition root.
pub struct AppState {
    pub cache: Arc<ContentCache>,
    pub api_name: String,
    pub api_version: String,
}

#[derive(Serialize)]
struct CatalogEntry<'a> {
    key: &'a str,
    title: &'a str,
    parameters: Vec<&'static str>,
}

/// Builds the API router.
///
/// | Route                                   | Content key                  |
/// |-----------------------------------------|------------------------------|
/// | `/`                                     | *(service name and version)* |
/// | `/healthcheck`                          | *(liveness)*                 |
/// | `/content`                              | *(catalog listing)*          |
/// | `/content/:key`                         | any, params from query       |
/// | `/countries`                            | `countries`                  |
/// | `/countries/ranking`                    | `countries_ranking`          |
/// | `/countries/summary?country_list=A,B`   | `country_list_summary`       |
/// | `/countries/:country/evolution`         | `country_evolution`          |
/// | `/countries/:country/summary`           | `country_summary`            |
/// | `/countries/:country/territories`       | `country_territories`        |
/// | `/countries/:country/latest`            | `country_latest_date_total`  |
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();

    let home = Arc::clone(&state);
    router.get("/", move |_ctx: Context| {
        let body = json!({"name": home.api_name, "ver": home.api_version});
        async move { Response::json(StatusCode::Ok, &body) }
    });

    router.get("/healthcheck", |_ctx: Context| async {
        Response::json(StatusCode::Ok, &json!({"status": "OK"}))
    });

    let listing = Arc::clone(&state);
    router.get("/content", move |_ctx: Context| {
        let entries: Vec<CatalogEntry<'_>> = listing
            .cache
            .catalog()
            .iter()
            .map(|d| CatalogEntry {
                key: d.key(),
                title: d.title(),
                parameters: d.placeholders().into_iter().map(|p| p.name()).collect(),
            })
            .collect();
        let response = Response::json(StatusCode::Ok, &entries);
        async move { response }
    });

    mount(&mut router, "/content/:key", &state, None);
    mount(&mut router, "/countries", &state, Some("countries"));
    mount(&mut router, "/countries/ranking", &state, Some("countries_ranking"));
    mount(&mut router, "/countries/summary", &state, Some("country_list_summary"));
    mount(&mut router, "/countries/:country/evolution", &state, Some("country_evolution"));
    mount(&mut router, "/countries/:country/summary", &state, Some("country_summary"));
    mount(&mut router, "/countries/:country/territories", &state, Some("country_territories"));
    mount(&mut router, "/countries/:country/latest", &state, Some("country_latest_date_total"));

    router
}

// Register a content route; `None` takes the key from the `:key` path segment.
fn mount(router: &mut Router, path: &str, state: &Arc<AppState>, key: Option<&'static str>) {
    let state = Arc::clone(state);
    router.get(path, move |ctx: Context| {
        let state = Arc::clone(&state);
        async move {
            let key = match key {
                Some(key) => key,
                None => ctx.params().get("key").unwrap_or_default(),
            };
            serve_content(&state.cache, key, &ctx).await
        }
    });
}

async fn serve_content(cache: &ContentCache, key: &str, ctx: &Context) -> Response {
    let params = match params_from(ctx) {
        Ok(params) => params,
        Err(e) => return Response::error(StatusCode::BadRequest, e.to_string()),
    };

    match cache.load(key, &params).await {
        Ok(rows) => Response::json(StatusCode::Ok, rows.as_slice()),
        Err(e @ ContentError::UnknownContentKey(_)) => {
            Response::error(StatusCode::NotFound, e.to_string())
        }
        Err(e) => Response::error(StatusCode::BadRequest, e.to_string()),
    }
}

/// Extracts and validates [`ContentParams`] from path captures and the query string.
///
/// `country` may come from the path or the query; `country_list` (comma
/// separated) and `start_date` come from the query.
pub fn params_from(ctx: &Context) -> Result<ContentParams, ApiError> {
    let mut params = ContentParams::new();

    if let Some(country) = ctx.param_or_query("country") {
        params = params.country(validate_country(country)?);
    }

    if let Some(list) = ctx.request().query_param("country_list") {
        let parsed = ContentParams::from_pairs([("country_list", list)]);
        if let Some(countries) = parsed.get_country_list() {
            let countries = countries
                .iter()
                .map(|c| validate_country(c))
                .collect::<Result<Vec<_>, _>>()?;
            params = params.country_list(countries);
        }
    }

    if let Some(date) = ctx.param_or_query("start_date") {
        params = params.start_date(validate_date(date)?);
    }

    Ok(params)
}

fn validate_country(raw: &str) -> Result<&str, ApiError> {
    let country = raw.trim();
    let valid = !country.is_empty()
        && country.chars().count() <= MAX_COUNTRY_LEN
        && country
            .chars()
            .all(|c| c.is_alphanumeric() || c == ' ' || COUNTRY_PUNCTUATION.contains(&c));

    if valid {
        Ok(country)
    } else {
        Err(ApiError::InvalidCountry(raw.to_owned()))
    }
}

fn validate_date(raw: &str) -> Result<&str, ApiError> {
    let date = raw.trim();
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(_) if date.len() == 10 => Ok(date),
        _ => Err(ApiError::InvalidDate(raw.to_owned())),
    }
}
