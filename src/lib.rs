//! # epicache
//!
//! A small HTTP/1.1 JSON API that serves epidemiological summaries computed by
//! a SQL warehouse, with a day-granular result cache in front of it.
//!
//! Each named piece of content is an SQL template in the [`content`] catalog.
//! A request supplies optional parameters; the [`cache`] renders the template,
//! runs it against a [`backend::QueryBackend`] at most once per calendar day
//! per parameter combination, and keeps serving the last good rows when a
//! refresh fails.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use epicache::api::{self, AppState};
//! use epicache::backend::BigQueryBackend;
//! use epicache::cache::ContentCache;
//! use epicache::config::AppConfig;
//! use epicache::content::ContentCatalog;
//! use epicache::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let backend = Arc::new(BigQueryBackend::new(&config.bigquery)?);
//!     let cache = Arc::new(ContentCache::new(Arc::new(ContentCatalog::builtin()), backend));
//!     let router = Arc::new(api::router(Arc::new(AppState {
//!         cache,
//!         api_name: config.api_name.clone(),
//!         api_version: config.api_version.clone(),
//!     })));
//!
//!     let server = Server::bind(config.bind_addr()).await?;
//!     server
//!         .run(move |req| {
//!             let router = Arc::clone(&router);
//!             async move { router.route(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod content;
pub mod context;
pub mod http;
pub mod router;
pub mod server;

pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
