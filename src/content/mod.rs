//! Content definitions: the catalog of named queries and their parameters.
//!
//! A *content key* names a reusable, parameterized query (e.g. `country_evolution`).
//! [`ContentParams`] carries the runtime values for one request; together they
//! determine both the concrete query text and the cache identity (the
//! *composite key*).

use thiserror::Error;

pub mod catalog;
pub mod params;
pub mod queries;

pub use catalog::{ContentCatalog, ContentDescriptor};
pub use params::{ContentParams, Placeholder};

/// Errors surfaced to callers of the content layer.
///
/// Backend failures never appear here: the cache absorbs them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("unknown content key: {0}")]
    UnknownContentKey(String),

    #[error("content {key} requires parameter {placeholder}")]
    MissingParameter {
        key: String,
        placeholder: &'static str,
    },

    #[error("content key registered twice: {0}")]
    DuplicateContentKey(String),
}
