//! Content cache: day-granular freshness over the query backend.
//!
//! [`ContentCache::load`] is the single entry point. For each composite key it
//! keeps the last successfully fetched rows and the calendar date of that
//! fetch:
//!
//! | Entry state                         | Action                  | Backend fails         |
//! |-------------------------------------|-------------------------|-----------------------|
//! | none (miss)                         | fetch, store            | empty rows            |
//! | fetched today                       | serve stored rows       | *(not called)*        |
//! | fetched on an earlier day           | fetch, overwrite        | serve previous rows   |
//! | never fetched (earlier failure)     | fetch, store            | empty rows            |
//!
//! A failed fetch never touches the stored rows or their date.
//!
//! ## Concurrency
//!
//! The store is a [`DashMap`] of per-key async mutexes. A shard lock is held
//! only to find or create the entry; the entry's own mutex is then held across
//! the hit/miss decision, the backend call and the write. Concurrent loads of
//! the same stale key therefore issue one backend query, and later waiters see
//! the refreshed entry. Loads of different keys never wait on each other.
//!
//! The cost is latency on a hot key: while a refresh is in flight, every other
//! load of that composite key (including ones that would be served stale)
//! waits for it, for up to the backend's request timeout (`BQ_TIMEOUT_SECS`).
//!
//! Entries are never evicted.

use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, QueryBackend, Record};
use crate::content::{ContentCatalog, ContentError, ContentParams};

/// Shared, immutable result set.
pub type Rows = Arc<Vec<Record>>;

/// Source of the process-local calendar date.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// [`Clock`] backed by the system's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

// `rows` is Some iff `last_refreshed` is Some.
#[derive(Debug, Default)]
struct CacheEntry {
    rows: Option<Rows>,
    last_refreshed: Option<NaiveDate>,
}

impl CacheEntry {
    fn is_fresh(&self, today: NaiveDate) -> bool {
        self.rows.is_some() && self.last_refreshed == Some(today)
    }

    fn store(&mut self, rows: Vec<Record>, today: NaiveDate) -> Rows {
        let rows = Arc::new(rows);
        self.rows = Some(Arc::clone(&rows));
        self.last_refreshed = Some(today);
        rows
    }

    fn rows_or_empty(&self) -> Rows {
        self.rows.clone().unwrap_or_default()
    }
}

/// Process-wide content cache.
///
/// Construct one in the composition root and share it behind an [`Arc`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use epicache::cache::ContentCache;
/// use epicache::content::{ContentCatalog, ContentParams};
/// # use epicache::backend::QueryBackend;
///
/// # async fn example(backend: Arc<dyn QueryBackend>) -> Result<(), epicache::content::ContentError> {
/// let cache = ContentCache::new(Arc::new(ContentCatalog::builtin()), backend);
/// let rows = cache
///     .load("country_evolution", &ContentParams::new().country("Spain"))
///     .await?;
/// println!("{} rows", rows.len());
/// # Ok(())
/// # }
/// ```
pub struct ContentCache {
    catalog: Arc<ContentCatalog>,
    backend: Arc<dyn QueryBackend>,
    clock: Arc<dyn Clock>,
    store: DashMap<String, Arc<Mutex<CacheEntry>>>,
}

impl ContentCache {
    /// Creates an empty cache using the local calendar date.
    pub fn new(catalog: Arc<ContentCatalog>, backend: Arc<dyn QueryBackend>) -> Self {
        Self::with_clock(catalog, backend, Arc::new(LocalClock))
    }

    /// Creates an empty cache with an explicit [`Clock`].
    pub fn with_clock(
        catalog: Arc<ContentCatalog>,
        backend: Arc<dyn QueryBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            backend,
            clock,
            store: DashMap::new(),
        }
    }

    pub fn catalog(&self) -> &ContentCatalog {
        &self.catalog
    }

    /// Returns the current rows for `key` under `params`.
    ///
    /// Backend failures are absorbed: the caller gets the last good rows, or an
    /// empty set if there never were any.
    ///
    /// # Errors
    ///
    /// - [`ContentError::UnknownContentKey`]: `key` is not in the catalog.
    /// - [`ContentError::MissingParameter`]: the template needs a parameter `params` lacks.
    pub async fn load(&self, key: &str, params: &ContentParams) -> Result<Rows, ContentError> {
        let descriptor = self.catalog.resolve(key)?;
        let query = params.render(key, descriptor.query_template())?;
        let composite_key = params.composite_key(key);

        let entry = Arc::clone(&self.store.entry(composite_key.clone()).or_default());
        let mut entry = entry.lock().await;

        if entry.is_fresh(self.clock.today()) {
            debug!(key = %composite_key, "content cache hit");
            return Ok(entry.rows_or_empty());
        }

        let previous = entry.last_refreshed;
        match self.fetch(&query).await {
            Ok(rows) => {
                let today = self.clock.today();
                info!(
                    key = %composite_key,
                    rows = rows.len(),
                    previous = ?previous,
                    "content refreshed"
                );
                Ok(entry.store(rows, today))
            }
            Err(e) => {
                warn!(
                    key = %composite_key,
                    error = %e,
                    serving = ?previous,
                    "content refresh failed"
                );
                Ok(entry.rows_or_empty())
            }
        }
    }

    async fn fetch(&self, query: &str) -> Result<Vec<Record>, BackendError> {
        if !self.backend.available() {
            return Err(BackendError::Unavailable);
        }
        self.backend.execute(query).await
    }

    /// Date of the last successful fetch for `composite_key`, if any.
    ///
    /// Waits for an in-flight refresh of that key to finish.
    pub async fn last_refreshed(&self, composite_key: &str) -> Option<NaiveDate> {
        let entry = self.store.get(composite_key).map(|e| Arc::clone(e.value()))?;
        let entry = entry.lock().await;
        entry.last_refreshed
    }

    /// Number of composite keys seen so far (including never-fetched ones).
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
