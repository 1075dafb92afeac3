mod common;

use std::sync::Arc;
use std::time::Duration;

use epicache::cache::ContentCache;
use epicache::content::{ContentCatalog, ContentError, ContentParams};

use common::{ManualClock, ScriptedBackend, day, failure, rows};

fn builtin_cache(backend: &Arc<ScriptedBackend>, clock: &Arc<ManualClock>) -> ContentCache {
    ContentCache::with_clock(
        Arc::new(ContentCatalog::builtin()),
        backend.clone(),
        clock.clone(),
    )
}

#[tokio::test]
async fn refresh_cycle_across_days() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(rows("r1")),
        failure(),
        Ok(rows("r2")),
    ]));
    let clock = Arc::new(ManualClock::new(day(1)));
    let cache = builtin_cache(&backend, &clock);
    let spain = ContentParams::new().country("Spain");

    // Day 1: miss, then hit.
    assert_eq!(*cache.load("country_evolution", &spain).await.unwrap(), rows("r1"));
    assert_eq!(*cache.load("country_evolution", &spain).await.unwrap(), rows("r1"));
    assert_eq!(backend.calls(), 1);

    // Day 2: refresh fails, stale rows are served and keep their date.
    clock.advance_day();
    assert_eq!(*cache.load("country_evolution", &spain).await.unwrap(), rows("r1"));
    assert_eq!(backend.calls(), 2);
    assert_eq!(
        cache.last_refreshed("country_evolution@spain").await,
        Some(day(1))
    );

    // Still day 2: the entry is still stale, so the backend is retried.
    assert_eq!(*cache.load("country_evolution", &spain).await.unwrap(), rows("r2"));
    assert_eq!(backend.calls(), 3);
    assert_eq!(
        cache.last_refreshed("country_evolution@spain").await,
        Some(day(2))
    );
}

#[tokio::test]
async fn rendered_query_reaches_backend() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(rows("x"))]));
    let clock = Arc::new(ManualClock::new(day(1)));
    let cache = builtin_cache(&backend, &clock);

    let params = ContentParams::new().country_list(["Spain", "Italy"]);
    cache.load("country_list_summary", &params).await.unwrap();

    let queries = backend.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("'Spain', 'Italy'"), "{}", queries[0]);
    assert!(!queries[0].contains("<country_list>"));
}

#[tokio::test]
async fn request_errors_never_reach_backend() {
    let backend = Arc::new(ScriptedBackend::new(Vec::new()));
    let clock = Arc::new(ManualClock::new(day(1)));
    let cache = builtin_cache(&backend, &clock);

    assert_eq!(
        cache.load("nope", &ContentParams::new()).await,
        Err(ContentError::UnknownContentKey("nope".into()))
    );
    assert!(matches!(
        cache.load("country_evolution", &ContentParams::new()).await,
        Err(ContentError::MissingParameter { .. })
    ));
    assert_eq!(backend.calls(), 0);
    assert!(cache.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_loads_of_one_key_fetch_once() {
    let backend = Arc::new(ScriptedBackend::slow(
        vec![Ok(rows("r1"))],
        Duration::from_millis(50),
    ));
    let clock = Arc::new(ManualClock::new(day(1)));
    let cache = Arc::new(builtin_cache(&backend, &clock));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .load("country_summary", &ContentParams::new().country("Chile"))
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(*task.await.unwrap().unwrap(), rows("r1"));
    }
    assert_eq!(backend.calls(), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_keys_refresh_independently() {
    let backend = Arc::new(ScriptedBackend::slow(
        vec![Ok(rows("a")), Ok(rows("b"))],
        Duration::from_millis(200),
    ));
    let clock = Arc::new(ManualClock::new(day(1)));
    let cache = Arc::new(builtin_cache(&backend, &clock));

    let started = tokio::time::Instant::now();
    let peru = ContentParams::new().country("Peru");
    let chile = ContentParams::new().country("Chile");
    let (a, b) = tokio::join!(
        cache.load("country_summary", &peru),
        cache.load("country_summary", &chile),
    );

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(backend.calls(), 2);
    // Serialized fetches would take at least 400ms.
    assert!(started.elapsed() < Duration::from_millis(390));
}
