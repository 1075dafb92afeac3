#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use epicache::backend::{BackendError, QueryBackend, Record};
use epicache::cache::Clock;

/// Backend that replays a fixed list of outcomes and records every query.
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<Vec<Record>, BackendError>>>,
    queries: Mutex<Vec<String>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Result<Vec<Record>, BackendError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            queries: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Each `execute` sleeps for `delay` before answering.
    pub fn slow(responses: Vec<Result<Vec<Record>, BackendError>>, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(responses)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryBackend for ScriptedBackend {
    fn available(&self) -> bool {
        true
    }

    async fn execute(&self, query: &str) -> Result<Vec<Record>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_owned());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(BackendError::Decode("script exhausted".into())))
    }
}

/// Clock that only moves when told to.
pub struct ManualClock(Mutex<NaiveDate>);

impl ManualClock {
    pub fn new(date: NaiveDate) -> Self {
        Self(Mutex::new(date))
    }

    pub fn advance_day(&self) {
        let mut date = self.0.lock().unwrap();
        *date = date.succ_opt().unwrap();
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.0.lock().unwrap()
    }
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 3, d).unwrap()
}

pub fn rows(marker: &str) -> Vec<Record> {
    vec![Record::new().with("marker", marker)]
}

pub fn failure() -> Result<Vec<Record>, BackendError> {
    Err(BackendError::QueryFailed {
        status: 500,
        message: "internal error".into(),
    })
}
