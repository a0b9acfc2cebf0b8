//! Per-request state threaded explicitly through every orchestrator and
//! backend call: request id, optional deadline and optional perf ledger.

use crate::errors::{OioError, OioResult};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use uuid::Uuid;

pub const STAGE_RAWX: &str = "rawx";
pub const STAGE_TTFB: &str = "ttfb";
pub const STAGE_TTLB: &str = "ttlb";

/// Shared accumulator of elapsed seconds keyed by stage name.
///
/// Cloning shares the underlying map, so sub-stages running on other tasks
/// add to the same ledger.
#[derive(Clone, Debug, Default)]
pub struct PerfLedger {
    inner: Arc<Mutex<HashMap<String, f64>>>,
}

impl PerfLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `elapsed` to the running total of `stage`.
    pub fn add(&self, stage: &str, elapsed: Duration) {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        *map.entry(stage.to_string()).or_insert(0.0) += elapsed.as_secs_f64();
    }

    /// Record `elapsed` for `stage` unless a value is already present.
    /// Returns whether the value was recorded.
    pub fn record_once(&self, stage: &str, elapsed: Duration) -> bool {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if map.contains_key(stage) {
            return false;
        }
        map.insert(stage.to_string(), elapsed.as_secs_f64());
        true
    }

    pub fn get(&self, stage: &str) -> Option<f64> {
        let map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.get(stage).copied()
    }

    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub deadline: Option<Instant>,
    pub perfdata: Option<PerfLedger>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().simple().to_string().to_uppercase(),
            deadline: None,
            perfdata: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_perfdata(mut self, ledger: PerfLedger) -> Self {
        self.perfdata = Some(ledger);
        self
    }

    /// Same request, no deadline. Cleanup after a failed call runs under
    /// this so that an expired budget still removes what was written.
    pub fn without_deadline(&self) -> Self {
        Self {
            deadline: None,
            ..self.clone()
        }
    }

    /// Fail with `DeadlineReached` once the deadline has passed.
    pub fn check_deadline(&self) -> OioResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(OioError::DeadlineReached),
            _ => Ok(()),
        }
    }

    pub fn add_perf(&self, stage: &str, elapsed: Duration) {
        if let Some(ledger) = &self.perfdata {
            ledger.add(stage, elapsed);
        }
    }
}
