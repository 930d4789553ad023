//! Developer bench records ("dev6"): one JSON line per backend query the executor runs.
//!
//! Lines go to the [`DEV_TARGET`] logger at TRACE. While a [`BenchCapture`] is alive, the
//! records emitted on its thread are also kept in memory, so tests can assert on them whatever
//! global logger is installed.

use serde::Serialize;
use std::cell::RefCell;
use std::marker::PhantomData;

/// Logger target the bench lines are routed to at TRACE.
pub const DEV_TARGET: &str = "daokit::dev6";

thread_local! {
    static CAPTURED: RefCell<Option<Vec<QueryBench>>> = const { RefCell::new(None) };
}

/// Timing of one executed query. Serializes as
/// `{"bench":"query","op":..,"entity":..,"backend":..,"duration_ms":..,"result_count":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "bench", rename = "query")]
pub struct QueryBench {
    pub op: &'static str,
    pub entity: String,
    pub backend: String,
    pub duration_ms: u64,
    pub result_count: usize,
}

impl QueryBench {
    #[must_use]
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Logs `bench` at TRACE and hands it to the current thread's capture, if any.
pub fn emit(bench: QueryBench) {
    if log::log_enabled!(target: DEV_TARGET, log::Level::Trace) {
        log::trace!(target: DEV_TARGET, "{}", bench.to_line());
    }
    CAPTURED.with(|c| {
        if let Some(buf) = c.borrow_mut().as_mut() {
            buf.push(bench);
        }
    });
}

/// Collects bench records emitted on the creating thread until dropped.
#[must_use = "capturing stops when the guard is dropped"]
pub struct BenchCapture {
    _thread_bound: PhantomData<*const ()>,
}

impl BenchCapture {
    pub fn start() -> Self {
        CAPTURED.with(|c| *c.borrow_mut() = Some(Vec::new()));
        Self { _thread_bound: PhantomData }
    }

    /// Records captured since the last call.
    pub fn take(&self) -> Vec<QueryBench> {
        CAPTURED.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
    }

    /// Operation names of the captured records, in execution order; does not consume them.
    pub fn ops(&self) -> Vec<&'static str> {
        CAPTURED.with(|c| c.borrow().iter().flatten().map(|b| b.op).collect())
    }
}

impl Drop for BenchCapture {
    fn drop(&mut self) {
        CAPTURED.with(|c| *c.borrow_mut() = None);
    }
}
