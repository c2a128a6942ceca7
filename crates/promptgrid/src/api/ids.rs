//! Locally generated run identifiers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Generate a unique id for a matrix run.
///
/// Used as the run id whenever the store cannot provide one.
pub fn generate_run_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("run-{ts:x}-{count:04x}")
}

/// Stable per-cell id within a run, e.g. `run-...:c003`.
pub fn cell_id(run_id: &str, index: usize) -> String {
    format!("{run_id}:c{index:03}")
}
