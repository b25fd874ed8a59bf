//! Metrics Collectors
//!
//! Each collector turns the latest snapshot of one Commvault data set into
//! Prometheus samples. Collectors run at scrape time, never at poll time, and
//! only read the snapshot store.
//!
//! # Architecture
//!
//! Collectors follow a consistent pattern:
//! - Accept a `CollectionContext` containing shared state
//! - Build a plain report from the snapshot (pure, unit-testable)
//! - Write the report into the gauges owned by `MetricsCollector`
//!
//! Records are partial: every field may be missing, `null` or blank. The
//! helpers below are the one place where a raw JSON value becomes label text
//! or a number; per-field defaults are applied by the callers.

use crate::metrics::MetricsCollector;
use crate::snapshot::SnapshotStore;
use serde_json::Value;

/// Shared context passed to all collectors
#[derive(Clone, Copy)]
pub struct CollectionContext<'a> {
    /// Latest published snapshots
    pub snapshots: &'a SnapshotStore,
    /// Metrics collector owning the gauges to update
    pub metrics: &'a MetricsCollector,
    /// Value of the `host` label
    pub host: &'a str,
}

/// Label text for a raw value, or `None` if it is absent, `null` or blank.
pub(crate) fn label_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Integer reading of a raw value.
///
/// Numbers with a fractional part are truncated. Returns `None` for anything
/// that is not a number or a numeric string.
pub(crate) fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

/// Integer reading that only accepts whole values, used for status codes.
pub(crate) fn whole_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub mod disk_storage;
pub mod vm;

pub use disk_storage::collect_disk_storage_metrics;
pub use vm::collect_vm_metrics;
