//! Disk Storage Metrics Collector
//!
//! Collects capacity, free and used space per disk storage pool.
//!
//! # Metrics Produced
//! - `commvault_exporter_disk_storage_capacity` - Pool capacity
//! - `commvault_exporter_disk_storage_free` - Pool free space
//! - `commvault_exporter_disk_storage_used` - Capacity minus free space, never negative
//!   - Labels: host, id, name, storage_pool_type, status
//! - `commvault_exporter_disk_storage_request_time_seconds` - Latency of the request
//!
//! Values are in the units the API reports; no conversion is applied.

use super::{integer, label_text, CollectionContext};
use crate::client::DiskStorageRecord;
use crate::snapshot::DiskStorageSnapshot;
use serde_json::Value;
use tracing::debug;

const UNKNOWN: &str = "unknown";

/// Label names shared by the per-pool gauges.
pub const POOL_LABELS: [&str; 5] = ["host", "id", "name", "storage_pool_type", "status"];

/// One storage pool with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskPoolRow {
    pub id: String,
    pub name: String,
    pub storage_pool_type: String,
    pub status: String,
    pub capacity: i64,
    pub free: i64,
}

impl DiskPoolRow {
    pub fn from_record(record: &DiskStorageRecord) -> Self {
        let text = |value: &Option<Value>| {
            label_text(value.as_ref()).unwrap_or_else(|| UNKNOWN.to_string())
        };
        let number = |value: &Option<Value>| value.as_ref().and_then(integer).unwrap_or(0);

        Self {
            id: text(&record.id),
            name: text(&record.name),
            storage_pool_type: text(&record.storage_pool_type),
            status: text(&record.status),
            capacity: number(&record.capacity),
            free: number(&record.free_space),
        }
    }

    /// Capacity minus free space, clamped at zero for inconsistent pools.
    pub fn used(&self) -> i64 {
        self.capacity.saturating_sub(self.free).max(0)
    }

    pub fn labels<'a>(&'a self, host: &'a str) -> [&'a str; 5] {
        [
            host,
            self.id.as_str(),
            self.name.as_str(),
            self.storage_pool_type.as_str(),
            self.status.as_str(),
        ]
    }
}

/// Pools of a snapshot, in API order.
pub fn pool_rows(snapshot: &DiskStorageSnapshot) -> Vec<DiskPoolRow> {
    snapshot
        .body
        .pools()
        .iter()
        .map(DiskPoolRow::from_record)
        .collect()
}

/// Collects disk storage metrics from the latest disk storage snapshot.
///
/// The capacity, free and used families are exported even when there are no
/// pools; see [`crate::metrics::MetricsCollector::encode`].
pub fn collect_disk_storage_metrics(ctx: &CollectionContext<'_>) {
    let Some(snapshot) = ctx.snapshots.disk_storage() else {
        debug!("No disk storage snapshot available yet");
        return;
    };

    let metrics = ctx.metrics;
    let rows = pool_rows(&snapshot);

    for row in &rows {
        let labels = row.labels(ctx.host);
        metrics
            .disk_storage_capacity
            .with_label_values(&labels)
            .set(row.capacity as f64);
        metrics
            .disk_storage_free
            .with_label_values(&labels)
            .set(row.free as f64);
        metrics
            .disk_storage_used
            .with_label_values(&labels)
            .set(row.used() as f64);
    }

    metrics
        .disk_storage_request_time_seconds
        .with_label_values(&[ctx.host])
        .set(snapshot.latency.as_secs_f64());

    debug!("Rendered {} disk storage pools", rows.len());
}
