//! Prometheus metrics definitions and rendering.
//!
//! This module defines all Prometheus metrics exposed by the exporter. Values
//! are not updated when the Commvault API is polled: every scrape resets the
//! gauges and rebuilds them from the snapshots currently held by the
//! [`SnapshotStore`]. On Linux the registry also carries the standard
//! `process_*` metrics of the exporter itself.

use crate::collectors::{
    collect_disk_storage_metrics, collect_vm_metrics, disk_storage::POOL_LABELS,
    vm::VM_LABELS, CollectionContext,
};
use crate::error::{CommvaultError, Result};
use crate::snapshot::SnapshotStore;
use prometheus::{Encoder, GaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use tracing::debug;

const DISK_STORAGE_CAPACITY: (&str, &str) = (
    "commvault_exporter_disk_storage_capacity",
    "commvault v4 disk storage capacity (raw value from API)",
);
const DISK_STORAGE_FREE: (&str, &str) = (
    "commvault_exporter_disk_storage_free",
    "commvault v4 disk storage free space (raw value from API)",
);
const DISK_STORAGE_USED: (&str, &str) = (
    "commvault_exporter_disk_storage_used",
    "commvault v4 disk storage used (capacity - free, raw units)",
);

/// Families exported even when they have no samples.
const ALWAYS_EXPORTED: [(&str, &str); 3] =
    [DISK_STORAGE_CAPACITY, DISK_STORAGE_FREE, DISK_STORAGE_USED];

/// Metrics collector for the Commvault exporter.
pub struct MetricsCollector {
    snapshots: Arc<SnapshotStore>,
    host: String,
    registry: Registry,
    /// Serializes reset/populate/encode across concurrent scrapes
    render_lock: Mutex<()>,

    // VM metrics
    pub(crate) vm: GaugeVec,
    pub(crate) vm_request_time_seconds: GaugeVec,
    pub(crate) vm_count: GaugeVec,
    pub(crate) vm_status: GaugeVec,
    pub(crate) vm_sla_status: GaugeVec,

    // Disk storage metrics
    pub(crate) disk_storage_capacity: GaugeVec,
    pub(crate) disk_storage_free: GaugeVec,
    pub(crate) disk_storage_used: GaugeVec,
    pub(crate) disk_storage_request_time_seconds: GaugeVec,

    // Poller metrics, never reset
    request_processing_seconds: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector reading from `snapshots`.
    ///
    /// `host` is the value of the `host` label carried by every metric.
    pub fn new(snapshots: Arc<SnapshotStore>, host: impl Into<String>) -> Result<Self> {
        let registry = Registry::new();

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        // VM metrics
        let vm = register(
            &registry,
            Opts::new("commvault_exporter_vm", "commvault vm status"),
            &VM_LABELS,
        )?;
        let vm_request_time_seconds = register(
            &registry,
            Opts::new(
                "commvault_exporter_vm_request_time_seconds",
                "commvault vm request time seconds",
            ),
            &["host"],
        )?;
        let vm_count = register(
            &registry,
            Opts::new("commvault_exporter_vm_count", "commvault vm count"),
            &["host"],
        )?;
        let vm_status = register(
            &registry,
            Opts::new(
                "commvault_exporter_vm_status",
                "commvault vm count per status",
            ),
            &["host", "status"],
        )?;
        let vm_sla_status = register(
            &registry,
            Opts::new(
                "commvault_exporter_vm_sla_status",
                "commvault vm count per sla status",
            ),
            &["host", "sla_status"],
        )?;

        // Disk storage metrics
        let disk_storage_capacity = register(
            &registry,
            Opts::new(DISK_STORAGE_CAPACITY.0, DISK_STORAGE_CAPACITY.1),
            &POOL_LABELS,
        )?;
        let disk_storage_free = register(
            &registry,
            Opts::new(DISK_STORAGE_FREE.0, DISK_STORAGE_FREE.1),
            &POOL_LABELS,
        )?;
        let disk_storage_used = register(
            &registry,
            Opts::new(DISK_STORAGE_USED.0, DISK_STORAGE_USED.1),
            &POOL_LABELS,
        )?;
        let disk_storage_request_time_seconds = register(
            &registry,
            Opts::new(
                "commvault_exporter_disk_storage_request_time_seconds",
                "commvault disk storage request time seconds",
            ),
            &["host"],
        )?;

        let request_processing_seconds = Histogram::with_opts(HistogramOpts::new(
            "request_processing_seconds",
            "Time spent processing request",
        ))?;
        registry.register(Box::new(request_processing_seconds.clone()))?;

        Ok(Self {
            snapshots,
            host: host.into(),
            registry,
            render_lock: Mutex::new(()),
            vm,
            vm_request_time_seconds,
            vm_count,
            vm_status,
            vm_sla_status,
            disk_storage_capacity,
            disk_storage_free,
            disk_storage_used,
            disk_storage_request_time_seconds,
            request_processing_seconds,
        })
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    /// Histogram of poll cycle durations, fed by the poller.
    pub fn request_processing_seconds(&self) -> Histogram {
        self.request_processing_seconds.clone()
    }

    /// Rebuild every gauge from the current snapshots.
    fn collect(&self) {
        // Reset all metrics so VMs and pools missing from the latest snapshot
        // do not linger.
        for gauge in [
            &self.vm,
            &self.vm_request_time_seconds,
            &self.vm_count,
            &self.vm_status,
            &self.vm_sla_status,
            &self.disk_storage_capacity,
            &self.disk_storage_free,
            &self.disk_storage_used,
            &self.disk_storage_request_time_seconds,
        ] {
            gauge.reset();
        }

        let ctx = CollectionContext {
            snapshots: &self.snapshots,
            metrics: self,
            host: &self.host,
        };

        collect_vm_metrics(&ctx);
        collect_disk_storage_metrics(&ctx);
    }

    /// Collect and encode in one step; this is what a scrape runs.
    pub fn render(&self) -> Result<String> {
        let _guard = self
            .render_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        debug!("Rendering metrics");
        self.collect();
        self.encode()
    }

    /// Encode metrics in Prometheus text format.
    ///
    /// The registry drops families without samples; the disk storage
    /// capacity/free/used families are written as bare HELP/TYPE headers in
    /// that case so they are always present.
    fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::with_capacity(8192);
        encoder.encode(&metric_families, &mut buffer)?;

        let mut body =
            String::from_utf8(buffer).map_err(|e| CommvaultError::Metrics(e.to_string()))?;

        for (name, help) in ALWAYS_EXPORTED {
            if !body.contains(&format!("# TYPE {} gauge\n", name)) {
                // Writing to a String cannot fail
                let _ = write!(body, "# HELP {} {}\n# TYPE {} gauge\n", name, help, name);
            }
        }

        Ok(body)
    }
}

fn register(registry: &Registry, opts: Opts, labels: &[&str]) -> Result<GaugeVec> {
    let gauge = GaugeVec::new(opts, labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}
