//! Latest-response snapshots shared between the poller and the scrape path.
//!
//! Each data set lives in its own [`ArcSwapOption`] slot. The poller publishes
//! a complete, immutable snapshot in one atomic swap; scrapes load whatever is
//! currently published without ever blocking the poller. The two slots are
//! independent, so a scrape may see one fresh and one older snapshot.

use crate::client::{DiskStorageResponse, VmStatusResponse};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A successfully fetched response together with how long it took.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub body: T,
    /// Time taken by the request that produced `body`
    pub latency: Duration,
    /// Wall-clock time the response was received
    pub fetched_at: SystemTime,
}

impl<T> Snapshot<T> {
    pub fn new(body: T, latency: Duration) -> Self {
        Self {
            body,
            latency,
            fetched_at: SystemTime::now(),
        }
    }

    /// Fetch time as fractional Unix seconds.
    pub fn fetched_at_epoch(&self) -> f64 {
        self.fetched_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

pub type VmSnapshot = Snapshot<VmStatusResponse>;
pub type DiskStorageSnapshot = Snapshot<DiskStorageResponse>;

/// Holder for the most recent snapshot of each data set.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    vm: ArcSwapOption<VmSnapshot>,
    disk_storage: ArcSwapOption<DiskStorageSnapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vm(&self) -> Option<Arc<VmSnapshot>> {
        self.vm.load_full()
    }

    pub fn disk_storage(&self) -> Option<Arc<DiskStorageSnapshot>> {
        self.disk_storage.load_full()
    }

    /// Replace the VM snapshot.
    pub fn publish_vm(&self, snapshot: VmSnapshot) {
        self.vm.store(Some(Arc::new(snapshot)));
    }

    /// Replace the disk storage snapshot.
    pub fn publish_disk_storage(&self, snapshot: DiskStorageSnapshot) {
        self.disk_storage.store(Some(Arc::new(snapshot)));
    }
}
