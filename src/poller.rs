//! Background polling of the Commvault API.
//!
//! Every cycle fetches the VM status list and the disk storage list
//! concurrently. Each fetch publishes its own snapshot on success; a failed
//! fetch is logged and leaves the previous snapshot in place, and never
//! affects the other fetch.

use crate::client::CommvaultClient;
use crate::snapshot::{Snapshot, SnapshotStore};
use prometheus::Histogram;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

/// Outcome of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// A new snapshot was published
    Updated,
    /// The fetch failed; the previous snapshot is still served
    Failed,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    pub vm: FetchStatus,
    pub disk_storage: FetchStatus,
}

/// Periodically refreshes the snapshot store from the Commvault API.
pub struct Poller {
    client: CommvaultClient,
    snapshots: Arc<SnapshotStore>,
    interval: Duration,
    cycle_seconds: Option<Histogram>,
}

impl Poller {
    /// Create a poller using the client's configured poll interval.
    ///
    /// The client must already be logged in.
    pub fn new(client: CommvaultClient, snapshots: Arc<SnapshotStore>) -> Self {
        let interval = client.config().poll_interval();
        Self {
            client,
            snapshots,
            interval,
            cycle_seconds: None,
        }
    }

    /// Observe the duration of every poll cycle in `histogram`.
    pub fn with_cycle_histogram(mut self, histogram: Histogram) -> Self {
        self.cycle_seconds = Some(histogram);
        self
    }

    /// Run one poll cycle.
    pub async fn refresh(&self) -> PollOutcome {
        let _timer = self.cycle_seconds.as_ref().map(Histogram::start_timer);
        let (vm, disk_storage) = tokio::join!(self.refresh_vm(), self.refresh_disk_storage());
        PollOutcome { vm, disk_storage }
    }

    /// Fetch the VM status list and publish it.
    pub async fn refresh_vm(&self) -> FetchStatus {
        let started = Instant::now();
        match self.client.get_vm_status().await {
            Ok(body) => {
                let latency = started.elapsed();
                info!(
                    "VM request at {} returned {} records in {:.3}s",
                    self.client.config().base_url,
                    body.records().len(),
                    latency.as_secs_f64()
                );
                self.snapshots.publish_vm(Snapshot::new(body, latency));
                FetchStatus::Updated
            }
            Err(e) => {
                error!("VM request failed, keeping previous snapshot: {}", e);
                FetchStatus::Failed
            }
        }
    }

    /// Fetch the disk storage list and publish it.
    pub async fn refresh_disk_storage(&self) -> FetchStatus {
        let started = Instant::now();
        match self.client.get_disk_storage().await {
            Ok(body) => {
                let latency = started.elapsed();
                info!(
                    "Disk storage request at {} returned {} pools in {:.3}s",
                    self.client.config().base_url,
                    body.pools().len(),
                    latency.as_secs_f64()
                );
                self.snapshots
                    .publish_disk_storage(Snapshot::new(body, latency));
                FetchStatus::Updated
            }
            Err(e) => {
                error!("Disk storage request failed, keeping previous snapshot: {}", e);
                FetchStatus::Failed
            }
        }
    }

    /// Poll forever, one cycle per interval.
    ///
    /// The first cycle starts one interval from now, so callers that want data
    /// immediately run [`Poller::refresh`] first. A cycle that overruns the
    /// interval is followed by the next one straight away.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.refresh().await;
        }
    }

    /// Run [`Poller::run`] on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        info!("Polling Commvault every {}s", self.interval.as_secs());
        tokio::spawn(self.run())
    }
}
