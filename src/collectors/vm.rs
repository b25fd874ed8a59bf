//! VM Status Metrics Collector
//!
//! Renders the latest VM status list into per-VM rows plus status and SLA
//! bucket counts.
//!
//! # Metrics Produced
//! - `commvault_exporter_vm` - One sample per VM, value is the VM status code
//!   - Labels: host, name, status, status_description, subclient_name, strguid,
//!     sla_status, sla_status_description, plan, last_backup_job_status,
//!     last_backup_end_time, vm_size, vm_used_space, request_timestamp
//! - `commvault_exporter_vm_request_time_seconds` - Latency of the VM list request
//! - `commvault_exporter_vm_count` - Total VMs reported by the server
//! - `commvault_exporter_vm_status` - VMs per status bucket (labels: host, status)
//! - `commvault_exporter_vm_sla_status` - VMs per SLA bucket (labels: host, sla_status)
//!
//! Nothing is produced until a VM snapshot has been published.

use super::{integer, label_text, whole_number, CollectionContext};
use crate::client::VmRecord;
use crate::error::{CommvaultError, Result};
use crate::snapshot::VmSnapshot;
use chrono::DateTime;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

const UNKNOWN: &str = "unknown";
const ZERO: &str = "0";
/// Reported when a VM has no last backup job.
const NO_JOB_STATUS: &str = "99";

/// Backup protection status of a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmStatus {
    All,
    Protected,
    NotProtected,
    Pending,
    BackedWithError,
    Discovered,
    /// Any other code; `None` when the record carried no status at all
    Unknown(Option<i64>),
}

impl VmStatus {
    /// Bucket names in bucket-code order (0..=6).
    pub const BUCKETS: [&'static str; 7] = [
        "all",
        "protected",
        "nonprotected",
        "pending",
        "errors",
        "discovered",
        "unknown",
    ];

    /// Code of the bucket collecting every unrecognised status.
    pub const UNKNOWN_BUCKET: i64 = 6;

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => VmStatus::All,
            1 => VmStatus::Protected,
            2 => VmStatus::NotProtected,
            3 => VmStatus::Pending,
            4 => VmStatus::BackedWithError,
            5 => VmStatus::Discovered,
            other => VmStatus::Unknown(Some(other)),
        }
    }

    /// Read the `vmStatus` field. A missing or blank status is `Unknown(None)`;
    /// a present status that is not an integer is an error.
    pub fn from_field(value: Option<&Value>) -> Result<Self> {
        let Some(value) = value.filter(|v| label_text(Some(*v)).is_some()) else {
            return Ok(VmStatus::Unknown(None));
        };
        whole_number(value)
            .map(Self::from_code)
            .ok_or_else(|| {
                CommvaultError::InvalidRecord(format!("vmStatus {} is not an integer", value))
            })
    }

    pub fn description(&self) -> &'static str {
        match self {
            VmStatus::All => "all",
            VmStatus::Protected => "protected",
            VmStatus::NotProtected => "not-protected",
            VmStatus::Pending => "pending",
            VmStatus::BackedWithError => "backed-with-error",
            VmStatus::Discovered => "discovered",
            VmStatus::Unknown(_) => UNKNOWN,
        }
    }

    /// Index into [`VmStatus::BUCKETS`].
    pub fn bucket(&self) -> usize {
        match self {
            VmStatus::All => 0,
            VmStatus::Protected => 1,
            VmStatus::NotProtected => 2,
            VmStatus::Pending => 3,
            VmStatus::BackedWithError => 4,
            VmStatus::Discovered => 5,
            VmStatus::Unknown(_) => 6,
        }
    }

    /// Sample value: the raw code, or the unknown bucket code when there was none.
    pub fn value(&self) -> f64 {
        match self {
            VmStatus::Unknown(Some(code)) => *code as f64,
            VmStatus::Unknown(None) => Self::UNKNOWN_BUCKET as f64,
            known => known.bucket() as f64,
        }
    }
}

/// SLA compliance of a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaStatus {
    Met,
    NotMet,
    Excluded,
    /// Any other code; `None` when absent or not an integer
    Unknown(Option<i64>),
}

impl SlaStatus {
    /// Bucket names in bucket order.
    pub const BUCKETS: [&'static str; 4] = ["met", "not-met", "excluded", "unknown"];

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => SlaStatus::Met,
            2 => SlaStatus::NotMet,
            3 => SlaStatus::Excluded,
            other => SlaStatus::Unknown(Some(other)),
        }
    }

    pub fn from_field(value: Option<&Value>) -> Self {
        value
            .and_then(whole_number)
            .map(Self::from_code)
            .unwrap_or(SlaStatus::Unknown(None))
    }

    pub fn description(&self) -> &'static str {
        Self::BUCKETS[self.bucket()]
    }

    /// Index into [`SlaStatus::BUCKETS`].
    pub fn bucket(&self) -> usize {
        match self {
            SlaStatus::Met => 0,
            SlaStatus::NotMet => 1,
            SlaStatus::Excluded => 2,
            SlaStatus::Unknown(_) => 3,
        }
    }
}

/// One VM, with every label resolved to its final text.
#[derive(Debug, Clone, PartialEq)]
pub struct VmRow {
    pub name: String,
    pub status: VmStatus,
    /// Status exactly as sent by the server
    pub status_text: String,
    pub subclient_name: String,
    pub strguid: String,
    pub sla_status: SlaStatus,
    /// SLA status exactly as sent by the server
    pub sla_status_text: String,
    pub plan: String,
    pub last_backup_job_status: String,
    pub last_backup_end_time: String,
    pub vm_size: String,
    pub vm_used_space: String,
    pub request_timestamp: String,
}

impl VmRow {
    /// Apply the per-field defaults to a raw record.
    ///
    /// Fails only when `vmStatus` is present but not an integer, since the
    /// status code is the sample value.
    pub fn from_record(record: &VmRecord, request_timestamp: &str) -> Result<Self> {
        let status = VmStatus::from_field(record.vm_status.as_ref())?;
        let sla_status = SlaStatus::from_field(record.sla_status.as_ref());

        Ok(Self {
            name: text_or(record.name.as_ref(), UNKNOWN),
            status,
            status_text: text_or(record.vm_status.as_ref(), UNKNOWN),
            subclient_name: text_or(record.subclient_name.as_ref(), UNKNOWN),
            strguid: text_or(record.str_guid.as_ref(), UNKNOWN),
            sla_status,
            sla_status_text: text_or(record.sla_status.as_ref(), ZERO),
            plan: text_or(nested(&record.plan, "planName"), UNKNOWN),
            last_backup_job_status: text_or(
                nested(&record.last_backup_job_info, "status"),
                NO_JOB_STATUS,
            ),
            last_backup_end_time: backup_end_time(record.bkp_end_time.as_ref())
                .unwrap_or_else(|| ZERO.to_string()),
            vm_size: text_or(record.vm_size.as_ref(), ZERO),
            vm_used_space: text_or(record.vm_used_space.as_ref(), ZERO),
            request_timestamp: request_timestamp.to_string(),
        })
    }

    /// Label values in the order of the `commvault_exporter_vm` label names.
    pub fn labels<'a>(&'a self, host: &'a str) -> [&'a str; 14] {
        [
            host,
            self.name.as_str(),
            self.status_text.as_str(),
            self.status.description(),
            self.subclient_name.as_str(),
            self.strguid.as_str(),
            self.sla_status_text.as_str(),
            self.sla_status.description(),
            self.plan.as_str(),
            self.last_backup_job_status.as_str(),
            self.last_backup_end_time.as_str(),
            self.vm_size.as_str(),
            self.vm_used_space.as_str(),
            self.request_timestamp.as_str(),
        ]
    }
}

/// Label names of `commvault_exporter_vm`, matching [`VmRow::labels`].
pub const VM_LABELS: [&str; 14] = [
    "host",
    "name",
    "status",
    "status_description",
    "subclient_name",
    "strguid",
    "sla_status",
    "sla_status_description",
    "plan",
    "last_backup_job_status",
    "last_backup_end_time",
    "vm_size",
    "vm_used_space",
    "request_timestamp",
];

fn text_or(value: Option<&Value>, default: &str) -> String {
    label_text(value).unwrap_or_else(|| default.to_string())
}

/// Field of a nested object; a missing or non-object parent counts as a missing field.
fn nested<'a>(parent: &'a Option<Value>, field: &str) -> Option<&'a Value> {
    parent.as_ref().and_then(|p| p.get(field))
}

/// ISO-8601 (UTC, no offset) rendering of an epoch-seconds timestamp.
///
/// Fractional timestamps are rounded to microseconds and printed with six
/// digits; whole seconds carry no fraction.
fn backup_end_time(value: Option<&Value>) -> Option<String> {
    let value = value.filter(|v| label_text(Some(*v)).is_some())?;
    let micros = match value.as_f64().filter(|f| f.fract() != 0.0) {
        Some(f) => (f * 1e6).round() as i64,
        None => integer(value)?.checked_mul(1_000_000)?,
    };
    let dt = DateTime::from_timestamp_micros(micros)?.naive_utc();
    let format = if micros % 1_000_000 == 0 {
        "%Y-%m-%dT%H:%M:%S"
    } else {
        "%Y-%m-%dT%H:%M:%S%.6f"
    };
    Some(dt.format(format).to_string())
}

/// Everything the VM gauges need from one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmReport {
    pub rows: Vec<VmRow>,
    /// Count per [`VmStatus::BUCKETS`] entry
    pub status_counts: [u64; 7],
    /// Count per [`SlaStatus::BUCKETS`] entry
    pub sla_counts: [u64; 4],
    /// Total reported by the server
    pub total_records: u64,
    pub request_seconds: f64,
    /// Records dropped because their status could not be read
    pub skipped: usize,
}

impl VmReport {
    /// Build the report for a snapshot. Bucket counts start from zero on every call.
    pub fn from_snapshot(snapshot: &VmSnapshot) -> Self {
        let request_timestamp = format!("{:.6}", snapshot.fetched_at_epoch());
        let mut report = VmReport {
            total_records: snapshot.body.total_records(),
            request_seconds: snapshot.latency.as_secs_f64(),
            ..VmReport::default()
        };

        for record in snapshot.body.records() {
            match VmRow::from_record(record, &request_timestamp) {
                Ok(row) => {
                    report.status_counts[row.status.bucket()] += 1;
                    report.sla_counts[row.sla_status.bucket()] += 1;
                    report.rows.push(row);
                }
                Err(e) => {
                    warn!(
                        "Skipping VM {}: {}",
                        label_text(record.name.as_ref()).as_deref().unwrap_or(UNKNOWN),
                        e
                    );
                    report.status_counts[VmStatus::UNKNOWN_BUCKET as usize] += 1;
                    report.sla_counts[SlaStatus::from_field(record.sla_status.as_ref()).bucket()] +=
                        1;
                    report.skipped += 1;
                }
            }
        }

        report
    }
}

/// Collects VM status metrics from the latest VM snapshot.
///
/// Leaves every VM gauge empty when no snapshot has been published yet.
pub fn collect_vm_metrics(ctx: &CollectionContext<'_>) {
    let Some(snapshot) = ctx.snapshots.vm() else {
        debug!("No VM snapshot available yet");
        return;
    };

    let report = VmReport::from_snapshot(&snapshot);
    let metrics = ctx.metrics;

    // Records with identical labels share one series; bucket counts still
    // count each record.
    let mut seen = HashSet::with_capacity(report.rows.len());
    for row in &report.rows {
        let labels = row.labels(ctx.host);
        if !seen.insert(labels) {
            debug!("VM {} duplicates the labels of an earlier record", row.name);
        }
        metrics.vm.with_label_values(&labels).set(row.status.value());
    }

    metrics
        .vm_request_time_seconds
        .with_label_values(&[ctx.host])
        .set(report.request_seconds);
    metrics
        .vm_count
        .with_label_values(&[ctx.host])
        .set(report.total_records as f64);

    for (bucket, count) in VmStatus::BUCKETS.into_iter().zip(report.status_counts) {
        metrics
            .vm_status
            .with_label_values(&[ctx.host, bucket])
            .set(count as f64);
    }
    for (bucket, count) in SlaStatus::BUCKETS.into_iter().zip(report.sla_counts) {
        metrics
            .vm_sla_status
            .with_label_values(&[ctx.host, bucket])
            .set(count as f64);
    }

    debug!(
        "Rendered {} VM rows ({} skipped)",
        report.rows.len(),
        report.skipped
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::VmStatusResponse;
    use crate::snapshot::Snapshot;
    use serde_json::json;
    use std::time::Duration;

    fn snapshot(body: serde_json::Value) -> VmSnapshot {
        let body: VmStatusResponse = serde_json::from_value(body).unwrap();
        Snapshot::new(body, Duration::from_millis(1500))
    }

    fn record(value: serde_json::Value) -> VmRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_status_counts_only_unknown_bucket() {
        let report = VmReport::from_snapshot(&snapshot(json!({
            "vmStatusInfoList": [{"name": "vm-a", "slaStatus": 1}],
            "totalRecords": 1
        })));

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].status, VmStatus::Unknown(None));
        assert_eq!(report.rows[0].status_text, "unknown");
        assert_eq!(report.rows[0].status.description(), "unknown");
        assert_eq!(report.status_counts, [0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_sla_not_met_increments_one_bucket() {
        let report = VmReport::from_snapshot(&snapshot(json!({
            "vmStatusInfoList": [
                {"name": "vm-a", "vmStatus": 1, "slaStatus": 1},
                {"name": "vm-b", "vmStatus": 1, "slaStatus": 2}
            ]
        })));

        assert_eq!(report.rows[1].sla_status.description(), "not-met");
        assert_eq!(report.rows[1].sla_status_text, "2");
        assert_eq!(report.sla_counts, [1, 1, 0, 0]);
    }

    #[test]
    fn test_each_known_status_once() {
        let records: Vec<_> = (0..6)
            .map(|code| json!({"name": format!("vm-{}", code), "vmStatus": code}))
            .collect();
        let report = VmReport::from_snapshot(&snapshot(json!({
            "vmStatusInfoList": records,
            "totalRecords": 6
        })));

        assert_eq!(report.status_counts, [1, 1, 1, 1, 1, 1, 0]);
        assert_eq!(report.rows.len(), 6);
        assert_eq!(report.total_records, 6);
        let descriptions: Vec<_> = report.rows.iter().map(|r| r.status.description()).collect();
        assert_eq!(
            descriptions,
            [
                "all",
                "protected",
                "not-protected",
                "pending",
                "backed-with-error",
                "discovered"
            ]
        );
    }

    #[test]
    fn test_out_of_range_status_keeps_raw_code_as_value() {
        let row = VmRow::from_record(&record(json!({"vmStatus": "9"})), "0").unwrap();
        assert_eq!(row.status, VmStatus::Unknown(Some(9)));
        assert_eq!(row.status.bucket(), 6);
        assert_eq!(row.status.value(), 9.0);
        assert_eq!(row.status_text, "9");
    }

    #[test]
    fn test_unparseable_status_skips_row() {
        let report = VmReport::from_snapshot(&snapshot(json!({
            "vmStatusInfoList": [
                {"name": "broken", "vmStatus": "n/a", "slaStatus": 3},
                {"name": "fine", "vmStatus": 2}
            ]
        })));

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].name, "fine");
        assert_eq!(report.skipped, 1);
        assert_eq!(report.status_counts, [0, 0, 1, 0, 0, 0, 1]);
        assert_eq!(report.sla_counts, [0, 0, 1, 1]);
    }

    #[test]
    fn test_defaults_for_empty_record() {
        let row = VmRow::from_record(&VmRecord::default(), "123.000000").unwrap();
        assert_eq!(
            row.labels("cv.local"),
            [
                "cv.local",
                "unknown",
                "unknown",
                "unknown",
                "unknown",
                "unknown",
                "0",
                "unknown",
                "unknown",
                "99",
                "0",
                "0",
                "0",
                "123.000000",
            ]
        );
    }

    #[test]
    fn test_blank_strings_fall_back_to_defaults() {
        let row = VmRow::from_record(
            &record(json!({
                "name": "  ",
                "subclientName": "",
                "vmSize": " ",
                "plan": {"planName": ""},
                "lastBackupJobInfo": {"status": null}
            })),
            "0",
        )
        .unwrap();
        assert_eq!(row.name, "unknown");
        assert_eq!(row.subclient_name, "unknown");
        assert_eq!(row.vm_size, "0");
        assert_eq!(row.plan, "unknown");
        assert_eq!(row.last_backup_job_status, "99");
    }

    #[test]
    fn test_missing_nested_parents_do_not_fail() {
        let row = VmRow::from_record(
            &record(json!({"vmStatus": 1, "plan": null, "lastBackupJobInfo": "none"})),
            "0",
        )
        .unwrap();
        assert_eq!(row.plan, "unknown");
        assert_eq!(row.last_backup_job_status, "99");
    }

    #[test]
    fn test_full_record_labels() {
        let row = VmRow::from_record(
            &record(json!({
                "name": "db-01",
                "vmStatus": 1,
                "slaStatus": 1,
                "subclientName": "default",
                "strGUID": "5012-abcd",
                "plan": {"planName": "Server plan"},
                "lastBackupJobInfo": {"status": 1},
                "bkpEndTime": 1700000000,
                "vmSize": 107374182400u64,
                "vmUsedSpace": 53687091200u64
            })),
            "1700000100.000000",
        )
        .unwrap();

        assert_eq!(row.name, "db-01");
        assert_eq!(row.strguid, "5012-abcd");
        assert_eq!(row.plan, "Server plan");
        assert_eq!(row.last_backup_job_status, "1");
        assert_eq!(row.last_backup_end_time, "2023-11-14T22:13:20");
        assert_eq!(row.vm_size, "107374182400");
        assert_eq!(row.vm_used_space, "53687091200");
        assert_eq!(row.status.value(), 1.0);
    }

    #[test]
    fn test_backup_end_time_conversion() {
        assert_eq!(backup_end_time(Some(&json!(0))), Some("1970-01-01T00:00:00".to_string()));
        assert_eq!(
            backup_end_time(Some(&json!("1700000000"))),
            Some("2023-11-14T22:13:20".to_string())
        );
        assert_eq!(
            backup_end_time(Some(&json!(1700000000.5))),
            Some("2023-11-14T22:13:20.500000".to_string())
        );
        assert_eq!(
            backup_end_time(Some(&json!(-1.5))),
            Some("1969-12-31T23:59:58.500000".to_string())
        );
        assert_eq!(
            backup_end_time(Some(&json!(-1))),
            Some("1969-12-31T23:59:59".to_string())
        );
        assert_eq!(backup_end_time(Some(&json!("yesterday"))), None);
        assert_eq!(backup_end_time(None), None);
    }

    #[test]
    fn test_report_is_stable_for_same_snapshot() {
        let snap = snapshot(json!({
            "vmStatusInfoList": [{"name": "vm-a", "vmStatus": 4, "slaStatus": 2}],
            "totalRecords": 1
        }));
        assert_eq!(VmReport::from_snapshot(&snap), VmReport::from_snapshot(&snap));
        assert_eq!(VmReport::from_snapshot(&snap).request_seconds, 1.5);
    }
}
