//! Storage seams used by the engine.
//!
//! `MaintenanceDb` implements every trait here. Components hold trait objects
//! so tests can wrap the store and inject failures.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use upkeep_core::Result;

use crate::classify::EffectiveStatus;
use crate::notify::{NewNotification, Notification, Recipient};
use crate::record::{MaintenanceRecord, ManualStatus};

/// A stored row that could not be decoded into a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub id: String,
    pub reason: String,
}

/// Result of decoding one stored row. Bad rows are reported, not fatal.
pub type Candidate = std::result::Result<MaintenanceRecord, SkippedRecord>;

/// Half-open instant range `[from, until)`. Missing bounds are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Read-only view of the external asset registry.
pub trait AssetRegistry: Send + Sync {
    /// Display name of an asset, `None` if it does not exist.
    fn asset_name(&self, asset_id: &str) -> Result<Option<String>>;
}

/// Persistence for maintenance records.
pub trait RecordStore: Send + Sync {
    fn insert_record(&self, record: &MaintenanceRecord) -> Result<()>;

    fn get_record(&self, id: &str) -> Result<Option<MaintenanceRecord>>;

    /// Persist a manual edit. Never writes `notification_sent` from the
    /// caller's copy; `reset_guard` clears it in the same statement.
    /// Clears any cached classification and bumps the stored revision.
    /// Applied only if the stored revision still equals `record.revision`:
    /// `Conflict` if another edit landed first, `NotFound` if the row is gone.
    fn update_record(&self, record: &MaintenanceRecord, reset_guard: bool) -> Result<()>;

    fn delete_record(&self, id: &str) -> Result<bool>;

    /// Non-terminal records scheduled strictly before `until`, oldest first.
    fn open_records_before(&self, until: DateTime<Utc>) -> Result<Vec<Candidate>>;

    /// All records scheduled inside `range`, oldest first.
    fn records_in_range(&self, range: &DateRange) -> Result<Vec<Candidate>>;

    fn records_with_status(&self, status: ManualStatus) -> Result<Vec<Candidate>>;

    fn records_for_asset(&self, asset_id: &str) -> Result<Vec<Candidate>>;

    /// Store a denormalized classification. Applied only if the record's
    /// status and scheduled date still match `record`; returns whether it was.
    fn cache_classification(
        &self,
        record: &MaintenanceRecord,
        status: EffectiveStatus,
        is_overdue: bool,
        computed_on: NaiveDate,
    ) -> Result<bool>;
}

/// Outcome of one atomic check-and-set on the dedup guard.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The guard flipped from unset to set and the notification was stored.
    Created(Notification),
    /// The guard was already set: a duplicate was prevented.
    AlreadySent,
    /// The record is completed or cancelled, or its status or scheduled date
    /// changed since it was read.
    Resolved,
}

/// The dedup guard: check-and-set plus notification insert, as one unit.
pub trait DedupGuard: Send + Sync {
    /// Atomically set the record's guard and store `notification`, provided the
    /// stored record still has the status and scheduled date of `record`. If
    /// storing fails, the guard for this record stays unset so a later sweep retries.
    fn claim_and_notify(&self, record: &MaintenanceRecord, notification: &NewNotification) -> Result<ClaimOutcome>;
}

/// Polling surface for notifications.
pub trait NotificationStore: Send + Sync {
    fn insert_notification(&self, notification: &NewNotification) -> Result<Notification>;

    fn get_notification(&self, id: i64) -> Result<Option<Notification>>;

    /// Newest first.
    fn list_notifications(
        &self,
        recipients: &[Recipient],
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>>;

    fn unread_count(&self, recipients: &[Recipient]) -> Result<u64>;

    fn mark_read(&self, id: i64) -> Result<bool>;

    fn mark_all_read(&self, recipients: &[Recipient]) -> Result<u64>;

    fn delete_notification(&self, id: i64) -> Result<bool>;
}
