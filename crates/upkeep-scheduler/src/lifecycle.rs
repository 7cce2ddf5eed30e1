//! Record lifecycle: create, transition and edit maintenance records.
//!
//! Every transition that changes whether a record needs attention (complete,
//! cancel, reschedule) resets the dedup guard in the same write, so a later
//! occurrence can be notified again. Edits are load-modify-write against the
//! record's revision; an edit that lost a race fails with `Conflict`.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use upkeep_core::config::SchedulerConfig;
use upkeep_core::{Result, UpkeepError};

use crate::classify::{Classifier, RecordView};
use crate::record::{Frequency, MaintenanceRecord, ManualStatus, RecordPriority};
use crate::recurrence::compute_next_date;
use crate::store::{AssetRegistry, RecordStore};

/// Input for a new record. Dates and enums arrive as text and are validated here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRecord {
    pub asset_id: String,
    /// RFC 3339, local `YYYY-MM-DDTHH:MM`, or `YYYY-MM-DD`.
    pub scheduled_date: String,
    #[serde(default)]
    pub frequency: Option<String>,
    pub service_type: String,
    #[serde(default)]
    pub technician: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Descriptive edits. `None` leaves a field alone; an empty string clears
/// `technician` / `notes`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordPatch {
    pub service_type: Option<String>,
    pub technician: Option<String>,
    pub priority: Option<String>,
    pub cost: Option<f64>,
    pub notes: Option<String>,
    pub frequency: Option<String>,
}

/// Result of completing a record.
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub record: RecordView,
    /// Next occurrence, when automatic follow-ups are enabled.
    pub follow_up: Option<RecordView>,
}

#[derive(Clone)]
pub struct Lifecycle {
    store: Arc<dyn RecordStore>,
    assets: Arc<dyn AssetRegistry>,
    classifier: Classifier,
    auto_schedule_next: bool,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn RecordStore>, assets: Arc<dyn AssetRegistry>, classifier: Classifier) -> Self {
        Self {
            store,
            assets,
            classifier,
            auto_schedule_next: false,
        }
    }

    pub fn from_config(
        store: Arc<dyn RecordStore>,
        assets: Arc<dyn AssetRegistry>,
        config: &SchedulerConfig,
    ) -> Result<Self> {
        Ok(Self::new(store, assets, Classifier::from_config(config)?)
            .with_auto_schedule_next(config.auto_schedule_next))
    }

    pub fn with_auto_schedule_next(mut self, enabled: bool) -> Self {
        self.auto_schedule_next = enabled;
        self
    }

    /// Validate and persist a new Scheduled record. Nothing is written on error.
    pub fn create(&self, input: &NewRecord, now: DateTime<Utc>) -> Result<RecordView> {
        let asset_id = input.asset_id.trim();
        if asset_id.is_empty() {
            return Err(UpkeepError::Validation("asset_id is required".into()));
        }
        let service_type = required_text(&input.service_type, "service_type")?;
        let scheduled = self.classifier.parse_instant(&input.scheduled_date)?;
        let frequency: Frequency = input.frequency.as_deref().unwrap_or_default().parse()?;
        let priority = parse_priority(input.priority.as_deref())?.unwrap_or_default();
        check_cost(input.cost)?;

        let asset_name = self
            .assets
            .asset_name(asset_id)?
            .ok_or_else(|| UpkeepError::NotFound(format!("asset {asset_id}")))?;

        let mut record = MaintenanceRecord::new(asset_id, &asset_name, scheduled, frequency, &service_type);
        record.technician = optional_text(input.technician.as_deref());
        record.notes = optional_text(input.notes.as_deref());
        record.priority = priority;
        record.cost = input.cost;
        record.next_maintenance_date = compute_next_date(frequency, self.classifier.calendar_day(scheduled));
        record.created_at = now.trunc_subsecs(0);
        record.updated_at = record.created_at;

        self.store.insert_record(&record)?;
        tracing::info!("🔧 Maintenance scheduled: {} for {} on {}", record.service_type, asset_name, scheduled);
        Ok(self.classifier.view(record, now))
    }

    pub fn get(&self, id: &str, now: DateTime<Utc>) -> Result<RecordView> {
        Ok(self.classifier.view(self.load(id)?, now))
    }

    /// Scheduled → InProgress.
    pub fn start(&self, id: &str, now: DateTime<Utc>) -> Result<RecordView> {
        let mut record = self.load(id)?;
        if record.manual_status != ManualStatus::Scheduled {
            return Err(UpkeepError::Validation(format!(
                "cannot start a record that is {}",
                record.manual_status
            )));
        }
        record.manual_status = ManualStatus::InProgress;
        record.started_date = Some(now.trunc_subsecs(0));
        self.save(&mut record, false, now)?;
        tracing::info!("▶️ Maintenance started: {}", record.id);
        Ok(self.classifier.view(record, now))
    }

    /// Scheduled | InProgress → Completed. The next date is counted from the
    /// completion day.
    pub fn complete(&self, id: &str, now: DateTime<Utc>) -> Result<Completion> {
        let mut record = self.load(id)?;
        ensure_open(&record, "complete")?;

        let completed_on = self.classifier.calendar_day(now);
        record.manual_status = ManualStatus::Completed;
        record.completed_date = Some(now.trunc_subsecs(0));
        record.next_maintenance_date = compute_next_date(record.frequency, completed_on);
        self.save(&mut record, true, now)?;
        tracing::info!("✅ Maintenance completed: {} ({})", record.id, record.asset_name);

        let follow_up = match record.next_maintenance_date {
            Some(next) if self.auto_schedule_next && record.frequency.is_recurring() => {
                // Keep the original time of day.
                let at = self.classifier.at_local(next, self.classifier.local_time(record.scheduled_date));
                let mut follow = MaintenanceRecord::new(
                    &record.asset_id,
                    &record.asset_name,
                    at,
                    record.frequency,
                    &record.service_type,
                );
                follow.technician = record.technician.clone();
                follow.priority = record.priority;
                follow.next_maintenance_date = compute_next_date(record.frequency, next);
                self.store.insert_record(&follow)?;
                tracing::info!("📅 Follow-up scheduled: {} on {next}", follow.id);
                Some(self.classifier.view(follow, now))
            }
            _ => None,
        };

        Ok(Completion {
            record: self.classifier.view(record, now),
            follow_up,
        })
    }

    /// Any open status → Cancelled.
    pub fn cancel(&self, id: &str, now: DateTime<Utc>) -> Result<RecordView> {
        let mut record = self.load(id)?;
        ensure_open(&record, "cancel")?;
        record.manual_status = ManualStatus::Cancelled;
        record.completed_date = None;
        self.save(&mut record, true, now)?;
        tracing::info!("🚫 Maintenance cancelled: {}", record.id);
        Ok(self.classifier.view(record, now))
    }

    /// Move an open record to a new date.
    pub fn reschedule(&self, id: &str, new_date: &str, now: DateTime<Utc>) -> Result<RecordView> {
        let scheduled = self.classifier.parse_instant(new_date)?;
        let mut record = self.load(id)?;
        ensure_open(&record, "reschedule")?;
        record.scheduled_date = scheduled;
        record.next_maintenance_date = compute_next_date(record.frequency, self.classifier.calendar_day(scheduled));
        self.save(&mut record, true, now)?;
        tracing::info!("📅 Maintenance rescheduled: {} to {scheduled}", record.id);
        Ok(self.classifier.view(record, now))
    }

    pub fn update_details(&self, id: &str, patch: &RecordPatch, now: DateTime<Utc>) -> Result<RecordView> {
        let mut record = self.load(id)?;

        if let Some(service_type) = &patch.service_type {
            record.service_type = required_text(service_type, "service_type")?;
        }
        if let Some(technician) = &patch.technician {
            record.technician = optional_text(Some(technician));
        }
        if let Some(notes) = &patch.notes {
            record.notes = optional_text(Some(notes));
        }
        if let Some(priority) = parse_priority(patch.priority.as_deref())? {
            record.priority = priority;
        }
        if patch.cost.is_some() {
            check_cost(patch.cost)?;
            record.cost = patch.cost;
        }
        if let Some(frequency) = &patch.frequency {
            record.frequency = frequency.parse()?;
            let reference = record.completed_date.unwrap_or(record.scheduled_date);
            record.next_maintenance_date =
                compute_next_date(record.frequency, self.classifier.calendar_day(reference));
        }

        self.save(&mut record, false, now)?;
        Ok(self.classifier.view(record, now))
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        if !self.store.delete_record(id)? {
            return Err(UpkeepError::NotFound(format!("record {id}")));
        }
        tracing::info!("🗑️ Maintenance record deleted: {id}");
        Ok(())
    }

    fn load(&self, id: &str) -> Result<MaintenanceRecord> {
        self.store
            .get_record(id)?
            .ok_or_else(|| UpkeepError::NotFound(format!("record {id}")))
    }

    fn save(&self, record: &mut MaintenanceRecord, reset_guard: bool, now: DateTime<Utc>) -> Result<()> {
        record.updated_at = now.trunc_subsecs(0);
        self.store.update_record(record, reset_guard)?;
        record.revision += 1;
        if reset_guard {
            record.notification_sent = false;
        }
        Ok(())
    }
}

fn ensure_open(record: &MaintenanceRecord, action: &str) -> Result<()> {
    if record.is_terminal() {
        return Err(UpkeepError::Validation(format!(
            "cannot {action} a record that is {}",
            record.manual_status
        )));
    }
    Ok(())
}

fn required_text(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(UpkeepError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn parse_priority(value: Option<&str>) -> Result<Option<RecordPriority>> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::parse::<RecordPriority>)
        .transpose()
}

fn check_cost(cost: Option<f64>) -> Result<()> {
    match cost {
        Some(c) if !c.is_finite() || c < 0.0 => {
            Err(UpkeepError::Validation(format!("cost must be a non-negative number, got {c}")))
        }
        _ => Ok(()),
    }
}
