//! Maintenance records: the core data model for scheduled upkeep.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use upkeep_core::UpkeepError;

/// One scheduled or completed upkeep action for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    /// Unique record ID.
    pub id: String,
    /// Asset this record belongs to.
    pub asset_id: String,
    /// Display name resolved from the asset registry at creation.
    pub asset_name: String,
    /// When the work is due.
    pub scheduled_date: DateTime<Utc>,
    pub started_date: Option<DateTime<Utc>>,
    /// Set only while `manual_status` is `Completed`.
    pub completed_date: Option<DateTime<Utc>>,
    /// User-controlled status.
    pub manual_status: ManualStatus,
    pub frequency: Frequency,
    /// Derived from `frequency`; only lifecycle transitions recompute it.
    pub next_maintenance_date: Option<NaiveDate>,
    pub service_type: String,
    pub technician: Option<String>,
    pub priority: RecordPriority,
    pub cost: Option<f64>,
    pub notes: Option<String>,
    /// Dedup guard for the maintenance-due notification.
    pub notification_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by every stored manual edit. An edit made from an older copy is rejected.
    #[serde(default)]
    pub revision: i64,
}

impl MaintenanceRecord {
    /// Create a new scheduled record.
    pub fn new(
        asset_id: &str,
        asset_name: &str,
        scheduled_date: DateTime<Utc>,
        frequency: Frequency,
        service_type: &str,
    ) -> Self {
        // Stored timestamps carry whole seconds.
        let now = Utc::now().trunc_subsecs(0);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            asset_id: asset_id.to_string(),
            asset_name: asset_name.to_string(),
            scheduled_date,
            started_date: None,
            completed_date: None,
            manual_status: ManualStatus::Scheduled,
            frequency,
            next_maintenance_date: None,
            service_type: service_type.to_string(),
            technician: None,
            priority: RecordPriority::Medium,
            cost: None,
            notes: None,
            notification_sent: false,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Whether the record reached Completed or Cancelled.
    pub fn is_terminal(&self) -> bool {
        self.manual_status.is_terminal()
    }
}

/// User-entered status. Overdue is never stored here; see `EffectiveStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl ManualStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ManualStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManualStatus {
    type Err = UpkeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(UpkeepError::Validation(format!("unknown status '{s}'"))),
        }
    }
}

/// Recurrence pattern governing automatic rescheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// No automatic recurrence.
    #[default]
    #[serde(alias = "none")]
    AsNeeded,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AsNeeded => "as_needed",
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Semiannual => "semiannual",
            Self::Annual => "annual",
        }
    }

    pub fn is_recurring(&self) -> bool {
        *self != Self::AsNeeded
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = UpkeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "" | "none" | "as_needed" | "asneeded" => Ok(Self::AsNeeded),
            "weekly" => Ok(Self::Weekly),
            "biweekly" | "bi_weekly" => Ok(Self::Biweekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "semiannual" | "semi_annual" => Ok(Self::Semiannual),
            "annual" | "annually" | "yearly" => Ok(Self::Annual),
            _ => Err(UpkeepError::InvalidFrequency(s.to_string())),
        }
    }
}

/// Record urgency as entered by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl RecordPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for RecordPriority {
    type Err = UpkeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" | "urgent" => Ok(Self::Critical),
            _ => Err(UpkeepError::Validation(format!("unknown priority '{s}'"))),
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase().replace(['-', ' '], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = MaintenanceRecord::new("a-1", "Forklift", Utc::now(), Frequency::Monthly, "Oil");
        assert_eq!(record.manual_status, ManualStatus::Scheduled);
        assert!(!record.notification_sent);
        assert!(record.completed_date.is_none());
        assert!(!record.is_terminal());
        assert_eq!(record.id.len(), 36);
    }

    #[test]
    fn test_frequency_parsing() {
        assert_eq!("Weekly".parse::<Frequency>().unwrap(), Frequency::Weekly);
        assert_eq!("semi-annual".parse::<Frequency>().unwrap(), Frequency::Semiannual);
        assert_eq!("none".parse::<Frequency>().unwrap(), Frequency::AsNeeded);
        assert_eq!("As Needed".parse::<Frequency>().unwrap(), Frequency::AsNeeded);
        let err = "fortnightly".parse::<Frequency>().unwrap_err();
        assert!(matches!(err, UpkeepError::InvalidFrequency(f) if f == "fortnightly"));
    }

    #[test]
    fn test_frequency_serde_alias() {
        let f: Frequency = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(f, Frequency::AsNeeded);
        assert_eq!(serde_json::to_string(&Frequency::Biweekly).unwrap(), "\"biweekly\"");
    }

    #[test]
    fn test_status_text_roundtrip() {
        for status in [
            ManualStatus::Scheduled,
            ManualStatus::InProgress,
            ManualStatus::Completed,
            ManualStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ManualStatus>().unwrap(), status);
        }
        assert!("overdue".parse::<ManualStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ManualStatus::Completed.is_terminal());
        assert!(ManualStatus::Cancelled.is_terminal());
        assert!(!ManualStatus::InProgress.is_terminal());
    }
}
