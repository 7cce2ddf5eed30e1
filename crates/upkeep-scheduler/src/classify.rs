//! Status classifier: derives the effective status of a record at read time.
//!
//! All date comparisons happen at calendar-day resolution in one configured
//! UTC offset. The same day-cutting rule is used by the calendar view.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use upkeep_core::config::SchedulerConfig;
use upkeep_core::{Result, UpkeepError};

use crate::record::{MaintenanceRecord, ManualStatus};

/// Status after reconciling manual state with date-based overdue detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Overdue,
}

impl EffectiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Overdue => "overdue",
        }
    }
}

impl From<ManualStatus> for EffectiveStatus {
    fn from(status: ManualStatus) -> Self {
        match status {
            ManualStatus::Scheduled => Self::Scheduled,
            ManualStatus::InProgress => Self::InProgress,
            ManualStatus::Completed => Self::Completed,
            ManualStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl fmt::Display for EffectiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectiveStatus {
    type Err = UpkeepError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("overdue") {
            return Ok(Self::Overdue);
        }
        s.parse::<ManualStatus>().map(Self::from)
    }
}

/// Derived flags for one record. `is_overdue` excludes both other flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub effective_status: EffectiveStatus,
    pub is_overdue: bool,
    pub due_today: bool,
    pub due_soon: bool,
}

/// A record together with its freshly computed classification.
/// This is the shape handed to every reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: MaintenanceRecord,
    #[serde(flatten)]
    pub derived: Classification,
}

/// Classifies records against "now".
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    due_soon_days: u32,
    offset: FixedOffset,
}

/// Seven-day window in UTC.
impl Default for Classifier {
    fn default() -> Self {
        Self::new(7, Utc.fix())
    }
}

impl Classifier {
    pub fn new(due_soon_days: u32, offset: FixedOffset) -> Self {
        Self {
            due_soon_days,
            offset,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            UpkeepError::Config(format!(
                "utc_offset_minutes out of range: {}",
                config.utc_offset_minutes
            ))
        })?;
        Ok(Self::new(config.due_soon_days, offset))
    }

    pub fn due_soon_days(&self) -> u32 {
        self.due_soon_days
    }

    /// The calendar day an instant falls on, with time-of-day stripped.
    pub fn calendar_day(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Local wall-clock time of an instant.
    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        instant.with_timezone(&self.offset).time()
    }

    /// The instant a local date and time corresponds to.
    pub fn at_local(&self, day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = NaiveDateTime::new(day, time);
        let utc = local - chrono::Duration::seconds(i64::from(self.offset.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(utc, Utc)
    }

    /// The first instant of a calendar day.
    pub fn day_start(&self, day: NaiveDate) -> DateTime<Utc> {
        self.at_local(day, NaiveTime::MIN)
    }

    /// Parse user input: RFC 3339, a local `YYYY-MM-DDTHH:MM[:SS]`, or a bare
    /// `YYYY-MM-DD` (start of that local day).
    pub fn parse_instant(&self, input: &str) -> Result<DateTime<Utc>> {
        let input = input.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
            return Ok(dt.with_timezone(&Utc));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
                return Ok(self.at_local(naive.date(), naive.time()));
            }
        }
        if let Ok(day) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            return Ok(self.day_start(day));
        }
        Err(UpkeepError::Validation(format!("malformed date '{input}'")))
    }

    /// Derive the effective status and due flags for one record.
    pub fn classify(&self, record: &MaintenanceRecord, now: DateTime<Utc>) -> Classification {
        if record.manual_status.is_terminal() {
            return Classification {
                effective_status: record.manual_status.into(),
                is_overdue: false,
                due_today: false,
                due_soon: false,
            };
        }

        let today = self.calendar_day(now);
        let due = self.calendar_day(record.scheduled_date);

        if due < today {
            return Classification {
                effective_status: EffectiveStatus::Overdue,
                is_overdue: true,
                due_today: false,
                due_soon: false,
            };
        }

        let window_end = today
            .checked_add_days(Days::new(u64::from(self.due_soon_days)))
            .unwrap_or(NaiveDate::MAX);

        Classification {
            effective_status: record.manual_status.into(),
            is_overdue: false,
            due_today: due == today,
            // Today sits inside its own soon-window.
            due_soon: due <= window_end,
        }
    }

    pub fn view(&self, record: MaintenanceRecord, now: DateTime<Utc>) -> RecordView {
        let derived = self.classify(&record, now);
        RecordView { record, derived }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Frequency;
    use chrono::TimeZone;

    fn record_at(scheduled: DateTime<Utc>, status: ManualStatus) -> MaintenanceRecord {
        let mut r = MaintenanceRecord::new("a-1", "Generator", scheduled, Frequency::Monthly, "Service");
        r.manual_status = status;
        r
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_yesterday_is_overdue() {
        let c = Classifier::default();
        let r = record_at(now() - chrono::Duration::days(1), ManualStatus::Scheduled);
        let out = c.classify(&r, now());
        assert_eq!(out.effective_status, EffectiveStatus::Overdue);
        assert!(out.is_overdue);
        assert!(!out.due_today && !out.due_soon);
    }

    #[test]
    fn test_in_progress_can_be_overdue() {
        let c = Classifier::default();
        let r = record_at(now() - chrono::Duration::days(3), ManualStatus::InProgress);
        assert!(c.classify(&r, now()).is_overdue);
    }

    #[test]
    fn test_earlier_same_day_is_due_today_not_overdue() {
        let c = Classifier::default();
        // 00:05 today, while now is 09:30
        let r = record_at(Utc.with_ymd_and_hms(2026, 10, 17, 0, 5, 0).unwrap(), ManualStatus::Scheduled);
        let out = c.classify(&r, now());
        assert!(!out.is_overdue);
        assert!(out.due_today);
        assert!(out.due_soon);
        assert_eq!(out.effective_status, EffectiveStatus::Scheduled);
    }

    #[test]
    fn test_due_soon_window_edges() {
        let c = Classifier::default();
        let in_seven = record_at(Utc.with_ymd_and_hms(2026, 10, 24, 23, 0, 0).unwrap(), ManualStatus::Scheduled);
        let in_eight = record_at(Utc.with_ymd_and_hms(2026, 10, 25, 0, 0, 0).unwrap(), ManualStatus::Scheduled);
        assert!(c.classify(&in_seven, now()).due_soon);
        let far = c.classify(&in_eight, now());
        assert!(!far.due_soon && !far.due_today && !far.is_overdue);
        assert_eq!(far.effective_status, EffectiveStatus::Scheduled);
    }

    #[test]
    fn test_terminal_never_overdue() {
        let c = Classifier::default();
        for status in [ManualStatus::Completed, ManualStatus::Cancelled] {
            let r = record_at(now() - chrono::Duration::days(30), status);
            let out = c.classify(&r, now());
            assert!(!out.is_overdue);
            assert_eq!(out.effective_status, EffectiveStatus::from(status));
            assert!(!out.due_today && !out.due_soon);
        }
    }

    #[test]
    fn test_offset_moves_day_boundary() {
        // UTC+7: 2026-10-16T20:00Z is already 2026-10-17 03:00 locally.
        let c = Classifier::new(7, FixedOffset::east_opt(7 * 3600).unwrap());
        let r = record_at(Utc.with_ymd_and_hms(2026, 10, 16, 20, 0, 0).unwrap(), ManualStatus::Scheduled);
        let out = c.classify(&r, now());
        assert!(out.due_today);
        assert!(!out.is_overdue);

        let utc = Classifier::default();
        assert!(utc.classify(&r, now()).is_overdue);
    }

    #[test]
    fn test_day_start_and_parse() {
        let c = Classifier::new(7, FixedOffset::east_opt(7 * 3600).unwrap());
        let day = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert_eq!(c.day_start(day), Utc.with_ymd_and_hms(2026, 10, 16, 17, 0, 0).unwrap());
        assert_eq!(c.parse_instant("2026-10-17").unwrap(), c.day_start(day));
        assert_eq!(
            c.parse_instant("2026-10-17T08:00:00Z").unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap()
        );
        assert_eq!(
            c.parse_instant("2026-10-17T10:00").unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 17, 3, 0, 0).unwrap()
        );
        assert!(matches!(c.parse_instant("17/10/2026"), Err(UpkeepError::Validation(_))));
    }

    #[test]
    fn test_effective_status_parse() {
        assert_eq!("Overdue".parse::<EffectiveStatus>().unwrap(), EffectiveStatus::Overdue);
        assert_eq!("in-progress".parse::<EffectiveStatus>().unwrap(), EffectiveStatus::InProgress);
        assert!("later".parse::<EffectiveStatus>().is_err());
    }

    #[test]
    fn test_view_serializes_flat() {
        let c = Classifier::default();
        let view = c.view(record_at(now(), ManualStatus::Scheduled), now());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["effective_status"], "scheduled");
        assert_eq!(json["due_today"], true);
        assert_eq!(json["manual_status"], "scheduled");
    }
}
