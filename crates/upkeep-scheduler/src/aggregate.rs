//! Read-side views: calendar buckets, dashboard counts, cost statistics and
//! filtered lists. Every record is classified on the way out.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use upkeep_core::{Result, UpkeepError};

use crate::classify::{Classifier, EffectiveStatus, RecordView};
use crate::record::{MaintenanceRecord, ManualStatus};
use crate::scan::Scanner;
use crate::store::{Candidate, DateRange, RecordStore};

/// Records grouped by the calendar day they are scheduled on.
pub type CalendarMonth = BTreeMap<NaiveDate, Vec<RecordView>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub today: Option<NaiveDate>,
    pub overdue: usize,
    pub due_today: usize,
    pub due_soon: usize,
    pub in_progress: usize,
    pub scheduled: usize,
    pub skipped: usize,
}

/// Statistics filter. Date bounds are inclusive calendar days.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub service_type: Option<String>,
    pub technician: Option<String>,
    /// Case-insensitive match on asset name, service type, technician, notes.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaintenanceStats {
    pub total_records: usize,
    pub total_cost: f64,
    pub average_cost: f64,
    pub most_frequent_service_type: Option<String>,
    pub most_frequent_technician: Option<String>,
}

#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn RecordStore>,
    scanner: Scanner,
}

impl Aggregator {
    pub fn new(store: Arc<dyn RecordStore>, scanner: Scanner) -> Self {
        Self { store, scanner }
    }

    fn classifier(&self) -> &Classifier {
        self.scanner.classifier()
    }

    /// All records of any status whose calendar day falls in `year`-`month`.
    pub fn calendar(&self, year: i32, month: u32, now: DateTime<Utc>) -> Result<CalendarMonth> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| UpkeepError::Validation(format!("invalid month {year}-{month}")))?;
        let next = first
            .checked_add_months(Months::new(1))
            .ok_or_else(|| UpkeepError::Validation(format!("invalid month {year}-{month}")))?;
        let range = DateRange {
            from: Some(self.classifier().day_start(first)),
            until: Some(self.classifier().day_start(next)),
        };

        let mut month_view = CalendarMonth::new();
        for view in self.views(self.store.records_in_range(&range)?, now) {
            let day = self.classifier().calendar_day(view.record.scheduled_date);
            month_view.entry(day).or_default().push(view);
        }
        Ok(month_view)
    }

    pub fn dashboard(&self, now: DateTime<Utc>) -> Result<Dashboard> {
        let sets = self.scanner.scan(now)?;
        Ok(Dashboard {
            today: Some(self.classifier().calendar_day(now)),
            overdue: sets.overdue.len(),
            due_today: sets.due_today.len(),
            due_soon: sets.due_soon.len(),
            in_progress: sets.in_progress.len(),
            scheduled: sets.scheduled.len(),
            skipped: sets.skipped.len(),
        })
    }

    /// Cost and frequency statistics. An empty selection yields zeros.
    pub fn statistics(&self, filter: &StatsFilter) -> Result<MaintenanceStats> {
        let range = DateRange {
            from: filter.from.map(|d| self.classifier().day_start(d)),
            until: filter
                .to
                .and_then(|d| d.succ_opt())
                .map(|d| self.classifier().day_start(d)),
        };
        let records: Vec<MaintenanceRecord> = self
            .store
            .records_in_range(&range)?
            .into_iter()
            .filter_map(keep_decoded)
            .filter(|r| matches_filter(r, filter))
            .collect();

        let total_records = records.len();
        let total_cost: f64 = records.iter().filter_map(|r| r.cost).sum();
        let average_cost = if total_records == 0 {
            0.0
        } else {
            total_cost / total_records as f64
        };

        Ok(MaintenanceStats {
            total_records,
            total_cost,
            average_cost,
            most_frequent_service_type: most_frequent(records.iter().map(|r| Some(r.service_type.as_str()))),
            most_frequent_technician: most_frequent(records.iter().map(|r| r.technician.as_deref())),
        })
    }

    pub fn list_by_status(&self, status: EffectiveStatus, now: DateTime<Utc>) -> Result<Vec<RecordView>> {
        let candidates = match status {
            EffectiveStatus::Overdue => return Ok(self.scanner.scan(now)?.overdue),
            EffectiveStatus::Scheduled => self.store.records_with_status(ManualStatus::Scheduled)?,
            EffectiveStatus::InProgress => self.store.records_with_status(ManualStatus::InProgress)?,
            EffectiveStatus::Completed => self.store.records_with_status(ManualStatus::Completed)?,
            EffectiveStatus::Cancelled => self.store.records_with_status(ManualStatus::Cancelled)?,
        };
        // Overdue records are listed under Overdue only.
        Ok(self
            .views(candidates, now)
            .into_iter()
            .filter(|v| v.derived.effective_status == status)
            .collect())
    }

    pub fn list_by_asset(&self, asset_id: &str, now: DateTime<Utc>) -> Result<Vec<RecordView>> {
        Ok(self.views(self.store.records_for_asset(asset_id)?, now))
    }

    /// Every record in the store, oldest first.
    pub fn list_all(&self, now: DateTime<Utc>) -> Result<Vec<RecordView>> {
        Ok(self.views(self.store.records_in_range(&DateRange::default())?, now))
    }

    fn views(&self, candidates: Vec<Candidate>, now: DateTime<Utc>) -> Vec<RecordView> {
        candidates
            .into_iter()
            .filter_map(keep_decoded)
            .map(|r| self.classifier().view(r, now))
            .collect()
    }
}

fn keep_decoded(candidate: Candidate) -> Option<MaintenanceRecord> {
    match candidate {
        Ok(record) => Some(record),
        Err(skipped) => {
            tracing::warn!("⚠️ Skipping malformed record {}: {}", skipped.id, skipped.reason);
            None
        }
    }
}

fn matches_filter(record: &MaintenanceRecord, filter: &StatsFilter) -> bool {
    let same = |want: &Option<String>, have: Option<&str>| match want.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(w) => have.is_some_and(|h| h.eq_ignore_ascii_case(w)),
    };
    if !same(&filter.service_type, Some(&record.service_type)) || !same(&filter.technician, record.technician.as_deref()) {
        return false;
    }
    match filter.search.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(term) => {
            let term = term.to_lowercase();
            [
                Some(record.asset_name.as_str()),
                Some(record.service_type.as_str()),
                record.technician.as_deref(),
                record.notes.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&term))
        }
    }
}

/// Most common non-empty value; ties go to the first encountered.
fn most_frequent<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values.flatten().filter(|v| !v.trim().is_empty()) {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, n) in counts {
        if best.is_none_or(|(_, top)| n > top) {
            best = Some((value, n));
        }
    }
    best.map(|(v, _)| v.to_string())
}
