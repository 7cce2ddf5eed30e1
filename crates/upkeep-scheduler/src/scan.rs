//! Due-set scanner: partitions open records into overdue / due-today /
//! due-soon / in-progress / scheduled for one instant.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use upkeep_core::Result;
use upkeep_core::config::SchedulerConfig;

use crate::classify::{Classifier, RecordView};
use crate::record::ManualStatus;
use crate::store::{RecordStore, SkippedRecord};

/// Categorized records from one scan. `due_today` is a subset of `due_soon`;
/// `in_progress` and `scheduled` hold only records that are not overdue.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DueSets {
    pub overdue: Vec<RecordView>,
    pub due_today: Vec<RecordView>,
    pub due_soon: Vec<RecordView>,
    pub in_progress: Vec<RecordView>,
    pub scheduled: Vec<RecordView>,
    /// Rows that could not be decoded.
    pub skipped: Vec<SkippedRecord>,
}

#[derive(Clone)]
pub struct Scanner {
    store: Arc<dyn RecordStore>,
    classifier: Classifier,
    horizon_days: u32,
    write_back: bool,
}

impl Scanner {
    pub fn new(store: Arc<dyn RecordStore>, classifier: Classifier) -> Self {
        Self {
            store,
            classifier,
            horizon_days: 365,
            write_back: true,
        }
    }

    pub fn from_config(store: Arc<dyn RecordStore>, config: &SchedulerConfig) -> Result<Self> {
        Ok(Self::new(store, Classifier::from_config(config)?)
            .with_horizon(config.scan_horizon_days)
            .with_write_back(config.write_back_cache))
    }

    /// Days past today the store query reaches. Never narrower than the
    /// due-soon window.
    pub fn with_horizon(mut self, days: u32) -> Self {
        self.horizon_days = days;
        self
    }

    pub fn with_write_back(mut self, enabled: bool) -> Self {
        self.write_back = enabled;
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Classify every open record up to the horizon. Undecodable rows are
    /// reported in `skipped`; only a store failure aborts the scan.
    pub fn scan(&self, now: DateTime<Utc>) -> Result<DueSets> {
        let today = self.classifier.calendar_day(now);
        let horizon = self.horizon_days.max(self.classifier.due_soon_days());
        let last_day = today
            .checked_add_days(Days::new(u64::from(horizon)))
            .unwrap_or(NaiveDate::MAX);
        let until = last_day
            .succ_opt()
            .map(|d| self.classifier.day_start(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let candidates = self.store.open_records_before(until)?;
        let mut sets = DueSets::default();
        let mut cached = 0usize;

        for candidate in candidates {
            let record = match candidate {
                Ok(record) => record,
                Err(skipped) => {
                    tracing::warn!("⚠️ Skipping malformed record {}: {}", skipped.id, skipped.reason);
                    sets.skipped.push(skipped);
                    continue;
                }
            };
            let view = self.classifier.view(record, now);

            if self.write_back {
                match self.store.cache_classification(
                    &view.record,
                    view.derived.effective_status,
                    view.derived.is_overdue,
                    today,
                ) {
                    Ok(true) => cached += 1,
                    Ok(false) => {}
                    Err(e) => tracing::warn!("Cache write-back failed for {}: {e}", view.record.id),
                }
            }

            let derived = view.derived;
            if derived.is_overdue {
                sets.overdue.push(view);
                continue;
            }
            if derived.due_today {
                sets.due_today.push(view.clone());
            }
            if derived.due_soon {
                sets.due_soon.push(view.clone());
            }
            match view.record.manual_status {
                ManualStatus::InProgress => sets.in_progress.push(view),
                ManualStatus::Scheduled => sets.scheduled.push(view),
                ManualStatus::Completed | ManualStatus::Cancelled => {}
            }
        }

        tracing::debug!(
            "Scan {today}: {} overdue, {} due today, {} due soon, {} cached, {} skipped",
            sets.overdue.len(),
            sets.due_today.len(),
            sets.due_soon.len(),
            cached,
            sets.skipped.len()
        );
        Ok(sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MaintenanceDb;
    use crate::record::{Frequency, MaintenanceRecord};
    use crate::store::{Candidate, DateRange};
    use crate::classify::EffectiveStatus;
    use chrono::TimeZone;
    use std::path::PathBuf;
    use upkeep_core::UpkeepError;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap()
    }

    fn add(db: &MaintenanceDb, days: i64, status: ManualStatus) -> MaintenanceRecord {
        let mut r = MaintenanceRecord::new(
            "gen-1",
            "Generator",
            now() + chrono::Duration::days(days),
            Frequency::Monthly,
            "Load test",
        );
        r.manual_status = status;
        db.insert_record(&r).unwrap();
        r
    }

    fn setup() -> (Arc<MaintenanceDb>, Scanner) {
        let db = Arc::new(MaintenanceDb::open(&PathBuf::from(":memory:")).unwrap());
        let scanner = Scanner::new(db.clone(), Classifier::default());
        (db, scanner)
    }

    fn ids(views: &[RecordView]) -> Vec<&str> {
        views.iter().map(|v| v.record.id.as_str()).collect()
    }

    #[test]
    fn test_yesterday_lands_in_overdue() {
        let (db, scanner) = setup();
        let r = add(&db, -1, ManualStatus::Scheduled);
        let sets = scanner.scan(now()).unwrap();
        assert_eq!(ids(&sets.overdue), vec![r.id.as_str()]);
        assert!(sets.scheduled.is_empty() && sets.due_today.is_empty());
    }

    #[test]
    fn test_huge_horizon_still_finds_overdue() {
        let (db, scanner) = setup();
        let late = add(&db, -2, ManualStatus::Scheduled);
        let far = add(&db, 4_000, ManualStatus::Scheduled);
        let sets = scanner.with_horizon(3_000_000).scan(now()).unwrap();
        assert_eq!(ids(&sets.overdue), vec![late.id.as_str()]);
        assert_eq!(ids(&sets.scheduled), vec![far.id.as_str()]);
    }

    #[test]
    fn test_partitions() {
        let (db, scanner) = setup();
        let overdue_wip = add(&db, -3, ManualStatus::InProgress);
        let today = add(&db, 0, ManualStatus::Scheduled);
        let soon = add(&db, 5, ManualStatus::InProgress);
        let later = add(&db, 30, ManualStatus::Scheduled);
        add(&db, -10, ManualStatus::Completed);
        add(&db, -10, ManualStatus::Cancelled);

        let sets = scanner.scan(now()).unwrap();
        assert_eq!(ids(&sets.overdue), vec![overdue_wip.id.as_str()]);
        assert_eq!(ids(&sets.due_today), vec![today.id.as_str()]);
        assert_eq!(ids(&sets.due_soon), vec![today.id.as_str(), soon.id.as_str()]);
        assert_eq!(ids(&sets.in_progress), vec![soon.id.as_str()]);
        assert_eq!(ids(&sets.scheduled), vec![today.id.as_str(), later.id.as_str()]);
    }

    #[test]
    fn test_horizon_brackets_query() {
        let (db, scanner) = setup();
        add(&db, 400, ManualStatus::Scheduled);
        let near = add(&db, 20, ManualStatus::Scheduled);
        let sets = scanner.scan(now()).unwrap();
        assert_eq!(ids(&sets.scheduled), vec![near.id.as_str()]);

        let wide = scanner.clone().with_horizon(500);
        assert_eq!(wide.scan(now()).unwrap().scheduled.len(), 2);
    }

    #[test]
    fn test_malformed_rows_are_skipped_not_fatal() {
        let (db, scanner) = setup();
        let good = add(&db, -2, ManualStatus::Scheduled);
        db.exec_raw(
            "INSERT INTO maintenance_records
                (id, asset_id, asset_name, scheduled_date, manual_status, frequency, service_type, created_at, updated_at)
             VALUES ('broken', 'a', 'A', '2026-10-01T00:00:00Z', 'overdue', 'monthly', 'x',
                     '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z');",
        )
        .unwrap();
        let sets = scanner.scan(now()).unwrap();
        assert_eq!(ids(&sets.overdue), vec![good.id.as_str()]);
        assert_eq!(sets.skipped.len(), 1);
        assert_eq!(sets.skipped[0].id, "broken");
    }

    #[test]
    fn test_write_back_cache() {
        let (db, scanner) = setup();
        let r = add(&db, -1, ManualStatus::Scheduled);
        scanner.scan(now()).unwrap();
        assert_eq!(
            db.cached_status(&r.id),
            Some(("overdue".to_string(), true, "2026-10-17".to_string()))
        );

        let (db, scanner) = setup();
        let r = add(&db, -1, ManualStatus::Scheduled);
        scanner.with_write_back(false).scan(now()).unwrap();
        assert_eq!(db.cached_status(&r.id), None);
    }

    struct DownStore;

    impl RecordStore for DownStore {
        fn insert_record(&self, _: &MaintenanceRecord) -> Result<()> {
            unreachable!()
        }
        fn get_record(&self, _: &str) -> Result<Option<MaintenanceRecord>> {
            unreachable!()
        }
        fn update_record(&self, _: &MaintenanceRecord, _: bool) -> Result<()> {
            unreachable!()
        }
        fn delete_record(&self, _: &str) -> Result<bool> {
            unreachable!()
        }
        fn open_records_before(&self, _: DateTime<Utc>) -> Result<Vec<Candidate>> {
            Err(UpkeepError::StoreUnavailable("database is locked".into()))
        }
        fn records_in_range(&self, _: &DateRange) -> Result<Vec<Candidate>> {
            unreachable!()
        }
        fn records_with_status(&self, _: ManualStatus) -> Result<Vec<Candidate>> {
            unreachable!()
        }
        fn records_for_asset(&self, _: &str) -> Result<Vec<Candidate>> {
            unreachable!()
        }
        fn cache_classification(
            &self,
            _: &MaintenanceRecord,
            _: EffectiveStatus,
            _: bool,
            _: NaiveDate,
        ) -> Result<bool> {
            unreachable!()
        }
    }

    #[test]
    fn test_store_outage_fails_whole_scan() {
        let scanner = Scanner::new(Arc::new(DownStore), Classifier::default());
        let err = scanner.scan(now()).unwrap_err();
        assert!(err.is_transient());
    }
}
