//! Notification dispatch: turns overdue and due-today records into at most one
//! maintenance notification each, using the store's dedup guard.
//! Polling the store is the delivery path; an optional broadcast sender lets
//! in-process consumers get pushed copies.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::classify::{Classifier, RecordView};
use crate::notify::{NewNotification, Notification, NotificationKind, NotifyPriority, Recipient};
use crate::store::{ClaimOutcome, DedupGuard};

/// One record whose notification could not be stored this sweep.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchFailure {
    pub record_id: String,
    pub error: String,
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub created: Vec<Notification>,
    /// Guard already set, or the record was resolved meanwhile.
    pub skipped: usize,
    /// Left for the next sweep.
    pub failed: Vec<DispatchFailure>,
}

#[derive(Clone)]
pub struct Dispatcher {
    guard: Arc<dyn DedupGuard>,
    recipient: Recipient,
    classifier: Classifier,
    publisher: Option<broadcast::Sender<Notification>>,
}

impl Dispatcher {
    pub fn new(guard: Arc<dyn DedupGuard>, recipient: Recipient, classifier: Classifier) -> Self {
        Self {
            guard,
            recipient,
            classifier,
            publisher: None,
        }
    }

    /// Also push every created notification to `sender`.
    pub fn with_publisher(mut self, sender: broadcast::Sender<Notification>) -> Self {
        self.publisher = Some(sender);
        self
    }

    pub fn recipient(&self) -> &Recipient {
        &self.recipient
    }

    /// Notify once per record across both sets. A record in both is treated as
    /// overdue. Per-record failures are collected, never propagated.
    pub fn dispatch(
        &self,
        overdue: &[RecordView],
        due_today: &[RecordView],
        now: DateTime<Utc>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut seen = HashSet::new();

        let tagged = overdue
            .iter()
            .map(|v| (v, true))
            .chain(due_today.iter().map(|v| (v, false)));

        for (view, is_overdue) in tagged {
            if !seen.insert(view.record.id.as_str()) {
                continue;
            }
            let notification = self.compose(view, is_overdue, now);
            match self.guard.claim_and_notify(&view.record, &notification) {
                Ok(ClaimOutcome::Created(created)) => {
                    tracing::info!(
                        "🔔 Maintenance notification #{} for {} ({})",
                        created.id,
                        view.record.asset_name,
                        view.record.id
                    );
                    if let Some(tx) = &self.publisher {
                        // No subscribers is fine.
                        let _ = tx.send(created.clone());
                    }
                    report.created.push(created);
                }
                Ok(ClaimOutcome::AlreadySent) => {
                    tracing::debug!("Duplicate notification prevented for {}", view.record.id);
                    report.skipped += 1;
                }
                Ok(ClaimOutcome::Resolved) => {
                    tracing::debug!("Record {} resolved or changed before dispatch", view.record.id);
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!("❌ Notification for {} failed: {e}", view.record.id);
                    report.failed.push(DispatchFailure {
                        record_id: view.record.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    fn compose(&self, view: &RecordView, is_overdue: bool, now: DateTime<Utc>) -> NewNotification {
        let record = &view.record;
        let due = self.classifier.calendar_day(record.scheduled_date);
        let (title, message, priority) = if is_overdue {
            let days = (self.classifier.calendar_day(now) - due).num_days();
            (
                format!("Maintenance overdue: {}", record.asset_name),
                format!(
                    "{} for {} was due {} ({} day{} overdue).",
                    record.service_type,
                    record.asset_name,
                    due,
                    days,
                    if days == 1 { "" } else { "s" }
                ),
                NotifyPriority::High,
            )
        } else {
            (
                format!("Maintenance due today: {}", record.asset_name),
                format!("{} for {} is due today ({}).", record.service_type, record.asset_name, due),
                NotifyPriority::Medium,
            )
        };
        NewNotification {
            recipient: self.recipient.clone(),
            kind: NotificationKind::Maintenance,
            title,
            message,
            record_id: Some(record.id.clone()),
            asset_id: Some(record.asset_id.clone()),
            priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MaintenanceDb;
    use crate::record::{Frequency, MaintenanceRecord, ManualStatus};
    use crate::scan::Scanner;
    use crate::store::{NotificationStore, RecordStore};
    use chrono::TimeZone;
    use std::path::PathBuf;
    use upkeep_core::{Result, UpkeepError};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap()
    }

    fn role() -> Recipient {
        Recipient::Role("maintenance".into())
    }

    fn add(db: &MaintenanceDb, days: i64) -> MaintenanceRecord {
        let r = MaintenanceRecord::new(
            "hvac-3",
            "Rooftop HVAC",
            now() + chrono::Duration::days(days),
            Frequency::Quarterly,
            "Filter change",
        );
        db.insert_record(&r).unwrap();
        r
    }

    fn setup() -> (Arc<MaintenanceDb>, Scanner, Dispatcher) {
        let db = Arc::new(MaintenanceDb::open(&PathBuf::from(":memory:")).unwrap());
        let scanner = Scanner::new(db.clone(), Classifier::default());
        let dispatcher = Dispatcher::new(db.clone(), role(), Classifier::default());
        (db, scanner, dispatcher)
    }

    fn sweep(scanner: &Scanner, dispatcher: &Dispatcher) -> DispatchReport {
        let sets = scanner.scan(now()).unwrap();
        dispatcher.dispatch(&sets.overdue, &sets.due_today, now())
    }

    #[test]
    fn test_overdue_record_gets_one_high_notification() {
        let (db, scanner, dispatcher) = setup();
        let r = add(&db, -1);
        let report = sweep(&scanner, &dispatcher);
        assert_eq!(report.created.len(), 1);
        let n = &report.created[0];
        assert_eq!(n.priority, NotifyPriority::High);
        assert_eq!(n.kind, NotificationKind::Maintenance);
        assert_eq!(n.record_id.as_deref(), Some(r.id.as_str()));
        assert_eq!(n.recipient, role());
        assert!(n.message.contains("1 day overdue"));
        assert!(db.get_record(&r.id).unwrap().unwrap().notification_sent);
    }

    #[test]
    fn test_second_sweep_same_day_creates_nothing() {
        let (db, scanner, dispatcher) = setup();
        add(&db, -1);
        sweep(&scanner, &dispatcher);
        let again = sweep(&scanner, &dispatcher);
        assert!(again.created.is_empty());
        assert_eq!(again.skipped, 1);
        assert_eq!(db.list_notifications(&[role()], false, 100).unwrap().len(), 1);
    }

    #[test]
    fn test_due_today_is_medium() {
        let (db, scanner, dispatcher) = setup();
        add(&db, 0);
        let report = sweep(&scanner, &dispatcher);
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].priority, NotifyPriority::Medium);
        assert!(report.created[0].title.starts_with("Maintenance due today"));
    }

    #[test]
    fn test_record_in_both_sets_is_notified_once_as_overdue() {
        let (db, scanner, dispatcher) = setup();
        add(&db, -2);
        let sets = scanner.scan(now()).unwrap();
        let report = dispatcher.dispatch(&sets.overdue, &sets.overdue, now());
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.created[0].priority, NotifyPriority::High);
    }

    #[test]
    fn test_far_future_records_not_notified() {
        let (db, scanner, dispatcher) = setup();
        add(&db, 3);
        assert!(sweep(&scanner, &dispatcher).created.is_empty());
    }

    /// Fails claims for one record id, delegates the rest.
    struct FlakyGuard {
        inner: Arc<MaintenanceDb>,
        failing: String,
    }

    impl DedupGuard for FlakyGuard {
        fn claim_and_notify(&self, record: &MaintenanceRecord, n: &NewNotification) -> Result<ClaimOutcome> {
            if record.id == self.failing {
                return Err(UpkeepError::StoreUnavailable("disk I/O error".into()));
            }
            self.inner.claim_and_notify(record, n)
        }
    }

    #[test]
    fn test_failure_is_isolated_and_retried() {
        let (db, scanner, healthy) = setup();
        let bad = add(&db, -4);
        let good = add(&db, -1);
        let flaky = Dispatcher::new(
            Arc::new(FlakyGuard { inner: db.clone(), failing: bad.id.clone() }),
            role(),
            Classifier::default(),
        );

        let report = sweep(&scanner, &flaky);
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].record_id.as_deref(), Some(good.id.as_str()));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].record_id, bad.id);
        assert!(!db.get_record(&bad.id).unwrap().unwrap().notification_sent);

        let retry = sweep(&scanner, &healthy);
        assert_eq!(retry.created.len(), 1);
        assert_eq!(retry.created[0].record_id.as_deref(), Some(bad.id.as_str()));
    }

    #[test]
    fn test_resolved_between_scan_and_dispatch() {
        let (db, scanner, dispatcher) = setup();
        let r = add(&db, -1);
        let sets = scanner.scan(now()).unwrap();
        let mut done = r.clone();
        done.manual_status = ManualStatus::Completed;
        done.completed_date = Some(now());
        db.update_record(&done, true).unwrap();

        let report = dispatcher.dispatch(&sets.overdue, &sets.due_today, now());
        assert!(report.created.is_empty());
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_rescheduled_between_scan_and_dispatch_notifies_on_new_date() {
        let (db, scanner, dispatcher) = setup();
        let r = add(&db, -2);
        let sets = scanner.scan(now()).unwrap();
        assert_eq!(sets.overdue.len(), 1);

        let new_date = Utc.with_ymd_and_hms(2026, 11, 20, 8, 0, 0).unwrap();
        let mut moved = r.clone();
        moved.scheduled_date = new_date;
        db.update_record(&moved, true).unwrap();

        // The overdue condition the scan saw is gone; nothing is sent for it.
        let stale = dispatcher.dispatch(&sets.overdue, &sets.due_today, now());
        assert!(stale.created.is_empty());
        assert_eq!(stale.skipped, 1);
        assert!(!db.get_record(&r.id).unwrap().unwrap().notification_sent);
        assert_eq!(db.unread_count(&[]).unwrap(), 0);

        let sets = scanner.scan(new_date).unwrap();
        assert_eq!(sets.due_today.len(), 1);
        let report = dispatcher.dispatch(&sets.overdue, &sets.due_today, new_date);
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].priority, NotifyPriority::Medium);
    }

    #[test]
    fn test_started_between_scan_and_dispatch_is_retried_next_sweep() {
        let (db, scanner, dispatcher) = setup();
        let r = add(&db, -1);
        let sets = scanner.scan(now()).unwrap();
        let mut started = r.clone();
        started.manual_status = ManualStatus::InProgress;
        started.started_date = Some(now());
        db.update_record(&started, false).unwrap();

        let stale = dispatcher.dispatch(&sets.overdue, &sets.due_today, now());
        assert!(stale.created.is_empty());

        // Still overdue while in progress, so the next sweep notifies once.
        let next = sweep(&scanner, &dispatcher);
        assert_eq!(next.created.len(), 1);
        assert!(sweep(&scanner, &dispatcher).created.is_empty());
    }

    #[test]
    fn test_concurrent_sweeps_on_shared_file_create_one_notification() {
        let dir = std::env::temp_dir().join(format!("upkeep-dispatch-{}", uuid::Uuid::new_v4()));
        let path = dir.join("upkeep.db");
        let first = Arc::new(MaintenanceDb::open(&path).unwrap());
        let second = Arc::new(MaintenanceDb::open(&path).unwrap());
        for days in [-3, -2, -1, 0] {
            add(&first, days);
        }

        let created: usize = std::thread::scope(|s| {
            let handles: Vec<_> = [first.clone(), second.clone()]
                .into_iter()
                .map(|db| {
                    s.spawn(move || {
                        let scanner = Scanner::new(db.clone(), Classifier::default());
                        let dispatcher = Dispatcher::new(db, role(), Classifier::default());
                        sweep(&scanner, &dispatcher).created.len()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(created, 4);
        assert_eq!(first.list_notifications(&[], false, 100).unwrap().len(), 4);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_publisher_receives_created() {
        let (db, scanner, dispatcher) = setup();
        let (tx, mut rx) = broadcast::channel(8);
        let dispatcher = dispatcher.with_publisher(tx);
        let r = add(&db, -1);
        sweep(&scanner, &dispatcher);
        let pushed = rx.try_recv().unwrap();
        assert_eq!(pushed.record_id.as_deref(), Some(r.id.as_str()));
        assert!(rx.try_recv().is_err());
    }
}
