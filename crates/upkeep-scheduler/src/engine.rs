//! Sweep engine: one due check is scan + dispatch. Runs on demand or from a
//! tokio interval loop. Sweeps are idempotent, so overlapping runs (other
//! processes, manual triggers) stay correct; the in-process lease only
//! avoids wasted work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use upkeep_core::Result;
use upkeep_core::config::SchedulerConfig;

use crate::dispatch::{DispatchFailure, Dispatcher};
use crate::notify::Recipient;
use crate::persistence::MaintenanceDb;
use crate::scan::Scanner;
use crate::store::SkippedRecord;

/// Summary of one sweep.
#[derive(Debug, Clone, Serialize)]
pub struct DueCheckReport {
    pub checked_at: DateTime<Utc>,
    pub overdue_count: usize,
    pub due_today_count: usize,
    pub notifications_created: usize,
    pub duplicates_skipped: usize,
    pub skipped_records: Vec<SkippedRecord>,
    pub failed_notifications: Vec<DispatchFailure>,
}

pub struct SweepEngine {
    scanner: Scanner,
    dispatcher: Dispatcher,
    running: AtomicBool,
}

impl SweepEngine {
    pub fn new(scanner: Scanner, dispatcher: Dispatcher) -> Self {
        Self {
            scanner,
            dispatcher,
            running: AtomicBool::new(false),
        }
    }

    /// Wire scanner and dispatcher to one database.
    pub fn from_config(db: Arc<MaintenanceDb>, config: &SchedulerConfig) -> Result<Self> {
        let scanner = Scanner::from_config(db.clone(), config)?;
        let recipient: Recipient = config.notify_recipient.parse()?;
        let dispatcher = Dispatcher::new(db, recipient, *scanner.classifier());
        Ok(Self::new(scanner, dispatcher))
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Scan, then notify overdue and due-today records.
    pub fn run_due_check(&self, now: DateTime<Utc>) -> Result<DueCheckReport> {
        let sets = self.scanner.scan(now)?;
        let dispatched = self.dispatcher.dispatch(&sets.overdue, &sets.due_today, now);

        let report = DueCheckReport {
            checked_at: now,
            overdue_count: sets.overdue.len(),
            due_today_count: sets.due_today.len(),
            notifications_created: dispatched.created.len(),
            duplicates_skipped: dispatched.skipped,
            skipped_records: sets.skipped,
            failed_notifications: dispatched.failed,
        };
        tracing::info!(
            "🧹 Due check: {} overdue, {} due today, {} notified, {} failed, {} skipped rows",
            report.overdue_count,
            report.due_today_count,
            report.notifications_created,
            report.failed_notifications.len(),
            report.skipped_records.len()
        );
        Ok(report)
    }

    /// Like `run_due_check`, but returns `None` if a sweep is already running
    /// in this process.
    pub fn try_run_due_check(&self, now: DateTime<Utc>) -> Result<Option<DueCheckReport>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }
        let _lease = Lease(&self.running);
        self.run_due_check(now).map(Some)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Releases the sweep lease on drop, including on error.
struct Lease<'a>(&'a AtomicBool);

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Spawn the sweep loop. The first sweep runs immediately.
pub async fn spawn_sweeper(engine: Arc<SweepEngine>, check_interval_secs: u64) {
    tracing::info!("⏰ Maintenance sweeper started (every {}s)", check_interval_secs);

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(check_interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let eng = engine.clone();
        match tokio::task::spawn_blocking(move || eng.try_run_due_check(Utc::now())).await {
            Ok(Ok(Some(_))) => {}
            Ok(Ok(None)) => tracing::debug!("Previous sweep still running, tick skipped"),
            Ok(Err(e)) => tracing::warn!("⚠️ Due check failed, retrying next tick: {e}"),
            Err(e) => tracing::error!("Sweep task panicked: {e}"),
        }
    }
}
