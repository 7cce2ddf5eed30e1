//! # Upkeep Scheduler
//!
//! Maintenance scheduling and notification engine.
//!
//! ## Design Principles
//! - Overdue is derived at read time, never stored as user intent
//! - SQLite persistence: survives restarts, several handles per file
//! - One notification per record and occurrence, guarded by an atomic check-and-set
//! - Tokio timers only: zero overhead when idle
//!
//! ## Architecture
//! ```text
//! SweepEngine (tokio interval / on-demand)
//!   ├── Scanner: open records → overdue / due_today / due_soon / in_progress / scheduled
//!   │     └── Classifier: manual status + scheduled day + today → effective status
//!   └── Dispatcher: overdue ∪ due_today → claim_and_notify (per record)
//!                     └── notifications table (polled) + optional broadcast
//!
//! Lifecycle: create / start / complete / cancel / reschedule
//!   └── Recurrence: next date from frequency, month-end clamped
//! Aggregator: calendar buckets, dashboard, statistics, filtered lists
//! ```

pub mod aggregate;
pub mod classify;
pub mod dispatch;
pub mod engine;
pub mod lifecycle;
pub mod notify;
pub mod persistence;
pub mod record;
pub mod recurrence;
pub mod scan;
pub mod store;

pub use aggregate::{Aggregator, Dashboard, MaintenanceStats, StatsFilter};
pub use classify::{Classification, Classifier, EffectiveStatus, RecordView};
pub use dispatch::{DispatchReport, Dispatcher};
pub use engine::{DueCheckReport, SweepEngine, spawn_sweeper};
pub use lifecycle::{Completion, Lifecycle, NewRecord, RecordPatch};
pub use notify::{NewNotification, Notification, NotificationKind, NotifyPriority, Recipient};
pub use persistence::MaintenanceDb;
pub use record::{Frequency, MaintenanceRecord, ManualStatus, RecordPriority};
pub use recurrence::{compute_next_date, next_due_date};
pub use scan::{DueSets, Scanner};
pub use store::{AssetRegistry, ClaimOutcome, DedupGuard, NotificationStore, RecordStore, SkippedRecord};
