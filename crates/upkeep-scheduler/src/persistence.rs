//! SQLite-backed persistence for maintenance records, assets and notifications.
//! Survives restarts and supports several handles on one file (WAL + busy timeout).

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior, params, params_from_iter};
use upkeep_core::{Result, UpkeepError};

use crate::classify::EffectiveStatus;
use crate::notify::{NewNotification, Notification, Recipient};
use crate::record::{MaintenanceRecord, ManualStatus};
use crate::store::{
    AssetRegistry, Candidate, ClaimOutcome, DateRange, DedupGuard, NotificationStore, RecordStore,
    SkippedRecord,
};

const RECORD_COLUMNS: &str = "id, asset_id, asset_name, scheduled_date, started_date, completed_date, \
     manual_status, frequency, next_maintenance_date, service_type, technician, priority, cost, notes, \
     notification_sent, created_at, updated_at, revision";

const NOTIFICATION_COLUMNS: &str =
    "id, recipient, kind, title, message, record_id, asset_id, priority, is_read, read_at, created_at";

/// Persistent store for the whole engine.
pub struct MaintenanceDb {
    conn: Mutex<Connection>,
}

impl MaintenanceDb {
    /// Open or create the database. `:memory:` gives a private in-memory store.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if path != Path::new(":memory:") {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(store_err)?;

        // WAL lets the HTTP surface read while a sweep writes.
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.busy_timeout(Duration::from_secs(5)).map_err(store_err)?;

        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS assets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS maintenance_records (
                id TEXT PRIMARY KEY,
                asset_id TEXT NOT NULL,
                asset_name TEXT NOT NULL,
                scheduled_date TEXT NOT NULL,      -- RFC 3339, UTC, whole seconds
                started_date TEXT,
                completed_date TEXT,
                manual_status TEXT NOT NULL DEFAULT 'scheduled',
                frequency TEXT NOT NULL DEFAULT 'as_needed',
                next_maintenance_date TEXT,        -- YYYY-MM-DD
                service_type TEXT NOT NULL,
                technician TEXT,
                priority TEXT NOT NULL DEFAULT 'medium',
                cost REAL,
                notes TEXT,
                notification_sent INTEGER NOT NULL DEFAULT 0,
                cached_status TEXT,                -- written only by the scanner
                cached_overdue INTEGER,
                cached_on TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                revision INTEGER NOT NULL DEFAULT 0  -- bumped by every manual edit
            );

            CREATE INDEX IF NOT EXISTS idx_records_status_date
                ON maintenance_records(manual_status, scheduled_date);
            CREATE INDEX IF NOT EXISTS idx_records_date
                ON maintenance_records(scheduled_date);
            CREATE INDEX IF NOT EXISTS idx_records_asset
                ON maintenance_records(asset_id);

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient TEXT NOT NULL,           -- user:<id> | role:<name>
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                record_id TEXT,                    -- kept after the record is deleted
                asset_id TEXT,
                priority TEXT NOT NULL DEFAULT 'medium',
                is_read INTEGER NOT NULL DEFAULT 0,
                read_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_notifications_recipient
                ON notifications(recipient, is_read);
            ",
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| UpkeepError::StoreUnavailable(format!("lock: {e}")))
    }

    // ─── Assets ───────────────────────────────────────────────

    /// Register or rename an asset.
    pub fn upsert_asset(&self, id: &str, name: &str) -> Result<()> {
        if id.trim().is_empty() || name.trim().is_empty() {
            return Err(UpkeepError::Validation("asset id and name are required".into()));
        }
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO assets (id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![id, name, fmt_ts(Utc::now())],
        )
        .map_err(store_err)?;
        Ok(())
    }

    // ─── Record queries ───────────────────────────────────────

    fn query_records(&self, filter: &str, args: Vec<Option<String>>) -> Result<Vec<Candidate>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM maintenance_records {filter} ORDER BY scheduled_date, id"
        );
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params_from_iter(args), RawRecord::from_row)
            .map_err(store_err)?;
        rows.map(|r| r.map(RawRecord::decode).map_err(store_err))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn exec_raw(&self, sql: &str) -> Result<()> {
        self.lock()?.execute_batch(sql).map_err(store_err)
    }

    #[cfg(test)]
    pub(crate) fn cached_status(&self, id: &str) -> Option<(String, bool, String)> {
        let conn = self.lock().ok()?;
        conn.query_row(
            "SELECT cached_status, cached_overdue, cached_on FROM maintenance_records WHERE id = ?1",
            params![id],
            |r| {
                Ok((
                    r.get::<_, Option<String>>(0)?,
                    r.get::<_, Option<i64>>(1)?,
                    r.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .ok()
        .and_then(|(s, o, on)| Some((s?, o? != 0, on?)))
    }
}

impl AssetRegistry for MaintenanceDb {
    fn asset_name(&self, asset_id: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        conn.query_row("SELECT name FROM assets WHERE id = ?1", params![asset_id], |r| r.get(0))
            .optional()
            .map_err(store_err)
    }
}

impl RecordStore for MaintenanceDb {
    fn insert_record(&self, record: &MaintenanceRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO maintenance_records ({RECORD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
            ),
            params![
                record.id,
                record.asset_id,
                record.asset_name,
                fmt_ts(record.scheduled_date),
                record.started_date.map(fmt_ts),
                record.completed_date.map(fmt_ts),
                record.manual_status.as_str(),
                record.frequency.as_str(),
                record.next_maintenance_date.map(fmt_day),
                record.service_type,
                record.technician,
                record.priority.as_str(),
                record.cost,
                record.notes,
                record.notification_sent,
                fmt_ts(record.created_at),
                fmt_ts(record.updated_at),
                record.revision,
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn get_record(&self, id: &str) -> Result<Option<MaintenanceRecord>> {
        let raw = {
            let conn = self.lock()?;
            conn.query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM maintenance_records WHERE id = ?1"),
                params![id],
                RawRecord::from_row,
            )
            .optional()
            .map_err(store_err)?
        };
        match raw.map(RawRecord::decode) {
            None => Ok(None),
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(skipped)) => Err(UpkeepError::Validation(format!(
                "stored record {} is malformed: {}",
                skipped.id, skipped.reason
            ))),
        }
    }

    fn update_record(&self, record: &MaintenanceRecord, reset_guard: bool) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE maintenance_records SET
                    asset_id = ?2, asset_name = ?3, scheduled_date = ?4, started_date = ?5,
                    completed_date = ?6, manual_status = ?7, frequency = ?8,
                    next_maintenance_date = ?9, service_type = ?10, technician = ?11,
                    priority = ?12, cost = ?13, notes = ?14, updated_at = ?15,
                    notification_sent = CASE WHEN ?16 THEN 0 ELSE notification_sent END,
                    cached_status = NULL, cached_overdue = NULL, cached_on = NULL,
                    revision = revision + 1
                 WHERE id = ?1 AND revision = ?17",
                params![
                    record.id,
                    record.asset_id,
                    record.asset_name,
                    fmt_ts(record.scheduled_date),
                    record.started_date.map(fmt_ts),
                    record.completed_date.map(fmt_ts),
                    record.manual_status.as_str(),
                    record.frequency.as_str(),
                    record.next_maintenance_date.map(fmt_day),
                    record.service_type,
                    record.technician,
                    record.priority.as_str(),
                    record.cost,
                    record.notes,
                    fmt_ts(record.updated_at),
                    reset_guard,
                    record.revision,
                ],
            )
            .map_err(store_err)?;
        if changed == 0 {
            let stored: Option<i64> = conn
                .query_row(
                    "SELECT revision FROM maintenance_records WHERE id = ?1",
                    params![record.id],
                    |r| r.get(0),
                )
                .optional()
                .map_err(store_err)?;
            return Err(match stored {
                None => UpkeepError::NotFound(format!("record {}", record.id)),
                Some(current) => UpkeepError::Conflict(format!(
                    "record {} was modified (revision {current}, edit based on {})",
                    record.id, record.revision
                )),
            });
        }
        Ok(())
    }

    fn delete_record(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute("DELETE FROM maintenance_records WHERE id = ?1", params![id])
            .map_err(store_err)?;
        Ok(n > 0)
    }

    fn open_records_before(&self, until: DateTime<Utc>) -> Result<Vec<Candidate>> {
        // Rows whose date text is not a timestamp are pulled in too, so the
        // caller can report them instead of silently missing them.
        self.query_records(
            "WHERE manual_status NOT IN ('completed', 'cancelled')
               AND (?1 IS NULL OR scheduled_date < ?1
                    OR scheduled_date NOT GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]T*')",
            vec![upper_bound(until)],
        )
    }

    fn records_in_range(&self, range: &DateRange) -> Result<Vec<Candidate>> {
        self.query_records(
            "WHERE (?1 IS NULL OR scheduled_date >= ?1) AND (?2 IS NULL OR scheduled_date < ?2)",
            vec![range.from.map(fmt_ts), range.until.and_then(upper_bound)],
        )
    }

    fn records_with_status(&self, status: ManualStatus) -> Result<Vec<Candidate>> {
        self.query_records("WHERE manual_status = ?1", vec![Some(status.as_str().to_string())])
    }

    fn records_for_asset(&self, asset_id: &str) -> Result<Vec<Candidate>> {
        self.query_records("WHERE asset_id = ?1", vec![Some(asset_id.to_string())])
    }

    fn cache_classification(
        &self,
        record: &MaintenanceRecord,
        status: EffectiveStatus,
        is_overdue: bool,
        computed_on: NaiveDate,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE maintenance_records
                 SET cached_status = ?2, cached_overdue = ?3, cached_on = ?4
                 WHERE id = ?1 AND manual_status = ?5 AND scheduled_date = ?6",
                params![
                    record.id,
                    status.as_str(),
                    is_overdue,
                    fmt_day(computed_on),
                    record.manual_status.as_str(),
                    fmt_ts(record.scheduled_date),
                ],
            )
            .map_err(store_err)?;
        Ok(n > 0)
    }
}

impl DedupGuard for MaintenanceDb {
    fn claim_and_notify(&self, record: &MaintenanceRecord, notification: &NewNotification) -> Result<ClaimOutcome> {
        let record_id = record.id.as_str();
        let seen_status = record.manual_status.as_str();
        let seen_date = fmt_ts(record.scheduled_date);
        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock up front, so two handles on the same
        // file serialize here instead of both reading an unset guard.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(store_err)?;

        let claimed = tx
            .execute(
                "UPDATE maintenance_records SET notification_sent = 1
                 WHERE id = ?1 AND notification_sent = 0
                   AND manual_status IN ('scheduled', 'in_progress')
                   AND manual_status = ?2 AND scheduled_date = ?3",
                params![record_id, seen_status, seen_date],
            )
            .map_err(store_err)?;

        if claimed == 0 {
            let state: Option<(i64, String, String)> = tx
                .query_row(
                    "SELECT notification_sent, manual_status, scheduled_date
                     FROM maintenance_records WHERE id = ?1",
                    params![record_id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .optional()
                .map_err(store_err)?;
            return match state {
                None => Err(UpkeepError::NotFound(format!("record {record_id}"))),
                Some((_, status, _)) if status == "completed" || status == "cancelled" => {
                    Ok(ClaimOutcome::Resolved)
                }
                // Rescheduled or restarted since it was scanned: the condition
                // that was seen no longer exists.
                Some((_, status, date)) if status != seen_status || date != seen_date => {
                    Ok(ClaimOutcome::Resolved)
                }
                Some((sent, _, _)) if sent != 0 => Ok(ClaimOutcome::AlreadySent),
                Some((_, status, _)) => Err(UpkeepError::Validation(format!(
                    "record {record_id} has unknown status '{status}'"
                ))),
            };
        }

        // Dropping `tx` on error rolls the guard back for this record only.
        let created = insert_notification_on(&tx, notification)?;
        tx.commit().map_err(store_err)?;
        Ok(ClaimOutcome::Created(created))
    }
}

impl NotificationStore for MaintenanceDb {
    fn insert_notification(&self, notification: &NewNotification) -> Result<Notification> {
        let conn = self.lock()?;
        insert_notification_on(&conn, notification)
    }

    fn get_notification(&self, id: i64) -> Result<Option<Notification>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
                params![id],
                RawNotification::from_row,
            )
            .optional()
            .map_err(store_err)?;
        raw.map(RawNotification::decode).transpose()
    }

    fn list_notifications(
        &self,
        recipients: &[Recipient],
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let mut clauses = Vec::new();
        if !recipients.is_empty() {
            clauses.push(recipient_clause(recipients.len()));
        }
        if unread_only {
            clauses.push("is_read = 0".to_string());
        }
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications {} ORDER BY created_at DESC, id DESC LIMIT {limit}",
            where_clause(&clauses)
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params_from_iter(recipient_args(recipients)), RawNotification::from_row)
            .map_err(store_err)?;
        rows.map(|r| r.map_err(store_err).and_then(RawNotification::decode))
            .collect()
    }

    fn unread_count(&self, recipients: &[Recipient]) -> Result<u64> {
        let mut clauses = vec!["is_read = 0".to_string()];
        if !recipients.is_empty() {
            clauses.push(recipient_clause(recipients.len()));
        }
        let sql = format!("SELECT COUNT(*) FROM notifications {}", where_clause(&clauses));
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row(&sql, params_from_iter(recipient_args(recipients)), |r| r.get(0))
            .map_err(store_err)?;
        Ok(n.max(0) as u64)
    }

    fn mark_read(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?2) WHERE id = ?1",
                params![id, fmt_ts(Utc::now())],
            )
            .map_err(store_err)?;
        Ok(n > 0)
    }

    fn mark_all_read(&self, recipients: &[Recipient]) -> Result<u64> {
        let mut clauses = vec!["is_read = 0".to_string()];
        if !recipients.is_empty() {
            // Placeholders start at ?2; ?1 is the read timestamp.
            let marks: Vec<String> = (0..recipients.len()).map(|i| format!("?{}", i + 2)).collect();
            clauses.push(format!("recipient IN ({})", marks.join(", ")));
        }
        let sql = format!("UPDATE notifications SET is_read = 1, read_at = ?1 {}", where_clause(&clauses));
        let mut args = vec![fmt_ts(Utc::now())];
        args.extend(recipient_args(recipients));

        let conn = self.lock()?;
        let n = conn.execute(&sql, params_from_iter(args)).map_err(store_err)?;
        Ok(n as u64)
    }

    fn delete_notification(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute("DELETE FROM notifications WHERE id = ?1", params![id])
            .map_err(store_err)?;
        Ok(n > 0)
    }
}

fn insert_notification_on(conn: &Connection, n: &NewNotification) -> Result<Notification> {
    let created_at = Utc::now().trunc_subsecs(0);
    conn.execute(
        "INSERT INTO notifications
            (recipient, kind, title, message, record_id, asset_id, priority, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
        params![
            n.recipient.to_string(),
            n.kind.as_str(),
            n.title,
            n.message,
            n.record_id,
            n.asset_id,
            n.priority.as_str(),
            fmt_ts(created_at),
        ],
    )
    .map_err(store_err)?;
    Ok(Notification {
        id: conn.last_insert_rowid(),
        recipient: n.recipient.clone(),
        kind: n.kind,
        title: n.title.clone(),
        message: n.message.clone(),
        record_id: n.record_id.clone(),
        asset_id: n.asset_id.clone(),
        priority: n.priority,
        read: false,
        read_at: None,
        created_at,
    })
}

fn recipient_clause(count: usize) -> String {
    format!("recipient IN ({})", vec!["?"; count].join(", "))
}

fn recipient_args(recipients: &[Recipient]) -> Vec<String> {
    recipients.iter().map(Recipient::to_string).collect()
}

fn where_clause(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

fn store_err(e: rusqlite::Error) -> UpkeepError {
    match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => UpkeepError::Validation(format!("constraint: {e}")),
        _ => UpkeepError::StoreUnavailable(format!("sqlite: {e}")),
    }
}

fn fmt_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Exclusive upper bound as stored text. Instants past year 9999 do not
/// render as sortable RFC 3339, so they mean "no bound".
fn upper_bound(t: DateTime<Utc>) -> Option<String> {
    (t.year() <= 9999).then(|| fmt_ts(t))
}

fn fmt_day(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

// ─── Row decoding ─────────────────────────────────────────────

/// Column text as stored, before any parsing.
fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(b) | ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    })
}

struct RawRecord {
    cols: Vec<Option<String>>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let cols = (0..18).map(|i| text(row, i)).collect::<rusqlite::Result<_>>()?;
        Ok(Self { cols })
    }

    fn decode(self) -> Candidate {
        let id = self.cols[0].clone().unwrap_or_default();
        self.fields(&id).map_err(|reason| SkippedRecord { id, reason })
    }

    fn col(&self, idx: usize) -> Option<&str> {
        self.cols[idx].as_deref()
    }

    fn required(&self, idx: usize, name: &str) -> std::result::Result<&str, String> {
        self.col(idx).ok_or_else(|| format!("{name} is missing"))
    }

    fn fields(&self, id: &str) -> std::result::Result<MaintenanceRecord, String> {
        if id.is_empty() {
            return Err("id is missing".into());
        }
        let cost = match self.col(12) {
            None => None,
            Some(s) => Some(s.parse::<f64>().map_err(|_| format!("cost '{s}' is not a number"))?),
        };
        Ok(MaintenanceRecord {
            id: id.to_string(),
            asset_id: self.required(1, "asset_id")?.to_string(),
            asset_name: self.required(2, "asset_name")?.to_string(),
            scheduled_date: parse_ts(self.required(3, "scheduled_date")?, "scheduled_date")?,
            started_date: self.col(4).map(|s| parse_ts(s, "started_date")).transpose()?,
            completed_date: self.col(5).map(|s| parse_ts(s, "completed_date")).transpose()?,
            manual_status: self
                .required(6, "manual_status")?
                .parse()
                .map_err(|e: UpkeepError| e.to_string())?,
            frequency: self
                .col(7)
                .unwrap_or_default()
                .parse()
                .map_err(|e: UpkeepError| e.to_string())?,
            next_maintenance_date: self.col(8).map(|s| parse_day(s, "next_maintenance_date")).transpose()?,
            service_type: self.required(9, "service_type")?.to_string(),
            technician: self.cols[10].clone(),
            priority: self
                .col(11)
                .unwrap_or("medium")
                .parse()
                .map_err(|e: UpkeepError| e.to_string())?,
            cost,
            notes: self.cols[13].clone(),
            notification_sent: self.col(14).is_some_and(|v| v != "0"),
            created_at: parse_ts(self.required(15, "created_at")?, "created_at")?,
            updated_at: parse_ts(self.required(16, "updated_at")?, "updated_at")?,
            revision: match self.col(17) {
                None => 0,
                Some(s) => s.parse().map_err(|_| format!("revision '{s}' is not an integer"))?,
            },
        })
    }
}

fn parse_ts(s: &str, name: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| format!("{name} '{s}' is malformed: {e}"))
}

fn parse_day(s: &str, name: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("{name} '{s}' is malformed: {e}"))
}

struct RawNotification {
    id: i64,
    cols: Vec<Option<String>>,
}

impl RawNotification {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            cols: (1..11).map(|i| text(row, i)).collect::<rusqlite::Result<_>>()?,
        })
    }

    fn decode(self) -> Result<Notification> {
        let id = self.id;
        let bad = |reason: String| UpkeepError::Validation(format!("stored notification {id} is malformed: {reason}"));
        let col = |i: usize| self.cols[i - 1].as_deref();
        let required = |i: usize, name: &str| col(i).ok_or_else(|| bad(format!("{name} is missing")));

        Ok(Notification {
            id,
            recipient: required(1, "recipient")?.parse()?,
            kind: required(2, "kind")?.parse()?,
            title: required(3, "title")?.to_string(),
            message: required(4, "message")?.to_string(),
            record_id: col(5).map(str::to_string),
            asset_id: col(6).map(str::to_string),
            priority: required(7, "priority")?.parse()?,
            read: col(8).is_some_and(|v| v != "0"),
            read_at: col(9).map(|s| parse_ts(s, "read_at")).transpose().map_err(bad)?,
            created_at: parse_ts(required(10, "created_at")?, "created_at").map_err(bad)?,
        })
    }
}
