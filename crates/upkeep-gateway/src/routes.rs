//! API route handlers for the gateway.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{Datelike, Utc};
use serde::Deserialize;
use std::sync::Arc;

use upkeep_core::UpkeepError;
use upkeep_scheduler::{
    AssetRegistry, EffectiveStatus, NewRecord, NotificationStore, Recipient, RecordPatch, StatsFilter,
};

use super::server::AppState;

/// Status code plus `{"ok": ..}` envelope.
pub type ApiResponse = (StatusCode, Json<serde_json::Value>);

fn ok(body: serde_json::Value) -> ApiResponse {
    let mut body = body;
    if let Some(map) = body.as_object_mut() {
        map.insert("ok".into(), serde_json::Value::Bool(true));
    }
    (StatusCode::OK, Json(body))
}

fn fail(e: &UpkeepError) -> ApiResponse {
    let status = match e {
        UpkeepError::NotFound(_) => StatusCode::NOT_FOUND,
        UpkeepError::Conflict(_) => StatusCode::CONFLICT,
        UpkeepError::Validation(_) | UpkeepError::InvalidFrequency(_) => StatusCode::BAD_REQUEST,
        UpkeepError::StoreUnavailable(_) | UpkeepError::Io(_) => StatusCode::SERVICE_UNAVAILABLE,
        UpkeepError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::warn!("⚠️ Request failed: {e}");
    }
    (status, Json(serde_json::json!({"ok": false, "error": e.to_string()})))
}

fn respond<T>(result: upkeep_core::Result<T>, f: impl FnOnce(T) -> serde_json::Value) -> ApiResponse {
    match result {
        Ok(v) => ok(f(v)),
        Err(e) => fail(&e),
    }
}

fn recipients(raw: Option<&str>) -> upkeep_core::Result<Vec<Recipient>> {
    raw.map(Recipient::parse_list).transpose().map(Option::unwrap_or_default)
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "upkeep-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Runtime information.
pub async fn system_info(State(state): State<Arc<AppState>>) -> ApiResponse {
    ok(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "sweep_running": state.engine.is_running(),
        "scheduler": {
            "due_soon_days": state.config.scheduler.due_soon_days,
            "check_interval_secs": state.config.scheduler.check_interval_secs,
            "utc_offset_minutes": state.config.scheduler.utc_offset_minutes,
            "notify_recipient": state.config.scheduler.notify_recipient,
        },
    }))
}

// ---- Notifications ----

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    /// Comma-separated, e.g. `user:alice,role:maintenance`. Empty means all.
    pub recipients: Option<String>,
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<usize>,
}

/// List notifications, newest first.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(q): Query<NotificationQuery>,
) -> ApiResponse {
    let limit = q.limit.unwrap_or(50).clamp(1, 500);
    let result = recipients(q.recipients.as_deref())
        .and_then(|r| state.db.list_notifications(&r, q.unread_only, limit));
    respond(result, |list| serde_json::json!({"count": list.len(), "notifications": list}))
}

pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    Query(q): Query<NotificationQuery>,
) -> ApiResponse {
    let result = recipients(q.recipients.as_deref()).and_then(|r| state.db.unread_count(&r));
    respond(result, |count| serde_json::json!({"unread": count}))
}

pub async fn get_notification(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResponse {
    let result = state
        .db
        .get_notification(id)
        .and_then(|n| n.ok_or_else(|| UpkeepError::NotFound(format!("notification {id}"))));
    respond(result, |n| serde_json::json!({"notification": n}))
}

pub async fn mark_notification_read(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResponse {
    let result = state.db.mark_read(id).and_then(|found| {
        if found {
            Ok(())
        } else {
            Err(UpkeepError::NotFound(format!("notification {id}")))
        }
    });
    respond(result, |_| serde_json::json!({"id": id}))
}

pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Query(q): Query<NotificationQuery>,
) -> ApiResponse {
    let result = recipients(q.recipients.as_deref()).and_then(|r| state.db.mark_all_read(&r));
    respond(result, |n| serde_json::json!({"marked": n}))
}

pub async fn delete_notification(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResponse {
    let result = state.db.delete_notification(id).and_then(|found| {
        if found {
            Ok(())
        } else {
            Err(UpkeepError::NotFound(format!("notification {id}")))
        }
    });
    respond(result, |_| serde_json::json!({"id": id}))
}

// ---- Assets ----

#[derive(Debug, Deserialize)]
pub struct AssetBody {
    pub id: String,
    pub name: String,
}

/// Register or rename an asset.
pub async fn upsert_asset(State(state): State<Arc<AppState>>, Json(body): Json<AssetBody>) -> ApiResponse {
    let result = state
        .db
        .upsert_asset(body.id.trim(), body.name.trim())
        .and_then(|_| state.db.asset_name(body.id.trim()));
    respond(result, |name| serde_json::json!({"id": body.id.trim(), "name": name}))
}

// ---- Maintenance records ----

#[derive(Debug, Default, Deserialize)]
pub struct RecordQuery {
    pub status: Option<String>,
    pub asset_id: Option<String>,
}

/// List records, optionally by effective status and/or asset.
pub async fn list_records(State(state): State<Arc<AppState>>, Query(q): Query<RecordQuery>) -> ApiResponse {
    let now = Utc::now();
    let status = match q.status.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(s) => match s.parse::<EffectiveStatus>() {
            Ok(status) => Some(status),
            Err(e) => return fail(&e),
        },
        None => None,
    };
    let asset_id = q.asset_id.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let result = match (asset_id, status) {
        (Some(asset), status) => state.aggregator.list_by_asset(asset, now).map(|views| {
            views
                .into_iter()
                .filter(|v| status.is_none_or(|s| v.derived.effective_status == s))
                .collect::<Vec<_>>()
        }),
        (None, Some(status)) => state.aggregator.list_by_status(status, now),
        (None, None) => state.aggregator.list_all(now),
    };
    respond(result, |records| serde_json::json!({"count": records.len(), "records": records}))
}

pub async fn create_record(State(state): State<Arc<AppState>>, Json(body): Json<NewRecord>) -> ApiResponse {
    respond(state.lifecycle.create(&body, Utc::now()), |view| {
        serde_json::json!({"record": view})
    })
}

pub async fn get_record(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResponse {
    respond(state.lifecycle.get(&id, Utc::now()), |view| serde_json::json!({"record": view}))
}

pub async fn update_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<RecordPatch>,
) -> ApiResponse {
    respond(state.lifecycle.update_details(&id, &patch, Utc::now()), |view| {
        serde_json::json!({"record": view})
    })
}

pub async fn delete_record(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResponse {
    respond(state.lifecycle.delete(&id), |_| serde_json::json!({"id": id}))
}

pub async fn start_record(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResponse {
    respond(state.lifecycle.start(&id, Utc::now()), |view| serde_json::json!({"record": view}))
}

pub async fn complete_record(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResponse {
    respond(state.lifecycle.complete(&id, Utc::now()), |done| {
        serde_json::json!({"record": done.record, "follow_up": done.follow_up})
    })
}

pub async fn cancel_record(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResponse {
    respond(state.lifecycle.cancel(&id, Utc::now()), |view| serde_json::json!({"record": view}))
}

#[derive(Debug, Deserialize)]
pub struct RescheduleBody {
    pub scheduled_date: String,
}

pub async fn reschedule_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RescheduleBody>,
) -> ApiResponse {
    respond(
        state.lifecycle.reschedule(&id, &body.scheduled_date, Utc::now()),
        |view| serde_json::json!({"record": view}),
    )
}

// ---- Views ----

#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

/// Records bucketed by day for one month. Defaults to the current month.
pub async fn calendar(State(state): State<Arc<AppState>>, Query(q): Query<CalendarQuery>) -> ApiResponse {
    let now = Utc::now();
    let today = state.engine.scanner().classifier().calendar_day(now);
    let year = q.year.unwrap_or(today.year());
    let month = q.month.unwrap_or(today.month());
    respond(state.aggregator.calendar(year, month, now), |days| {
        serde_json::json!({"year": year, "month": month, "days": days})
    })
}

pub async fn dashboard(State(state): State<Arc<AppState>>) -> ApiResponse {
    respond(state.aggregator.dashboard(Utc::now()), |d| serde_json::json!({"dashboard": d}))
}

pub async fn statistics(State(state): State<Arc<AppState>>, Query(filter): Query<StatsFilter>) -> ApiResponse {
    respond(state.aggregator.statistics(&filter), |s| serde_json::json!({"stats": s}))
}

/// Run one sweep now. Safe alongside the periodic sweeper.
pub async fn due_check(State(state): State<Arc<AppState>>) -> ApiResponse {
    respond(state.engine.run_due_check(Utc::now()), |report| serde_json::json!({"report": report}))
}
