//! HTTP server implementation using Axum.

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use upkeep_core::UpkeepConfig;
use upkeep_scheduler::{Aggregator, Lifecycle, MaintenanceDb, SweepEngine};

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub config: UpkeepConfig,
    pub start_time: std::time::Instant,
    /// Records, assets and notifications.
    pub db: Arc<MaintenanceDb>,
    /// Scan + dispatch; shared with the periodic sweeper.
    pub engine: Arc<SweepEngine>,
    pub lifecycle: Lifecycle,
    pub aggregator: Aggregator,
}

impl AppState {
    /// Wire every component to one database.
    pub fn new(config: UpkeepConfig, db: Arc<MaintenanceDb>) -> upkeep_core::Result<Self> {
        let engine = Arc::new(SweepEngine::from_config(db.clone(), &config.scheduler)?);
        let lifecycle = Lifecycle::from_config(db.clone(), db.clone(), &config.scheduler)?;
        let aggregator = Aggregator::new(db.clone(), engine.scanner().clone());
        Ok(Self {
            config,
            start_time: std::time::Instant::now(),
            db,
            engine,
            lifecycle,
            aggregator,
        })
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    use super::routes;

    let api = Router::new()
        .route("/api/v1/info", get(routes::system_info))
        // Notifications (polling surface)
        .route("/api/v1/notifications", get(routes::list_notifications))
        .route("/api/v1/notifications/unread-count", get(routes::unread_count))
        .route("/api/v1/notifications/read-all", post(routes::mark_all_read))
        .route(
            "/api/v1/notifications/{id}",
            get(routes::get_notification).delete(routes::delete_notification),
        )
        .route("/api/v1/notifications/{id}/read", post(routes::mark_notification_read))
        // Assets
        .route("/api/v1/assets", post(routes::upsert_asset))
        // Maintenance records
        .route(
            "/api/v1/maintenance",
            get(routes::list_records).post(routes::create_record),
        )
        .route("/api/v1/maintenance/calendar", get(routes::calendar))
        .route("/api/v1/maintenance/dashboard", get(routes::dashboard))
        .route("/api/v1/maintenance/stats", get(routes::statistics))
        .route("/api/v1/maintenance/due-check", post(routes::due_check))
        .route(
            "/api/v1/maintenance/{id}",
            get(routes::get_record)
                .put(routes::update_record)
                .delete(routes::delete_record),
        )
        .route("/api/v1/maintenance/{id}/start", post(routes::start_record))
        .route("/api/v1/maintenance/{id}/complete", post(routes::complete_record))
        .route("/api/v1/maintenance/{id}/cancel", post(routes::cancel_record))
        .route("/api/v1/maintenance/{id}/reschedule", post(routes::reschedule_record));

    let public = Router::new().route("/health", get(routes::health_check));

    api.merge(public)
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .max_age(std::time::Duration::from_secs(3600));

            // Restrict CORS origins in production via env var
            // Example: UPKEEP_CORS_ORIGINS=https://ops.example.com,https://fleet.example.com
            if let Ok(origins_str) = std::env::var("UPKEEP_CORS_ORIGINS") {
                let origins: Vec<_> = origins_str
                    .split(',')
                    .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            } else {
                cors.allow_origin(Any)
            }
        })
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Open the database, start the periodic sweeper and serve HTTP until shutdown.
pub async fn start(config: UpkeepConfig) -> anyhow::Result<()> {
    let db_path = config.database.resolved_path();
    let db = Arc::new(MaintenanceDb::open(&db_path)?);
    tracing::info!("💾 Database ready: {}", db_path.display());

    let state = Arc::new(AppState::new(config, db)?);

    let engine = state.engine.clone();
    let interval = state.config.scheduler.check_interval_secs;
    tokio::spawn(async move {
        upkeep_scheduler::spawn_sweeper(engine, interval).await;
    });

    let addr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port);
    let app = build_router_from_arc(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::path::PathBuf;
    use tower::ServiceExt;

    fn app() -> Router {
        let db = Arc::new(MaintenanceDb::open(&PathBuf::from(":memory:")).unwrap());
        db.upsert_asset("lift-2", "Scissor lift").unwrap();
        build_router(AppState::new(UpkeepConfig::default(), db).unwrap())
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                req = req.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn test_health_route() {
        let (status, json) = call(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["service"], "upkeep-gateway");
    }

    #[tokio::test]
    async fn test_static_routes_win_over_record_id() {
        let app = app();
        let (status, json) = call(&app, "GET", "/api/v1/maintenance/dashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["dashboard"]["overdue"], 0);

        let (status, _) = call(&app, "GET", "/api/v1/maintenance/not-a-record", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_sweep_and_poll_over_http() {
        let app = app();
        let yesterday = (chrono::Utc::now() - chrono::Duration::days(1)).to_rfc3339();
        let (status, json) = call(
            &app,
            "POST",
            "/api/v1/maintenance",
            Some(serde_json::json!({
                "asset_id": "lift-2",
                "scheduled_date": yesterday,
                "frequency": "quarterly",
                "service_type": "Hydraulic check",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["record"]["is_overdue"], true);

        let (_, json) = call(&app, "POST", "/api/v1/maintenance/due-check", None).await;
        assert_eq!(json["report"]["notifications_created"], 1);

        let (_, json) = call(
            &app,
            "GET",
            "/api/v1/notifications/unread-count?recipients=role:maintenance",
            None,
        )
        .await;
        assert_eq!(json["unread"], 1);

        let (status, _) = call(&app, "GET", "/api/v1/maintenance/stats?from=2026-01-01&to=2026-12-31", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
