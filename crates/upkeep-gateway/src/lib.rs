//! # Upkeep Gateway
//!
//! Axum HTTP surface over the maintenance engine: record lifecycle, calendar,
//! dashboard and statistics views, on-demand due checks, and the notification
//! polling API.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
