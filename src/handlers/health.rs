//! Liveness check used by load balancers and deployment scripts.
//!
//! - GET /health - Public; pings the database

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{db::DbPool, error::AppError};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub version: &'static str,
    pub checked_at: DateTime<Utc>,
}

impl HealthResponse {
    fn ok() -> Self {
        Self {
            status: "healthy",
            database: "connected",
            version: env!("CARGO_PKG_VERSION"),
            checked_at: Utc::now(),
        }
    }
}

/// `200` with [`HealthResponse`] once `SELECT 1` succeeds. An unreachable
/// database surfaces as the usual `500` error envelope, so monitors only
/// need to look at the status code.
pub async fn health_check(State(pool): State<DbPool>) -> Result<Json<HealthResponse>, AppError> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&pool).await?;
    Ok(Json(HealthResponse::ok()))
}
