//! DELTA Resilience service.
//!
//! A multi-tenant REST API for recording disaster impact data: hazardous and
//! disaster events, disaster records with their damages, losses, disruptions
//! and human effects, and the reference data (sectors, assets, organizations,
//! divisions) they point to. Records of the three event-like types move
//! through an approval workflow with email notifications.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (runtime queries, embedded migrations)
//! - **Authentication**: API key bound to a country account, SHA-256 hashed
//! - **Format**: JSON requests/responses, CSV for bulk import and export

pub mod config;
pub mod db;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod i18n;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod services;
pub mod state;
pub mod store;
pub mod tree;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Build the HTTP router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    // Authenticated routes (API endpoints)
    let authenticated_routes = Router::new()
        .merge(handlers::csv::all_routes(max_upload_bytes))
        .merge(handlers::trees::routes())
        .merge(handlers::resources::all_routes())
        .merge(handlers::approval::routes())
        .merge(handlers::access::routes())
        .route(
            "/api/v1/settings",
            get(handlers::settings::get_settings).put(handlers::settings::update_settings),
        )
        .route("/api/v1/api-keys", post(handlers::api_keys::create_api_key))
        .route("/api/v1/api-keys", get(handlers::api_keys::list_api_keys))
        .route(
            "/api/v1/api-keys/{id}",
            delete(handlers::api_keys::delete_api_key),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.pool.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api/v1/translations/{lang}",
            get(handlers::translations::get_translations),
        )
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
