//! Approval workflow endpoints.
//!
//! - POST /api/v1/<entity>/{id}/approval - Apply a workflow action
//! - GET /api/v1/<entity>/{id}/rejections - Rejection history
//! - GET /api/v1/validation-assignments - Records waiting on the caller

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::{auth::AuthContext, lang::Lang},
    models::{
        approval::{ApprovalEntity, ApprovalRequest, ApprovalRow, ValidationAssignment, ValidationRejection},
        role::Permission,
    },
    services::approval_service,
    state::AppState,
};

const ENTITIES: [(&str, ApprovalEntity); 3] = [
    ("hazardous-events", ApprovalEntity::HazardousEvent),
    ("disaster-events", ApprovalEntity::DisasterEvent),
    ("disaster-records", ApprovalEntity::DisasterRecord),
];

pub fn routes() -> Router<AppState> {
    let entity_routes = ENTITIES.iter().fold(Router::new(), |router, (segment, entity)| {
        router.merge(
            Router::new()
                .route(
                    &format!("/api/v1/{segment}/{{id}}/approval"),
                    post(apply_action),
                )
                .route(
                    &format!("/api/v1/{segment}/{{id}}/rejections"),
                    get(list_rejections),
                )
                .layer(Extension(*entity)),
        )
    });

    entity_routes.route("/api/v1/validation-assignments", get(my_assignments))
}

/// Apply a workflow action.
///
/// # Request Body
///
/// ```json
/// {
///   "action": "submit-validation",
///   "validator_user_ids": ["..."],  // or "id1,id2"
///   "comment": "..."                 // required for reject
/// }
/// ```
///
/// # Response
///
/// - **200 OK**: the record's approval columns after the transition
/// - **403**: role too low for the action
/// - **409**: action not allowed from the current status
/// - **422**: validators or comment missing or invalid
pub async fn apply_action(
    State(state): State<AppState>,
    Extension(entity): Extension<ApprovalEntity>,
    Extension(auth): Extension<AuthContext>,
    lang: Lang,
    Path(id): Path<Uuid>,
    Json(request): Json<ApprovalRequest>,
) -> Result<Json<ApprovalRow>, AppError> {
    let t = state.translator(&lang.lang, lang.debug);
    let row = approval_service::apply_action(&state, &auth, entity, id, request, &t).await?;
    Ok(Json(row))
}

pub async fn list_rejections(
    State(state): State<AppState>,
    Extension(entity): Extension<ApprovalEntity>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ValidationRejection>>, AppError> {
    auth.require(Permission::ViewData)?;
    let mut conn = state.pool.acquire().await?;
    let rows = approval_service::rejections(&mut conn, auth.country_accounts_id, entity, id).await?;
    Ok(Json(rows))
}

pub async fn my_assignments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ValidationAssignment>>, AppError> {
    auth.require(Permission::ViewData)?;
    let mut conn = state.pool.acquire().await?;
    let rows = approval_service::assignments_for(&mut conn, auth.country_accounts_id, auth.user_id).await?;
    Ok(Json(rows))
}
