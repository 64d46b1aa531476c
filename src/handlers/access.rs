//! Access management for the caller's country account.
//!
//! - GET /api/v1/access/members - Members and their roles
//! - POST /api/v1/access/members - Add a user with a role
//! - PUT /api/v1/access/members/{user_id} - Change a member's role
//! - DELETE /api/v1/access/members/{user_id} - Remove a member

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::{auth::AuthContext, lang::Lang},
    models::{
        role::Permission,
        user::{InviteUserRequest, MemberDetails, UpdateMemberRequest},
    },
    services::{access_service, notification_service},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/access/members", get(list_members).post(invite_member))
        .route(
            "/api/v1/access/members/{user_id}",
            put(update_member).delete(remove_member),
        )
}

/// Members are listed to anyone who can view data, since submitters pick
/// validators from this list.
pub async fn list_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<MemberDetails>>, AppError> {
    auth.require(Permission::ViewData)?;
    let mut conn = state.pool.acquire().await?;
    let members = access_service::list_members(&mut conn, auth.country_accounts_id).await?;
    Ok(Json(members))
}

/// Add a user to the tenant.
///
/// # Request Body
///
/// ```json
/// {
///   "email": "ana@example.org",
///   "first_name": "Ana",
///   "last_name": "Silva",
///   "organization": "Civil Protection",
///   "role": "data-validator"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the new member
/// - **422**: missing fields, a role above the caller's, or an existing member
///
/// The invitation email goes out after commit; a failed send is logged.
pub async fn invite_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    lang: Lang,
    Json(request): Json<InviteUserRequest>,
) -> Result<(StatusCode, Json<MemberDetails>), AppError> {
    auth.require(Permission::InviteUsers)?;
    let t = state.translator(&lang.lang, lang.debug);

    let mut tx = state.pool.begin().await?;
    let invited = access_service::invite(&mut tx, &auth, request, &t).await?;
    tx.commit().await?;

    let member = invited.member;
    let mut conn = state.pool.acquire().await?;
    match access_service::invite_details(
        &mut conn,
        auth.country_accounts_id,
        &member.role,
        state.config.public_base_url(),
    )
    .await
    {
        Ok(details) => {
            let email = notification_service::render_invite(&t, &member.email, &details);
            notification_service::send_all(state.mailer.as_ref(), vec![email]).await;
        }
        Err(e) => tracing::error!(user_id = %member.id, error = %e, "failed to prepare invitation email"),
    }

    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn update_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    lang: Lang,
    Json(request): Json<UpdateMemberRequest>,
) -> Result<Json<MemberDetails>, AppError> {
    auth.require(Permission::EditUsers)?;
    let t = state.translator(&lang.lang, lang.debug);

    let mut tx = state.pool.begin().await?;
    let member = access_service::change_role(&mut tx, &auth, user_id, &request.role, &t).await?;
    tx.commit().await?;
    Ok(Json(member))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    lang: Lang,
) -> Result<StatusCode, AppError> {
    auth.require(Permission::EditUsers)?;
    let t = state.translator(&lang.lang, lang.debug);

    let mut tx = state.pool.begin().await?;
    access_service::remove(&mut tx, &auth, user_id, &t).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}
