//! API key management.
//!
//! - POST /api/v1/api-keys - Create a key for the caller's tenant
//! - GET /api/v1/api-keys - List the tenant's keys
//! - DELETE /api/v1/api-keys/{id} - Deactivate a key

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    error::{AppError, FieldErrors},
    middleware::auth::AuthContext,
    models::{
        api_key::{ApiKey, ApiKeyResponse, CreateApiKeyRequest, generate_secret, hash_api_key},
        role::Permission,
    },
    state::AppState,
};

/// Create an API key.
///
/// # Request Body
///
/// ```json
/// { "name": "Import script" }
/// ```
///
/// # Response (201 Created)
///
/// The key including its `secret`. The secret is never shown again; only
/// its SHA-256 hash is stored.
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiKeyResponse>), AppError> {
    auth.require(Permission::EditApiKeys)?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(FieldErrors::single("name", "Field is required")));
    }

    let secret = generate_secret();
    let key = sqlx::query_as::<_, ApiKey>(
        r#"
        INSERT INTO api_keys (key_hash, name, managed_by_user_id, country_accounts_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id, key_hash, name, managed_by_user_id, country_accounts_id, is_active, created_at
        "#,
    )
    .bind(hash_api_key(&secret))
    .bind(name)
    .bind(auth.user_id)
    .bind(auth.country_accounts_id)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(api_key_id = %key.id, user_id = %auth.user_id, "api key created");

    let mut response = ApiKeyResponse::from(key);
    response.secret = Some(secret);
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ApiKeyResponse>>, AppError> {
    auth.require(Permission::EditApiKeys)?;
    let keys = sqlx::query_as::<_, ApiKey>(
        r#"
        SELECT id, key_hash, name, managed_by_user_id, country_accounts_id, is_active, created_at
        FROM api_keys
        WHERE country_accounts_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(auth.country_accounts_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(keys.into_iter().map(ApiKeyResponse::from).collect()))
}

/// Deactivate a key of the caller's tenant.
///
/// The row is kept so audit entries made with the key stay attributable.
pub async fn delete_api_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require(Permission::EditApiKeys)?;
    let result = sqlx::query(
        r#"
        UPDATE api_keys SET is_active = false, updated_at = NOW()
        WHERE id = $1 AND country_accounts_id = $2
        "#,
    )
    .bind(id)
    .bind(auth.country_accounts_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("API key"));
    }

    tracing::info!(api_key_id = %id, user_id = %auth.user_id, "api key deactivated");
    Ok(StatusCode::NO_CONTENT)
}
