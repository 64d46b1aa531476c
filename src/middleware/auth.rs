//! API key authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the API key from the Authorization header
//! 2. Hash it and resolve the key, its user and its country account
//! 3. Inject the authentication context into the request
//! 4. Reject unauthorized requests with HTTP 401

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        api_key::{AuthRow, hash_api_key},
        role::{Permission, Role},
    },
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Authentication context attached to authenticated requests.
///
/// Every tenant query filters by `country_accounts_id` taken from here.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub api_key_id: Uuid,

    /// User managing the key; recorded as actor on writes
    pub user_id: Uuid,

    /// Tenant the key is bound to
    pub country_accounts_id: Uuid,

    pub role: Role,
}

impl AuthContext {
    /// Fail with 403 unless the caller's role grants `permission`.
    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has(permission) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.user_id,
                role = %self.role,
                permission = permission.as_str(),
                "permission denied"
            );
            Err(AppError::Forbidden(permission.as_str().to_string()))
        }
    }
}

/// Extract the bearer token from an `Authorization` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// API key authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>` header from request
/// 2. Hash the `<key>` using SHA-256
/// 3. Look up an active key whose user is a member of the key's active tenant
/// 4. If found: inject `AuthContext` into request, call next handler
/// 5. If not found: return 401 Unauthorized error
pub async fn auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or(AppError::InvalidApiKey)?;

    let key_hash = hash_api_key(api_key);

    let row = sqlx::query_as::<_, AuthRow>(
        r#"
        SELECT k.id AS api_key_id, k.managed_by_user_id AS user_id,
               k.country_accounts_id, uca.role
        FROM api_keys k
        JOIN user_country_accounts uca
          ON uca.user_id = k.managed_by_user_id
         AND uca.country_accounts_id = k.country_accounts_id
        JOIN country_accounts ca ON ca.id = k.country_accounts_id
        WHERE k.key_hash = $1 AND k.is_active = true AND ca.status = 1
        "#,
    )
    .bind(&key_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::InvalidApiKey)?;

    let role = row.role.parse::<Role>().map_err(|e| {
        tracing::error!(api_key_id = %row.api_key_id, error = %e, "stored role is invalid");
        AppError::InvalidApiKey
    })?;

    request.extensions_mut().insert(AuthContext {
        api_key_id: row.api_key_id,
        user_id: row.user_id,
        country_accounts_id: row.country_accounts_id,
        role,
    });

    Ok(next.run(request).await)
}
