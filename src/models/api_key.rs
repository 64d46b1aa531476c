//! API Key model for authentication.
//!
//! Keys are bound to one country account and the user managing them. Only
//! the SHA-256 hash is stored; the secret is shown once on creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Unique identifier (UUID)
/// - `key_hash`: SHA-256 hash of the secret
/// - `name`: Label chosen by the admin
/// - `managed_by_user_id`: User whose role the key acts with
/// - `country_accounts_id`: Tenant the key is bound to
/// - `is_active`: Inactive keys are rejected
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,

    /// SHA-256 hash of the actual API key (64 hex characters)
    pub key_hash: String,

    pub name: String,

    pub managed_by_user_id: Uuid,

    pub country_accounts_id: Uuid,

    /// Whether this API key is currently active
    ///
    /// Revoking a key flips this flag; the row is kept.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

/// Columns resolved by the authentication middleware.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthRow {
    pub api_key_id: Uuid,
    pub user_id: Uuid,
    pub country_accounts_id: Uuid,
    pub role: String,
}

/// Request body for creating a key.
#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
}

/// API key as returned to clients. `secret` is only set on creation.
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: Uuid,
    pub name: String,
    pub managed_by_user_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            managed_by_user_id: key.managed_by_user_id,
            is_active: key.is_active,
            created_at: key.created_at,
            secret: None,
        }
    }
}

/// Hex-encoded SHA-256 of a secret.
pub fn hash_api_key(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// New random secret: 32 bytes, hex encoded.
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}
