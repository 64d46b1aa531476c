//! Per-tenant instance settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InstanceSettings {
    pub country_accounts_id: Uuid,
    pub currency_code: String,
    pub default_language: String,
    pub website_name: String,
    pub approved_records_are_public: bool,
    pub updated_at: DateTime<Utc>,
}

impl InstanceSettings {
    /// Values reported before a tenant has saved any settings.
    pub fn defaults(country_accounts_id: Uuid, default_language: &str) -> Self {
        Self {
            country_accounts_id,
            currency_code: "USD".to_string(),
            default_language: default_language.to_string(),
            website_name: "DELTA Resilience".to_string(),
            approved_records_are_public: false,
            updated_at: Utc::now(),
        }
    }
}

/// Body of `PUT /api/v1/settings`; omitted fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    pub currency_code: Option<String>,
    pub default_language: Option<String>,
    pub website_name: Option<String>,
    pub approved_records_are_public: Option<bool>,
}
