//! Instance settings of the caller's country account.
//!
//! - GET /api/v1/settings
//! - PUT /api/v1/settings

use axum::{Extension, Json, extract::State};

use crate::{
    error::{AppError, FieldErrors},
    middleware::auth::AuthContext,
    models::{
        role::Permission,
        settings::{InstanceSettings, UpdateSettingsRequest},
    },
    state::AppState,
};

const SELECT_SETTINGS: &str = r#"
    SELECT country_accounts_id, currency_code, default_language, website_name,
           approved_records_are_public, updated_at
    FROM instance_settings
    WHERE country_accounts_id = $1
"#;

/// Settings of the tenant, or defaults when none were saved yet.
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<InstanceSettings>, AppError> {
    auth.require(Permission::ViewData)?;
    let settings = sqlx::query_as::<_, InstanceSettings>(SELECT_SETTINGS)
        .bind(auth.country_accounts_id)
        .fetch_optional(&state.pool)
        .await?
        .unwrap_or_else(|| InstanceSettings::defaults(auth.country_accounts_id, &state.config.default_lang));
    Ok(Json(settings))
}

fn validate(request: &UpdateSettingsRequest) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();
    if let Some(code) = &request.currency_code {
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            errors.add_field("currency_code", "Currency code must be three uppercase letters");
        }
    }
    if let Some(lang) = &request.default_language {
        if lang.trim().is_empty() {
            errors.add_field("default_language", "Field is required");
        }
    }
    if let Some(name) = &request.website_name {
        if name.trim().is_empty() {
            errors.add_field("website_name", "Field is required");
        }
    }
    errors.into_result()
}

/// Save settings; omitted fields keep their current value.
///
/// # Authorization
///
/// Requires `ManageCountrySettings` (admin).
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<InstanceSettings>, AppError> {
    auth.require(Permission::ManageCountrySettings)?;
    validate(&request)?;

    let defaults = InstanceSettings::defaults(auth.country_accounts_id, &state.config.default_lang);
    let settings = sqlx::query_as::<_, InstanceSettings>(
        r#"
        INSERT INTO instance_settings
            (country_accounts_id, currency_code, default_language, website_name, approved_records_are_public)
        VALUES ($1, COALESCE($2, $6), COALESCE($3, $7), COALESCE($4, $8), COALESCE($5, $9))
        ON CONFLICT (country_accounts_id) DO UPDATE SET
            currency_code = COALESCE($2, instance_settings.currency_code),
            default_language = COALESCE($3, instance_settings.default_language),
            website_name = COALESCE($4, instance_settings.website_name),
            approved_records_are_public = COALESCE($5, instance_settings.approved_records_are_public),
            updated_at = NOW()
        RETURNING country_accounts_id, currency_code, default_language, website_name,
                  approved_records_are_public, updated_at
        "#,
    )
    .bind(auth.country_accounts_id)
    .bind(&request.currency_code)
    .bind(&request.default_language)
    .bind(&request.website_name)
    .bind(request.approved_records_are_public)
    .bind(&defaults.currency_code)
    .bind(&defaults.default_language)
    .bind(&defaults.website_name)
    .bind(defaults.approved_records_are_public)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(country_accounts_id = %auth.country_accounts_id, user_id = %auth.user_id, "settings updated");
    Ok(Json(settings))
}
