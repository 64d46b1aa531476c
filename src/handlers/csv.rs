//! CSV endpoints shared by every resource.
//!
//! - GET /api/v1/<resource>/csv-export - All tenant rows as CSV
//! - POST /api/v1/<resource>/csv-import - Multipart upload (`file`, `import_type`)
//! - GET /api/v1/<resource>/csv-import-example?import_type= - Header and sample row

use std::collections::HashMap;

use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;

use crate::{
    error::AppError,
    forms::{self, ResourceDef},
    middleware::{auth::AuthContext, lang::Lang},
    models::role::Permission,
    services::csv_service::{self, ImportType},
    state::AppState,
    store,
};

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub imported: usize,
}

pub fn routes(def: &'static ResourceDef, max_upload_bytes: usize) -> Router<AppState> {
    let base = format!("/api/v1/{}", def.name);
    Router::new()
        .route(&format!("{base}/csv-export"), get(export))
        .route(
            &format!("{base}/csv-import"),
            post(import).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(&format!("{base}/csv-import-example"), get(example))
        .layer(Extension(def))
}

pub fn all_routes(max_upload_bytes: usize) -> Router<AppState> {
    forms::resources::ALL
        .iter()
        .fold(Router::new(), |router, def| router.merge(routes(def, max_upload_bytes)))
}

fn csv_response(filename: String, body: String) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
}

pub async fn export(
    State(state): State<AppState>,
    Extension(def): Extension<&'static ResourceDef>,
    Extension(auth): Extension<AuthContext>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permission::ViewData)?;
    let mut conn = state.pool.acquire().await?;
    let rows = store::list_all(&mut conn, def, auth.country_accounts_id).await?;
    let body = csv_service::export(def, &rows)?;

    tracing::info!(resource = def.name, rows = rows.len(), "csv export");
    Ok(csv_response(format!("{}.csv", def.name), body))
}

/// Import a CSV file.
///
/// # Request
///
/// `multipart/form-data` with a `file` part and an `import_type` part
/// (`create`, `update` or `upsert`).
///
/// # Response
///
/// - **200 OK**: `{ "imported": 12 }`
/// - **400**: unreadable file or a failing row, with its line number
///
/// Either every row is written or none is.
pub async fn import(
    State(state): State<AppState>,
    Extension(def): Extension<&'static ResourceDef>,
    Extension(auth): Extension<AuthContext>,
    lang: Lang,
    mut multipart: Multipart,
) -> Result<Json<ImportResponse>, AppError> {
    auth.require(def.edit_permission)?;
    let t = state.translator(&lang.lang, lang.debug);

    let mut file = None;
    let mut import_type = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::invalid(format!("Invalid upload: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::invalid(format!("Invalid upload: {e}")))?;
                file = Some(bytes);
            }
            Some("import_type") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::invalid(format!("Invalid upload: {e}")))?;
                import_type = Some(text.parse::<ImportType>().map_err(AppError::InvalidRequest)?);
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| AppError::invalid(t.t("csv.file_missing", "No file uploaded")))?;
    let import_type =
        import_type.ok_or_else(|| AppError::invalid(t.t("csv.import_type_missing", "Import type is required")))?;

    let rows = csv_service::parse_csv(&file)?;
    let rows = csv_service::rows_to_records(def, import_type, rows, &t)?;

    let mut tx = state.pool.begin().await?;
    let imported = csv_service::import(&mut tx, def, &auth, import_type, rows, &t).await?;
    tx.commit().await?;

    Ok(Json(ImportResponse { imported }))
}

pub async fn example(
    Extension(def): Extension<&'static ResourceDef>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permission::ViewData)?;
    let import_type = params
        .get("import_type")
        .and_then(|s| s.parse::<ImportType>().ok())
        .ok_or(AppError::NotFound("Import type"))?;
    let body = csv_service::example(def, import_type)?;
    Ok(csv_response(
        format!("{}-{}-example.csv", def.name, import_type.as_str()),
        body,
    ))
}
