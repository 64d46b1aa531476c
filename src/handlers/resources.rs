//! Generic CRUD endpoints.
//!
//! Every resource in [`forms::resources::ALL`] gets the same five routes:
//! - GET /api/v1/<resource> - Paginated list (`page`, `page_size`, `q`,
//!   `approval_status` and field filters)
//! - POST /api/v1/<resource> - Create
//! - GET /api/v1/<resource>/{id} - Fetch one
//! - PUT /api/v1/<resource>/{id} - Partial update
//! - DELETE /api/v1/<resource>/{id} - Delete
//!
//! The resource definition travels with the request as an extension, so one
//! set of handlers serves all of them.

use std::collections::HashMap;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::AppError,
    forms::{self, Record, ResourceDef},
    middleware::{auth::AuthContext, lang::Lang},
    models::role::Permission,
    pagination::{Page, PageQuery},
    services::resource_service,
    state::AppState,
    store,
};

/// Routes for one resource.
pub fn routes(def: &'static ResourceDef) -> Router<AppState> {
    let base = format!("/api/v1/{}", def.name);
    Router::new()
        .route(&base, get(list).post(create))
        .route(
            &format!("{base}/{{id}}"),
            get(fetch).put(update).delete(remove),
        )
        .layer(Extension(def))
}

/// Routes for every resource.
pub fn all_routes() -> Router<AppState> {
    forms::resources::ALL
        .iter()
        .fold(Router::new(), |router, def| router.merge(routes(def)))
}

fn body_to_record(body: Value) -> Result<Record, AppError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::invalid("Request body must be a JSON object")),
    }
}

/// List the tenant's records.
///
/// # Response
///
/// ```json
/// { "items": [...], "page": 1, "page_size": 10, "total": 42, "total_pages": 5 }
/// ```
pub async fn list(
    State(state): State<AppState>,
    Extension(def): Extension<&'static ResourceDef>,
    Extension(auth): Extension<AuthContext>,
    lang: Lang,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page<Value>>, AppError> {
    auth.require(Permission::ViewData)?;
    let t = state.translator(&lang.lang, lang.debug);
    let filter = resource_service::filter_from_params(def, &params, &t)?;
    let page = PageQuery::from_params(&params);

    let mut conn = state.pool.acquire().await?;
    let page = store::list(&mut conn, def, auth.country_accounts_id, &filter, page).await?;
    Ok(Json(page))
}

pub async fn fetch(
    State(state): State<AppState>,
    Extension(def): Extension<&'static ResourceDef>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    auth.require(Permission::ViewData)?;
    let mut conn = state.pool.acquire().await?;
    let record = resource_service::get(&mut conn, def, auth.country_accounts_id, id).await?;
    Ok(Json(record))
}

/// Create a record.
///
/// # Response
///
/// - **201 Created**: the stored record
/// - **422**: field errors, keyed by field
/// - **409**: duplicate `api_import_id`
pub async fn create(
    State(state): State<AppState>,
    Extension(def): Extension<&'static ResourceDef>,
    Extension(auth): Extension<AuthContext>,
    lang: Lang,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    auth.require(def.edit_permission)?;
    let t = state.translator(&lang.lang, lang.debug);
    let record = body_to_record(body)?;

    let mut tx = state.pool.begin().await?;
    let id = resource_service::create(&mut tx, def, &auth, record, &t).await?;
    let stored = resource_service::get(&mut tx, def, auth.country_accounts_id, id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Update the supplied fields of a record; omitted keys are left alone.
pub async fn update(
    State(state): State<AppState>,
    Extension(def): Extension<&'static ResourceDef>,
    Extension(auth): Extension<AuthContext>,
    lang: Lang,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    auth.require(def.edit_permission)?;
    let t = state.translator(&lang.lang, lang.debug);
    let record = body_to_record(body)?;

    let mut tx = state.pool.begin().await?;
    resource_service::update(&mut tx, def, &auth, id, record, &t).await?;
    let stored = resource_service::get(&mut tx, def, auth.country_accounts_id, id).await?;
    tx.commit().await?;

    Ok(Json(stored))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(def): Extension<&'static ResourceDef>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require(def.edit_permission)?;

    let mut tx = state.pool.begin().await?;
    resource_service::delete(&mut tx, def, &auth, id).await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_objects_are_records() {
        assert!(body_to_record(json!({"name": "x"})).is_ok());
        assert!(matches!(body_to_record(json!([1, 2])), Err(AppError::InvalidRequest(_))));
        assert!(matches!(body_to_record(Value::Null), Err(AppError::InvalidRequest(_))));
    }
}
