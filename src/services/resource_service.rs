//! CRUD operations shared by every resource.
//!
//! Each write validates against the resource definition, checks tenant
//! references, stamps the acting user and leaves an audit row. Callers own
//! the transaction.

use std::collections::HashMap;

use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    error::{AppError, FieldErrors},
    forms::{self, Mode, Record, ResourceDef},
    i18n::Translator,
    middleware::auth::AuthContext,
    models::{approval::ApprovalStatus, role::Permission},
    services::event_service,
    store::{self, AuditEntry, ListFilter},
};

/// Query keys consumed by the list endpoint itself.
const RESERVED_PARAMS: &[&str] = &["page", "page_size", "pageSize", "lang", "q", "approval_status"];

/// Build a list filter from query parameters.
///
/// Keys naming a field filter on that field; unknown keys are ignored.
pub fn filter_from_params(
    def: &ResourceDef,
    params: &HashMap<String, String>,
    t: &Translator,
) -> Result<ListFilter, AppError> {
    let mut filter = ListFilter {
        search: params
            .get("q")
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty()),
        ..ListFilter::default()
    };

    if let Some(status) = params.get("approval_status").filter(|s| !s.is_empty()) {
        let status = status
            .parse::<ApprovalStatus>()
            .map_err(|_| AppError::invalid(format!("Unknown approval status: {status}")))?;
        filter.approval_status = Some(status);
    }

    let mut errors = FieldErrors::new();
    for (key, raw) in params {
        if RESERVED_PARAMS.contains(&key.as_str()) {
            continue;
        }
        let Some(field) = def.field(key) else {
            continue;
        };
        match forms::coerce(field, &Value::String(raw.clone())) {
            Ok(Some(value)) => filter.equals.push((field, value)),
            Ok(None) => {}
            Err(issue) => errors.add_field(key, t.t(issue.code, issue.message)),
        }
    }
    filter.equals.sort_by(|a, b| a.0.key.cmp(b.0.key));
    errors.into_result()?;
    Ok(filter)
}

/// Row as JSON, with `parent` added for resources tracking causality.
pub async fn get(
    conn: &mut PgConnection,
    def: &ResourceDef,
    tenant: Uuid,
    id: Uuid,
) -> Result<Value, AppError> {
    let mut row = store::get(&mut *conn, def, tenant, id)
        .await?
        .ok_or(AppError::NotFound(def.label))?;
    if def.has_event_parent {
        let parent = event_service::parent_of(&mut *conn, id).await?;
        if let Value::Object(map) = &mut row {
            map.insert(
                "parent".to_string(),
                parent.map_or(Value::Null, |p| Value::String(p.to_string())),
            );
        }
    }
    Ok(row)
}

fn take_parent(def: &ResourceDef, record: &mut Record, t: &Translator) -> Result<Option<Option<Uuid>>, AppError> {
    if !def.has_event_parent {
        return Ok(None);
    }
    event_service::parse_parent(record.remove("parent"), t).map_err(AppError::Validation)
}

/// Validate and insert a record; returns its id.
///
/// Approval resources start as `draft` through the column default.
pub async fn create(
    conn: &mut PgConnection,
    def: &ResourceDef,
    auth: &AuthContext,
    mut record: Record,
    t: &Translator<'_>,
) -> Result<Uuid, AppError> {
    let tenant = auth.country_accounts_id;
    let parent = take_parent(def, &mut record, t)?;
    let values = forms::validate_record(def, &record, Mode::Create, t).map_err(AppError::Validation)?;
    store::check_refs(&mut *conn, tenant, &values, t).await?;

    let id = store::insert(&mut *conn, def, tenant, auth.user_id, &values).await?;
    if let Some(Some(parent_id)) = parent {
        event_service::set_parent(&mut *conn, tenant, id, Some(parent_id), t).await?;
    }

    let new_values = store::get(&mut *conn, def, tenant, id).await?;
    store::write_audit(
        &mut *conn,
        AuditEntry {
            tenant,
            table: def.table,
            record_id: id,
            action: "create",
            old_values: None,
            new_values,
            user_id: auth.user_id,
        },
    )
    .await?;

    tracing::info!(resource = def.name, %id, user_id = %auth.user_id, "record created");
    Ok(id)
}

/// Validate and apply a partial update.
pub async fn update(
    conn: &mut PgConnection,
    def: &ResourceDef,
    auth: &AuthContext,
    id: Uuid,
    mut record: Record,
    t: &Translator<'_>,
) -> Result<(), AppError> {
    let tenant = auth.country_accounts_id;
    let old_values = store::get(&mut *conn, def, tenant, id)
        .await?
        .ok_or(AppError::NotFound(def.label))?;

    let parent = take_parent(def, &mut record, t)?;
    let values = forms::validate_record(def, &record, Mode::Update, t).map_err(AppError::Validation)?;
    store::check_refs(&mut *conn, tenant, &values, t).await?;

    if !store::update(&mut *conn, def, tenant, auth.user_id, id, &values).await? {
        return Err(AppError::NotFound(def.label));
    }
    if let Some(parent) = parent {
        event_service::set_parent(&mut *conn, tenant, id, parent, t).await?;
    }

    let new_values = store::get(&mut *conn, def, tenant, id).await?;
    store::write_audit(
        &mut *conn,
        AuditEntry {
            tenant,
            table: def.table,
            record_id: id,
            action: "update",
            old_values: Some(old_values),
            new_values,
            user_id: auth.user_id,
        },
    )
    .await?;

    tracing::info!(resource = def.name, %id, user_id = %auth.user_id, "record updated");
    Ok(())
}

/// Delete a record together with its workflow rows.
///
/// Validated or published records additionally need `DeleteValidatedData`.
pub async fn delete(
    conn: &mut PgConnection,
    def: &ResourceDef,
    auth: &AuthContext,
    id: Uuid,
) -> Result<(), AppError> {
    let tenant = auth.country_accounts_id;
    let old_values = store::get(&mut *conn, def, tenant, id)
        .await?
        .ok_or(AppError::NotFound(def.label))?;

    if def.has_approval {
        let protected = old_values
            .get("approval_status")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<ApprovalStatus>().ok())
            .is_some_and(|s| s.is_protected());
        if protected {
            auth.require(Permission::DeleteValidatedData)?;
        }

        sqlx::query("DELETE FROM entity_validation_assignments WHERE entity_id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM entity_validation_rejections WHERE entity_id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }

    if !store::delete(&mut *conn, def, tenant, id).await? {
        return Err(AppError::NotFound(def.label));
    }

    store::write_audit(
        &mut *conn,
        AuditEntry {
            tenant,
            table: def.table,
            record_id: id,
            action: "delete",
            old_values: Some(old_values),
            new_values: None,
            user_id: auth.user_id,
        },
    )
    .await?;

    tracing::info!(resource = def.name, %id, user_id = %auth.user_id, "record deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::resources;
    use crate::i18n::Translations;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn filters_from_known_fields_only() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        let record_id = Uuid::new_v4();
        let filter = filter_from_params(
            &resources::DAMAGES,
            &params(&[
                ("record_id", &record_id.to_string()),
                ("page", "2"),
                ("whatever", "x"),
                ("q", "  "),
            ]),
            &t,
        )
        .unwrap();
        let field = resources::DAMAGES.field("record_id").unwrap();
        assert_eq!(filter.equals, vec![(field, record_id.to_string())]);
        assert_eq!(filter.search, None);
    }

    #[test]
    fn invalid_filter_values_are_rejected() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        let err = filter_from_params(&resources::DAMAGES, &params(&[("record_id", "nope")]), &t).unwrap_err();
        assert!(matches!(err, AppError::Validation(e) if e.fields.contains_key("record_id")));

        let err = filter_from_params(
            &resources::HAZARDOUS_EVENTS,
            &params(&[("approval_status", "approved")]),
            &t,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[test]
    fn approval_status_and_search() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        let filter = filter_from_params(
            &resources::HAZARDOUS_EVENTS,
            &params(&[("approval_status", "published"), ("q", "flood")]),
            &t,
        )
        .unwrap();
        assert_eq!(filter.approval_status, Some(ApprovalStatus::Published));
        assert_eq!(filter.search.as_deref(), Some("flood"));
    }
}
