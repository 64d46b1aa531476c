//! Tenant-scoped data access for resources described by a [`ResourceDef`].
//!
//! Statements are assembled with `QueryBuilder`. Every one of them filters on
//! `country_accounts_id`, and every value is bound as text and cast to the
//! column type, so the field definitions are the only source of column names.
//!
//! Functions take `&mut PgConnection` so callers decide whether they run
//! inside a transaction (`&mut *tx`) or on a pooled connection.

use serde_json::Value;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, FieldErrors},
    forms::{FieldDef, FieldKind, FieldValue, ResourceDef},
    i18n::Translator,
    models::approval::ApprovalStatus,
    pagination::{Page, PageQuery},
};

/// Optional list restrictions.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Exact matches on field columns, compared as the column's own type
    pub equals: Vec<(&'static FieldDef, String)>,
    /// Case-insensitive substring match on the resource's search column
    pub search: Option<String>,
    pub approval_status: Option<ApprovalStatus>,
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, kind: FieldKind, value: Option<String>) {
    qb.push("CAST(");
    qb.push_bind(value);
    qb.push(" AS ");
    qb.push(kind.sql_type());
    qb.push(")");
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn push_where(qb: &mut QueryBuilder<'_, Postgres>, def: &ResourceDef, tenant: Uuid, filter: &ListFilter) {
    qb.push(" WHERE t.country_accounts_id = ");
    qb.push_bind(tenant);

    for (field, value) in &filter.equals {
        qb.push(format!(" AND t.{} = ", field.key));
        push_value(qb, field.kind, Some(value.clone()));
    }

    if let (Some(term), Some(column)) = (filter.search.as_deref(), def.search_column) {
        qb.push(format!(" AND CAST(t.{column} AS TEXT) ILIKE "));
        qb.push_bind(format!("%{}%", escape_like(term)));
    }

    if let Some(status) = filter.approval_status.filter(|_| def.has_approval) {
        qb.push(" AND t.approval_status = ");
        qb.push_bind(status.as_str());
    }
}

/// Row of `t` as a JSON object.
///
/// `NUMERIC` columns are replaced by their text form; as JSON numbers they
/// would be read back as `f64` and lose digits.
fn row_json(def: &ResourceDef) -> String {
    let pairs: Vec<String> = def
        .fields
        .iter()
        .filter(|f| f.kind == FieldKind::Money)
        .map(|f| format!("'{0}', CAST(t.{0} AS TEXT)", f.key))
        .collect();
    if pairs.is_empty() {
        "to_jsonb(t)".to_string()
    } else {
        format!("(to_jsonb(t) || jsonb_build_object({}))", pairs.join(", "))
    }
}

/// One page of rows as JSON objects, plus the total count.
pub async fn list(
    conn: &mut PgConnection,
    def: &ResourceDef,
    tenant: Uuid,
    filter: &ListFilter,
    page: PageQuery,
) -> Result<Page<Value>, AppError> {
    let mut count = QueryBuilder::new(format!("SELECT COUNT(*) FROM {} t", def.table));
    push_where(&mut count, def, tenant, filter);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut query = QueryBuilder::new(format!("SELECT {} FROM {} t", row_json(def), def.table));
    push_where(&mut query, def, tenant, filter);
    query.push(format!(" ORDER BY {}", def.order_by));
    query.push(" LIMIT ");
    query.push_bind(page.limit());
    query.push(" OFFSET ");
    query.push_bind(page.offset());
    let items: Vec<Value> = query.build_query_scalar().fetch_all(&mut *conn).await?;

    Ok(Page::new(items, page, total))
}

/// Every row of the tenant ordered by id; used by exports and trees.
pub async fn list_all(conn: &mut PgConnection, def: &ResourceDef, tenant: Uuid) -> Result<Vec<Value>, AppError> {
    let sql = format!(
        "SELECT {} FROM {} t WHERE t.country_accounts_id = $1 ORDER BY t.id",
        row_json(def),
        def.table
    );
    let rows = sqlx::query_scalar::<_, Value>(&sql)
        .bind(tenant)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

pub async fn get(
    conn: &mut PgConnection,
    def: &ResourceDef,
    tenant: Uuid,
    id: Uuid,
) -> Result<Option<Value>, AppError> {
    let sql = format!(
        "SELECT {} FROM {} t WHERE t.id = $1 AND t.country_accounts_id = $2",
        row_json(def),
        def.table
    );
    let row = sqlx::query_scalar::<_, Value>(&sql)
        .bind(id)
        .bind(tenant)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Insert a row stamped with tenant and creator; returns the new id.
pub async fn insert(
    conn: &mut PgConnection,
    def: &ResourceDef,
    tenant: Uuid,
    actor: Uuid,
    values: &[FieldValue],
) -> Result<Uuid, AppError> {
    let mut qb = QueryBuilder::new(format!(
        "INSERT INTO {} (country_accounts_id, created_by_user_id, updated_by_user_id",
        def.table
    ));
    for v in values {
        qb.push(", ");
        qb.push(v.field.key);
    }
    qb.push(") VALUES (");
    qb.push_bind(tenant);
    qb.push(", ");
    qb.push_bind(actor);
    qb.push(", ");
    qb.push_bind(actor);
    for v in values {
        qb.push(", ");
        push_value(&mut qb, v.field.kind, v.value.clone());
    }
    qb.push(") RETURNING id");

    let id: Uuid = qb.build_query_scalar().fetch_one(conn).await?;
    Ok(id)
}

/// Update the supplied columns. Returns `false` when no row of the tenant
/// has that id.
pub async fn update(
    conn: &mut PgConnection,
    def: &ResourceDef,
    tenant: Uuid,
    actor: Uuid,
    id: Uuid,
    values: &[FieldValue],
) -> Result<bool, AppError> {
    let mut qb = QueryBuilder::new(format!(
        "UPDATE {} SET updated_at = NOW(), updated_by_user_id = ",
        def.table
    ));
    qb.push_bind(actor);
    for v in values {
        qb.push(format!(", {} = ", v.field.key));
        push_value(&mut qb, v.field.kind, v.value.clone());
    }
    qb.push(" WHERE id = ");
    qb.push_bind(id);
    qb.push(" AND country_accounts_id = ");
    qb.push_bind(tenant);

    let result = qb.build().execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a row. Rows still referenced elsewhere surface as `Conflict`.
pub async fn delete(conn: &mut PgConnection, def: &ResourceDef, tenant: Uuid, id: Uuid) -> Result<bool, AppError> {
    let sql = format!(
        "DELETE FROM {} WHERE id = $1 AND country_accounts_id = $2",
        def.table
    );
    let result = sqlx::query(&sql)
        .bind(id)
        .bind(tenant)
        .execute(conn)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => AppError::Conflict(format!(
                "{} is still referenced by other records",
                def.label
            )),
            _ => AppError::Database(e),
        })?;
    Ok(result.rows_affected() > 0)
}

pub async fn id_by_import_id(
    conn: &mut PgConnection,
    def: &ResourceDef,
    tenant: Uuid,
    api_import_id: &str,
) -> Result<Option<Uuid>, AppError> {
    let sql = format!(
        "SELECT id FROM {} WHERE api_import_id = $1 AND country_accounts_id = $2",
        def.table
    );
    let id = sqlx::query_scalar::<_, Uuid>(&sql)
        .bind(api_import_id)
        .bind(tenant)
        .fetch_optional(conn)
        .await?;
    Ok(id)
}

/// Every `Ref` value must name a row of the same tenant.
pub async fn check_refs(
    conn: &mut PgConnection,
    tenant: Uuid,
    values: &[FieldValue],
    t: &Translator<'_>,
) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();
    for v in values {
        let (FieldKind::Ref(table), Some(value)) = (v.field.kind, v.value.as_deref()) else {
            continue;
        };
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {table} WHERE id = CAST($1 AS UUID) AND country_accounts_id = $2)"
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(value)
            .bind(tenant)
            .fetch_one(&mut *conn)
            .await?;
        if !exists {
            errors.add_field(
                v.field.key,
                t.t("validation.reference_not_found", "Referenced record not found"),
            );
        }
    }
    errors.into_result()
}

/// Audit trail entry for a write.
pub struct AuditEntry<'a> {
    pub tenant: Uuid,
    pub table: &'a str,
    pub record_id: Uuid,
    pub action: &'a str,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub user_id: Uuid,
}

pub async fn write_audit(conn: &mut PgConnection, entry: AuditEntry<'_>) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (
            country_accounts_id, table_name, record_id, action,
            old_values, new_values, user_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.tenant)
    .bind(entry.table)
    .bind(entry.record_id)
    .bind(entry.action)
    .bind(entry.old_values)
    .bind(entry.new_values)
    .bind(entry.user_id)
    .execute(conn)
    .await?;
    Ok(())
}
