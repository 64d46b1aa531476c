//! Causality between hazardous events.
//!
//! A hazardous event may name one parent event that caused it. Relations are
//! kept in `event_relationships` with type `caused_by` and must stay acyclic,
//! inside one tenant, and ordered in time (a parent never starts after its
//! child).

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    error::{AppError, FieldErrors},
    forms::dates::{format_date_for_display, normalize_date_for_comparison},
    i18n::Translator,
};

const RELATION_TYPE: &str = "caused_by";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventSummary {
    pub id: Uuid,
    pub country_accounts_id: Uuid,
    pub description: Option<String>,
    pub start_date: Option<String>,
}

impl EventSummary {
    pub fn display_name(&self) -> String {
        event_name(self.description.as_deref(), self.id)
    }
}

/// Description cut to 50 characters, or `Event <first 8 chars of id>`.
pub fn event_name(description: Option<&str>, id: Uuid) -> String {
    match description.map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) if d.chars().count() > 50 => format!("{}...", d.chars().take(50).collect::<String>()),
        Some(d) => d.to_string(),
        None => format!("Event {}", &id.to_string()[..8]),
    }
}

/// Parse the `parent` key of a request body.
///
/// Returns `None` when the key was not supplied, `Some(None)` to clear the
/// relation.
pub fn parse_parent(value: Option<Value>, t: &Translator) -> Result<Option<Option<Uuid>>, FieldErrors> {
    match value {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Some(None)),
        Some(Value::String(s)) => Uuid::parse_str(s.trim())
            .map(|id| Some(Some(id)))
            .map_err(|_| FieldErrors::single("parent", t.t("validation.invalid_uuid", "Invalid UUID"))),
        Some(_) => Err(FieldErrors::single(
            "parent",
            t.t("validation.invalid_uuid", "Invalid UUID"),
        )),
    }
}

/// True when making `parent` the cause of `child` closes a loop, i.e. `child`
/// is `parent` itself or one of its ancestors.
///
/// `parents` maps each child to its current parent.
pub fn would_create_cycle(parents: &HashMap<Uuid, Uuid>, child: Uuid, parent: Uuid) -> bool {
    let mut seen = HashSet::new();
    let mut current = Some(parent);
    while let Some(node) = current {
        if node == child {
            return true;
        }
        if !seen.insert(node) {
            return false;
        }
        current = parents.get(&node).copied();
    }
    false
}

/// True when the parent starts after the child. Missing or unparsable dates
/// never conflict.
pub fn temporal_conflict(parent_start: Option<&str>, child_start: Option<&str>) -> bool {
    let parent = parent_start.and_then(normalize_date_for_comparison);
    let child = child_start.and_then(normalize_date_for_comparison);
    matches!((parent, child), (Some(p), Some(c)) if p > c)
}

pub fn cycle_message(t: &Translator, parent_name: &str, child_name: &str) -> String {
    t.t_with(
        "events.relation_cycle",
        "Cannot set '{parent}' as the cause of '{child}' because it would create a circular relationship. This would create a loop because '{child}' already leads back to '{parent}' through existing relationships. Please select a different parent event.",
        &[("parent", &parent_name), ("child", &child_name)],
    )
}

pub fn temporal_message(t: &Translator, parent: &EventSummary, child: &EventSummary) -> String {
    let parent_date = format_date_for_display(parent.start_date.as_deref().unwrap_or(""));
    let child_date = format_date_for_display(child.start_date.as_deref().unwrap_or(""));
    t.t_with(
        "events.temporal_conflict",
        "Timeline conflict: '{parent}' started in {parentDate}, but '{child}' started in {childDate}. A parent event must occur before or at the same time as the event it causes. Please select a parent event that starts earlier or on the same date.",
        &[
            ("parent", &parent.display_name()),
            ("parentDate", &parent_date),
            ("child", &child.display_name()),
            ("childDate", &child_date),
        ],
    )
}

async fn summary(conn: &mut PgConnection, id: Uuid) -> Result<Option<EventSummary>, AppError> {
    let row = sqlx::query_as::<_, EventSummary>(
        "SELECT id, country_accounts_id, description, start_date FROM hazardous_events WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// Current child -> parent map for the tenant's events.
async fn tenant_parents(conn: &mut PgConnection, tenant: Uuid) -> Result<HashMap<Uuid, Uuid>, AppError> {
    let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
        r#"
        SELECT r.child_id, r.parent_id
        FROM event_relationships r
        JOIN hazardous_events h ON h.id = r.child_id
        WHERE r.type = $1 AND h.country_accounts_id = $2
        "#,
    )
    .bind(RELATION_TYPE)
    .bind(tenant)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().collect())
}

pub async fn parent_of(conn: &mut PgConnection, child: Uuid) -> Result<Option<Uuid>, AppError> {
    let parent = sqlx::query_scalar::<_, Uuid>(
        "SELECT parent_id FROM event_relationships WHERE child_id = $1 AND type = $2",
    )
    .bind(child)
    .bind(RELATION_TYPE)
    .fetch_optional(conn)
    .await?;
    Ok(parent)
}

/// Replace the parent of `child`, or remove it when `parent` is `None`.
///
/// # Errors
///
/// Field errors on `parent` when the parent is the event itself, unknown,
/// owned by another tenant, creates a cycle, or starts after the child.
pub async fn set_parent(
    conn: &mut PgConnection,
    tenant: Uuid,
    child_id: Uuid,
    parent: Option<Uuid>,
    t: &Translator<'_>,
) -> Result<(), AppError> {
    if let Some(parent_id) = parent {
        let fail = |message: String| AppError::Validation(FieldErrors::single("parent", message));

        if parent_id == child_id {
            return Err(fail(t.t(
                "events.cannot_set_self_as_parent",
                "Cannot set an event as its own parent",
            )));
        }

        let parent_event = summary(&mut *conn, parent_id)
            .await?
            .ok_or_else(|| fail(t.t("events.parent_not_found", "Parent event not found")))?;
        if parent_event.country_accounts_id != tenant {
            return Err(fail(t.t(
                "events.parent_other_country",
                "Cannot reference events from other countries",
            )));
        }
        let child_event = summary(&mut *conn, child_id)
            .await?
            .ok_or(AppError::NotFound("Hazardous event"))?;

        let parents = tenant_parents(&mut *conn, tenant).await?;
        if would_create_cycle(&parents, child_id, parent_id) {
            tracing::info!(%child_id, %parent_id, "rejected cyclic event relation");
            return Err(fail(cycle_message(
                t,
                &parent_event.display_name(),
                &child_event.display_name(),
            )));
        }

        if temporal_conflict(
            parent_event.start_date.as_deref(),
            child_event.start_date.as_deref(),
        ) {
            return Err(fail(temporal_message(t, &parent_event, &child_event)));
        }
    }

    sqlx::query("DELETE FROM event_relationships WHERE child_id = $1 AND type = $2")
        .bind(child_id)
        .bind(RELATION_TYPE)
        .execute(&mut *conn)
        .await?;

    if let Some(parent_id) = parent {
        sqlx::query("INSERT INTO event_relationships (parent_id, child_id, type) VALUES ($1, $2, $3)")
            .bind(parent_id)
            .bind(child_id)
            .bind(RELATION_TYPE)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
