//! Approval workflow service.
//!
//! Moves hazardous events, disaster events and disaster records between
//! approval statuses.
//!
//! # Atomicity
//!
//! The record row is locked with `FOR UPDATE` and every write (status,
//! assignments, rejections, audit) happens in one transaction. Emails go out
//! only after commit; a failed email never undoes a transition.

use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    error::{AppError, FieldErrors},
    i18n::Translator,
    middleware::auth::AuthContext,
    models::{
        approval::{
            ApprovalAction, ApprovalEntity, ApprovalRequest, ApprovalRow, ApprovalStatus,
            ValidationAssignment, ValidationRejection,
        },
        role::Role,
        user::{Member, User},
    },
    services::{
        email_service::Email,
        notification_service::{self, AssignmentDetails},
    },
    state::AppState,
    store::{self, AuditEntry},
};

const APPROVAL_COLUMNS_SQL: &str = "id, approval_status, submitted_by_user_id, submitted_at, \
     validated_by_user_id, validated_at, published_by_user_id, published_at";

/// Status the action leads to from `current`, or `InvalidTransition`.
pub fn plan_transition(
    current: ApprovalStatus,
    action: ApprovalAction,
    t: &Translator,
) -> Result<ApprovalStatus, AppError> {
    action.target(current).ok_or_else(|| {
        AppError::InvalidTransition(t.t_with(
            "approval.invalid_transition",
            "Action {action} is not allowed for records in status {status}",
            &[("action", &action.as_str()), ("status", &current.as_str())],
        ))
    })
}

/// Parse and verify validator ids: at least one, valid UUIDs, and each a
/// member of the tenant with at least the validator role.
fn parse_validator_ids(request: &ApprovalRequest, t: &Translator) -> Result<Vec<Uuid>, AppError> {
    let ids = request
        .validator_user_ids
        .as_ref()
        .map(|v| v.normalized())
        .unwrap_or_default();
    if ids.is_empty() {
        return Err(AppError::Validation(FieldErrors::single(
            "validator_user_ids",
            t.t("approval.validators_required", "Validator user IDs are required"),
        )));
    }

    let mut errors = FieldErrors::new();
    let mut parsed = Vec::with_capacity(ids.len());
    for id in ids {
        match Uuid::parse_str(&id) {
            Ok(uuid) => parsed.push(uuid),
            Err(_) => errors.add_field(
                "validator_user_ids",
                t.t_with("approval.validator_invalid", "Invalid validator id: {id}", &[("id", &id)]),
            ),
        }
    }
    errors.into_result()?;
    Ok(parsed)
}

/// Members of the tenant among `ids`, checked for the validator role.
async fn load_validators(
    conn: &mut PgConnection,
    tenant: Uuid,
    ids: &[Uuid],
    t: &Translator<'_>,
) -> Result<Vec<User>, AppError> {
    let members = sqlx::query_as::<_, Member>(
        r#"
        SELECT u.id, u.first_name, u.last_name, u.email, uca.role
        FROM users u
        JOIN user_country_accounts uca ON uca.user_id = u.id
        WHERE uca.country_accounts_id = $1 AND u.id = ANY($2)
        "#,
    )
    .bind(tenant)
    .bind(ids)
    .fetch_all(conn)
    .await?;

    let mut errors = FieldErrors::new();
    let mut validators = Vec::with_capacity(ids.len());
    for id in ids {
        let member = members.iter().find(|m| m.id == *id);
        let is_validator = member
            .and_then(|m| m.role.parse::<Role>().ok())
            .is_some_and(|role| role >= Role::DataValidator);
        match member {
            Some(member) if is_validator => validators.push(User::from(member.clone())),
            _ => errors.add_field(
                "validator_user_ids",
                t.t_with(
                    "approval.validator_not_allowed",
                    "User {id} cannot validate records in this country",
                    &[("id", id)],
                ),
            ),
        }
    }
    errors.into_result()?;
    Ok(validators)
}

async fn lock_row(
    conn: &mut PgConnection,
    entity: ApprovalEntity,
    tenant: Uuid,
    id: Uuid,
) -> Result<ApprovalRow, AppError> {
    let sql = format!(
        "SELECT {APPROVAL_COLUMNS_SQL} FROM {} WHERE id = $1 AND country_accounts_id = $2 FOR UPDATE",
        entity.table()
    );
    sqlx::query_as::<_, ApprovalRow>(&sql)
        .bind(id)
        .bind(tenant)
        .fetch_optional(conn)
        .await?
        .ok_or(AppError::NotFound(entity.label()))
}

async fn clear_assignments(conn: &mut PgConnection, entity: ApprovalEntity, id: Uuid) -> Result<(), AppError> {
    sqlx::query("DELETE FROM entity_validation_assignments WHERE entity_id = $1 AND entity_type = $2")
        .bind(id)
        .bind(entity.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

/// Apply an approval action and notify the people involved.
///
/// # Process
///
/// 1. Check the caller's permission for the action
/// 2. Lock the record and check the transition from its current status
/// 3. Write the new status, assignments or rejection, and an audit row
/// 4. Commit, then send notifications
///
/// # Errors
///
/// - `Forbidden`: role too low for the action
/// - `NotFound`: no such record in the caller's tenant
/// - `InvalidTransition`: action not available from the current status
/// - `Validation`: missing validators, ineligible validators, or a blank
///   rejection comment
pub async fn apply_action(
    state: &AppState,
    auth: &AuthContext,
    entity: ApprovalEntity,
    id: Uuid,
    request: ApprovalRequest,
    t: &Translator<'_>,
) -> Result<ApprovalRow, AppError> {
    let action = request.action;
    auth.require(action.required_permission())?;
    let tenant = auth.country_accounts_id;
    let actor = auth.user_id;

    let mut tx = state.pool.begin().await?;

    let current_row = lock_row(&mut tx, entity, tenant, id).await?;
    let current = current_row.approval_status.parse::<ApprovalStatus>().map_err(|e| {
        tracing::error!(%id, error = %e, "stored approval status is invalid");
        AppError::InvalidTransition(e)
    })?;
    let target = plan_transition(current, action, t)?;

    let mut validators = Vec::new();
    let mut comment = String::new();
    let set_clause = match action {
        ApprovalAction::SubmitValidation => {
            let ids = parse_validator_ids(&request, t)?;
            validators = load_validators(&mut tx, tenant, &ids, t).await?;

            clear_assignments(&mut tx, entity, id).await?;
            for validator in &validators {
                sqlx::query(
                    r#"
                    INSERT INTO entity_validation_assignments (
                        country_accounts_id, entity_id, entity_type,
                        assigned_to_user_id, assigned_by_user_id
                    )
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(tenant)
                .bind(id)
                .bind(entity.as_str())
                .bind(validator.id)
                .bind(actor)
                .execute(&mut *tx)
                .await?;
            }
            "submitted_by_user_id = $3, submitted_at = NOW(), \
             validated_by_user_id = NULL, validated_at = NULL, \
             published_by_user_id = NULL, published_at = NULL"
        }
        ApprovalAction::SubmitDraft => {
            clear_assignments(&mut tx, entity, id).await?;
            "submitted_by_user_id = NULL, submitted_at = NULL, \
             validated_by_user_id = NULL, validated_at = NULL, \
             published_by_user_id = NULL, published_at = NULL"
        }
        ApprovalAction::SubmitValidate => {
            clear_assignments(&mut tx, entity, id).await?;
            "submitted_by_user_id = COALESCE(submitted_by_user_id, $3), \
             submitted_at = COALESCE(submitted_at, NOW()), \
             validated_by_user_id = $3, validated_at = NOW(), \
             published_by_user_id = NULL, published_at = NULL"
        }
        ApprovalAction::Validate => {
            clear_assignments(&mut tx, entity, id).await?;
            "validated_by_user_id = $3, validated_at = NOW()"
        }
        ApprovalAction::Reject => {
            comment = request
                .comment
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string();
            if comment.is_empty() {
                return Err(AppError::Validation(FieldErrors::single(
                    "comment",
                    t.t("approval.comment_required", "Rejection comments are required"),
                )));
            }
            sqlx::query(
                r#"
                INSERT INTO entity_validation_rejections (
                    country_accounts_id, entity_id, entity_type,
                    rejected_by_user_id, rejection_message
                )
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(tenant)
            .bind(id)
            .bind(entity.as_str())
            .bind(actor)
            .bind(&comment)
            .execute(&mut *tx)
            .await?;
            clear_assignments(&mut tx, entity, id).await?;
            "validated_by_user_id = NULL, validated_at = NULL, \
             published_by_user_id = NULL, published_at = NULL"
        }
        ApprovalAction::Publish => {
            clear_assignments(&mut tx, entity, id).await?;
            "validated_by_user_id = COALESCE(validated_by_user_id, $3), \
             validated_at = COALESCE(validated_at, NOW()), \
             published_by_user_id = $3, published_at = NOW()"
        }
    };

    let sql = format!(
        "UPDATE {} SET approval_status = $1, updated_at = NOW(), updated_by_user_id = $3, {set_clause} \
         WHERE id = $2 AND country_accounts_id = $4 RETURNING {APPROVAL_COLUMNS_SQL}",
        entity.table()
    );
    let updated = sqlx::query_as::<_, ApprovalRow>(&sql)
        .bind(target.as_str())
        .bind(id)
        .bind(actor)
        .bind(tenant)
        .fetch_one(&mut *tx)
        .await?;

    store::write_audit(
        &mut tx,
        AuditEntry {
            tenant,
            table: entity.table(),
            record_id: id,
            action: action.as_str(),
            old_values: serde_json::to_value(&current_row).ok(),
            new_values: serde_json::to_value(&updated).ok(),
            user_id: actor,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        entity = entity.as_str(),
        %id,
        action = action.as_str(),
        from = current.as_str(),
        to = target.as_str(),
        user_id = %actor,
        "approval status changed"
    );

    let emails = match notification_emails(state, auth, entity, &updated, &validators, &comment, t).await {
        Ok(emails) => emails,
        Err(e) => {
            tracing::error!(%id, error = %e, "failed to prepare approval notifications");
            Vec::new()
        }
    };
    notification_service::send_all(state.mailer.as_ref(), emails).await;

    Ok(updated)
}

/// Emails to send after a committed transition.
async fn notification_emails(
    state: &AppState,
    auth: &AuthContext,
    entity: ApprovalEntity,
    row: &ApprovalRow,
    validators: &[User],
    comment: &str,
    t: &Translator<'_>,
) -> Result<Vec<Email>, AppError> {
    let status = row
        .approval_status
        .parse::<ApprovalStatus>()
        .map_err(AppError::InvalidTransition)?;
    let mut conn = state.pool.acquire().await?;
    let url = notification_service::record_url(state.config.public_base_url(), t.lang(), entity, row.id);
    let record_type = notification_service::record_type_label(t, entity);

    if status == ApprovalStatus::WaitingForValidation {
        let def = crate::forms::resources::ALL
            .iter()
            .find(|d| d.table == entity.table())
            .ok_or(AppError::NotFound(entity.label()))?;
        let record = store::get(&mut conn, def, auth.country_accounts_id, row.id)
            .await?
            .unwrap_or(Value::Null);
        let event_name = notification_service::hip_event_name(&mut conn, &record, t).await?;
        let date = notification_service::event_date(
            record.get("start_date").and_then(Value::as_str),
            record.get("end_date").and_then(Value::as_str),
        );
        let submitter = notification_service::find_users(&mut conn, &[auth.user_id]).await?;
        let details = AssignmentDetails {
            record_type,
            event_name,
            event_date: date,
            submitter_name: submitter.first().map(User::full_name).unwrap_or_default(),
            url,
        };
        return Ok(validators
            .iter()
            .filter(|v| !v.email.is_empty())
            .map(|v| notification_service::render_validator_assignment(t, v, &details))
            .collect());
    }

    let Some(submitter_id) = row.submitted_by_user_id else {
        return Ok(Vec::new());
    };
    let submitter = notification_service::find_users(&mut conn, &[submitter_id]).await?;
    let Some(submitter) = submitter.first().filter(|u| !u.email.is_empty()) else {
        return Ok(Vec::new());
    };

    Ok(notification_service::render_status_change(
        t,
        status,
        &submitter.email,
        &submitter.full_name(),
        &record_type,
        &url,
        comment,
    )
    .into_iter()
    .collect())
}

/// Rejection history of a record, newest first.
pub async fn rejections(
    conn: &mut PgConnection,
    tenant: Uuid,
    entity: ApprovalEntity,
    id: Uuid,
) -> Result<Vec<ValidationRejection>, AppError> {
    let rows = sqlx::query_as::<_, ValidationRejection>(
        r#"
        SELECT id, entity_id, entity_type, rejected_by_user_id, rejection_message, rejected_at
        FROM entity_validation_rejections
        WHERE country_accounts_id = $1 AND entity_type = $2 AND entity_id = $3
        ORDER BY rejected_at DESC
        "#,
    )
    .bind(tenant)
    .bind(entity.as_str())
    .bind(id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Records waiting on the given validator.
pub async fn assignments_for(
    conn: &mut PgConnection,
    tenant: Uuid,
    user_id: Uuid,
) -> Result<Vec<ValidationAssignment>, AppError> {
    let rows = sqlx::query_as::<_, ValidationAssignment>(
        r#"
        SELECT id, entity_id, entity_type, assigned_to_user_id, assigned_by_user_id, assigned_at
        FROM entity_validation_assignments
        WHERE country_accounts_id = $1 AND assigned_to_user_id = $2
        ORDER BY assigned_at DESC
        "#,
    )
    .bind(tenant)
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Translations;
    use crate::models::approval::ValidatorIds;

    fn request(action: ApprovalAction, ids: Option<ValidatorIds>) -> ApprovalRequest {
        ApprovalRequest {
            action,
            validator_user_ids: ids,
            comment: None,
        }
    }

    #[test]
    fn invalid_transition_names_action_and_status() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        let err = plan_transition(ApprovalStatus::Published, ApprovalAction::Validate, &t).unwrap_err();
        match err {
            AppError::InvalidTransition(msg) => {
                assert_eq!(msg, "Action validate is not allowed for records in status published")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            plan_transition(ApprovalStatus::Draft, ApprovalAction::SubmitValidate, &t).unwrap(),
            ApprovalStatus::Validated
        );
    }

    #[test]
    fn validators_are_required() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        let err = parse_validator_ids(&request(ApprovalAction::SubmitValidation, None), &t).unwrap_err();
        assert!(matches!(err, AppError::Validation(e) if e.fields.contains_key("validator_user_ids")));

        let blank = request(ApprovalAction::SubmitValidation, Some(ValidatorIds::Joined(" , ".into())));
        assert!(parse_validator_ids(&blank, &t).is_err());
    }

    #[test]
    fn validator_ids_must_be_uuids() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        let id = Uuid::new_v4();
        let ok = request(
            ApprovalAction::SubmitValidation,
            Some(ValidatorIds::Joined(format!("{id}, {id}"))),
        );
        assert_eq!(parse_validator_ids(&ok, &t).unwrap(), vec![id]);

        let bad = request(ApprovalAction::SubmitValidation, Some(ValidatorIds::List(vec!["x".into()])));
        assert!(parse_validator_ids(&bad, &t).is_err());
    }
}
