//! Approval workflow and membership notifications.
//!
//! Rendering is pure and goes through the translator; sending happens after
//! the workflow transaction has committed, and failures are only logged.

use std::fmt::Display;

use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    error::AppError,
    i18n::Translator,
    models::{
        approval::{ApprovalEntity, ApprovalStatus},
        user::User,
    },
    services::email_service::{Email, Mailer},
};

/// Escape text inserted into HTML bodies.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `<base>/<lang>/<segment>/<id>`
pub fn record_url(base_url: &str, lang: &str, entity: ApprovalEntity, id: Uuid) -> String {
    format!(
        "{}/{}/{}/{}",
        base_url.trim_end_matches('/'),
        lang,
        entity.url_segment(),
        id
    )
}

/// Lowercased, translated name of the record type.
pub fn record_type_label(t: &Translator, entity: ApprovalEntity) -> String {
    let (code, default) = match entity {
        ApprovalEntity::HazardousEvent => ("hazardous_event", "Hazardous event"),
        ApprovalEntity::DisasterEvent => ("disaster_event", "Disaster event"),
        ApprovalEntity::DisasterRecord => ("disaster_event.disaster_record", "Disaster record"),
    };
    t.t(code, default).to_lowercase()
}

/// `start`, or `start to end` when the end differs.
pub fn event_date(start: Option<&str>, end: Option<&str>) -> String {
    let start = start.unwrap_or("");
    match end {
        Some(end) if !end.is_empty() && end != start => format!("{start} to {end}"),
        _ => start.to_string(),
    }
}

/// Email telling the submitter their record changed status.
///
/// Only `validated`, `needs-revision` and `published` produce an email.
pub fn render_status_change(
    t: &Translator,
    status: ApprovalStatus,
    to: &str,
    submitter_name: &str,
    record_type: &str,
    url: &str,
    comments: &str,
) -> Option<Email> {
    let name = if submitter_name.is_empty() { "user" } else { submitter_name };
    let text_args: [(&str, &dyn Display); 4] = [
        ("submitterName", &name),
        ("recordTypeData", &record_type),
        ("recordUrl", &url),
        ("rejectionComments", &comments),
    ];
    let (name_html, type_html, url_html, comments_html) = (
        html_escape(name),
        html_escape(record_type),
        html_escape(url),
        html_escape(comments),
    );
    let html_args: [(&str, &dyn Display); 4] = [
        ("submitterName", &name_html),
        ("recordTypeData", &type_html),
        ("recordUrl", &url_html),
        ("rejectionComments", &comments_html),
    ];

    let (key, subject, html, text) = match status {
        ApprovalStatus::Published => (
            "published",
            "Your record has been published",
            "<p>Dear {submitterName},</p><p>Your {recordTypeData} has been published and is now publicly available.</p><p><a href=\"{recordUrl}\">View record</a></p>",
            "Dear {submitterName},\n\nYour {recordTypeData} has been published and is now publicly available.\n\nView record: {recordUrl}",
        ),
        ApprovalStatus::NeedsRevision => (
            "needs_revision",
            "Your record requires changes",
            "<p>Dear {submitterName},</p><p>Your {recordTypeData} has been returned for revision.</p><p>Comments: {rejectionComments}</p><p><a href=\"{recordUrl}\">View and edit record</a></p>",
            "Dear {submitterName},\n\nYour {recordTypeData} has been returned for revision.\n\nComments: {rejectionComments}\n\nView and edit record: {recordUrl}",
        ),
        ApprovalStatus::Validated => (
            "validated",
            "Your record has been validated",
            "<p>Dear {submitterName},</p><p>Your {recordTypeData} has been validated.</p><p><a href=\"{recordUrl}\">View record</a></p>",
            "Dear {submitterName},\n\nYour {recordTypeData} has been validated.\n\nView record: {recordUrl}",
        ),
        ApprovalStatus::Draft | ApprovalStatus::WaitingForValidation => return None,
    };

    let prefix = "email.validation_workflow";
    Some(Email {
        to: to.to_string(),
        subject: t.t(&format!("{prefix}.subject_{key}"), subject),
        html: t.t_with(&format!("{prefix}.body_{key}_html"), html, &html_args),
        text: t.t_with(&format!("{prefix}.body_{key}_text"), text, &text_args),
    })
}

/// Details shown to validators about the submitted record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentDetails {
    pub record_type: String,
    pub event_name: String,
    pub event_date: String,
    pub submitter_name: String,
    pub url: String,
}

/// Email asking one validator to review a submitted record.
pub fn render_validator_assignment(t: &Translator, validator: &User, details: &AssignmentDetails) -> Email {
    let validator_name = validator.full_name();
    let text_args: [(&str, &dyn Display); 6] = [
        ("validatorName", &validator_name),
        ("recordType", &details.record_type),
        ("eventName", &details.event_name),
        ("eventDate", &details.event_date),
        ("submitterName", &details.submitter_name),
        ("recordUrl", &details.url),
    ];
    let escaped: Vec<String> = [
        validator_name.as_str(),
        details.record_type.as_str(),
        details.event_name.as_str(),
        details.event_date.as_str(),
        details.submitter_name.as_str(),
        details.url.as_str(),
    ]
    .iter()
    .map(|s| html_escape(s))
    .collect();
    let html_args: Vec<(&str, &dyn Display)> = text_args
        .iter()
        .zip(escaped.iter())
        .map(|((key, _), value)| (*key, value as &dyn Display))
        .collect();

    Email {
        to: validator.email.clone(),
        subject: t.t("email.validation_workflow.subject_assigned", "Event validation"),
        html: t.t_with(
            "email.validation_workflow.body_assigned_html",
            "<p>Dear {validatorName},</p><p>A new {recordType} is waiting for your action. Click the link below to view the event.</p><p>Event name: {eventName}<br />Event date: {eventDate}<br />Submitted by: {submitterName}</p><p><a href=\"{recordUrl}\">View event</a></p>",
            &html_args,
        ),
        text: t.t_with(
            "email.validation_workflow.body_assigned_text",
            "Dear {validatorName},\nA new {recordType} is waiting for your action. Click the link below to view the event.\nEvent name: {eventName}\nEvent date: {eventDate}\nSubmitted by: {submitterName}\n\nView event: {recordUrl}",
            &text_args,
        ),
    }
}

/// Where and as what a user was added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InviteDetails {
    pub site_name: String,
    pub country_name: String,
    pub account_type: String,
    pub role: String,
    pub url: String,
}

/// Email telling a user they were added to a country account.
pub fn render_invite(t: &Translator, to: &str, details: &InviteDetails) -> Email {
    let text_args: [(&str, &dyn Display); 5] = [
        ("siteName", &details.site_name),
        ("role", &details.role),
        ("countryName", &details.country_name),
        ("countryAccountType", &details.account_type),
        ("url", &details.url),
    ];
    let escaped = [
        html_escape(&details.site_name),
        html_escape(&details.role),
        html_escape(&details.country_name),
        html_escape(&details.account_type),
        html_escape(&details.url),
    ];
    let html_args: Vec<(&str, &dyn Display)> = text_args
        .iter()
        .zip(escaped.iter())
        .map(|((key, _), value)| (*key, value as &dyn Display))
        .collect();

    Email {
        to: to.to_string(),
        subject: t.t_with(
            "user_invite.email_subject",
            "Invitation to join DELTA Resilience {siteName}",
            &text_args,
        ),
        html: t.t_with(
            "user_invite.email_html",
            "<p>You have been added to the DELTA Resilience {siteName} system as a/an {role} user for the country {countryName} {countryAccountType} instance.</p><p><a href=\"{url}\">{url}</a></p>",
            &html_args,
        ),
        text: t.t_with(
            "user_invite.email_text",
            "You have been added to the DELTA Resilience {siteName} system as a/an {role} user for the country {countryName} {countryAccountType} instance.\n\n{url}",
            &text_args,
        ),
    }
}

pub async fn find_users(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<User>, AppError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT id, first_name, last_name, email FROM users WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(conn)
    .await?;
    Ok(users)
}

/// Name of the most specific HIP classification set on the record:
/// hazard, then cluster, then type.
pub async fn hip_event_name(conn: &mut PgConnection, record: &Value, t: &Translator<'_>) -> Result<String, AppError> {
    let lookups = [
        ("hip_hazard_id", "SELECT name FROM hip_hazards WHERE id = $1"),
        ("hip_cluster_id", "SELECT name FROM hip_clusters WHERE id = $1"),
        ("hip_type_id", "SELECT name FROM hip_types WHERE id = $1"),
    ];
    for (key, sql) in lookups {
        let Some(id) = record.get(key).and_then(Value::as_str) else {
            continue;
        };
        let name: Option<Value> = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        if let Some(name) = name {
            let name = t.dbt(&name);
            if !name.is_empty() {
                return Ok(name);
            }
        }
    }
    Ok(String::new())
}

/// Send every email, logging failures without stopping.
pub async fn send_all(mailer: &dyn Mailer, emails: Vec<Email>) {
    for email in emails {
        if let Err(e) = mailer.send(&email).await {
            tracing::error!(to = %email.to, subject = %email.subject, error = %e, "failed to send email");
        }
    }
}
