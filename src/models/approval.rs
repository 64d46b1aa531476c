//! Approval workflow model.
//!
//! Hazardous events, disaster events and disaster records move through
//! `draft -> waiting-for-validation -> validated -> published`, with
//! `needs-revision` as the way back after a rejection.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::Permission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    Draft,
    WaitingForValidation,
    NeedsRevision,
    Validated,
    Published,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Draft => "draft",
            ApprovalStatus::WaitingForValidation => "waiting-for-validation",
            ApprovalStatus::NeedsRevision => "needs-revision",
            ApprovalStatus::Validated => "validated",
            ApprovalStatus::Published => "published",
        }
    }

    /// Deleting a record in this status needs `DeleteValidatedData`.
    pub fn is_protected(&self) -> bool {
        matches!(self, ApprovalStatus::Validated | ApprovalStatus::Published)
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ApprovalStatus::Draft),
            "waiting-for-validation" => Ok(ApprovalStatus::WaitingForValidation),
            "needs-revision" => Ok(ApprovalStatus::NeedsRevision),
            "validated" => Ok(ApprovalStatus::Validated),
            "published" => Ok(ApprovalStatus::Published),
            other => Err(format!("unknown approval status: {other}")),
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalAction {
    SubmitValidation,
    SubmitDraft,
    SubmitValidate,
    Validate,
    Reject,
    Publish,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::SubmitValidation => "submit-validation",
            ApprovalAction::SubmitDraft => "submit-draft",
            ApprovalAction::SubmitValidate => "submit-validate",
            ApprovalAction::Validate => "validate",
            ApprovalAction::Reject => "reject",
            ApprovalAction::Publish => "publish",
        }
    }

    pub fn required_permission(&self) -> Permission {
        match self {
            ApprovalAction::SubmitValidation | ApprovalAction::SubmitDraft => Permission::EditData,
            ApprovalAction::SubmitValidate
            | ApprovalAction::Validate
            | ApprovalAction::Reject
            | ApprovalAction::Publish => Permission::ValidateData,
        }
    }

    /// Status reached by applying this action to a record in `from`, or
    /// `None` when the action is not available there.
    pub fn target(&self, from: ApprovalStatus) -> Option<ApprovalStatus> {
        use ApprovalStatus::*;
        match (self, from) {
            (ApprovalAction::SubmitValidation, Draft | NeedsRevision) => Some(WaitingForValidation),
            (ApprovalAction::SubmitDraft, Published) => None,
            (ApprovalAction::SubmitDraft, _) => Some(Draft),
            (ApprovalAction::SubmitValidate, Draft | NeedsRevision) => Some(Validated),
            (ApprovalAction::Validate, WaitingForValidation) => Some(Validated),
            (ApprovalAction::Reject, WaitingForValidation | Validated) => Some(NeedsRevision),
            (ApprovalAction::Publish, WaitingForValidation | Validated) => Some(Published),
            _ => None,
        }
    }
}

/// Record types that carry approval columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalEntity {
    HazardousEvent,
    DisasterEvent,
    DisasterRecord,
}

impl ApprovalEntity {
    /// Value stored in `entity_type` columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalEntity::HazardousEvent => "hazardous_event",
            ApprovalEntity::DisasterEvent => "disaster_event",
            ApprovalEntity::DisasterRecord => "disaster_record",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            ApprovalEntity::HazardousEvent => "hazardous_events",
            ApprovalEntity::DisasterEvent => "disaster_events",
            ApprovalEntity::DisasterRecord => "disaster_records",
        }
    }

    /// Path segment of the record's page in the web UI.
    pub fn url_segment(&self) -> &'static str {
        match self {
            ApprovalEntity::HazardousEvent => "hazardous-event",
            ApprovalEntity::DisasterEvent => "disaster-event",
            ApprovalEntity::DisasterRecord => "disaster-record",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ApprovalEntity::HazardousEvent => "Hazardous event",
            ApprovalEntity::DisasterEvent => "Disaster event",
            ApprovalEntity::DisasterRecord => "Disaster record",
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        match table {
            "hazardous_events" => Some(ApprovalEntity::HazardousEvent),
            "disaster_events" => Some(ApprovalEntity::DisasterEvent),
            "disaster_records" => Some(ApprovalEntity::DisasterRecord),
            _ => None,
        }
    }
}

/// Approval columns of one record.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApprovalRow {
    pub id: Uuid,
    pub approval_status: String,
    pub submitted_by_user_id: Option<Uuid>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub validated_by_user_id: Option<Uuid>,
    pub validated_at: Option<DateTime<Utc>>,
    pub published_by_user_id: Option<Uuid>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Validator ids as sent by clients: an array or a comma-separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ValidatorIds {
    List(Vec<String>),
    Joined(String),
}

impl ValidatorIds {
    /// Trimmed, non-empty, de-duplicated ids in first-seen order.
    pub fn normalized(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            ValidatorIds::List(ids) => ids.iter().map(String::as_str).collect(),
            ValidatorIds::Joined(s) => s.split(',').collect(),
        };
        let mut out: Vec<String> = Vec::new();
        for id in raw.into_iter().map(str::trim).filter(|s| !s.is_empty()) {
            if !out.iter().any(|seen| seen == id) {
                out.push(id.to_string());
            }
        }
        out
    }
}

/// Body of `POST /api/v1/<entity>/{id}/approval`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalRequest {
    pub action: ApprovalAction,
    #[serde(default)]
    pub validator_user_ids: Option<ValidatorIds>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ValidationAssignment {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub assigned_to_user_id: Uuid,
    pub assigned_by_user_id: Uuid,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ValidationRejection {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub rejected_by_user_id: Uuid,
    pub rejection_message: String,
    pub rejected_at: DateTime<Utc>,
}
