//! Field-definition metadata shared by the CRUD endpoints, the CSV importer
//! and the data store.
//!
//! Every resource is described by a static [`ResourceDef`]. Incoming JSON
//! objects (or CSV rows) are checked against it by [`validate_record`], which
//! produces typed-but-textual values ready to be bound and cast in SQL.

pub mod dates;
pub mod resources;

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{error::FieldErrors, i18n::Translator, models::role::Permission};

/// A JSON object as received from a client or built from a CSV row.
pub type Record = Map<String, Value>;

/// Columns maintained by the approval workflow; never writable through CRUD.
pub const APPROVAL_COLUMNS: &[&str] = &[
    "approval_status",
    "submitted_by_user_id",
    "submitted_at",
    "validated_by_user_id",
    "validated_at",
    "published_by_user_id",
    "published_at",
];

/// Columns maintained by the store itself.
pub const SYSTEM_COLUMNS: &[&str] = &[
    "id",
    "country_accounts_id",
    "created_by_user_id",
    "updated_by_user_id",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// `yyyy`, `yyyy-mm` or `yyyy-mm-dd`
    Date,
    Timestamp,
    Int,
    /// Decimal amount, kept as text to avoid float rounding
    Money,
    Bool,
    Uuid,
    Json,
    Enum(&'static [&'static str]),
    /// Reference to a row of the given table in the same tenant
    Ref(&'static str),
    /// Language map such as `{"en": "Floods", "es": "Inundaciones"}`
    Translated,
}

impl FieldKind {
    /// Postgres type the bound text value is cast to.
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::Text | FieldKind::Date | FieldKind::Enum(_) => "TEXT",
            FieldKind::Timestamp => "TIMESTAMPTZ",
            FieldKind::Int => "BIGINT",
            FieldKind::Money => "NUMERIC",
            FieldKind::Bool => "BOOLEAN",
            FieldKind::Uuid | FieldKind::Ref(_) => "UUID",
            FieldKind::Json | FieldKind::Translated => "JSONB",
        }
    }

    /// Placeholder cell for the CSV import example.
    pub fn sample(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Date => "2024-01-31",
            FieldKind::Timestamp => "2024-01-31T00:00:00Z",
            FieldKind::Int => "0",
            FieldKind::Money => "1000.00",
            FieldKind::Bool => "false",
            FieldKind::Uuid | FieldKind::Ref(_) => "",
            FieldKind::Json => "{}",
            FieldKind::Enum(values) => values.first().copied().unwrap_or(""),
            FieldKind::Translated => r#"{"en":"Name"}"#,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub key: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldDef {
    pub const fn new(key: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            kind,
            required: false,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Static description of one CRUD resource.
#[derive(Debug)]
pub struct ResourceDef {
    /// URL segment, e.g. `hazardous-events`
    pub name: &'static str,
    /// Singular label used in messages
    pub label: &'static str,
    pub table: &'static str,
    pub fields: &'static [FieldDef],
    pub has_approval: bool,
    /// Start and end keys compared when both are supplied
    pub date_range: Option<(&'static str, &'static str)>,
    /// Resource carries `hip_type_id`, `hip_cluster_id`, `hip_hazard_id`
    pub has_hip: bool,
    /// Accepts a `parent` key stored as a causality relation
    pub has_event_parent: bool,
    pub search_column: Option<&'static str>,
    pub order_by: &'static str,
    pub edit_permission: Permission,
}

impl ResourceDef {
    pub fn field(&self, key: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn has_import_id(&self) -> bool {
        self.field("api_import_id").is_some()
    }
}

/// Which checks apply to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    /// Only supplied keys are checked
    Update,
}

/// A validated value ready for SQL; `None` binds NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub field: &'static FieldDef,
    pub value: Option<String>,
}

/// Why a single value was rejected: translation code and default text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldIssue {
    pub code: &'static str,
    pub message: &'static str,
}

const fn issue(code: &'static str, message: &'static str) -> FieldIssue {
    FieldIssue { code, message }
}

/// Convert one JSON value into the textual form bound in SQL.
///
/// Null and blank strings become `None`. Numbers and booleans are accepted
/// as strings too, since CSV cells always arrive as text.
pub fn coerce(field: &FieldDef, value: &Value) -> Result<Option<String>, FieldIssue> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    };

    match field.kind {
        FieldKind::Text => match value {
            Value::String(_) => Ok(text),
            Value::Number(n) => Ok(Some(n.to_string())),
            Value::Bool(b) => Ok(Some(b.to_string())),
            _ => Err(issue("validation.expected_text", "Expected text")),
        },
        FieldKind::Date => {
            let s = text.ok_or(issue("validation.invalid_date", "Invalid date"))?;
            dates::normalize_date_for_comparison(&s)
                .map(|_| Some(s))
                .ok_or(issue("validation.invalid_date", "Invalid date"))
        }
        FieldKind::Timestamp => {
            let s = text.ok_or(issue("validation.invalid_timestamp", "Invalid date and time"))?;
            if DateTime::parse_from_rfc3339(&s).is_ok()
                || NaiveDate::parse_from_str(&s, "%Y-%m-%d").is_ok()
            {
                Ok(Some(s))
            } else {
                Err(issue("validation.invalid_timestamp", "Invalid date and time"))
            }
        }
        FieldKind::Int => {
            let invalid = issue("validation.invalid_integer", "Must be a whole number");
            match value {
                Value::Number(n) => n.as_i64().map(|n| Some(n.to_string())).ok_or(invalid),
                _ => text
                    .and_then(|s| s.parse::<i64>().ok())
                    .map(|n| Some(n.to_string()))
                    .ok_or(invalid),
            }
        }
        FieldKind::Money => {
            let invalid = issue("validation.invalid_number", "Must be a number");
            let s = match value {
                Value::Number(n) => n.to_string(),
                _ => text.ok_or(invalid)?,
            };
            if is_decimal(&s) { Ok(Some(s)) } else { Err(invalid) }
        }
        FieldKind::Bool => {
            let parsed = match value {
                Value::Bool(b) => Some(*b),
                _ => text.and_then(|s| match s.to_lowercase().as_str() {
                    "true" | "1" | "yes" => Some(true),
                    "false" | "0" | "no" => Some(false),
                    _ => None,
                }),
            };
            parsed
                .map(|b| Some(b.to_string()))
                .ok_or(issue("validation.invalid_boolean", "Must be true or false"))
        }
        FieldKind::Uuid | FieldKind::Ref(_) => text
            .and_then(|s| Uuid::parse_str(&s).ok())
            .map(|id| Some(id.to_string()))
            .ok_or(issue("validation.invalid_uuid", "Invalid UUID")),
        FieldKind::Json => match value {
            Value::String(s) => serde_json::from_str::<Value>(s)
                .map(|v| Some(v.to_string()))
                .map_err(|_| issue("validation.invalid_json", "Invalid JSON")),
            other => Ok(Some(other.to_string())),
        },
        FieldKind::Translated => {
            let map = match value {
                Value::Object(map) => map.clone(),
                Value::String(s) => match serde_json::from_str::<Value>(s) {
                    Ok(Value::Object(map)) => map,
                    _ => Map::from_iter([("en".to_string(), Value::String(s.trim().to_string()))]),
                },
                _ => return Err(issue("validation.invalid_translation", "Expected a language map")),
            };
            if map.values().all(Value::is_string) {
                Ok(Some(Value::Object(map).to_string()))
            } else {
                Err(issue("validation.invalid_translation", "Expected a language map"))
            }
        }
        FieldKind::Enum(allowed) => {
            let s = text.ok_or(issue("validation.invalid_option", "Not an allowed value"))?;
            if allowed.contains(&s.as_str()) {
                Ok(Some(s))
            } else {
                Err(issue("validation.invalid_option", "Not an allowed value"))
            }
        }
    }
}

fn is_decimal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut parts = digits.splitn(2, '.');
    let int = parts.next().unwrap_or("");
    let frac = parts.next();
    !int.is_empty()
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.is_none_or(|f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

/// Check `record` against `def` and return the values to write.
///
/// Unknown keys, system columns and approval columns are rejected. In
/// [`Mode::Create`] every required field must be present; in
/// [`Mode::Update`] required fields may not be set to null.
pub fn validate_record(
    def: &ResourceDef,
    record: &Record,
    mode: Mode,
    t: &Translator,
) -> Result<Vec<FieldValue>, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut values = Vec::new();
    let required_msg = || t.t("validation.required", "Field is required.");

    for key in record.keys() {
        if def.field(key).is_some() {
            continue;
        }
        if APPROVAL_COLUMNS.contains(&key.as_str()) {
            errors.add_field(
                key,
                t.t(
                    "validation.approval_column",
                    "Approval status can only be changed through the approval workflow",
                ),
            );
        } else if SYSTEM_COLUMNS.contains(&key.as_str()) {
            errors.add_field(key, t.t("validation.read_only", "Field is read-only"));
        } else {
            errors.add_field(key, t.t("validation.unknown_field", "Unknown field"));
        }
    }

    for field in def.fields {
        let Some(raw) = record.get(field.key) else {
            if mode == Mode::Create && field.required {
                errors.add_field(field.key, required_msg());
            }
            continue;
        };
        match coerce(field, raw) {
            Ok(None) if field.required => errors.add_field(field.key, required_msg()),
            Ok(value) => values.push(FieldValue { field, value }),
            Err(e) => errors.add_field(field.key, t.t(e.code, e.message)),
        }
    }

    if let Some((start_key, end_key)) = def.date_range {
        check_date_range(record, &values, start_key, end_key, t, &mut errors);
    }
    if def.has_hip {
        check_hip(def, &mut values, t, &mut errors);
    }

    if errors.is_empty() { Ok(values) } else { Err(errors) }
}

fn value_of<'v>(values: &'v [FieldValue], key: &str) -> Option<&'v str> {
    values
        .iter()
        .find(|v| v.field.key == key)
        .and_then(|v| v.value.as_deref())
}

/// When either end of the range is set both keys must be supplied, and the
/// start may not be after the end.
fn check_date_range(
    record: &Record,
    values: &[FieldValue],
    start_key: &str,
    end_key: &str,
    t: &Translator,
    errors: &mut FieldErrors,
) {
    let start = value_of(values, start_key);
    let end = value_of(values, end_key);
    if start.is_none() && end.is_none() {
        return;
    }

    for key in [start_key, end_key] {
        if !record.contains_key(key) {
            errors.add_field(
                key,
                t.t(
                    "validation.required_or_null",
                    "Field is required. Otherwise set the value to null.",
                ),
            );
        }
    }

    if let (Some(start), Some(end)) = (start, end) {
        let parsed = (
            dates::normalize_date_for_comparison(start),
            dates::normalize_date_for_comparison(end),
        );
        if matches!(parsed, (Some(s), Some(e)) if s > e) {
            errors.add_field(
                start_key,
                t.t_with(
                    "validation.start_before_end",
                    "Field {start} must be before {end}.",
                    &[("start", &start_key), ("end", &end_key)],
                ),
            );
        }
    }
}

/// Hazard needs a cluster and a cluster needs a type. Supplying any of the
/// three writes all three, clearing the ones left out.
fn check_hip(def: &ResourceDef, values: &mut Vec<FieldValue>, t: &Translator, errors: &mut FieldErrors) {
    const KEYS: [&str; 3] = ["hip_type_id", "hip_cluster_id", "hip_hazard_id"];
    if !values.iter().any(|v| KEYS.contains(&v.field.key)) {
        return;
    }
    for key in KEYS {
        if values.iter().any(|v| v.field.key == key) {
            continue;
        }
        if let Some(field) = def.field(key) {
            values.push(FieldValue { field, value: None });
        }
    }

    let hazard = value_of(values, "hip_hazard_id");
    let cluster = value_of(values, "hip_cluster_id");
    let type_id = value_of(values, "hip_type_id");
    if hazard.is_some() && cluster.is_none() {
        errors.add_field(
            "hip_hazard_id",
            t.t("validation.hip_cluster_required", "HIP cluster is required"),
        );
    }
    if cluster.is_some() && type_id.is_none() {
        errors.add_field(
            "hip_hazard_id",
            t.t("validation.hip_type_required", "HIP type is required"),
        );
    }
}
