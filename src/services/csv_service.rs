//! CSV import and export for resources.
//!
//! The first row is the header; each header names a field key or `id`.
//! Imports run in the caller's transaction and stop at the first failing
//! row, reporting its 1-based line number (the header is line 1).

use std::collections::HashSet;
use std::str::FromStr;

use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    error::AppError,
    forms::{Record, ResourceDef},
    i18n::Translator,
    middleware::auth::AuthContext,
    services::resource_service,
    store,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportType {
    Create,
    Update,
    /// Update the row with the same `api_import_id`, or create it
    Upsert,
}

impl ImportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportType::Create => "create",
            ImportType::Update => "update",
            ImportType::Upsert => "upsert",
        }
    }
}

impl FromStr for ImportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "create" => Ok(ImportType::Create),
            "update" => Ok(ImportType::Update),
            "upsert" => Ok(ImportType::Upsert),
            other => Err(format!("Unknown import type: {other}")),
        }
    }
}

/// One data row, ready to write.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    /// 1-based line in the file
    pub line: usize,
    /// Present on update imports
    pub id: Option<Uuid>,
    pub record: Record,
}

fn csv_error(line: usize, message: impl Into<String>) -> AppError {
    AppError::Csv {
        line,
        message: message.into(),
        errors: None,
    }
}

/// Read every row as strings. Rows may have differing lengths.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, AppError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            let line = e.position().map_or(index + 1, |p| p.line() as usize);
            csv_error(line, format!("Invalid CSV: {e}"))
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Check the header and turn data rows into records.
///
/// Blank rows are skipped. `update` needs an `id` column with a UUID in
/// every row; `upsert` needs `api_import_id` on resources that have it.
pub fn rows_to_records(
    def: &ResourceDef,
    import_type: ImportType,
    rows: Vec<Vec<String>>,
    t: &Translator,
) -> Result<Vec<CsvRow>, AppError> {
    let mut rows = rows.into_iter();
    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| csv_error(1, t.t("csv.empty_file", "The file is empty")))?
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();

    for key in &header {
        if key != "id" && def.field(key).is_none() {
            return Err(csv_error(
                1,
                t.t_with("csv.unknown_column", "Unknown column: {column}", &[("column", key)]),
            ));
        }
    }
    let mut seen = HashSet::new();
    if let Some(key) = header.iter().find(|key| !seen.insert(key.as_str())) {
        return Err(csv_error(
            1,
            t.t_with("csv.duplicate_column", "Duplicate column: {column}", &[("column", key)]),
        ));
    }
    let id_column = header.iter().position(|h| h == "id");

    match import_type {
        ImportType::Update if id_column.is_none() => {
            return Err(csv_error(1, t.t("csv.id_required", "Column id is required for updates")));
        }
        ImportType::Upsert if !def.has_import_id() => {
            return Err(csv_error(
                1,
                t.t("csv.upsert_unsupported", "This resource does not support upsert"),
            ));
        }
        ImportType::Upsert if !header.iter().any(|h| h == "api_import_id") => {
            return Err(csv_error(
                1,
                t.t("csv.import_id_required", "Column api_import_id is required for upsert"),
            ));
        }
        _ => {}
    }

    let mut out = Vec::new();
    for (index, cells) in rows.enumerate() {
        let line = index + 2;
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        if cells.len() > header.len() {
            return Err(csv_error(line, t.t("csv.too_many_cells", "Row has more cells than the header")));
        }

        let mut id = None;
        let mut record = Record::new();
        for (key, cell) in header.iter().zip(cells.iter()) {
            if key == "id" {
                if import_type == ImportType::Update {
                    id = Some(
                        Uuid::parse_str(cell.trim())
                            .map_err(|_| csv_error(line, t.t("validation.invalid_uuid", "Invalid UUID")))?,
                    );
                }
                continue;
            }
            record.insert(key.clone(), Value::String(cell.clone()));
        }

        if import_type == ImportType::Upsert
            && record
                .get("api_import_id")
                .and_then(Value::as_str)
                .is_none_or(|s| s.trim().is_empty())
        {
            return Err(csv_error(
                line,
                t.t("csv.import_id_missing", "api_import_id is required for upsert"),
            ));
        }

        out.push(CsvRow { line, id, record });
    }
    Ok(out)
}

/// Attach the line number to a row failure.
fn row_error(line: usize, error: AppError, t: &Translator) -> AppError {
    match error {
        AppError::Validation(errors) => AppError::Csv {
            line,
            message: t.t("csv.row_invalid", "Row failed validation"),
            errors: Some(errors),
        },
        AppError::NotFound(what) => csv_error(line, format!("{what} not found")),
        AppError::Conflict(message) | AppError::InvalidRequest(message) => csv_error(line, message),
        AppError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => csv_error(
            line,
            t.t("csv.duplicate", "A record with the same identifier already exists"),
        ),
        AppError::Database(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => csv_error(
            line,
            t.t("csv.invalid_reference", "A referenced record does not exist"),
        ),
        other => other,
    }
}

/// Write parsed rows; returns how many were imported.
pub async fn import(
    conn: &mut PgConnection,
    def: &ResourceDef,
    auth: &AuthContext,
    import_type: ImportType,
    rows: Vec<CsvRow>,
    t: &Translator<'_>,
) -> Result<usize, AppError> {
    let mut imported = 0;
    for row in rows {
        let line = row.line;
        let result = match import_type {
            ImportType::Create => resource_service::create(&mut *conn, def, auth, row.record, t)
                .await
                .map(|_| ()),
            ImportType::Update => match row.id {
                Some(id) => resource_service::update(&mut *conn, def, auth, id, row.record, t).await,
                None => Err(csv_error(line, t.t("csv.id_missing", "id is required for updates"))),
            },
            ImportType::Upsert => {
                let import_id = row
                    .record
                    .get("api_import_id")
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                match store::id_by_import_id(&mut *conn, def, auth.country_accounts_id, &import_id).await {
                    Ok(Some(id)) => resource_service::update(&mut *conn, def, auth, id, row.record, t).await,
                    Ok(None) => resource_service::create(&mut *conn, def, auth, row.record, t)
                        .await
                        .map(|_| ()),
                    Err(e) => Err(e),
                }
            }
        };
        result.map_err(|e| row_error(line, e, t))?;
        imported += 1;
    }

    tracing::info!(
        resource = def.name,
        import_type = import_type.as_str(),
        imported,
        user_id = %auth.user_id,
        "csv import finished"
    );
    Ok(imported)
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Header columns of an export.
pub fn export_columns(def: &ResourceDef) -> Vec<&'static str> {
    let mut columns = vec!["id"];
    columns.extend(def.fields.iter().map(|f| f.key));
    if def.has_approval {
        columns.push("approval_status");
    }
    columns
}

/// Render rows (JSON objects) as CSV.
pub fn export(def: &ResourceDef, rows: &[Value]) -> Result<String, AppError> {
    let columns = export_columns(def);
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_row(&mut writer, columns.iter().map(|c| c.to_string()))?;
    for row in rows {
        write_row(&mut writer, columns.iter().map(|c| cell(row.get(*c))))?;
    }
    finish(writer)
}

/// Header and one sample row for the given import type.
pub fn example(def: &ResourceDef, import_type: ImportType) -> Result<String, AppError> {
    if import_type == ImportType::Upsert && !def.has_import_id() {
        return Err(AppError::NotFound("Import example"));
    }
    let mut header = Vec::new();
    let mut sample = Vec::new();
    if import_type == ImportType::Update {
        header.push("id".to_string());
        sample.push(Uuid::nil().to_string());
    }
    for field in def.fields {
        header.push(field.key.to_string());
        sample.push(if field.key == "api_import_id" {
            "import-1".to_string()
        } else {
            field.kind.sample().to_string()
        });
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    write_row(&mut writer, header)?;
    write_row(&mut writer, sample)?;
    finish(writer)
}

fn write_row(writer: &mut csv::Writer<Vec<u8>>, cells: impl IntoIterator<Item = String>) -> Result<(), AppError> {
    writer
        .write_record(cells)
        .map_err(|e| AppError::Internal(format!("failed to write csv: {e}")))
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, AppError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("failed to write csv: {e}")))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("csv output is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::{self, resources};
    use crate::i18n::Translations;
    use serde_json::json;

    fn rows(text: &str) -> Vec<Vec<String>> {
        parse_csv(text.as_bytes()).unwrap()
    }

    #[test]
    fn parses_quoted_cells_and_bom() {
        let parsed = rows("\u{feff}name,notes\n\"Bridge, north\",\"said \"\"hi\"\"\"\n");
        assert_eq!(parsed[0], vec!["name", "notes"]);
        assert_eq!(parsed[1], vec!["Bridge, north", "said \"hi\""]);
    }

    #[test]
    fn records_skip_blank_rows_and_track_lines() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        let parsed = rows("name,notes\nA,x\n,\nB,y\n");
        let records = rows_to_records(&resources::ASSETS, ImportType::Create, parsed, &t).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, 2);
        assert_eq!(records[1].line, 4);
        assert_eq!(records[1].record["name"], json!("B"));
    }

    #[test]
    fn unknown_header_is_line_one() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        let err = rows_to_records(&resources::ASSETS, ImportType::Create, rows("name,colour\nA,red\n"), &t)
            .unwrap_err();
        assert!(matches!(err, AppError::Csv { line: 1, ref message, .. } if message == "Unknown column: colour"));
    }

    #[test]
    fn duplicate_header_is_line_one() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        let err = rows_to_records(
            &resources::ASSETS,
            ImportType::Create,
            rows("name,notes,name\nA,x,B\n"),
            &t,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Csv { line: 1, ref message, .. } if message == "Duplicate column: name"));
    }

    #[test]
    fn update_requires_ids() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        let err = rows_to_records(&resources::ASSETS, ImportType::Update, rows("name\nA\n"), &t).unwrap_err();
        assert!(matches!(err, AppError::Csv { line: 1, .. }));

        let err = rows_to_records(&resources::ASSETS, ImportType::Update, rows("id,name\nnope,A\n"), &t)
            .unwrap_err();
        assert!(matches!(err, AppError::Csv { line: 2, .. }));

        let id = Uuid::new_v4();
        let ok = rows_to_records(
            &resources::ASSETS,
            ImportType::Update,
            rows(&format!("id,name\n{id},A\n")),
            &t,
        )
        .unwrap();
        assert_eq!(ok[0].id, Some(id));
        assert!(!ok[0].record.contains_key("id"));
    }

    #[test]
    fn upsert_rules() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        assert!(rows_to_records(&resources::SECTORS, ImportType::Upsert, rows("name\nx\n"), &t).is_err());
        assert!(rows_to_records(&resources::ASSETS, ImportType::Upsert, rows("name\nx\n"), &t).is_err());
        let err = rows_to_records(
            &resources::ASSETS,
            ImportType::Upsert,
            rows("api_import_id,name\n,x\n"),
            &t,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Csv { line: 2, .. }));
    }

    #[test]
    fn row_errors_carry_line_and_fields() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        let err = row_error(
            7,
            AppError::Validation(crate::error::FieldErrors::single("name", "Field is required.")),
            &t,
        );
        match err {
            AppError::Csv { line, errors: Some(errors), .. } => {
                assert_eq!(line, 7);
                assert!(errors.fields.contains_key("name"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn export_flattens_json() {
        let rows = vec![json!({
            "id": "1",
            "name": "Bridge",
            "sector_id": null,
            "notes": "a,b",
            "country_accounts_id": "hidden"
        })];
        let out = export(&resources::ASSETS, &rows).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("id,api_import_id,name,sector_id,category,national_id,notes")
        );
        assert_eq!(lines.next(), Some("1,,Bridge,,,,\"a,b\""));
    }

    #[test]
    fn exported_money_reimports_exactly() {
        let rows = vec![json!({
            "id": "1",
            "pd_repair_cost_unit": "0.10",
            "pd_repair_cost_total": "12345678901234567.89"
        })];
        let out = export(&resources::DAMAGES, &rows).unwrap();
        let parsed = parse_csv(out.as_bytes()).unwrap();
        let def = &resources::DAMAGES;
        for (key, expected) in [("pd_repair_cost_unit", "0.10"), ("pd_repair_cost_total", "12345678901234567.89")] {
            let column = parsed[0].iter().position(|h| h == key).unwrap();
            let cell = &parsed[1][column];
            assert_eq!(cell, expected);
            let field = def.field(key).unwrap();
            assert_eq!(
                forms::coerce(field, &Value::String(cell.clone())),
                Ok(Some(expected.to_string()))
            );
        }
    }

    #[test]
    fn export_adds_approval_status() {
        let columns = export_columns(&resources::HAZARDOUS_EVENTS);
        assert_eq!(columns.first(), Some(&"id"));
        assert_eq!(columns.last(), Some(&"approval_status"));
    }

    #[test]
    fn example_rows() {
        let out = example(&resources::ORGANIZATIONS, ImportType::Create).unwrap();
        assert_eq!(out, "name,description\ntext,text\n");

        let out = example(&resources::ORGANIZATIONS, ImportType::Update).unwrap();
        assert!(out.starts_with("id,name,description\n00000000-0000-0000-0000-000000000000,"));

        assert!(matches!(
            example(&resources::ORGANIZATIONS, ImportType::Upsert),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn import_type_parsing() {
        assert_eq!("upsert".parse::<ImportType>(), Ok(ImportType::Upsert));
        assert!("merge".parse::<ImportType>().is_err());
    }
}
