//! Service and router tests against a real PostgreSQL.
//!
//! Uses `TEST_DATABASE_URL` when set, otherwise starts a throwaway
//! `postgres:16-alpine` container. When neither is available (no Docker on
//! the host) each test prints a notice and returns early.
//!
//! Every test bootstraps its own country accounts, so tests can share one
//! database and run in parallel.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::IntoResponse,
};
use delta_resilience::{
    build_router,
    config::Config,
    db,
    error::AppError,
    forms::{Record, ResourceDef, resources},
    i18n::Translations,
    middleware::auth::AuthContext,
    models::{
        approval::{ApprovalAction, ApprovalEntity, ApprovalRequest, ValidatorIds},
        role::Role,
        user::InviteUserRequest,
    },
    services::{
        access_service::{self, BootstrapRequest, Bootstrapped},
        approval_service, csv_service,
        csv_service::ImportType,
        email_service::{self, Email, Mailer},
        event_service, resource_service,
    },
    state::AppState,
    store,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use testcontainers_modules::{
    postgres::Postgres,
    testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner},
};
use tower::ServiceExt;
use uuid::Uuid;

/// Keeps every email instead of sending it.
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
}

impl RecordingMailer {
    fn sent_to(&self, address: &str) -> Vec<Email> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.to == address)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> email_service::Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

struct TestDb {
    state: AppState,
    mailer: Arc<RecordingMailer>,
    _container: Option<ContainerAsync<Postgres>>,
}

impl TestDb {
    async fn start() -> Option<Self> {
        let (url, container) = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => (url, None),
            Err(_) => match Postgres::default().with_tag("16-alpine").start().await {
                Ok(container) => {
                    let host = container.get_host().await.unwrap();
                    let port = container.get_host_port_ipv4(5432).await.unwrap();
                    (
                        format!("postgres://postgres:postgres@{host}:{port}/postgres"),
                        Some(container),
                    )
                }
                Err(e) => {
                    eprintln!("skipping: no TEST_DATABASE_URL and no container runtime ({e})");
                    return None;
                }
            },
        };

        let pool = db::create_pool(&url, 5).await.expect("connect");
        db::run_migrations(&pool).await.expect("migrations");

        let config = Config::for_tests(&url);
        let locales = concat!(env!("CARGO_MANIFEST_DIR"), "/locales");
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState {
            pool,
            translations: Arc::new(Translations::load_dir(locales, &config.default_lang)),
            config: Arc::new(config),
            mailer: mailer.clone(),
        };
        Some(Self {
            state,
            mailer,
            _container: container,
        })
    }

    fn app(&self) -> Router {
        build_router(self.state.clone())
    }

    async fn tenant(&self, country: &str) -> (Bootstrapped, AuthContext) {
        let request = BootstrapRequest {
            country_name: country.to_string(),
            admin_email: unique_email("admin"),
            first_name: "Ada".to_string(),
            last_name: "Admin".to_string(),
            key_name: "tests".to_string(),
        };
        let mut tx = self.state.pool.begin().await.unwrap();
        let created = access_service::bootstrap_tenant(&mut tx, &request).await.unwrap();
        tx.commit().await.unwrap();

        let auth = AuthContext {
            api_key_id: created.api_key_id,
            user_id: created.user_id,
            country_accounts_id: created.country_accounts_id,
            role: Role::Admin,
        };
        (created, auth)
    }

    /// Add a member to the admin's tenant and return an auth context for them.
    async fn member(&self, admin: &AuthContext, role: Role) -> (AuthContext, String) {
        let email = unique_email(role.as_str());
        let request = InviteUserRequest {
            email: email.clone(),
            first_name: "Vera".to_string(),
            last_name: role.as_str().to_string(),
            organization: "Civil Protection".to_string(),
            role: role.as_str().to_string(),
        };
        let t = self.state.translator("en", false);
        let mut tx = self.state.pool.begin().await.unwrap();
        let invited = access_service::invite(&mut tx, admin, request, &t).await.unwrap();
        tx.commit().await.unwrap();

        let auth = AuthContext {
            api_key_id: Uuid::new_v4(),
            user_id: invited.member.id,
            country_accounts_id: admin.country_accounts_id,
            role,
        };
        (auth, email)
    }

    async fn create(&self, def: &ResourceDef, auth: &AuthContext, body: Value) -> Result<Uuid, AppError> {
        let t = self.state.translator("en", false);
        let mut tx = self.state.pool.begin().await?;
        let id = resource_service::create(&mut tx, def, auth, record(body), &t).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn count(&self, table: &str, tenant: Uuid) -> i64 {
        sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {table} WHERE country_accounts_id = $1"
        ))
        .bind(tenant)
        .fetch_one(&self.state.pool)
        .await
        .unwrap()
    }
}

macro_rules! test_db {
    () => {
        match TestDb::start().await {
            Some(db) => db,
            None => return,
        }
    };
}

fn unique_email(prefix: &str) -> String {
    format!("{prefix}.{}@example.org", Uuid::new_v4().simple())
}

fn record(body: Value) -> Record {
    match body {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn field_errors(err: &AppError) -> Vec<String> {
    match err {
        AppError::Validation(errors) => errors.fields.keys().cloned().collect(),
        other => panic!("expected validation error, got {other:?}"),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn disaster_record(db: &TestDb, auth: &AuthContext) -> Uuid {
    db.create(
        &resources::DISASTER_RECORDS,
        auth,
        json!({ "originator_recorder_inst": "National Disaster Office", "start_date": "2024-03-01" }),
    )
    .await
    .unwrap()
}

fn approval(action: ApprovalAction) -> ApprovalRequest {
    ApprovalRequest {
        action,
        validator_user_ids: None,
        comment: None,
    }
}

#[tokio::test]
async fn record_moves_from_submission_to_publication() {
    let db = test_db!();
    let (_, admin) = db.tenant("Chile").await;
    let (collector, _) = db.member(&admin, Role::DataCollector).await;
    let (validator, validator_email) = db.member(&admin, Role::DataValidator).await;
    let t = db.state.translator("en", false);
    let entity = ApprovalEntity::DisasterRecord;

    let id = disaster_record(&db, &collector).await;

    let submit = ApprovalRequest {
        validator_user_ids: Some(ValidatorIds::Joined(format!(" {} ,", validator.user_id))),
        ..approval(ApprovalAction::SubmitValidation)
    };
    let row = approval_service::apply_action(&db.state, &collector, entity, id, submit, &t)
        .await
        .unwrap();
    assert_eq!(row.approval_status, "waiting-for-validation");
    assert_eq!(row.submitted_by_user_id, Some(collector.user_id));

    let mut conn = db.state.pool.acquire().await.unwrap();
    let waiting = approval_service::assignments_for(&mut conn, admin.country_accounts_id, validator.user_id)
        .await
        .unwrap();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].entity_id, id);
    assert_eq!(db.mailer.sent_to(&validator_email).len(), 1);

    let err = approval_service::apply_action(&db.state, &collector, entity, id, approval(ApprovalAction::Validate), &t)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let row = approval_service::apply_action(&db.state, &validator, entity, id, approval(ApprovalAction::Validate), &t)
        .await
        .unwrap();
    assert_eq!(row.approval_status, "validated");
    assert_eq!(row.validated_by_user_id, Some(validator.user_id));
    let waiting = approval_service::assignments_for(&mut conn, admin.country_accounts_id, validator.user_id)
        .await
        .unwrap();
    assert!(waiting.is_empty());

    let row = approval_service::apply_action(&db.state, &validator, entity, id, approval(ApprovalAction::Publish), &t)
        .await
        .unwrap();
    assert_eq!(row.approval_status, "published");
    assert_eq!(row.published_by_user_id, Some(validator.user_id));

    let err = approval_service::apply_action(&db.state, &validator, entity, id, approval(ApprovalAction::Validate), &t)
        .await
        .unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::CONFLICT);

    let actions: Vec<String> = sqlx::query_scalar(
        "SELECT action FROM audit_logs WHERE table_name = 'disaster_records' AND record_id = $1 ORDER BY timestamp",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .unwrap();
    assert_eq!(actions, ["create", "submit-validation", "validate", "publish"]);
}

#[tokio::test]
async fn rejection_needs_a_comment() {
    let db = test_db!();
    let (_, admin) = db.tenant("Peru").await;
    let (collector, collector_email) = db.member(&admin, Role::DataCollector).await;
    let (validator, _) = db.member(&admin, Role::DataValidator).await;
    let t = db.state.translator("en", false);
    let entity = ApprovalEntity::DisasterRecord;

    let id = disaster_record(&db, &collector).await;
    let submit = ApprovalRequest {
        validator_user_ids: Some(ValidatorIds::List(vec![validator.user_id.to_string()])),
        ..approval(ApprovalAction::SubmitValidation)
    };
    approval_service::apply_action(&db.state, &collector, entity, id, submit, &t)
        .await
        .unwrap();

    let blank = ApprovalRequest {
        comment: Some("   ".to_string()),
        ..approval(ApprovalAction::Reject)
    };
    let err = approval_service::apply_action(&db.state, &validator, entity, id, blank, &t)
        .await
        .unwrap_err();
    assert_eq!(field_errors(&err), ["comment"]);
    assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

    let mut conn = db.state.pool.acquire().await.unwrap();
    let stored = resource_service::get(&mut conn, &resources::DISASTER_RECORDS, admin.country_accounts_id, id)
        .await
        .unwrap();
    assert_eq!(stored["approval_status"], "waiting-for-validation");
    assert!(approval_service::rejections(&mut conn, admin.country_accounts_id, entity, id)
        .await
        .unwrap()
        .is_empty());

    let reject = ApprovalRequest {
        comment: Some("Location is missing".to_string()),
        ..approval(ApprovalAction::Reject)
    };
    let row = approval_service::apply_action(&db.state, &validator, entity, id, reject, &t)
        .await
        .unwrap();
    assert_eq!(row.approval_status, "needs-revision");

    let rejections = approval_service::rejections(&mut conn, admin.country_accounts_id, entity, id)
        .await
        .unwrap();
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].rejection_message, "Location is missing");
    assert_eq!(rejections[0].rejected_by_user_id, validator.user_id);

    let to_submitter = db.mailer.sent_to(&collector_email);
    assert_eq!(to_submitter.len(), 1);
    assert!(to_submitter[0].text.contains("Location is missing"));
}

#[tokio::test]
async fn references_stay_inside_the_tenant() {
    let db = test_db!();
    let (_, tenant_a) = db.tenant("Ecuador").await;
    let (_, tenant_b) = db.tenant("Bolivia").await;

    let foreign_sector = db
        .create(&resources::SECTORS, &tenant_b, json!({ "name": "Agriculture" }))
        .await
        .unwrap();
    let own_sector = db
        .create(&resources::SECTORS, &tenant_a, json!({ "name": "Energy" }))
        .await
        .unwrap();

    let err = db
        .create(
            &resources::ASSETS,
            &tenant_a,
            json!({ "name": "Irrigation canal", "sector_id": foreign_sector.to_string() }),
        )
        .await
        .unwrap_err();
    assert_eq!(field_errors(&err), ["sector_id"]);
    assert_eq!(db.count("assets", tenant_a.country_accounts_id).await, 0);

    let asset = db
        .create(
            &resources::ASSETS,
            &tenant_a,
            json!({ "name": "Substation", "sector_id": own_sector.to_string() }),
        )
        .await
        .unwrap();

    let mut conn = db.state.pool.acquire().await.unwrap();
    let err = resource_service::get(&mut conn, &resources::ASSETS, tenant_b.country_accounts_id, asset)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let filter = store::ListFilter::default();
    let page = store::list(
        &mut conn,
        &resources::SECTORS,
        tenant_a.country_accounts_id,
        &filter,
        Default::default(),
    )
    .await
    .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0]["id"], own_sector.to_string());
}

#[tokio::test]
async fn failing_csv_row_writes_nothing() {
    let db = test_db!();
    let (_, admin) = db.tenant("Colombia").await;
    let t = db.state.translator("en", false);
    let def = &resources::ASSETS;

    let csv = "name,notes\nPump station,north\n,no name\nWater tank,south\n";
    let rows = csv_service::parse_csv(csv.as_bytes()).unwrap();
    let rows = csv_service::rows_to_records(def, ImportType::Create, rows, &t).unwrap();
    assert_eq!(rows.len(), 3);

    let mut tx = db.state.pool.begin().await.unwrap();
    let err = csv_service::import(&mut tx, def, &admin, ImportType::Create, rows, &t)
        .await
        .unwrap_err();
    drop(tx);

    match &err {
        AppError::Csv { line, errors, .. } => {
            assert_eq!(*line, 3);
            let errors = errors.as_ref().unwrap();
            assert!(errors.fields.contains_key("name"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(db.count("assets", admin.country_accounts_id).await, 0);
}

#[tokio::test]
async fn csv_upload_commits_every_row() {
    let db = test_db!();
    let (created, admin) = db.tenant("Uruguay").await;

    let boundary = "delta-test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"import_type\"\r\n\r\n\
         create\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"assets.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         name,notes\nPump station,north\nWater tank,south\n\r\n\
         --{boundary}--\r\n"
    );
    let response = db
        .app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/assets/csv-import")
                .header(header::AUTHORIZATION, format!("Bearer {}", created.secret))
                .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["imported"], 2);
    assert_eq!(db.count("assets", admin.country_accounts_id).await, 2);
}

#[tokio::test]
async fn cyclic_event_parent_is_rejected() {
    let db = test_db!();
    let (_, admin) = db.tenant("Argentina").await;
    let t = db.state.translator("en", false);
    let def = &resources::HAZARDOUS_EVENTS;

    let e0 = db
        .create(def, &admin, json!({ "record_originator": "Met office", "description": "Heavy rain" }))
        .await
        .unwrap();
    let e1 = db
        .create(def, &admin, json!({ "record_originator": "Met office", "parent": e0.to_string() }))
        .await
        .unwrap();
    let e2 = db
        .create(def, &admin, json!({ "record_originator": "Met office", "parent": e1.to_string() }))
        .await
        .unwrap();

    let mut tx = db.state.pool.begin().await.unwrap();
    let err = resource_service::update(&mut tx, def, &admin, e0, record(json!({ "parent": e2.to_string() })), &t)
        .await
        .unwrap_err();
    assert_eq!(field_errors(&err), ["parent"]);
    drop(tx);

    let mut tx = db.state.pool.begin().await.unwrap();
    let err = event_service::set_parent(&mut tx, admin.country_accounts_id, e1, Some(e1), &t)
        .await
        .unwrap_err();
    assert_eq!(field_errors(&err), ["parent"]);
    drop(tx);

    let mut conn = db.state.pool.acquire().await.unwrap();
    assert_eq!(event_service::parent_of(&mut conn, e0).await.unwrap(), None);
    assert_eq!(event_service::parent_of(&mut conn, e2).await.unwrap(), Some(e1));
    let stored = resource_service::get(&mut conn, def, admin.country_accounts_id, e1).await.unwrap();
    assert_eq!(stored["parent"], e0.to_string());
}

#[tokio::test]
async fn money_survives_storage_and_export() {
    let db = test_db!();
    let (_, admin) = db.tenant("Paraguay").await;

    let record_id = disaster_record(&db, &admin).await;
    let sector = db
        .create(&resources::SECTORS, &admin, json!({ "name": "Housing" }))
        .await
        .unwrap();
    let asset = db
        .create(&resources::ASSETS, &admin, json!({ "name": "Dwellings", "sector_id": sector.to_string() }))
        .await
        .unwrap();
    let damage = db
        .create(
            &resources::DAMAGES,
            &admin,
            json!({
                "record_id": record_id.to_string(),
                "sector_id": sector.to_string(),
                "asset_id": asset.to_string(),
                "pd_repair_cost_unit": "0.10",
                "pd_repair_cost_total": "12345678901234567.89",
                "currency": "USD",
            }),
        )
        .await
        .unwrap();

    let mut conn = db.state.pool.acquire().await.unwrap();
    let stored = resource_service::get(&mut conn, &resources::DAMAGES, admin.country_accounts_id, damage)
        .await
        .unwrap();
    assert_eq!(stored["pd_repair_cost_total"], "12345678901234567.89");
    assert_eq!(stored["pd_repair_cost_unit"], "0.10");

    let rows = store::list_all(&mut conn, &resources::DAMAGES, admin.country_accounts_id)
        .await
        .unwrap();
    let exported = csv_service::export(&resources::DAMAGES, &rows).unwrap();
    assert!(exported.contains(",12345678901234567.89,"));
    assert!(!exported.contains("e+16"));
}

#[tokio::test]
async fn duplicate_noneco_category_conflicts() {
    let db = test_db!();
    let (_, admin) = db.tenant("Venezuela").await;
    let record_id = disaster_record(&db, &admin).await;
    let body = json!({
        "record_id": record_id.to_string(),
        "category": "Cultural heritage",
        "description": "Church roof collapsed",
    });

    db.create(&resources::NONECO_LOSSES, &admin, body.clone()).await.unwrap();
    let err = db.create(&resources::NONECO_LOSSES, &admin, body).await.unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    assert_eq!(db.count("noneco_losses", admin.country_accounts_id).await, 1);
}

#[tokio::test]
async fn members_are_managed_within_the_tenant() {
    let db = test_db!();
    let (created, admin) = db.tenant("Brazil").await;
    let t = db.state.translator("en", false);
    let (member, member_email) = db.member(&admin, Role::DataCollector).await;
    assert_eq!(db.mailer.sent_to(&member_email).len(), 0);

    sqlx::query("INSERT INTO api_keys (key_hash, name, managed_by_user_id, country_accounts_id) VALUES ($1, 'field', $2, $3)")
        .bind(Uuid::new_v4().to_string())
        .bind(member.user_id)
        .bind(admin.country_accounts_id)
        .execute(&db.state.pool)
        .await
        .unwrap();

    let again = InviteUserRequest {
        email: member_email.to_uppercase(),
        first_name: "Vera".to_string(),
        last_name: "Again".to_string(),
        organization: "Civil Protection".to_string(),
        role: "data-viewer".to_string(),
    };
    let mut tx = db.state.pool.begin().await.unwrap();
    let err = access_service::invite(&mut tx, &admin, again, &t).await.unwrap_err();
    assert_eq!(field_errors(&err), ["email"]);
    drop(tx);

    let mut tx = db.state.pool.begin().await.unwrap();
    let changed = access_service::change_role(&mut tx, &admin, member.user_id, "data-validator", &t)
        .await
        .unwrap();
    assert_eq!(changed.role, "data-validator");
    let err = access_service::change_role(&mut tx, &admin, admin.user_id, "data-viewer", &t)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    drop(tx);

    let mut tx = db.state.pool.begin().await.unwrap();
    let err = access_service::remove(&mut tx, &admin, created.user_id, &t).await.unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    drop(tx);

    let mut tx = db.state.pool.begin().await.unwrap();
    access_service::remove(&mut tx, &admin, member.user_id, &t).await.unwrap();
    tx.commit().await.unwrap();

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM api_keys WHERE managed_by_user_id = $1 AND is_active",
    )
    .bind(member.user_id)
    .fetch_one(&db.state.pool)
    .await
    .unwrap();
    assert_eq!(active, 0);

    let response = db
        .app()
        .oneshot(
            Request::builder()
                .uri("/api/v1/access/members")
                .header(header::AUTHORIZATION, format!("Bearer {}", created.secret))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let members = body_json(response).await;
    let members = members.as_array().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["id"], created.user_id.to_string());
    assert_eq!(members[0]["is_primary_admin"], true);
}

#[tokio::test]
async fn health_reports_connected_database() {
    let db = test_db!();
    let response = db
        .app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["database"], "connected");
}
