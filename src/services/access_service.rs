//! Tenant membership management.
//!
//! A user belongs to a country account through one `user_country_accounts`
//! row carrying the role. Admins add users, change roles and remove members;
//! the primary admin created with the tenant can be neither demoted nor
//! removed. [`bootstrap_tenant`] creates a tenant with that first admin and
//! an API key, which is how a fresh installation gets its first credentials.

use serde_json::json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    error::{AppError, FieldErrors},
    i18n::Translator,
    middleware::auth::AuthContext,
    models::{
        api_key::{generate_secret, hash_api_key},
        role::{Permission, Role},
        user::{InviteUserRequest, MemberDetails},
    },
    services::notification_service::InviteDetails,
    store::{self, AuditEntry},
};

const MEMBER_SELECT: &str = r#"
    SELECT u.id, u.first_name, u.last_name, u.email, u.organization,
           uca.role, uca.is_primary_admin, uca.created_at AS joined_at
    FROM user_country_accounts uca
    JOIN users u ON u.id = uca.user_id
"#;

const MEMBERSHIP_TABLE: &str = "user_country_accounts";

pub async fn list_members(conn: &mut PgConnection, tenant: Uuid) -> Result<Vec<MemberDetails>, AppError> {
    let sql = format!(
        "{MEMBER_SELECT} WHERE uca.country_accounts_id = $1 ORDER BY u.last_name, u.first_name, u.email"
    );
    let members = sqlx::query_as::<_, MemberDetails>(&sql)
        .bind(tenant)
        .fetch_all(conn)
        .await?;
    Ok(members)
}

pub async fn member(conn: &mut PgConnection, tenant: Uuid, user_id: Uuid) -> Result<Option<MemberDetails>, AppError> {
    let sql = format!("{MEMBER_SELECT} WHERE uca.country_accounts_id = $1 AND uca.user_id = $2");
    let member = sqlx::query_as::<_, MemberDetails>(&sql)
        .bind(tenant)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(member)
}

/// Parse a requested role. Nobody grants a role above their own.
pub fn assignable_role(caller: Role, raw: &str, t: &Translator) -> Result<Role, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(t.t("validation.required", "Field is required."));
    }
    let role = raw
        .parse::<Role>()
        .map_err(|_| t.t("validation.invalid_option", "Not an allowed value"))?;
    if role > caller {
        return Err(t.t("access.role_above_own", "You cannot grant a role above your own"));
    }
    Ok(role)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Field checks for an invitation; returns the role to grant.
pub fn validate_invite(request: &InviteUserRequest, caller: Role, t: &Translator) -> Result<Role, AppError> {
    let mut errors = FieldErrors::new();
    let required = || t.t("validation.required", "Field is required.");

    if request.first_name.trim().is_empty() {
        errors.add_field("first_name", required());
    }
    let email = request.email.trim();
    if email.is_empty() {
        errors.add_field("email", required());
    } else if !is_plausible_email(email) {
        errors.add_field("email", t.t("access.invalid_email", "Invalid email address"));
    }
    if request.organization.trim().is_empty() {
        errors.add_field("organization", required());
    }
    let role = assignable_role(caller, &request.role, t);
    if let Err(message) = &role {
        errors.add_field("role", message.clone());
    }

    errors.into_result()?;
    role.map_err(|message| AppError::Validation(FieldErrors::single("role", message)))
}

/// Result of an invitation.
#[derive(Debug, Clone)]
pub struct Invited {
    pub member: MemberDetails,
    /// The email was unknown and a user row was created
    pub new_user: bool,
}

/// Add a user to the caller's tenant, creating the user when the email is
/// unknown.
///
/// # Errors
///
/// - `Validation`: missing fields, a role above the caller's, or an email
///   that already belongs to a member
pub async fn invite(
    conn: &mut PgConnection,
    auth: &AuthContext,
    request: InviteUserRequest,
    t: &Translator<'_>,
) -> Result<Invited, AppError> {
    let role = validate_invite(&request, auth.role, t)?;
    let tenant = auth.country_accounts_id;
    let email = request.email.trim().to_lowercase();

    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE lower(email) = $1")
        .bind(&email)
        .fetch_optional(&mut *conn)
        .await?;

    if let Some(user_id) = existing {
        if member(&mut *conn, tenant, user_id).await?.is_some() {
            return Err(AppError::Validation(FieldErrors::single(
                "email",
                t.t("access.email_taken", "A user with this email already exists"),
            )));
        }
    }

    let user_id = match existing {
        Some(id) => id,
        None => {
            sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO users (email, first_name, last_name, organization, invited_at)
                VALUES ($1, $2, $3, $4, NOW())
                RETURNING id
                "#,
            )
            .bind(&email)
            .bind(request.first_name.trim())
            .bind(request.last_name.trim())
            .bind(request.organization.trim())
            .fetch_one(&mut *conn)
            .await?
        }
    };

    let membership_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO user_country_accounts (user_id, country_accounts_id, role)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(tenant)
    .bind(role.as_str())
    .fetch_one(&mut *conn)
    .await?;

    store::write_audit(
        &mut *conn,
        AuditEntry {
            tenant,
            table: MEMBERSHIP_TABLE,
            record_id: membership_id,
            action: "invite",
            old_values: None,
            new_values: Some(json!({ "user_id": user_id, "role": role.as_str() })),
            user_id: auth.user_id,
        },
    )
    .await?;

    let member = member(&mut *conn, tenant, user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    tracing::info!(%user_id, role = %role, new_user = existing.is_none(), actor = %auth.user_id, "member added");
    Ok(Invited {
        member,
        new_user: existing.is_none(),
    })
}

#[derive(Debug, sqlx::FromRow)]
struct Membership {
    id: Uuid,
    role: String,
    is_primary_admin: bool,
}

async fn lock_membership(conn: &mut PgConnection, tenant: Uuid, user_id: Uuid) -> Result<Membership, AppError> {
    sqlx::query_as::<_, Membership>(
        r#"
        SELECT id, role, is_primary_admin
        FROM user_country_accounts
        WHERE user_id = $1 AND country_accounts_id = $2
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .bind(tenant)
    .fetch_optional(conn)
    .await?
    .ok_or(AppError::NotFound("User"))
}

/// Members holding a role above the caller's are out of reach.
fn check_reach(auth: &AuthContext, membership: &Membership) -> Result<(), AppError> {
    let above = membership.role.parse::<Role>().is_ok_and(|role| role > auth.role);
    if above {
        return Err(AppError::Forbidden(Permission::EditUsers.as_str().to_string()));
    }
    Ok(())
}

/// Give a member a new role.
pub async fn change_role(
    conn: &mut PgConnection,
    auth: &AuthContext,
    user_id: Uuid,
    raw_role: &str,
    t: &Translator<'_>,
) -> Result<MemberDetails, AppError> {
    let role = assignable_role(auth.role, raw_role, t)
        .map_err(|message| AppError::Validation(FieldErrors::single("role", message)))?;
    let tenant = auth.country_accounts_id;

    let membership = lock_membership(&mut *conn, tenant, user_id).await?;
    if membership.is_primary_admin {
        return Err(AppError::Conflict(t.t(
            "access.primary_admin_role",
            "The role of the primary admin cannot be changed.",
        )));
    }
    check_reach(auth, &membership)?;

    sqlx::query("UPDATE user_country_accounts SET role = $1 WHERE id = $2")
        .bind(role.as_str())
        .bind(membership.id)
        .execute(&mut *conn)
        .await?;

    store::write_audit(
        &mut *conn,
        AuditEntry {
            tenant,
            table: MEMBERSHIP_TABLE,
            record_id: membership.id,
            action: "update",
            old_values: Some(json!({ "user_id": user_id, "role": membership.role })),
            new_values: Some(json!({ "user_id": user_id, "role": role.as_str() })),
            user_id: auth.user_id,
        },
    )
    .await?;

    tracing::info!(%user_id, from = %membership.role, to = %role, actor = %auth.user_id, "member role changed");
    member(&mut *conn, tenant, user_id)
        .await?
        .ok_or(AppError::NotFound("User"))
}

/// Remove a member from the tenant.
///
/// The user row stays; the member's keys for this tenant are deactivated and
/// pending validation assignments dropped.
pub async fn remove(
    conn: &mut PgConnection,
    auth: &AuthContext,
    user_id: Uuid,
    t: &Translator<'_>,
) -> Result<(), AppError> {
    let tenant = auth.country_accounts_id;
    let membership = lock_membership(&mut *conn, tenant, user_id).await?;
    if membership.is_primary_admin {
        return Err(AppError::Conflict(t.t(
            "access.primary_admin_delete",
            "You cannot delete the primary admin user.",
        )));
    }
    check_reach(auth, &membership)?;

    sqlx::query("DELETE FROM user_country_accounts WHERE id = $1")
        .bind(membership.id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "UPDATE api_keys SET is_active = false, updated_at = NOW() \
         WHERE managed_by_user_id = $1 AND country_accounts_id = $2",
    )
    .bind(user_id)
    .bind(tenant)
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "DELETE FROM entity_validation_assignments WHERE assigned_to_user_id = $1 AND country_accounts_id = $2",
    )
    .bind(user_id)
    .bind(tenant)
    .execute(&mut *conn)
    .await?;

    store::write_audit(
        &mut *conn,
        AuditEntry {
            tenant,
            table: MEMBERSHIP_TABLE,
            record_id: membership.id,
            action: "delete",
            old_values: Some(json!({ "user_id": user_id, "role": membership.role })),
            new_values: None,
            user_id: auth.user_id,
        },
    )
    .await?;

    tracing::info!(%user_id, actor = %auth.user_id, "member removed");
    Ok(())
}

/// Site and country names used in the invitation email.
pub async fn invite_details(
    conn: &mut PgConnection,
    tenant: Uuid,
    role: &str,
    url: &str,
) -> Result<InviteDetails, AppError> {
    let (country_name, account_type, site_name): (String, String, String) = sqlx::query_as(
        r#"
        SELECT ca.country_name, ca.type, COALESCE(s.website_name, 'DELTA Resilience')
        FROM country_accounts ca
        LEFT JOIN instance_settings s ON s.country_accounts_id = ca.id
        WHERE ca.id = $1
        "#,
    )
    .bind(tenant)
    .fetch_optional(conn)
    .await?
    .ok_or(AppError::NotFound("Country account"))?;

    Ok(InviteDetails {
        site_name,
        country_name,
        account_type,
        role: role.to_string(),
        url: url.to_string(),
    })
}

/// Everything needed to create a tenant from the command line.
#[derive(Debug, Clone)]
pub struct BootstrapRequest {
    pub country_name: String,
    pub admin_email: String,
    pub first_name: String,
    pub last_name: String,
    pub key_name: String,
}

#[derive(Debug, Clone)]
pub struct Bootstrapped {
    pub country_accounts_id: Uuid,
    pub user_id: Uuid,
    pub api_key_id: Uuid,
    /// Shown once; only its hash is stored
    pub secret: String,
}

/// Create a country account, its primary admin, default settings and an
/// admin API key. An existing user with the same email is reused.
pub async fn bootstrap_tenant(conn: &mut PgConnection, request: &BootstrapRequest) -> Result<Bootstrapped, AppError> {
    let country_name = request.country_name.trim();
    let email = request.admin_email.trim().to_lowercase();
    let mut errors = FieldErrors::new();
    if country_name.is_empty() {
        errors.add_field("country_name", "Field is required.");
    }
    if !is_plausible_email(&email) {
        errors.add_field("admin_email", "Invalid email address");
    }
    errors.into_result()?;

    let country_accounts_id: Uuid =
        sqlx::query_scalar("INSERT INTO country_accounts (country_name) VALUES ($1) RETURNING id")
            .bind(country_name)
            .fetch_one(&mut *conn)
            .await?;

    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO users (email, first_name, last_name)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(&email)
    .bind(request.first_name.trim())
    .bind(request.last_name.trim())
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO user_country_accounts (user_id, country_accounts_id, role, is_primary_admin)
        VALUES ($1, $2, $3, true)
        "#,
    )
    .bind(user_id)
    .bind(country_accounts_id)
    .bind(Role::Admin.as_str())
    .execute(&mut *conn)
    .await?;

    sqlx::query("INSERT INTO instance_settings (country_accounts_id) VALUES ($1)")
        .bind(country_accounts_id)
        .execute(&mut *conn)
        .await?;

    let secret = generate_secret();
    let key_name = match request.key_name.trim() {
        "" => "Bootstrap",
        name => name,
    };
    let api_key_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO api_keys (key_hash, name, managed_by_user_id, country_accounts_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(hash_api_key(&secret))
    .bind(key_name)
    .bind(user_id)
    .bind(country_accounts_id)
    .fetch_one(&mut *conn)
    .await?;

    store::write_audit(
        &mut *conn,
        AuditEntry {
            tenant: country_accounts_id,
            table: "country_accounts",
            record_id: country_accounts_id,
            action: "bootstrap",
            old_values: None,
            new_values: Some(json!({ "country_name": country_name, "admin_user_id": user_id })),
            user_id,
        },
    )
    .await?;

    tracing::info!(%country_accounts_id, %user_id, %api_key_id, "tenant bootstrapped");
    Ok(Bootstrapped {
        country_accounts_id,
        user_id,
        api_key_id,
        secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Translations;

    fn request(role: &str) -> InviteUserRequest {
        InviteUserRequest {
            email: "new.user@example.org".into(),
            first_name: "New".into(),
            last_name: "User".into(),
            organization: "Civil Protection".into(),
            role: role.into(),
        }
    }

    #[test]
    fn roles_are_capped_by_the_caller() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        assert_eq!(assignable_role(Role::Admin, " data-validator ", &t), Ok(Role::DataValidator));
        assert_eq!(assignable_role(Role::Admin, "admin", &t), Ok(Role::Admin));
        assert_eq!(
            assignable_role(Role::Admin, "super_admin", &t),
            Err("You cannot grant a role above your own".to_string())
        );
        assert_eq!(assignable_role(Role::Admin, "owner", &t), Err("Not an allowed value".to_string()));
        assert_eq!(assignable_role(Role::Admin, "", &t), Err("Field is required.".to_string()));
    }

    #[test]
    fn invite_fields_are_checked_together() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        assert_eq!(validate_invite(&request("data-collector"), Role::Admin, &t).unwrap(), Role::DataCollector);

        let bad = InviteUserRequest {
            email: "not-an-email".into(),
            role: "super_admin".into(),
            ..InviteUserRequest::default()
        };
        match validate_invite(&bad, Role::Admin, &t) {
            Err(AppError::Validation(errors)) => {
                assert_eq!(errors.fields["email"], vec!["Invalid email address"]);
                assert!(errors.fields.contains_key("first_name"));
                assert!(errors.fields.contains_key("organization"));
                assert!(errors.fields.contains_key("role"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn email_shape() {
        assert!(is_plausible_email("a@b.org"));
        assert!(!is_plausible_email("a@b"));
        assert!(!is_plausible_email("@b.org"));
        assert!(!is_plausible_email("a b@c.org"));
    }
}
