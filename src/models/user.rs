//! Users and their membership in country accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl User {
    /// First and last name, skipping blanks.
    pub fn full_name(&self) -> String {
        [self.first_name.trim(), self.last_name.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A user as a member of one tenant.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Member {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
}

impl From<Member> for User {
    fn from(m: Member) -> Self {
        Self {
            id: m.id,
            first_name: m.first_name,
            last_name: m.last_name,
            email: m.email,
        }
    }
}

/// Membership row as listed on the access management endpoints.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MemberDetails {
    /// User id, also the path id of the member endpoints
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub organization: Option<String>,
    pub role: String,
    pub is_primary_admin: bool,
    pub joined_at: DateTime<Utc>,
}

/// Request body for adding a user to the caller's tenant.
///
/// An unknown email creates the user; a known one only gets the new
/// membership.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InviteUserRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMemberRequest {
    pub role: String,
}
