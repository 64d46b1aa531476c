//! User roles and the permissions they grant.
//!
//! Roles are ordered; a permission is granted to its minimum role and every
//! role above it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role of a user inside one country account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    DataViewer,
    DataCollector,
    DataValidator,
    Admin,
    #[serde(rename = "super_admin")]
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::DataViewer => "data-viewer",
            Role::DataCollector => "data-collector",
            Role::DataValidator => "data-validator",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn has(&self, permission: Permission) -> bool {
        *self >= permission.min_role()
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data-viewer" => Ok(Role::DataViewer),
            "data-collector" => Ok(Role::DataCollector),
            "data-validator" => Ok(Role::DataValidator),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ViewData,
    EditData,
    ValidateData,
    DeleteValidatedData,
    ManageCountrySettings,
    ManageOrganizations,
    EditApiKeys,
    InviteUsers,
    EditUsers,
}

impl Permission {
    pub fn min_role(&self) -> Role {
        match self {
            Permission::ViewData => Role::DataViewer,
            Permission::EditData => Role::DataCollector,
            Permission::ValidateData | Permission::DeleteValidatedData => Role::DataValidator,
            Permission::ManageCountrySettings
            | Permission::ManageOrganizations
            | Permission::EditApiKeys
            | Permission::InviteUsers
            | Permission::EditUsers => Role::Admin,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewData => "ViewData",
            Permission::EditData => "EditData",
            Permission::ValidateData => "ValidateData",
            Permission::DeleteValidatedData => "DeleteValidatedData",
            Permission::ManageCountrySettings => "ManageCountrySettings",
            Permission::ManageOrganizations => "ManageOrganizations",
            Permission::EditApiKeys => "EditAPIKeys",
            Permission::InviteUsers => "InviteUsers",
            Permission::EditUsers => "EditUsers",
        }
    }
}
