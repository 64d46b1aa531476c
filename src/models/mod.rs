//! Data models representing database entities.
//!
//! This module contains the data structures that map to fixed database
//! tables. Resource rows (events, records, damages...) are handled as JSON
//! through `forms` and `store` instead.

/// API key authentication model
pub mod api_key;
/// Approval workflow statuses, actions and rows
pub mod approval;
/// User roles and permissions
pub mod role;
/// Per-tenant settings
pub mod settings;
pub mod user;
