//! Business logic shared by the handlers.

/// Tenant members, roles and first-tenant bootstrap
pub mod access_service;
/// Approval workflow transitions
pub mod approval_service;
/// CSV import and export
pub mod csv_service;
/// Outgoing mail
pub mod email_service;
/// Hazardous event causality
pub mod event_service;
/// Workflow notification emails
pub mod notification_service;
/// Validated, audited CRUD
pub mod resource_service;
