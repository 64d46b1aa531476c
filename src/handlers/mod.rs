//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Checks the caller's permission from the auth context
//! 2. Delegates to a service, inside a transaction for writes
//! 3. Returns JSON (or CSV) with the matching status code

/// Tenant member management
pub mod access;
/// API key management endpoints
pub mod api_keys;
/// Approval workflow endpoints
pub mod approval;
/// CSV export, import and import examples
pub mod csv;
/// Health check endpoint
pub mod health;
/// Generic resource CRUD
pub mod resources;
/// Tenant instance settings
pub mod settings;
/// Translation catalog
pub mod translations;
/// Sector, division and HIP hierarchies
pub mod trees;
