//! HTTP middleware components and request extractors.

/// API key authentication middleware
pub mod auth;
/// Request language extractor
pub mod lang;
