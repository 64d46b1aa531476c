//! Public translation catalog.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::Value;

use crate::{i18n::parse_language_and_debug_flag, state::AppState};

/// `GET /api/v1/translations/{lang}`
///
/// Flat `code -> message` map for the language, falling back to the default
/// language per code. Plural messages are objects keyed by category.
pub async fn get_translations(
    State(state): State<AppState>,
    Path(lang): Path<String>,
) -> Json<BTreeMap<String, Value>> {
    let (lang, _) = parse_language_and_debug_flag(&lang);
    Json(state.translations.messages(&lang))
}
