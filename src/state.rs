//! Shared application state handed to every handler.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    db::DbPool,
    i18n::{Translations, Translator},
    services::email_service::Mailer,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub translations: Arc<Translations>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn translator(&self, lang: &str, debug: bool) -> Translator<'_> {
        self.translations.translator(lang, debug)
    }
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
