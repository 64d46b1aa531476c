//! Request language resolution.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::{i18n::parse_language_and_debug_flag, state::AppState};

/// Language requested by the client.
///
/// `?lang=` wins over `Accept-Language`; both fall back to the configured
/// default. A `-debug` suffix turns on translator debug output.
#[derive(Debug, Clone, PartialEq)]
pub struct Lang {
    pub lang: String,
    pub debug: bool,
}

impl Lang {
    pub fn resolve(query: Option<&str>, accept_language: Option<&str>, default_lang: &str) -> Self {
        let from_query = query.and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "lang")
                .map(|(_, v)| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
        });

        let from_header = || {
            accept_language
                .and_then(|h| h.split(',').next())
                .map(|tag| tag.split(';').next().unwrap_or(tag).trim().to_lowercase())
                .and_then(|tag| primary_subtag(&tag))
        };

        let raw = from_query
            .or_else(from_header)
            .unwrap_or_else(|| default_lang.to_string());
        let (lang, debug) = parse_language_and_debug_flag(&raw);
        Self { lang, debug }
    }
}

/// Primary subtag of a language tag, keeping a trailing `-debug`.
fn primary_subtag(tag: &str) -> Option<String> {
    let (tag, debug) = match tag.strip_suffix("-debug") {
        Some(rest) => (rest, true),
        None => (tag, false),
    };
    let primary = tag.split('-').next().filter(|l| !l.is_empty() && *l != "*")?;
    Some(if debug {
        format!("{primary}-debug")
    } else {
        primary.to_string()
    })
}

impl<S> FromRequestParts<S> for Lang
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let accept = parts
            .headers
            .get(axum::http::header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok());
        Ok(Lang::resolve(
            parts.uri.query(),
            accept,
            &app.config.default_lang,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parameter_wins() {
        let lang = Lang::resolve(Some("page=2&lang=es"), Some("fr-FR,fr;q=0.9"), "en");
        assert_eq!(lang, Lang { lang: "es".into(), debug: false });
    }

    #[test]
    fn accept_language_primary_subtag() {
        let lang = Lang::resolve(None, Some("fr-FR,fr;q=0.9,en;q=0.8"), "en");
        assert_eq!(lang.lang, "fr");
        assert_eq!(Lang::resolve(None, Some("*"), "en").lang, "en");
    }

    #[test]
    fn default_and_debug() {
        assert_eq!(Lang::resolve(None, None, "en").lang, "en");
        let lang = Lang::resolve(Some("lang=ar-debug"), None, "en");
        assert_eq!(lang, Lang { lang: "ar".into(), debug: true });
    }

    #[test]
    fn accept_language_keeps_debug_suffix() {
        let lang = Lang::resolve(None, Some("es-debug,en;q=0.5"), "en");
        assert_eq!(lang, Lang { lang: "es".into(), debug: true });
        let lang = Lang::resolve(None, Some("pt-BR-debug"), "en");
        assert_eq!(lang, Lang { lang: "pt".into(), debug: true });
        assert_eq!(Lang::resolve(None, Some("-debug"), "en").lang, "en");
    }
}
