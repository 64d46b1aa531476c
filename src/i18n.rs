//! Translation catalog and translator.
//!
//! Locale files live in `LOCALES_DIR/<lang>.json` and map message codes to
//! entries:
//!
//! ```json
//! {
//!   "common.field_required": { "defaultMessage": "Field is required.", "description": "..." },
//!   "csv.rows_imported": { "defaultMessage": { "one": "{n} row", "other": "{n} rows" } }
//! }
//! ```
//!
//! Lookups fall back from the requested language to the default language and
//! finally to the message supplied at the call site.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

/// A catalog message: plain text or a set of plural forms keyed by CLDR category.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Single(String),
    Plural(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "defaultMessage")]
    default_message: Option<Value>,
}

/// All loaded languages.
#[derive(Debug, Clone, Default)]
pub struct Translations {
    langs: HashMap<String, HashMap<String, Message>>,
    default_lang: String,
}

impl Translations {
    pub fn new(default_lang: &str) -> Self {
        Self {
            langs: HashMap::new(),
            default_lang: default_lang.to_string(),
        }
    }

    /// Load every `<lang>.json` in `dir`.
    ///
    /// A missing directory or a broken file is logged and skipped; the
    /// translator then falls back to call-site messages.
    pub fn load_dir(dir: impl AsRef<Path>, default_lang: &str) -> Self {
        let dir = dir.as_ref();
        let mut translations = Self::new(default_lang);

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "locales directory not readable");
                return translations;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(lang) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(content) => match Self::parse_catalog(&content) {
                    Ok(messages) => {
                        tracing::debug!(lang, count = messages.len(), "loaded locale");
                        translations.langs.insert(lang.to_string(), messages);
                    }
                    Err(e) => {
                        tracing::error!(file = %path.display(), error = %e, "invalid locale file");
                    }
                },
                Err(e) => {
                    tracing::error!(file = %path.display(), error = %e, "could not read locale file");
                }
            }
        }

        translations
    }

    /// Parse one locale file. Entries without a usable `defaultMessage` are dropped.
    pub fn parse_catalog(content: &str) -> Result<HashMap<String, Message>, serde_json::Error> {
        let raw: HashMap<String, RawEntry> = serde_json::from_str(content)?;
        let mut messages = HashMap::with_capacity(raw.len());

        for (code, entry) in raw {
            match entry.default_message {
                Some(Value::String(s)) => {
                    messages.insert(code, Message::Single(s));
                }
                Some(Value::Object(forms)) => {
                    let forms: BTreeMap<String, String> = forms
                        .into_iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                        .collect();
                    if !forms.is_empty() {
                        messages.insert(code, Message::Plural(forms));
                    }
                }
                _ => {}
            }
        }

        Ok(messages)
    }

    /// Register a language from already parsed messages.
    pub fn insert_lang(&mut self, lang: &str, messages: HashMap<String, Message>) {
        self.langs.insert(lang.to_string(), messages);
    }

    pub fn default_lang(&self) -> &str {
        &self.default_lang
    }

    pub fn has_lang(&self, lang: &str) -> bool {
        self.langs.contains_key(lang)
    }

    fn lookup(&self, lang: &str, code: &str) -> Option<&Message> {
        self.langs
            .get(lang)
            .and_then(|m| m.get(code))
            .or_else(|| self.langs.get(&self.default_lang).and_then(|m| m.get(code)))
    }

    /// Flattened catalog for a language, default-language entries filled in.
    pub fn messages(&self, lang: &str) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for source in [self.langs.get(&self.default_lang), self.langs.get(lang)]
            .into_iter()
            .flatten()
        {
            for (code, message) in source {
                let value = match message {
                    Message::Single(s) => Value::String(s.clone()),
                    Message::Plural(forms) => serde_json::json!(forms),
                };
                out.insert(code.clone(), value);
            }
        }
        out
    }

    pub fn translator(&self, lang: &str, debug: bool) -> Translator<'_> {
        Translator {
            catalog: self,
            lang: lang.to_string(),
            debug,
        }
    }
}

/// Split `en-debug` into (`en`, true).
pub fn parse_language_and_debug_flag(lang: &str) -> (String, bool) {
    match lang.strip_suffix("-debug") {
        Some(base) => (base.to_string(), true),
        None => (lang.to_string(), false),
    }
}

/// CLDR cardinal plural category for an integer.
pub fn plural_category(lang: &str, n: i64) -> &'static str {
    let n = n.unsigned_abs();
    let base = lang.split(['-', '_']).next().unwrap_or(lang);
    match base {
        "zh" | "ja" | "ko" | "vi" | "th" | "id" => "other",
        "fr" | "pt" => {
            if n <= 1 {
                "one"
            } else {
                "other"
            }
        }
        "ru" | "uk" | "be" => {
            let (m10, m100) = (n % 10, n % 100);
            if m10 == 1 && m100 != 11 {
                "one"
            } else if (2..=4).contains(&m10) && !(12..=14).contains(&m100) {
                "few"
            } else {
                "many"
            }
        }
        "ar" => {
            let m100 = n % 100;
            match n {
                0 => "zero",
                1 => "one",
                2 => "two",
                _ if (3..=10).contains(&m100) => "few",
                _ if (11..=99).contains(&m100) => "many",
                _ => "other",
            }
        }
        _ => {
            if n == 1 {
                "one"
            } else {
                "other"
            }
        }
    }
}

/// Translator bound to one language.
#[derive(Debug, Clone)]
pub struct Translator<'a> {
    catalog: &'a Translations,
    lang: String,
    debug: bool,
}

impl Translator<'_> {
    pub fn lang(&self) -> &str {
        &self.lang
    }

    /// Translate `code`, falling back to `default`.
    pub fn t(&self, code: &str, default: &str) -> String {
        self.t_with(code, default, &[])
    }

    /// Translate and substitute every `{key}` placeholder.
    pub fn t_with(&self, code: &str, default: &str, replacements: &[(&str, &dyn Display)]) -> String {
        let text = match self.catalog.lookup(&self.lang, code) {
            Some(Message::Single(s)) => s.clone(),
            Some(Message::Plural(forms)) => forms
                .get("other")
                .or_else(|| forms.values().next())
                .cloned()
                .unwrap_or_else(|| default.to_string()),
            None => default.to_string(),
        };
        self.finish(text, replacements)
    }

    /// Translate a plural message, choosing the form for `n`.
    ///
    /// `defaults` are the call-site plural forms used when the catalog has none.
    pub fn t_plural(
        &self,
        code: &str,
        defaults: &[(&str, &str)],
        n: i64,
        replacements: &[(&str, &dyn Display)],
    ) -> String {
        let category = plural_category(&self.lang, n);
        let forms: BTreeMap<String, String> = match self.catalog.lookup(&self.lang, code) {
            Some(Message::Plural(forms)) => forms.clone(),
            Some(Message::Single(s)) => BTreeMap::from([("other".to_string(), s.clone())]),
            None => defaults
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };

        let text = match forms.get(category).or_else(|| forms.get("other")) {
            Some(text) => text.clone(),
            None => {
                tracing::warn!(code, category, "missing plural form and no \"other\" form");
                format!("Missing plural form for {code}")
            }
        };
        self.finish(text, replacements)
    }

    /// Pick the current language out of a DB-stored language map.
    pub fn dbt(&self, value: &Value) -> String {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Object(map) => {
                let pick = |lang: &str| {
                    map.get(lang)
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                };
                pick(&self.lang)
                    .or_else(|| pick(self.catalog.default_lang()))
                    .or_else(|| {
                        map.values()
                            .filter_map(Value::as_str)
                            .find(|s| !s.is_empty())
                            .map(str::to_string)
                    })
                    .unwrap_or_default()
            }
            _ => String::new(),
        };
        if self.debug && !text.is_empty() {
            format!("{text} [{}]", self.lang)
        } else {
            text
        }
    }

    fn finish(&self, mut text: String, replacements: &[(&str, &dyn Display)]) -> String {
        for (key, value) in replacements {
            text = text.replace(&format!("{{{key}}}"), &value.to_string());
        }
        if self.debug {
            text.push_str(&format!(" [{}]", self.lang));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> Translations {
        let mut t = Translations::new("en");
        t.insert_lang(
            "en",
            Translations::parse_catalog(
                r#"{
                    "common.save": { "defaultMessage": "Save" },
                    "common.greeting": { "defaultMessage": "Hello {name}, {name}!" },
                    "csv.rows": { "defaultMessage": { "one": "{n} row", "other": "{n} rows" } },
                    "broken": { "description": "no message" }
                }"#,
            )
            .unwrap(),
        );
        t.insert_lang(
            "es",
            Translations::parse_catalog(r#"{ "common.save": { "defaultMessage": "Guardar" } }"#)
                .unwrap(),
        );
        t
    }

    #[test]
    fn falls_back_to_default_language_then_call_site() {
        let t = catalog();
        let es = t.translator("es", false);
        assert_eq!(es.t("common.save", "Save!"), "Guardar");
        assert_eq!(es.t_with("common.greeting", "", &[("name", &"Ana")]), "Hello Ana, Ana!");
        assert_eq!(es.t("unknown.code", "Fallback"), "Fallback");
        assert_eq!(es.t("broken", "Broken"), "Broken");
    }

    #[test]
    fn plural_forms_follow_language_rules() {
        let t = catalog();
        let en = t.translator("en", false);
        assert_eq!(en.t_plural("csv.rows", &[], 1, &[("n", &1)]), "1 row");
        assert_eq!(en.t_plural("csv.rows", &[], 0, &[("n", &0)]), "0 rows");

        let ru = t.translator("ru", false);
        let defaults = [("one", "{n} запись"), ("few", "{n} записи"), ("many", "{n} записей")];
        assert_eq!(ru.t_plural("x.rows", &defaults, 21, &[("n", &21)]), "21 запись");
        assert_eq!(ru.t_plural("x.rows", &defaults, 3, &[("n", &3)]), "3 записи");
        assert_eq!(ru.t_plural("x.rows", &defaults, 12, &[("n", &12)]), "12 записей");
        assert_eq!(
            ru.t_plural("x.none", &[("one", "x")], 5, &[]),
            "Missing plural form for x.none"
        );
    }

    #[test]
    fn plural_categories() {
        assert_eq!(plural_category("en", 1), "one");
        assert_eq!(plural_category("en", 2), "other");
        assert_eq!(plural_category("fr", 0), "one");
        assert_eq!(plural_category("ar", 0), "zero");
        assert_eq!(plural_category("ar", 2), "two");
        assert_eq!(plural_category("ar", 105), "few");
        assert_eq!(plural_category("ar", 111), "many");
        assert_eq!(plural_category("zh", 1), "other");
        assert_eq!(plural_category("uk", 111), "many");
    }

    #[test]
    fn dbt_picks_language_with_fallbacks() {
        let t = catalog();
        let es = t.translator("es", false);
        assert_eq!(es.dbt(&json!({"en": "Flood", "es": "Inundación"})), "Inundación");
        assert_eq!(es.dbt(&json!({"en": "Flood", "es": ""})), "Flood");
        assert_eq!(es.dbt(&json!({"fr": "Inondation"})), "Inondation");
        assert_eq!(es.dbt(&json!(null)), "");
    }

    #[test]
    fn debug_flag_appends_language() {
        let (lang, debug) = parse_language_and_debug_flag("es-debug");
        assert_eq!((lang.as_str(), debug), ("es", true));
        let t = catalog();
        assert_eq!(t.translator(&lang, debug).t("common.save", ""), "Guardar [es]");
        assert_eq!(parse_language_and_debug_flag("en"), ("en".to_string(), false));
    }

    #[test]
    fn messages_merge_default_language() {
        let t = catalog();
        let messages = t.messages("es");
        assert_eq!(messages["common.save"], json!("Guardar"));
        assert_eq!(messages["csv.rows"]["one"], json!("{n} row"));
    }

    #[test]
    fn load_dir_reads_json_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("en.json"),
            r#"{ "common.save": { "defaultMessage": "Save" } }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("fr.json"), "not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let t = Translations::load_dir(dir.path(), "en");
        assert!(t.has_lang("en"));
        assert!(!t.has_lang("fr"));
        assert_eq!(t.translator("fr", false).t("common.save", "x"), "Save");
    }
}
