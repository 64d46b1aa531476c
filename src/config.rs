//! Application configuration management.
//!
//! Configuration is read from environment variables (optionally seeded from a
//! `.env` file) and deserialized with `envy` into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `PUBLIC_URL` (optional): base URL used in notification links
/// - `DEFAULT_LANG` (optional): fallback language, defaults to `en`
/// - `LOCALES_DIR` (optional): directory holding `<lang>.json` files
/// - `MAX_UPLOAD_BYTES` (optional): CSV upload limit, defaults to 10 MB
/// - `SMTP_*` / `EMAIL_FROM_*` (optional): outgoing mail settings
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_public_url")]
    pub public_url: String,

    #[serde(default = "default_lang")]
    pub default_lang: String,

    #[serde(default = "default_locales_dir")]
    pub locales_dir: String,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    pub smtp_host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    pub smtp_username: Option<String>,

    pub smtp_password: Option<String>,

    #[serde(default = "default_true")]
    pub smtp_tls: bool,

    pub email_from_address: Option<String>,

    #[serde(default = "default_from_name")]
    pub email_from_name: String,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_locales_dir() -> String {
    "locales".to_string()
}

fn default_max_upload_bytes() -> usize {
    10_000_000
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_from_name() -> String {
    "DELTA Resilience".to_string()
}

/// SMTP settings used by the email service.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    pub from_name: String,
}

impl EmailConfig {
    /// Email can only be sent when both a relay host and a sender are known.
    pub fn is_configured(&self) -> bool {
        self.smtp_host.as_deref().is_some_and(|h| !h.is_empty())
            && self.from_address.as_deref().is_some_and(|a| !a.is_empty())
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or a value cannot be
    /// parsed into its expected type.
    pub fn from_env() -> Result<Self, envy::Error> {
        // Missing .env is fine
        dotenvy::dotenv().ok();

        envy::from_env::<Config>()
    }

    /// Mail settings view of this configuration.
    pub fn email(&self) -> EmailConfig {
        EmailConfig {
            smtp_host: self.smtp_host.clone(),
            smtp_port: self.smtp_port,
            smtp_username: self.smtp_username.clone(),
            smtp_password: self.smtp_password.clone(),
            smtp_tls: self.smtp_tls,
            from_address: self.email_from_address.clone(),
            from_name: self.email_from_name.clone(),
        }
    }

    /// Public base URL without a trailing slash.
    pub fn public_base_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }

    /// Configuration suitable for tests and tools that never touch the network.
    pub fn for_tests(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            server_port: default_port(),
            database_max_connections: default_max_connections(),
            public_url: default_public_url(),
            default_lang: default_lang(),
            locales_dir: default_locales_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: true,
            email_from_address: None,
            email_from_name: default_from_name(),
        }
    }
}
