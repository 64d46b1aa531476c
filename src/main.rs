//! DELTA Resilience - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Either bootstrap a tenant and exit, or:
//! 5. Load translation catalogs and pick a mailer
//! 6. Build HTTP router with routes and middleware
//! 7. Start server on configured port

use std::sync::Arc;

use clap::{Parser, Subcommand};
use delta_resilience::{
    build_router, config, db,
    i18n::Translations,
    services::{access_service, email_service},
    state::AppState,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "delta_resilience")]
#[command(author, version, about = "Disaster impact data service", long_about = None)]
struct Cli {
    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a country account with its primary admin and print an API key
    Bootstrap {
        /// Country name of the new account
        #[arg(long)]
        country: String,

        /// Email of the primary admin (an existing user is reused)
        #[arg(long, env = "BOOTSTRAP_ADMIN_EMAIL")]
        email: String,

        #[arg(long, default_value = "")]
        first_name: String,

        #[arg(long, default_value = "")]
        last_name: String,

        /// Label of the generated API key
        #[arg(long, default_value = "Bootstrap")]
        key_name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Reads RUST_LOG (defaults to "info")
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    if let Some(Commands::Bootstrap {
        country,
        email,
        first_name,
        last_name,
        key_name,
    }) = cli.command
    {
        let request = access_service::BootstrapRequest {
            country_name: country,
            admin_email: email,
            first_name,
            last_name,
            key_name,
        };
        let mut tx = pool.begin().await?;
        let created = access_service::bootstrap_tenant(&mut tx, &request).await?;
        tx.commit().await?;

        println!("country_accounts_id: {}", created.country_accounts_id);
        println!("admin user_id:       {}", created.user_id);
        println!("api key id:          {}", created.api_key_id);
        println!("api key secret:      {}", created.secret);
        return Ok(());
    }

    let translations = Translations::load_dir(&config.locales_dir, &config.default_lang);
    let mailer = email_service::mailer_from_config(&config.email())?;

    let addr = format!("0.0.0.0:{}", config.server_port);
    let state = AppState {
        pool,
        config: Arc::new(config),
        translations: Arc::new(translations),
        mailer,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
