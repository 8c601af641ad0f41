use anyhow::Result;
use clap::Parser;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inboxr::auth::{AuthService, AuthSettings, TokenIssuer};
use inboxr::config::Config;
use inboxr::mailer::{LogMailer, Mailer, SmtpMailer};
use inboxr::store::{SqliteStore, UserStore};
use inboxr::AppState;

#[derive(Parser, Debug)]
#[command(name = "inboxr")]
#[command(author, version, about = "Social-media inbox manager - auth and session service", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "inboxr.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Inboxr v{}", env!("CARGO_PKG_VERSION"));

    // Ensure data directory exists
    std::fs::create_dir_all(&config.server.data_dir)?;

    // Initialize database
    let db = inboxr::db::init(&config.server.data_dir).await?;
    let store: Arc<dyn UserStore> = Arc::new(SqliteStore::new(db));

    // JWT signing secret. Without a configured secret every restart
    // invalidates all outstanding access tokens.
    let jwt_secret = match &config.auth.jwt_secret {
        Some(secret) => secret.clone(),
        None => {
            tracing::warn!(
                "auth.jwt_secret not set; using a random secret (sessions will not survive restarts)"
            );
            let bytes: [u8; 32] = rand::rng().random();
            hex::encode(bytes)
        }
    };
    let tokens = TokenIssuer::new(
        jwt_secret.as_bytes(),
        config.auth.access_token_minutes,
        config.auth.refresh_token_days,
    );

    let mailer: Arc<dyn Mailer> = if config.email.is_configured() {
        Arc::new(SmtpMailer::new(
            config.email.clone(),
            config.server.frontend_base_url.clone(),
        ))
    } else {
        Arc::new(LogMailer::new(config.server.frontend_base_url.clone()))
    };

    let auth = AuthService::new(store, tokens, mailer, AuthSettings::from(&config.auth));

    // Ensure an admin exists on an empty database
    auth.bootstrap_initial_admin().await?;

    let state = Arc::new(AppState::new(config.clone(), auth));

    // Periodic garbage collection of expired refresh and verification tokens
    let gc_auth = state.auth.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            if let Err(e) = gc_auth.cleanup_expired_tokens().await {
                tracing::error!(error = %e, "Refresh token cleanup failed");
            }
            if let Err(e) = gc_auth.cleanup_expired_verification_tokens().await {
                tracing::error!(error = %e, "Verification token cleanup failed");
            }
        }
    });

    let app = inboxr::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
