use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mycms::auth::session::TokenSigner;
use mycms::config::{Cli, Config, JWT_SECRET_ENV};
use mycms::mail::LogMailer;
use mycms::state::AppState;
use mycms::uploads::LocalAvatarStore;
use mycms::{db, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure uploads directory exists
    let uploads_dir = config.uploads_path();
    std::fs::create_dir_all(&uploads_dir)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let ttl = Duration::days(config.auth.token_days);
    let tokens = match config.auth.jwt_secret.as_deref() {
        Some(secret) if !secret.is_empty() => TokenSigner::new(secret.as_bytes(), ttl),
        _ => {
            tracing::warn!(
                "No JWT secret configured (set {} or [auth].jwt_secret); sessions will not survive a restart",
                JWT_SECRET_ENV
            );
            TokenSigner::with_random_key(ttl)
        }
    };

    // Build app state
    let state = AppState {
        db: pool,
        config: config.clone(),
        tokens: Arc::new(tokens),
        mailer: Arc::new(LogMailer),
        avatars: Arc::new(LocalAvatarStore::new(
            uploads_dir,
            config.storage.public_url.clone(),
        )),
    };

    let app = routes::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
