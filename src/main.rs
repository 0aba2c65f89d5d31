use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pizza_service::config::Config;
use pizza_service::factory::HttpFactoryClient;
use pizza_service::AppState;

#[derive(Parser, Debug)]
#[command(name = "pizza-service")]
#[command(author, version, about = "Pizza storefront backend", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "PIZZA_CONFIG", default_value = "pizza.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override the token signing secret
    #[arg(long, env = "PIZZA_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Override the factory API key
    #[arg(long, env = "PIZZA_FACTORY_API_KEY", hide_env_values = true)]
    factory_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config)?;
    if let Some(secret) = cli.jwt_secret {
        config.auth.jwt_secret = Some(secret);
    }
    if let Some(api_key) = cli.factory_api_key {
        config.factory.api_key = api_key;
    }

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

    tracing::info!("Starting pizza-service v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database
    let db = pizza_service::db::init(&config.database.url, config.database.max_connections).await?;

    let metrics_handle =
        pizza_service::api::metrics::init_metrics().context("Failed to install metrics recorder")?;

    let factory = Arc::new(HttpFactoryClient::from_config(&config.factory)?);
    tracing::info!(url = %factory.order_url(), "Factory client ready");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, db.clone(), factory).with_metrics(metrics_handle);

    // Seed the admin account when one is configured
    let auth = &state.config.auth;
    if let (Some(name), Some(email), Some(password)) =
        (&auth.admin_name, &auth.admin_email, &auth.admin_password)
    {
        state
            .sessions
            .ensure_admin_user(name, email, password)
            .await
            .context("Failed to seed admin user")?;
    }

    let app = pizza_service::api::create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
