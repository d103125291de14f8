use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use metahub_alerts::{DEFAULT_EVAL_INTERVAL, Evaluator, Notifier, spawn_evaluator};
use metahub_delivery::{DeliveryWorker, TenantTaskPool};
use metahub_ingest::WebhookReceiver;
use metahub_meta::{GraphClient, OauthState};
use metahub_server::api::{AppState, router};
use metahub_server::auth::{SessionResolver, StaticSessionResolver};
use metahub_server::config::HubConfig;
use metahub_store_postgres::PostgresConfig;

/// MetaHub integration hub HTTP server.
#[derive(Parser, Debug)]
#[command(name = "metahub-server", about = "Standalone HTTP server for MetaHub")]
struct Cli {
    /// Bind host.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Bind port.
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber from RUST_LOG or default to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Missing required configuration is fatal; the process exits non-zero.
    let config = HubConfig::from_env()?;

    // Storage: Postgres when DB_URL is set, otherwise the in-memory dev
    // backend. An unreachable database is fatal.
    let stores = match &config.db_url {
        Some(url) => metahub_store_postgres::connect(&PostgresConfig::new(url)).await?,
        None => {
            warn!("DB_URL not set, using the in-memory store; nothing survives a restart");
            metahub_store_memory::memory_stores()
        }
    };

    let worker = Arc::new(DeliveryWorker::new(stores.clone()));
    let pool = TenantTaskPool::new();
    let graph = Arc::new(GraphClient::new());
    let receiver = Arc::new(WebhookReceiver::new(
        stores.clone(),
        Arc::clone(&worker),
        pool,
        Arc::clone(&graph),
        config.webhook_verify_token.clone(),
    ));

    let evaluator = Arc::new(Evaluator::new(
        stores.clone(),
        Notifier::new(Arc::clone(&stores.logs)),
    ));
    let (_evaluator_handle, _evaluator_shutdown) =
        spawn_evaluator(Arc::clone(&evaluator), DEFAULT_EVAL_INTERVAL);
    info!("alert evaluator started");

    let oauth = Arc::new(OauthState::new(
        config.meta_app_id.clone(),
        config.meta_app_secret.clone(),
        config.oauth_redirect_uri(),
    ));

    // Session resolution is an external collaborator; the built-in
    // resolver only knows tokens injected by the deployment.
    let sessions: Arc<dyn SessionResolver> = Arc::new(StaticSessionResolver::new());

    let state = AppState {
        stores,
        receiver,
        worker,
        evaluator,
        oauth,
        graph,
        sessions,
        config,
    };
    let app = router(state);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "metahub-server listening");

    // Serve with graceful shutdown on SIGINT / SIGTERM.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("metahub-server shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful
/// shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
