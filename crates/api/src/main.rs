use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use brandgen_db::store::{InMemoryRequestStore, PgRequestStore, RequestStore};
use brandgen_events::delivery::email::{EmailConfig, EmailDelivery};
use brandgen_events::delivery::webhook::WebhookDelivery;
use brandgen_events::{Alerts, BroadcastHub, CrossContextNotifier};
use brandgen_pipeline::artifacts::{ArtifactConfig, LocalArtifactStore};
use brandgen_pipeline::config::PollConfig;
use brandgen_provider::{GenerationProvider, HttpProvider, ProviderConfig, ScriptedProvider};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brandgen_api::config::ServerConfig;
use brandgen_api::router::build_app_router;
use brandgen_api::state::{AppComponents, AppState};
use brandgen_api::ws;

/// `PROVIDER_API_URL` value that selects the in-process scripted provider.
const SCRIPTED_PROVIDER: &str = "scripted";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "brandgen_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let background = CancellationToken::new();

    // --- Request store ---
    let (store, pool, listener_handle): (Arc<dyn RequestStore>, _, _) =
        match std::env::var("DATABASE_URL") {
            Ok(database_url) => {
                let pool = brandgen_db::create_pool(&database_url)
                    .await
                    .expect("Failed to connect to database");
                tracing::info!("Database connection pool created");

                brandgen_db::health_check(&pool)
                    .await
                    .expect("Database health check failed");
                brandgen_db::run_migrations(&pool)
                    .await
                    .expect("Failed to run database migrations");
                tracing::info!("Database migrations applied");

                let store = PgRequestStore::new(pool.clone());
                let listener = store.spawn_change_listener(background.clone());
                (Arc::new(store), Some(pool), Some(listener))
            }
            Err(_) => {
                tracing::warn!("DATABASE_URL not set, using the in-memory request store");
                (Arc::new(InMemoryRequestStore::new()), None, None)
            }
        };

    // --- Provider ---
    let provider_config = ProviderConfig::from_env();
    let provider: Arc<dyn GenerationProvider> = if provider_config.api_url == SCRIPTED_PROVIDER {
        tracing::warn!("Using the scripted provider; nothing is generated");
        Arc::new(ScriptedProvider::new())
    } else {
        tracing::info!(api_url = %provider_config.api_url, "Using HTTP provider");
        Arc::new(HttpProvider::new(provider_config).expect("Failed to build provider client"))
    };

    // --- Alerts ---
    let mut alerts = Alerts::none();
    if let Some(email) = EmailConfig::from_env() {
        tracing::info!(host = %email.smtp_host, "Email alerts enabled");
        alerts = alerts.with(Arc::new(EmailDelivery::new(email)));
    }
    if let Some(webhook) = WebhookDelivery::from_env() {
        let webhook = webhook.expect("ALERT_WEBHOOK_URL is invalid");
        tracing::info!(url = %webhook.url(), "Webhook alerts enabled");
        alerts = alerts.with(Arc::new(webhook));
    }

    // --- Notifier ---
    // The store relay gets its own context so its events reach the API's
    // subscribers through the broadcast leg.
    let hub = BroadcastHub::new();
    let notifier = Arc::new(CrossContextNotifier::new(&hub, "api"));
    let relay_notifier = Arc::new(CrossContextNotifier::new(&hub, "store-relay"));

    // --- Artifacts ---
    let artifacts = Arc::new(LocalArtifactStore::new(ArtifactConfig::from_env()));

    // --- App state ---
    let state = AppState::assemble(AppComponents {
        config: config.clone(),
        pool,
        store: Arc::clone(&store),
        notifier: notifier.clone(),
        provider,
        artifacts,
        alerts,
        poll: PollConfig::from_env(),
    });

    let relay_handle = listener_handle.as_ref().map(|_| {
        ws::spawn_store_relay(Arc::clone(&store), relay_notifier.clone(), background.clone())
    });
    let bridge = ws::EventBridge::spawn(notifier.as_ref(), Arc::clone(&state.ws_manager));
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&state.ws_manager), background.clone());

    let generation = Arc::clone(&state.generation);
    let ws_manager = Arc::clone(&state.ws_manager);
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let grace = Duration::from_secs(config.shutdown_timeout_secs);

    if tokio::time::timeout(grace, generation.shutdown()).await.is_err() {
        tracing::warn!("Pollers did not stop in time");
    }

    background.cancel();
    for handle in [listener_handle, relay_handle].into_iter().flatten() {
        let _ = tokio::time::timeout(grace, handle).await;
    }
    let _ = heartbeat_handle.await;

    relay_notifier.close();
    notifier.close();
    bridge.shutdown().await;

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
