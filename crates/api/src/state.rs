use std::sync::Arc;

use brandgen_db::store::RequestStore;
use brandgen_events::{Alerts, Notifier};
use brandgen_pipeline::admin::AdminReview;
use brandgen_pipeline::artifacts::ArtifactStore;
use brandgen_pipeline::config::PollConfig;
use brandgen_pipeline::generation::GenerationService;
use brandgen_pipeline::lifecycle::RequestLifecycle;
use brandgen_pipeline::poller::Poller;
use brandgen_provider::GenerationProvider;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Present when running against Postgres.
    pub pool: Option<brandgen_db::DbPool>,
    pub config: Arc<ServerConfig>,
    pub ws_manager: Arc<WsManager>,
    pub notifier: Arc<dyn Notifier>,
    pub lifecycle: Arc<RequestLifecycle>,
    pub generation: Arc<GenerationService>,
    pub admin: Arc<AdminReview>,
}

/// Everything [`AppState::assemble`] wires together.
pub struct AppComponents {
    pub config: ServerConfig,
    pub pool: Option<brandgen_db::DbPool>,
    pub store: Arc<dyn RequestStore>,
    pub notifier: Arc<dyn Notifier>,
    pub provider: Arc<dyn GenerationProvider>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub alerts: Alerts,
    pub poll: PollConfig,
}

impl AppState {
    /// Build the pipeline services and start listening for retry signals.
    pub fn assemble(parts: AppComponents) -> Self {
        let lifecycle = Arc::new(RequestLifecycle::new(
            parts.store,
            Arc::clone(&parts.notifier),
            parts.alerts,
        ));
        let poller = Arc::new(Poller::new(
            Arc::clone(&lifecycle),
            Arc::clone(&parts.provider),
            parts.poll,
        ));
        let generation = GenerationService::new(Arc::clone(&lifecycle), parts.provider, poller);
        generation.start_retry_listener();
        let admin = Arc::new(AdminReview::new(Arc::clone(&lifecycle), parts.artifacts));

        Self {
            pool: parts.pool,
            config: Arc::new(parts.config),
            ws_manager: Arc::new(WsManager::new()),
            notifier: parts.notifier,
            lifecycle,
            generation,
            admin,
        }
    }
}
