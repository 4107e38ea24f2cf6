//! Text-to-CAD HTTP service.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod ai;
pub mod analytics;
pub mod cad;
pub mod code;
pub mod config;
pub mod error;
pub mod executor;
pub mod routes;
pub mod storage;
pub mod users;

use ai::AiGenerator;
use analytics::AnalyticsClient;
use config::Settings;
use executor::DslExecutor;
use storage::{ModelStorage, StorageError};
use users::{StoreError, UserStore};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("model storage: {0}")]
    Storage(#[from] StorageError),
    #[error("user store: {0}")]
    Users(#[from] StoreError),
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub storage: Arc<ModelStorage>,
    pub users: Arc<UserStore>,
    pub executor: Arc<DslExecutor>,
    pub ai: Arc<AiGenerator>,
    pub analytics: AnalyticsClient,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self, InitError> {
        let storage = Arc::new(ModelStorage::new(&settings.temp_dir, settings.model_ttl)?);
        let users = Arc::new(UserStore::open(&settings.user_data_file, settings.max_models_per_user)?);
        let executor = Arc::new(DslExecutor::new(
            settings.dsl_command.clone(),
            settings.dsl_timeout,
            storage.clone(),
        ));
        let ai = Arc::new(AiGenerator::new(&settings));
        let analytics = AnalyticsClient::new(settings.analytics_url.clone());

        Ok(Self {
            settings: Arc::new(settings),
            storage,
            users,
            executor,
            ai,
            analytics,
        })
    }
}

pub fn app(state: AppState) -> Router {
    routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Hourly removal of expired model files
pub fn spawn_cleanup(storage: Arc<ModelStorage>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        // the first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            storage.cleanup_expired().await;
        }
    })
}
