pub mod algorithms;
pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{ArtifactError, IngestError, QueryError, TrainingError};
pub use models::*;

use anyhow::Result;
use services::artifacts::ArtifactStore;
use services::catalog::CatalogService;
use services::recommendation::RecommendationService;
use services::serving::ServingService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub serving: Arc<ServingService>,
}

impl AppState {
    /// Loads the model artifacts and the book catalog on blocking threads.
    /// Either may fail independently; the failed part stays unloaded.
    pub async fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let store = ArtifactStore::new(config.artifacts.dir.clone());
        let recommendation_service =
            tokio::task::spawn_blocking(move || RecommendationService::load(&store));

        let catalog_config = config.clone();
        let catalog_service =
            tokio::task::spawn_blocking(move || CatalogService::load(&catalog_config));

        let serving = ServingService::new(recommendation_service.await?, catalog_service.await?);
        serving.log_readiness();

        Ok(Self::from_parts(config, serving))
    }

    pub fn from_parts(config: Arc<Config>, serving: ServingService) -> Self {
        Self {
            config,
            serving: Arc::new(serving),
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
