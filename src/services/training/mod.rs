use crate::algorithms::{build_rating_matrix, CosineIndex};
use crate::config::Config;
use crate::data::{self, CsvOptions};
use crate::error::TrainingError;
use crate::models::RatingRecord;
use crate::services::artifacts::{ArtifactStore, TrainedModel};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub books: usize,
    pub users: usize,
    pub ratings_read: usize,
    pub rows_skipped: usize,
    pub elapsed_ms: u128,
}

/// One-shot offline job: ratings CSV in, model artifacts out.
pub struct TrainingPipeline {
    config: Arc<Config>,
    store: ArtifactStore,
}

impl TrainingPipeline {
    pub fn new(config: Arc<Config>) -> Self {
        let store = ArtifactStore::new(config.artifacts.dir.clone());
        Self { config, store }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Filters, pivots and fits without touching the filesystem.
    pub fn train(&self, records: &[RatingRecord]) -> Result<TrainedModel, TrainingError> {
        info!("Creating pivot table from {} ratings...", records.len());
        let pivot = build_rating_matrix(records, &self.config.training)?;

        info!(
            "Fitting cosine index on a {}x{} matrix...",
            pivot.n_items(),
            pivot.n_users()
        );
        let index = CosineIndex::fit(pivot.values())?;

        Ok(TrainedModel::new(index, pivot))
    }

    /// Runs the whole job. Artifacts are written only when every earlier
    /// stage succeeded.
    pub fn run(&self) -> Result<TrainingSummary, TrainingError> {
        let started = Instant::now();

        info!("Loading data for training...");
        let options = CsvOptions::new(self.config.data.delimiter)?;
        let ratings = data::read_ratings(&self.config.data.ratings_path, &options)?;

        let model = self.train(&ratings.rows)?;

        info!("Saving models...");
        self.store.save(&model)?;

        let summary = TrainingSummary {
            books: model.pivot.n_items(),
            users: model.pivot.n_users(),
            ratings_read: ratings.rows.len(),
            rows_skipped: ratings.skipped,
            elapsed_ms: started.elapsed().as_millis(),
        };
        info!("Training complete! Model trained on {} books.", summary.books);
        Ok(summary)
    }
}
