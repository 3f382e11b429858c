use crate::algorithms::{CosineIndex, RatingMatrix, NEIGHBOR_COUNT};
use crate::error::{ArtifactError, QueryError};
use crate::services::artifacts::{ArtifactStore, TrainedModel};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// A loaded model ready to answer queries. Immutable once built.
#[derive(Debug)]
pub struct Recommender {
    index: CosineIndex,
    pivot: RatingMatrix,
    isbns: Vec<String>,
    rows_by_isbn: HashMap<String, usize>,
}

impl Recommender {
    pub fn from_model(model: TrainedModel) -> Result<Self, ArtifactError> {
        model.validate()?;
        let rows_by_isbn = model
            .isbns
            .iter()
            .enumerate()
            .map(|(row, isbn)| (isbn.clone(), row))
            .collect();

        Ok(Self {
            index: model.index,
            pivot: model.pivot,
            isbns: model.isbns,
            rows_by_isbn,
        })
    }

    pub fn book_count(&self) -> usize {
        self.isbns.len()
    }

    pub fn contains(&self, isbn: &str) -> bool {
        self.rows_by_isbn.contains_key(isbn)
    }

    /// Up to five books whose rating vectors are closest to `isbn`'s, nearest
    /// first. The queried book itself is never part of the result.
    pub fn recommend(&self, isbn: &str) -> Result<Vec<String>, QueryError> {
        let row = *self
            .rows_by_isbn
            .get(isbn)
            .ok_or_else(|| QueryError::NotFound(isbn.to_string()))?;
        let query = self
            .pivot
            .row(row)
            .ok_or_else(|| QueryError::NotFound(isbn.to_string()))?;

        let recommendations = self
            .index
            .kneighbors(query, NEIGHBOR_COUNT)
            .into_iter()
            .filter(|neighbor| neighbor.row != row)
            .take(NEIGHBOR_COUNT - 1)
            .map(|neighbor| self.isbns[neighbor.row].clone())
            .collect();

        Ok(recommendations)
    }
}

/// Lifecycle of the served model. Entered once at startup and never changed.
#[derive(Debug, Clone)]
pub enum ModelState {
    Unloaded,
    Ready(Arc<Recommender>),
}

#[derive(Debug, Clone)]
pub struct RecommendationService {
    state: ModelState,
}

impl RecommendationService {
    pub fn unloaded() -> Self {
        Self {
            state: ModelState::Unloaded,
        }
    }

    pub fn ready(recommender: Recommender) -> Self {
        Self {
            state: ModelState::Ready(Arc::new(recommender)),
        }
    }

    /// Loads the artifacts from `store`. Any failure is logged and leaves the
    /// service `Unloaded` so the rest of the server keeps running.
    pub fn load(store: &ArtifactStore) -> Self {
        match store.load().and_then(Recommender::from_model) {
            Ok(recommender) => {
                info!(
                    "Recommender models loaded from {} ({} books)",
                    store.dir().display(),
                    recommender.book_count()
                );
                Self::ready(recommender)
            }
            Err(e) => {
                error!("Error loading recommender models: {}", e);
                Self::unloaded()
            }
        }
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ModelState::Ready(_))
    }

    pub fn recommend(&self, isbn: &str) -> Result<Vec<String>, QueryError> {
        match &self.state {
            ModelState::Unloaded => Err(QueryError::NotReady),
            ModelState::Ready(recommender) => recommender.recommend(isbn),
        }
    }
}
