use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading the raw CSV datasets.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {}", .path.display(), .source)]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{} has no `{}` column", .path.display(), .column)]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("delimiter {0:?} is not a single ASCII character")]
    InvalidDelimiter(char),
}

/// Failures reading or writing the persisted model artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact {} is missing", .0.display())]
    Missing(PathBuf),

    #[error("i/o error on artifact {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {name} is corrupt: {source}")]
    Corrupt {
        name: &'static str,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to encode artifact {name}: {source}")]
    Encode {
        name: &'static str,
        #[source]
        source: bincode::Error,
    },

    #[error("artifact schema mismatch: {0}")]
    SchemaMismatch(String),
}

/// Terminal failures of a training run.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(
        "insufficient data: {popular_items} popular items among {popular_users} active users after filtering"
    )]
    DataInsufficient {
        popular_items: usize,
        popular_users: usize,
    },

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Expected, user-facing outcomes of a recommendation query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Model not loaded")]
    NotReady,

    #[error("Book not found in popular index")]
    NotFound(String),
}
