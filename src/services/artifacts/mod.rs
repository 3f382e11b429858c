use crate::algorithms::{CosineIndex, RatingMatrix};
use crate::error::ArtifactError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const FORMAT_VERSION: u32 = 1;

pub const MODEL_KNN: &str = "model_knn";
pub const PIVOT_TABLE: &str = "pivot_table";
pub const BOOK_ISBNS: &str = "book_isbns";

/// Everything one training run produces and the server needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub index: CosineIndex,
    pub pivot: RatingMatrix,
    pub isbns: Vec<String>,
}

impl TrainedModel {
    pub fn new(index: CosineIndex, pivot: RatingMatrix) -> Self {
        let isbns = pivot.item_ids().to_vec();
        Self {
            index,
            pivot,
            isbns,
        }
    }

    /// Checks that the three parts describe the same rows in the same order.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if !self.pivot.is_consistent() {
            return Err(ArtifactError::SchemaMismatch(format!(
                "{} shape {:?} disagrees with its labels",
                PIVOT_TABLE,
                self.pivot.shape()
            )));
        }
        if self.pivot.n_items() == 0 {
            return Err(ArtifactError::SchemaMismatch(format!(
                "{} has no rows",
                PIVOT_TABLE
            )));
        }
        if self.isbns.as_slice() != self.pivot.item_ids() {
            return Err(ArtifactError::SchemaMismatch(format!(
                "{} is not aligned with the rows of {}",
                BOOK_ISBNS, PIVOT_TABLE
            )));
        }
        if self.index.len() != self.pivot.n_items() || self.index.dimension() != self.pivot.n_users() {
            return Err(ArtifactError::SchemaMismatch(format!(
                "{} was fitted on a {}x{} matrix but {} is {}x{}",
                MODEL_KNN,
                self.index.len(),
                self.index.dimension(),
                PIVOT_TABLE,
                self.pivot.n_items(),
                self.pivot.n_users()
            )));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct BlobRef<'a, T> {
    format_version: u32,
    kind: &'a str,
    generation: &'a str,
    payload: &'a T,
}

#[derive(Deserialize)]
struct BlobHeader {
    format_version: u32,
    kind: String,
}

#[derive(Deserialize)]
struct Blob<T> {
    #[allow(dead_code)]
    format_version: u32,
    #[allow(dead_code)]
    kind: String,
    generation: String,
    payload: T,
}

/// Hex SHA-256 over the three payloads. Every blob of one save carries it, so
/// files from different training runs cannot be loaded together.
fn generation(model: &TrainedModel) -> Result<String, ArtifactError> {
    let mut hasher = Sha256::new();
    hasher.update(
        bincode::serialize(&model.index)
            .map_err(|source| ArtifactError::Encode { name: MODEL_KNN, source })?,
    );
    hasher.update(
        bincode::serialize(&model.pivot)
            .map_err(|source| ArtifactError::Encode { name: PIVOT_TABLE, source })?,
    );
    hasher.update(
        bincode::serialize(&model.isbns)
            .map_err(|source| ArtifactError::Encode { name: BOOK_ISBNS, source })?,
    );
    Ok(format!("{:x}", hasher.finalize()))
}

fn encode<T: Serialize>(
    name: &'static str,
    generation: &str,
    payload: &T,
) -> Result<Vec<u8>, ArtifactError> {
    let blob = BlobRef {
        format_version: FORMAT_VERSION,
        kind: name,
        generation,
        payload,
    };
    bincode::serialize(&blob).map_err(|source| ArtifactError::Encode { name, source })
}

fn decode<T: DeserializeOwned>(
    name: &'static str,
    bytes: &[u8],
) -> Result<(String, T), ArtifactError> {
    let header: BlobHeader =
        bincode::deserialize(bytes).map_err(|source| ArtifactError::Corrupt { name, source })?;
    if header.format_version != FORMAT_VERSION {
        return Err(ArtifactError::SchemaMismatch(format!(
            "{} has format version {}, expected {}",
            name, header.format_version, FORMAT_VERSION
        )));
    }
    if header.kind != name {
        return Err(ArtifactError::SchemaMismatch(format!(
            "expected a {} artifact, found {}",
            name, header.kind
        )));
    }

    let blob: Blob<T> =
        bincode::deserialize(bytes).map_err(|source| ArtifactError::Corrupt { name, source })?;
    Ok((blob.generation, blob.payload))
}

/// One artifact on its way into the store.
struct Staged {
    tmp: PathBuf,
    target: PathBuf,
    backup: PathBuf,
}

/// Directory holding the three serialized artifacts of one trained model.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", name))
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
        move |source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Writes all three artifacts. Every blob is written to a temporary file
    /// first; the previous files are moved aside while the new ones are renamed
    /// in and restored if any step fails, so the store holds either the old
    /// model or the new one.
    pub fn save(&self, model: &TrainedModel) -> Result<(), ArtifactError> {
        model.validate()?;

        let generation = generation(model)?;
        let blobs = [
            (MODEL_KNN, encode(MODEL_KNN, &generation, &model.index)?),
            (PIVOT_TABLE, encode(PIVOT_TABLE, &generation, &model.pivot)?),
            (BOOK_ISBNS, encode(BOOK_ISBNS, &generation, &model.isbns)?),
        ];

        fs::create_dir_all(&self.dir).map_err(Self::io_error(&self.dir))?;

        let mut staged = Vec::with_capacity(blobs.len());
        for (name, bytes) in &blobs {
            let entry = Staged {
                tmp: self.dir.join(format!("{}.bin.tmp", name)),
                target: self.path(name),
                backup: self.dir.join(format!("{}.bin.bak", name)),
            };
            if let Err(source) = fs::write(&entry.tmp, bytes) {
                let path = entry.tmp.clone();
                staged.push(entry);
                Self::discard(&staged);
                return Err(ArtifactError::Io { path, source });
            }
            staged.push(entry);
        }

        Self::commit(&staged)?;

        info!(
            "Saved {}, {} and {} to {} (generation {})",
            MODEL_KNN,
            PIVOT_TABLE,
            BOOK_ISBNS,
            self.dir.display(),
            &generation[..12]
        );
        Ok(())
    }

    fn commit(staged: &[Staged]) -> Result<(), ArtifactError> {
        let mut committed: Vec<(&Staged, bool)> = Vec::with_capacity(staged.len());
        for entry in staged {
            let had_previous = entry.target.exists();
            if had_previous {
                if let Err(source) = fs::rename(&entry.target, &entry.backup) {
                    Self::roll_back(staged, &committed);
                    return Err(ArtifactError::Io {
                        path: entry.target.clone(),
                        source,
                    });
                }
            }
            committed.push((entry, had_previous));
            if let Err(source) = fs::rename(&entry.tmp, &entry.target) {
                Self::roll_back(staged, &committed);
                return Err(ArtifactError::Io {
                    path: entry.target.clone(),
                    source,
                });
            }
        }

        for (entry, had_previous) in &committed {
            if *had_previous {
                let _ = fs::remove_file(&entry.backup);
            }
        }
        Ok(())
    }

    fn roll_back(staged: &[Staged], committed: &[(&Staged, bool)]) {
        warn!("Artifact save failed, restoring the previous model");
        for (entry, had_previous) in committed.iter().rev() {
            let restored = if *had_previous {
                fs::rename(&entry.backup, &entry.target)
            } else {
                fs::remove_file(&entry.target)
            };
            if let Err(e) = restored {
                warn!("Could not restore {}: {}", entry.target.display(), e);
            }
        }
        Self::discard(staged);
    }

    fn discard(staged: &[Staged]) {
        for entry in staged {
            let _ = fs::remove_file(&entry.tmp);
        }
    }

    pub fn load(&self) -> Result<TrainedModel, ArtifactError> {
        let (knn_generation, index) = self.read(MODEL_KNN)?;
        let (pivot_generation, pivot) = self.read(PIVOT_TABLE)?;
        let (isbns_generation, isbns) = self.read(BOOK_ISBNS)?;
        if knn_generation != pivot_generation || knn_generation != isbns_generation {
            return Err(ArtifactError::SchemaMismatch(format!(
                "{}, {} and {} come from different training runs",
                MODEL_KNN, PIVOT_TABLE, BOOK_ISBNS
            )));
        }

        let model = TrainedModel {
            index,
            pivot,
            isbns,
        };
        model.validate()?;
        Ok(model)
    }

    fn read<T: DeserializeOwned>(&self, name: &'static str) -> Result<(String, T), ArtifactError> {
        let path = self.path(name);
        if !path.exists() {
            return Err(ArtifactError::Missing(path));
        }
        let bytes = fs::read(&path).map_err(Self::io_error(&path))?;
        decode(name, &bytes)
    }
}
