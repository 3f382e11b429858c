use crate::error::TrainingError;
use ndarray::{Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f32,
}

/// Brute-force cosine nearest-neighbor index over the rows of a matrix.
///
/// Rows are stored L2-normalized so a query costs one matrix-vector product.
/// All-zero rows stay zero and sit at distance 1 from every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CosineIndex {
    normalized: Array2<f32>,
}

impl CosineIndex {
    pub fn fit(rows: &Array2<f32>) -> Result<Self, TrainingError> {
        let (n_rows, n_cols) = rows.dim();
        if n_rows == 0 || n_cols == 0 {
            return Err(TrainingError::DataInsufficient {
                popular_items: n_rows,
                popular_users: n_cols,
            });
        }

        let mut normalized = rows.clone();
        normalized
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut row| {
                let norm = row.dot(&row).sqrt();
                if norm > 0.0 {
                    row.mapv_inplace(|v| v / norm);
                }
            });

        Ok(Self { normalized })
    }

    pub fn len(&self) -> usize {
        self.normalized.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.normalized.ncols()
    }

    /// Returns up to `k` rows nearest to `query` by cosine distance, closest
    /// first, ties broken by ascending row index. `k` is capped at the number
    /// of indexed rows; a query of the wrong width yields no neighbors.
    pub fn kneighbors(&self, query: ArrayView1<'_, f32>, k: usize) -> Vec<Neighbor> {
        if query.len() != self.dimension() || k == 0 {
            return Vec::new();
        }

        let norm = query.dot(&query).sqrt();
        let similarities = self.normalized.dot(&query);

        let mut neighbors: Vec<Neighbor> = similarities
            .iter()
            .enumerate()
            .map(|(row, &dot)| {
                let similarity = if norm > 0.0 { dot / norm } else { 0.0 };
                Neighbor {
                    row,
                    distance: (1.0 - similarity).clamp(0.0, 2.0),
                }
            })
            .collect();

        neighbors.par_sort_unstable_by(compare_neighbors);
        neighbors.truncate(k.min(self.len()));
        neighbors
    }
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.row.cmp(&b.row))
}
