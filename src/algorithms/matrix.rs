use crate::config::TrainingConfig;
use crate::error::TrainingError;
use crate::models::{RatingRecord, UserId};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Item-by-user rating table. Rows are ISBNs in ascending order, columns are
/// user ids in ascending order, absent ratings are 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingMatrix {
    item_ids: Vec<String>,
    user_ids: Vec<UserId>,
    values: Array2<f32>,
}

impl RatingMatrix {
    pub fn from_parts(
        item_ids: Vec<String>,
        user_ids: Vec<UserId>,
        values: Array2<f32>,
    ) -> Option<Self> {
        if values.dim() != (item_ids.len(), user_ids.len()) {
            return None;
        }
        Some(Self {
            item_ids,
            user_ids,
            values,
        })
    }

    pub fn item_ids(&self) -> &[String] {
        &self.item_ids
    }

    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn row(&self, index: usize) -> Option<ArrayView1<'_, f32>> {
        (index < self.n_items()).then(|| self.values.row(index))
    }

    pub fn n_items(&self) -> usize {
        self.item_ids.len()
    }

    pub fn n_users(&self) -> usize {
        self.user_ids.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// True when the shape agrees with both label lists.
    pub fn is_consistent(&self) -> bool {
        self.values.dim() == (self.item_ids.len(), self.user_ids.len())
    }
}

/// Collapses repeated (user, item) pairs, keeping the last rating seen.
pub fn dedupe_ratings(records: &[RatingRecord]) -> HashMap<(UserId, &str), f32> {
    let mut latest = HashMap::with_capacity(records.len());
    for record in records {
        latest.insert((record.user_id, record.isbn.as_str()), record.rating);
    }
    latest
}

/// Filters the records down to active users and popular books and pivots
/// what is left into an item-by-user matrix.
pub fn build_rating_matrix(
    records: &[RatingRecord],
    thresholds: &TrainingConfig,
) -> Result<RatingMatrix, TrainingError> {
    let ratings = dedupe_ratings(records);
    if ratings.len() < records.len() {
        debug!(
            "Collapsed {} duplicate (user, isbn) ratings",
            records.len() - ratings.len()
        );
    }

    let mut per_user: HashMap<UserId, usize> = HashMap::new();
    for &(user_id, _) in ratings.keys() {
        *per_user.entry(user_id).or_insert(0) += 1;
    }
    let active_users: HashSet<UserId> = per_user
        .into_iter()
        .filter(|&(_, count)| count > thresholds.min_user_ratings)
        .map(|(user_id, _)| user_id)
        .collect();

    let mut per_item: HashMap<&str, usize> = HashMap::new();
    for &(user_id, isbn) in ratings.keys() {
        if active_users.contains(&user_id) {
            *per_item.entry(isbn).or_insert(0) += 1;
        }
    }
    let popular_items: BTreeSet<&str> = per_item
        .into_iter()
        .filter(|&(_, count)| count >= thresholds.min_item_ratings)
        .map(|(isbn, _)| isbn)
        .collect();

    let kept: Vec<(UserId, &str, f32)> = ratings
        .iter()
        .filter(|((user_id, isbn), _)| {
            active_users.contains(user_id) && popular_items.contains(isbn)
        })
        .map(|(&(user_id, isbn), &rating)| (user_id, isbn, rating))
        .collect();
    let users: BTreeSet<UserId> = kept.iter().map(|&(user_id, _, _)| user_id).collect();

    info!(
        "Filtered to {} active users, {} popular books, {} ratings",
        active_users.len(),
        popular_items.len(),
        kept.len()
    );

    if popular_items.is_empty() || users.is_empty() {
        return Err(TrainingError::DataInsufficient {
            popular_items: popular_items.len(),
            popular_users: active_users.len(),
        });
    }

    let row_of: BTreeMap<&str, usize> = popular_items
        .iter()
        .enumerate()
        .map(|(row, &isbn)| (isbn, row))
        .collect();
    let col_of: BTreeMap<UserId, usize> = users
        .iter()
        .enumerate()
        .map(|(col, &user_id)| (user_id, col))
        .collect();

    let mut values = Array2::<f32>::zeros((row_of.len(), col_of.len()));
    for (user_id, isbn, rating) in kept {
        values[[row_of[isbn], col_of[&user_id]]] = rating;
    }

    Ok(RatingMatrix {
        item_ids: popular_items.into_iter().map(str::to_string).collect(),
        user_ids: users.into_iter().collect(),
        values,
    })
}
