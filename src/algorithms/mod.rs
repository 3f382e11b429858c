pub mod matrix;
pub mod neighbors;

pub use matrix::{build_rating_matrix, dedupe_ratings, RatingMatrix};
pub use neighbors::{CosineIndex, Neighbor};

/// Neighbors requested per query: the item itself plus five recommendations.
pub const NEIGHBOR_COUNT: usize = 6;
