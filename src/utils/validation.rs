use crate::models::RatingRecord;
use anyhow::{anyhow, Result};

/// Highest value on the Book-Crossing rating scale; 0 marks an implicit rating.
pub const MAX_RATING: f32 = 10.0;

pub fn validate_rating_record(record: &RatingRecord) -> Result<()> {
    if record.isbn.trim().is_empty() {
        return Err(anyhow!("ISBN cannot be empty"));
    }

    if !record.rating.is_finite() {
        return Err(anyhow!("Rating contains invalid value (NaN or Infinity)"));
    }

    if record.rating < 0.0 || record.rating > MAX_RATING {
        return Err(anyhow!(
            "Rating must be between 0 and {}, got {}",
            MAX_RATING,
            record.rating
        ));
    }

    Ok(())
}
