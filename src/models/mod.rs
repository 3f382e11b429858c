use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

pub type UserId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub user_id: UserId,
    pub isbn: String,
    pub rating: f32,
}

impl RatingRecord {
    pub fn new(user_id: UserId, isbn: impl Into<String>, rating: f32) -> Self {
        Self {
            user_id,
            isbn: isbn.into(),
            rating,
        }
    }
}

/// One row of the book metadata dataset, keyed by the dataset column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    #[serde(rename = "ISBN")]
    pub isbn: String,
    #[serde(rename = "Book-Title")]
    pub title: String,
    #[serde(rename = "Book-Author")]
    pub author: String,
    #[serde(rename = "Year-Of-Publication")]
    pub year_of_publication: String,
    #[serde(rename = "Publisher")]
    pub publisher: String,
    #[serde(rename = "Image-URL-S")]
    pub image_url_s: String,
    #[serde(rename = "Image-URL-M")]
    pub image_url_m: String,
    #[serde(rename = "Image-URL-L")]
    pub image_url_l: String,
}

/// Response body of the recommendation endpoint. Failures keep the same
/// `recommendations` field so callers can branch on payload shape alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecommendationPayload {
    Found {
        isbn: String,
        recommendations: Vec<String>,
    },
    Failed {
        error: String,
        recommendations: Vec<String>,
    },
}

impl RecommendationPayload {
    pub fn from_result(isbn: &str, result: Result<Vec<String>, QueryError>) -> Self {
        match result {
            Ok(recommendations) => Self::Found {
                isbn: isbn.to_string(),
                recommendations,
            },
            Err(e) => Self::Failed {
                error: e.to_string(),
                recommendations: Vec::new(),
            },
        }
    }

    pub fn recommendations(&self) -> &[String] {
        match self {
            Self::Found { recommendations, .. } | Self::Failed { recommendations, .. } => {
                recommendations
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub version: String,
    pub model_loaded: bool,
    pub catalog_loaded: bool,
    pub started_at: DateTime<Utc>,
}
