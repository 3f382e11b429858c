use crate::error::QueryError;
use crate::models::{HealthStatus, RecommendationPayload};
use crate::services::{catalog::CatalogService, recommendation::RecommendationService};
use crate::utils::mean;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

/// Request-facing wrapper: turns query outcomes into payloads and keeps
/// counters. Shared read-only between all request tasks.
pub struct ServingService {
    recommendation_service: RecommendationService,
    catalog_service: CatalogService,
    serving_stats: DashMap<String, u64>,
    started_at: DateTime<Utc>,
}

impl ServingService {
    pub fn new(
        recommendation_service: RecommendationService,
        catalog_service: CatalogService,
    ) -> Self {
        Self {
            recommendation_service,
            catalog_service,
            serving_stats: DashMap::new(),
            started_at: Utc::now(),
        }
    }

    pub fn recommendations(&self) -> &RecommendationService {
        &self.recommendation_service
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.catalog_service
    }

    pub fn serve_recommendations(&self, isbn: &str) -> RecommendationPayload {
        self.increment_stat("total_requests");
        let start_time = Instant::now();

        let isbn = isbn.trim();
        let result = self.recommendation_service.recommend(isbn);

        match &result {
            Ok(recommendations) => {
                self.increment_stat("successful_requests");
                debug!("Served {} recommendations for {}", recommendations.len(), isbn);
            }
            Err(QueryError::NotFound(_)) => self.increment_stat("not_found"),
            Err(QueryError::NotReady) => self.increment_stat("not_ready"),
        }

        let latency = start_time.elapsed().as_micros() as u64;
        self.update_latency_stat(latency);

        RecommendationPayload::from_result(isbn, result)
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            model_loaded: self.recommendation_service.is_ready(),
            catalog_loaded: self.catalog_service.is_ready(),
            started_at: self.started_at,
        }
    }

    pub fn get_serving_stats(&self) -> HashMap<String, u64> {
        let mut stats: HashMap<String, u64> = self
            .serving_stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let total = stats.get("total_latency_us").copied().unwrap_or(0);
        let samples = stats.get("latency_samples").copied().unwrap_or(0);
        if let Some(avg) = mean(total, samples) {
            stats.insert("avg_latency_us".to_string(), avg);
        }
        stats
    }

    pub fn log_readiness(&self) {
        info!(
            "Serving with model_loaded={} catalog_loaded={}",
            self.recommendation_service.is_ready(),
            self.catalog_service.is_ready()
        );
    }

    fn increment_stat(&self, key: &str) {
        let mut counter = self.serving_stats.entry(key.to_string()).or_insert(0);
        *counter += 1;
    }

    // Each key is updated under its own entry guard. Never hold one guard
    // while touching another key, two keys can share a shard.
    fn update_latency_stat(&self, latency_us: u64) {
        *self
            .serving_stats
            .entry("total_latency_us".to_string())
            .or_insert(0) += latency_us;
        self.increment_stat("latency_samples");

        let mut max = self
            .serving_stats
            .entry("max_latency_us".to_string())
            .or_insert(0);
        if latency_us > *max {
            *max = latency_us;
        }
    }
}
