use crate::models::{Book, HealthStatus, RecommendationPayload};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Debug, Deserialize)]
struct BooksQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct BookList<'a> {
    books: &'a [Book],
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

#[derive(Debug, Serialize)]
struct DetailBody {
    detail: &'static str,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.serving.health())
}

/// Reads the query as raw pairs so a repeated or missing `isbn` still gets the
/// recommendation payload; the first `isbn` wins.
async fn recommend(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Json<RecommendationPayload> {
    let isbn = params
        .into_iter()
        .find(|(key, _)| key == "isbn")
        .map(|(_, value)| value)
        .unwrap_or_default();
    Json(state.serving.serve_recommendations(&isbn))
}

async fn get_books(State(state): State<AppState>, Query(params): Query<BooksQuery>) -> Response {
    match state.serving.catalog().catalog() {
        Some(catalog) if !catalog.is_empty() => {
            let limit = params.limit.unwrap_or(state.config.catalog.default_limit);
            Json(BookList {
                books: catalog.head(limit),
            })
            .into_response()
        }
        _ => Json(ErrorBody {
            error: "Books data not loaded",
        })
        .into_response(),
    }
}

async fn get_book_details(State(state): State<AppState>, Path(isbn): Path<String>) -> Response {
    let Some(catalog) = state.serving.catalog().catalog() else {
        return Json(ErrorBody {
            error: "Data not loaded",
        })
        .into_response();
    };

    match catalog.get(&isbn) {
        Some(book) => Json(book).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(DetailBody {
                detail: "Book not found",
            }),
        )
            .into_response(),
    }
}

async fn get_stats(State(state): State<AppState>) -> Json<HashMap<String, u64>> {
    Json(state.serving.get_serving_stats())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/recommend", get(recommend))
        .route("/books", get(get_books))
        .route("/books/:isbn", get(get_book_details))
        .route("/stats", get(get_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
