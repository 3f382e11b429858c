use axum::body::Body;
use axum::http::{Request, StatusCode};
use bookrec::algorithms::NEIGHBOR_COUNT;
use bookrec::api::create_router;
use bookrec::services::artifacts::{ArtifactStore, BOOK_ISBNS, MODEL_KNN, PIVOT_TABLE};
use bookrec::services::catalog::{BookCatalog, CatalogService};
use bookrec::services::recommendation::{RecommendationService, Recommender};
use bookrec::services::serving::ServingService;
use bookrec::services::training::TrainingPipeline;
use bookrec::*;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

/// Ratings shaped like the Book-Crossing dump, sized to exercise the default
/// thresholds:
/// - users 1..=60 each rate the 210 books b000..b209 (kept: > 200 ratings)
/// - user 500 rates exactly 200 books (dropped: not > 200)
/// - user 999 rates five books (dropped)
/// - "edge50" is rated by 50 kept users (kept: >= 50)
/// - "edge49" is rated by 49 kept users (dropped)
/// - user 1 re-rates b000 at the end of the file (last write wins)
fn sample_ratings() -> Vec<RatingRecord> {
    let mut records = Vec::new();
    for user in 1..=60u64 {
        for book in 0..210u64 {
            let rating = ((user * 31 + book * 17 + (user * book) / 7) % 10 + 1) as f32;
            records.push(RatingRecord::new(user, format!("b{:03}", book), rating));
        }
    }
    for book in 0..200u64 {
        records.push(RatingRecord::new(500, format!("b{:03}", book), 8.0));
    }
    for book in 0..5u64 {
        records.push(RatingRecord::new(999, format!("b{:03}", book), 10.0));
    }
    for user in 1..=50u64 {
        records.push(RatingRecord::new(user, "edge50", (user % 10) as f32));
    }
    for user in 1..=49u64 {
        records.push(RatingRecord::new(user, "edge49", 5.0));
    }
    records.push(RatingRecord::new(1, "b000", 0.0));
    records
}

fn write_ratings_csv(path: &Path, records: &[RatingRecord]) {
    let mut contents = String::from("User-ID,ISBN,Book-Rating\n");
    for record in records {
        writeln!(contents, "{},{},{}", record.user_id, record.isbn, record.rating).unwrap();
    }
    contents.push_str("not-a-user,b000,5\n");
    std::fs::write(path, contents).unwrap();
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.data.ratings_path = dir.join("Ratings.csv");
    config.data.books_path = dir.join("Books.csv");
    config.artifacts.dir = dir.join("models");
    config
}

fn book(isbn: &str, title: &str) -> Book {
    Book {
        isbn: isbn.to_string(),
        title: title.to_string(),
        author: "Author".to_string(),
        year_of_publication: "2001".to_string(),
        publisher: "Publisher".to_string(),
        image_url_s: String::new(),
        image_url_m: String::new(),
        image_url_l: "https://via.placeholder.com/150".to_string(),
    }
}

#[test]
fn test_training_pipeline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let records = sample_ratings();
    write_ratings_csv(&dir.path().join("Ratings.csv"), &records);

    let pipeline = TrainingPipeline::new(Arc::new(test_config(dir.path())));
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.books, 211);
    assert_eq!(summary.users, 60);
    assert_eq!(summary.ratings_read, records.len());
    assert_eq!(summary.rows_skipped, 1);

    let store = pipeline.store();
    for name in [MODEL_KNN, PIVOT_TABLE, BOOK_ISBNS] {
        assert!(store.path(name).exists(), "{} was not written", name);
    }

    let model = store.load().unwrap();
    assert!(model.isbns.contains(&"edge50".to_string()));
    assert!(!model.isbns.contains(&"edge49".to_string()));
    assert!(!model.pivot.user_ids().contains(&500));
    assert!(!model.pivot.user_ids().contains(&999));

    let row = model.isbns.iter().position(|isbn| isbn == "b000").unwrap();
    assert_eq!(model.pivot.values()[[row, 0]], 0.0);
}

#[test]
fn test_matrix_rows_and_columns_satisfy_thresholds() {
    let records = sample_ratings();
    let thresholds = bookrec::config::TrainingConfig::default();
    let matrix = bookrec::algorithms::build_rating_matrix(&records, &thresholds).unwrap();

    let latest = bookrec::algorithms::dedupe_ratings(&records);
    let mut user_totals: HashMap<u64, usize> = HashMap::new();
    for &(user_id, _) in latest.keys() {
        *user_totals.entry(user_id).or_insert(0) += 1;
    }
    for user_id in matrix.user_ids() {
        assert!(user_totals[user_id] > thresholds.min_user_ratings);
    }

    let columns: HashSet<u64> = matrix.user_ids().iter().copied().collect();
    for isbn in matrix.item_ids() {
        let qualifying = latest
            .keys()
            .filter(|(user_id, item)| item == isbn && columns.contains(user_id))
            .count();
        assert!(qualifying >= thresholds.min_item_ratings, "{} has {}", isbn, qualifying);
    }

    let mut sorted = matrix.item_ids().to_vec();
    sorted.sort();
    assert_eq!(sorted, matrix.item_ids());
}

#[test]
fn test_recommendations_exclude_self_and_are_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = TrainingPipeline::new(Arc::new(test_config(dir.path())));
    let model = pipeline.train(&sample_ratings()).unwrap();
    let isbns = model.isbns.clone();
    let recommender = Recommender::from_model(model).unwrap();

    for isbn in &isbns {
        let recs = recommender.recommend(isbn).unwrap();
        assert_eq!(recs.len(), NEIGHBOR_COUNT - 1);
        assert!(!recs.contains(isbn));
        assert!(recs.iter().all(|r| isbns.contains(r)));
    }

    assert_eq!(
        recommender.recommend("unknown-isbn"),
        Err(QueryError::NotFound("unknown-isbn".to_string()))
    );
}

#[test]
fn test_recommendations_bounded_by_item_count() {
    let thresholds_config = {
        let mut config = Config::default();
        config.training.min_user_ratings = 1;
        config.training.min_item_ratings = 2;
        config
    };
    let records = vec![
        RatingRecord::new(1, "x", 5.0),
        RatingRecord::new(1, "y", 3.0),
        RatingRecord::new(1, "z", 1.0),
        RatingRecord::new(2, "x", 4.0),
        RatingRecord::new(2, "y", 4.0),
        RatingRecord::new(2, "z", 2.0),
    ];
    let pipeline = TrainingPipeline::new(Arc::new(thresholds_config));
    let recommender = Recommender::from_model(pipeline.train(&records).unwrap()).unwrap();

    for isbn in ["x", "y", "z"] {
        let recs = recommender.recommend(isbn).unwrap();
        assert_eq!(recs.len(), 2);
        assert!(!recs.iter().any(|r| r == isbn));
    }
}

#[test]
fn test_training_is_idempotent() {
    let records = sample_ratings();
    let first_dir = tempfile::tempdir().unwrap();
    let second_dir = tempfile::tempdir().unwrap();

    let first = TrainingPipeline::new(Arc::new(test_config(first_dir.path())));
    let second = TrainingPipeline::new(Arc::new(test_config(second_dir.path())));
    let a = first.train(&records).unwrap();
    let b = second.train(&records).unwrap();
    assert_eq!(a, b);

    first.store().save(&a).unwrap();
    second.store().save(&b).unwrap();
    for name in [MODEL_KNN, PIVOT_TABLE, BOOK_ISBNS] {
        let x = std::fs::read(first.store().path(name)).unwrap();
        let y = std::fs::read(second.store().path(name)).unwrap();
        assert_eq!(x, y, "{} differs between runs", name);
    }

    let a = Recommender::from_model(a).unwrap();
    let b = Recommender::from_model(b).unwrap();
    for isbn in ["b000", "b105", "b209", "edge50"] {
        assert_eq!(a.recommend(isbn), b.recommend(isbn));
    }
}

#[test]
fn test_insufficient_data_writes_no_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let records: Vec<RatingRecord> = (0..10)
        .map(|book| RatingRecord::new(1, format!("b{}", book), 5.0))
        .collect();
    write_ratings_csv(&dir.path().join("Ratings.csv"), &records);

    let pipeline = TrainingPipeline::new(Arc::new(test_config(dir.path())));
    assert!(matches!(
        pipeline.run(),
        Err(TrainingError::DataInsufficient { .. })
    ));
    assert!(!pipeline.store().path(MODEL_KNN).exists());
}

fn ready_state(dir: &Path) -> AppState {
    let config = test_config(dir);
    let pipeline = TrainingPipeline::new(Arc::new(config.clone()));
    let model = pipeline.train(&sample_ratings()).unwrap();

    let serving = ServingService::new(
        RecommendationService::ready(Recommender::from_model(model).unwrap()),
        CatalogService::ready(BookCatalog::new(vec![
            book("b000", "First"),
            book("b001", "Second"),
            book("b002", "Third"),
        ])),
    );
    AppState::from_parts(Arc::new(config), serving)
}

fn unloaded_state() -> AppState {
    let serving = ServingService::new(RecommendationService::unloaded(), CatalogService::unloaded());
    AppState::from_parts(Arc::new(Config::default()), serving)
}

async fn get_json(state: AppState, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = create_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_recommend_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = get_json(ready_state(dir.path()), "/recommend?isbn=b000").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isbn"], "b000");
    let recs = body["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 5);
    assert!(recs.iter().all(|r| r != "b000"));
}

#[tokio::test]
async fn test_recommend_unknown_isbn_returns_error_payload() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = get_json(ready_state(dir.path()), "/recommend?isbn=unknown-isbn").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Book not found in popular index");
    assert_eq!(body["recommendations"], serde_json::json!([]));
}

#[tokio::test]
async fn test_recommend_before_load_returns_not_ready_payload() {
    let (status, body) = get_json(unloaded_state(), "/recommend?isbn=b000").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Model not loaded");
    assert_eq!(body["recommendations"], serde_json::json!([]));

    let (status, body) = get_json(unloaded_state(), "/recommend").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Model not loaded");
}

#[tokio::test]
async fn test_recommend_with_repeated_isbn_uses_first_value() {
    let dir = tempfile::tempdir().unwrap();
    let state = ready_state(dir.path());

    let (status, body) = get_json(state.clone(), "/recommend?isbn=b000&isbn=b001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isbn"], "b000");
    assert_eq!(body["recommendations"].as_array().unwrap().len(), 5);

    let (status, body) = get_json(state, "/recommend?isbn=&isbn=b001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Book not found in popular index");
    assert_eq!(body["recommendations"], serde_json::json!([]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_share_ready_state() {
    let dir = tempfile::tempdir().unwrap();
    let state = ready_state(dir.path());

    let handles: Vec<_> = (0..16)
        .map(|_| tokio::spawn(get_json(state.clone(), "/recommend?isbn=b010")))
        .collect();

    let mut bodies = Vec::with_capacity(handles.len());
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        bodies.push(body);
    }

    assert_eq!(bodies[0]["recommendations"].as_array().unwrap().len(), 5);
    assert!(bodies.iter().all(|body| body == &bodies[0]));
    assert_eq!(state.serving.get_serving_stats()["successful_requests"], 16);
}

#[tokio::test]
async fn test_book_endpoints() {
    let dir = tempfile::tempdir().unwrap();

    let (status, body) = get_json(ready_state(dir.path()), "/books?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["books"].as_array().unwrap().len(), 2);
    assert_eq!(body["books"][0]["ISBN"], "b000");

    let (status, body) = get_json(ready_state(dir.path()), "/books/b001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Book-Title"], "Second");

    let (status, body) = get_json(ready_state(dir.path()), "/books/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Book not found");

    let (_, body) = get_json(unloaded_state(), "/books").await;
    assert_eq!(body["error"], "Books data not loaded");

    let (_, body) = get_json(unloaded_state(), "/books/b001").await;
    assert_eq!(body["error"], "Data not loaded");
}

#[tokio::test]
async fn test_health_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    let state = ready_state(dir.path());

    let (status, body) = get_json(state.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["catalog_loaded"], true);

    get_json(state.clone(), "/recommend?isbn=b001").await;
    get_json(state.clone(), "/recommend?isbn=missing").await;

    let (_, body) = get_json(state, "/stats").await;
    assert_eq!(body["total_requests"], 2);
    assert_eq!(body["successful_requests"], 1);
    assert_eq!(body["not_found"], 1);
}

#[tokio::test]
async fn test_app_state_loads_trained_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    write_ratings_csv(&dir.path().join("Ratings.csv"), &sample_ratings());
    std::fs::write(
        dir.path().join("Books.csv"),
        "ISBN,Book-Title,Book-Author,Year-Of-Publication,Publisher,Image-URL-S,Image-URL-M,Image-URL-L\n\
         b000,First,A,2001,P,s,m,\n",
    )
    .unwrap();

    let config = test_config(dir.path());
    TrainingPipeline::new(Arc::new(config.clone())).run().unwrap();

    let state = AppState::new(config).await.unwrap();
    assert!(state.serving.recommendations().is_ready());
    assert!(state.serving.catalog().is_ready());

    let (_, body) = get_json(state, "/books/b000").await;
    assert_eq!(body["Image-URL-L"], "https://via.placeholder.com/150");
}

#[tokio::test]
async fn test_app_state_without_artifacts_stays_unloaded() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(test_config(dir.path())).await.unwrap();
    assert!(!state.serving.recommendations().is_ready());

    let (_, body) = get_json(state, "/recommend?isbn=b000").await;
    assert_eq!(body["error"], "Model not loaded");
}

#[test]
fn test_store_rejects_missing_directory() {
    let store = ArtifactStore::new("/nonexistent/models");
    assert!(matches!(store.load(), Err(ArtifactError::Missing(_))));
}
