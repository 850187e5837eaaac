//! HTTP surface: `GET /{id}` → person record.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use pims_core::{PersonRecord, PersonStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("no person with id {0}")]
    NotFound(i64),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("lookup task failed: {0}")]
    Join(#[from] JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            // Existing clients expect 400, not 404, for unknown ids.
            ApiError::NotFound(id) => {
                tracing::debug!(id, "person not found");
                StatusCode::BAD_REQUEST.into_response()
            }
            ApiError::Store(_) | ApiError::Join(_) => {
                tracing::error!(error = %self, "lookup failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[derive(Clone)]
struct AppState {
    store: Arc<PersonStore>,
}

/// Build the service router with permissive CORS and request tracing.
pub fn router(store: PersonStore) -> Router {
    let state = AppState {
        store: Arc::new(store),
    };

    Router::new()
        .route("/:id", get(get_person))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin, method and header, with credentials.
///
/// Wildcards cannot be combined with credentials, so the request's own
/// values are echoed back instead.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn get_person(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PersonRecord>, ApiError> {
    let store = Arc::clone(&state.store);
    // The session (and its connection) is dropped inside the task on every path.
    let found =
        tokio::task::spawn_blocking(move || store.connect_read_only()?.get_by_id(id)).await??;

    found.map(Json).ok_or(ApiError::NotFound(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use pims_core::detector::DetectorError;
    use pims_core::{Bbox, Detection, FaceDetect, NewPerson};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestStore {
        _dir: tempfile::TempDir,
        store: PersonStore,
    }

    fn temp_store(people: &[NewPerson]) -> TestStore {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonStore::open(dir.path().join("pims.db").to_str().unwrap()).unwrap();
        store.create_schema().unwrap();
        let mut session = store.connect().unwrap();
        for p in people {
            session.insert(p.clone());
        }
        session.commit_batch().unwrap();
        TestStore { _dir: dir, store }
    }

    fn jane() -> NewPerson {
        NewPerson {
            image: "/9j/4AAQSkZJRg==".into(),
            bbox: Bbox::new(12, 34, 112, 154),
            name: "Jane".into(),
            surname: "Doe".into(),
        }
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_found_returns_record_json() {
        let ts = temp_store(&[jane()]);
        let (status, body) = get(router(ts.store.clone()), "/1").await;
        assert_eq!(status, StatusCode::OK);

        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 1,
                "image": "/9j/4AAQSkZJRg==",
                "bbox": [12, 34, 112, 154],
                "name": "Jane",
                "surname": "Doe",
            })
        );
    }

    #[tokio::test]
    async fn test_round_trip_matches_committed_fields() {
        let mut bob = jane();
        bob.name = "".into();
        bob.surname = "Smith".into();
        let ts = temp_store(&[jane(), bob.clone()]);

        let (status, body) = get(router(ts.store.clone()), "/2").await;
        assert_eq!(status, StatusCode::OK);
        let record: PersonRecord = serde_json::from_slice(&body).unwrap();
        assert_eq!(record, bob.with_id(2));
    }

    #[tokio::test]
    async fn test_unknown_id_is_400_empty() {
        let ts = temp_store(&[jane()]);
        for uri in ["/2", "/0", "/-7", "/9223372036854775807"] {
            let (status, body) = get(router(ts.store.clone()), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body.is_empty(), "{uri}");
        }
    }

    #[tokio::test]
    async fn test_non_integer_id_rejected() {
        let ts = temp_store(&[]);
        let (status, _) = get(router(ts.store.clone()), "/abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_database_file_is_500_and_left_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let store = PersonStore::open(path.to_str().unwrap()).unwrap();

        let (status, body) = get(router(store.clone()), "/1").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.is_empty());
        assert!(!path.exists(), "lookup must not create the database file");

        // The failure does not poison later requests.
        store.create_schema().unwrap();
        let (status, _) = get(router(store), "/1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_table_is_500_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonStore::open(dir.path().join("empty.db").to_str().unwrap()).unwrap();
        // opening a writable session creates an empty file with no table
        drop(store.connect().unwrap());

        let (status, body) = get(router(store), "/1").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_lookups_are_independent() {
        let ts = temp_store(&[jane(), jane(), jane()]);
        let app = router(ts.store.clone());
        let mut handles = Vec::new();
        for i in 0..12 {
            let app = app.clone();
            handles.push(tokio::spawn(async move {
                get(app, &format!("/{}", i % 6 + 1)).await.0
            }));
        }
        for (i, h) in handles.into_iter().enumerate() {
            let expected = if i % 6 < 3 { StatusCode::OK } else { StatusCode::BAD_REQUEST };
            assert_eq!(h.await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_cors_echoes_origin_with_credentials() {
        let ts = temp_store(&[jane()]);
        let request = Request::builder()
            .uri("/1")
            .header(header::ORIGIN, "https://viewer.example.org")
            .body(Body::empty())
            .unwrap();
        let response = router(ts.store.clone()).oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://viewer.example.org"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let ts = temp_store(&[]);
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/1")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-request-id")
            .body(Body::empty())
            .unwrap();
        let response = router(ts.store.clone()).oneshot(request).await.unwrap();
        assert!(response.status().is_success());
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "x-request-id");
    }

    /// Reports one fixed face per image.
    struct OneFace;

    impl FaceDetect for OneFace {
        fn detect(&mut self, _image: &image::RgbImage) -> Result<Vec<Detection>, DetectorError> {
            Ok(vec![Detection { x1: 4.0, y1: 5.0, x2: 40.0, y2: 50.0, confidence: 0.9 }])
        }
    }

    #[tokio::test]
    async fn test_ingested_people_are_served_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("dataset");
        for i in 1..=2 {
            let person = root.join(i.to_string());
            std::fs::create_dir_all(&person).unwrap();
            image::RgbImage::from_pixel(8, 8, image::Rgb([200, 150, 100]))
                .save(person.join("face.jpg"))
                .unwrap();
        }
        let metadata = dir.path().join("metadata.csv");
        std::fs::write(&metadata, "Name\nJane_Doe\nJohn_Smith\n").unwrap();

        let store = PersonStore::open(dir.path().join("pims.db").to_str().unwrap()).unwrap();
        pims_core::ingest::run(&store, &mut OneFace, &root, &metadata, |_, _| {}).unwrap();

        for (uri, name, surname) in [("/1", "Jane", "Doe"), ("/2", "John", "Smith")] {
            let (status, body) = get(router(store.clone()), uri).await;
            assert_eq!(status, StatusCode::OK);
            let record: PersonRecord = serde_json::from_slice(&body).unwrap();
            assert_eq!((record.name.as_str(), record.surname.as_str()), (name, surname));
            assert_eq!(record.bbox, Bbox::new(4, 5, 40, 50));
        }
    }
}
