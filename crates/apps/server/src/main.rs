mod config;
mod locations;
mod open_data;
mod street_view;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use protocol::ApiError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::locations::LocationsStore;

#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    locations: Arc<LocationsStore>,
    http: reqwest::Client,
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError::new(message)))
}

/// Unwraps a JSON body, answering malformed or oversized bodies with an
/// `ApiError` instead of axum's plain-text rejection.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| api_error(rejection.status(), rejection.body_text()))
}

/// Shared client for upstream calls, bounded by `upstream_timeout`.
pub fn upstream_client(config: &ServerConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .build()
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            std::process::exit(2);
        }
    };
    if config.api_key.is_none() {
        warn!("GOOGLE_MAPS_API_KEY is not set; /get_street_view will answer 503");
    }

    let http = match upstream_client(&config) {
        Ok(http) => http,
        Err(err) => {
            error!("failed to build upstream client: {err}");
            std::process::exit(1);
        }
    };

    let addr = config.addr;
    let state = AppState {
        locations: Arc::new(LocationsStore::new(config.locations_path.clone())),
        config: Arc::new(config),
        http,
    };
    info!(
        "saving locations to {}",
        state.locations.path().display()
    );

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };
    info!("street view server listening on http://{addr}");
    if let Err(err) = axum::serve(listener, app(state)).await {
        error!("server error: {err}");
    }
}

fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/get_street_view", post(street_view::get_street_view))
        .route("/save_location", post(locations::save_location))
        .route("/saved_locations", get(locations::list_locations))
        .route("/squirrels", get(open_data::get_squirrels))
        .route("/water-cons", get(open_data::get_water_consumption))
        .layer(DefaultBodyLimit::max(locations::MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use protocol::{SaveLocationResponse, SavedLocation};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::time::Duration;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// Stands in for the Street View Static API and the open-data portal.
    async fn fake_upstream() -> SocketAddr {
        let upstream = Router::new()
            .route(
                "/streetview",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    if q.get("key").map(String::as_str) != Some("test-key") {
                        return (StatusCode::FORBIDDEN, Vec::new());
                    }
                    let tag = format!("{}|{}|{}", q["location"], q["heading"], q["size"]);
                    let mut body = vec![0xFF, 0xD8, 0xFF, 0xE0];
                    body.extend_from_slice(tag.as_bytes());
                    (StatusCode::OK, body)
                }),
            )
            .route(
                "/hung",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    (StatusCode::OK, Vec::<u8>::new())
                }),
            )
            .route(
                "/resource/vfnx-vebw.json",
                get(|| async { Json(json!([{ "unique_squirrel_id": "1A" }])) }),
            );
        serve(upstream).await
    }

    fn state(upstream: SocketAddr, api_key: Option<&str>, dir: &tempfile::TempDir) -> AppState {
        let config = ServerConfig {
            addr: "127.0.0.1:0".parse().unwrap(),
            api_key: api_key.map(str::to_string),
            upstream_url: format!("http://{upstream}/streetview"),
            image_size: "640x640".to_string(),
            fov: 90,
            locations_path: dir.path().join("locations.json"),
            open_data_url: format!("http://{upstream}/resource"),
            upstream_timeout: Duration::from_millis(500),
        };
        AppState {
            locations: Arc::new(LocationsStore::new(config.locations_path.clone())),
            http: upstream_client(&config).unwrap(),
            config: Arc::new(config),
        }
    }

    #[tokio::test]
    async fn street_view_forwards_location_and_normalized_heading() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve(app(state(fake_upstream().await, Some("test-key"), &dir))).await;

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/get_street_view"))
            .json(&json!({ "lat": 40.7128, "lng": -74.006, "heading": 450 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.bytes().await.unwrap();
        assert_eq!(&body[..4], &[0xFF, 0xD8, 0xFF, 0xE0]);
        assert_eq!(&body[4..], b"40.7128,-74.006|90|640x640");
    }

    #[tokio::test]
    async fn street_view_rejects_bad_coordinates_and_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = fake_upstream().await;
        let client = reqwest::Client::new();

        let keyed = serve(app(state(upstream, Some("test-key"), &dir))).await;
        let resp = client
            .post(format!("http://{keyed}/get_street_view"))
            .json(&json!({ "lat": 91.0, "lng": 0.0, "heading": 0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let unkeyed = serve(app(state(upstream, None, &dir))).await;
        let resp = client
            .post(format!("http://{unkeyed}/get_street_view"))
            .json(&json!({ "lat": 1.0, "lng": 1.0, "heading": 0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let err: ApiError = resp.json().await.unwrap();
        assert!(err.error.contains("API key"));

        let wrong_key = serve(app(state(upstream, Some("other"), &dir))).await;
        let resp = client
            .post(format!("http://{wrong_key}/get_street_view"))
            .json(&json!({ "lat": 1.0, "lng": 1.0, "heading": 0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn save_location_accepts_data_urls_and_lists_without_images() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve(app(state(fake_upstream().await, None, &dir))).await;
        let client = reqwest::Client::new();

        let image = [0xFFu8, 0xD8, 0xFF, 0xE0, 1, 2, 3];
        let resp = client
            .post(format!("http://{addr}/save_location"))
            .json(&json!({
                "lat": 40.7128,
                "lng": -74.006,
                "heading": -90,
                "imageData": protocol::data_url(&image),
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let receipt: SaveLocationResponse = resp.json().await.unwrap();
        assert!(!receipt.id.is_empty());

        let listed: Vec<SavedLocation> = client
            .get(format!("http://{addr}/saved_locations"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, receipt.id);
        assert_eq!(listed[0].heading, 270);
        assert_eq!(listed[0].content_type, "image/jpeg");
        assert_eq!(listed[0].size_bytes, image.len() as u64);
        assert!(listed[0].image_data.is_none());
    }

    #[tokio::test]
    async fn save_location_rejects_invalid_image_data() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve(app(state(fake_upstream().await, None, &dir))).await;
        let client = reqwest::Client::new();

        for image_data in ["not base64!!", ""] {
            let resp = client
                .post(format!("http://{addr}/save_location"))
                .json(&json!({ "lat": 1.0, "lng": 1.0, "heading": 0, "imageData": image_data }))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{image_data:?}");
        }
    }

    fn jpeg_of_len(len: usize) -> Vec<u8> {
        let mut image = vec![0u8; len];
        image[..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
        image
    }

    #[tokio::test]
    async fn save_location_enforces_image_limit_with_api_errors() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve(app(state(fake_upstream().await, None, &dir))).await;
        let client = reqwest::Client::new();
        let save = |image: Vec<u8>| {
            client
                .post(format!("http://{addr}/save_location"))
                .json(&json!({
                    "lat": 40.7128,
                    "lng": -74.006,
                    "heading": 0,
                    "imageData": protocol::data_url(&image),
                }))
                .send()
        };

        let resp = save(jpeg_of_len(3 * 1024 * 1024)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = save(jpeg_of_len(9 * 1024 * 1024)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let err: ApiError = resp.json().await.unwrap();
        assert!(err.error.contains("too large"), "{}", err.error);
    }

    #[tokio::test]
    async fn malformed_json_bodies_answer_with_api_errors() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve(app(state(fake_upstream().await, None, &dir))).await;
        let client = reqwest::Client::new();

        for path in ["save_location", "get_street_view"] {
            let resp = client
                .post(format!("http://{addr}/{path}"))
                .header("content-type", "application/json")
                .body("{not json")
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{path}");
            let err: ApiError = resp.json().await.unwrap();
            assert!(!err.error.is_empty());
        }

        let resp = client
            .post(format!("http://{addr}/save_location"))
            .json(&json!({ "lat": 1.0, "lng": 1.0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let err: ApiError = resp.json().await.unwrap();
        assert!(err.error.contains("imageData"), "{}", err.error);
    }

    #[tokio::test]
    async fn street_view_gives_up_on_hung_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = fake_upstream().await;
        let mut state = state(upstream, Some("test-key"), &dir);
        let mut config = (*state.config).clone();
        config.upstream_url = format!("http://{upstream}/hung");
        state.config = Arc::new(config);
        let addr = serve(app(state)).await;

        let started = std::time::Instant::now();
        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/get_street_view"))
            .json(&json!({ "lat": 1.0, "lng": 1.0, "heading": 0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert!(started.elapsed() < Duration::from_secs(10));
        let err: ApiError = resp.json().await.unwrap();
        assert!(!err.error.is_empty());
    }

    #[tokio::test]
    async fn open_data_proxies_json_and_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve(app(state(fake_upstream().await, None, &dir))).await;
        let client = reqwest::Client::new();

        let rows: Value = client
            .get(format!("http://{addr}/squirrels"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(rows[0]["unique_squirrel_id"], "1A");

        // The fake upstream has no water dataset.
        let resp = client
            .get(format!("http://{addr}/water-cons"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err: ApiError = resp.json().await.unwrap();
        assert!(err.error.contains("404"));
    }

    #[tokio::test]
    async fn healthz_answers_ok() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve(app(state(fake_upstream().await, None, &dir))).await;
        let body = reqwest::get(format!("http://{addr}/healthz"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }
}
