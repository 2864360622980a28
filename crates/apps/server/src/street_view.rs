//! `POST /get_street_view`: proxies the Street View Static API.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use foundation::{Coordinate, Heading};
use protocol::StreetViewRequest;
use tracing::{debug, warn};

use crate::{api_error, json_body, ApiResult, AppState};

pub async fn get_street_view(
    State(state): State<AppState>,
    payload: Result<Json<StreetViewRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = json_body(payload)?;
    let at = Coordinate::new(req.lat, req.lng);
    if !at.is_valid() {
        return Err(api_error(StatusCode::BAD_REQUEST, "lat/lng out of range"));
    }
    let heading = Heading::from_degrees(req.heading);

    let cfg = &state.config;
    let Some(key) = cfg.api_key.as_deref() else {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Street View API key is not configured",
        ));
    };

    debug!("street view {at} heading {heading}");
    let resp = state
        .http
        .get(&cfg.upstream_url)
        .query(&[
            ("size", cfg.image_size.clone()),
            ("location", format!("{},{}", at.latitude(), at.longitude())),
            ("heading", heading.degrees().to_string()),
            ("fov", cfg.fov.to_string()),
            ("key", key.to_string()),
        ])
        .send()
        .await
        .map_err(|e| {
            warn!("street view upstream request failed: {e}");
            api_error(StatusCode::BAD_GATEWAY, "Street View upstream unavailable")
        })?;

    let status = resp.status();
    if !status.is_success() {
        warn!("street view upstream returned {status}");
        return Err(api_error(
            StatusCode::BAD_GATEWAY,
            format!("Street View upstream HTTP {}", status.as_u16()),
        ));
    }

    let upstream_type = resp
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = resp.bytes().await.map_err(|e| {
        warn!("street view upstream read failed: {e}");
        api_error(StatusCode::BAD_GATEWAY, "Street View upstream read failed")
    })?;

    let content_type =
        upstream_type.unwrap_or_else(|| protocol::sniff_mime(&bytes).to_string());
    let mut headers = HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    Ok((StatusCode::OK, headers, Body::from(bytes)).into_response())
}
