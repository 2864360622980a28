//! `POST /save_location` and the JSON file store behind it.

use std::path::PathBuf;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use foundation::{Coordinate, Heading};
use protocol::{SaveLocationRequest, SaveLocationResponse, SavedLocation};
use tokio::sync::Mutex;
use tracing::info;

use crate::{api_error, json_body, now_ms, ApiResult, AppState};

/// Upper bound on a decoded image accepted for storage.
pub const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

/// Request body limit: room for a base64 image somewhat over
/// `MAX_IMAGE_BYTES`, so oversize images reach the handler and get a 413
/// with an `ApiError` body.
pub const MAX_BODY_BYTES: usize = MAX_IMAGE_BYTES * 2;

pub struct LocationsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocationsStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn load_unlocked(&self) -> Result<Vec<SavedLocation>, String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => serde_json::from_str(&s).map_err(|e| e.to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn save_unlocked(&self, locations: &[SavedLocation]) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| e.to_string())?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(locations).map_err(|e| e.to_string())?;
        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| e.to_string())?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Listing without image payloads.
    pub async fn list(&self) -> Result<Vec<SavedLocation>, String> {
        let _g = self.lock.lock().await;
        let mut locations = self.load_unlocked().await?;
        for loc in &mut locations {
            loc.image_data = None;
        }
        Ok(locations)
    }

    pub async fn insert(&self, location: SavedLocation) -> Result<(), String> {
        let _g = self.lock.lock().await;
        let mut locations = self.load_unlocked().await?;
        locations.retain(|l| l.id != location.id);
        locations.push(location);
        self.save_unlocked(&locations).await
    }
}

pub async fn save_location(
    State(state): State<AppState>,
    payload: Result<Json<SaveLocationRequest>, JsonRejection>,
) -> ApiResult<Json<SaveLocationResponse>> {
    let req = json_body(payload)?;
    let at = Coordinate::new(req.lat, req.lng);
    if !at.is_valid() {
        return Err(api_error(StatusCode::BAD_REQUEST, "lat/lng out of range"));
    }

    let image = protocol::decode_image(&req.image_data)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    if image.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "imageData is empty"));
    }
    if image.len() > MAX_IMAGE_BYTES {
        return Err(api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("image too large (max {MAX_IMAGE_BYTES} bytes)"),
        ));
    }

    let saved_at = now_ms();
    let record = SavedLocation {
        id: uuid::Uuid::new_v4().to_string(),
        lat: req.lat,
        lng: req.lng,
        heading: i64::from(Heading::from_degrees(req.heading).degrees()),
        content_type: protocol::sniff_mime(&image).to_string(),
        size_bytes: image.len() as u64,
        saved_at,
        image_data: Some(protocol::encode_image(&image)),
    };
    let id = record.id.clone();

    state.locations.insert(record).await.map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to write locations store: {e}"),
        )
    })?;
    info!("saved location {id} at {at}");

    Ok(Json(SaveLocationResponse { id, saved_at }))
}

pub async fn list_locations(State(state): State<AppState>) -> ApiResult<Json<Vec<SavedLocation>>> {
    let locations = state.locations.list().await.map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to read locations store: {e}"),
        )
    })?;
    Ok(Json(locations))
}
