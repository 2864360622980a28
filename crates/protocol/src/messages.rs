//! Wire types for the street-view backend.
//!
//! Two HTTP boundaries share these types:
//! - `POST /get_street_view`: JSON request, binary image response
//! - `POST /save_location`: JSON request with base64 image, JSON acknowledgement
//!
//! Every non-2xx response carries an [`ApiError`] body.

use serde::{Deserialize, Serialize};

/// Identifier assigned to a stored location by the backend.
pub type LocationId = String;

/// Body of `POST /get_street_view`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreetViewRequest {
    pub lat: f64,
    pub lng: f64,
    /// Viewing direction in degrees. Older clients omit it.
    #[serde(default)]
    pub heading: i64,
}

/// Body of `POST /save_location`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveLocationRequest {
    pub lat: f64,
    pub lng: f64,
    pub heading: i64,
    /// Base64 image, optionally wrapped as a `data:` URL.
    pub image_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveLocationResponse {
    pub id: LocationId,
    /// Milliseconds since the Unix epoch.
    pub saved_at: u64,
}

/// A stored annotation as listed by `GET /saved_locations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedLocation {
    pub id: LocationId,
    pub lat: f64,
    pub lng: f64,
    pub heading: i64,
    pub content_type: String,
    pub size_bytes: u64,
    pub saved_at: u64,
    /// Base64 image. Omitted from listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
