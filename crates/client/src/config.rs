use std::env;
use std::time::Duration;

pub const DEFAULT_STREET_VIEW_URL: &str = "http://localhost:5000/get_street_view";
pub const DEFAULT_SAVE_LOCATION_URL: &str = "http://localhost:5000/save_location";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Endpoints of the street-view backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub street_view_url: String,
    pub save_location_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            street_view_url: DEFAULT_STREET_VIEW_URL.to_string(),
            save_location_url: DEFAULT_SAVE_LOCATION_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Reads `STREETVIEW_URL`, `SAVE_LOCATION_URL` and `STREETVIEW_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            street_view_url: env::var("STREETVIEW_URL").unwrap_or(defaults.street_view_url),
            save_location_url: env::var("SAVE_LOCATION_URL")
                .unwrap_or(defaults.save_location_url),
            timeout: env::var("STREETVIEW_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}
