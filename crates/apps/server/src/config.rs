use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_UPSTREAM_URL: &str = "https://maps.googleapis.com/maps/api/streetview";
pub const DEFAULT_OPEN_DATA_URL: &str = "https://data.cityofnewyork.us/resource";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Google Maps key for the Street View Static API. Image requests fail
    /// with 503 when unset.
    pub api_key: Option<String>,
    pub upstream_url: String,
    /// `WIDTHxHEIGHT` passed to the upstream `size` parameter.
    pub image_size: String,
    pub fov: u32,
    pub locations_path: PathBuf,
    pub open_data_url: String,
    /// Deadline for each call to the Street View or open-data upstream.
    pub upstream_timeout: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, String> {
        let addr = env::var("STREETVIEW_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".to_string());
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| format!("invalid STREETVIEW_ADDR {addr:?}: {e}"))?;

        let image_size = env::var("STREETVIEW_IMAGE_SIZE").unwrap_or_else(|_| "640x640".to_string());
        if parse_size(&image_size).is_none() {
            return Err(format!(
                "invalid STREETVIEW_IMAGE_SIZE {image_size:?}, expected WIDTHxHEIGHT"
            ));
        }

        Ok(Self {
            addr,
            api_key: env::var("GOOGLE_MAPS_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            upstream_url: env::var("STREETVIEW_UPSTREAM_URL")
                .unwrap_or_else(|_| DEFAULT_UPSTREAM_URL.to_string()),
            image_size,
            fov: env_var_u32("STREETVIEW_FOV", 90).clamp(10, 120),
            locations_path: env::var("SAVED_LOCATIONS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/saved_locations.json")),
            open_data_url: env::var("OPEN_DATA_URL")
                .unwrap_or_else(|_| DEFAULT_OPEN_DATA_URL.to_string()),
            upstream_timeout: Duration::from_secs(u64::from(
                env_var_u32("STREETVIEW_UPSTREAM_TIMEOUT_SECS", 20).max(1),
            )),
        })
    }
}

/// Parses `WIDTHxHEIGHT`, both in `1..=640` (the Static API maximum).
pub fn parse_size(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.split_once('x')?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    ((1..=640).contains(&w) && (1..=640).contains(&h)).then_some((w, h))
}

fn env_var_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
