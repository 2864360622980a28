//! NYC open-data passthroughs used by the map's data layers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;
use tracing::{info, warn};

use crate::{api_error, ApiResult, AppState};

pub const SQUIRRELS_DATASET: &str = "vfnx-vebw.json";
pub const WATER_CONSUMPTION_DATASET: &str = "ia2d-e54m.json";

pub async fn get_squirrels(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    fetch_dataset(&state, SQUIRRELS_DATASET).await
}

pub async fn get_water_consumption(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    fetch_dataset(&state, WATER_CONSUMPTION_DATASET).await
}

async fn fetch_dataset(state: &AppState, dataset: &str) -> ApiResult<Json<Value>> {
    let url = format!(
        "{}/{dataset}",
        state.config.open_data_url.trim_end_matches('/')
    );
    let fail = |e: String| {
        warn!("open data {dataset} failed: {e}");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e)
    };

    let resp = state
        .http
        .get(&url)
        .send()
        .await
        .map_err(|e| fail(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(fail(format!("upstream HTTP {}", resp.status().as_u16())));
    }
    let data: Value = resp.json().await.map_err(|e| fail(e.to_string()))?;

    if let Some(rows) = data.as_array() {
        info!("open data {dataset}: {} rows", rows.len());
    }
    Ok(Json(data))
}
