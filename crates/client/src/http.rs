//! reqwest-backed implementations of the controller's remote collaborators.

use annotation::{
    BoxFuture, FetchError, FetchErrorKind, ImageService, LocationStore, SaveRequest,
};
use bytes::Bytes;
use foundation::{Coordinate, Heading};
use protocol::{ApiError, SaveLocationRequest, SaveLocationResponse, StreetViewRequest};
use tracing::debug;

use crate::config::ClientConfig;

pub struct HttpStreetViewService {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpStreetViewService {
    pub fn new(config: ClientConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                FetchError::with_source(FetchErrorKind::Network, "http client setup failed", e)
            })?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn post_street_view(&self, at: Coordinate, heading: Heading) -> Result<Bytes, FetchError> {
        let body = StreetViewRequest {
            lat: at.latitude(),
            lng: at.longitude(),
            heading: i64::from(heading.degrees()),
        };
        debug!("requesting street view for {at} heading {heading}");

        let resp = self
            .http
            .post(&self.config.street_view_url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check_status(resp).await?;

        let bytes = resp.bytes().await.map_err(transport_error)?;
        if bytes.is_empty() {
            return Err(FetchError::new(
                FetchErrorKind::Malformed,
                "street view response was empty",
            ));
        }
        debug!("received {} bytes ({})", bytes.len(), protocol::sniff_mime(&bytes));
        Ok(bytes)
    }

    async fn post_save(&self, request: SaveRequest) -> Result<SaveLocationResponse, FetchError> {
        let body = SaveLocationRequest {
            lat: request.coordinate.latitude(),
            lng: request.coordinate.longitude(),
            heading: i64::from(request.heading.degrees()),
            image_data: protocol::encode_image(&request.image),
        };

        let resp = self
            .http
            .post(&self.config.save_location_url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check_status(resp).await?;

        resp.json::<SaveLocationResponse>().await.map_err(|e| {
            FetchError::with_source(FetchErrorKind::Malformed, "invalid save acknowledgement", e)
        })
    }
}

impl ImageService for HttpStreetViewService {
    fn fetch_image(
        &self,
        at: Coordinate,
        heading: Heading,
    ) -> BoxFuture<'_, Result<Bytes, FetchError>> {
        Box::pin(self.post_street_view(at, heading))
    }
}

impl LocationStore for HttpStreetViewService {
    fn save_location(
        &self,
        request: SaveRequest,
    ) -> BoxFuture<'_, Result<SaveLocationResponse, FetchError>> {
        Box::pin(self.post_save(request))
    }
}

fn transport_error(err: reqwest::Error) -> FetchError {
    let kind = if err.is_timeout() {
        FetchErrorKind::Timeout
    } else if err.is_decode() || err.is_body() {
        FetchErrorKind::Malformed
    } else {
        FetchErrorKind::Network
    };
    FetchError::with_source(kind, err.to_string(), err)
}

/// Turns a non-2xx response into an error, preferring the `{"error": ...}` body.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&text)
        .map(|e| e.error)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    Err(FetchError::new(FetchErrorKind::Status(status.as_u16()), message))
}
