//! Remote collaborators of the controller.
//!
//! Both traits return boxed futures so they stay dyn-compatible and can be
//! shared as `Arc<dyn ...>` between the event loop and spawned requests.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use foundation::{Coordinate, Heading};
use protocol::SaveLocationResponse;

use crate::error::FetchError;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fetches a street-level image for a `(coordinate, heading)` pair.
pub trait ImageService: Send + Sync {
    fn fetch_image(
        &self,
        at: Coordinate,
        heading: Heading,
    ) -> BoxFuture<'_, Result<Bytes, FetchError>>;
}

/// A loaded annotation to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub coordinate: Coordinate,
    pub heading: Heading,
    pub image: Bytes,
}

/// Accepts saved annotations.
pub trait LocationStore: Send + Sync {
    fn save_location(
        &self,
        request: SaveRequest,
    ) -> BoxFuture<'_, Result<SaveLocationResponse, FetchError>>;
}
