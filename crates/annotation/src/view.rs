use bytes::Bytes;
use foundation::{Coordinate, Heading, MarkerHandle, RequestToken};

/// Progress of the image for the active annotation.
///
/// `Idle` is represented by the absence of an [`AnnotationView`].
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Loading,
    Loaded(Bytes),
    Failed(String),
}

/// The single active annotation.
///
/// Transitions build a new value and replace the old one as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationView {
    pub coordinate: Coordinate,
    pub heading: Heading,
    pub status: Status,
    /// Token of the most recently issued fetch for this view.
    pub token: RequestToken,
    pub marker: MarkerHandle,
    /// Image currently on screen, kept while a rotation is loading.
    pub frame: Option<Bytes>,
}

impl AnnotationView {
    pub fn loading(coordinate: Coordinate, marker: MarkerHandle, token: RequestToken) -> Self {
        Self {
            coordinate,
            heading: Heading::NORTH,
            status: Status::Loading,
            token,
            marker,
            frame: None,
        }
    }

    /// Same marker and coordinate, next heading, fresh token.
    pub fn rotated(&self, token: RequestToken) -> Self {
        Self {
            heading: self.heading.rotated(),
            status: Status::Loading,
            token,
            ..self.clone()
        }
    }

    pub fn loaded(&self, image: Bytes) -> Self {
        Self {
            status: Status::Loaded(image.clone()),
            frame: Some(image),
            ..self.clone()
        }
    }

    pub fn failed(&self, message: impl Into<String>) -> Self {
        Self {
            status: Status::Failed(message.into()),
            frame: None,
            ..self.clone()
        }
    }

    /// Whether a completion tagged `token` may still be applied.
    pub fn awaits(&self, token: RequestToken) -> bool {
        self.token == token && self.status == Status::Loading
    }

    pub fn image(&self) -> Option<&Bytes> {
        match &self.status {
            Status::Loaded(image) => Some(image),
            _ => None,
        }
    }
}
