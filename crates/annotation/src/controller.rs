//! The annotation state machine.
//!
//! ```text
//! Idle --click--> Loading --ok--> Loaded --rotate--> Loading ...
//!                    \--err--> Failed --rotate--> Loading ...
//! any --click--> Loading (previous marker removed)
//! ```
//!
//! Every fetch is tagged with a fresh [`RequestToken`]. Only a completion
//! carrying the token of the current view is rendered; everything else is
//! stale and dropped. All effects go through the [`MapSurface`].

use bytes::Bytes;
use foundation::{Coordinate, Heading, MarkerHandle, RequestToken, TokenAllocator};
use tracing::debug;

use crate::error::FetchError;
use crate::popup::{self, PopupAction};
use crate::service::SaveRequest;
use crate::surface::{MapSurface, PopupOptions};
use crate::view::AnnotationView;

/// A fetch the caller must issue and report back with the same token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchRequest {
    pub token: RequestToken,
    pub coordinate: Coordinate,
    pub heading: Heading,
}

/// Outbound work produced by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Fetch(FetchRequest),
    Save(SaveRequest),
}

/// Input to [`AnnotationController::handle`].
#[derive(Debug)]
pub enum ControllerEvent {
    Click(Coordinate),
    Action(MarkerHandle, PopupAction),
    FetchSucceeded { token: RequestToken, image: Bytes },
    FetchFailed { token: RequestToken, error: FetchError },
}

/// Whether a fetch completion reached the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Stale,
}

#[derive(Debug, Default)]
pub struct AnnotationController {
    view: Option<AnnotationView>,
    tokens: TokenAllocator,
    options: PopupOptions,
}

impl AnnotationController {
    pub fn new(options: PopupOptions) -> Self {
        Self {
            view: None,
            tokens: TokenAllocator::new(),
            options,
        }
    }

    /// The active annotation, `None` while idle.
    pub fn view(&self) -> Option<&AnnotationView> {
        self.view.as_ref()
    }

    pub fn handle<S: MapSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        event: ControllerEvent,
    ) -> Option<Command> {
        match event {
            ControllerEvent::Click(at) => Some(self.click(surface, at)),
            ControllerEvent::Action(marker, action) => {
                if self.view.as_ref().map(|v| v.marker) != Some(marker) {
                    debug!("ignoring {action:?} from detached marker {marker:?}");
                    return None;
                }
                match action {
                    PopupAction::Rotate => self.rotate(surface),
                    PopupAction::Save => self.save(),
                }
            }
            ControllerEvent::FetchSucceeded { token, image } => {
                self.fetch_succeeded(surface, token, image);
                None
            }
            ControllerEvent::FetchFailed { token, error } => {
                self.fetch_failed(surface, token, &error);
                None
            }
        }
    }

    /// Starts a fresh cycle at `at`, discarding the previous marker.
    pub fn click<S: MapSurface + ?Sized>(&mut self, surface: &mut S, at: Coordinate) -> Command {
        if let Some(old) = self.view.take() {
            surface.remove_marker(old.marker);
        }
        let token = self.tokens.next();
        let marker = surface.place_marker(at);
        let next = AnnotationView::loading(at, marker, token);
        surface.bind_popup(marker, &popup::render(&next), self.options);
        debug!("click at {at}: fetch {token} heading {}", next.heading);
        self.replace(next)
    }

    /// Turns the view 90° and refetches. No-op without a marker.
    pub fn rotate<S: MapSurface + ?Sized>(&mut self, surface: &mut S) -> Option<Command> {
        let Some(current) = self.view.as_ref() else {
            debug!("rotate with no active annotation");
            return None;
        };
        let token = self.tokens.next();
        let next = current.rotated(token);
        surface.set_popup_content(next.marker, &popup::render(&next));
        debug!(
            "rotate at {}: fetch {token} heading {} supersedes {}",
            next.coordinate, next.heading, current.token
        );
        Some(self.replace(next))
    }

    /// Requests persistence of the loaded image. No-op unless loaded.
    pub fn save(&self) -> Option<Command> {
        let view = self.view.as_ref()?;
        let image = view.image()?.clone();
        Some(Command::Save(SaveRequest {
            coordinate: view.coordinate,
            heading: view.heading,
            image,
        }))
    }

    pub fn fetch_succeeded<S: MapSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        token: RequestToken,
        image: Bytes,
    ) -> Outcome {
        let Some(current) = self.awaiting(token) else {
            debug!("discarding stale image for {token}");
            return Outcome::Stale;
        };
        let next = current.loaded(image);
        surface.set_popup_content(next.marker, &popup::render(&next));
        self.view = Some(next);
        Outcome::Applied
    }

    pub fn fetch_failed<S: MapSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        token: RequestToken,
        error: &FetchError,
    ) -> Outcome {
        let Some(current) = self.awaiting(token) else {
            debug!("discarding stale failure for {token}: {error}");
            return Outcome::Stale;
        };
        let next = current.failed(error.to_string());
        surface.set_popup_content(next.marker, &popup::render(&next));
        self.view = Some(next);
        Outcome::Applied
    }

    fn awaiting(&self, token: RequestToken) -> Option<&AnnotationView> {
        self.view.as_ref().filter(|v| v.awaits(token))
    }

    fn replace(&mut self, next: AnnotationView) -> Command {
        let command = Command::Fetch(FetchRequest {
            token: next.token,
            coordinate: next.coordinate,
            heading: next.heading,
        });
        self.view = Some(next);
        command
    }
}
