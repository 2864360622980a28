use foundation::{Coordinate, MarkerHandle};

use crate::popup::{PopupAction, PopupContent};

/// Invoked with the geocoordinate of a click on empty map space.
pub type ClickHandler = Box<dyn FnMut(Coordinate)>;

/// Invoked when a control inside a marker's popup is activated.
pub type ActionHandler = Box<dyn FnMut(MarkerHandle, PopupAction)>;

/// Size constraints for a popup panel, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupOptions {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for PopupOptions {
    fn default() -> Self {
        Self {
            max_width: 800,
            max_height: 800,
        }
    }
}

/// The map the controller draws on.
///
/// Presentation only: none of these operations fail. Handlers are single
/// slots; registering again replaces the previous handler.
///
/// After every [`bind_popup`](MapSurface::bind_popup) and
/// [`set_popup_content`](MapSurface::set_popup_content) the surface must wire
/// each entry of `content.controls` to the action handler. Controls from the
/// replaced content stop firing.
pub trait MapSurface {
    fn on_click(&mut self, handler: ClickHandler);

    fn on_action(&mut self, handler: ActionHandler);

    /// Creates a marker. The caller owns the handle and removes it before
    /// placing the next one.
    fn place_marker(&mut self, at: Coordinate) -> MarkerHandle;

    /// Attaches popup content to a marker and opens it.
    fn bind_popup(&mut self, marker: MarkerHandle, content: &PopupContent, options: PopupOptions);

    /// Replaces the body of an already bound popup, keeping it open.
    fn set_popup_content(&mut self, marker: MarkerHandle, content: &PopupContent);

    /// Detaches the marker and its popup. Idempotent.
    fn remove_marker(&mut self, marker: MarkerHandle);
}
