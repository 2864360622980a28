//! Popup rendering.
//!
//! The renderer returns the markup together with the table of interactive
//! controls it contains. Surfaces wire that table right after attaching the
//! markup, so a control regenerated by a re-render is always live and a
//! control from replaced content never fires.

use std::fmt::Write;

use foundation::Heading;

use crate::view::{AnnotationView, Status};

/// What a popup control asks the controller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopupAction {
    Rotate,
    Save,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupControl {
    /// `id` attribute of the element in the markup.
    pub element_id: &'static str,
    pub label: &'static str,
    pub action: PopupAction,
}

pub const ROTATE_CONTROL: PopupControl = PopupControl {
    element_id: "rotate-button",
    label: "Rotate",
    action: PopupAction::Rotate,
};

pub const SAVE_CONTROL: PopupControl = PopupControl {
    element_id: "save-button",
    label: "Save",
    action: PopupAction::Save,
};

/// Width of the popup body in pixels.
pub const POPUP_BODY_WIDTH: u32 = 640;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupContent {
    pub markup: String,
    pub controls: Vec<PopupControl>,
}

impl PopupContent {
    pub fn control(&self, element_id: &str) -> Option<&PopupControl> {
        self.controls.iter().find(|c| c.element_id == element_id)
    }
}

/// Renders the popup for the current state of `view`.
pub fn render(view: &AnnotationView) -> PopupContent {
    let heading = view.heading;
    match (&view.status, &view.frame) {
        (Status::Loading, None) if heading == Heading::NORTH => compose(
            None,
            &format!("Loading street view for {}…", view.coordinate),
            "loading",
            &[],
        ),
        // Rotated out of a failure: no frame to keep, but the heading changed.
        (Status::Loading, None) => compose(
            None,
            &format!("Loading heading {heading} for {}…", view.coordinate),
            "loading",
            &[ROTATE_CONTROL],
        ),
        (Status::Loading, Some(frame)) => compose(
            Some(&frame[..]),
            &format!("Loading heading {heading}…"),
            "loading",
            &[ROTATE_CONTROL],
        ),
        (Status::Loaded(image), _) => compose(
            Some(&image[..]),
            &format!("Heading {heading}"),
            "caption",
            &[ROTATE_CONTROL, SAVE_CONTROL],
        ),
        (Status::Failed(message), _) => compose(
            None,
            &format!("No street view image available at heading {heading}: {message}"),
            "error",
            &[ROTATE_CONTROL],
        ),
    }
}

fn compose(
    image: Option<&[u8]>,
    caption: &str,
    caption_class: &str,
    controls: &[PopupControl],
) -> PopupContent {
    let mut markup = format!(
        "<div class=\"street-view-popup\" style=\"width:{POPUP_BODY_WIDTH}px; max-width:100%; text-align:center;\">"
    );
    if let Some(bytes) = image {
        let _ = write!(
            markup,
            "<img src=\"{}\" alt=\"Street View\" style=\"width:100%; max-width:100%; height:auto; object-fit:cover;\">",
            protocol::data_url(bytes)
        );
    }
    let _ = write!(
        markup,
        "<p class=\"street-view-{caption_class}\">{}</p>",
        escape_html(caption)
    );
    for control in controls {
        let _ = write!(
            markup,
            "<button id=\"{id}\" class=\"{id}\">{label}</button>",
            id = control.element_id,
            label = control.label
        );
    }
    markup.push_str("</div>");

    PopupContent {
        markup,
        controls: controls.to_vec(),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
