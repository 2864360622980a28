//! In-memory map surface for tests and the headless driver.

use foundation::{Coordinate, MarkerHandle};
use tracing::{debug, warn};

use crate::popup::{PopupContent, PopupControl};
use crate::surface::{ActionHandler, ClickHandler, MapSurface, PopupOptions};

/// One mutation applied to the surface, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    PlaceMarker(MarkerHandle, Coordinate),
    BindPopup(MarkerHandle),
    SetPopupContent(MarkerHandle),
    RemoveMarker(MarkerHandle),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub content: PopupContent,
    pub options: PopupOptions,
    pub open: bool,
    /// Controls wired after the last content attach.
    wired: Vec<PopupControl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub position: Coordinate,
    pub popup: Option<Popup>,
}

struct Slot {
    generation: u32,
    marker: Option<Marker>,
}

#[derive(Default)]
pub struct HeadlessSurface {
    slots: Vec<Slot>,
    free: Vec<u32>,
    click_handler: Option<ClickHandler>,
    action_handler: Option<ActionHandler>,
    journal: Vec<SurfaceOp>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a click on empty map space.
    pub fn click(&mut self, at: Coordinate) {
        match self.click_handler.as_mut() {
            Some(handler) => handler(at),
            None => debug!("click at {at} with no handler registered"),
        }
    }

    /// Simulates activating the popup element `element_id` of `marker`.
    ///
    /// Returns `false` if the marker is gone or the element is not wired in
    /// its current content.
    pub fn activate(&mut self, marker: MarkerHandle, element_id: &str) -> bool {
        let action = self
            .marker(marker)
            .and_then(|m| m.popup.as_ref())
            .and_then(|p| p.wired.iter().find(|c| c.element_id == element_id))
            .map(|c| c.action);
        let Some(action) = action else {
            return false;
        };
        match self.action_handler.as_mut() {
            Some(handler) => {
                handler(marker, action);
                true
            }
            None => false,
        }
    }

    pub fn marker(&self, handle: MarkerHandle) -> Option<&Marker> {
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.marker.as_ref())
    }

    /// Live markers in index order.
    pub fn markers(&self) -> impl Iterator<Item = (MarkerHandle, &Marker)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.marker
                .as_ref()
                .map(|m| (MarkerHandle::new(idx as u32, slot.generation), m))
        })
    }

    pub fn marker_count(&self) -> usize {
        self.markers().count()
    }

    pub fn journal(&self) -> &[SurfaceOp] {
        &self.journal
    }

    pub fn drain_journal(&mut self) -> Vec<SurfaceOp> {
        std::mem::take(&mut self.journal)
    }

    fn marker_mut(&mut self, handle: MarkerHandle) -> Option<&mut Marker> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.marker.as_mut())
    }
}

impl MapSurface for HeadlessSurface {
    fn on_click(&mut self, handler: ClickHandler) {
        self.click_handler = Some(handler);
    }

    fn on_action(&mut self, handler: ActionHandler) {
        self.action_handler = Some(handler);
    }

    fn place_marker(&mut self, at: Coordinate) -> MarkerHandle {
        let marker = Marker {
            position: at,
            popup: None,
        };
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.marker = Some(marker);
                MarkerHandle::new(index, slot.generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    marker: Some(marker),
                });
                MarkerHandle::new(self.slots.len() as u32 - 1, 0)
            }
        };
        self.journal.push(SurfaceOp::PlaceMarker(handle, at));
        handle
    }

    fn bind_popup(&mut self, marker: MarkerHandle, content: &PopupContent, options: PopupOptions) {
        let Some(m) = self.marker_mut(marker) else {
            warn!("bind_popup on missing marker {marker:?}");
            return;
        };
        m.popup = Some(Popup {
            content: content.clone(),
            options,
            open: true,
            wired: content.controls.clone(),
        });
        self.journal.push(SurfaceOp::BindPopup(marker));
    }

    fn set_popup_content(&mut self, marker: MarkerHandle, content: &PopupContent) {
        let Some(m) = self.marker_mut(marker) else {
            warn!("set_popup_content on missing marker {marker:?}");
            return;
        };
        match m.popup.as_mut() {
            Some(popup) => {
                popup.content = content.clone();
                popup.wired = content.controls.clone();
            }
            None => {
                m.popup = Some(Popup {
                    content: content.clone(),
                    options: PopupOptions::default(),
                    open: true,
                    wired: content.controls.clone(),
                });
            }
        }
        self.journal.push(SurfaceOp::SetPopupContent(marker));
    }

    fn remove_marker(&mut self, marker: MarkerHandle) {
        let Some(slot) = self.slots.get_mut(marker.index() as usize) else {
            return;
        };
        if slot.generation != marker.generation() || slot.marker.is_none() {
            return;
        }
        slot.marker = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(marker.index());
        self.journal.push(SurfaceOp::RemoveMarker(marker));
    }
}
