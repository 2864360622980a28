//! Map-annotation core: one street-view annotation at a time, driven by map
//! clicks and popup controls, guarded against stale fetch completions.

pub mod controller;
pub mod error;
pub mod headless;
pub mod popup;
pub mod service;
pub mod surface;
pub mod view;

pub use controller::*;
pub use error::*;
pub use headless::*;
pub use popup::*;
pub use service::*;
pub use surface::*;
pub use view::*;
