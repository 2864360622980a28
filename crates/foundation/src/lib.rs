pub mod geo;
pub mod handles;
pub mod heading;
pub mod ids;

// Foundation crate: small, well-tested primitives only.
pub use geo::*;
pub use handles::*;
pub use heading::*;
pub use ids::*;
