use std::fmt;

/// Degrees turned by a single rotate action.
pub const ROTATE_STEP_DEG: u16 = 90;

/// Viewing direction in whole degrees, always in `[0, 360)`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Heading(u16);

impl Heading {
    pub const NORTH: Heading = Heading(0);

    /// Wraps any integer degree value into `[0, 360)`.
    pub fn from_degrees(degrees: i64) -> Self {
        Heading(degrees.rem_euclid(360) as u16)
    }

    pub fn degrees(self) -> u16 {
        self.0
    }

    /// The heading one rotate step clockwise.
    pub fn rotated(self) -> Self {
        Heading((self.0 + ROTATE_STEP_DEG) % 360)
    }
}

impl fmt::Display for Heading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.0)
    }
}
