/// Generational handle to a marker owned by a map surface.
///
/// The index may be reused by the surface after removal; the generation
/// keeps an old handle from addressing the new marker.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MarkerHandle {
    index: u32,
    generation: u32,
}

impl MarkerHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        MarkerHandle { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}
