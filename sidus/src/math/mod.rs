mod bbox;

pub use bbox::Aabb;

/// Integer pixel position in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PixelCoordinate {
    pub x: usize,
    pub y: usize,
}

impl PixelCoordinate {
    #[inline]
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance_sq(&self, other: &PixelCoordinate) -> usize {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        dx * dx + dy * dy
    }
}

impl From<(usize, usize)> for PixelCoordinate {
    fn from((x, y): (usize, usize)) -> Self {
        Self { x, y }
    }
}
