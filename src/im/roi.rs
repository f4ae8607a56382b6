/// Axis-aligned pixel box. Signed so drawn selections may hang off the image.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ROI {
    pub l: i64,
    pub t: i64,
    /// Exclusive right bound.
    pub r: i64,
    /// Exclusive bottom bound.
    pub b: i64,
}

impl ROI {
    /// Width of the ROI.
    pub fn w(&self) -> i64 {
        (self.r - self.l).max(0)
    }

    /// Height of the ROI.
    pub fn h(&self) -> i64 {
        (self.b - self.t).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.w() == 0 || self.h() == 0
    }

    pub fn union(&mut self, other: ROI) {
        self.l = self.l.min(other.l);
        self.t = self.t.min(other.t);
        self.r = self.r.max(other.r);
        self.b = self.b.max(other.b);
    }

    /// True when the two boxes share at least one pixel.
    pub fn intersects(&self, other: &ROI) -> bool {
        self.l < other.r && other.l < self.r && self.t < other.b && other.t < self.b
    }
}
