//! Pointer samples and the stamped geometry derived from them.

use ultraviolet::Vec2;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Microseconds(pub u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum PointerKind {
    Touch,
    Pencil,
    Mouse,
}

/// One raw input event from the platform.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PointerSample {
    /// Platform identity of the contact, distinguishes simultaneous touches.
    pub pointer: u64,
    pub kind: PointerKind,
    pub position: Vec2,
    /// `None` for devices without pressure.
    pub pressure: Option<f32>,
    pub time: Microseconds,
}
impl PointerSample {
    #[must_use]
    pub fn at(position: Vec2) -> Self {
        Self {
            pointer: 0,
            kind: PointerKind::Touch,
            position,
            pressure: None,
            time: Microseconds::default(),
        }
    }
}

/// A sample once it has been placed on a path.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StrokePoint {
    pub position: Vec2,
    pub pressure: Option<f32>,
    /// Arc length from the start of the stroke.
    pub dist: f32,
}
impl StrokePoint {
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        let pressure = match (self.pressure, other.pressure) {
            (Some(a), Some(b)) => Some(crate::util::lerp(a, b, t)),
            (a, b) => a.or(b),
        };
        Self {
            position: self.position + (other.position - self.position) * t,
            pressure,
            dist: crate::util::lerp(self.dist, other.dist, t),
        }
    }
}

/// A single stamp of the brush shape.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Dab {
    pub center: Vec2,
    pub diameter: f32,
    pub opacity: f32,
    /// Radians.
    pub rotation: f32,
    /// 1.0 is a hard edge, 0.0 fades from the center.
    pub hardness: f32,
    /// Arc length at which the dab was placed, used to apply the end taper later.
    pub dist: f32,
}

/// Dabs stamped between two consecutive stroke points. Dabs are in the coordinate space
/// they were generated in.
#[derive(Clone, Debug, PartialEq)]
pub struct LineSegment {
    pub from: StrokePoint,
    pub to: StrokePoint,
    pub dabs: smallvec::SmallVec<[Dab; 8]>,
}
impl LineSegment {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dabs.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn point_lerp() {
        let a = StrokePoint {
            position: Vec2::new(0.0, 0.0),
            pressure: Some(0.0),
            dist: 0.0,
        };
        let b = StrokePoint {
            position: Vec2::new(10.0, 0.0),
            pressure: None,
            dist: 10.0,
        };
        let mid = a.lerp(&b, 0.5);
        assert_eq!(mid.position, Vec2::new(5.0, 0.0));
        assert_eq!(mid.dist, 5.0);
        // Missing pressure on one side is not interpolated toward zero.
        assert_eq!(mid.pressure, Some(0.0));
    }
}
