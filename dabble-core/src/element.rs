//! # Elements
//!
//! Drawable units owned by exactly one layer. Every element carries a transform, and caches the
//! geometry derived from it. The cache is dropped whenever the transform changes so that stale
//! geometry is never drawn.

use std::sync::{Arc, OnceLock};

use ultraviolet::{Rotor2, Vec2};

use crate::brush::Brush;
use crate::color::Color;
use crate::id::TextureId;
use crate::stroke::{Dab, LineSegment};
use crate::util::Rect;

pub type ElementID = crate::DabbleID<Element>;

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub struct ElementFlags : u8 {
        /// Eligible for lifted selection and interactive transform.
        const SMART_OBJECT = 0b0000_0001;
    }
}

/// Placement of an element's unit quad on the canvas.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ElementTransform {
    pub center: Vec2,
    pub size: Vec2,
    /// Radians, clockwise in canvas space (y down).
    pub rotation: f32,
}
impl ElementTransform {
    #[must_use]
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            center: rect.center(),
            size: rect.size(),
            rotation: 0.0,
        }
    }
    fn rotor(&self) -> Rotor2 {
        Rotor2::from_angle(self.rotation)
    }
    /// Map a point in unit space (`[-0.5, 0.5]` on both axes) into the canvas.
    #[must_use]
    pub fn to_canvas(&self, unit: Vec2) -> Vec2 {
        let mut scaled = unit * self.size;
        self.rotor().rotate_vec(&mut scaled);
        scaled + self.center
    }
    /// Map a canvas point into unit space. Degenerate axes are treated as one pixel wide.
    #[must_use]
    pub fn to_local(&self, canvas: Vec2) -> Vec2 {
        let mut offset = canvas - self.center;
        self.rotor().reversed().rotate_vec(&mut offset);
        offset / self.nonzero_size()
    }
    fn nonzero_size(&self) -> Vec2 {
        let nz = |v: f32| if v.abs() < f32::EPSILON { 1.0 } else { v };
        Vec2::new(nz(self.size.x), nz(self.size.y))
    }
    /// Corners of the transformed quad, clockwise from the top left.
    #[must_use]
    pub fn corners(&self) -> [Vec2; 4] {
        [
            Vec2::new(-0.5, -0.5),
            Vec2::new(0.5, -0.5),
            Vec2::new(0.5, 0.5),
            Vec2::new(-0.5, 0.5),
        ]
        .map(|corner| self.to_canvas(corner))
    }
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::from_points(self.corners())
    }
    /// Uniform scale factor of `self` relative to `origin`, used for dab diameters.
    #[must_use]
    pub fn scale_from(&self, origin: &Self) -> f32 {
        let ratio = self.size / origin.nonzero_size();
        (ratio.x * ratio.y).abs().sqrt()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumIter)]
pub enum PrimitiveShape {
    Rectangle,
    Triangle,
    Circle,
}
impl PrimitiveShape {
    /// Whether a unit-space point lies within the shape. The triangle points up.
    #[must_use]
    pub fn contains(self, unit: Vec2) -> bool {
        let in_box = unit.x.abs() <= 0.5 && unit.y.abs() <= 0.5;
        match self {
            Self::Rectangle => in_box,
            Self::Circle => unit.mag_sq() <= 0.25,
            Self::Triangle => in_box && unit.x.abs() <= (unit.y + 0.5) / 2.0,
        }
    }
}

/// A committed brush stroke.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeGroup {
    pub brush: Arc<Brush>,
    pub color: Color,
    /// Replayed as an alpha erase against the layer's earlier content.
    pub is_eraser: bool,
    /// Seed the stroke's jitter was generated from.
    pub seed: u64,
    /// Segments with dabs in canvas space at creation time.
    pub segments: Vec<LineSegment>,
    /// Total arc length.
    pub length: f32,
    /// Transform at creation. Dabs are mapped from this onto the element's current transform.
    pub origin: ElementTransform,
}
impl StrokeGroup {
    pub fn dabs(&self) -> impl Iterator<Item = &Dab> + '_ {
        self.segments.iter().flat_map(|segment| segment.dabs.iter())
    }
    #[must_use]
    pub fn dab_count(&self) -> usize {
        self.segments.iter().map(|segment| segment.dabs.len()).sum()
    }
}

/// A bitmap sprite. The texture belongs to the pool.
#[derive(Clone, Debug, PartialEq)]
pub struct Chartlet {
    pub texture: TextureId,
    pub pixel_size: [u32; 2],
}

#[derive(Clone, Debug, PartialEq)]
pub struct Primitive {
    pub shape: PrimitiveShape,
    pub fill: Color,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementKind {
    Stroke(StrokeGroup),
    Chartlet(Chartlet),
    Primitive(Primitive),
}

/// Geometry derived from an element's kind and transform.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// A single quad covering the transform's rectangle.
    Quad { bounds: Rect },
    /// Dabs in canvas space, with the end taper applied.
    Dabs { dabs: Vec<Dab>, bounds: Rect },
}
impl Geometry {
    #[must_use]
    pub fn bounds(&self) -> Rect {
        match self {
            Self::Quad { bounds, .. } | Self::Dabs { bounds, .. } => *bounds,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Element {
    id: ElementID,
    transform: ElementTransform,
    flags: ElementFlags,
    kind: ElementKind,
    geometry: OnceLock<Geometry>,
}
impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        // Cache is derived, never compared.
        self.id == other.id
            && self.transform == other.transform
            && self.flags == other.flags
            && self.kind == other.kind
    }
}
impl Element {
    #[must_use]
    pub fn stroke(group: StrokeGroup) -> Self {
        Self::new(group.origin, ElementFlags::empty(), ElementKind::Stroke(group))
    }
    #[must_use]
    pub fn chartlet(chartlet: Chartlet, transform: ElementTransform) -> Self {
        Self::new(
            transform,
            ElementFlags::SMART_OBJECT,
            ElementKind::Chartlet(chartlet),
        )
    }
    #[must_use]
    pub fn primitive(primitive: Primitive, transform: ElementTransform) -> Self {
        Self::new(
            transform,
            ElementFlags::empty(),
            ElementKind::Primitive(primitive),
        )
    }
    fn new(transform: ElementTransform, flags: ElementFlags, kind: ElementKind) -> Self {
        Self {
            id: ElementID::default(),
            transform,
            flags,
            kind,
            geometry: OnceLock::new(),
        }
    }
    /// A copy with a fresh identity.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            id: ElementID::default(),
            ..self.clone()
        }
    }
    #[must_use]
    pub fn id(&self) -> ElementID {
        self.id
    }
    #[must_use]
    pub fn transform(&self) -> &ElementTransform {
        &self.transform
    }
    #[must_use]
    pub fn flags(&self) -> ElementFlags {
        self.flags
    }
    #[must_use]
    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }
    #[must_use]
    pub fn is_smart_object(&self) -> bool {
        self.flags.contains(ElementFlags::SMART_OBJECT)
    }
    /// Move, resize and rotate. Drops cached geometry.
    pub fn update_transform(&mut self, position: Vec2, size: Vec2, rotation: f32) {
        self.set_transform(ElementTransform {
            center: position,
            size,
            rotation,
        });
    }
    pub fn set_transform(&mut self, transform: ElementTransform) {
        self.transform = transform;
        self.geometry = OnceLock::new();
    }
    /// Whether transformed geometry is currently cached.
    #[must_use]
    pub fn has_cached_geometry(&self) -> bool {
        self.geometry.get().is_some()
    }
    /// Geometry for the current transform, built on first use.
    pub fn geometry(&self) -> &Geometry {
        self.geometry.get_or_init(|| self.build_geometry())
    }
    fn build_geometry(&self) -> Geometry {
        match &self.kind {
            ElementKind::Chartlet(_) | ElementKind::Primitive(_) => Geometry::Quad {
                bounds: self.transform.bounds(),
            },
            ElementKind::Stroke(group) => {
                let scale = self.transform.scale_from(&group.origin);
                let rotation = self.transform.rotation - group.origin.rotation;
                let dabs: Vec<Dab> = group
                    .dabs()
                    .map(|dab| {
                        let unit = group.origin.to_local(dab.center);
                        Dab {
                            center: self.transform.to_canvas(unit),
                            diameter: dab.diameter
                                * scale
                                * group.brush.end_taper(dab.dist, group.length),
                            rotation: dab.rotation + rotation,
                            ..*dab
                        }
                    })
                    .collect();
                let bounds = dabs.iter().fold(Rect::EMPTY, |bounds, dab| {
                    bounds.union(Rect::from_center_size(
                        dab.center,
                        Vec2::broadcast(dab.diameter),
                    ))
                });
                Geometry::Dabs { dabs, bounds }
            }
        }
    }
}
