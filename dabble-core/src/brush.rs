//! # Brush
//!
//! A brush is a read-only bundle of stamping parameters. The brush engine reads it once per dab,
//! strokes keep an `Arc` snapshot of the brush they were drawn with.

use std::sync::Arc;

use crate::id::TextureId;
use crate::util::{lerp, unit_clamp};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveError {
    #[error("curve has no points")]
    Empty,
    #[error("curve point is not finite")]
    NotFinite,
}

/// Piecewise-linear response from pressure `[0, 1]` to a multiplier `[0, 1]`.
/// Flat beyond the first and last points.
#[derive(Clone, Debug, PartialEq)]
pub struct PressureCurve {
    // Sorted by x, deduplicated.
    points: smallvec::SmallVec<[[f32; 2]; 4]>,
}
impl PressureCurve {
    /// Output equals input.
    #[must_use]
    pub fn linear() -> Self {
        Self {
            points: smallvec::smallvec![[0.0, 0.0], [1.0, 1.0]],
        }
    }
    /// Ignores pressure entirely.
    #[must_use]
    pub fn flat(value: f32) -> Self {
        Self {
            points: smallvec::smallvec![[0.0, unit_clamp(value)]],
        }
    }
    pub fn from_points(points: impl IntoIterator<Item = [f32; 2]>) -> Result<Self, CurveError> {
        let mut points: smallvec::SmallVec<[[f32; 2]; 4]> = points.into_iter().collect();
        if points.iter().flatten().any(|v| !v.is_finite()) {
            return Err(CurveError::NotFinite);
        }
        if points.is_empty() {
            return Err(CurveError::Empty);
        }
        for [x, y] in &mut points {
            *x = unit_clamp(*x);
            *y = unit_clamp(*y);
        }
        points.sort_by(|a, b| a[0].total_cmp(&b[0]));
        points.dedup_by(|a, b| a[0] == b[0]);
        Ok(Self { points })
    }
    #[must_use]
    pub fn sample(&self, pressure: f32) -> f32 {
        let x = unit_clamp(pressure);
        // Never empty, checked at construction.
        let Some((first, last)) = self.points.first().zip(self.points.last()) else {
            return 1.0;
        };
        if x <= first[0] {
            return first[1];
        }
        if x >= last[0] {
            return last[1];
        }
        self.points
            .windows(2)
            .find(|pair| x <= pair[1][0])
            .map_or(last[1], |pair| {
                let [a, b] = [pair[0], pair[1]];
                lerp(a[1], b[1], (x - a[0]) / (b[0] - a[0]))
            })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumIter)]
pub enum RotationMode {
    /// Dabs face along the local tangent of the path.
    Ahead,
    /// Each dab gets an independent random rotation, scaled by the shape rotation amount.
    Random,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PressureCurves {
    pub size: PressureCurve,
    pub opacity: PressureCurve,
    pub flow: PressureCurve,
    pub bleed: PressureCurve,
}
impl Default for PressureCurves {
    fn default() -> Self {
        Self {
            size: PressureCurve::linear(),
            opacity: PressureCurve::flat(1.0),
            flow: PressureCurve::flat(1.0),
            bleed: PressureCurve::flat(0.0),
        }
    }
}

/// Texture overlay multiplied into dab coverage, sampled in canvas space.
#[derive(Clone, Debug, PartialEq)]
pub struct Grain {
    pub texture: TextureId,
    /// Canvas pixels per grain texel.
    pub scale: f32,
    /// How strongly the grain modulates coverage, `[0, 1]`.
    pub depth: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Brush {
    pub name: String,
    /// Normalized size, mapped into `min_size..=max_size`.
    pub point_size: f32,
    pub min_size: f32,
    pub max_size: f32,
    pub opacity: f32,
    pub min_opacity: f32,
    pub max_opacity: f32,
    /// Distance between dabs as a fraction of the base diameter.
    pub spacing: f32,
    /// Perpendicular offset of each dab, as a fraction of its diameter.
    pub scatter: f32,
    pub rotation_mode: RotationMode,
    /// Radians. Fixed offset in `Ahead` mode, maximum deviation in `Random` mode.
    pub shape_rotation: f32,
    /// Random size and position perturbation, as a fraction of the diameter.
    pub jitter: f32,
    /// Canvas pixels over which the stroke start grows to full size.
    pub taper_start: f32,
    /// Canvas pixels over which the stroke end shrinks.
    pub taper_end: f32,
    pub curves: PressureCurves,
    /// Stamp shape. `None` for a procedural disc.
    pub shape: Option<TextureId>,
    pub grain: Option<Grain>,
}
impl Default for Brush {
    fn default() -> Self {
        Self {
            name: "Round".to_owned(),
            point_size: 0.1,
            min_size: 1.0,
            max_size: 64.0,
            opacity: 1.0,
            min_opacity: 0.0,
            max_opacity: 1.0,
            spacing: 0.1,
            scatter: 0.0,
            rotation_mode: RotationMode::Ahead,
            shape_rotation: 0.0,
            jitter: 0.0,
            taper_start: 0.0,
            taper_end: 0.0,
            curves: PressureCurves::default(),
            shape: None,
            grain: None,
        }
    }
}
/// Taper never shrinks a dab below this fraction, so short strokes still leave a mark.
pub const MIN_TAPER: f32 = 0.2;
/// Dabs closer than this (in pixels) are never placed, however small the brush.
pub const MIN_SPACING_PX: f32 = 0.5;

impl Brush {
    /// Diameter in pixels at full pressure, before the tool size setting.
    #[must_use]
    pub fn base_diameter(&self) -> f32 {
        lerp(self.min_size, self.max_size, unit_clamp(self.point_size))
    }
    /// Arc length between dabs for a given effective base diameter.
    #[must_use]
    pub fn spacing_px(&self, diameter: f32) -> f32 {
        (self.spacing * diameter).max(MIN_SPACING_PX)
    }
    /// Opacity response to pressure, before flow.
    #[must_use]
    pub fn opacity_at(&self, pressure: f32) -> f32 {
        let response = self.curves.opacity.sample(pressure);
        unit_clamp(self.opacity) * lerp(self.min_opacity, self.max_opacity, response)
    }
    /// Size multiplier due to the start taper at arc length `dist`.
    #[must_use]
    pub fn start_taper(&self, dist: f32) -> f32 {
        taper_ramp(dist, self.taper_start)
    }
    /// Size multiplier due to the end taper, for a stroke of total arc length `length`.
    #[must_use]
    pub fn end_taper(&self, dist: f32, length: f32) -> f32 {
        taper_ramp(length - dist, self.taper_end)
    }
    /// Combined taper. The end taper only applies when the total stroke length is known.
    #[must_use]
    pub fn taper(&self, dist: f32, length: Option<f32>) -> f32 {
        let end = length.map_or(1.0, |length| self.end_taper(dist, length));
        self.start_taper(dist).min(end)
    }
}
fn taper_ramp(dist: f32, over: f32) -> f32 {
    if over <= 0.0 {
        1.0
    } else {
        lerp(MIN_TAPER, 1.0, unit_clamp(dist / over))
    }
}

/// Named brush collection.
#[derive(Clone, Debug, Default)]
pub struct BrushCatalog {
    brushes: Vec<Arc<Brush>>,
    by_name: hashbrown::HashMap<String, usize>,
}
impl BrushCatalog {
    /// The bundled brushes, shared by every document.
    pub fn defaults() -> &'static Self {
        static DEFAULTS: std::sync::OnceLock<BrushCatalog> = std::sync::OnceLock::new();
        DEFAULTS.get_or_init(Self::bundled)
    }
    fn bundled() -> Self {
        let round = Brush::default();
        let pen = Brush {
            name: "Pen".to_owned(),
            point_size: 0.05,
            spacing: 0.05,
            taper_start: 12.0,
            taper_end: 24.0,
            ..Brush::default()
        };
        let airbrush = Brush {
            name: "Airbrush".to_owned(),
            point_size: 0.4,
            opacity: 0.6,
            spacing: 0.08,
            curves: PressureCurves {
                size: PressureCurve::flat(1.0),
                opacity: PressureCurve::linear(),
                flow: PressureCurve::flat(0.3),
                bleed: PressureCurve::flat(0.9),
            },
            ..Brush::default()
        };
        let scatter = Brush {
            name: "Scatter".to_owned(),
            point_size: 0.2,
            spacing: 0.6,
            scatter: 0.8,
            jitter: 0.3,
            rotation_mode: RotationMode::Random,
            shape_rotation: std::f32::consts::PI,
            ..Brush::default()
        };
        let chalk = Brush {
            name: "Chalk".to_owned(),
            point_size: 0.25,
            spacing: 0.15,
            curves: PressureCurves {
                bleed: PressureCurve::flat(0.3),
                ..PressureCurves::default()
            },
            grain: Some(Grain {
                texture: TextureId::explicit(PAPER_GRAIN),
                scale: 1.0,
                depth: 0.7,
            }),
            ..Brush::default()
        };
        let mut catalog = Self::default();
        for brush in [round, pen, airbrush, scatter, chalk] {
            catalog.insert(brush);
        }
        catalog
    }
    /// Add a brush, replacing any brush of the same name.
    pub fn insert(&mut self, brush: Brush) -> Arc<Brush> {
        let brush = Arc::new(brush);
        if let Some(&idx) = self.by_name.get(&brush.name) {
            self.brushes[idx] = brush.clone();
        } else {
            self.by_name.insert(brush.name.clone(), self.brushes.len());
            self.brushes.push(brush.clone());
        }
        brush
    }
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Brush>> {
        self.by_name.get(name).and_then(|&idx| self.brushes.get(idx))
    }
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Brush>> + '_ {
        self.brushes.iter()
    }
    #[must_use]
    pub fn first(&self) -> Option<&Arc<Brush>> {
        self.brushes.first()
    }
}

/// Texture id of the bundled paper grain, generated by the engine at startup.
pub const PAPER_GRAIN: &str = "builtin/grain/paper";
