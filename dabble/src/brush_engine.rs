//! # Brush engine
//!
//! Turns pointer samples into dabs. A stroke is `Idle -> Active -> Idle`: [`StrokeBuilder::begin`] starts one,
//! [`StrokeBuilder::extend`] stamps along the path, and [`StrokeBuilder::end`] or [`StrokeBuilder::finish`] hands back
//! the finished element.
//!
//! Dabs land at fixed arc-length intervals measured from the start of the stroke, so the placement does not
//! depend on how the input was chunked into events. With a clip rectangle set, dabs that could not touch it
//! are skipped without being generated.

use std::sync::Arc;

use dabble_core::brush::{Brush, RotationMode};
use dabble_core::color::Color;
use dabble_core::element::{Element, ElementTransform, StrokeGroup};
use dabble_core::stroke::{Dab, LineSegment, PointerKind, PointerSample, StrokePoint};
use dabble_core::util::{unit_clamp, Rect};
use rand::{Rng, SeedableRng};
use ultraviolet::Vec2;

/// Lines holding more dabs than this are split into several segments.
pub const MAX_DABS_PER_SEGMENT: usize = 64;
/// Dabs placed by a single pointer movement at most. The rest of the line is skipped.
pub const MAX_DABS_PER_LINE: usize = 16 * 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, strum::AsRefStr)]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
}

/// Live tool settings, read once when a stroke begins.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeSettings {
    pub brush: Arc<Brush>,
    pub color: Color,
    pub tool: Tool,
    /// Multiplies the brush opacity.
    pub opacity: f32,
    /// Multiplies the brush diameter.
    pub size: f32,
}
impl Default for StrokeSettings {
    fn default() -> Self {
        Self {
            brush: dabble_core::brush::BrushCatalog::defaults()
                .first()
                .cloned()
                .unwrap_or_default(),
            color: Color::BLACK,
            tool: Tool::Brush,
            opacity: 1.0,
            size: 1.0,
        }
    }
}
impl StrokeSettings {
    #[must_use]
    pub fn is_eraser(&self) -> bool {
        self.tool == Tool::Eraser
    }
    fn base_diameter(&self) -> f32 {
        self.brush.base_diameter() * self.size.max(0.0)
    }
}

fn direction(delta: Vec2) -> Option<Vec2> {
    let mag = delta.mag();
    (mag > f32::EPSILON && mag.is_finite()).then(|| delta / mag)
}

/// Parameter range of the line `from -> to` that lies inside `rect`.
fn clip_line(from: Vec2, to: Vec2, rect: Rect) -> Option<(f64, f64)> {
    let (mut enter, mut exit) = (0.0_f64, 1.0_f64);
    let axes = [
        (from.x, to.x, rect.min.x, rect.max.x),
        (from.y, to.y, rect.min.y, rect.max.y),
    ];
    for (start, end, min, max) in axes {
        let (start, delta) = (f64::from(start), f64::from(end) - f64::from(start));
        let (min, max) = (f64::from(min), f64::from(max));
        if delta.abs() < f64::EPSILON {
            if start < min || start > max {
                return None;
            }
            continue;
        }
        let (a, b) = ((min - start) / delta, (max - start) / delta);
        enter = enter.max(a.min(b));
        exit = exit.min(a.max(b));
        if enter > exit {
            return None;
        }
    }
    Some((enter, exit))
}

struct ActiveStroke {
    pointer: u64,
    settings: StrokeSettings,
    seed: u64,
    rng: rand::rngs::SmallRng,
    /// Dabs reaching into this rect are placed, the rest skipped.
    clip: Option<Rect>,
    last: StrokePoint,
    /// Arc length up to `last`. `StrokePoint::dist` is too coarse to accumulate in.
    length: f64,
    /// Arc length at which the next dab lands.
    next_dab_at: f64,
    segments: Vec<LineSegment>,
}
impl ActiveStroke {
    /// How far a dab can reach from its stroke point.
    fn reach(&self) -> f32 {
        let brush = &self.settings.brush;
        let diameter = self.settings.base_diameter() * (1.0 + brush.jitter.abs());
        diameter * (1.0 + brush.jitter.abs() + brush.scatter.abs())
    }
    /// Move `next_dab_at` to the first dab position at or after `at`.
    fn skip_to(&mut self, at: f64, spacing: f64) {
        if self.next_dab_at < at {
            self.next_dab_at += ((at - self.next_dab_at) / spacing).ceil() * spacing;
        }
    }
    /// Move `next_dab_at` to the first dab position after `at`.
    fn skip_past(&mut self, at: f64, spacing: f64) {
        if self.next_dab_at <= at {
            self.next_dab_at += (((at - self.next_dab_at) / spacing).floor() + 1.0) * spacing;
        }
    }
    /// Place dabs along `from -> to`, which covers arc lengths `start..=end`.
    fn make_line(&mut self, from: StrokePoint, to: StrokePoint, start: f64, end: f64) -> Vec<LineSegment> {
        let spacing = f64::from(self.settings.brush.spacing_px(self.settings.base_diameter()));
        let span = end - start;
        let visible = match self.clip {
            Some(clip) => clip_line(from.position, to.position, clip.inflated(self.reach()))
                .map(|(enter, exit)| (start + span * enter, start + span * exit)),
            None => Some((start, end)),
        };
        let tangent = direction(to.position - from.position)
            .or_else(|| {
                self.segments
                    .last()
                    .and_then(|last| direction(last.to.position - last.from.position))
            })
            .unwrap_or_else(Vec2::unit_x);

        let mut placed: Vec<(StrokePoint, Dab)> = Vec::new();
        if let Some((enter, exit)) = visible {
            self.skip_to(enter, spacing);
            while self.next_dab_at <= exit && placed.len() < MAX_DABS_PER_LINE {
                let t = if span > 0.0 {
                    ((self.next_dab_at - start) / span) as f32
                } else {
                    0.0
                };
                let point = from.lerp(&to, t.clamp(0.0, 1.0));
                placed.push((point, self.make_dab(&point, tangent)));
                self.next_dab_at += spacing;
            }
        }
        self.skip_past(end, spacing);

        if placed.is_empty() {
            return vec![LineSegment {
                from,
                to,
                dabs: smallvec::SmallVec::new(),
            }];
        }
        let chunks = placed.chunks(MAX_DABS_PER_SEGMENT);
        let count = chunks.len();
        chunks
            .enumerate()
            .map(|(idx, chunk)| {
                let first = if idx == 0 { from } else { chunk[0].0 };
                let last = if idx + 1 == count {
                    to
                } else {
                    chunk[chunk.len() - 1].0
                };
                LineSegment {
                    from: first,
                    to: last,
                    dabs: chunk.iter().map(|(_, dab)| *dab).collect(),
                }
            })
            .collect()
    }
    fn make_dab(&mut self, point: &StrokePoint, tangent: Vec2) -> Dab {
        let brush = &self.settings.brush;
        let curves = &brush.curves;
        // Without pressure input, curves read at full pressure.
        let pressure = point.pressure.unwrap_or(1.0);

        // Always draw the same number of values per dab, so replays stay aligned.
        let [jitter_size, jitter_x, jitter_y, scatter, spin]: [f32; 5] =
            std::array::from_fn(|_| self.rng.gen_range(-1.0..=1.0));

        let base = self.settings.base_diameter()
            * curves.size.sample(pressure)
            * brush.start_taper(point.dist);
        let diameter = (base * (1.0 + jitter_size * brush.jitter)).max(0.0);

        let normal = Vec2::new(-tangent.y, tangent.x);
        let center = point.position
            + Vec2::new(jitter_x, jitter_y) * (brush.jitter * diameter / 2.0)
            + normal * (scatter * brush.scatter * diameter);

        let rotation = match brush.rotation_mode {
            RotationMode::Ahead => tangent.y.atan2(tangent.x) + brush.shape_rotation,
            RotationMode::Random => spin * brush.shape_rotation,
        };
        let opacity = unit_clamp(
            brush.opacity_at(pressure) * curves.flow.sample(pressure) * self.settings.opacity,
        );
        Dab {
            center,
            diameter,
            opacity,
            rotation,
            hardness: 1.0 - curves.bleed.sample(pressure),
            dist: point.dist,
        }
    }
    fn into_element(self) -> Element {
        let bounds = self
            .segments
            .iter()
            .flat_map(|segment| segment.dabs.iter())
            .fold(Rect::EMPTY, |bounds, dab| {
                bounds.union(Rect::from_center_size(
                    dab.center,
                    Vec2::broadcast(dab.diameter),
                ))
            });
        let origin = if bounds.is_empty() {
            ElementTransform {
                center: self.last.position,
                size: Vec2::zero(),
                rotation: 0.0,
            }
        } else {
            ElementTransform::from_rect(bounds)
        };
        let is_eraser = self.settings.is_eraser();
        Element::stroke(StrokeGroup {
            brush: self.settings.brush,
            color: self.settings.color,
            is_eraser,
            seed: self.seed,
            segments: self.segments,
            length: self.length as f32,
            origin,
        })
    }
}

/// The in-progress stroke state machine.
pub struct StrokeBuilder {
    pencil_only: bool,
    clip: Option<Rect>,
    active: Option<ActiveStroke>,
}
impl StrokeBuilder {
    #[must_use]
    pub fn new(pencil_only: bool) -> Self {
        Self {
            pencil_only,
            clip: None,
            active: None,
        }
    }
    pub fn set_pencil_only(&mut self, pencil_only: bool) {
        self.pencil_only = pencil_only;
    }
    /// Only place dabs that could land in `clip`, usually the canvas. Applies from the next stroke.
    pub fn set_clip(&mut self, clip: Option<Rect>) {
        self.clip = clip;
    }
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }
    /// Settings of the stroke in progress.
    #[must_use]
    pub fn settings(&self) -> Option<&StrokeSettings> {
        self.active.as_ref().map(|active| &active.settings)
    }
    fn accepts_kind(&self, kind: PointerKind) -> bool {
        !self.pencil_only || kind == PointerKind::Pencil
    }
    /// Whether [`Self::begin`] would start a stroke from this sample.
    #[must_use]
    pub fn accepts(&self, sample: &PointerSample) -> bool {
        self.active.is_none() && self.accepts_kind(sample.kind)
    }
    /// Start a stroke. Returns the segment holding the first dab, or `None` if the sample was rejected.
    pub fn begin(
        &mut self,
        sample: &PointerSample,
        settings: StrokeSettings,
        seed: u64,
    ) -> Option<Vec<LineSegment>> {
        if let Some(active) = &self.active {
            log::trace!(
                "pointer {} ignored, stroke in progress with {}",
                sample.pointer,
                active.pointer
            );
            return None;
        }
        if !self.accepts_kind(sample.kind) {
            log::trace!("{} input ignored in pencil-only mode", sample.kind.as_ref());
            return None;
        }
        let point = StrokePoint {
            position: sample.position,
            pressure: sample.pressure,
            dist: 0.0,
        };
        let mut active = ActiveStroke {
            pointer: sample.pointer,
            settings,
            seed,
            rng: rand::rngs::SmallRng::seed_from_u64(seed),
            clip: self.clip,
            last: point,
            length: 0.0,
            next_dab_at: 0.0,
            segments: Vec::new(),
        };
        let segments = active.make_line(point, point, 0.0, 0.0);
        active.segments.extend(segments.iter().cloned());
        self.active = Some(active);
        Some(segments)
    }
    /// Continue the stroke to a new sample. Returns the newly stamped segments, empty if the sample
    /// didn't move or belongs to another pointer.
    pub fn extend(&mut self, sample: &PointerSample) -> Vec<LineSegment> {
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };
        if active.pointer != sample.pointer {
            return Vec::new();
        }
        let delta = (sample.position - active.last.position).mag();
        if !(delta > 0.0 && delta.is_finite()) {
            return Vec::new();
        }
        let start = active.length;
        let end = start + f64::from(delta);
        let to = StrokePoint {
            position: sample.position,
            pressure: sample.pressure,
            dist: end as f32,
        };
        let segments = active.make_line(active.last, to, start, end);
        active.last = to;
        active.length = end;
        active.segments.extend(segments.iter().cloned());
        segments
    }
    /// End the stroke at a final sample. `None` if no stroke was active or the sample belongs to
    /// another pointer.
    pub fn end(&mut self, sample: &PointerSample) -> Option<Element> {
        if self.active.as_ref()?.pointer != sample.pointer {
            return None;
        }
        self.extend(sample);
        self.finish()
    }
    /// Finalize whatever has been drawn so far, regardless of pointer.
    pub fn finish(&mut self) -> Option<Element> {
        let active = self.active.take()?;
        log::debug!(
            "stroke finished: {} segments, {:.1}px",
            active.segments.len(),
            active.length
        );
        Some(active.into_element())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use dabble_core::element::{ElementKind, Geometry};

    fn sample(pointer: u64, x: f32, y: f32) -> PointerSample {
        PointerSample {
            pointer,
            ..PointerSample::at(Vec2::new(x, y))
        }
    }
    fn group(element: &Element) -> &StrokeGroup {
        match element.kind() {
            ElementKind::Stroke(group) => group,
            other => panic!("expected a stroke, got {other:?}"),
        }
    }
    #[test]
    fn first_dab_at_start() {
        let mut builder = StrokeBuilder::new(false);
        let segments = builder
            .begin(&sample(1, 10.0, 10.0), StrokeSettings::default(), 0)
            .unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].dabs.len(), 1);
        assert_eq!(segments[0].dabs[0].center, Vec2::new(10.0, 10.0));
        assert_eq!(segments[0].dabs[0].dist, 0.0);
    }
    #[test]
    fn spacing_independent_of_chunking() {
        let settings = StrokeSettings {
            brush: Arc::new(Brush {
                spacing: 1.0,
                ..Brush::default()
            }),
            ..StrokeSettings::default()
        };
        let spacing = settings.brush.spacing_px(settings.base_diameter());

        let mut whole = StrokeBuilder::new(false);
        whole.begin(&sample(0, 0.0, 0.0), settings.clone(), 9);
        whole.extend(&sample(0, 100.0, 0.0));
        let whole = whole.finish().unwrap();

        let mut pieces = StrokeBuilder::new(false);
        pieces.begin(&sample(0, 0.0, 0.0), settings, 9);
        for x in [3.0, 17.5, 40.0, 41.0, 100.0] {
            pieces.extend(&sample(0, x, 0.0));
        }
        let pieces = pieces.finish().unwrap();

        let dists = |element: &Element| -> Vec<f32> { group(element).dabs().map(|d| d.dist).collect() };
        let (a, b) = (dists(&whole), dists(&pieces));
        assert_eq!(a.len(), b.len());
        assert_eq!(a.len(), (100.0 / spacing).floor() as usize + 1);
        for (a, b) in a.iter().zip(&b) {
            assert!((a - b).abs() < 1e-3);
        }
    }
    #[test]
    fn long_lines_split() {
        let mut builder = StrokeBuilder::new(false);
        builder.begin(&sample(0, 0.0, 0.0), StrokeSettings::default(), 0);
        // Spacing is 0.73px, so this is well over a hundred dabs.
        let segments = builder.extend(&sample(0, 200.0, 0.0));
        assert!(segments.len() > 1);
        assert!(segments
            .iter()
            .all(|segment| segment.dabs.len() <= MAX_DABS_PER_SEGMENT));
        assert_eq!(segments.last().unwrap().to.position, Vec2::new(200.0, 0.0));
    }
    #[test]
    fn far_samples_are_clipped() {
        let settings = StrokeSettings {
            brush: Arc::new(Brush::default()),
            ..StrokeSettings::default()
        };
        let canvas = Rect {
            min: Vec2::zero(),
            max: Vec2::new(16.0, 16.0),
        };
        let mut builder = StrokeBuilder::new(false);
        builder.set_clip(Some(canvas));
        builder.begin(&sample(0, 8.0, 8.0), settings, 0);
        builder.extend(&sample(0, 2_000_000.0, 0.0));
        // Past the point where f32 arc length stops advancing by one spacing.
        builder.extend(&sample(0, 30_000_000.0, 0.0));
        builder.extend(&sample(0, 8.0, 12.0));
        let element = builder.finish().unwrap();
        let group = group(&element);

        assert!(group.length > 5.9e7);
        let count = group.dabs().count();
        assert!(count > 2 && count < 100, "{count} dabs");
        let reach = canvas.inflated(8.0);
        assert!(group.dabs().all(|dab| {
            dab.center.x > reach.min.x
                && dab.center.x < reach.max.x
                && dab.center.y > reach.min.y
                && dab.center.y < reach.max.y
        }));
    }
    #[test]
    fn unclipped_lines_are_capped() {
        let mut builder = StrokeBuilder::new(false);
        builder.begin(&sample(0, 0.0, 0.0), StrokeSettings::default(), 0);
        for x in [2_000_000.0, 30_000_000.0] {
            let placed: usize = builder
                .extend(&sample(0, x, 0.0))
                .iter()
                .map(|segment| segment.dabs.len())
                .sum();
            assert_eq!(placed, MAX_DABS_PER_LINE);
        }
        assert!(builder.finish().is_some());
    }
    #[test]
    fn second_pointer_rejected() {
        let mut builder = StrokeBuilder::new(false);
        assert!(builder
            .begin(&sample(1, 0.0, 0.0), StrokeSettings::default(), 0)
            .is_some());
        assert!(builder
            .begin(&sample(2, 5.0, 5.0), StrokeSettings::default(), 0)
            .is_none());
        assert!(builder.extend(&sample(2, 50.0, 50.0)).is_empty());
        assert!(builder.end(&sample(2, 50.0, 50.0)).is_none());
        assert!(builder.is_active());
        let element = builder.end(&sample(1, 10.0, 0.0)).unwrap();
        assert!((group(&element).length - 10.0).abs() < 1e-4);
        assert!(!builder.is_active());
    }
    #[test]
    fn pencil_only_filters() {
        let mut builder = StrokeBuilder::new(true);
        assert!(builder
            .begin(&sample(0, 0.0, 0.0), StrokeSettings::default(), 0)
            .is_none());
        let pencil = PointerSample {
            kind: PointerKind::Pencil,
            pressure: Some(0.5),
            ..sample(0, 0.0, 0.0)
        };
        assert!(builder
            .begin(&pencil, StrokeSettings::default(), 0)
            .is_some());
    }
    #[test]
    fn pressure_scales_size() {
        let mut builder = StrokeBuilder::new(false);
        let half = PointerSample {
            pressure: Some(0.5),
            ..sample(0, 0.0, 0.0)
        };
        let dab = builder
            .begin(&half, StrokeSettings::default(), 0)
            .unwrap()[0]
            .dabs[0];
        let full = StrokeSettings::default().base_diameter();
        assert!((dab.diameter - full / 2.0).abs() < 1e-4);
    }
    #[test]
    fn jitter_replays_from_seed() {
        let settings = StrokeSettings {
            brush: dabble_core::brush::BrushCatalog::defaults()
                .get("Scatter")
                .unwrap()
                .clone(),
            ..StrokeSettings::default()
        };
        let run = |seed| {
            let mut builder = StrokeBuilder::new(false);
            builder.begin(&sample(0, 0.0, 0.0), settings.clone(), seed);
            builder.extend(&sample(0, 60.0, 30.0));
            builder.finish().unwrap()
        };
        let (a, b, c) = (run(4), run(4), run(5));
        assert_eq!(group(&a).segments, group(&b).segments);
        assert_ne!(group(&a).segments, group(&c).segments);
    }
    #[test]
    fn finished_stroke_bounds() {
        let mut builder = StrokeBuilder::new(false);
        builder.begin(&sample(0, 20.0, 20.0), StrokeSettings::default(), 0);
        let element = builder.finish().unwrap();
        let diameter = StrokeSettings::default().base_diameter();
        let Geometry::Dabs { dabs, bounds } = element.geometry() else {
            panic!("strokes produce dabs")
        };
        assert_eq!(dabs.len(), 1);
        assert!((bounds.size().x - diameter).abs() < 1e-4);
        assert!((bounds.center() - Vec2::new(20.0, 20.0)).mag() < 1e-4);
    }
    #[test]
    fn eraser_flag_persists() {
        let mut builder = StrokeBuilder::new(false);
        let settings = StrokeSettings {
            tool: Tool::Eraser,
            ..StrokeSettings::default()
        };
        builder.begin(&sample(0, 0.0, 0.0), settings, 0);
        assert!(group(&builder.finish().unwrap()).is_eraser);
    }
}
