//! Rasterize elements onto textures.

use std::sync::Arc;

use dabble_core::blend::Blend;
use dabble_core::brush::Brush;
use dabble_core::color::{Color, Premul};
use dabble_core::element::{Chartlet, Element, ElementKind, Geometry, Primitive, StrokeGroup};
use dabble_core::id::TextureId;
use dabble_core::stroke::{Dab, LineSegment};
use ultraviolet::Vec2;

use crate::error::EngineError;
use crate::pool::TexturePool;
use crate::raster::{self, GrainSampler, PixelRect, Sampler};
use crate::texture::Texture;

/// Pool textures a brush stamps with, resolved once per draw.
struct BrushTextures {
    shape: Option<Arc<Texture>>,
    grain: Option<(Arc<Texture>, f32, f32)>,
}

pub struct Printer<'a> {
    pool: &'a TexturePool,
}
impl<'a> Printer<'a> {
    #[must_use]
    pub fn new(pool: &'a TexturePool) -> Self {
        Self { pool }
    }
    fn lookup(&self, id: &TextureId) -> Result<Arc<Texture>, EngineError> {
        self.pool
            .find_texture(id)
            .ok_or_else(|| EngineError::texture_miss(id))
    }
    /// A missing shape falls back to the round dab, a missing grain to none.
    /// Textures equal to `target` are treated as missing.
    fn brush_textures(&self, brush: &Brush, target: &TextureId) -> BrushTextures {
        let shape = brush.shape.as_ref().filter(|id| *id != target).and_then(|id| {
            self.lookup(id)
                .inspect_err(|e| log::debug!("brush {}: {e}", brush.name))
                .ok()
        });
        let grain = brush.grain.as_ref().filter(|grain| grain.texture != *target).and_then(|grain| {
            let texture = self
                .lookup(&grain.texture)
                .inspect_err(|e| log::debug!("brush {}: {e}", brush.name))
                .ok()?;
            Some((texture, grain.scale, grain.depth))
        });
        BrushTextures { shape, grain }
    }
    /// Draw an element with its own geometry. Eraser strokes always erase, whatever `blend` says.
    pub fn draw(&self, element: &Element, target: &Texture, blend: Blend) -> Result<(), EngineError> {
        match element.kind() {
            ElementKind::Stroke(group) => {
                self.draw_stroke(group, element.geometry(), target, blend);
                Ok(())
            }
            ElementKind::Chartlet(chartlet) => self.draw_chartlet(element, chartlet, target, blend),
            ElementKind::Primitive(primitive) => {
                self.draw_primitive(element, primitive, target, blend);
                Ok(())
            }
        }
    }
    fn draw_stroke(&self, group: &StrokeGroup, geometry: &Geometry, target: &Texture, blend: Blend) {
        let Geometry::Dabs { dabs, bounds } = geometry else {
            log::warn!("stroke with non-dab geometry skipped");
            return;
        };
        let textures = self.brush_textures(&group.brush, target.id());
        let widest = dabs.iter().map(|dab| dab.diameter).fold(0.0, f32::max);
        let reach = if textures.shape.is_some() {
            widest * 0.25
        } else {
            1.0
        };
        let Some(area) = PixelRect::covering(bounds.inflated(reach), target.size()) else {
            return;
        };
        // Stamp into a scratch buffer first so the whole stroke blends onto the layer as one.
        let size = [area.width(), area.height()];
        let mut scratch = vec![[0.0; 4]; size[0] as usize * size[1] as usize];
        let offset = Vec2::new(area.min[0] as f32, area.min[1] as f32);
        stamp(
            &mut scratch,
            size,
            offset,
            dabs.iter().map(|dab| Dab {
                center: dab.center - offset,
                ..*dab
            }),
            stamp_color(group.color, group.is_eraser),
            &textures,
        );
        let blend = Blend::for_tool(group.is_eraser, blend.opacity);
        let width = target.width();
        raster::composite_region(&mut target.write(), width, &scratch, area, blend);
    }
    fn draw_chartlet(
        &self,
        element: &Element,
        chartlet: &Chartlet,
        target: &Texture,
        blend: Blend,
    ) -> Result<(), EngineError> {
        if chartlet.texture == *target.id() {
            return Err(EngineError::SelfSample(chartlet.texture.to_string()));
        }
        let texture = self.lookup(&chartlet.texture)?;
        let texels = texture.read();
        let sampler = Sampler {
            pixels: &texels,
            size: texture.size(),
        };
        let size = target.size();
        let bounds = element.geometry().bounds();
        raster::fill_quad(&mut target.write(), size, element.transform(), bounds, blend, |unit| {
            let texel = sampler.nearest(unit + Vec2::broadcast(0.5));
            (texel[3] > 0.0).then_some(texel)
        });
        Ok(())
    }
    fn draw_primitive(&self, element: &Element, primitive: &Primitive, target: &Texture, blend: Blend) {
        let fill = primitive.fill.premultiplied();
        let shape = primitive.shape;
        let size = target.size();
        let bounds = element.geometry().bounds();
        raster::fill_quad(&mut target.write(), size, element.transform(), bounds, blend, |unit| {
            shape.contains(unit).then_some(fill)
        });
    }
    /// Stamp freshly generated segments straight onto a canvas-sized buffer, for the live stroke.
    pub fn stamp_segments(
        &self,
        target: &Texture,
        segments: &[LineSegment],
        brush: &Brush,
        color: Color,
        is_eraser: bool,
    ) {
        let textures = self.brush_textures(brush, target.id());
        let size = target.size();
        stamp(
            &mut target.write(),
            size,
            Vec2::zero(),
            segments.iter().flat_map(|segment| segment.dabs.iter().copied()),
            stamp_color(color, is_eraser),
            &textures,
        );
    }
}

/// Erasers only carry coverage.
fn stamp_color(color: Color, is_eraser: bool) -> Premul {
    if is_eraser {
        Color::BLACK.premultiplied()
    } else {
        color.premultiplied()
    }
}

fn stamp(
    pixels: &mut [Premul],
    size: [u32; 2],
    offset: Vec2,
    dabs: impl Iterator<Item = Dab>,
    color: Premul,
    textures: &BrushTextures,
) {
    let shape_texels = textures.shape.as_ref().map(|texture| texture.read());
    let shape = textures
        .shape
        .as_ref()
        .zip(shape_texels.as_ref())
        .map(|(texture, texels)| Sampler {
            pixels: texels,
            size: texture.size(),
        });
    let grain_texels = textures.grain.as_ref().map(|(texture, ..)| texture.read());
    let grain = textures
        .grain
        .as_ref()
        .zip(grain_texels.as_ref())
        .map(|((texture, scale, depth), texels)| GrainSampler {
            sampler: Sampler {
                pixels: texels,
                size: texture.size(),
            },
            scale: *scale,
            depth: *depth,
            offset,
        });
    for dab in dabs {
        raster::stamp_dab(pixels, size, &dab, color, shape, grain);
    }
}
