//! Software rasterization primitives. Every buffer is row-major premultiplied RGBA32F.
//!
//! Large passes (composite, quad fill) are split across rows with `rayon`. Dabs are stamped in order on
//! the calling thread, since later dabs blend over earlier ones.

use dabble_core::blend::Blend;
use dabble_core::color::Premul;
use dabble_core::element::ElementTransform;
use dabble_core::stroke::Dab;
use dabble_core::util::Rect;
use rayon::prelude::*;
use ultraviolet::{Rotor2, Vec2};

use crate::texture::Texture;

/// Integer pixel rectangle, `max` exclusive.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub min: [u32; 2],
    pub max: [u32; 2],
}
impl PixelRect {
    /// Pixels whose centers may fall inside `rect`, clipped to a `size` buffer.
    #[must_use]
    pub fn covering(rect: Rect, [width, height]: [u32; 2]) -> Option<Self> {
        use az::SaturatingAs;
        if rect.is_empty() || !rect.min.x.is_finite() || !rect.max.x.is_finite() {
            return None;
        }
        let min = [
            rect.min.x.floor().max(0.0).saturating_as::<u32>(),
            rect.min.y.floor().max(0.0).saturating_as::<u32>(),
        ];
        let max = [
            rect.max.x.ceil().saturating_as::<u32>().min(width),
            rect.max.y.ceil().saturating_as::<u32>().min(height),
        ];
        (min[0] < max[0] && min[1] < max[1]).then_some(Self { min, max })
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.max[0] - self.min[0]
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.max[1] - self.min[1]
    }
}

/// Read access to a texture's texels for sampling.
#[derive(Copy, Clone)]
pub struct Sampler<'a> {
    pub pixels: &'a [Premul],
    pub size: [u32; 2],
}
impl Sampler<'_> {
    /// Nearest texel at normalized `uv` in `[0, 1]`, clamped to edge.
    #[must_use]
    pub fn nearest(&self, uv: Vec2) -> Premul {
        use az::SaturatingAs;
        let [width, height] = self.size;
        let x: u32 = (uv.x * width as f32).floor().max(0.0).saturating_as();
        let y: u32 = (uv.y * height as f32).floor().max(0.0).saturating_as();
        self.texel(x.min(width.saturating_sub(1)), y.min(height.saturating_sub(1)))
    }
    /// Texel at integer coordinates, wrapping in both directions.
    #[must_use]
    pub fn tiled(&self, x: i64, y: i64) -> Premul {
        use az::SaturatingAs;
        let [width, height] = self.size.map(i64::from);
        if width == 0 || height == 0 {
            return [0.0; 4];
        }
        self.texel(
            x.rem_euclid(width).saturating_as(),
            y.rem_euclid(height).saturating_as(),
        )
    }
    fn texel(&self, x: u32, y: u32) -> Premul {
        self.pixels
            .get(y as usize * self.size[0] as usize + x as usize)
            .copied()
            .unwrap_or([0.0; 4])
    }
}

/// Grain overlay, modulating dab coverage by a tiled texture in canvas space.
#[derive(Copy, Clone)]
pub struct GrainSampler<'a> {
    pub sampler: Sampler<'a>,
    pub scale: f32,
    pub depth: f32,
    /// Canvas position of the target buffer's origin.
    pub offset: Vec2,
}
impl GrainSampler<'_> {
    fn factor(&self, local: Vec2) -> f32 {
        use az::SaturatingAs;
        let canvas = local + self.offset;
        let scale = self.scale.max(f32::EPSILON);
        let texel = self.sampler.tiled(
            (canvas.x / scale).floor().saturating_as(),
            (canvas.y / scale).floor().saturating_as(),
        );
        // Grain textures are grayscale, red carries the value.
        dabble_core::util::lerp(1.0, texel[0], self.depth)
    }
}

/// Composite `src` over `dst` in place. Buffers must match in size.
pub fn composite_pixels(dst: &mut [Premul], src: &[Premul], width: u32, blend: Blend) {
    let width = width as usize;
    if width == 0 || dst.len() != src.len() {
        log::warn!("composite of mismatched buffers skipped");
        return;
    }
    dst.par_chunks_mut(width)
        .zip(src.par_chunks(width))
        .for_each(|(dst_row, src_row)| {
            for (dst, src) in dst_row.iter_mut().zip(src_row) {
                if src[3] > 0.0 {
                    *dst = blend.apply(*dst, *src);
                }
            }
        });
}

/// Composite `src`, a buffer covering exactly `area`, onto the full-width `dst`.
pub fn composite_region(dst: &mut [Premul], dst_width: u32, src: &[Premul], area: PixelRect, blend: Blend) {
    let (width, area_width) = (dst_width as usize, area.width() as usize);
    if src.len() != area_width * area.height() as usize || area.max[0] > dst_width {
        log::warn!("composite of mismatched region {area:?} skipped");
        return;
    }
    let x0 = area.min[0] as usize;
    dst.par_chunks_mut(width)
        .skip(area.min[1] as usize)
        .take(area.height() as usize)
        .zip(src.par_chunks(area_width))
        .for_each(|(dst_row, src_row)| {
            let Some(dst_row) = dst_row.get_mut(x0..x0 + area_width) else {
                return;
            };
            for (dst, src) in dst_row.iter_mut().zip(src_row) {
                if src[3] > 0.0 {
                    *dst = blend.apply(*dst, *src);
                }
            }
        });
}

/// Composite one texture onto another of the same size.
pub fn composite(dst: &Texture, src: &Texture, blend: Blend) {
    if dst.id() == src.id() {
        log::warn!("{} composited onto itself, skipped", dst.id());
        return;
    }
    if dst.size() != src.size() {
        log::warn!(
            "composite of {} {:?} onto {} {:?} skipped",
            src.id(),
            src.size(),
            dst.id(),
            dst.size()
        );
        return;
    }
    let src_pixels = src.read();
    let mut dst_pixels = dst.write();
    composite_pixels(&mut dst_pixels, &src_pixels, dst.width(), blend);
}

/// Coverage of a procedural round dab at normalized radius `r`.
fn disc_coverage(r: f32, hardness: f32) -> f32 {
    let hardness = hardness.clamp(0.0, 0.999);
    if r >= 1.0 {
        0.0
    } else if r <= hardness {
        1.0
    } else {
        (1.0 - r) / (1.0 - hardness)
    }
}

/// Stamp a single dab of premultiplied `color` into `pixels`, source-over.
pub fn stamp_dab(
    pixels: &mut [Premul],
    size: [u32; 2],
    dab: &Dab,
    color: Premul,
    shape: Option<Sampler<'_>>,
    grain: Option<GrainSampler<'_>>,
) {
    let radius = dab.diameter / 2.0;
    if radius <= 0.0 || dab.opacity <= 0.0 {
        return;
    }
    // Rotated square shapes reach further than the disc.
    let reach = if shape.is_some() {
        radius * std::f32::consts::SQRT_2
    } else {
        radius
    };
    let Some(area) = PixelRect::covering(
        Rect::from_center_size(dab.center, Vec2::broadcast(reach * 2.0)),
        size,
    ) else {
        return;
    };
    let unrotate = Rotor2::from_angle(dab.rotation).reversed();
    let width = size[0] as usize;
    for y in area.min[1]..area.max[1] {
        for x in area.min[0]..area.max[0] {
            let pixel = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let mut local = (pixel - dab.center) / radius;
            unrotate.rotate_vec(&mut local);
            let coverage = match shape {
                Some(shape) => {
                    if local.x.abs() > 1.0 || local.y.abs() > 1.0 {
                        continue;
                    }
                    shape.nearest(local * 0.5 + Vec2::broadcast(0.5))[3]
                }
                None => disc_coverage(local.mag(), dab.hardness),
            };
            let coverage = coverage
                * dab.opacity
                * grain.map_or(1.0, |grain| grain.factor(pixel));
            if coverage <= 0.0 {
                continue;
            }
            let src = color.map(|channel| channel * coverage);
            let Some(dst) = pixels.get_mut(y as usize * width + x as usize) else {
                continue;
            };
            *dst = dabble_core::blend::BlendMode::Transparent.apply(*dst, src, 1.0);
        }
    }
}

/// Fill the quad of `transform` within `bounds`, asking `sampler` for the color at each covered
/// pixel center in unit space `[-0.5, 0.5]`. Pixels the sampler declines are left untouched.
pub fn fill_quad<F>(
    pixels: &mut [Premul],
    size: [u32; 2],
    transform: &ElementTransform,
    bounds: Rect,
    blend: Blend,
    sampler: F,
) where
    F: Fn(Vec2) -> Option<Premul> + Sync,
{
    let Some(area) = PixelRect::covering(bounds, size) else {
        return;
    };
    let width = size[0] as usize;
    let x_range = area.min[0]..area.max[0];
    pixels
        .par_chunks_mut(width)
        .enumerate()
        .skip(area.min[1] as usize)
        .take(area.height() as usize)
        .for_each(|(y, row)| {
            for x in x_range.clone() {
                let canvas = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let unit = transform.to_local(canvas);
                if unit.x.abs() > 0.5 || unit.y.abs() > 0.5 {
                    continue;
                }
                if let (Some(src), Some(dst)) = (sampler(unit), row.get_mut(x as usize)) {
                    *dst = blend.apply(*dst, src);
                }
            }
        });
}

/// Smallest rectangle containing every texel with alpha above `threshold`.
#[must_use]
pub fn coverage_bounds(pixels: &[Premul], size: [u32; 2], threshold: f32) -> Option<PixelRect> {
    let width = size[0] as usize;
    if width == 0 {
        return None;
    }
    pixels
        .chunks(width)
        .enumerate()
        .flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, texel)| texel[3] > threshold)
                .map(move |(x, _)| (x, y))
        })
        .fold(None, |bounds: Option<PixelRect>, (x, y)| {
            let (x, y) = (x as u32, y as u32);
            Some(match bounds {
                None => PixelRect {
                    min: [x, y],
                    max: [x + 1, y + 1],
                },
                Some(b) => PixelRect {
                    min: [b.min[0].min(x), b.min[1].min(y)],
                    max: [b.max[0].max(x + 1), b.max[1].max(y + 1)],
                },
            })
        })
}

/// Procedural paper texture for grain brushes: box-blurred value noise, opaque grayscale.
#[must_use]
pub fn paper_grain(size: u32, seed: u64) -> image::RgbaImage {
    use rand::{Rng, SeedableRng};
    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    let size = size.max(1);
    let noise: Vec<f32> = (0..size * size).map(|_| rng.gen_range(0.35..1.0)).collect();
    let at = |x: i64, y: i64| {
        let (x, y) = (x.rem_euclid(i64::from(size)), y.rem_euclid(i64::from(size)));
        noise[(y * i64::from(size) + x) as usize]
    };
    image::RgbaImage::from_fn(size, size, |x, y| {
        let (x, y) = (i64::from(x), i64::from(y));
        let sum: f32 = (-1..=1)
            .flat_map(|dy| (-1..=1).map(move |dx| (dx, dy)))
            .map(|(dx, dy)| at(x + dx, y + dy))
            .sum();
        let value = ((sum / 9.0) * 255.0).round() as u8;
        image::Rgba([value, value, value, 255])
    })
}

/// Bilinear downsample for the generation client. The long edge becomes `long_edge` pixels,
/// never upscaling.
#[must_use]
pub fn downsample(texture: &Texture, long_edge: u32) -> image::RgbaImage {
    let image = texture.to_rgba8();
    let [width, height] = texture.size();
    let long = width.max(height);
    if long <= long_edge || long_edge == 0 {
        return image;
    }
    let scale = long_edge as f32 / long as f32;
    let target = |v: u32| ((v as f32 * scale).round() as u32).max(1);
    image::imageops::resize(
        &image,
        target(width),
        target(height),
        image::imageops::FilterType::Triangle,
    )
}
