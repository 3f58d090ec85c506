use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dabble_core::color::{Color, Premul};
use dabble_core::id::TextureId;

use crate::render_device::RenderContext;

/// A premultiplied RGBA32F image owned by the [`crate::pool::TexturePool`].
/// Everything else refers to it by [`TextureId`], or borrows an `Arc` for the span of a draw.
pub struct Texture {
    id: TextureId,
    size: [u32; 2],
    pixels: parking_lot::RwLock<Vec<Premul>>,
    /// No draw has touched the texture since creation or the last clear.
    blank: AtomicBool,
    bytes: u64,
    context: Arc<RenderContext>,
}
impl Drop for Texture {
    fn drop(&mut self) {
        self.context.free(self.bytes);
    }
}
impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
impl Texture {
    pub(crate) fn new(
        context: Arc<RenderContext>,
        id: TextureId,
        size: [u32; 2],
    ) -> Result<Self, crate::error::ResourceError> {
        let bytes = context.allocate(size)?;
        let len = size[0] as usize * size[1] as usize;
        Ok(Self {
            id,
            size,
            pixels: vec![[0.0; 4]; len].into(),
            blank: AtomicBool::new(true),
            bytes,
            context,
        })
    }
    #[must_use]
    pub fn id(&self) -> &TextureId {
        &self.id
    }
    #[must_use]
    pub fn size(&self) -> [u32; 2] {
        self.size
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.size[0]
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.size[1]
    }
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.bytes
    }
    /// True if nothing has been drawn since creation or the last [`Self::clear`].
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.blank.load(Ordering::Acquire)
    }
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, Vec<Premul>> {
        self.pixels.read()
    }
    /// Lock for drawing. Marks the texture as drawn.
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, Vec<Premul>> {
        let guard = self.pixels.write();
        self.blank.store(false, Ordering::Release);
        guard
    }
    /// Reset every texel to transparent.
    pub fn clear(&self) {
        self.pixels.write().fill([0.0; 4]);
        self.blank.store(true, Ordering::Release);
    }
    /// Fill with a solid color. Counts as a draw.
    pub fn fill(&self, color: Color) {
        self.write().fill(color.premultiplied());
    }
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Premul> {
        if x >= self.size[0] || y >= self.size[1] {
            return None;
        }
        self.read()
            .get(y as usize * self.size[0] as usize + x as usize)
            .copied()
    }
    /// Straight-alpha 8 bit copy, for encoding.
    #[must_use]
    pub fn to_rgba8(&self) -> image::RgbaImage {
        let pixels = self.read();
        let bytes: Vec<[u8; 4]> = pixels
            .iter()
            .map(|texel| Color::from_premultiplied(*texel).to_rgba8())
            .collect();
        let [width, height] = self.size;
        // Buffer length matches the dimensions by construction.
        image::RgbaImage::from_raw(width, height, bytemuck::cast_slice(&bytes).to_vec())
            .unwrap_or_else(|| image::RgbaImage::new(width, height))
    }
    /// Replace the contents with a straight-alpha image of the same size.
    pub fn upload_rgba8(&self, image: &image::RgbaImage) {
        if image.dimensions() != (self.size[0], self.size[1]) {
            log::warn!(
                "{}: upload of {:?} into {:?} skipped",
                self.id,
                image.dimensions(),
                self.size
            );
            return;
        }
        let mut pixels = self.write();
        for (texel, rgba) in pixels.iter_mut().zip(image.pixels()) {
            *texel = Color::from_rgba8(rgba.0).premultiplied();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::EngineConfig;
    #[test]
    fn blank_tracking() {
        let context = RenderContext::new(&EngineConfig::default()).unwrap();
        let texture = Texture::new(context.clone(), TextureId::explicit("t"), [4, 4]).unwrap();
        assert!(texture.is_blank());
        texture.fill(Color::WHITE);
        assert!(!texture.is_blank());
        assert_eq!(texture.pixel(3, 3), Some([1.0; 4]));
        assert_eq!(texture.pixel(4, 0), None);
        texture.clear();
        assert!(texture.is_blank());
        assert_eq!(context.resident_bytes(), texture.byte_size());
        drop(texture);
        assert_eq!(context.resident_bytes(), 0);
    }
    #[test]
    fn rgba8_round_trip() {
        let context = RenderContext::new(&EngineConfig::default()).unwrap();
        let texture = Texture::new(context, TextureId::explicit("t"), [2, 1]).unwrap();
        let image = image::RgbaImage::from_raw(2, 1, vec![255, 0, 0, 255, 0, 0, 255, 128]).unwrap();
        texture.upload_rgba8(&image);
        assert_eq!(texture.to_rgba8(), image);
    }
}
