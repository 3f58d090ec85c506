//! # Texture pool
//!
//! Single owner of every texture. Lookup is by [`TextureId`], and asking for an id that already exists
//! hands back the existing texture rather than allocating another one.

use std::sync::Arc;

use dabble_core::id::TextureId;

use crate::error::EngineError;
use crate::render_device::RenderContext;
use crate::texture::Texture;

pub struct TexturePool {
    context: Arc<RenderContext>,
    textures: parking_lot::RwLock<hashbrown::HashMap<TextureId, Arc<Texture>>>,
    /// Ids created since the owner last collected them, for registration with the document.
    created: parking_lot::Mutex<Vec<TextureId>>,
}
impl TexturePool {
    #[must_use]
    pub fn new(context: Arc<RenderContext>) -> Self {
        Self {
            context,
            textures: parking_lot::RwLock::default(),
            created: parking_lot::Mutex::default(),
        }
    }
    /// Decode an encoded bitmap (PNG) into a texture named `id`.
    /// If `id` already exists, the existing texture is returned and the bytes are not decoded.
    pub fn make_texture(&self, id: TextureId, encoded: &[u8]) -> Result<Arc<Texture>, EngineError> {
        if let Some(existing) = self.find_texture(&id) {
            return Ok(existing);
        }
        let image = image::load_from_memory(encoded)?.to_rgba8();
        self.make_texture_from_image(id, &image)
    }
    /// Upload an already decoded straight-alpha image.
    pub fn make_texture_from_image(
        &self,
        id: TextureId,
        image: &image::RgbaImage,
    ) -> Result<Arc<Texture>, EngineError> {
        self.get_or_create(id, [image.width(), image.height()], |texture| {
            texture.upload_rgba8(image);
        })
    }
    /// A transparent texture of the given size.
    pub fn make_empty_texture(
        &self,
        id: TextureId,
        size: [u32; 2],
    ) -> Result<Arc<Texture>, EngineError> {
        self.get_or_create(id, size, |_| ())
    }
    fn get_or_create(
        &self,
        id: TextureId,
        size: [u32; 2],
        init: impl FnOnce(&Texture),
    ) -> Result<Arc<Texture>, EngineError> {
        let mut textures = self.textures.write();
        if let Some(existing) = textures.get(&id) {
            return Ok(existing.clone());
        }
        let texture = Texture::new(self.context.clone(), id.clone(), size)?;
        init(&texture);
        let texture = Arc::new(texture);
        textures.insert(id.clone(), texture.clone());
        drop(textures);

        log::trace!("created {id} {size:?}");
        self.created.lock().push(id);
        Ok(texture)
    }
    #[must_use]
    pub fn find_texture(&self, id: &TextureId) -> Option<Arc<Texture>> {
        self.textures.read().get(id).cloned()
    }
    /// Drop the pool's ownership. Memory is reclaimed once borrowed handles are gone.
    pub fn release(&self, id: &TextureId) -> bool {
        self.textures.write().remove(id).is_some()
    }
    /// Ids created since the last call.
    pub fn take_created(&self) -> Vec<TextureId> {
        std::mem::take(&mut *self.created.lock())
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.textures.read().len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    #[must_use]
    pub fn resident_bytes(&self) -> u64 {
        self.context.resident_bytes()
    }
    pub fn log_residency(&self) {
        log::debug!(
            "texture pool: {} textures, {} of {} resident",
            self.len(),
            human_bytes::human_bytes(self.resident_bytes() as f64),
            human_bytes::human_bytes(self.context.budget() as f64),
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::ResourceError;

    fn pool() -> TexturePool {
        TexturePool::new(RenderContext::new(&EngineConfig::default()).unwrap())
    }
    fn encoded_png() -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }
    #[test]
    fn dedup_by_id() {
        let pool = pool();
        let id = TextureId::explicit("brush/splotch");
        let a = pool.make_texture(id.clone(), &encoded_png()).unwrap();
        // Not even decoded the second time.
        let b = pool.make_texture(id.clone(), b"garbage").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = pool.make_empty_texture(id.clone(), [8, 8]).unwrap();
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.take_created(), vec![id]);
        assert!(pool.take_created().is_empty());
    }
    #[test]
    fn decode_failure() {
        let pool = pool();
        let result = pool.make_texture(TextureId::explicit("bad"), b"not a png");
        assert!(matches!(result, Err(EngineError::Decode(_))));
        assert!(pool.is_empty());
    }
    #[test]
    fn allocation_failure() {
        let pool = pool();
        let result = pool.make_empty_texture(TextureId::explicit("empty"), [0, 16]);
        assert!(matches!(
            result,
            Err(EngineError::ResourceCreation(ResourceError::ZeroSize))
        ));
        assert!(pool.find_texture(&TextureId::explicit("empty")).is_none());
    }
    #[test]
    fn release_frees_memory() {
        let pool = pool();
        let id = TextureId::explicit("scratch");
        pool.make_empty_texture(id.clone(), [16, 16]).unwrap();
        assert!(pool.resident_bytes() > 0);
        assert!(pool.release(&id));
        assert_eq!(pool.resident_bytes(), 0);
        assert!(!pool.release(&id));
    }
}
