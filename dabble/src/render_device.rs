//! The render device. Textures live in host memory and are rasterized on the CPU, the device only
//! enforces the limits a GPU would: a maximum dimension and a memory budget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{EngineError, ResourceError};

/// Bytes per texel, premultiplied RGBA32F.
pub const TEXEL_BYTES: u64 = 16;

pub struct RenderContext {
    max_dimension: u32,
    budget: u64,
    resident: AtomicU64,
}
impl RenderContext {
    /// Open the device, or fail with [`EngineError::DeviceUnavailable`] when configured headless.
    pub fn new(config: &crate::config::EngineConfig) -> Result<Arc<Self>, EngineError> {
        if config.is_headless() {
            log::warn!("Running headless, rendering is disabled.");
            return Err(EngineError::DeviceUnavailable);
        }
        log::info!(
            "Render device up: max dimension {}, budget {}",
            config.max_texture_dimension,
            human_bytes::human_bytes(config.memory_budget as f64)
        );
        Ok(Arc::new(Self {
            max_dimension: config.max_texture_dimension,
            budget: config.memory_budget,
            resident: AtomicU64::new(0),
        }))
    }
    #[must_use]
    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }
    #[must_use]
    pub fn resident_bytes(&self) -> u64 {
        self.resident.load(Ordering::Relaxed)
    }
    #[must_use]
    pub fn budget(&self) -> u64 {
        self.budget
    }
    /// Reserve memory for a `size` texture. Returns the reserved byte count, to be handed back to
    /// [`Self::free`].
    pub fn allocate(&self, [width, height]: [u32; 2]) -> Result<u64, ResourceError> {
        if width == 0 || height == 0 {
            return Err(ResourceError::ZeroSize);
        }
        if width > self.max_dimension || height > self.max_dimension {
            return Err(ResourceError::TooLarge {
                width,
                height,
                max: self.max_dimension,
            });
        }
        let requested = u64::from(width) * u64::from(height) * TEXEL_BYTES;
        let budget = self.budget;
        self.resident
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |resident| {
                resident
                    .checked_add(requested)
                    .filter(|total| *total <= budget)
            })
            .map_err(|_| ResourceError::OutOfMemory { requested })?;
        Ok(requested)
    }
    pub fn free(&self, bytes: u64) {
        let _ = self
            .resident
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |resident| {
                Some(resident.saturating_sub(bytes))
            });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::EngineConfig;
    #[test]
    fn limits() {
        let context = RenderContext::new(&EngineConfig {
            max_texture_dimension: 64,
            memory_budget: 64 * 64 * TEXEL_BYTES,
            ..EngineConfig::default()
        })
        .unwrap();
        assert_eq!(context.allocate([0, 4]), Err(ResourceError::ZeroSize));
        assert!(matches!(
            context.allocate([65, 1]),
            Err(ResourceError::TooLarge { .. })
        ));
        let bytes = context.allocate([64, 64]).unwrap();
        assert!(matches!(
            context.allocate([1, 1]),
            Err(ResourceError::OutOfMemory { .. })
        ));
        context.free(bytes);
        assert_eq!(context.resident_bytes(), 0);
        assert!(context.allocate([1, 1]).is_ok());
    }
    #[test]
    fn headless_is_unavailable() {
        let result = RenderContext::new(&EngineConfig {
            headless: true,
            ..EngineConfig::default()
        });
        assert!(matches!(result, Err(EngineError::DeviceUnavailable)));
    }
}
