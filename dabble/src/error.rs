//! Engine failures. Everything here is recovered locally: the failing draw is skipped and logged,
//! the rest of the frame carries on.

use dabble_core::id::TextureId;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    #[error("texture has zero area")]
    ZeroSize,
    #[error("{width}x{height} exceeds the maximum dimension {max}")]
    TooLarge { width: u32, height: u32, max: u32 },
    #[error("allocating {requested} bytes would exceed the memory budget")]
    OutOfMemory { requested: u64 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::AsRefStr)]
pub enum LookupKind {
    Texture,
    Brush,
    Layer,
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("failed to create resource: {0}")]
    ResourceCreation(#[from] ResourceError),
    #[error("failed to decode bitmap: {0}")]
    Decode(#[from] image::ImageError),
    #[error("{} {id} not found", kind.as_ref())]
    LookupMiss { kind: LookupKind, id: String },
    #[error("chartlet cannot sample {0}, the texture it is drawn onto")]
    SelfSample(String),
    #[error("no render device available")]
    DeviceUnavailable,
    #[error("invalid document: {0}")]
    InvalidDocument(#[from] dabble_core::persist::PersistError),
}
impl EngineError {
    #[must_use]
    pub fn texture_miss(id: &TextureId) -> Self {
        Self::LookupMiss {
            kind: LookupKind::Texture,
            id: id.to_string(),
        }
    }
    #[must_use]
    pub fn brush_miss(name: &str) -> Self {
        Self::LookupMiss {
            kind: LookupKind::Brush,
            id: name.to_owned(),
        }
    }
}
