pub mod document;
pub mod layers;

pub use document::{Document, Generation};
pub use layers::{Layer, LayerID, LayerStore};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetError {
    #[error("ID not found")]
    TargetNotFound,
    #[error("index {index} out of range for {len} layers")]
    OutOfRange { index: usize, len: usize },
    #[error("ID already present")]
    AlreadyPresent,
}
