#![warn(clippy::pedantic)]

pub mod brush_engine;
pub mod compositor;
pub mod config;
pub mod error;
pub mod pool;
pub mod printer;
pub mod raster;
pub mod render_device;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod texture;

pub use config::EngineConfig;
pub use error::EngineError;
pub use session::{CanvasSession, ElementSource};
