pub mod blend;
pub mod brush;
pub mod color;
pub mod commands;
pub mod element;
pub mod id;
pub mod persist;
pub mod queue;
pub mod state;
pub mod stroke;
pub mod util;

pub use id::DabbleID;
