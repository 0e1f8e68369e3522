mod entity;
pub mod error;
mod selection;

pub use entity::*;
pub use selection::*;
