mod entity;
pub mod error;

pub use entity::*;
