mod bitcoind;
pub mod error;
mod r#trait;

pub use bitcoind::*;
pub use r#trait::*;
