pub mod config;
pub mod error;

pub use config::WhiteboxConfig;
pub use error::{Result, WhiteboxError};
