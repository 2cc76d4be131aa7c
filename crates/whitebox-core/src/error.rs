use thiserror::Error;

#[derive(Debug, Error)]
pub enum WhiteboxError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WhiteboxError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            WhiteboxError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, WhiteboxError>;
