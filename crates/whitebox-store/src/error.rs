use thiserror::Error;

/// Errors raised by the persistence layer.
///
/// The store never retries and never translates errors into user-facing
/// messages; callers map `code()` onto their own surface.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced row (usually the owning model) does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The payload does not fit the target table.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Constraint violation, I/O failure, lock timeout and friends.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }

    /// Short error code string; not-found maps to a 404, validation to a 4xx
    /// and everything else to a 5xx at the API edge.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "NOT_FOUND",
            StoreError::Validation(_) => "VALIDATION_FAILED",
            StoreError::Database(_) | StoreError::Serialization(_) => "STORE_FAILURE",
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
