use crate::types::ImportId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Import {0} not found")]
    NotFound(ImportId),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
