use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid selection token: {token:?}")]
    InvalidSelection { token: String },

    #[error("invalid range {start}-{end}: start must not exceed end")]
    InvalidRange { start: usize, end: usize },

    #[error("selection index {index} out of range (1-{max})")]
    OutOfRange { index: usize, max: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
