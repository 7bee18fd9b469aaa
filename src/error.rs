use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid price series at tick {index}: {reason}")]
    InvalidSeries { index: usize, reason: String },

    #[error("invalid parameter spec: {0}")]
    InvalidSpec(String),
}

pub type Result<T> = std::result::Result<T, GridError>;

pub(crate) fn invalid(msg: impl Into<String>) -> GridError {
    GridError::InvalidParameter(msg.into())
}
