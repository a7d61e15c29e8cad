use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorrelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Singular linear system: {0}")]
    SingularSystem(String),

    #[error("Invalid raw volume: expected {expected} bytes, found {found}")]
    InvalidRaw { expected: usize, found: usize },

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, CorrelError>;
