use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),

    #[error("torch error: {0}")]
    Tch(#[from] tch::TchError),

    #[error("unsupported dtype {0} for tensor {1}")]
    UnsupportedDtype(String, String),

    #[error("tensor {name} has shape {found:?} in file but {expected:?} in model")]
    ShapeMismatch {
        name: String,
        expected: Vec<i64>,
        found: Vec<i64>,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;
