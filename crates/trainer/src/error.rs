use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("batch shape mismatch: {inputs} input samples but {labels} label samples")]
    ShapeMismatch { inputs: i64, labels: i64 },

    #[error("loss cannot be computed: {0}")]
    LossDomain(String),

    #[error("compute target {0} is not available")]
    DeviceUnavailable(String),

    #[error("{0} dataset is empty")]
    EmptyDataset(&'static str),

    #[error("failed to write checkpoint {path:?}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("snapshot has variables the model does not: {0:?}")]
    UnknownVariables(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("torch error: {0}")]
    Tch(#[from] tch::TchError),

    #[error(transparent)]
    Core(#[from] seg_core::CoreError),

    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("dataset error: {0}")]
    Dataset(String),
}

pub type Result<T> = std::result::Result<T, TrainError>;
