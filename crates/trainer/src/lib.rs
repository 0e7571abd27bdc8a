pub mod checkpoint;
pub mod dataset;
pub mod device;
pub mod error;
pub mod loss;
pub mod model;
pub mod observer;
pub mod train;

pub use dataset::{Batch, BatchProvider, TensorDataset};
pub use error::{Result, TrainError};
pub use loss::{CrossEntropy2d, LossFn};
pub use model::{ModuleModel, SegmentationModel};
pub use observer::{EpochSummary, LogObserver, TrainingObserver};
pub use train::{run, Trainer, TrainingReport};

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub batch_size: usize,
    pub epochs: usize,
    /// Batch progress is reported every `log_every` batches.
    pub log_every: usize,
    pub checkpoint_path: String,
    pub ignore_index: i64,
    /// Reshuffle the training set on every pass. Validation order is always fixed.
    pub shuffle: bool,
    /// `auto`, `cpu`, `cuda`, `cuda:N` or `mps`.
    pub device: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            weight_decay: 0.01,
            batch_size: 4,
            epochs: 1,
            log_every: 10,
            checkpoint_path: "model.safetensors".to_string(),
            ignore_index: loss::VOID_LABEL,
            shuffle: true,
            device: "auto".to_string(),
        }
    }
}

impl TrainerConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}
