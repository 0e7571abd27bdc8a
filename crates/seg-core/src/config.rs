use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Channels of the input images (3 for RGB).
    pub in_channels: i64,
    /// Number of output classes, one score map per class.
    pub num_classes: i64,
    /// Channels of the first encoder stage; doubled at every downsampling.
    pub base_channels: i64,
    /// Number of downsampling stages. Input height and width must be divisible by `2^depth`.
    pub depth: i64,
    /// Dropout probability applied at the bottleneck (training mode only).
    pub dropout: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            num_classes: 19, // Cityscapes train ids
            base_channels: 16,
            depth: 2,
            dropout: 0.1,
        }
    }
}

impl ModelConfig {
    pub fn stage_channels(&self, stage: i64) -> i64 {
        self.base_channels << stage
    }
}
