pub mod config;
pub mod error;
pub mod safetensors_util;
pub mod segnet;

pub use config::ModelConfig;
pub use error::CoreError;
pub use segnet::SegNet;
