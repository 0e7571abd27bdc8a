use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use seg_core::{ModelConfig, SegNet};
use trainer::{
    device, BatchProvider, CrossEntropy2d, LogObserver, ModuleModel, TensorDataset, Trainer,
    TrainerConfig,
};

#[derive(Parser)]
#[command(author, version, about = "Train a segmentation network and keep the best checkpoint")]
struct Cli {
    /// Training set: safetensors file with `images` [N, C, H, W] and `labels` [N, H, W]
    #[arg(long)]
    train_data: PathBuf,

    /// Validation set, same layout as the training set
    #[arg(long)]
    val_data: PathBuf,

    #[arg(long, default_value = "configs/training_config.yaml")]
    config: PathBuf,

    #[arg(long, default_value = "configs/model_config.yaml")]
    model_config: PathBuf,
}

fn load_yaml_or_default<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    if !path.exists() {
        info!("{:?} not found, using defaults", path);
        return Ok(T::default());
    }
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let model_config: ModelConfig = load_yaml_or_default(&cli.model_config)?;
    let config: TrainerConfig = load_yaml_or_default(&cli.config)?;
    let device = device::resolve(&config.device)?;
    info!("Using device: {:?}", device);

    let train_set = TensorDataset::load(&cli.train_data, config.batch_size, config.shuffle)
        .with_context(|| format!("Failed to load training data {:?}", cli.train_data))?;
    let val_set = TensorDataset::load(&cli.val_data, config.batch_size, false)
        .with_context(|| format!("Failed to load validation data {:?}", cli.val_data))?;
    info!(
        "{} training samples in {} batches, {} validation samples in {} batches",
        train_set.len(),
        train_set.num_batches(),
        val_set.len(),
        val_set.num_batches()
    );

    let mut model = ModuleModel::try_build(device, |p| SegNet::new(p, &model_config))?;
    let checkpoint_path = PathBuf::from(&config.checkpoint_path);

    let config_path = checkpoint_path.with_extension("json");
    fs::write(&config_path, serde_json::to_string_pretty(&model_config)?)
        .with_context(|| format!("Failed to write model config {:?}", config_path))?;

    let loss_fn = CrossEntropy2d::new(config.ignore_index);
    let report = Trainer::new(&mut model, loss_fn, &config, device)?
        .with_observer(LogObserver::new(config.log_every))
        .run(&train_set, &val_set, config.epochs, &checkpoint_path)?;

    match report.best_epoch {
        Some(epoch) => info!(
            "Training complete! Best Val Loss {:.4} at epoch {}, saved at {:?}",
            report.best_val_loss, epoch, checkpoint_path
        ),
        None => info!("Training complete! No checkpoint written"),
    }

    Ok(())
}
