use std::path::Path;

use log::info;
use tch::{nn, nn::OptimizerConfig, Device, Tensor};

use crate::checkpoint;
use crate::dataset::BatchProvider;
use crate::device;
use crate::error::{Result, TrainError};
use crate::loss::{CrossEntropy2d, LossFn};
use crate::model::SegmentationModel;
use crate::observer::{BatchProgress, EpochSummary, LogObserver, TrainingObserver};
use crate::TrainerConfig;

/// Outcome of a run. The model itself keeps the parameters of the last epoch; only the
/// checkpoint on disk holds the best ones.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub epochs: Vec<EpochSummary>,
    pub best_val_loss: f64,
    pub best_epoch: Option<usize>,
}

impl Default for TrainingReport {
    fn default() -> Self {
        Self {
            epochs: Vec::new(),
            best_val_loss: f64::INFINITY,
            best_epoch: None,
        }
    }
}

impl TrainingReport {
    pub fn checkpointed_epochs(&self) -> Vec<usize> {
        self.epochs
            .iter()
            .filter(|s| s.improved)
            .map(|s| s.epoch)
            .collect()
    }
}

/// Only a strictly lower loss counts; ties and NaN never do.
fn improves(val_loss: f64, best_so_far: f64) -> bool {
    val_loss < best_so_far
}

/// Sum of `batch mean * batch size` over one pass.
#[derive(Debug, Default, Clone, Copy)]
struct LossAccumulator {
    sum: f64,
    samples: i64,
}

impl LossAccumulator {
    fn add(&mut self, batch_mean: f64, batch_size: i64) {
        self.sum += batch_mean * batch_size as f64;
        self.samples += batch_size;
    }

    fn running(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.sum / self.samples as f64
        }
    }

    /// Normalized by the dataset size, not the batch count.
    fn average(&self, dataset_len: usize) -> f64 {
        self.sum / dataset_len as f64
    }
}

/// Evaluation-mode, read-only view of a model. Gradient tracking is off from `enter`
/// until the scope is dropped, on every exit path.
pub struct EvalScope<'m, M> {
    model: &'m M,
    _no_grad: tch::NoGradGuard,
}

impl<'m, M: SegmentationModel> EvalScope<'m, M> {
    pub fn enter(model: &'m mut M) -> Self {
        model.set_training(false);
        Self {
            model,
            _no_grad: tch::no_grad_guard(),
        }
    }

    pub fn forward(&self, images: &Tensor) -> Tensor {
        self.model.forward(images)
    }
}

/// Drives optimization, evaluation and best-checkpoint selection over a borrowed model.
///
/// The AdamW optimizer is bound to the model's variables once, in `new`, and keeps its
/// moment estimates across every epoch of every `run` on this trainer.
pub struct Trainer<'a, M, L> {
    model: &'a mut M,
    loss_fn: L,
    optimizer: nn::Optimizer,
    device: Device,
    observer: Box<dyn TrainingObserver + 'a>,
}

impl<'a, M: SegmentationModel, L: LossFn> Trainer<'a, M, L> {
    pub fn new(
        model: &'a mut M,
        loss_fn: L,
        config: &TrainerConfig,
        device: Device,
    ) -> Result<Self> {
        device::ensure_available(device)?;

        let optimizer = nn::AdamW {
            wd: config.weight_decay,
            ..Default::default()
        }
        .build(model.var_store(), config.learning_rate)?;

        info!(
            "Training on {:?} with AdamW (lr {}, weight decay {})",
            device, config.learning_rate, config.weight_decay
        );

        Ok(Self {
            model,
            loss_fn,
            optimizer,
            device,
            observer: Box::new(LogObserver::new(config.log_every)),
        })
    }

    pub fn with_observer<O: TrainingObserver + 'a>(mut self, observer: O) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Runs `epochs` epochs. Whenever the validation loss strictly improves on the best so
    /// far, the model's variables are written to `output_path`, replacing the previous file.
    ///
    /// Zero epochs does nothing and writes nothing.
    pub fn run(
        &mut self,
        train: &dyn BatchProvider,
        val: &dyn BatchProvider,
        epochs: usize,
        output_path: &Path,
    ) -> Result<TrainingReport> {
        let mut report = TrainingReport::default();
        let mut best_so_far = f64::INFINITY;

        for epoch in 1..=epochs {
            let train_loss = self.train_epoch(epoch, epochs, train)?;
            let val_loss = self.evaluate(epoch, epochs, val)?;

            let summary = EpochSummary {
                epoch,
                epochs,
                train_loss,
                val_loss,
                improved: improves(val_loss, best_so_far),
            };
            self.observer.on_epoch_end(&summary);

            best_so_far = self.checkpoint_if_improved(&summary, best_so_far, output_path)?;
            if summary.improved {
                report.best_epoch = Some(epoch);
            }
            report.epochs.push(summary);
        }

        report.best_val_loss = best_so_far;
        Ok(report)
    }

    /// Returns the best validation loss after this epoch.
    fn checkpoint_if_improved(
        &mut self,
        summary: &EpochSummary,
        best_so_far: f64,
        output_path: &Path,
    ) -> Result<f64> {
        if !summary.improved {
            return Ok(best_so_far);
        }

        checkpoint::save(self.model.var_store(), output_path)?;
        self.observer
            .on_checkpoint(summary.epoch, output_path, summary.val_loss);
        Ok(summary.val_loss)
    }

    /// One optimization pass over `provider`. Returns the per-sample average loss.
    pub fn train_epoch(
        &mut self,
        epoch: usize,
        epochs: usize,
        provider: &dyn BatchProvider,
    ) -> Result<f64> {
        if provider.is_empty() {
            return Err(TrainError::EmptyDataset("training"));
        }

        self.model.set_training(true);
        let mut acc = LossAccumulator::default();

        for (index, batch) in provider.batches().enumerate() {
            let samples = batch.sample_count()?;
            let batch = batch.to_device(self.device);

            self.optimizer.zero_grad();
            let predictions = self.model.forward(&batch.images);
            let loss = self.loss_fn.loss(&predictions, &batch.labels)?;
            loss.f_backward()?;
            self.optimizer.step();

            let value = loss.f_double_value(&[])?;
            acc.add(value, samples);
            self.observer.on_train_batch(&BatchProgress {
                epoch,
                epochs,
                batch: index + 1,
                loss: value,
                running_loss: acc.running(),
            });
        }

        Ok(acc.average(provider.len()))
    }

    /// One pass over `provider` in evaluation mode without gradient tracking. Parameters are
    /// not touched. Returns the per-sample average loss.
    pub fn evaluate(
        &mut self,
        epoch: usize,
        epochs: usize,
        provider: &dyn BatchProvider,
    ) -> Result<f64> {
        if provider.is_empty() {
            return Err(TrainError::EmptyDataset("validation"));
        }

        let scope = EvalScope::enter(&mut *self.model);
        let mut acc = LossAccumulator::default();

        for (index, batch) in provider.batches().enumerate() {
            let samples = batch.sample_count()?;
            let batch = batch.to_device(self.device);

            let predictions = scope.forward(&batch.images);
            let loss = self.loss_fn.loss(&predictions, &batch.labels)?;

            let value = loss.f_double_value(&[])?;
            acc.add(value, samples);
            self.observer.on_val_batch(&BatchProgress {
                epoch,
                epochs,
                batch: index + 1,
                loss: value,
                running_loss: acc.running(),
            });
        }

        Ok(acc.average(provider.len()))
    }
}

/// Trains `model` for `epochs` epochs on `device` with AdamW and per-pixel cross-entropy,
/// keeping the best-by-validation-loss snapshot at `output_path`.
pub fn run<M: SegmentationModel>(
    model: &mut M,
    train: &dyn BatchProvider,
    val: &dyn BatchProvider,
    epochs: usize,
    device: Device,
    output_path: &Path,
    config: &TrainerConfig,
) -> Result<TrainingReport> {
    let loss_fn = CrossEntropy2d::new(config.ignore_index);
    Trainer::new(model, loss_fn, config, device)?.run(train, val, epochs, output_path)
}
