use std::path::Path;

use log::info;

/// Progress of one phase after a batch has been processed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchProgress {
    /// 1-based epoch index.
    pub epoch: usize,
    pub epochs: usize,
    /// 1-based batch index within the pass.
    pub batch: usize,
    /// Batch-mean loss of this batch.
    pub loss: f64,
    /// Per-sample average over the batches seen so far in this pass.
    pub running_loss: f64,
}

/// Per-sample average losses of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub epochs: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    /// Whether this epoch set a new best validation loss (and was checkpointed).
    pub improved: bool,
}

/// Receives training events. Every hook defaults to doing nothing.
pub trait TrainingObserver {
    fn on_train_batch(&mut self, _progress: &BatchProgress) {}

    fn on_val_batch(&mut self, _progress: &BatchProgress) {}

    fn on_epoch_end(&mut self, _summary: &EpochSummary) {}

    fn on_checkpoint(&mut self, _epoch: usize, _path: &Path, _best_val_loss: f64) {}
}

impl<T: TrainingObserver + ?Sized> TrainingObserver for &mut T {
    fn on_train_batch(&mut self, progress: &BatchProgress) {
        (**self).on_train_batch(progress)
    }

    fn on_val_batch(&mut self, progress: &BatchProgress) {
        (**self).on_val_batch(progress)
    }

    fn on_epoch_end(&mut self, summary: &EpochSummary) {
        (**self).on_epoch_end(summary)
    }

    fn on_checkpoint(&mut self, epoch: usize, path: &Path, best_val_loss: f64) {
        (**self).on_checkpoint(epoch, path, best_val_loss)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl TrainingObserver for Silent {}

/// Reports through the `log` facade. Batch progress goes out every `log_every` batches,
/// training and validation each on their own line.
#[derive(Debug, Clone, Copy)]
pub struct LogObserver {
    log_every: usize,
}

impl LogObserver {
    pub fn new(log_every: usize) -> Self {
        Self {
            log_every: log_every.max(1),
        }
    }

    fn due(&self, batch: usize) -> bool {
        batch == 1 || batch % self.log_every == 0
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new(10)
    }
}

impl TrainingObserver for LogObserver {
    fn on_train_batch(&mut self, p: &BatchProgress) {
        if self.due(p.batch) {
            info!(
                "Epoch {}/{} - Training | Batch {} | Train Loss: {:.4} (running {:.4})",
                p.epoch, p.epochs, p.batch, p.loss, p.running_loss
            );
        }
    }

    fn on_val_batch(&mut self, p: &BatchProgress) {
        if self.due(p.batch) {
            info!(
                "Epoch {}/{} - Validation | Batch {} | Val Loss: {:.4} (running {:.4})",
                p.epoch, p.epochs, p.batch, p.loss, p.running_loss
            );
        }
    }

    fn on_epoch_end(&mut self, s: &EpochSummary) {
        info!(
            "Epoch {}/{} | Train Loss: {:.4} | Val Loss: {:.4}",
            s.epoch, s.epochs, s.train_loss, s.val_loss
        );
    }

    fn on_checkpoint(&mut self, _epoch: usize, path: &Path, best_val_loss: f64) {
        info!("Model saved at {:?} with Val Loss: {:.4}", path, best_val_loss);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_first_batch_and_every_nth() {
        let observer = LogObserver::new(5);
        let due: Vec<usize> = (1..=12).filter(|&b| observer.due(b)).collect();
        assert_eq!(due, vec![1, 5, 10]);
    }

    #[test]
    fn zero_interval_logs_every_batch() {
        let observer = LogObserver::new(0);
        assert!((1..=4).all(|b| observer.due(b)));
    }

    #[test]
    fn forwarding_through_mut_ref() {
        #[derive(Default)]
        struct Count(usize);
        impl TrainingObserver for Count {
            fn on_checkpoint(&mut self, _: usize, _: &Path, _: f64) {
                self.0 += 1;
            }
        }

        fn notify(mut observer: impl TrainingObserver) {
            observer.on_checkpoint(1, Path::new("best.ot"), 0.5);
            observer.on_train_batch(&BatchProgress {
                epoch: 1,
                epochs: 1,
                batch: 1,
                loss: 0.5,
                running_loss: 0.5,
            });
        }

        let mut count = Count::default();
        notify(&mut count);
        notify(&mut count);
        assert_eq!(count.0, 2);
    }
}
