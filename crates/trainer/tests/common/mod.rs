#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tch::{nn, nn::ModuleT, Device, Kind, Tensor};
use trainer::observer::{BatchProgress, EpochSummary, TrainingObserver};
use trainer::{Batch, BatchProvider, LossFn, ModuleModel, Result, TrainError};

pub const CPU: Device = Device::Cpu;

/// Multiplies its input by a single learnable scalar.
#[derive(Debug)]
pub struct Scale {
    pub w: Tensor,
}

impl ModuleT for Scale {
    fn forward_t(&self, xs: &Tensor, _train: bool) -> Tensor {
        xs * &self.w
    }
}

pub fn scale_model() -> ModuleModel<Scale> {
    ModuleModel::build(CPU, |p| Scale {
        w: p.var("w", &[1], nn::Init::Const(1.0)),
    })
}

/// Returns pre-recorded loss values in call order, still differentiable w.r.t. the model.
pub struct ScriptedLoss {
    values: RefCell<VecDeque<f64>>,
}

impl ScriptedLoss {
    pub fn new(values: &[f64]) -> Self {
        Self {
            values: RefCell::new(values.iter().copied().collect()),
        }
    }
}

impl LossFn for ScriptedLoss {
    fn loss(&self, predictions: &Tensor, _labels: &Tensor) -> Result<Tensor> {
        let value = self
            .values
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| TrainError::LossDomain("script exhausted".to_string()))?;
        Ok(predictions.sum(Kind::Float) * 0.0 + value)
    }
}

/// Tags of the providers in the order their passes started.
pub type PassLog = Rc<RefCell<Vec<&'static str>>>;

/// Fixed list of batches that records each pass it starts into a shared log.
pub struct RecordingProvider {
    tag: &'static str,
    batches: Vec<(Tensor, Tensor)>,
    len: usize,
    log: PassLog,
}

impl RecordingProvider {
    pub fn new(tag: &'static str, batches: Vec<(Tensor, Tensor)>, log: PassLog) -> Self {
        let len = batches.iter().map(|(images, _)| images.size()[0] as usize).sum();
        Self {
            tag,
            batches,
            len,
            log,
        }
    }

    /// `batch_sizes.len()` batches of `[n, 1, 2, 2]` ones with zero labels.
    pub fn uniform(tag: &'static str, batch_sizes: &[i64], log: PassLog) -> Self {
        let batches = batch_sizes
            .iter()
            .map(|&n| {
                (
                    Tensor::ones(&[n, 1, 2, 2], (Kind::Float, CPU)),
                    Tensor::zeros(&[n, 2, 2], (Kind::Int64, CPU)),
                )
            })
            .collect();
        Self::new(tag, batches, log)
    }
}

impl BatchProvider for RecordingProvider {
    fn len(&self) -> usize {
        self.len
    }

    fn batches(&self) -> Box<dyn Iterator<Item = Batch> + '_> {
        self.log.borrow_mut().push(self.tag);
        Box::new(
            self.batches
                .iter()
                .map(|(images, labels)| Batch::new(images.shallow_clone(), labels.shallow_clone())),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    TrainBatch(usize, usize),
    ValBatch(usize, usize),
    EpochEnd(EpochSummary),
    Checkpoint(usize, PathBuf, f64),
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<Event>,
}

impl Recorder {
    pub fn checkpoints(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Checkpoint(epoch, _, _) => Some(*epoch),
                _ => None,
            })
            .collect()
    }
}

impl TrainingObserver for Recorder {
    fn on_train_batch(&mut self, p: &BatchProgress) {
        self.events.push(Event::TrainBatch(p.epoch, p.batch));
    }

    fn on_val_batch(&mut self, p: &BatchProgress) {
        self.events.push(Event::ValBatch(p.epoch, p.batch));
    }

    fn on_epoch_end(&mut self, summary: &EpochSummary) {
        self.events.push(Event::EpochEnd(*summary));
    }

    fn on_checkpoint(&mut self, epoch: usize, path: &Path, best_val_loss: f64) {
        self.events
            .push(Event::Checkpoint(epoch, path.to_path_buf(), best_val_loss));
    }
}

/// Deep copy of every variable, keyed by name.
pub fn snapshot(vs: &nn::VarStore) -> Vec<(String, Tensor)> {
    let mut vars: Vec<(String, Tensor)> = vs
        .variables()
        .into_iter()
        .map(|(name, t)| (name, t.detach().copy()))
        .collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    vars
}

pub fn same_values(a: &[(String, Tensor)], b: &[(String, Tensor)]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|((na, ta), (nb, tb))| na == nb && ta.equal(tb))
}

pub fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-5
}
