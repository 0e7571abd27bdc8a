use tch::{nn, nn::ModuleT, Tensor};

use crate::device;
use crate::error::Result;

/// What the trainer needs from a model: a mode switch, a forward pass and its parameters.
pub trait SegmentationModel {
    /// `true` enables training-only behaviour (dropout, batch-norm statistic updates).
    fn set_training(&mut self, training: bool);

    /// Maps `[batch, channels, height, width]` images to `[batch, classes, height, width]` scores.
    fn forward(&self, images: &Tensor) -> Tensor;

    /// Every parameter and buffer of the model. The optimizer binds to it and checkpoints
    /// serialize it.
    fn var_store(&self) -> &nn::VarStore;
}

/// Wraps any `ModuleT` together with the store its variables live in.
#[derive(Debug)]
pub struct ModuleModel<M> {
    vs: nn::VarStore,
    module: M,
    training: bool,
}

impl<M: ModuleT> ModuleModel<M> {
    pub fn new(vs: nn::VarStore, module: M) -> Self {
        Self {
            vs,
            module,
            training: false,
        }
    }

    /// Builds the module inside a fresh store on `device`.
    pub fn build<F>(device: tch::Device, build: F) -> Self
    where
        F: FnOnce(&nn::Path) -> M,
    {
        let vs = nn::VarStore::new(device);
        let module = build(&vs.root());
        Self::new(vs, module)
    }

    /// Like [`ModuleModel::build`], but fails with a placement error instead of letting
    /// libtorch abort when `device` is not present.
    pub fn try_build<F>(device: tch::Device, build: F) -> Result<Self>
    where
        F: FnOnce(&nn::Path) -> M,
    {
        device::ensure_available(device)?;
        Ok(Self::build(device, build))
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }
}

impl<M: ModuleT> SegmentationModel for ModuleModel<M> {
    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn forward(&self, images: &Tensor) -> Tensor {
        self.module.forward_t(images, self.training)
    }

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}
