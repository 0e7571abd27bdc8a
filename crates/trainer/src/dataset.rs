use std::path::Path;

use rand::seq::SliceRandom;
use rand::thread_rng;
use tch::{Device, Kind, Tensor};

use crate::error::{Result, TrainError};

/// One step worth of samples. Both tensors share their leading (sample) dimension.
#[derive(Debug)]
pub struct Batch {
    /// `[batch, channels, height, width]`
    pub images: Tensor,
    /// `[batch, height, width]` class ids
    pub labels: Tensor,
}

impl Batch {
    pub fn new(images: Tensor, labels: Tensor) -> Self {
        Self { images, labels }
    }

    /// Sample count shared by images and labels.
    pub fn sample_count(&self) -> Result<i64> {
        let inputs = self.images.size().first().copied().unwrap_or(0);
        let labels = self.labels.size().first().copied().unwrap_or(0);
        if inputs != labels {
            return Err(TrainError::ShapeMismatch { inputs, labels });
        }
        Ok(inputs)
    }

    pub fn to_device(&self, device: Device) -> Batch {
        Batch {
            images: self.images.to_device(device),
            labels: self.labels.to_device(device),
        }
    }
}

/// A finite, restartable, ordered source of batches. Every call to `batches` is a fresh pass.
pub trait BatchProvider {
    /// Total number of samples in one pass; the denominator for per-sample averages.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn batches(&self) -> Box<dyn Iterator<Item = Batch> + '_>;
}

/// Whole dataset held as two tensors, cut into fixed-size batches (the last one may be short).
#[derive(Debug)]
pub struct TensorDataset {
    images: Tensor,
    labels: Tensor,
    batch_size: usize,
    shuffle: bool,
}

impl TensorDataset {
    pub fn new(images: Tensor, labels: Tensor, batch_size: usize, shuffle: bool) -> Result<Self> {
        if batch_size == 0 {
            return Err(TrainError::Dataset("batch size must be positive".to_string()));
        }
        Batch::new(images.shallow_clone(), labels.shallow_clone()).sample_count()?;

        Ok(Self {
            images,
            labels,
            batch_size,
            shuffle,
        })
    }

    /// Loads `images` and `labels` entries from a safetensors file.
    ///
    /// `uint8` images are scaled to `[0, 1]`; labels are widened to `int64`.
    pub fn load<P: AsRef<Path>>(path: P, batch_size: usize, shuffle: bool) -> Result<Self> {
        let path = path.as_ref();
        let mut tensors = seg_core::safetensors_util::read_tensors(path, Device::Cpu)?;

        let missing =
            |name: &str| TrainError::Dataset(format!("{:?} has no `{}` tensor", path, name));
        let images = tensors.remove("images").ok_or_else(|| missing("images"))?;
        let labels = tensors.remove("labels").ok_or_else(|| missing("labels"))?;

        let images = match images.kind() {
            Kind::Uint8 => images.to_kind(Kind::Float) / 255.0,
            _ => images.to_kind(Kind::Float),
        };
        let labels = labels.to_kind(Kind::Int64);

        Self::new(images, labels, batch_size, shuffle)
    }

    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    fn ordered(&self, start: usize, len: usize) -> Batch {
        Batch::new(
            self.images.narrow(0, start as i64, len as i64),
            self.labels.narrow(0, start as i64, len as i64),
        )
    }

    fn gathered(&self, indices: &[i64]) -> Batch {
        let index = Tensor::from_slice(indices).to_device(self.images.device());
        Batch::new(
            self.images.index_select(0, &index),
            self.labels.index_select(0, &index.to_device(self.labels.device())),
        )
    }
}

impl BatchProvider for TensorDataset {
    fn len(&self) -> usize {
        self.images.size().first().copied().unwrap_or(0) as usize
    }

    fn batches(&self) -> Box<dyn Iterator<Item = Batch> + '_> {
        let total = self.len();
        let step = self.batch_size;

        if self.shuffle {
            let mut order: Vec<i64> = (0..total as i64).collect();
            order.shuffle(&mut thread_rng());
            let batches: Vec<Vec<i64>> = order.chunks(step).map(<[i64]>::to_vec).collect();
            Box::new(batches.into_iter().map(move |indices| self.gathered(&indices)))
        } else {
            Box::new((0..total).step_by(step).map(move |start| {
                let len = step.min(total - start);
                self.ordered(start, len)
            }))
        }
    }
}
