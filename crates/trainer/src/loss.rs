use tch::{Kind, Reduction, Tensor};

use crate::error::{Result, TrainError};

/// Label value excluded from the loss (Cityscapes void class).
pub const VOID_LABEL: i64 = 255;

/// Maps predictions and labels to a scalar, differentiable batch-mean loss.
pub trait LossFn {
    fn loss(&self, predictions: &Tensor, labels: &Tensor) -> Result<Tensor>;
}

/// Per-pixel cross-entropy over `[batch, classes, height, width]` scores and
/// `[batch, height, width]` class ids, averaged over non-ignored pixels.
#[derive(Debug, Clone, Copy)]
pub struct CrossEntropy2d {
    pub ignore_index: i64,
}

impl Default for CrossEntropy2d {
    fn default() -> Self {
        Self {
            ignore_index: VOID_LABEL,
        }
    }
}

impl CrossEntropy2d {
    pub fn new(ignore_index: i64) -> Self {
        Self { ignore_index }
    }

    fn check_shapes(predictions: &Tensor, labels: &Tensor) -> Result<()> {
        let pred = predictions.size();
        let target = labels.size();

        if pred.len() != 4 || target.len() != 3 {
            return Err(TrainError::LossDomain(format!(
                "expected [N, C, H, W] scores and [N, H, W] labels, got {:?} and {:?}",
                pred, target
            )));
        }
        if pred[0] != target[0] || pred[2..] != target[1..] {
            return Err(TrainError::LossDomain(format!(
                "scores {:?} do not cover labels {:?}",
                pred, target
            )));
        }
        Ok(())
    }
}

impl LossFn for CrossEntropy2d {
    fn loss(&self, predictions: &Tensor, labels: &Tensor) -> Result<Tensor> {
        Self::check_shapes(predictions, labels)?;

        predictions
            .f_cross_entropy_loss::<Tensor>(
                &labels.to_kind(Kind::Int64),
                None,
                Reduction::Mean,
                self.ignore_index,
                0.0,
            )
            .map_err(|e| TrainError::LossDomain(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    const OPTS: (Kind, Device) = (Kind::Float, Device::Cpu);

    #[test]
    fn uniform_scores_give_log_class_count() {
        let scores = Tensor::zeros(&[2, 4, 3, 3], OPTS);
        let labels = Tensor::ones(&[2, 3, 3], (Kind::Int64, Device::Cpu));

        let loss = CrossEntropy2d::default().loss(&scores, &labels).unwrap();
        assert!((loss.double_value(&[]) - 4f64.ln()).abs() < 1e-6);
    }

    #[test]
    fn void_pixels_do_not_count() {
        // Pixel 0 is predicted perfectly, pixel 1 badly but marked void.
        let scores = Tensor::from_slice(&[10.0f32, -10.0, -10.0, 10.0]).view([1, 2, 1, 2]);
        let labels = Tensor::from_slice(&[0i64, VOID_LABEL]).view([1, 1, 2]);

        let loss = CrossEntropy2d::default().loss(&scores, &labels).unwrap();
        assert!(loss.double_value(&[]) < 1e-6);
    }

    #[test]
    fn spatial_mismatch_is_a_domain_error() {
        let scores = Tensor::zeros(&[1, 3, 4, 4], OPTS);
        let labels = Tensor::zeros(&[1, 4, 5], (Kind::Int64, Device::Cpu));

        let err = CrossEntropy2d::default().loss(&scores, &labels).unwrap_err();
        assert!(matches!(err, TrainError::LossDomain(_)));
    }

    #[test]
    fn missing_class_axis_is_a_domain_error() {
        let scores = Tensor::zeros(&[1, 4, 4], OPTS);
        let labels = Tensor::zeros(&[1, 4, 4], (Kind::Int64, Device::Cpu));

        let err = CrossEntropy2d::default().loss(&scores, &labels).unwrap_err();
        assert!(matches!(err, TrainError::LossDomain(_)));
    }

    #[test]
    fn out_of_range_class_is_a_domain_error() {
        let scores = Tensor::zeros(&[1, 2, 1, 1], OPTS);
        let labels = Tensor::from_slice(&[7i64]).view([1, 1, 1]);

        let err = CrossEntropy2d::default().loss(&scores, &labels).unwrap_err();
        assert!(matches!(err, TrainError::LossDomain(_)));
    }
}
