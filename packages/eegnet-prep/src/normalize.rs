use ndarray::{s, Array2, ArrayView2};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Unit rescaling and "keep earliest" truncation.
///
/// This is the one implementation both pipeline paths call, so the scale
/// factor and the truncation policy cannot drift between training and
/// serving.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorNormalizer {
    scale: f64,
    samples: usize,
}

impl TensorNormalizer {
    pub fn new(scale: f64, samples: usize) -> Self {
        Self { scale, samples }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.unit_scale, config.samples)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// First `samples` columns. Identity on an epoch that is already that long.
    pub fn truncate(&self, epoch: ArrayView2<f64>) -> Result<Array2<f64>> {
        let actual = epoch.ncols();
        if actual < self.samples {
            return Err(PipelineError::InsufficientSamples {
                required: self.samples,
                actual,
            });
        }
        Ok(epoch.slice(s![.., ..self.samples]).to_owned())
    }

    /// Rescaled epoch of exactly `samples` columns. Only the kept samples are
    /// multiplied, which yields the same values as scaling the whole window.
    pub fn normalize(&self, epoch: ArrayView2<f64>) -> Result<Array2<f64>> {
        let mut truncated = self.truncate(epoch)?;
        truncated.mapv_inplace(|v| v * self.scale);
        Ok(truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch(samples: usize) -> Array2<f64> {
        Array2::from_shape_fn((3, samples), |(c, t)| (c as f64 + 1.0) * 1e-6 * (t as f64).cos())
    }

    #[test]
    fn test_keeps_earliest_samples() {
        let normalizer = TensorNormalizer::new(1.0, 1000);
        let raw = epoch(1251);
        let out = normalizer.truncate(raw.view()).unwrap();
        assert_eq!(out.dim(), (3, 1000));
        assert_eq!(out[[2, 999]], raw[[2, 999]]);
        assert_eq!(out[[0, 0]], raw[[0, 0]]);
    }

    #[test]
    fn test_truncation_is_idempotent() {
        let normalizer = TensorNormalizer::new(1e6, 1000);
        let once = normalizer.truncate(epoch(1251).view()).unwrap();
        let twice = normalizer.truncate(once.view()).unwrap();
        assert_eq!(once, twice);

        let sized = epoch(1000);
        assert_eq!(normalizer.truncate(sized.view()).unwrap(), sized);
    }

    #[test]
    fn test_scaling_is_linear() {
        let normalizer = TensorNormalizer::new(1e6, 1000);
        let raw = epoch(1251);
        let k = 2.0;
        let scaled_input = raw.mapv(|v| v * k);
        let lhs = normalizer.normalize(scaled_input.view()).unwrap();
        let rhs = normalizer.normalize(raw.view()).unwrap().mapv(|v| v * k);
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_volts_to_microvolts() {
        let normalizer = TensorNormalizer::new(1e6, 2);
        let raw = Array2::from_shape_vec((1, 3), vec![1e-6, -2.5e-6, 9.0]).unwrap();
        let out = normalizer.normalize(raw.view()).unwrap();
        assert!((out[[0, 0]] - 1.0).abs() < 1e-9);
        assert!((out[[0, 1]] + 2.5).abs() < 1e-9);
        assert_eq!(out.ncols(), 2);
    }

    #[test]
    fn test_short_epoch_is_rejected() {
        let normalizer = TensorNormalizer::new(1e6, 1000);
        match normalizer.normalize(epoch(999).view()) {
            Err(PipelineError::InsufficientSamples { required, actual }) => {
                assert_eq!((required, actual), (1000, 999));
            }
            other => panic!("expected InsufficientSamples, got {:?}", other),
        }
    }
}
