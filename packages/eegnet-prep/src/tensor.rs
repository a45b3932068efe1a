//! Model-ready tensor layout.
//!
//! The classifier consumes `(batch, CHANS, SAMPLES, 1)`; the trailing axis
//! only satisfies the two-dimensional convolution input contract.

use ndarray::{Array2, Array4, ArrayView2};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Packed training tensors
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBatch {
    /// (batch, chans, samples, 1)
    pub x: Array4<f32>,
    /// One-hot (batch, num_classes)
    pub y: Array2<f32>,
    pub labels: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorPackager {
    chans: usize,
    samples: usize,
    num_classes: usize,
}

impl TensorPackager {
    pub fn new(chans: usize, samples: usize, num_classes: usize) -> Self {
        Self {
            chans,
            samples,
            num_classes,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.chans, config.samples, config.num_classes())
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn check_shape(&self, epoch: &ArrayView2<f64>) -> Result<()> {
        let (chans, samples) = epoch.dim();
        if chans != self.chans || samples != self.samples {
            return Err(PipelineError::Shape(format!(
                "Epoch is {} × {}, model expects {} × {}",
                chans, samples, self.chans, self.samples
            )));
        }
        Ok(())
    }

    /// Stack normalized epochs into (batch, chans, samples, 1).
    pub fn pack_x(&self, epochs: &[ArrayView2<f64>]) -> Result<Array4<f32>> {
        for epoch in epochs {
            self.check_shape(epoch)?;
        }
        Ok(Array4::from_shape_fn(
            (epochs.len(), self.chans, self.samples, 1),
            |(b, c, t, _)| epochs[b][[c, t]] as f32,
        ))
    }

    /// Single-epoch batch for inference.
    pub fn pack_one(&self, epoch: ArrayView2<f64>) -> Result<Array4<f32>> {
        self.pack_x(&[epoch])
    }

    pub fn one_hot(&self, labels: &[usize]) -> Result<Array2<f32>> {
        let mut y = Array2::<f32>::zeros((labels.len(), self.num_classes));
        for (row, &label) in labels.iter().enumerate() {
            if label >= self.num_classes {
                return Err(PipelineError::Shape(format!(
                    "Label {} is outside 0..{}",
                    label, self.num_classes
                )));
            }
            y[[row, label]] = 1.0;
        }
        Ok(y)
    }

    pub fn pack_training(&self, epochs: &[ArrayView2<f64>], labels: &[usize]) -> Result<TensorBatch> {
        if epochs.len() != labels.len() {
            return Err(PipelineError::Shape(format!(
                "{} epochs but {} labels",
                epochs.len(),
                labels.len()
            )));
        }
        Ok(TensorBatch {
            x: self.pack_x(epochs)?,
            y: self.one_hot(labels)?,
            labels: labels.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_and_values() {
        let packager = TensorPackager::new(2, 3, 4);
        let a = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = a.mapv(|v| -v);
        let batch = packager
            .pack_training(&[a.view(), b.view()], &[3, 0])
            .unwrap();
        assert_eq!(batch.x.shape(), &[2, 2, 3, 1]);
        assert_eq!(batch.x[[0, 1, 2, 0]], 6.0);
        assert_eq!(batch.x[[1, 0, 1, 0]], -2.0);
        assert_eq!(batch.y.row(0).to_vec(), vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(batch.y.row(1).to_vec(), vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_wrong_channel_count_is_shape_error() {
        let packager = TensorPackager::new(22, 1000, 4);
        let epoch = Array2::<f64>::zeros((20, 1000));
        assert!(matches!(
            packager.pack_one(epoch.view()),
            Err(PipelineError::Shape(_))
        ));
    }

    #[test]
    fn test_wrong_sample_count_is_shape_error() {
        let packager = TensorPackager::new(22, 1000, 4);
        let epoch = Array2::<f64>::zeros((22, 1251));
        assert!(packager.pack_one(epoch.view()).is_err());
    }

    #[test]
    fn test_single_epoch_batch() {
        let packager = TensorPackager::new(22, 1000, 4);
        let epoch = Array2::<f64>::ones((22, 1000));
        let x = packager.pack_one(epoch.view()).unwrap();
        assert_eq!(x.shape(), &[1, 22, 1000, 1]);
    }

    #[test]
    fn test_one_hot_rejects_out_of_range_label() {
        let packager = TensorPackager::new(1, 1, 2);
        assert!(packager.one_hot(&[2]).is_err());
    }
}
