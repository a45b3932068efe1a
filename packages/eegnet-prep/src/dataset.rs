use chrono::{DateTime, Utc};
use ndarray::{s, Array2, Array4};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::tensor::TensorBatch;

/// Training tensors plus the configuration that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub pipeline: PipelineConfig,
    pub pipeline_fingerprint: String,
    /// Analysis channels in tensor row order
    pub channels: Vec<String>,
    /// (batch, chans, samples, 1), model units
    pub x: Array4<f32>,
    /// One-hot (batch, num_classes)
    pub y: Array2<f32>,
    pub labels: Vec<usize>,
    /// Event onset sample of each epoch in the source recording
    pub onsets: Vec<usize>,
}

impl Dataset {
    pub fn new(
        pipeline: PipelineConfig,
        channels: Vec<String>,
        batch: TensorBatch,
        onsets: Vec<usize>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            pipeline_fingerprint: pipeline.fingerprint(),
            pipeline,
            channels,
            x: batch.x,
            y: batch.y,
            labels: batch.labels,
            onsets,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Epoch `index` as a batch of one
    pub fn sample(&self, index: usize) -> Result<Array4<f32>> {
        if index >= self.len() {
            return Err(PipelineError::Shape(format!(
                "Epoch index {} out of range (dataset has {})",
                index,
                self.len()
            )));
        }
        Ok(self.x.slice(s![index..index + 1, .., .., ..]).to_owned())
    }

    /// Per-class epoch counts, indexed by class
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.y.ncols()];
        for &label in &self.labels {
            if let Some(c) = counts.get_mut(label) {
                *c += 1;
            }
        }
        counts
    }

    /// Persist as MessagePack.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(self)
            .map_err(|e| PipelineError::Serialization(e.to_string()))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        let dataset: Dataset = rmp_serde::from_slice(&bytes)
            .map_err(|e| PipelineError::Parse(format!("{}: {}", path.display(), e)))?;
        dataset.check_consistency()?;
        Ok(dataset)
    }

    /// Shapes agree with each other and the stored fingerprint with the stored config.
    pub fn check_consistency(&self) -> Result<()> {
        let actual = self.pipeline.fingerprint();
        if actual != self.pipeline_fingerprint {
            return Err(PipelineError::ConfigParity {
                expected: self.pipeline_fingerprint.clone(),
                actual,
            });
        }
        let shape = self.x.shape();
        if shape[0] != self.len()
            || self.y.nrows() != self.len()
            || self.onsets.len() != self.len()
            || shape[1] != self.pipeline.chans
            || shape[2] != self.pipeline.samples
            || shape[3] != 1
            || self.y.ncols() != self.pipeline.num_classes()
        {
            return Err(PipelineError::Shape(format!(
                "Dataset tensors X {:?}, y {:?} do not match {} labels for {} × {} × {} classes",
                shape,
                self.y.shape(),
                self.len(),
                self.pipeline.chans,
                self.pipeline.samples,
                self.pipeline.num_classes()
            )));
        }
        Ok(())
    }

    /// Fails unless this dataset was built with `config`.
    pub fn verify_parity(&self, config: &PipelineConfig) -> Result<()> {
        let actual = config.fingerprint();
        if actual != self.pipeline_fingerprint {
            return Err(PipelineError::ConfigParity {
                expected: self.pipeline_fingerprint.clone(),
                actual,
            });
        }
        Ok(())
    }
}
