//! Classifier seam and the persisted model artifact.
//!
//! The network itself is trained outside this crate. What the serving
//! process loads is a [`ModelArtifact`]: the pipeline configuration it was
//! trained with, the EEGNet hyper-parameters, and a linear soft-max read-out
//! that implements [`Classifier`].

use chrono::{DateTime, Utc};
use ndarray::{s, Array1, Array2, Array4, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};

/// Maps a (batch, CHANS, SAMPLES, 1) tensor to (batch, NB_CLASSES) probabilities.
pub trait Classifier: Send + Sync {
    fn predict(&self, batch: &Array4<f32>) -> Result<Array2<f32>>;

    fn num_classes(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_index: usize,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Arg-max of one probability row. Ties resolve to the lowest index.
    pub fn from_probabilities(probabilities: Vec<f32>) -> Result<Self> {
        let (predicted_index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((i, p)),
            })
            .ok_or_else(|| PipelineError::Inference("Classifier returned no classes".into()))?;

        if !confidence.is_finite() {
            return Err(PipelineError::Inference(format!(
                "Classifier returned a non-finite probability: {}",
                confidence
            )));
        }

        Ok(Self {
            predicted_index,
            confidence,
            probabilities,
        })
    }
}

/// Dropout layer type. A closed set: anything else fails to deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DropoutKind {
    #[default]
    Dropout,
    SpatialDropout2D,
}

/// EEGNet hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureParams {
    /// Temporal filters
    pub f1: usize,
    /// Depth multiplier of the spatial convolution
    pub d: usize,
    /// Pointwise filters
    pub f2: usize,
    /// Temporal kernel length, half the sample rate
    pub kern_length: usize,
    pub dropout_rate: f64,
    /// Max-norm constraint on the dense layer
    pub norm_rate: f64,
    pub dropout: DropoutKind,
}

impl Default for ArchitectureParams {
    fn default() -> Self {
        Self {
            f1: 8,
            d: 2,
            f2: 16,
            kern_length: 125,
            dropout_rate: 0.5,
            norm_rate: 0.25,
            dropout: DropoutKind::Dropout,
        }
    }
}

impl ArchitectureParams {
    pub fn validate(&self, config: &PipelineConfig) -> Result<()> {
        if self.f1 == 0 || self.d == 0 || self.f2 == 0 || self.kern_length == 0 {
            return Err(PipelineError::InvalidConfig(
                "f1, d, f2 and kern_length must be non-zero".into(),
            ));
        }
        if self.kern_length > config.samples {
            return Err(PipelineError::InvalidConfig(format!(
                "kern_length {} exceeds the {} samples per epoch",
                self.kern_length, config.samples
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(PipelineError::InvalidConfig(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        if !(self.norm_rate.is_finite() && self.norm_rate > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "norm_rate must be positive, got {}",
                self.norm_rate
            )));
        }
        Ok(())
    }
}

/// Soft-max over `weights · vec(x) + bias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearReadout {
    /// (NB_CLASSES, CHANS · SAMPLES), row-major over (channel, sample)
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

/// Bias given to classes absent from the fitting data
const ABSENT_CLASS_BIAS: f32 = -1.0e30;

impl LinearReadout {
    pub fn zeros(num_classes: usize, features: usize) -> Self {
        Self {
            weights: Array2::zeros((num_classes, features)),
            bias: Array1::zeros(num_classes),
        }
    }

    pub fn features(&self) -> usize {
        self.weights.ncols()
    }

    /// Nearest class centroid, written as a linear read-out.
    ///
    /// `w_k = μ_k / n` and `b_k = −‖μ_k‖² / 2n` for `n` features, so the
    /// arg-max is the class whose mean epoch is closest in Euclidean distance.
    pub fn fit_centroids(dataset: &Dataset) -> Result<Self> {
        if dataset.is_empty() {
            return Err(PipelineError::EmptyDataset {
                located: 0,
                dropped: 0,
            });
        }
        let (batch, chans, samples, _) = dataset.x.dim();
        let features = chans * samples;
        let num_classes = dataset.y.ncols();
        let flat = dataset
            .x
            .to_shape((batch, features))
            .map_err(|e| PipelineError::Shape(e.to_string()))?;

        let mut sums = Array2::<f64>::zeros((num_classes, features));
        let mut counts = vec![0usize; num_classes];
        for (row, &label) in flat.axis_iter(Axis(0)).zip(&dataset.labels) {
            if label >= num_classes {
                return Err(PipelineError::Shape(format!(
                    "Label {} is outside 0..{}",
                    label, num_classes
                )));
            }
            counts[label] += 1;
            let mut acc = sums.row_mut(label);
            acc.zip_mut_with(&row, |a, &v| *a += v as f64);
        }

        let n = features as f64;
        let mut readout = Self::zeros(num_classes, features);
        for (k, &count) in counts.iter().enumerate() {
            if count == 0 {
                log::warn!("Class {} has no epochs; it will never be predicted", k);
                readout.bias[k] = ABSENT_CLASS_BIAS;
                continue;
            }
            let mean = sums.row(k).mapv(|v| v / count as f64);
            let norm_sq: f64 = mean.iter().map(|v| v * v).sum();
            readout
                .weights
                .row_mut(k)
                .assign(&mean.mapv(|v| (v / n) as f32));
            readout.bias[k] = (-norm_sq / (2.0 * n)) as f32;
        }
        Ok(readout)
    }
}

impl Classifier for LinearReadout {
    fn predict(&self, batch: &Array4<f32>) -> Result<Array2<f32>> {
        let (n, chans, samples, depth) = batch.dim();
        if chans * samples * depth != self.features() {
            return Err(PipelineError::Shape(format!(
                "Batch items have {} features, read-out expects {}",
                chans * samples * depth,
                self.features()
            )));
        }

        let mut out = Array2::<f32>::zeros((n, self.num_classes()));
        for i in 0..n {
            let item: Array1<f32> = batch.slice(s![i, .., .., ..]).iter().copied().collect();
            let logits = self.weights.dot(&item) + &self.bias;
            let max = logits.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            let exp = logits.mapv(|v| (v - max).exp());
            let total = exp.sum();
            out.row_mut(i).assign(&(exp / total));
        }
        Ok(out)
    }

    fn num_classes(&self) -> usize {
        self.weights.nrows()
    }
}

/// Everything the serving process needs from training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub pipeline: PipelineConfig,
    pub pipeline_fingerprint: String,
    #[serde(default)]
    pub architecture: ArchitectureParams,
    /// Display names by class index; falls back to the annotation code
    #[serde(default)]
    pub class_names: BTreeMap<usize, String>,
    pub readout: LinearReadout,
}

impl ModelArtifact {
    pub fn new(
        name: impl Into<String>,
        pipeline: PipelineConfig,
        architecture: ArchitectureParams,
        readout: LinearReadout,
    ) -> Result<Self> {
        let artifact = Self {
            name: name.into(),
            created_at: Utc::now(),
            pipeline_fingerprint: pipeline.fingerprint(),
            pipeline,
            architecture,
            class_names: BTreeMap::new(),
            readout,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn with_class_names(mut self, names: BTreeMap<usize, String>) -> Self {
        self.class_names = names;
        self
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let artifact: ModelArtifact = serde_json::from_str(&content)
            .map_err(|e| PipelineError::Parse(format!("{}: {}", path.display(), e)))?;
        artifact.validate()?;
        log::info!(
            "Loaded model '{}' ({} classes, pipeline {})",
            artifact.name,
            artifact.readout.num_classes(),
            &artifact.pipeline_fingerprint[..12.min(artifact.pipeline_fingerprint.len())]
        );
        Ok(artifact)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Internal consistency: fingerprint, hyper-parameters and read-out shape.
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        let actual = self.pipeline.fingerprint();
        if actual != self.pipeline_fingerprint {
            return Err(PipelineError::ConfigParity {
                expected: self.pipeline_fingerprint.clone(),
                actual,
            });
        }
        self.architecture.validate(&self.pipeline)?;

        let features = self.pipeline.chans * self.pipeline.samples;
        let classes = self.pipeline.num_classes();
        if self.readout.weights.dim() != (classes, features) || self.readout.bias.len() != classes
        {
            return Err(PipelineError::Shape(format!(
                "Read-out is {:?} with {} biases, pipeline needs ({}, {})",
                self.readout.weights.dim(),
                self.readout.bias.len(),
                classes,
                features
            )));
        }
        Ok(())
    }

    /// Fails unless `config` is the configuration this model was trained with.
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

    /// Class index → display label. Unmapped indices have no label.
    pub fn labels(&self) -> BTreeMap<usize, String> {
        let mut labels = self.pipeline.event_id.inverse();
        for (index, name) in &self.class_names {
            labels.insert(*index, name.clone());
        }
        labels
    }

    pub fn classifier(&self) -> Arc<dyn Classifier> {
        Arc::new(self.readout.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorPackager;
    use tempfile::TempDir;

    fn tiny_config() -> PipelineConfig {
        PipelineConfig {
            chans: 2,
            samples: 3,
            ..PipelineConfig::default()
        }
    }

    fn tiny_architecture() -> ArchitectureParams {
        ArchitectureParams {
            kern_length: 2,
            ..ArchitectureParams::default()
        }
    }

    fn tiny_dataset() -> Dataset {
        let config = tiny_config();
        let packager = TensorPackager::from_config(&config);
        let up = Array2::from_elem((2, 3), 10.0);
        let down = Array2::from_elem((2, 3), -10.0);
        let batch = packager
            .pack_training(&[up.view(), down.view(), up.view()], &[0, 1, 0])
            .unwrap();
        Dataset::new(config, vec!["C3".into(), "C4".into()], batch, vec![0, 1, 2])
    }

    #[test]
    fn test_prediction_argmax() {
        let p = Prediction::from_probabilities(vec![0.1, 0.6, 0.2, 0.1]).unwrap();
        assert_eq!(p.predicted_index, 1);
        assert!((p.confidence - 0.6).abs() < 1e-6);
        assert!(Prediction::from_probabilities(vec![]).is_err());
    }

    #[test]
    fn test_zero_readout_is_uniform() {
        let readout = LinearReadout::zeros(4, 6);
        let probs = readout.predict(&Array4::ones((2, 2, 3, 1))).unwrap();
        assert_eq!(probs.dim(), (2, 4));
        for p in probs.iter() {
            assert!((p - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_readout_rejects_wrong_feature_count() {
        let readout = LinearReadout::zeros(4, 6);
        assert!(readout.predict(&Array4::zeros((1, 2, 4, 1))).is_err());
    }

    #[test]
    fn test_centroid_fit_separates_classes() {
        let dataset = tiny_dataset();
        let readout = LinearReadout::fit_centroids(&dataset).unwrap();
        let probs = readout.predict(&dataset.x).unwrap();
        let predicted: Vec<usize> = probs
            .axis_iter(Axis(0))
            .map(|row| Prediction::from_probabilities(row.to_vec()).unwrap().predicted_index)
            .collect();
        assert_eq!(predicted, dataset.labels);
        // Classes 2 and 3 never appear
        assert!(probs[[0, 2]] < 1e-6);
    }

    #[test]
    fn test_centroid_weights_are_scaled_by_feature_count() {
        let readout = LinearReadout::fit_centroids(&tiny_dataset()).unwrap();
        // 6 features; class 0 mean is +10, class 1 mean is -10
        assert!((readout.weights[[0, 0]] - 10.0 / 6.0).abs() < 1e-6);
        assert!((readout.weights[[1, 5]] + 10.0 / 6.0).abs() < 1e-6);
        assert!((readout.bias[0] + 50.0).abs() < 1e-4);
        assert!((readout.bias[1] + 50.0).abs() < 1e-4);
        assert_eq!(readout.bias[2], ABSENT_CLASS_BIAS);
    }

    #[test]
    fn test_dropout_kind_is_closed() {
        let ok: DropoutKind = serde_json::from_str("\"SpatialDropout2D\"").unwrap();
        assert_eq!(ok, DropoutKind::SpatialDropout2D);
        assert!(serde_json::from_str::<DropoutKind>("\"AlphaDropout\"").is_err());
    }

    #[test]
    fn test_architecture_validation() {
        let config = PipelineConfig::default();
        assert!(ArchitectureParams::default().validate(&config).is_ok());
        let bad = ArchitectureParams {
            dropout_rate: 1.5,
            ..ArchitectureParams::default()
        };
        assert!(bad.validate(&config).is_err());
    }

    #[test]
    fn test_artifact_save_load_and_parity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let readout = LinearReadout::fit_centroids(&tiny_dataset()).unwrap();
        let artifact =
            ModelArtifact::new("tiny", tiny_config(), tiny_architecture(), readout).unwrap();
        artifact.save(&path).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded.pipeline_fingerprint, artifact.pipeline_fingerprint);
        assert!(loaded.verify_parity(&tiny_config()).is_ok());

        let shifted = PipelineConfig {
            h_freq: 35.0,
            ..tiny_config()
        };
        assert!(matches!(
            loaded.verify_parity(&shifted),
            Err(PipelineError::ConfigParity { .. })
        ));
    }

    #[test]
    fn test_artifact_rejects_mismatched_readout() {
        let result = ModelArtifact::new(
            "tiny",
            tiny_config(),
            tiny_architecture(),
            LinearReadout::zeros(4, 7),
        );
        assert!(matches!(result, Err(PipelineError::Shape(_))));
    }

    #[test]
    fn test_labels_prefer_class_names() {
        let artifact = ModelArtifact::new(
            "tiny",
            tiny_config(),
            tiny_architecture(),
            LinearReadout::zeros(4, 6),
        )
        .unwrap()
        .with_class_names([(0, "left_hand".to_string())].into_iter().collect());
        let labels = artifact.labels();
        assert_eq!(labels[&0], "left_hand");
        assert_eq!(labels[&3], "772");
    }
}
