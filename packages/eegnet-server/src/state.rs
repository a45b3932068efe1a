use eegnet_prep::{Classifier, ModelArtifact, OnlineAdapter, PipelineConfig, PipelineError};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Classifier loaded at startup
pub struct LoadedModel {
    pub name: String,
    pub classifier: Arc<dyn Classifier>,
}

/// Shared across all handlers; never mutated after startup
pub struct AppState {
    pub adapter: OnlineAdapter,
    pub model: Option<LoadedModel>,
    /// Class index → label returned to clients
    pub labels: BTreeMap<usize, String>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        adapter: OnlineAdapter,
        model: Option<LoadedModel>,
        labels: BTreeMap<usize, String>,
    ) -> Result<Self, PipelineError> {
        if let Some(model) = &model {
            let expected = adapter.config().num_classes();
            if model.classifier.num_classes() != expected {
                return Err(PipelineError::InvalidConfig(format!(
                    "Classifier '{}' has {} classes, pipeline has {}",
                    model.name,
                    model.classifier.num_classes(),
                    expected
                )));
            }
        }
        Ok(Self {
            adapter,
            model,
            labels,
            start_time: Instant::now(),
        })
    }

    /// Serve `artifact`. A separate serving configuration must match the one it was trained with.
    pub fn from_artifact(
        artifact: &ModelArtifact,
        serving: Option<PipelineConfig>,
    ) -> Result<Self, PipelineError> {
        let config = match serving {
            Some(config) => {
                artifact.verify_parity(&config)?;
                config
            }
            None => artifact.pipeline.clone(),
        };
        let model = LoadedModel {
            name: artifact.name.clone(),
            classifier: artifact.classifier(),
        };
        Self::new(OnlineAdapter::new(config)?, Some(model), artifact.labels())
    }

    /// Startup state from the artifact at `model_path`.
    ///
    /// Parity failures (in the artifact itself or against `serving`) are returned;
    /// any other load failure yields a state without a model.
    pub fn load(model_path: &Path, serving: Option<PipelineConfig>) -> Result<Self, PipelineError> {
        match ModelArtifact::load(model_path) {
            Ok(artifact) => {
                let state = Self::from_artifact(&artifact, serving)?;
                tracing::info!(
                    "   Model: {} ({} classes)",
                    artifact.name,
                    artifact.pipeline.num_classes()
                );
                Ok(state)
            }
            Err(e @ PipelineError::ConfigParity { .. }) => Err(e),
            Err(e) => {
                tracing::warn!("Could not load model from {}: {}", model_path.display(), e);
                tracing::warn!("Server will continue without a model; /predict returns 503");
                Self::without_model(serving.unwrap_or_default())
            }
        }
    }

    /// Up and answering, but `/predict` reports the classifier as unavailable.
    pub fn without_model(config: PipelineConfig) -> Result<Self, PipelineError> {
        let labels = config.event_id.inverse();
        Self::new(OnlineAdapter::new(config)?, None, labels)
    }

    pub fn classifier(&self) -> Option<Arc<dyn Classifier>> {
        self.model.as_ref().map(|m| m.classifier.clone())
    }

    pub fn label_for(&self, index: usize) -> String {
        self.labels
            .get(&index)
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
