//! Pipeline runners.
//!
//! [`OfflineBuilder`] turns an archival [`Recording`] into a training
//! [`Dataset`]; [`OnlineAdapter`] turns one request window into an inference
//! batch. Both own a [`Preprocessor`] built from the same [`PipelineConfig`],
//! and every normalization and packaging step on either side goes through it.
//!
//! ```text
//! Recording ─ ChannelSelector ─ FirBandpass ─ EventLocator ─ EpochExtractor ─┐
//!                                                                            ├─ Preprocessor ─ (X, y)
//! request window ────────────────────────────────────────────────────────────┘
//! ```

use ndarray::{Array2, Array4, ArrayView2};

use crate::channels::ChannelSelector;
use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::epochs::{Epoch, EpochExtractor};
use crate::error::{PipelineError, Result};
use crate::events::EventLocator;
use crate::filter::FirBandpass;
use crate::normalize::TensorNormalizer;
use crate::tensor::TensorPackager;
use crate::types::Recording;

/// Stages shared verbatim by both runners: normalization and packaging.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PipelineConfig,
    normalizer: TensorNormalizer,
    packager: TensorPackager,
}

impl Preprocessor {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        // Both runners must reject the same invalid filter settings
        FirBandpass::from_config(&config)?;
        Ok(Self {
            normalizer: TensorNormalizer::from_config(&config),
            packager: TensorPackager::from_config(&config),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn packager(&self) -> &TensorPackager {
        &self.packager
    }

    /// Scaled epoch of shape (CHANS, SAMPLES) from a raw window in native units.
    pub fn normalize(&self, raw: ArrayView2<f64>) -> Result<Array2<f64>> {
        if raw.nrows() != self.config.chans {
            return Err(PipelineError::Shape(format!(
                "Window has {} channels, model expects {}",
                raw.nrows(),
                self.config.chans
            )));
        }
        self.normalizer.normalize(raw)
    }

    /// (1, CHANS, SAMPLES, 1) batch from a raw window in native units.
    pub fn transform_one(&self, raw: ArrayView2<f64>) -> Result<Array4<f32>> {
        let normalized = self.normalize(raw)?;
        self.packager.pack_one(normalized.view())
    }
}

/// Offline path: file-derived events, one recording per run.
#[derive(Debug, Clone)]
pub struct OfflineBuilder {
    selector: ChannelSelector,
    filter: FirBandpass,
    locator: EventLocator,
    extractor: EpochExtractor,
    preprocessor: Preprocessor,
}

impl OfflineBuilder {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let preprocessor = Preprocessor::new(config)?;
        let config = preprocessor.config();
        let filter = FirBandpass::from_config(config)?;
        Ok(Self {
            selector: ChannelSelector::from_config(config),
            locator: EventLocator::new(config.event_id.clone()),
            extractor: EpochExtractor::from_config(config, filter.group_delay()),
            filter,
            preprocessor,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        self.preprocessor.config()
    }

    pub fn filter(&self) -> &FirBandpass {
        &self.filter
    }

    pub fn extractor(&self) -> &EpochExtractor {
        &self.extractor
    }

    /// Channel selection, filtering, event location and windowing.
    ///
    /// Epochs are in native units and full window length.
    pub fn extract_epochs(&self, recording: &Recording) -> Result<(Recording, Vec<Epoch>, usize)> {
        let expected = self.config().sampling_rate;
        if recording.sample_rate() != expected {
            return Err(PipelineError::SampleRateMismatch {
                expected,
                actual: recording.sample_rate(),
            });
        }

        let selected = self.selector.select(recording)?;
        let filtered = self.filter.apply(&selected)?;
        let events = self.locator.locate(selected.annotations())?;
        let epochs = self
            .extractor
            .extract(&filtered, selected.segments(), &events);

        Ok((selected, epochs, events.len()))
    }

    /// Normalize and package one extracted epoch exactly as [`build`](Self::build) does.
    pub fn transform_one(&self, epoch: &Epoch) -> Result<Array4<f32>> {
        self.preprocessor.transform_one(epoch.data.view())
    }

    /// Run every stage and package the result.
    ///
    /// Epochs that fail normalization are dropped; a run that yields no
    /// epochs at all is an error.
    pub fn build(&self, recording: &Recording) -> Result<Dataset> {
        let (selected, epochs, located) = self.extract_epochs(recording)?;

        let mut normalized = Vec::with_capacity(epochs.len());
        let mut labels = Vec::with_capacity(epochs.len());
        let mut onsets = Vec::with_capacity(epochs.len());
        for epoch in &epochs {
            match self.preprocessor.normalize(epoch.data.view()) {
                Ok(data) => {
                    normalized.push(data);
                    labels.push(epoch.label);
                    onsets.push(epoch.onset);
                }
                Err(e) => log::warn!("Dropping epoch at sample {}: {}", epoch.onset, e),
            }
        }

        if normalized.is_empty() {
            return Err(PipelineError::EmptyDataset {
                located,
                dropped: located,
            });
        }

        let views: Vec<ArrayView2<f64>> = normalized.iter().map(|e| e.view()).collect();
        let batch = self.preprocessor.packager().pack_training(&views, &labels)?;

        log::info!(
            "Built dataset: {} epochs from {} events, X {:?}, y {:?}",
            labels.len(),
            located,
            batch.x.shape(),
            batch.y.shape()
        );

        Ok(Dataset::new(
            self.config().clone(),
            selected.channel_names().iter().map(|s| s.to_string()).collect(),
            batch,
            onsets,
        ))
    }
}

/// Online path: the request body is already one event-locked window.
#[derive(Debug, Clone)]
pub struct OnlineAdapter {
    preprocessor: Preprocessor,
    fingerprint: String,
}

impl OnlineAdapter {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let fingerprint = config.fingerprint();
        Ok(Self {
            preprocessor: Preprocessor::new(config)?,
            fingerprint,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        self.preprocessor.config()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Raw window in native units → (1, CHANS, SAMPLES, 1).
    pub fn transform(&self, window: ArrayView2<f64>) -> Result<Array4<f32>> {
        self.preprocessor.transform_one(window)
    }

    /// Rows of a request body → [channels × samples].
    pub fn window_from_rows(&self, rows: &[Vec<f64>]) -> Result<Array2<f64>> {
        let chans = self.config().chans;
        if rows.len() != chans {
            return Err(PipelineError::Shape(format!(
                "Request has {} channels, model expects {}",
                rows.len(),
                chans
            )));
        }
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(PipelineError::Shape(format!(
                "Row {} has {} samples, row 0 has {}",
                i,
                row.len(),
                width
            )));
        }
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(PipelineError::Parse("Request contains non-finite values".into()));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((chans, width), flat)
            .map_err(|e| PipelineError::Shape(format!("Request reshape failed: {}", e)))
    }
}
