//! Shared pipeline configuration.
//!
//! [`PipelineConfig`] is the single source of truth for every
//! parity-sensitive constant. The Offline Builder and the Online Adapter are
//! both constructed from it, and its [`fingerprint`](PipelineConfig::fingerprint)
//! is persisted next to the trained classifier so a serving process can prove
//! it is running the configuration the model was trained with.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Annotation code → dense class index in `[0, NB_CLASSES)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventMap(BTreeMap<String, usize>);

impl EventMap {
    /// Build a map, checking that indices are unique and cover `0..len`.
    pub fn new(entries: BTreeMap<String, usize>) -> Result<Self> {
        let map = Self(entries);
        map.validate()?;
        Ok(map)
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(PipelineError::InvalidConfig("Event map is empty".into()));
        }
        let mut seen = vec![false; self.0.len()];
        for (code, &index) in &self.0 {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(PipelineError::InvalidConfig(format!(
                        "Class index {} is assigned to more than one code (including '{}')",
                        index, code
                    )))
                }
                None => {
                    return Err(PipelineError::InvalidConfig(format!(
                        "Class index {} for code '{}' is outside 0..{}",
                        index,
                        code,
                        self.0.len()
                    )))
                }
            }
        }
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.0.len()
    }

    pub fn index_of(&self, code: &str) -> Option<usize> {
        self.0.get(code).copied()
    }

    /// Class index → annotation code
    pub fn inverse(&self) -> BTreeMap<usize, String> {
        self.0.iter().map(|(k, &v)| (v, k.clone())).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &usize)> {
        self.0.iter()
    }
}

impl Default for EventMap {
    /// Left hand, right hand, feet, tongue
    fn default() -> Self {
        Self(
            [("769", 0), ("770", 1), ("771", 2), ("772", 3)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

/// Configuration for the signal-to-tensor pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Band-pass low edge (Hz)
    pub l_freq: f64,
    /// Band-pass high edge (Hz)
    pub h_freq: f64,
    /// Window start relative to the event onset (s)
    pub tmin: f64,
    /// Window end relative to the event onset (s), inclusive
    pub tmax: f64,
    /// Expected sample rate of every recording (Hz)
    pub sampling_rate: f64,
    /// Channel count the model consumes
    pub chans: usize,
    /// Samples per epoch the model consumes
    pub samples: usize,
    pub event_id: EventMap,
    /// Multiplier from native units to model units (volts → microvolts)
    #[serde(default = "default_unit_scale")]
    pub unit_scale: f64,
    /// Explicit analysis channels in model order. Empty means every
    /// non-auxiliary, non-bad channel in recording order.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Channels typed as auxiliary on load
    #[serde(default = "default_aux_channels")]
    pub aux_channels: Vec<String>,
    /// Channels excluded before the channel-count check
    #[serde(default)]
    pub bad_channels: Vec<String>,
}

fn default_unit_scale() -> f64 {
    1e6
}

fn default_aux_channels() -> Vec<String> {
    vec![
        "EOG-left".to_string(),
        "EOG-central".to_string(),
        "EOG-right".to_string(),
    ]
}

impl Default for PipelineConfig {
    /// The training configuration: 8–30 Hz, −1..4 s at 250 Hz, 22 × 1000.
    fn default() -> Self {
        Self {
            l_freq: 8.0,
            h_freq: 30.0,
            tmin: -1.0,
            tmax: 4.0,
            sampling_rate: 250.0,
            chans: 22,
            samples: 1000,
            event_id: EventMap::default(),
            unit_scale: default_unit_scale(),
            channels: Vec::new(),
            aux_channels: default_aux_channels(),
            bad_channels: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| PipelineError::Parse(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.event_id.num_classes()
    }

    /// Offset of the first window sample relative to the onset
    pub fn window_start_offset(&self) -> i64 {
        (self.tmin * self.sampling_rate).round() as i64
    }

    /// Offset of the last window sample (inclusive) relative to the onset
    pub fn window_end_offset(&self) -> i64 {
        (self.tmax * self.sampling_rate).round() as i64
    }

    /// Samples in a raw window before truncation
    pub fn window_samples(&self) -> usize {
        (self.window_end_offset() - self.window_start_offset() + 1).max(0) as usize
    }

    /// Structural checks. Filter edges are checked by the filter designer.
    pub fn validate(&self) -> Result<()> {
        self.event_id.validate()?;
        if !(self.sampling_rate.is_finite() && self.sampling_rate > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "sampling_rate must be positive, got {}",
                self.sampling_rate
            )));
        }
        if !(self.tmin < self.tmax) {
            return Err(PipelineError::InvalidConfig(format!(
                "tmin ({}) must be less than tmax ({})",
                self.tmin, self.tmax
            )));
        }
        if self.chans == 0 || self.samples == 0 {
            return Err(PipelineError::InvalidConfig(
                "chans and samples must be non-zero".into(),
            ));
        }
        if !(self.unit_scale.is_finite() && self.unit_scale != 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "unit_scale must be finite and non-zero, got {}",
                self.unit_scale
            )));
        }
        if !self.channels.is_empty() && self.channels.len() != self.chans {
            return Err(PipelineError::InvalidConfig(format!(
                "{} explicit channels listed but chans = {}",
                self.channels.len(),
                self.chans
            )));
        }
        if self.window_samples() < self.samples {
            log::warn!(
                "Window of {} samples is shorter than the {} the model expects; every epoch will fail normalization",
                self.window_samples(),
                self.samples
            );
        }
        Ok(())
    }

    /// Hex SHA-256 over the canonical JSON form.
    ///
    /// Field order is fixed by the struct and the event map is ordered, so
    /// equal configurations always hash equally.
    pub fn fingerprint(&self) -> String {
        // Serializing plain data with ordered maps cannot fail.
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_training_settings() {
        let config = PipelineConfig::default();
        assert_eq!(config.num_classes(), 4);
        assert_eq!(config.window_start_offset(), -250);
        assert_eq!(config.window_end_offset(), 1000);
        assert_eq!(config.window_samples(), 1251);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_event_map_rejects_duplicate_index() {
        let entries: BTreeMap<String, usize> =
            [("769".to_string(), 0), ("770".to_string(), 0)].into_iter().collect();
        assert!(EventMap::new(entries).is_err());
    }

    #[test]
    fn test_event_map_rejects_sparse_index() {
        let entries: BTreeMap<String, usize> =
            [("769".to_string(), 0), ("770".to_string(), 2)].into_iter().collect();
        assert!(EventMap::new(entries).is_err());
    }

    #[test]
    fn test_event_map_inverse() {
        let inverse = EventMap::default().inverse();
        assert_eq!(inverse[&1], "770");
        assert_eq!(inverse.len(), 4);
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = PipelineConfig::default();
        let b = PipelineConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let shifted = PipelineConfig {
            samples: 999,
            ..PipelineConfig::default()
        };
        assert_ne!(a.fingerprint(), shifted.fingerprint());
    }

    #[test]
    fn test_fingerprint_survives_json_roundtrip() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.fingerprint(), back.fingerprint());
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let config = PipelineConfig {
            tmin: 4.0,
            tmax: -1.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_explicit_channel_count_mismatch() {
        let config = PipelineConfig {
            channels: vec!["C3".into(), "C4".into()],
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
