use ndarray::Axis;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::types::{Channel, ChannelKind, Recording};

/// Ordered channel names selected for analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSet(Vec<String>);

impl ChannelSet {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Restricts a recording to the analysis channels, in model order.
///
/// Declared-bad channels are excluded first; the remainder must number
/// exactly `chans`.
#[derive(Debug, Clone)]
pub struct ChannelSelector {
    requested: Option<ChannelSet>,
    aux: Vec<String>,
    bad: Vec<String>,
    chans: usize,
}

impl ChannelSelector {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let requested = if config.channels.is_empty() {
            None
        } else {
            Some(ChannelSet::new(config.channels.clone()))
        };
        Self {
            requested,
            aux: config.aux_channels.clone(),
            bad: config.bad_channels.clone(),
            chans: config.chans,
        }
    }

    fn is_auxiliary(&self, channel: &Channel) -> bool {
        channel.kind == ChannelKind::Auxiliary || self.aux.iter().any(|a| *a == channel.name)
    }

    fn is_bad(&self, channel: &Channel) -> bool {
        channel.bad || self.bad.iter().any(|b| *b == channel.name)
    }

    /// Resolve the channel set for `recording` without copying any samples.
    pub fn resolve(&self, recording: &Recording) -> Result<ChannelSet> {
        let names: Vec<String> = match &self.requested {
            Some(set) => {
                let mut kept = Vec::with_capacity(set.len());
                for name in set.names() {
                    let index = recording.channel_index(name).ok_or_else(|| {
                        PipelineError::ChannelMismatch(format!(
                            "Requested channel '{}' is not in the recording (available: {:?})",
                            name,
                            recording.channel_names()
                        ))
                    })?;
                    let channel = &recording.channels()[index];
                    if self.is_auxiliary(channel) {
                        return Err(PipelineError::ChannelMismatch(format!(
                            "Requested channel '{}' is auxiliary, not an analysis channel",
                            name
                        )));
                    }
                    if self.is_bad(channel) {
                        log::info!("Excluding bad channel '{}'", name);
                        continue;
                    }
                    kept.push(name.clone());
                }
                kept
            }
            None => recording
                .channels()
                .iter()
                .filter(|c| !self.is_auxiliary(c) && !self.is_bad(c))
                .map(|c| c.name.clone())
                .collect(),
        };

        if names.len() != self.chans {
            return Err(PipelineError::ChannelMismatch(format!(
                "{} analysis channels after excluding bad channels, model expects {}",
                names.len(),
                self.chans
            )));
        }

        Ok(ChannelSet::new(names))
    }

    /// New recording holding only the selected channels, in set order.
    pub fn select(&self, recording: &Recording) -> Result<Recording> {
        let set = self.resolve(recording)?;
        let indices: Vec<usize> = set
            .names()
            .iter()
            .filter_map(|n| recording.channel_index(n))
            .collect();

        let data = recording.data().select(Axis(0), &indices);
        let channels = indices
            .iter()
            .map(|&i| recording.channels()[i].clone())
            .collect();

        log::debug!("Selected channels: {:?}", set.names());

        Recording::new(
            channels,
            data,
            recording.sample_rate(),
            recording.annotations().to_vec(),
        )?
        .with_segments(recording.segments().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn recording(names: &[&str]) -> Recording {
        let channels = names
            .iter()
            .map(|n| {
                if n.starts_with("EOG") {
                    Channel::auxiliary(*n)
                } else {
                    Channel::eeg(*n)
                }
            })
            .collect();
        let data = Array2::from_shape_fn((names.len(), 8), |(c, t)| (c * 100 + t) as f64);
        Recording::new(channels, data, 250.0, vec![]).unwrap()
    }

    fn config(chans: usize) -> PipelineConfig {
        PipelineConfig {
            chans,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_implicit_selection_drops_auxiliary() {
        let rec = recording(&["Fz", "C3", "EOG-left", "C4"]);
        let selected = ChannelSelector::from_config(&config(3)).select(&rec).unwrap();
        assert_eq!(selected.channel_names(), vec!["Fz", "C3", "C4"]);
        assert_eq!(selected.data()[[2, 0]], 300.0);
    }

    #[test]
    fn test_explicit_selection_follows_requested_order() {
        let rec = recording(&["Fz", "C3", "C4"]);
        let cfg = PipelineConfig {
            chans: 2,
            channels: vec!["C4".into(), "Fz".into()],
            ..PipelineConfig::default()
        };
        let selected = ChannelSelector::from_config(&cfg).select(&rec).unwrap();
        assert_eq!(selected.channel_names(), vec!["C4", "Fz"]);
        assert_eq!(selected.data()[[0, 1]], 201.0);
    }

    #[test]
    fn test_count_mismatch_is_fatal() {
        let rec = recording(&["Fz", "C3", "C4"]);
        let result = ChannelSelector::from_config(&config(22)).select(&rec);
        assert!(matches!(result, Err(PipelineError::ChannelMismatch(_))));
    }

    #[test]
    fn test_missing_requested_channel() {
        let rec = recording(&["Fz", "C3"]);
        let cfg = PipelineConfig {
            chans: 2,
            channels: vec!["Fz".into(), "Pz".into()],
            ..PipelineConfig::default()
        };
        let result = ChannelSelector::from_config(&cfg).select(&rec);
        assert!(matches!(result, Err(PipelineError::ChannelMismatch(_))));
    }

    #[test]
    fn test_requesting_auxiliary_channel_fails() {
        let rec = recording(&["Fz", "EOG-left"]);
        let cfg = PipelineConfig {
            chans: 2,
            channels: vec!["Fz".into(), "EOG-left".into()],
            ..PipelineConfig::default()
        };
        let result = ChannelSelector::from_config(&cfg).select(&rec);
        assert!(matches!(result, Err(PipelineError::ChannelMismatch(_))));
    }

    #[test]
    fn test_bad_channels_are_excluded_before_count_check() {
        let rec = recording(&["Fz", "C3", "C4"]);
        let cfg = PipelineConfig {
            chans: 2,
            bad_channels: vec!["C3".into()],
            ..PipelineConfig::default()
        };
        let set = ChannelSelector::from_config(&cfg).resolve(&rec).unwrap();
        assert_eq!(set.names(), &["Fz".to_string(), "C4".to_string()]);
    }
}
