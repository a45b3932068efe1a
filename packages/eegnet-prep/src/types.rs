use ndarray::{concatenate, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Signal type of a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[default]
    Eeg,
    /// Non-analysis signal (EOG, EMG, trigger lines)
    Auxiliary,
}

/// Channel metadata. Sample values live in [`Recording::data`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    #[serde(default)]
    pub kind: ChannelKind,
    /// Flagged bad by the acquisition metadata
    #[serde(default)]
    pub bad: bool,
}

impl Channel {
    pub fn eeg(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Eeg,
            bad: false,
        }
    }

    pub fn auxiliary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Auxiliary,
            bad: false,
        }
    }
}

/// Marker embedded in a recording: symbolic code at a sample offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub code: String,
    pub onset: usize,
}

impl Annotation {
    pub fn new(code: impl Into<String>, onset: usize) -> Self {
        Self {
            code: code.into(),
            onset,
        }
    }
}

/// A finite multi-channel recording in native units (volts).
///
/// Immutable after construction; stages derive new arrays from it.
#[derive(Debug, Clone)]
pub struct Recording {
    channels: Vec<Channel>,
    data: Array2<f64>,
    sample_rate: f64,
    annotations: Vec<Annotation>,
    segments: Vec<usize>,
}

impl Recording {
    /// `data` is [channels × samples].
    pub fn new(
        channels: Vec<Channel>,
        data: Array2<f64>,
        sample_rate: f64,
        annotations: Vec<Annotation>,
    ) -> Result<Self> {
        if data.nrows() != channels.len() {
            return Err(PipelineError::Shape(format!(
                "{} channel descriptors for {} signal rows",
                channels.len(),
                data.nrows()
            )));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "Sample rate must be positive, got {}",
                sample_rate
            )));
        }
        let n_samples = data.ncols();
        if let Some(a) = annotations.iter().find(|a| a.onset >= n_samples) {
            return Err(PipelineError::Shape(format!(
                "Annotation '{}' at sample {} lies outside a {}-sample recording",
                a.code, a.onset, n_samples
            )));
        }

        Ok(Self {
            channels,
            data,
            sample_rate,
            annotations,
            segments: vec![0],
        })
    }

    /// Declare additional segment start offsets (concatenation points).
    pub fn with_segments(mut self, mut segments: Vec<usize>) -> Result<Self> {
        segments.push(0);
        segments.sort_unstable();
        segments.dedup();
        if let Some(&last) = segments.last() {
            if last >= self.n_samples() && last != 0 {
                return Err(PipelineError::Shape(format!(
                    "Segment boundary {} lies outside a {}-sample recording",
                    last,
                    self.n_samples()
                )));
            }
        }
        self.segments = segments;
        Ok(self)
    }

    /// Join recordings end-to-end. Channel layouts and sample rates must agree;
    /// each part's start becomes a segment boundary.
    pub fn concatenate(parts: Vec<Recording>) -> Result<Recording> {
        let mut iter = parts.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| PipelineError::InvalidConfig("No recordings to concatenate".into()))?;

        let mut views: Vec<Array2<f64>> = vec![first.data];
        let mut annotations = first.annotations;
        let mut segments = first.segments;
        let mut offset = views[0].ncols();
        let mut channels = first.channels;

        for part in iter {
            let names: Vec<&str> = part.channels.iter().map(|c| c.name.as_str()).collect();
            let expected: Vec<&str> = channels.iter().map(|c| c.name.as_str()).collect();
            if names != expected {
                return Err(PipelineError::ChannelMismatch(format!(
                    "Cannot concatenate recordings with different channels: {:?} vs {:?}",
                    expected, names
                )));
            }
            if part.sample_rate != first.sample_rate {
                return Err(PipelineError::SampleRateMismatch {
                    expected: first.sample_rate,
                    actual: part.sample_rate,
                });
            }
            for (dst, src) in channels.iter_mut().zip(&part.channels) {
                dst.bad |= src.bad;
            }
            annotations.extend(
                part.annotations
                    .into_iter()
                    .map(|a| Annotation::new(a.code, a.onset + offset)),
            );
            segments.extend(part.segments.iter().map(|s| s + offset));
            offset += part.data.ncols();
            views.push(part.data);
        }

        let view_refs: Vec<ArrayView2<f64>> = views.iter().map(|v| v.view()).collect();
        let data = concatenate(Axis(1), &view_refs)
            .map_err(|e| PipelineError::Shape(format!("Concatenation failed: {}", e)))?;

        Ok(Recording {
            channels,
            data,
            sample_rate: first.sample_rate,
            annotations,
            segments,
        })
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Start offsets of each source segment, always beginning with 0
    pub fn segments(&self) -> &[usize] {
        &self.segments
    }

    /// Sample ranges `[start, end)` of each segment
    pub fn segment_ranges(&self) -> Vec<(usize, usize)> {
        let n = self.n_samples();
        self.segments
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = self.segments.get(i + 1).copied().unwrap_or(n);
                (start, end)
            })
            .collect()
    }

    pub(crate) fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny(n: usize, code_at: usize) -> Recording {
        Recording::new(
            vec![Channel::eeg("C3"), Channel::eeg("C4")],
            Array2::zeros((2, n)),
            250.0,
            vec![Annotation::new("769", code_at)],
        )
        .unwrap()
    }

    #[test]
    fn test_channel_kind_defaults_to_eeg() {
        assert_eq!(ChannelKind::default(), ChannelKind::Eeg);
        let channel: Channel = serde_json::from_str(r#"{"name": "C3"}"#).unwrap();
        assert_eq!(channel.kind, ChannelKind::Eeg);
        assert!(!channel.bad);
    }

    #[test]
    fn test_rejects_row_count_mismatch() {
        let result = Recording::new(vec![Channel::eeg("C3")], Array2::zeros((2, 10)), 250.0, vec![]);
        assert!(matches!(result, Err(PipelineError::Shape(_))));
    }

    #[test]
    fn test_rejects_annotation_out_of_range() {
        let result = Recording::new(
            vec![Channel::eeg("C3")],
            Array2::zeros((1, 10)),
            250.0,
            vec![Annotation::new("769", 10)],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_concatenate_shifts_annotations_and_records_segments() {
        let joined = Recording::concatenate(vec![tiny(100, 10), tiny(50, 5)]).unwrap();
        assert_eq!(joined.n_samples(), 150);
        assert_eq!(joined.segments(), &[0, 100]);
        assert_eq!(joined.annotations()[1].onset, 105);
        assert_eq!(joined.segment_ranges(), vec![(0, 100), (100, 150)]);
    }

    #[test]
    fn test_concatenate_rejects_different_channels() {
        let other = Recording::new(
            vec![Channel::eeg("Cz"), Channel::eeg("C4")],
            Array2::zeros((2, 10)),
            250.0,
            vec![],
        )
        .unwrap();
        let result = Recording::concatenate(vec![tiny(100, 0), other]);
        assert!(matches!(result, Err(PipelineError::ChannelMismatch(_))));
    }
}
