use ndarray::{s, Array2};
use std::fmt;

use crate::config::PipelineConfig;
use crate::events::LocatedEvent;

/// Event-locked window of the filtered signal, [channels × samples].
#[derive(Debug, Clone, PartialEq)]
pub struct Epoch {
    pub data: Array2<f64>,
    pub label: usize,
    /// Onset sample of the source event
    pub onset: usize,
}

impl Epoch {
    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }
}

/// Why an event produced no epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BeforeStart,
    PastEnd,
    SegmentBoundary(usize),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::BeforeStart => write!(f, "window starts before the recording"),
            SkipReason::PastEnd => write!(f, "window extends past the end of the recording"),
            SkipReason::SegmentBoundary(b) => {
                write!(f, "window overlaps the segment boundary at sample {}", b)
            }
        }
    }
}

/// Cuts `[onset + start_offset, onset + end_offset]` around each event.
///
/// Windows are never padded: an event whose window leaves the recording, or
/// touches the filter's edge zone around an internal segment boundary, is
/// skipped.
#[derive(Debug, Clone)]
pub struct EpochExtractor {
    start_offset: i64,
    end_offset: i64,
    boundary_guard: usize,
}

impl EpochExtractor {
    /// `boundary_guard` is the half-width, in samples, of the excluded zone
    /// around each internal segment boundary (the filter's group delay).
    pub fn from_config(config: &PipelineConfig, boundary_guard: usize) -> Self {
        Self {
            start_offset: config.window_start_offset(),
            end_offset: config.window_end_offset(),
            boundary_guard,
        }
    }

    /// Raw samples per window
    pub fn window_len(&self) -> usize {
        (self.end_offset - self.start_offset + 1) as usize
    }

    /// Half-open sample range `[start, end)` of the window for `onset`
    pub fn window(&self, onset: usize) -> (i64, i64) {
        let start = onset as i64 + self.start_offset;
        (start, start + self.window_len() as i64)
    }

    /// `Ok(start)` if the window for `onset` can be cut from a signal of
    /// `n_samples` with the given segment starts.
    pub fn check(&self, onset: usize, n_samples: usize, segments: &[usize]) -> Result<usize, SkipReason> {
        let (start, end) = self.window(onset);
        if start < 0 {
            return Err(SkipReason::BeforeStart);
        }
        if end > n_samples as i64 {
            return Err(SkipReason::PastEnd);
        }
        let guard = self.boundary_guard as i64;
        for &boundary in segments.iter().filter(|&&b| b > 0) {
            let b = boundary as i64;
            if start < b + guard && end > b - guard {
                return Err(SkipReason::SegmentBoundary(boundary));
            }
        }
        Ok(start as usize)
    }

    /// One epoch per fitting event, in event order.
    pub fn extract(
        &self,
        signal: &Array2<f64>,
        segments: &[usize],
        events: &[LocatedEvent],
    ) -> Vec<Epoch> {
        let n_samples = signal.ncols();
        let len = self.window_len();
        let mut epochs = Vec::with_capacity(events.len());

        for event in events {
            match self.check(event.onset, n_samples, segments) {
                Ok(start) => epochs.push(Epoch {
                    data: signal.slice(s![.., start..start + len]).to_owned(),
                    label: event.class_index,
                    onset: event.onset,
                }),
                Err(reason) => {
                    log::warn!("Skipping event at sample {}: {}", event.onset, reason);
                }
            }
        }

        log::debug!(
            "Extracted {} of {} epochs ({} samples each)",
            epochs.len(),
            events.len(),
            len
        );
        epochs
    }
}
