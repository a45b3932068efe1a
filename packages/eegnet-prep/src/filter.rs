//! Linear-phase FIR band-pass filter
//!
//! Windowed-sinc design with a Hamming window. The kernel is symmetric, so the
//! group delay is a constant `(taps - 1) / 2` samples at every frequency; the
//! filter removes that delay exactly, keeping filtered sample `i` aligned with
//! raw sample `i` and therefore with every annotation onset.

use ndarray::{s, Array2};
use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::types::Recording;

/// Window-dependent length factor for a Hamming window
const HAMMING_LENGTH_FACTOR: f64 = 3.3;

/// Designed band-pass kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirBandpass {
    taps: Vec<f64>,
    l_freq: f64,
    h_freq: f64,
    sample_rate: f64,
}

impl FirBandpass {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::design(config.l_freq, config.h_freq, config.sampling_rate)
    }

    /// Design a band-pass kernel for `l_freq..h_freq` Hz.
    ///
    /// Transition bandwidths are `min(max(0.25·f, 2), f)` below the pass band
    /// and `min(max(0.25·f, 2), nyquist − f)` above it; the kernel length is
    /// `ceil(3.3 / narrowest_transition · rate)`, forced odd.
    pub fn design(l_freq: f64, h_freq: f64, sample_rate: f64) -> Result<Self> {
        if !(l_freq > 0.0 && h_freq > 0.0) {
            return Err(PipelineError::FilterConfig(format!(
                "Cutoffs must be positive, got l_freq={} h_freq={}",
                l_freq, h_freq
            )));
        }
        if l_freq >= h_freq {
            return Err(PipelineError::FilterConfig(format!(
                "Low cutoff ({} Hz) must be less than high cutoff ({} Hz)",
                l_freq, h_freq
            )));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(PipelineError::FilterConfig(format!(
                "Sample rate must be positive, got {}",
                sample_rate
            )));
        }
        let nyquist = sample_rate / 2.0;
        if h_freq >= nyquist {
            return Err(PipelineError::FilterConfig(format!(
                "High cutoff ({} Hz) must be less than Nyquist ({} Hz)",
                h_freq, nyquist
            )));
        }

        let l_trans = (0.25 * l_freq).max(2.0).min(l_freq);
        let h_trans = (0.25 * h_freq).max(2.0).min(nyquist - h_freq);
        let mut n_taps = (HAMMING_LENGTH_FACTOR / l_trans.min(h_trans) * sample_rate).ceil() as usize;
        if n_taps % 2 == 0 {
            n_taps += 1;
        }

        let fc_low = (l_freq - l_trans / 2.0) / sample_rate;
        let fc_high = (h_freq + h_trans / 2.0) / sample_rate;
        let center = ((n_taps - 1) / 2) as f64;

        let mut taps: Vec<f64> = (0..n_taps)
            .map(|n| {
                let m = n as f64 - center;
                let ideal = lowpass_impulse(fc_high, m) - lowpass_impulse(fc_low, m);
                ideal * hamming(n, n_taps)
            })
            .collect();

        // Unit gain at the centre of the pass band
        let f0 = (l_freq + h_freq) / 2.0 / sample_rate;
        let gain: f64 = taps
            .iter()
            .enumerate()
            .map(|(n, &h)| h * (2.0 * PI * f0 * (n as f64 - center)).cos())
            .sum();
        for tap in taps.iter_mut() {
            *tap /= gain;
        }

        log::debug!(
            "Designed {}-tap band-pass {}-{} Hz at {} Hz (transitions {} / {} Hz)",
            n_taps,
            l_freq,
            h_freq,
            sample_rate,
            l_trans,
            h_trans
        );

        Ok(Self {
            taps,
            l_freq,
            h_freq,
            sample_rate,
        })
    }

    pub fn taps(&self) -> &[f64] {
        &self.taps
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Constant group delay in samples
    pub fn group_delay(&self) -> usize {
        (self.taps.len() - 1) / 2
    }

    /// Magnitude response at `freq` Hz
    pub fn magnitude_at(&self, freq: f64) -> f64 {
        let w = 2.0 * PI * freq / self.sample_rate;
        let (re, im) = self
            .taps
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(re, im), (n, &h)| {
                (re + h * (w * n as f64).cos(), im - h * (w * n as f64).sin())
            });
        (re * re + im * im).sqrt()
    }

    /// Filter every channel of `recording`, segment by segment.
    ///
    /// Returns a new [channels × samples] array; the recording is untouched.
    pub fn apply(&self, recording: &Recording) -> Result<Array2<f64>> {
        if recording.sample_rate() != self.sample_rate {
            return Err(PipelineError::SampleRateMismatch {
                expected: self.sample_rate,
                actual: recording.sample_rate(),
            });
        }

        let data = recording.data();
        let (n_channels, n_samples) = data.dim();
        let ranges = recording.segment_ranges();

        let engine = OverlapAdd::new(&self.taps);
        let rows: Vec<Vec<f64>> = (0..n_channels)
            .into_par_iter()
            .map(|c| {
                let mut row = Vec::with_capacity(n_samples);
                for &(start, end) in &ranges {
                    let segment = data.slice(s![c, start..end]).to_vec();
                    row.extend(self.filter_segment_with(&engine, &segment));
                }
                row
            })
            .collect();

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((n_channels, n_samples), flat)
            .map_err(|e| PipelineError::Shape(format!("Filtered signal reshape failed: {}", e)))
    }

    /// Delay-compensated convolution of one contiguous segment.
    ///
    /// Edges are padded by reflection (zeros past a full reflection).
    pub fn filter_segment(&self, x: &[f64]) -> Vec<f64> {
        self.filter_segment_with(&OverlapAdd::new(&self.taps), x)
    }

    fn filter_segment_with(&self, engine: &OverlapAdd, x: &[f64]) -> Vec<f64> {
        let len = x.len();
        if len == 0 || self.taps.is_empty() {
            return Vec::new();
        }
        let half = self.group_delay();

        let mut padded = vec![0.0; len + 2 * half];
        padded[half..half + len].copy_from_slice(x);
        for k in 1..=half {
            if k < len {
                padded[half - k] = x[k];
                padded[half + len - 1 + k] = x[len - 1 - k];
            }
        }

        // Symmetric kernel: output i is full-convolution sample i + taps - 1
        let full = engine.convolve(&padded);
        full[2 * half..2 * half + len].to_vec()
    }
}

/// FFT overlap-add convolution with one fixed kernel
struct OverlapAdd {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    spectrum: Vec<Complex<f64>>,
    fft_len: usize,
    block_len: usize,
    kernel_len: usize,
}

impl OverlapAdd {
    fn new(taps: &[f64]) -> Self {
        let kernel_len = taps.len().max(1);
        let fft_len = (2 * kernel_len).next_power_of_two();
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);

        let mut spectrum: Vec<Complex<f64>> = taps.iter().map(|&h| Complex::new(h, 0.0)).collect();
        spectrum.resize(fft_len, Complex::new(0.0, 0.0));
        forward.process(&mut spectrum);

        Self {
            forward,
            inverse,
            spectrum,
            fft_len,
            block_len: fft_len - kernel_len + 1,
            kernel_len,
        }
    }

    /// Full linear convolution: `x.len() + taps - 1` samples.
    fn convolve(&self, x: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; x.len() + self.kernel_len - 1];
        let mut buffer = vec![Complex::new(0.0, 0.0); self.fft_len];
        let scale = 1.0 / self.fft_len as f64;

        for (b, block) in x.chunks(self.block_len).enumerate() {
            buffer.fill(Complex::new(0.0, 0.0));
            for (dst, &v) in buffer.iter_mut().zip(block) {
                *dst = Complex::new(v, 0.0);
            }
            self.forward.process(&mut buffer);
            for (c, &h) in buffer.iter_mut().zip(&self.spectrum) {
                *c = *c * h;
            }
            self.inverse.process(&mut buffer);

            let start = b * self.block_len;
            let valid = block.len() + self.kernel_len - 1;
            for (dst, c) in out[start..start + valid].iter_mut().zip(&buffer) {
                *dst += c.re * scale;
            }
        }
        out
    }
}

fn lowpass_impulse(fc: f64, m: f64) -> f64 {
    2.0 * fc * sinc(2.0 * fc * m)
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

fn hamming(n: usize, len: usize) -> f64 {
    if len == 1 {
        return 1.0;
    }
    0.54 - 0.46 * (2.0 * PI * n as f64 / (len - 1) as f64).cos()
}
