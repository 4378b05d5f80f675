use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{AudioConfig, Result, VizError};

/// One frame of analyser output, in the shape the feature extractor
/// consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpectrumFrame {
    /// Magnitudes in dB from 0 Hz up to (but excluding) Nyquist.
    /// `-inf` marks silent bins.
    pub spectrum_db: Vec<f32>,
    /// RMS level of the time-domain block in dB.
    pub loudness_db: f32,
    pub sample_rate: f32,
}

/// Time-domain to decibel-spectrum converter.
///
/// Applies a Blackman window, a real FFT, per-bin temporal smoothing of the
/// magnitudes and a final dB conversion. Output has `fft_size / 2` bins.
pub struct SpectrumAnalyser {
    fft_size: usize,
    smoothing: f32,
    planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
    window: Vec<f32>,
    magnitudes: Vec<f32>,
}

impl SpectrumAnalyser {
    pub fn new(fft_size: usize, smoothing_time_constant: f32) -> Result<Self> {
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(VizError::config("fft_size must be a power of two"));
        }
        if !(0.0..1.0).contains(&smoothing_time_constant) {
            return Err(VizError::config(
                "smoothing_time_constant must lie in [0, 1)",
            ));
        }
        Ok(Self {
            fft_size,
            smoothing: smoothing_time_constant,
            planner: RealFftPlanner::new(),
            fft: None,
            window: blackman_window(fft_size),
            magnitudes: vec![0.0; fft_size / 2],
        })
    }

    pub fn from_config(config: &AudioConfig) -> Result<Self> {
        Self::new(config.fft_size, config.smoothing_time_constant)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Drops the smoothed magnitude history.
    pub fn reset(&mut self) {
        self.magnitudes.iter_mut().for_each(|m| *m = 0.0);
    }

    /// Analyses the most recent `fft_size` samples of `block`, zero padding
    /// shorter blocks at the front. An empty block yields an empty spectrum.
    pub fn analyse(&mut self, block: &[f32], sample_rate: f32) -> Result<SpectrumFrame> {
        if block.is_empty() {
            return Ok(SpectrumFrame {
                spectrum_db: Vec::new(),
                loudness_db: f32::NEG_INFINITY,
                sample_rate,
            });
        }

        let size = self.fft_size;
        let tail = &block[block.len().saturating_sub(size)..];
        let offset = size - tail.len();
        let loudness_db = amplitude_to_db(compute_rms(tail));

        let fft = prepare_fft(&mut self.fft, &mut self.planner, size);
        fft.input.iter_mut().for_each(|v| *v = 0.0);
        for (index, sample) in tail.iter().enumerate() {
            let slot = offset + index;
            let value = if sample.is_finite() { *sample } else { 0.0 };
            fft.input[slot] = value * self.window[slot];
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let scale = 1.0 / size as f32;
        let tau = self.smoothing;
        let mut spectrum_db = Vec::with_capacity(self.magnitudes.len());
        for (smoothed, bin) in self.magnitudes.iter_mut().zip(&fft.spectrum) {
            let magnitude = bin.norm() * scale;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;
            spectrum_db.push(amplitude_to_db(*smoothed));
        }

        Ok(SpectrumFrame {
            spectrum_db,
            loudness_db,
            sample_rate,
        })
    }
}

fn prepare_fft<'a>(
    slot: &'a mut Option<FftResources>,
    planner: &mut RealFftPlanner<f32>,
    size: usize,
) -> &'a mut FftResources {
    slot.get_or_insert_with(|| {
        let plan = planner.plan_fft_forward(size);
        FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    })
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("planned", &self.fft.is_some())
            .finish()
    }
}

fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples
        .iter()
        .filter(|s| s.is_finite())
        .map(|sample| sample * sample)
        .sum();
    (sum / samples.len() as f32).sqrt()
}

fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude > 0.0 {
        20.0 * amplitude.log10()
    } else {
        f32::NEG_INFINITY
    }
}

fn blackman_window(len: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    (0..len)
        .map(|i| {
            let x = i as f32 / len as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}
