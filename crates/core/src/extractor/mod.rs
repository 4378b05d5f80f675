//! Feature extraction from decibel-scale spectra.
//!
//! [`FeatureExtractor`] turns one frame of raw analyser output into a
//! [`Features`] snapshot. All state that carries across frames (baselines,
//! peak trackers, onset history) lives inside the extractor and evolves as a
//! function of the input sequence and the elapsed time only.

mod log_map;
mod onset;
mod smoothing;

use std::{fmt, ops::Range, time::Instant};

pub use log_map::{smooth_circular, LogFrequencyMap};
pub use onset::OnsetDetector;
pub use smoothing::{clamp01, db_to_unit, sanitize_db, smoothing_coeff, AttackDecay, PeakTracker};

use crate::{Bands, ExtractorConfig, Features, Result};

/// Frame delta used for the first frame and whenever timing is unusable.
const DEFAULT_DT_MS: f32 = 1000.0 / 60.0;
/// Upper bound on a single frame delta, so a stalled tab or debugger pause
/// does not flush every filter in one step.
const MAX_DT_MS: f32 = 250.0;
const ROLLOFF_FRACTION: f32 = 0.85;
const WEIGHT_EPSILON: f32 = 1e-9;

/// Stateful converter from raw spectra to [`Features`].
///
/// Not meant for concurrent use: call [`extract`](Self::extract) at most once
/// per frame, in order.
pub struct FeatureExtractor {
    config: ExtractorConfig,
    origin: Instant,
    last_t: Option<f32>,

    map: Option<LogFrequencyMap>,
    band_ranges: [Range<usize>; 3],

    resampled: Vec<f32>,
    smoothed: Vec<f32>,
    baseline: Vec<f32>,
    bin_peaks: Vec<f32>,

    energy: AttackDecay,
    rms_peak: PeakTracker,
    energy_peak: PeakTracker,
    onset: OnsetDetector,

    front: Features,
    back: Features,
}

impl FeatureExtractor {
    /// Creates an extractor after validating the configuration.
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ExtractorConfig) -> Self {
        let onset = OnsetDetector::new(
            config.onset_window_ms,
            config.onset_k,
            config.onset_exit_margin,
            config.onset_min_delta,
        )
        .with_max_hold(config.onset_max_hold_ms);
        Self {
            config,
            origin: Instant::now(),
            last_t: None,
            map: None,
            band_ranges: [0..0, 0..0, 0..0],
            resampled: Vec::new(),
            smoothed: Vec::new(),
            baseline: Vec::new(),
            bin_peaks: Vec::new(),
            energy: AttackDecay::default(),
            rms_peak: PeakTracker::default(),
            energy_peak: PeakTracker::default(),
            onset,
            front: Features::default(),
            back: Features::default(),
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// The most recently produced snapshot.
    pub fn features(&self) -> &Features {
        &self.front
    }

    /// Centre frequencies of the log bins for the last spectrum layout seen.
    pub fn log_frequencies(&self) -> &[f32] {
        self.map
            .as_ref()
            .map(LogFrequencyMap::frequencies)
            .unwrap_or(&[])
    }

    /// Forgets everything learned from previous frames while keeping the
    /// configuration.
    pub fn reset(&mut self) {
        tracing::debug!("resetting feature extractor state");
        self.origin = Instant::now();
        self.last_t = None;
        self.baseline.clear();
        self.bin_peaks.clear();
        self.energy.reset();
        self.rms_peak.reset();
        self.energy_peak.reset();
        self.onset.reset();
        self.front = Features::default();
        self.back = Features::default();
    }

    /// Processes one frame stamped with the time elapsed since the extractor
    /// was created (or last reset).
    pub fn extract(&mut self, spectrum_db: &[f32], loudness_db: f32, sample_rate: f32) -> &Features {
        let t_ms = self.origin.elapsed().as_secs_f32() * 1000.0;
        self.extract_at(t_ms, spectrum_db, loudness_db, sample_rate)
    }

    /// Processes one frame with an explicit timestamp in milliseconds.
    ///
    /// Never fails: an empty spectrum or unusable sample rate yields a
    /// snapshot with empty spectral fields and up-to-date loudness fields.
    pub fn extract_at(
        &mut self,
        t_ms: f32,
        spectrum_db: &[f32],
        loudness_db: f32,
        sample_rate: f32,
    ) -> &Features {
        let (t, dt) = self.advance_clock(t_ms);

        let mut out = std::mem::take(&mut self.back);
        out.t = t;
        out.dt = dt;

        self.process_loudness(&mut out, loudness_db, t, dt);

        if spectrum_db.is_empty() || !(sample_rate.is_finite() && sample_rate > 0.0) {
            out.clear_spectral();
        } else {
            self.process_spectrum(&mut out, spectrum_db, sample_rate, dt);
        }

        self.back = std::mem::replace(&mut self.front, out);
        &self.front
    }

    fn advance_clock(&mut self, t_ms: f32) -> (f32, f32) {
        if !t_ms.is_finite() {
            let t = self.last_t.map(|prev| prev + DEFAULT_DT_MS).unwrap_or(0.0);
            self.last_t = Some(t);
            return (t, DEFAULT_DT_MS);
        }

        let dt = match self.last_t {
            Some(prev) => (t_ms - prev).clamp(0.0, MAX_DT_MS),
            None => DEFAULT_DT_MS,
        };
        self.last_t = Some(t_ms);
        (t_ms, dt)
    }

    fn process_loudness(&mut self, out: &mut Features, loudness_db: f32, t: f32, dt: f32) {
        let cfg = &self.config;

        let (rms_db, rms01) = if loudness_db.is_finite() {
            (
                loudness_db,
                db_to_unit(loudness_db, cfg.loudness_db_min, cfg.loudness_db_max, cfg.gamma),
            )
        } else {
            (cfg.loudness_db_min, 0.0)
        };

        let level_coeff = smoothing_coeff(dt, cfg.level_peak_decay_ms);
        let energy = self.energy.update(rms01, dt, cfg.attack_ms, cfg.decay_ms);

        out.rms_db = rms_db;
        out.rms01 = rms01;
        out.rms_peak01 = self.rms_peak.track(rms01, level_coeff, cfg.level_floor);
        out.energy = energy;
        out.energy_peak01 = self.energy_peak.track(energy, level_coeff, cfg.level_floor);
        out.onset = self.onset.push(t, energy);
    }

    fn process_spectrum(&mut self, out: &mut Features, spectrum_db: &[f32], sample_rate: f32, dt: f32) {
        self.ensure_layout(spectrum_db.len(), sample_rate);
        let Some(map) = self.map.as_ref() else {
            out.clear_spectral();
            return;
        };
        let cfg = &self.config;

        map.resample(spectrum_db, cfg.db_min, cfg.db_max, &mut self.resampled);
        if cfg.spatial_smoothing {
            smooth_circular(&self.resampled, &mut self.smoothed);
            std::mem::swap(&mut self.resampled, &mut self.smoothed);
        }

        let n = self.resampled.len();
        self.baseline.resize(n, 0.0);
        self.bin_peaks.resize(n, 0.0);

        let baseline_coeff = smoothing_coeff(dt, cfg.baseline_tau_ms);
        let peak_coeff = smoothing_coeff(dt, cfg.peak_decay_ms);

        out.bins.clear();
        out.bins_log.clear();
        out.bins_log_raw.clear();

        for i in 0..n {
            let raw = db_to_unit(self.resampled[i], cfg.db_min, cfg.db_max, cfg.gamma);

            let previous = self.baseline[i];
            let deviation = (raw - previous - cfg.deadband).max(0.0);
            let baseline = raw + (previous - raw) * baseline_coeff;
            self.baseline[i] = if baseline.is_finite() { baseline } else { raw };

            let knee = deviation / (cfg.knee + deviation);
            let denoised = clamp01(knee * knee);

            let decayed = self.bin_peaks[i] * peak_coeff;
            let peak = if decayed.is_finite() {
                denoised.max(decayed)
            } else {
                denoised
            };
            self.bin_peaks[i] = peak;
            let normalised = clamp01(denoised / peak.max(cfg.agc_floor));

            out.bins_log_raw.push(raw);
            out.bins_log.push(denoised);
            out.bins.push(normalised);
        }

        out.bands = band_averages(&out.bins_log, &self.band_ranges);
        out.bands_raw = band_averages(&out.bins_log_raw, &self.band_ranges);

        let (centroid, rolloff) = centroid_and_rolloff(map.frequencies(), &out.bins_log);
        out.centroid_hz = centroid;
        out.rolloff_hz = rolloff;
    }

    fn ensure_layout(&mut self, raw_len: usize, sample_rate: f32) {
        if self
            .map
            .as_ref()
            .map(|map| map.matches(raw_len, sample_rate))
            .unwrap_or(false)
        {
            return;
        }

        let cfg = &self.config;
        let map = LogFrequencyMap::new(cfg.f_min, cfg.f_max, cfg.log_bins, raw_len, sample_rate);
        let [low, mid_lo, high_lo, top] = cfg.band_edges_hz;
        self.band_ranges = [
            map.band_range(low, mid_lo, false),
            map.band_range(mid_lo, high_lo, false),
            map.band_range(high_lo, top, true),
        ];
        tracing::debug!(
            raw_len,
            sample_rate,
            log_bins = map.len(),
            "rebuilt log-frequency layout"
        );
        self.map = Some(map);
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::build(ExtractorConfig::default())
    }
}

impl fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("log_bins", &self.config.log_bins)
            .field("last_t", &self.last_t)
            .field("layout", &self.map.as_ref().map(LogFrequencyMap::len))
            .field("energy", &self.energy.value())
            .field("onset", &self.onset.is_active())
            .finish()
    }
}

fn band_averages(values: &[f32], ranges: &[Range<usize>; 3]) -> Bands {
    let average = |range: &Range<usize>| {
        let slice = values.get(range.clone()).unwrap_or(&[]);
        if slice.is_empty() {
            0.0
        } else {
            clamp01(slice.iter().sum::<f32>() / slice.len() as f32)
        }
    };
    Bands {
        low: average(&ranges[0]),
        mid: average(&ranges[1]),
        high: average(&ranges[2]),
    }
}

fn centroid_and_rolloff(frequencies: &[f32], weights: &[f32]) -> (f32, f32) {
    let total: f32 = weights.iter().sum();
    if !(total > WEIGHT_EPSILON) {
        return (0.0, 0.0);
    }

    let weighted: f32 = frequencies
        .iter()
        .zip(weights)
        .map(|(f, w)| f * w)
        .sum();
    let centroid = weighted / total;

    let threshold = total * ROLLOFF_FRACTION;
    let mut cumulative = 0.0;
    let mut rolloff = frequencies.last().copied().unwrap_or(0.0);
    for (f, w) in frequencies.iter().zip(weights) {
        cumulative += w;
        if cumulative >= threshold {
            rolloff = *f;
            break;
        }
    }

    let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
    (finite(centroid), finite(rolloff))
}
