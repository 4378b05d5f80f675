use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Result, VizError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub extractor: ExtractorConfig,
    /// Layer ids that are enabled when the driver starts.
    pub active_layers: Vec<String>,
    /// JSON file used to persist layer parameters between runs.
    pub state_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            extractor: ExtractorConfig::default(),
            active_layers: vec!["bars".to_string(), "pulse".to_string()],
            state_path: None,
        }
    }
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields fall back to their
    /// defaults; the result is validated before it is returned.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.extractor.validate()
    }
}

/// Configuration for the spectrum analyser that stands in for the capture
/// backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub fft_size: usize,
    /// Frame-to-frame magnitude smoothing in `[0, 1)`.
    pub smoothing_time_constant: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            fft_size: 2048,
            smoothing_time_constant: 0.8,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(VizError::config("sample_rate must be positive"));
        }
        if self.fft_size < 32 || !self.fft_size.is_power_of_two() {
            return Err(VizError::config(
                "fft_size must be a power of two and at least 32",
            ));
        }
        if !(0.0..1.0).contains(&self.smoothing_time_constant) {
            return Err(VizError::config(
                "smoothing_time_constant must lie in [0, 1)",
            ));
        }
        Ok(())
    }
}

/// Tunables of the feature extractor. All time constants are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub log_bins: usize,
    pub f_min: f32,
    pub f_max: f32,
    pub spatial_smoothing: bool,

    pub db_min: f32,
    pub db_max: f32,
    pub gamma: f32,

    pub baseline_tau_ms: f32,
    pub deadband: f32,
    pub knee: f32,

    pub peak_decay_ms: f32,
    pub agc_floor: f32,

    /// Edges of the low, mid and high bands in Hz. The top edge is inclusive.
    pub band_edges_hz: [f32; 4],

    pub loudness_db_min: f32,
    pub loudness_db_max: f32,
    pub attack_ms: f32,
    pub decay_ms: f32,
    pub level_peak_decay_ms: f32,
    pub level_floor: f32,

    pub onset_window_ms: f32,
    pub onset_k: f32,
    pub onset_exit_margin: f32,
    pub onset_min_delta: f32,
    /// Longest time one onset may stay active. Zero keeps it active until
    /// the level falls back below the window mean.
    pub onset_max_hold_ms: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            log_bins: 128,
            f_min: 20.0,
            f_max: 8_000.0,
            spatial_smoothing: true,

            db_min: -100.0,
            db_max: -30.0,
            gamma: 1.5,

            baseline_tau_ms: 3_000.0,
            deadband: 0.02,
            knee: 0.08,

            peak_decay_ms: 1_500.0,
            agc_floor: 0.05,

            band_edges_hz: [20.0, 160.0, 2_000.0, 8_000.0],

            loudness_db_min: -70.0,
            loudness_db_max: -10.0,
            attack_ms: 40.0,
            decay_ms: 250.0,
            level_peak_decay_ms: 4_000.0,
            level_floor: 0.05,

            onset_window_ms: 1_000.0,
            onset_k: 1.5,
            onset_exit_margin: 0.005,
            onset_min_delta: 0.02,
            onset_max_hold_ms: 0.0,
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_bins == 0 {
            return Err(VizError::config("log_bins must be at least 1"));
        }

        let finite = [
            ("f_min", self.f_min),
            ("f_max", self.f_max),
            ("db_min", self.db_min),
            ("db_max", self.db_max),
            ("gamma", self.gamma),
            ("deadband", self.deadband),
            ("knee", self.knee),
            ("agc_floor", self.agc_floor),
            ("loudness_db_min", self.loudness_db_min),
            ("loudness_db_max", self.loudness_db_max),
            ("level_floor", self.level_floor),
            ("onset_k", self.onset_k),
            ("onset_exit_margin", self.onset_exit_margin),
            ("onset_min_delta", self.onset_min_delta),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(VizError::config(format!("{name} must be finite")));
            }
        }

        let time_constants = [
            ("baseline_tau_ms", self.baseline_tau_ms),
            ("peak_decay_ms", self.peak_decay_ms),
            ("attack_ms", self.attack_ms),
            ("decay_ms", self.decay_ms),
            ("level_peak_decay_ms", self.level_peak_decay_ms),
            ("onset_window_ms", self.onset_window_ms),
        ];
        for (name, value) in time_constants {
            if !(value.is_finite() && value > 0.0) {
                return Err(VizError::config(format!("{name} must be positive")));
            }
        }

        if self.f_max <= 0.0 {
            return Err(VizError::config("f_max must be positive"));
        }
        if self.db_max <= self.db_min {
            return Err(VizError::config("db_max must exceed db_min"));
        }
        if self.loudness_db_max <= self.loudness_db_min {
            return Err(VizError::config(
                "loudness_db_max must exceed loudness_db_min",
            ));
        }
        if self.gamma <= 0.0 {
            return Err(VizError::config("gamma must be positive"));
        }
        if self.knee <= 0.0 || self.agc_floor <= 0.0 || self.level_floor <= 0.0 {
            return Err(VizError::config(
                "knee, agc_floor and level_floor must be positive",
            ));
        }
        if self
            .band_edges_hz
            .windows(2)
            .any(|pair| !(pair[0].is_finite() && pair[0] < pair[1]))
        {
            return Err(VizError::config("band_edges_hz must be increasing"));
        }
        if !(self.onset_max_hold_ms.is_finite() && self.onset_max_hold_ms >= 0.0) {
            return Err(VizError::config(
                "onset_max_hold_ms must be zero or positive",
            ));
        }
        Ok(())
    }
}
