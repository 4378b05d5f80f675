use serde::{Deserialize, Serialize};

/// Averages over the named frequency bands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl Bands {
    pub fn get(&self, name: &str) -> Option<f32> {
        match name {
            "low" => Some(self.low),
            "mid" => Some(self.mid),
            "high" => Some(self.high),
            _ => None,
        }
    }
}

/// Snapshot of the audio features for a single frame.
///
/// Everything ending in `01`, plus `energy`, the band averages and the bin
/// arrays, lies in `[0, 1]`. No field is ever NaN or infinite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    /// Frame timestamp in milliseconds.
    pub t: f32,
    /// Milliseconds since the previous frame.
    pub dt: f32,

    pub rms_db: f32,
    pub rms01: f32,
    pub rms_peak01: f32,

    pub energy: f32,
    pub energy_peak01: f32,

    pub onset: bool,

    /// Band averages after noise-floor removal.
    pub bands: Bands,
    /// Band averages of the mapped spectrum before noise-floor removal.
    pub bands_raw: Bands,

    pub centroid_hz: f32,
    pub rolloff_hz: f32,

    /// Per-bin AGC normalised values.
    pub bins: Vec<f32>,
    /// De-noised (baseline subtracted) values.
    pub bins_log: Vec<f32>,
    /// Mapped values before baseline subtraction.
    pub bins_log_raw: Vec<f32>,
}

impl Features {
    /// Looks up one of the bin arrays by the name used in layer controls.
    pub fn bins_named(&self, name: &str) -> &[f32] {
        match name {
            "binsLog" => &self.bins_log,
            "binsLogRaw" => &self.bins_log_raw,
            _ => &self.bins,
        }
    }

    pub(crate) fn clear_spectral(&mut self) {
        self.bands = Bands::default();
        self.bands_raw = Bands::default();
        self.centroid_hz = 0.0;
        self.rolloff_hz = 0.0;
        self.bins.clear();
        self.bins_log.clear();
        self.bins_log_raw.clear();
    }
}
