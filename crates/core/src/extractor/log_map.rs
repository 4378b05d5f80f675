use std::ops::Range;

use super::smoothing::sanitize_db;

/// Geometric mapping from a linear spectrum onto log-spaced output bins.
///
/// Raw bin `k` of an `N` bin spectrum sits at `k * nyquist / N`. Each output
/// bin stores its centre frequency and the fractional raw index it reads
/// from; positions are clamped to the raw range so edges never wrap.
#[derive(Debug, Clone)]
pub struct LogFrequencyMap {
    raw_len: usize,
    sample_rate: f32,
    frequencies: Vec<f32>,
    positions: Vec<f32>,
}

impl LogFrequencyMap {
    pub fn new(f_min: f32, f_max: f32, log_bins: usize, raw_len: usize, sample_rate: f32) -> Self {
        let nyquist = sample_rate * 0.5;
        let hi = f_max.min(nyquist);
        let mut lo = f_min.max(1.0);
        if lo >= hi {
            lo = hi * 0.5;
        }

        let mut frequencies = Vec::with_capacity(log_bins);
        if log_bins == 1 {
            frequencies.push(lo);
        } else {
            let ratio = hi / lo;
            let last = (log_bins - 1) as f32;
            for i in 0..log_bins {
                frequencies.push(lo * ratio.powf(i as f32 / last));
            }
            if let Some(top) = frequencies.last_mut() {
                *top = hi;
            }
        }

        let max_index = raw_len.saturating_sub(1) as f32;
        let positions = frequencies
            .iter()
            .map(|f| (f * raw_len as f32 / nyquist).clamp(0.0, max_index))
            .collect();

        Self {
            raw_len,
            sample_rate,
            frequencies,
            positions,
        }
    }

    /// Whether this map was built for the given spectrum layout.
    pub fn matches(&self, raw_len: usize, sample_rate: f32) -> bool {
        self.raw_len == raw_len && self.sample_rate == sample_rate
    }

    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Linearly interpolates `raw` at every output position, writing
    /// sanitized decibel values into `out`.
    pub fn resample(&self, raw: &[f32], db_floor: f32, db_ceil: f32, out: &mut Vec<f32>) {
        out.clear();
        if raw.is_empty() {
            return;
        }
        let last = raw.len() - 1;
        for &pos in &self.positions {
            let i0 = (pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let frac = pos - i0 as f32;
            let a = sanitize_db(raw[i0], db_floor, db_ceil);
            let b = sanitize_db(raw[i1], db_floor, db_ceil);
            out.push(a + (b - a) * frac);
        }
    }

    /// Output bins whose centre frequency lies in `[lo_hz, hi_hz)`, or
    /// `[lo_hz, hi_hz]` when `inclusive_top` is set.
    pub fn band_range(&self, lo_hz: f32, hi_hz: f32, inclusive_top: bool) -> Range<usize> {
        let start = self.frequencies.partition_point(|&f| f < lo_hz);
        let end = if inclusive_top {
            self.frequencies.partition_point(|&f| f <= hi_hz)
        } else {
            self.frequencies.partition_point(|&f| f < hi_hz)
        };
        start..end.max(start)
    }
}

/// 3-tap `[0.25, 0.5, 0.25]` smoothing with wraparound at the ends.
pub fn smooth_circular(values: &[f32], out: &mut Vec<f32>) {
    out.clear();
    let n = values.len();
    if n < 3 {
        out.extend_from_slice(values);
        return;
    }
    for i in 0..n {
        let prev = values[(i + n - 1) % n];
        let next = values[(i + 1) % n];
        out.push(0.25 * prev + 0.5 * values[i] + 0.25 * next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequencies_increase_strictly() {
        for &(bins, rate) in &[(128, 44_100.0), (8, 44_100.0), (64, 8_000.0), (2, 48_000.0)] {
            let map = LogFrequencyMap::new(20.0, 8_000.0, bins, 1024, rate);
            assert_eq!(map.len(), bins);
            for pair in map.frequencies().windows(2) {
                assert!(pair[1] > pair[0], "{pair:?} not increasing");
            }
            for pair in map.positions().windows(2) {
                assert!(pair[1] >= pair[0]);
            }
        }
    }

    #[test]
    fn clamps_top_frequency_to_nyquist() {
        let map = LogFrequencyMap::new(20.0, 8_000.0, 16, 256, 8_000.0);
        assert_eq!(*map.frequencies().last().unwrap(), 4_000.0);
        assert_eq!(map.frequencies()[0], 20.0);
    }

    #[test]
    fn clamps_low_frequency_to_one_hertz() {
        let map = LogFrequencyMap::new(0.0, 8_000.0, 4, 256, 44_100.0);
        assert_eq!(map.frequencies()[0], 1.0);
    }

    #[test]
    fn interpolates_between_neighbours_without_wrapping() {
        // 4 raw bins over a 400 Hz nyquist: 100 Hz per bin.
        let map = LogFrequencyMap::new(150.0, 400.0, 2, 4, 800.0);
        let raw = [-100.0, -60.0, -20.0, -40.0];
        let mut out = Vec::new();
        map.resample(&raw, -100.0, -30.0, &mut out);

        // 150 Hz sits halfway between bins 1 and 2.
        assert!((out[0] - -40.0).abs() < 1e-4);
        // 400 Hz clamps onto the last bin instead of wrapping to bin 0.
        assert!((out[1] - -40.0).abs() < 1e-4);
    }

    #[test]
    fn resampling_replaces_silence_with_floor() {
        let map = LogFrequencyMap::new(20.0, 8_000.0, 8, 16, 44_100.0);
        let raw = vec![f32::NEG_INFINITY; 16];
        let mut out = Vec::new();
        map.resample(&raw, -100.0, -30.0, &mut out);
        assert!(out.iter().all(|&v| v == -100.0));
    }

    #[test]
    fn band_ranges_partition_the_bins() {
        let map = LogFrequencyMap::new(20.0, 8_000.0, 8, 1024, 44_100.0);
        let low = map.band_range(20.0, 160.0, false);
        let mid = map.band_range(160.0, 2_000.0, false);
        let high = map.band_range(2_000.0, 8_000.0, true);
        assert_eq!(low, 0..3);
        assert_eq!(mid, 3..6);
        assert_eq!(high, 6..8);
    }

    #[test]
    fn circular_smoothing_wraps_edges() {
        let mut out = Vec::new();
        smooth_circular(&[4.0, 0.0, 0.0, 0.0], &mut out);
        assert_eq!(out, vec![2.0, 1.0, 0.0, 1.0]);

        smooth_circular(&[1.0, 2.0], &mut out);
        assert_eq!(out, vec![1.0, 2.0]);
    }
}
