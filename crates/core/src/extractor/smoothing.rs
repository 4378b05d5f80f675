//! Frame-rate independent smoothing primitives.
//!
//! Every filter here derives its per-frame coefficient from the elapsed time
//! and a time constant, `exp(-dt / tau)`, so the same input sequence sampled
//! at 30 or 144 frames per second settles on the same curve.

/// Per-frame retention factor for a one-pole filter with time constant
/// `tau_ms`. Returns 0 (no memory) for unusable inputs.
pub fn smoothing_coeff(dt_ms: f32, tau_ms: f32) -> f32 {
    if !(dt_ms.is_finite() && tau_ms.is_finite()) || tau_ms <= 0.0 {
        return 0.0;
    }
    (-dt_ms.max(0.0) / tau_ms).exp()
}

/// Clamps into `[0, 1]`, mapping NaN to 0.
pub fn clamp01(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// `clamp01((db - min) / (max - min)) ^ gamma`.
pub fn db_to_unit(db: f32, db_min: f32, db_max: f32, gamma: f32) -> f32 {
    let range = db_max - db_min;
    if !(range > 0.0) {
        return 0.0;
    }
    let linear = clamp01((db - db_min) / range);
    clamp01(linear.powf(gamma))
}

/// Replaces non-finite decibel readings: silence and NaN fall to `floor`,
/// positive infinity saturates at `ceil`.
pub fn sanitize_db(db: f32, floor: f32, ceil: f32) -> f32 {
    if db.is_finite() {
        db
    } else if db == f32::INFINITY {
        ceil
    } else {
        floor
    }
}

/// Running maximum that decays toward zero between new peaks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakTracker {
    peak: f32,
}

impl PeakTracker {
    /// Folds `value` into the tracker and returns it relative to the
    /// current peak, floor-guarded so near-silence is not blown up to 1.
    pub fn track(&mut self, value: f32, coeff: f32, floor: f32) -> f32 {
        let value = clamp01(value);
        let decayed = self.peak * coeff;
        self.peak = if decayed.is_finite() {
            value.max(decayed)
        } else {
            value
        };
        clamp01(value / self.peak.max(floor))
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }

    pub fn reset(&mut self) {
        self.peak = 0.0;
    }
}

/// One-pole follower with separate rise and fall time constants.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttackDecay {
    value: f32,
}

impl AttackDecay {
    pub fn update(&mut self, target: f32, dt_ms: f32, attack_ms: f32, decay_ms: f32) -> f32 {
        let target = clamp01(target);
        let tau = if target > self.value {
            attack_ms
        } else {
            decay_ms
        };
        let coeff = smoothing_coeff(dt_ms, tau);
        self.value = clamp01(target + (self.value - target) * coeff);
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}
