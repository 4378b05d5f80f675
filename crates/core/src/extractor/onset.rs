use std::collections::VecDeque;

const MAX_HISTORY: usize = 1024;

/// Z-score onset detector with Schmitt-trigger hysteresis.
///
/// A value enters the onset state when it exceeds `mean + k * std` of the
/// preceding window, and leaves only once it falls below
/// `mean - exit_margin`.
///
/// A sustained step up is absorbed into the window mean but never drops
/// below it, so without a hold limit the state stays on for as long as the
/// level holds. [`OnsetDetector::with_max_hold`] forces a release after a
/// fixed time; the detector then stays quiet until the value stops
/// qualifying as an onset, so the same step does not fire twice.
#[derive(Debug, Clone)]
pub struct OnsetDetector {
    window_ms: f32,
    k: f32,
    exit_margin: f32,
    min_delta: f32,
    max_hold_ms: Option<f32>,
    history: VecDeque<(f32, f32)>,
    active: bool,
    entered_at: f32,
    armed: bool,
}

impl OnsetDetector {
    pub fn new(window_ms: f32, k: f32, exit_margin: f32, min_delta: f32) -> Self {
        Self {
            window_ms,
            k,
            exit_margin,
            min_delta,
            max_hold_ms: None,
            history: VecDeque::new(),
            active: false,
            entered_at: 0.0,
            armed: true,
        }
    }

    /// Limits how long one onset may stay active. Zero or a non-finite value
    /// disables the limit.
    pub fn with_max_hold(mut self, max_hold_ms: f32) -> Self {
        self.max_hold_ms = (max_hold_ms.is_finite() && max_hold_ms > 0.0).then_some(max_hold_ms);
        self
    }

    /// Feeds the value observed at `t_ms` and returns the onset state.
    pub fn push(&mut self, t_ms: f32, value: f32) -> bool {
        while let Some(&(stamp, _)) = self.history.front() {
            if t_ms - stamp > self.window_ms {
                self.history.pop_front();
            } else {
                break;
            }
        }

        if let Some((mean, std)) = self.stats() {
            let qualifies = self.history.len() >= 2
                && value > mean + self.k * std
                && value - mean > self.min_delta;
            if self.active {
                if value < mean - self.exit_margin {
                    self.active = false;
                } else if self
                    .max_hold_ms
                    .is_some_and(|hold| t_ms - self.entered_at >= hold)
                {
                    self.active = false;
                    self.armed = false;
                }
            } else if !qualifies {
                self.armed = true;
            } else if self.armed {
                self.active = true;
                self.entered_at = t_ms;
            }
        }

        if value.is_finite() {
            self.history.push_back((t_ms, value));
            if self.history.len() > MAX_HISTORY {
                self.history.pop_front();
            }
        }

        self.active
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.active = false;
        self.armed = true;
    }

    fn stats(&self) -> Option<(f32, f32)> {
        if self.history.is_empty() {
            return None;
        }
        let count = self.history.len() as f32;
        let mean = self.history.iter().map(|&(_, v)| v).sum::<f32>() / count;
        let variance = self
            .history
            .iter()
            .map(|&(_, v)| (v - mean) * (v - mean))
            .sum::<f32>()
            / count;
        Some((mean, variance.max(0.0).sqrt()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> OnsetDetector {
        OnsetDetector::new(1_000.0, 1.5, 0.005, 0.02)
    }

    fn feed(detector: &mut OnsetDetector, t: &mut f32, value: f32) -> bool {
        *t += 16.0;
        detector.push(*t, value)
    }

    #[test]
    fn flat_signal_never_triggers() {
        let mut onset = detector();
        let mut t = 0.0;
        for _ in 0..200 {
            assert!(!feed(&mut onset, &mut t, 0.3));
        }
    }

    #[test]
    fn jump_triggers_and_holds_through_dip() {
        let mut onset = detector();
        let mut t = 0.0;
        for i in 0..60 {
            let wobble = if i % 2 == 0 { 0.01 } else { -0.01 };
            assert!(!feed(&mut onset, &mut t, 0.1 + wobble));
        }

        assert!(feed(&mut onset, &mut t, 0.8));
        assert!(feed(&mut onset, &mut t, 0.8));
        assert!(feed(&mut onset, &mut t, 0.8));

        // Below the entry threshold but above the exit threshold.
        assert!(feed(&mut onset, &mut t, 0.3));
        assert!(feed(&mut onset, &mut t, 0.25));

        assert!(!feed(&mut onset, &mut t, 0.0));
        assert!(!onset.is_active());
    }

    fn step_onset_frames(onset: &mut OnsetDetector) -> Vec<bool> {
        let mut t = 0.0;
        for _ in 0..90 {
            assert!(!feed(onset, &mut t, 0.02));
        }
        (0..600).map(|_| feed(onset, &mut t, 0.7)).collect()
    }

    #[test]
    fn sustained_step_holds_without_a_limit() {
        let mut onset = detector();
        let frames = step_onset_frames(&mut onset);
        assert!(frames.iter().all(|&active| active));
    }

    #[test]
    fn max_hold_releases_a_sustained_step_once() {
        let mut onset = detector().with_max_hold(200.0);
        let frames = step_onset_frames(&mut onset);

        // 200 ms at 16 ms per frame.
        assert!(frames[..13].iter().all(|&active| active));
        assert_eq!(frames.iter().filter(|&&active| active).count(), 13);
        assert!(!onset.is_active());
    }

    #[test]
    fn max_hold_still_fires_on_the_next_jump() {
        let mut onset = detector().with_max_hold(200.0);
        step_onset_frames(&mut onset);

        let mut t = 90.0 * 16.0 + 600.0 * 16.0;
        for _ in 0..70 {
            feed(&mut onset, &mut t, 0.02);
        }
        assert!(!onset.is_active());
        assert!(feed(&mut onset, &mut t, 0.7));
    }

    #[test]
    fn zero_max_hold_means_no_limit() {
        let mut onset = detector().with_max_hold(0.0);
        assert!(step_onset_frames(&mut onset).iter().all(|&active| active));
    }

    #[test]
    fn ignores_tiny_deviations_on_silence() {
        let mut onset = detector();
        let mut t = 0.0;
        for _ in 0..30 {
            feed(&mut onset, &mut t, 0.0);
        }
        assert!(!feed(&mut onset, &mut t, 0.01));
    }

    #[test]
    fn old_entries_leave_the_window() {
        let mut onset = detector();
        onset.push(0.0, 1.0);
        onset.push(10.0, 1.0);
        onset.push(5_000.0, 0.2);
        assert_eq!(onset.history.len(), 1);
    }

    #[test]
    fn reset_clears_state() {
        let mut onset = detector();
        let mut t = 0.0;
        for _ in 0..10 {
            feed(&mut onset, &mut t, 0.0);
        }
        feed(&mut onset, &mut t, 1.0);
        assert!(onset.is_active());
        onset.reset();
        assert!(!onset.is_active());
        assert!(onset.history.is_empty());
    }
}
