//! Hysteresis-qualified edge trigger with sub-sample interpolation.

use serde::{Deserialize, Serialize};

/// Minimum prior separation from the trigger level, in display units.
pub const HYSTERESIS: f32 = 0.02;
/// How far behind a candidate crossing the hysteresis check may look.
pub const MAX_LOOKBACK: usize = 16_000;

// Search bounds for a full-size window; smaller windows scale them down.
const SEARCH_START: usize = 1_000;
const SEARCH_END_BIAS: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    #[default]
    Rising,
    Falling,
}

/// Trigger settings for one frame. `level` is in raw units of the source channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub source_channel: usize,
    pub edge: Edge,
    pub level: f32,
    pub enabled: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            source_channel: 0,
            edge: Edge::Rising,
            level: 0.0,
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TriggerLocator {
    hysteresis: f32,
    lookback: usize,
}

impl Default for TriggerLocator {
    fn default() -> Self {
        Self {
            hysteresis: HYSTERESIS,
            lookback: MAX_LOOKBACK,
        }
    }
}

impl TriggerLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hysteresis(mut self, hysteresis: f32) -> Self {
        self.hysteresis = hysteresis.max(0.0);
        self
    }

    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    /// Returns `(start, end)` such that candidates `i` in `start..end` are
    /// examined from `end - 1` downwards, or `None` if the window is too short.
    pub fn search_range(&self, len: usize) -> Option<(usize, usize)> {
        let start = SEARCH_START.min(len / 32).max(1);
        let end = len / 2 + SEARCH_END_BIAS.min(len / 16);
        (end > start && end < len).then_some((start, end))
    }

    /// Finds the most recent qualifying crossing of `target` in `window`.
    ///
    /// The result is a fractional sample index; `None` means not found.
    pub fn locate(&self, window: &[f32], edge: Edge, target: f32) -> Option<f64> {
        let (start, end) = self.search_range(window.len())?;

        for i in (start..end).rev() {
            let (prev, curr) = (window[i - 1], window[i]);
            let crosses = match edge {
                Edge::Rising => prev < target && curr >= target,
                Edge::Falling => prev > target && curr <= target,
            };
            if crosses && self.separated_before(window, i, edge, target) {
                let span = curr - prev;
                let frac = if span != 0.0 {
                    (target - prev) / span
                } else {
                    0.0
                };
                return Some((i - 1) as f64 + f64::from(frac));
            }
        }

        None
    }

    // True if, walking back from `crossing - 1` to at most `lookback` samples
    // before `crossing`, the signal leaves the hysteresis band on the far side
    // before it returns to the trigger side of `target`.
    fn separated_before(&self, window: &[f32], crossing: usize, edge: Edge, target: f32) -> bool {
        let floor = crossing.saturating_sub(self.lookback);
        for &sample in window[floor..crossing].iter().rev() {
            match edge {
                Edge::Rising => {
                    if sample <= target - self.hysteresis {
                        return true;
                    }
                    if sample >= target {
                        return false;
                    }
                }
                Edge::Falling => {
                    if sample >= target + self.hysteresis {
                        return true;
                    }
                    if sample <= target {
                        return false;
                    }
                }
            }
        }
        false
    }
}

/// Holds the last trigger result while acquisition is stopped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerHold {
    frozen: Option<f64>,
    primed: bool,
}

impl TriggerHold {
    /// Recomputes via `locate` while running; otherwise returns the frozen index.
    /// Disabling the trigger clears the held result.
    pub fn update<F>(&mut self, enabled: bool, running: bool, locate: F) -> Option<f64>
    where
        F: FnOnce() -> Option<f64>,
    {
        if !enabled {
            *self = Self::default();
            return None;
        }
        if running || !self.primed {
            self.frozen = locate();
            self.primed = true;
        }
        self.frozen
    }

    pub fn frozen(&self) -> Option<f64> {
        self.frozen
    }
}

/// Acquisition state shown next to the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStatus {
    Stop,
    Free,
    Triggered,
    Auto,
}

impl TriggerStatus {
    pub fn resolve(running: bool, enabled: bool, index: Option<f64>) -> Self {
        match (running, enabled, index) {
            (false, _, _) => Self::Stop,
            (true, false, _) => Self::Free,
            (true, true, Some(_)) => Self::Triggered,
            (true, true, None) => Self::Auto,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Stop => "Stop",
            Self::Free => "Free",
            Self::Triggered => "Trig'd",
            Self::Auto => "Auto",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    const LEN: usize = 8_192;

    fn sine(len: usize, period: f32, phase_origin: f32, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|n| amplitude * (TAU * (n as f32 - phase_origin) / period).sin())
            .collect()
    }

    fn latest_crossing(first: f32, period: f32, end: usize) -> f64 {
        let limit = (end - 1) as f32;
        let cycles = ((limit - first) / period).floor();
        f64::from(first + cycles * period)
    }

    #[test]
    fn rising_sine_crossing_is_interpolated() {
        let (period, origin) = (300.0, 37.3);
        let window = sine(LEN, period, origin, 0.5);
        let locator = TriggerLocator::new();
        let (_, end) = locator.search_range(LEN).unwrap();

        let index = locator.locate(&window, Edge::Rising, 0.0).expect("trigger");
        let expected = latest_crossing(origin, period, end);
        assert!(
            (index - expected).abs() < 0.01,
            "expected {expected}, got {index}"
        );
    }

    #[test]
    fn falling_sine_crossing_is_interpolated() {
        let (period, origin) = (256.0, 11.75);
        let window = sine(LEN, period, origin, 0.8);
        let locator = TriggerLocator::new();
        let (_, end) = locator.search_range(LEN).unwrap();

        let index = locator.locate(&window, Edge::Falling, 0.0).expect("trigger");
        let expected = latest_crossing(origin + period / 2.0, period, end);
        assert!(
            (index - expected).abs() < 0.01,
            "expected {expected}, got {index}"
        );
    }

    #[test]
    fn nonzero_level_is_respected() {
        let window = sine(LEN, 400.0, 0.0, 1.0);
        let index = TriggerLocator::new()
            .locate(&window, Edge::Rising, 0.5)
            .expect("trigger");
        let sample = index.floor() as usize;
        assert!(window[sample] < 0.5 && window[sample + 1] >= 0.5);
    }

    #[test]
    fn flat_signal_is_not_found() {
        let window = vec![0.0; LEN];
        let locator = TriggerLocator::new();
        assert_eq!(locator.locate(&window, Edge::Rising, 0.0), None);
        assert_eq!(locator.locate(&window, Edge::Falling, 0.0), None);
    }

    #[test]
    fn chatter_inside_hysteresis_band_is_rejected() {
        let window: Vec<f32> = (0..LEN)
            .map(|n| if n % 2 == 0 { 0.005 } else { -0.005 })
            .collect();
        assert_eq!(TriggerLocator::new().locate(&window, Edge::Rising, 0.0), None);
    }

    #[test]
    fn lookback_limit_bounds_hysteresis_search() {
        // One deep dip far in the past, then chatter right up to a clean step.
        let mut window = vec![-0.005; LEN];
        window[10] = -1.0;
        let step = 4_000;
        for sample in &mut window[step..] {
            *sample = 1.0;
        }

        let wide = TriggerLocator::new();
        let index = wide.locate(&window, Edge::Rising, 0.0).expect("trigger");
        assert!((index - (step - 1) as f64 - 0.005).abs() < 1e-3);

        let narrow = TriggerLocator::new().with_lookback(100);
        assert_eq!(narrow.locate(&window, Edge::Rising, 0.0), None);
    }

    #[test]
    fn lookback_reaches_exactly_its_length() {
        let step = 4_000;
        let mut window = vec![-0.005; LEN];
        for sample in &mut window[step..] {
            *sample = 1.0;
        }
        let locator = TriggerLocator::new().with_lookback(100);

        window[step - 100] = -1.0;
        assert!(locator.locate(&window, Edge::Rising, 0.0).is_some());

        window[step - 100] = -0.005;
        window[step - 101] = -1.0;
        assert_eq!(locator.locate(&window, Edge::Rising, 0.0), None);
    }

    #[test]
    fn crossing_onto_level_lands_on_sample() {
        let locator = TriggerLocator::new();
        let mut window = vec![-1.0; LEN];
        let (_, end) = locator.search_range(LEN).unwrap();
        for sample in &mut window[end - 10..] {
            *sample = 0.0;
        }
        // prev = -1, curr = target: frac = 1.0 exactly.
        let index = locator.locate(&window, Edge::Rising, 0.0).unwrap();
        assert_eq!(index, (end - 10) as f64);
    }

    #[test]
    fn short_window_has_no_search_range() {
        let locator = TriggerLocator::new();
        assert!(locator.search_range(2).is_none());
        assert_eq!(locator.locate(&[0.0, 1.0], Edge::Rising, 0.5), None);
        assert_eq!(locator.search_range(16), Some((1, 9)));
        assert_eq!(locator.search_range(32_768), Some((1_000, 18_384)));
    }

    #[test]
    fn hold_freezes_result_while_stopped() {
        let mut hold = TriggerHold::default();
        assert_eq!(hold.update(true, true, || Some(12.5)), Some(12.5));
        assert_eq!(hold.update(true, false, || Some(99.0)), Some(12.5));
        assert_eq!(hold.update(true, true, || None), None);

        assert_eq!(hold.update(true, true, || Some(3.0)), Some(3.0));
        assert_eq!(hold.update(false, false, || Some(7.0)), None);
        assert_eq!(hold.frozen(), None);
        // First frame after re-enabling computes even while stopped.
        assert_eq!(hold.update(true, false, || Some(7.0)), Some(7.0));
    }

    #[test]
    fn status_labels() {
        assert_eq!(TriggerStatus::resolve(false, true, Some(1.0)), TriggerStatus::Stop);
        assert_eq!(TriggerStatus::resolve(true, false, None), TriggerStatus::Free);
        assert_eq!(TriggerStatus::resolve(true, true, Some(1.0)).label(), "Trig'd");
        assert_eq!(TriggerStatus::resolve(true, true, None), TriggerStatus::Auto);
    }
}
