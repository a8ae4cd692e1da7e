use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PowerTrackerConfig {
    /// Time without any change after which a reading counts as stable.
    pub settle_ms: u64,
    /// Period at which an unchanged stable reading is re-confirmed.
    pub recheck_ms: u64,
    /// Distance from the stable value treated as a genuine step change.
    pub step_threshold_w: f32,
    pub min_alternations: u32,
    pub max_rising_run: u32,
    pub max_power_in_off_state_w: f32,
}

impl Default for PowerTrackerConfig {
    fn default() -> Self {
        Self {
            settle_ms: 20_000,
            recheck_ms: 10_000,
            step_threshold_w: 100.0,
            min_alternations: 4,
            max_rising_run: 6,
            max_power_in_off_state_w: 20.0,
        }
    }
}

impl PowerTrackerConfig {
    pub fn sanitize(&mut self) {
        self.settle_ms = self.settle_ms.clamp(1_000, 600_000);
        self.recheck_ms = self.recheck_ms.clamp(1_000, 3_600_000);
        if !self.step_threshold_w.is_finite() || self.step_threshold_w <= 0.0 {
            self.step_threshold_w = 100.0;
        }
        if !self.max_power_in_off_state_w.is_finite() || self.max_power_in_off_state_w < 0.0 {
            self.max_power_in_off_state_w = 20.0;
        }
        self.min_alternations = self.min_alternations.max(1);
        self.max_rising_run = self.max_rising_run.max(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerClass {
    Unknown,
    Rising,
    Falling,
    Stable,
}

/// Why a reading was declared stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StableReason {
    Settled,
    Recheck,
    Step,
    Oscillation,
    RisingRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StablePower {
    pub watts: f32,
    pub reason: StableReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Run {
    count: u32,
    total: f32,
}

impl Run {
    fn push(&mut self, delta: f32) {
        self.count += 1;
        self.total += delta;
    }
}

#[derive(Debug, Clone)]
pub struct PowerTracker {
    config: PowerTrackerConfig,
    initialized: bool,
    classification: PowerClass,
    last_value: f32,
    last_change_ms: u64,
    stable_value: f32,
    rising: Run,
    falling: Run,
}

impl PowerTracker {
    pub fn new(config: PowerTrackerConfig) -> Self {
        Self {
            config,
            initialized: false,
            classification: PowerClass::Unknown,
            last_value: 0.0,
            last_change_ms: 0,
            stable_value: 0.0,
            rising: Run::default(),
            falling: Run::default(),
        }
    }

    pub fn config(&self) -> &PowerTrackerConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Seeds the stable value and starts accepting samples.
    pub fn initialize(&mut self, seed: f32, now_ms: u64) {
        self.initialized = true;
        self.stabilize(seed, now_ms);
    }

    /// Stops accepting samples until the next `initialize`. The last stable
    /// value is kept.
    pub fn reset(&mut self) {
        self.initialized = false;
    }

    pub fn classification(&self) -> PowerClass {
        self.classification
    }

    pub fn is_power_stable(&self) -> bool {
        self.classification == PowerClass::Stable
    }

    pub fn is_power_unknown(&self) -> bool {
        self.classification == PowerClass::Unknown
    }

    pub fn last_value(&self) -> f32 {
        self.last_value
    }

    pub fn stable_value(&self) -> f32 {
        self.stable_value
    }

    pub fn power_on(&self) -> bool {
        self.last_value > self.config.max_power_in_off_state_w
    }

    pub fn set_power(&mut self, sample: f32, now_ms: u64) -> Option<StablePower> {
        if !self.initialized || !sample.is_finite() {
            return None;
        }

        if sample != self.last_value {
            return self.track_change(sample, now_ms);
        }

        let elapsed = now_ms.saturating_sub(self.last_change_ms);

        if self.classification == PowerClass::Stable {
            if elapsed < self.config.recheck_ms {
                return None;
            }
            debug!("[power_tracker]: {sample:.2}W still stable, rechecking");
            self.last_change_ms = now_ms;
            return Some(StablePower {
                watts: sample,
                reason: StableReason::Recheck,
            });
        }

        if elapsed >= self.config.settle_ms {
            debug!("[power_tracker]: {sample:.2}W settled");
            self.stabilize(sample, now_ms);
            return Some(StablePower {
                watts: sample,
                reason: StableReason::Settled,
            });
        }
        None
    }

    fn track_change(&mut self, sample: f32, now_ms: u64) -> Option<StablePower> {
        if sample > self.last_value {
            self.classification = PowerClass::Rising;
            self.rising.push(sample - self.last_value);
        } else {
            self.classification = PowerClass::Falling;
            self.falling.push(self.last_value - sample);
        }

        let distance = (sample - self.stable_value).abs();
        let reason = if sample - self.stable_value > self.config.step_threshold_w {
            Some(StableReason::Step)
        } else if self.is_oscillating(distance) {
            Some(StableReason::Oscillation)
        } else if self.rising.count > self.config.max_rising_run {
            Some(StableReason::RisingRun)
        } else {
            None
        };

        if let Some(reason) = reason {
            debug!(
                "[power_tracker]: {sample:.2}W stable ({reason:?}), was {:.2}W",
                self.stable_value
            );
            self.stabilize(sample, now_ms);
            return Some(StablePower {
                watts: sample,
                reason,
            });
        }

        self.last_value = sample;
        self.last_change_ms = now_ms;
        None
    }

    // Count-weighted net movement; zero or equal to the distance already
    // moved from the stable value means the signal is circling a new level.
    fn is_oscillating(&self, distance: f32) -> bool {
        let changes = self.rising.count + self.falling.count;
        if changes <= self.config.min_alternations {
            return false;
        }
        let net = (self.rising.count as f32 * self.rising.total
            - self.falling.count as f32 * self.falling.total)
            .abs();
        net == 0.0 || net == distance
    }

    fn stabilize(&mut self, value: f32, now_ms: u64) {
        debug!(
            "[power_tracker]: stable {:.2}W -> {value:.2}W, rising: {}/{:.2}, falling: {}/{:.2}",
            self.stable_value,
            self.rising.count,
            self.rising.total,
            self.falling.count,
            self.falling.total
        );
        self.classification = PowerClass::Stable;
        self.last_change_ms = now_ms;
        self.stable_value = value;
        self.last_value = value;
        self.rising = Run::default();
        self.falling = Run::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(seed: f32) -> PowerTracker {
        let mut tracker = PowerTracker::new(PowerTrackerConfig::default());
        tracker.initialize(seed, 0);
        tracker
    }

    #[test]
    fn ignores_samples_until_initialized() {
        let mut tracker = PowerTracker::new(PowerTrackerConfig::default());
        assert!(tracker.is_power_unknown());
        assert_eq!(tracker.set_power(500.0, 1_000), None);
        assert!(tracker.is_power_unknown());

        tracker.initialize(0.0, 1_000);
        assert!(tracker.is_power_stable());
        assert!(tracker.set_power(500.0, 2_000).is_some());
    }

    #[test]
    fn ignores_nan() {
        let mut tracker = tracker(10.0);
        assert_eq!(tracker.set_power(f32::NAN, 50_000), None);
        assert_eq!(tracker.last_value(), 10.0);
    }

    #[test]
    fn constant_stream_settles_once() {
        let mut tracker = tracker(0.0);
        let mut fired = Vec::new();
        // one sample per second for 25s, all at 50W
        for second in 1..=25u64 {
            if let Some(stable) = tracker.set_power(50.0, second * 1_000) {
                fired.push((second, stable));
            }
        }

        assert_eq!(fired.len(), 1);
        let (second, stable) = fired[0];
        assert_eq!(second, 21);
        assert_eq!(stable.watts, 50.0);
        assert_eq!(stable.reason, StableReason::Settled);
    }

    #[test]
    fn large_rise_stabilizes_immediately() {
        let mut tracker = tracker(0.0);
        let stable = tracker.set_power(250.0, 10).unwrap();
        assert_eq!(stable.reason, StableReason::Step);
        assert_eq!(tracker.stable_value(), 250.0);
    }

    #[test]
    fn large_drop_waits_for_settle() {
        let mut tracker = tracker(400.0);
        assert_eq!(tracker.set_power(5.0, 1_000), None);
        assert_eq!(tracker.classification(), PowerClass::Falling);
        assert_eq!(tracker.stable_value(), 400.0);
        assert!(!tracker.power_on());

        assert_eq!(tracker.set_power(5.0, 20_999), None);
        let settled = tracker.set_power(5.0, 21_000).unwrap();
        assert_eq!(settled.watts, 5.0);
        assert_eq!(settled.reason, StableReason::Settled);
        assert_eq!(tracker.stable_value(), 5.0);
    }

    #[test]
    fn alternating_stream_stabilizes_quickly() {
        let mut tracker = tracker(300.0);
        let samples = [310.0, 300.0, 310.0, 300.0, 310.0, 300.0];
        let mut result = None;
        for (index, sample) in samples.into_iter().enumerate() {
            result = tracker.set_power(sample, (index as u64 + 1) * 1_000);
            if result.is_some() {
                break;
            }
        }

        let stable = result.unwrap();
        assert_eq!(stable.reason, StableReason::Oscillation);
        assert!(tracker.is_power_stable());
        assert!(tracker.stable_value() >= 300.0 && tracker.stable_value() <= 310.0);
    }

    #[test]
    fn rising_drift_stabilizes_after_bound() {
        let mut tracker = tracker(100.0);
        let mut result = None;
        let mut steps = 0;
        for step in 1..=10u32 {
            let sample = 100.0 + step as f32 * 5.0;
            steps = step;
            result = tracker.set_power(sample, step as u64 * 500);
            if result.is_some() {
                break;
            }
        }

        assert_eq!(steps, 7);
        assert_eq!(result.unwrap().reason, StableReason::RisingRun);
        assert_eq!(tracker.stable_value(), 135.0);
    }

    #[test]
    fn stable_value_is_rechecked_periodically() {
        let mut tracker = tracker(40.0);
        assert_eq!(tracker.set_power(40.0, 9_999), None);
        let recheck = tracker.set_power(40.0, 10_000).unwrap();
        assert_eq!(recheck.reason, StableReason::Recheck);
        assert_eq!(tracker.set_power(40.0, 15_000), None);
        assert!(tracker.set_power(40.0, 20_000).is_some());
    }

    #[test]
    fn off_to_on_scenario() {
        let mut tracker = tracker(0.0);
        for second in 1..=5u64 {
            tracker.set_power(5.0, second * 1_000);
        }
        // settle window passes with the unit idling at 5W
        let settled = tracker.set_power(5.0, 26_000).unwrap();
        assert_eq!(settled.watts, 5.0);
        assert!(!tracker.power_on());

        let jump = tracker.set_power(400.0, 26_500).unwrap();
        assert_eq!(jump.watts, 400.0);
        assert_eq!(jump.reason, StableReason::Step);
        assert!(tracker.power_on());
    }

    #[test]
    fn reset_keeps_stable_value_until_reseeded() {
        let mut tracker = tracker(120.0);
        tracker.reset();
        assert!(!tracker.is_initialized());
        assert_eq!(tracker.set_power(900.0, 1_000), None);
        assert_eq!(tracker.stable_value(), 120.0);

        tracker.initialize(900.0, 2_000);
        assert_eq!(tracker.stable_value(), 900.0);
        assert!(tracker.power_on());
    }

    #[test]
    fn sanitize_restores_usable_thresholds() {
        let mut config = PowerTrackerConfig {
            settle_ms: 0,
            step_threshold_w: f32::NAN,
            min_alternations: 0,
            ..PowerTrackerConfig::default()
        };
        config.sanitize();
        assert_eq!(config.settle_ms, 1_000);
        assert_eq!(config.step_threshold_w, 100.0);
        assert_eq!(config.min_alternations, 1);
    }
}
