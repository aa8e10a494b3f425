//! Step Detection Module.
//!
//! Converts a noisy accelerometer magnitude stream into discrete steps:
//! - Stationary gate (near-zero magnitude skips the sample entirely)
//! - Exponential low-pass filter
//! - Fixed-capacity window of filtered values with a warm-up period
//! - Adaptive threshold from the window mean and standard deviation
//! - Rising-edge check and a cooldown so one footfall counts once

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{MotionSample, StepEvent};

/// Configuration for step detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDetectorConfig {
    /// Samples with a raw magnitude below this are treated as "device at rest".
    pub stationary_threshold: f32,
    /// Smoothing factor for the low-pass filter (0-1, lower = more smoothing).
    pub smoothing_alpha: f32,
    /// Number of filtered samples kept for statistics. Detection waits until full.
    pub window_capacity: usize,
    /// Floor for the window standard deviation.
    pub min_std_dev: f32,
    /// Multiplier applied to the standard deviation above the mean.
    pub std_dev_factor: f32,
    /// Static minimum for the dynamic threshold.
    pub min_peak_threshold: f32,
    /// Minimum time between steps in milliseconds (prevents double-counting).
    pub min_step_interval_ms: u64,
    /// Average step length in meters, used for step-derived distance.
    pub average_step_length_m: f64,
}

impl Default for StepDetectorConfig {
    fn default() -> Self {
        Self {
            stationary_threshold: 0.05,
            smoothing_alpha: 0.1,
            window_capacity: 50,
            min_std_dev: 0.1,
            std_dev_factor: 0.5,
            min_peak_threshold: 0.2,
            min_step_interval_ms: 500,
            average_step_length_m: 0.76,
        }
    }
}

/// Mutable state of the detector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepState {
    /// Steps counted since the last reset.
    pub total_steps: u64,
    /// Filtered magnitudes, oldest first.
    pub filter_window: VecDeque<f32>,
    /// Last filter output. `None` until the first non-stationary sample.
    pub previous_filtered: Option<f32>,
    /// Timestamp of the last counted step.
    pub last_step_time_ms: Option<u64>,
}

/// Window statistics used to derive the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f32,
    pub std_dev: f32,
}

/// Step detector using adaptive peak detection.
pub struct StepDetector {
    config: StepDetectorConfig,
    state: StepState,
    dropped_samples: u64,
}

impl StepDetector {
    /// Create a new step detector with the given configuration.
    pub fn new(config: StepDetectorConfig) -> Self {
        let capacity = config.window_capacity;
        Self {
            config,
            state: StepState {
                filter_window: VecDeque::with_capacity(capacity),
                ..StepState::default()
            },
            dropped_samples: 0,
        }
    }

    /// Create a detector that continues from a persisted step count.
    pub fn with_total_steps(config: StepDetectorConfig, total_steps: u64) -> Self {
        let mut detector = Self::new(config);
        detector.state.total_steps = total_steps;
        detector
    }

    /// Process a single motion sample.
    /// Returns a StepEvent if a step was detected, None otherwise.
    pub fn process_sample(&mut self, sample: &MotionSample) -> Option<StepEvent> {
        if !sample.is_well_formed() {
            self.dropped_samples += 1;
            warn!(
                magnitude = sample.accel_magnitude,
                timestamp_ms = sample.timestamp_ms,
                "dropping malformed motion sample"
            );
            return None;
        }

        if sample.accel_magnitude < self.config.stationary_threshold {
            return None;
        }

        let filtered = self.apply_filter(sample.accel_magnitude);
        self.push_window(filtered);

        if !self.is_warmed_up() {
            return None;
        }

        let threshold = self.dynamic_threshold()?;
        if self.is_peak(filtered, threshold) && self.cooldown_elapsed(sample.timestamp_ms) {
            return Some(self.record_step(sample.timestamp_ms, filtered, threshold));
        }

        None
    }

    /// Process a batch of samples and return all detected steps.
    pub fn process_batch(&mut self, samples: &[MotionSample]) -> Vec<StepEvent> {
        samples.iter().filter_map(|s| self.process_sample(s)).collect()
    }

    /// Get the total number of steps detected.
    pub fn total_steps(&self) -> u64 {
        self.state.total_steps
    }

    /// Distance implied by the step count and the configured step length.
    pub fn step_distance_m(&self) -> f64 {
        self.state.total_steps as f64 * self.config.average_step_length_m
    }

    /// True once the filter window holds `window_capacity` samples.
    pub fn is_warmed_up(&self) -> bool {
        self.state.filter_window.len() >= self.config.window_capacity
    }

    pub fn state(&self) -> &StepState {
        &self.state
    }

    pub fn config(&self) -> &StepDetectorConfig {
        &self.config
    }

    /// Malformed samples dropped so far.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    /// Zero the step count. Filter state and cooldown survive so an in-progress
    /// walk is not re-warmed.
    pub fn reset(&mut self) {
        self.state.total_steps = 0;
    }

    /// Mean and standard deviation of the current window, if non-empty.
    pub fn window_stats(&self) -> Option<WindowStats> {
        let window = &self.state.filter_window;
        if window.is_empty() {
            return None;
        }

        let n = window.len() as f32;
        let mean = window.iter().sum::<f32>() / n;
        let variance = window.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / n;

        Some(WindowStats {
            mean,
            std_dev: variance.sqrt(),
        })
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn apply_filter(&mut self, magnitude: f32) -> f32 {
        let alpha = self.config.smoothing_alpha;
        // Seed with the first reading so the filter does not ramp up from zero.
        let filtered = match self.state.previous_filtered {
            Some(previous) => alpha * magnitude + (1.0 - alpha) * previous,
            None => magnitude,
        };
        self.state.previous_filtered = Some(filtered);
        filtered
    }

    fn push_window(&mut self, filtered: f32) {
        let window = &mut self.state.filter_window;
        while window.len() >= self.config.window_capacity {
            window.pop_front();
        }
        window.push_back(filtered);
    }

    fn dynamic_threshold(&self) -> Option<f32> {
        let stats = self.window_stats()?;
        let std_dev = stats.std_dev.max(self.config.min_std_dev);
        let threshold = stats.mean + self.config.std_dev_factor * std_dev;
        Some(threshold.max(self.config.min_peak_threshold))
    }

    fn is_peak(&self, filtered: f32, threshold: f32) -> bool {
        let window = &self.state.filter_window;
        let preceding = match window.len().checked_sub(2).and_then(|i| window.get(i)) {
            Some(v) => *v,
            None => return false,
        };
        filtered > threshold && filtered > preceding
    }

    fn cooldown_elapsed(&self, timestamp_ms: u64) -> bool {
        match self.state.last_step_time_ms {
            Some(last) => timestamp_ms.saturating_sub(last) >= self.config.min_step_interval_ms,
            None => true,
        }
    }

    fn record_step(&mut self, timestamp_ms: u64, filtered: f32, threshold: f32) -> StepEvent {
        self.state.total_steps += 1;
        self.state.last_step_time_ms = Some(timestamp_ms);

        debug!(
            total_steps = self.state.total_steps,
            filtered, threshold, "step detected"
        );

        StepEvent::new(timestamp_ms, filtered, threshold, self.state.total_steps)
    }
}

impl Default for StepDetector {
    fn default() -> Self {
        Self::new(StepDetectorConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
