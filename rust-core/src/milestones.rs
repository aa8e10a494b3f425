//! Threshold-debounced milestone events for distance and steps.
//!
//! Each counter climbs a fixed ladder: the baseline advances by exactly one
//! threshold per event, never snapping to the current total, so a large jump
//! fires once per rung across successive ticks. A per-kind cooldown spaces
//! the events out so one tick can fire at most one event of each kind.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{MilestoneEvent, MilestoneKind};

/// Configuration for milestone dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MilestoneConfig {
    /// Distance ladder step in meters.
    pub distance_threshold_m: f64,
    /// Step ladder increment.
    pub steps_threshold: u64,
    /// Minimum spacing between two events of the same kind.
    pub cooldown_ms: u64,
}

impl Default for MilestoneConfig {
    fn default() -> Self {
        Self {
            distance_threshold_m: 1000.0,
            steps_threshold: 2000,
            cooldown_ms: 1000,
        }
    }
}

/// Ladder position and cooldown references for both counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MilestoneBaseline {
    pub distance_baseline_m: f64,
    pub step_baseline: u64,
    pub last_distance_event_ms: Option<u64>,
    pub last_step_event_ms: Option<u64>,
}

/// Receives milestone notifications. Both methods default to no-ops.
pub trait MilestoneListener {
    fn on_distance_milestone(&mut self, _event: &MilestoneEvent) {}
    fn on_steps_milestone(&mut self, _event: &MilestoneEvent) {}
}

/// Watches the fused distance and step count and fires ladder events.
pub struct MilestoneDispatcher {
    config: MilestoneConfig,
    baseline: MilestoneBaseline,
    distance_rungs: u64,
    step_rungs: u64,
    listeners: Vec<Box<dyn MilestoneListener>>,
}

impl MilestoneDispatcher {
    pub fn new(config: MilestoneConfig) -> Self {
        Self {
            config,
            baseline: MilestoneBaseline::default(),
            distance_rungs: 0,
            step_rungs: 0,
            listeners: Vec::new(),
        }
    }

    /// Start with the ladder already climbed to the given totals, so rungs
    /// earned before a restart are not announced again.
    pub fn seeded(config: MilestoneConfig, fused_total_m: f64, total_steps: u64) -> Self {
        let mut dispatcher = Self::new(config);
        dispatcher.seed(fused_total_m, total_steps);
        dispatcher
    }

    pub fn add_listener(&mut self, listener: Box<dyn MilestoneListener>) {
        self.listeners.push(listener);
    }

    /// Compare both totals against their ladders. At most one event per kind.
    pub fn check(&mut self, fused_total_m: f64, total_steps: u64, now_ms: u64) -> Vec<MilestoneEvent> {
        let mut events = Vec::new();

        if fused_total_m - self.baseline.distance_baseline_m >= self.config.distance_threshold_m
            && cooled_down(self.baseline.last_distance_event_ms, now_ms, self.config.cooldown_ms)
        {
            self.baseline.distance_baseline_m += self.config.distance_threshold_m;
            self.baseline.last_distance_event_ms = Some(now_ms);
            self.distance_rungs += 1;
            events.push(MilestoneEvent {
                kind: MilestoneKind::Distance,
                rung: self.distance_rungs,
                timestamp_ms: now_ms,
            });
        }

        if total_steps.saturating_sub(self.baseline.step_baseline) >= self.config.steps_threshold
            && cooled_down(self.baseline.last_step_event_ms, now_ms, self.config.cooldown_ms)
        {
            self.baseline.step_baseline += self.config.steps_threshold;
            self.baseline.last_step_event_ms = Some(now_ms);
            self.step_rungs += 1;
            events.push(MilestoneEvent {
                kind: MilestoneKind::Steps,
                rung: self.step_rungs,
                timestamp_ms: now_ms,
            });
        }

        for event in &events {
            info!(kind = ?event.kind, rung = event.rung, "milestone reached");
            self.notify(event);
        }

        events
    }

    pub fn baseline(&self) -> &MilestoneBaseline {
        &self.baseline
    }

    pub fn config(&self) -> &MilestoneConfig {
        &self.config
    }

    /// Back to the bottom of both ladders.
    pub fn reset(&mut self) {
        self.baseline = MilestoneBaseline::default();
        self.distance_rungs = 0;
        self.step_rungs = 0;
    }

    fn seed(&mut self, fused_total_m: f64, total_steps: u64) {
        self.reset();
        if self.config.distance_threshold_m > 0.0 && fused_total_m.is_finite() && fused_total_m > 0.0 {
            self.distance_rungs = (fused_total_m / self.config.distance_threshold_m).floor() as u64;
            self.baseline.distance_baseline_m = self.distance_rungs as f64 * self.config.distance_threshold_m;
        }
        if self.config.steps_threshold > 0 {
            self.step_rungs = total_steps / self.config.steps_threshold;
            self.baseline.step_baseline = self.step_rungs * self.config.steps_threshold;
        }
    }

    fn notify(&mut self, event: &MilestoneEvent) {
        for listener in &mut self.listeners {
            match event.kind {
                MilestoneKind::Distance => listener.on_distance_milestone(event),
                MilestoneKind::Steps => listener.on_steps_milestone(event),
            }
        }
    }
}

fn cooled_down(last_event_ms: Option<u64>, now_ms: u64, cooldown_ms: u64) -> bool {
    match last_event_ms {
        Some(last) => now_ms.saturating_sub(last) >= cooldown_ms,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        distance: Rc<RefCell<Vec<u64>>>,
        steps: Rc<RefCell<Vec<u64>>>,
    }

    impl MilestoneListener for Recorder {
        fn on_distance_milestone(&mut self, event: &MilestoneEvent) {
            self.distance.borrow_mut().push(event.rung);
        }

        fn on_steps_milestone(&mut self, event: &MilestoneEvent) {
            self.steps.borrow_mut().push(event.rung);
        }
    }

    fn count_kind(events: &[MilestoneEvent], kind: MilestoneKind) -> usize {
        events.iter().filter(|e| e.kind == kind).count()
    }

    #[test]
    fn test_single_jump_fires_once_per_rung() {
        let mut dispatcher = MilestoneDispatcher::new(MilestoneConfig::default());
        let mut fired = Vec::new();

        fired.extend(dispatcher.check(800.0, 0, 0));
        assert!(fired.is_empty());

        // 800 -> 2500 in one tick, then hold for 5 s of 16 ms ticks.
        let mut now = 16;
        while now <= 5000 {
            fired.extend(dispatcher.check(2500.0, 0, now));
            now += 16;
        }

        assert_eq!(count_kind(&fired, MilestoneKind::Distance), 2);
        assert!(fired[1].timestamp_ms - fired[0].timestamp_ms >= 1000);
        assert_eq!(fired[0].rung, 1);
        assert_eq!(fired[1].rung, 2);
        assert_eq!(dispatcher.baseline().distance_baseline_m, 2000.0);
    }

    #[test]
    fn test_cooldown_blocks_back_to_back_events() {
        let mut dispatcher = MilestoneDispatcher::new(MilestoneConfig::default());
        assert_eq!(dispatcher.check(5000.0, 0, 0).len(), 1);
        assert!(dispatcher.check(5000.0, 0, 999).is_empty());
        assert_eq!(dispatcher.check(5000.0, 0, 1000).len(), 1);
    }

    #[test]
    fn test_steps_ladder() {
        let mut dispatcher = MilestoneDispatcher::new(MilestoneConfig {
            steps_threshold: 100,
            ..MilestoneConfig::default()
        });
        assert!(dispatcher.check(0.0, 99, 0).is_empty());
        let events = dispatcher.check(0.0, 100, 10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, MilestoneKind::Steps);
        assert!(dispatcher.check(0.0, 199, 2000).is_empty());
        assert_eq!(dispatcher.check(0.0, 200, 3000).len(), 1);
    }

    #[test]
    fn test_kinds_have_independent_cooldowns() {
        let mut dispatcher = MilestoneDispatcher::new(MilestoneConfig {
            steps_threshold: 10,
            ..MilestoneConfig::default()
        });
        let events = dispatcher.check(1000.0, 10, 0);
        assert_eq!(count_kind(&events, MilestoneKind::Distance), 1);
        assert_eq!(count_kind(&events, MilestoneKind::Steps), 1);
    }

    #[test]
    fn test_listeners_are_notified() {
        let recorder = Recorder::default();
        let distance = recorder.distance.clone();
        let steps = recorder.steps.clone();

        let mut dispatcher = MilestoneDispatcher::new(MilestoneConfig {
            steps_threshold: 5,
            ..MilestoneConfig::default()
        });
        dispatcher.add_listener(Box::new(recorder));

        dispatcher.check(1200.0, 6, 0);
        assert_eq!(*distance.borrow(), vec![1]);
        assert_eq!(*steps.borrow(), vec![1]);
    }

    #[test]
    fn test_seeded_does_not_refire_earned_rungs() {
        let mut dispatcher = MilestoneDispatcher::seeded(MilestoneConfig::default(), 2300.0, 4100);
        assert_eq!(dispatcher.baseline().distance_baseline_m, 2000.0);
        assert_eq!(dispatcher.baseline().step_baseline, 4000);
        assert!(dispatcher.check(2300.0, 4100, 0).is_empty());

        let events = dispatcher.check(3000.0, 4100, 10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].rung, 3);
    }

    #[test]
    fn test_reset_restarts_ladder() {
        let mut dispatcher = MilestoneDispatcher::new(MilestoneConfig::default());
        dispatcher.check(1500.0, 0, 0);
        dispatcher.reset();
        assert_eq!(dispatcher.baseline(), &MilestoneBaseline::default());
        let events = dispatcher.check(1000.0, 0, 10);
        assert_eq!(events[0].rung, 1);
    }
}
