/// Complete walk tracking pipeline integrating all per-tick stages.
///
/// This module orchestrates the data flow from sampled sensor inputs to the
/// two values the host application displays: fused distance and step count.
///
/// # Architecture
///
/// Each tick runs the stages in a fixed order, with no reentrancy:
/// 1. **Day rollover**: reset everything if the calendar date changed
/// 2. **Geodesic accumulation**: fold in the position fix, if any
/// 3. **Visual accumulation**: fold in the camera pose, if any
/// 4. **Fusion**: recompute the weighted distance
/// 5. **Step detection**: filter the motion sample, maybe count a step
/// 6. **Milestones**: check both ladders
/// 7. **Persistence**: save after milestones or on material change
///
/// A malformed sample is dropped for that tick only; nothing in a tick can
/// fail the engine. The engine is an explicit object owned by the caller:
/// construct on start, call [`WalkEngine::shutdown`] on orderly exit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineResult, PersistenceError};
use crate::fusion::{DistanceFusionEngine, FusionWeights};
use crate::geodesic::{FixOutcome, GeodesicAccumulator};
use crate::milestones::{MilestoneDispatcher, MilestoneListener};
use crate::persistence::PersistenceStore;
use crate::step_detection::{StepDetector, StepState};
use crate::types::*;
use crate::visual::VisualDisplacementAccumulator;

/// Everything sampled for one tick.
///
/// Each sensor field holds the latest known value, or `None` when the source
/// had nothing (no new fix, AR not tracking, no accelerometer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickInput {
    /// Tick time in milliseconds. Drives all cooldowns.
    pub now_ms: u64,
    pub position: Option<PositionFix>,
    pub pose: Option<CameraPose>,
    pub motion: Option<MotionSample>,
    /// Phase of the location link this tick.
    pub gps_link: LinkPhase,
    /// False when the platform has no accelerometer.
    pub motion_supported: bool,
}

impl Default for TickInput {
    fn default() -> Self {
        Self {
            now_ms: 0,
            position: None,
            pose: None,
            motion: None,
            gps_link: LinkPhase::Running,
            motion_supported: true,
        }
    }
}

impl TickInput {
    /// An input carrying nothing but the tick time.
    pub fn at(now_ms: u64) -> Self {
        Self {
            now_ms,
            ..Self::default()
        }
    }

    pub fn with_position(mut self, fix: PositionFix) -> Self {
        self.position = Some(fix);
        self
    }

    pub fn with_pose(mut self, pose: CameraPose) -> Self {
        self.pose = Some(pose);
        self
    }

    pub fn with_motion(mut self, sample: MotionSample) -> Self {
        self.motion = Some(sample);
        self
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub step: Option<StepEvent>,
    pub milestones: Vec<MilestoneEvent>,
    /// The calendar date changed and all counters were reset.
    pub day_rolled_over: bool,
    /// A save was attempted and succeeded this tick.
    pub saved: bool,
    /// A save was attempted and failed; in-memory state is unaffected.
    pub save_failed: bool,
    /// Samples dropped as malformed this tick.
    pub dropped_samples: u32,
}

/// Read-only view for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub distance: DistanceState,
    pub total_steps: u64,
    pub step_distance_m: f64,
    pub health: SourceHealth,
    pub session_date: NaiveDate,
}

/// The walk tracking engine.
pub struct WalkEngine {
    config: EngineConfig,

    // Processing stages
    geodesic: GeodesicAccumulator,
    visual: VisualDisplacementAccumulator,
    fusion: DistanceFusionEngine,
    steps: StepDetector,
    milestones: MilestoneDispatcher,
    store: PersistenceStore,

    // Published state
    distance: DistanceState,
    health: SourceHealth,
    session_date: NaiveDate,

    // AR outage tracking
    first_tick_ms: Option<u64>,
    last_pose_tick_ms: Option<u64>,
    ar_lost_reported: bool,

    // Totals at the last save attempt
    saved_fused_m: f64,
    saved_steps: u64,

    tick_count: u64,
}

impl WalkEngine {
    /// Validate the config, load today's record and build every stage.
    pub fn new(config: EngineConfig, mut store: PersistenceStore) -> EngineResult<Self> {
        config.validate()?;

        let loaded = store.load();
        let record = loaded.record;
        let session_date = record.last_save_date.unwrap_or_else(|| store.today());

        let fusion = DistanceFusionEngine::new(config.fusion);
        let mut distance = DistanceState {
            gps_total_m: record.gps_total_meters,
            ar_total_m: record.ar_total_meters,
            fused_total_m: 0.0,
        };
        fusion.recompute(&mut distance);
        let total_steps = record.steps();

        info!(
            fused_total_m = distance.fused_total_m,
            total_steps,
            rolled_over = loaded.rolled_over,
            "walk engine started"
        );

        Ok(Self {
            geodesic: GeodesicAccumulator::with_total(config.geodesic.clone(), distance.gps_total_m),
            visual: VisualDisplacementAccumulator::with_total(config.visual.clone(), distance.ar_total_m),
            fusion,
            steps: StepDetector::with_total_steps(config.steps.clone(), total_steps),
            milestones: MilestoneDispatcher::seeded(
                config.milestones.clone(),
                distance.fused_total_m,
                total_steps,
            ),
            store,
            distance,
            health: SourceHealth::default(),
            session_date,
            first_tick_ms: None,
            last_pose_tick_ms: None,
            ar_lost_reported: false,
            saved_fused_m: distance.fused_total_m,
            saved_steps: total_steps,
            tick_count: 0,
            config,
        })
    }

    /// Run one tick over the sampled inputs.
    pub fn tick(&mut self, input: &TickInput) -> TickReport {
        let now_ms = input.now_ms;
        let mut report = TickReport::default();
        self.tick_count += 1;
        self.first_tick_ms.get_or_insert(now_ms);

        // Stage 1: Day rollover
        let today = self.store.today();
        if today != self.session_date {
            info!(previous = %self.session_date, %today, "day rolled over mid-session");
            report.day_rolled_over = true;
            self.reset_in_memory(today);
            self.save_into(&mut report);
        }

        // Stage 2: Geodesic accumulation
        self.health.gps = input.gps_link;
        if let Some(fix) = &input.position {
            if self.geodesic.update(fix) == FixOutcome::Malformed {
                warn!(?fix, "dropping malformed position fix");
                report.dropped_samples += 1;
            }
        }

        // Stage 3: Visual accumulation
        match &input.pose {
            Some(pose) => {
                if self.visual.update(pose).is_some() {
                    self.mark_ar_tracking(now_ms);
                } else {
                    warn!(?pose, "dropping malformed camera pose");
                    report.dropped_samples += 1;
                    self.mark_ar_silent(now_ms);
                }
            }
            None => self.mark_ar_silent(now_ms),
        }

        // Stage 4: Fusion
        self.distance.gps_total_m = self.geodesic.total_m();
        self.distance.ar_total_m = self.visual.total_m();
        self.fusion.recompute(&mut self.distance);

        // Stage 5: Step detection
        if let Some(sample) = &input.motion {
            let dropped_before = self.steps.dropped_samples();
            report.step = self.steps.process_sample(sample);
            if self.steps.dropped_samples() != dropped_before {
                report.dropped_samples += 1;
            }
        }
        self.health.motion = if !input.motion_supported {
            MotionHealth::Unsupported
        } else if self.steps.is_warmed_up() {
            MotionHealth::Active
        } else {
            MotionHealth::WarmingUp
        };

        // Stage 6: Milestones
        report.milestones = self
            .milestones
            .check(self.distance.fused_total_m, self.steps.total_steps(), now_ms);

        // Stage 7: Persistence
        if !report.milestones.is_empty() || self.changed_materially() {
            self.save_into(&mut report);
        }

        report
    }

    /// Zero every counter and ladder, then save. The in-memory reset stands
    /// even if the save fails.
    pub fn reset_all(&mut self) -> Result<(), PersistenceError> {
        let today = self.store.today();
        self.reset_in_memory(today);
        self.save()
    }

    /// Persist the current totals under the session date.
    ///
    /// Totals carried past midnight without a tick still belong to the day
    /// they were walked on, so the next load resets them.
    pub fn save(&mut self) -> Result<(), PersistenceError> {
        self.saved_fused_m = self.distance.fused_total_m;
        self.saved_steps = self.steps.total_steps();
        self.store.save(
            self.session_date,
            self.distance.gps_total_m,
            self.distance.ar_total_m,
            self.steps.total_steps(),
        )?;
        Ok(())
    }

    /// Orderly shutdown: final save.
    pub fn shutdown(&mut self) -> Result<(), PersistenceError> {
        info!(
            fused_total_m = self.distance.fused_total_m,
            total_steps = self.steps.total_steps(),
            ticks = self.tick_count,
            "walk engine shutting down"
        );
        self.save()
    }

    /// Fused distance in meters.
    pub fn fused_distance_m(&self) -> f64 {
        self.distance.fused_total_m
    }

    pub fn total_steps(&self) -> u64 {
        self.steps.total_steps()
    }

    /// Distance implied by the step count alone.
    pub fn step_distance_m(&self) -> f64 {
        self.steps.step_distance_m()
    }

    pub fn distance_state(&self) -> &DistanceState {
        &self.distance
    }

    pub fn step_state(&self) -> &StepState {
        self.steps.state()
    }

    pub fn health(&self) -> SourceHealth {
        self.health
    }

    pub fn session_date(&self) -> NaiveDate {
        self.session_date
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            distance: self.distance,
            total_steps: self.total_steps(),
            step_distance_m: self.step_distance_m(),
            health: self.health,
            session_date: self.session_date,
        }
    }

    pub fn add_milestone_listener(&mut self, listener: Box<dyn MilestoneListener>) {
        self.milestones.add_listener(listener);
    }

    /// Change the fusion weights; the fused value is recomputed at once.
    pub fn set_fusion_weights(&mut self, weights: FusionWeights) {
        self.fusion.set_weights(weights);
        self.config.fusion = self.fusion.weights();
        self.fusion.recompute(&mut self.distance);
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn reset_in_memory(&mut self, today: NaiveDate) {
        self.geodesic.reset();
        self.visual.reset();
        self.steps.reset();
        self.milestones.reset();
        self.distance = DistanceState::default();
        self.session_date = today;
        info!("all counters reset");
    }

    fn save_into(&mut self, report: &mut TickReport) {
        match self.save() {
            Ok(()) => report.saved = true,
            Err(e) => {
                warn!(error = %e, "save failed, keeping in-memory totals");
                report.save_failed = true;
            }
        }
    }

    fn changed_materially(&self) -> bool {
        let cfg = &self.config.persistence;
        let moved = self.distance.fused_total_m - self.saved_fused_m;
        let stepped = self.steps.total_steps().saturating_sub(self.saved_steps);
        (cfg.save_distance_delta_m > 0.0 && moved >= cfg.save_distance_delta_m)
            || (cfg.save_step_delta > 0 && stepped >= cfg.save_step_delta)
    }

    fn mark_ar_tracking(&mut self, now_ms: u64) {
        if self.ar_lost_reported {
            info!("AR tracking recovered");
        }
        self.last_pose_tick_ms = Some(now_ms);
        self.ar_lost_reported = false;
        self.health.ar = ArHealth::Tracking;
    }

    fn mark_ar_silent(&mut self, now_ms: u64) {
        let silent_since = self.last_pose_tick_ms.or(self.first_tick_ms).unwrap_or(now_ms);
        if now_ms.saturating_sub(silent_since) > self.config.ar_lost_grace_ms {
            if !self.ar_lost_reported {
                warn!(
                    silent_ms = now_ms.saturating_sub(silent_since),
                    "AR camera not tracking; AR distance is frozen"
                );
                self.ar_lost_reported = true;
                // The session may relocalise; the next pose seeds afresh.
                self.visual.forget_reference();
            }
            self.health.ar = ArHealth::Lost;
        } else {
            self.health.ar = ArHealth::NotTracking;
        }
    }
}
