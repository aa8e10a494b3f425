/// Production-level stress testing for the walk tracking pipeline.
///
/// These tests are designed to expose real-world failure modes that would only
/// appear under extreme, sustained, or pathological conditions.

#[cfg(test)]
mod stress_tests {
    use chrono::NaiveDate;

    use crate::config::EngineConfig;
    use crate::fusion::FusionWeights;
    use crate::persistence::{FixedClock, MemoryStore, PersistenceStore};
    use crate::pipeline::*;
    use crate::types::*;

    fn engine(config: EngineConfig) -> (WalkEngine, MemoryStore, FixedClock) {
        let backing = MemoryStore::new();
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        let store = PersistenceStore::new(Box::new(backing.clone()), Box::new(clock.clone()));
        (WalkEngine::new(config, store).unwrap(), backing, clock)
    }

    /// Deterministic gait-like magnitude: ~1.7 Hz cadence with harmonics.
    fn gait_magnitude(t_ms: u64) -> f32 {
        let t = t_ms as f32 / 1000.0;
        1.0 + 1.2 * (t * 2.0 * std::f32::consts::PI * 1.7).sin().max(0.0)
            + 0.2 * (t * 2.0 * std::f32::consts::PI * 5.1).sin()
    }

    /// Walker position along a gentle curve, meters east/north of start.
    fn route_point(t_ms: u64) -> (f64, f64) {
        let t = t_ms as f64 / 1000.0;
        (1.3 * t, 20.0 * (t / 60.0).sin())
    }

    fn to_fix(east_m: f64, north_m: f64, accuracy_m: f64, t_ms: u64) -> PositionFix {
        let meters_per_degree = 6_371_000.0 * std::f64::consts::PI / 180.0;
        PositionFix::new(
            48.0 + north_m / meters_per_degree,
            11.0 + east_m / (meters_per_degree * 48.0_f64.to_radians().cos()),
            accuracy_m,
            t_ms,
        )
    }

    fn realistic_tick(i: u64) -> TickInput {
        let now_ms = i * 20;
        let mut input = TickInput::at(now_ms).with_motion(MotionSample::new(gait_magnitude(now_ms), now_ms));
        let (east, north) = route_point(now_ms);
        if i % 50 == 0 {
            input.position = Some(to_fix(east, north, 4.0 + (i % 7) as f64, now_ms));
        }
        if i % 25 == 0 {
            input.pose = Some(CameraPose::new([east as f32, 0.0, -(north as f32)], now_ms));
        }
        input
    }

    /// Totals must never shrink between resets and must stay finite.
    fn assert_monotonic(previous: &mut (f64, f64, f64, u64), engine: &WalkEngine) {
        let state = engine.distance_state();
        let steps = engine.total_steps();
        assert!(state.gps_total_m.is_finite());
        assert!(state.ar_total_m.is_finite());
        assert!(state.fused_total_m.is_finite());
        assert!(state.gps_total_m >= previous.0);
        assert!(state.ar_total_m >= previous.1);
        assert!(state.fused_total_m >= previous.2);
        assert!(steps >= previous.3);
        *previous = (state.gps_total_m, state.ar_total_m, state.fused_total_m, steps);
    }

    // ============================================================================
    // CATEGORY 1: EXTREME DURATION & THROUGHPUT
    // ============================================================================

    /// One hour of 50 Hz ticks: totals stay monotonic and finite.
    #[test]
    fn stress_one_hour_session_50hz() {
        let (mut engine, _, _) = engine(EngineConfig::default());
        let mut previous = (0.0, 0.0, 0.0, 0);
        let mut distance_milestones = 0;

        for i in 0..180_000u64 {
            let report = engine.tick(&realistic_tick(i));
            distance_milestones += report
                .milestones
                .iter()
                .filter(|e| e.kind == MilestoneKind::Distance)
                .count();
            assert_monotonic(&mut previous, &engine);
        }

        // ~4.7 km along the route.
        assert!(engine.fused_distance_m() > 4000.0);
        assert!(engine.fused_distance_m() < 6000.0);
        assert_eq!(distance_milestones as f64, (engine.fused_distance_m() / 1000.0).floor());
        assert!(engine.total_steps() > 1000, "steps {}", engine.total_steps());
        assert_eq!(engine.step_state().filter_window.len(), 50);
    }

    // ============================================================================
    // CATEGORY 2: CORRUPTED INPUT
    // ============================================================================

    /// NaN and Inf everywhere: dropped, never folded into totals.
    #[test]
    fn stress_nan_and_inf_corruption() {
        let (mut engine, _, _) = engine(EngineConfig::default());
        let mut previous = (0.0, 0.0, 0.0, 0);
        let mut dropped = 0;

        let bad_floats = [f64::NAN, f64::INFINITY, f64::NEG_INFINITY];
        for i in 0..5000u64 {
            let mut input = realistic_tick(i);
            if i % 7 == 0 {
                let bad = bad_floats[(i / 7 % 3) as usize];
                input.position = Some(PositionFix::new(bad, 11.0, 3.0, i * 20));
                input.pose = Some(CameraPose::new([bad as f32, 0.0, 0.0], i * 20));
                input.motion = Some(MotionSample::new(bad as f32, i * 20));
            }
            dropped += engine.tick(&input).dropped_samples;
            assert_monotonic(&mut previous, &engine);
        }

        assert_eq!(dropped, 3 * (5000 / 7 + 1));
    }

    /// Out-of-range coordinates and negative accuracy are malformed fixes.
    #[test]
    fn stress_out_of_range_fixes() {
        let (mut engine, _, _) = engine(EngineConfig::default());
        let cases = [
            PositionFix::new(91.0, 0.0, 3.0, 0),
            PositionFix::new(-90.5, 0.0, 3.0, 0),
            PositionFix::new(0.0, 180.5, 3.0, 0),
            PositionFix::new(0.0, 0.0, -1.0, 0),
            PositionFix::new(0.0, 0.0, f64::NAN, 0),
        ];
        for (i, fix) in cases.iter().enumerate() {
            let report = engine.tick(&TickInput::at(i as u64 * 20).with_position(*fix));
            assert_eq!(report.dropped_samples, 1);
        }
        assert_eq!(engine.distance_state().gps_total_m, 0.0);
    }

    /// GPS wander under the noise floor around a standing user adds nothing.
    #[test]
    fn stress_standing_still_with_gps_jitter() {
        let (mut engine, _, _) = engine(EngineConfig::default());
        for i in 0..3000u64 {
            let wobble = 0.2 * ((i as f64) * 0.37).sin();
            let mut input = TickInput::at(i * 20).with_position(to_fix(wobble, -wobble, 3.0, i * 20));
            input.pose = Some(CameraPose::new([0.05 * (i as f32 * 0.3).cos(), 0.0, 0.0], i * 20));
            input.motion = Some(MotionSample::new(0.01, i * 20));
            engine.tick(&input);
        }
        assert_eq!(engine.distance_state(), &DistanceState::default());
        assert_eq!(engine.total_steps(), 0);
        assert_eq!(engine.health().motion, MotionHealth::WarmingUp);
    }

    // ============================================================================
    // CATEGORY 3: TEMPORAL CHAOS
    // ============================================================================

    /// Timestamps running backwards must not panic or un-count steps.
    #[test]
    fn stress_nonmonotonic_timestamps() {
        let (mut engine, _, _) = engine(EngineConfig::default());
        let mut previous = (0.0, 0.0, 0.0, 0);
        for i in 0..4000u64 {
            let now_ms = if i % 100 < 50 { i * 20 } else { 200_000 - i * 20 };
            let input = TickInput::at(now_ms)
                .with_motion(MotionSample::new(gait_magnitude(i * 20), now_ms))
                .with_pose(CameraPose::new([i as f32 * 0.05, 0.0, 0.0], now_ms));
            engine.tick(&input);
            assert_monotonic(&mut previous, &engine);
        }
    }

    /// Many ticks sharing one timestamp.
    #[test]
    fn stress_zero_time_deltas() {
        let (mut engine, _, _) = engine(EngineConfig::default());
        for i in 0..2000u64 {
            let input = TickInput::at(1000).with_motion(MotionSample::new(gait_magnitude(i * 20), 1000));
            engine.tick(&input);
        }
        // Only the first step can pass the cooldown at a frozen clock.
        assert!(engine.total_steps() <= 1);
    }

    /// A burst of large position jumps fires at most one milestone per tick,
    /// spaced by the cooldown.
    #[test]
    fn stress_milestone_storm() {
        let mut config = EngineConfig::default();
        config.milestones.distance_threshold_m = 1.0;
        let (mut engine, _, _) = engine(config);

        let mut last_fire: Option<u64> = None;
        let mut fired = 0;
        for i in 0..600u64 {
            let now_ms = i * 16;
            let pose = CameraPose::new([i as f32 * 100.0, 0.0, 0.0], now_ms);
            let report = engine.tick(&TickInput::at(now_ms).with_pose(pose));
            assert!(report.milestones.len() <= 1);
            for event in &report.milestones {
                if let Some(last) = last_fire {
                    assert!(event.timestamp_ms - last >= 1000);
                }
                last_fire = Some(event.timestamp_ms);
                fired += 1;
            }
        }
        // ~9.6 s of ticks at one event per second.
        assert!((9..=10).contains(&fired), "fired {}", fired);
    }

    // ============================================================================
    // CATEGORY 4: STATE RECOVERY
    // ============================================================================

    /// Repeated resets in the middle of a walk.
    #[test]
    fn stress_repeated_reset_cycles() {
        let (mut engine, backing, _) = engine(EngineConfig::default());
        for cycle in 0..20u64 {
            for i in 0..500u64 {
                engine.tick(&realistic_tick(cycle * 500 + i));
            }
            engine.reset_all().unwrap();
            assert_eq!(engine.fused_distance_m(), 0.0);
            assert_eq!(engine.total_steps(), 0);
            assert!(backing.raw().unwrap().contains("\"totalSteps\":0"));
        }
    }

    /// Storage flapping between failing and working.
    #[test]
    fn stress_flapping_storage() {
        let (mut engine, backing, _) = engine(EngineConfig::default());
        let mut previous = (0.0, 0.0, 0.0, 0);
        for i in 0..20_000u64 {
            backing.set_fail_writes((i / 1000) % 2 == 1);
            engine.tick(&realistic_tick(i));
            assert_monotonic(&mut previous, &engine);
        }
        backing.set_fail_writes(false);
        engine.shutdown().unwrap();
        assert!(backing.raw().unwrap().contains("gpsTotalMeters"));
    }

    /// Daily rollover every few thousand ticks for a simulated month.
    #[test]
    fn stress_month_of_rollovers() {
        let (mut engine, _, clock) = engine(EngineConfig::default());
        let mut rollovers = 0;
        for day in 0..30u64 {
            for i in 0..1000u64 {
                if engine.tick(&realistic_tick(day * 1000 + i)).day_rolled_over {
                    rollovers += 1;
                }
            }
            clock.advance_days(1);
        }
        assert_eq!(rollovers, 29);
    }

    // ============================================================================
    // CATEGORY 5: EXTREME CONFIGURATIONS
    // ============================================================================

    #[test]
    fn stress_extreme_configurations() {
        let mut tiny_window = EngineConfig::default();
        tiny_window.steps.window_capacity = 2;
        tiny_window.steps.min_step_interval_ms = 0;

        let mut zero_floors = EngineConfig::default();
        zero_floors.geodesic.noise_floor_m = 0.0;
        zero_floors.visual.noise_floor_m = 0.0;
        zero_floors.persistence.save_distance_delta_m = 0.0;
        zero_floors.persistence.save_step_delta = 0;

        let mut wild_weights = EngineConfig::default();
        wild_weights.fusion = FusionWeights {
            gps_weight: 5.0,
            ar_weight: -2.0,
        };

        for config in [tiny_window, zero_floors, wild_weights] {
            let (mut engine, _, _) = engine(config);
            let mut previous = (0.0, 0.0, 0.0, 0);
            for i in 0..3000u64 {
                engine.tick(&realistic_tick(i));
                assert_monotonic(&mut previous, &engine);
            }
            let state = engine.distance_state();
            assert!(state.fused_total_m <= state.gps_total_m + state.ar_total_m + 1e-9);
        }
    }
}
