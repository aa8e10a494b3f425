/// Basic usage example: feed GPS, AR and accelerometer ticks, get distance and steps
use trace_walk::persistence::{LocalClock, MemoryStore};
use trace_walk::{
    CameraPose, EngineConfig, MilestoneEvent, MilestoneListener, MotionSample, PersistenceStore,
    PositionFix, TickInput, WalkEngine,
};

struct PrintMilestones;

impl MilestoneListener for PrintMilestones {
    fn on_distance_milestone(&mut self, event: &MilestoneEvent) {
        println!("  >> distance milestone #{} at {} ms", event.rung, event.timestamp_ms);
    }

    fn on_steps_milestone(&mut self, event: &MilestoneEvent) {
        println!("  >> steps milestone #{} at {} ms", event.rung, event.timestamp_ms);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Trace Walk Engine: Basic Example ===\n");

    // Small ladders so a short walk reaches them.
    let mut config = EngineConfig::default();
    config.milestones.distance_threshold_m = 25.0;
    config.milestones.steps_threshold = 20;

    // In-memory record; use PersistenceStore::json_file(..) on a device.
    let store = PersistenceStore::new(Box::new(MemoryStore::new()), Box::new(LocalClock));
    let mut engine = WalkEngine::new(config, store)?;
    engine.add_milestone_listener(Box::new(PrintMilestones));

    // Simulate 40 seconds of walking north at 1.4 m/s, ticking at 50 Hz.
    let meters_per_degree = 111_195.0;
    for i in 0..2000u64 {
        let now_ms = i * 20;
        let stride = i >= 60 && (i - 60) % 30 == 0;
        let mut input = TickInput::at(now_ms)
            .with_motion(MotionSample::new(if stride { 4.0 } else { 1.0 }, now_ms));

        if i % 50 == 0 {
            let meters = (i / 50) as f64 * 1.4;
            input = input
                .with_position(PositionFix::new(meters / meters_per_degree, 0.0, 5.0, now_ms))
                .with_pose(CameraPose::new([0.0, 0.0, -(meters as f32)], now_ms));
        }

        let report = engine.tick(&input);
        if i % 500 == 0 {
            println!(
                "t={:>5} ms  fused={:>6.1} m  steps={:>3}  health={:?}",
                now_ms,
                engine.fused_distance_m(),
                engine.total_steps(),
                report_health(&engine)
            );
        }
    }

    engine.shutdown()?;

    let snapshot = engine.snapshot();
    println!("\n=== Summary ===");
    println!("GPS distance:   {:.1} m", snapshot.distance.gps_total_m);
    println!("AR distance:    {:.1} m", snapshot.distance.ar_total_m);
    println!("Fused distance: {:.1} m", snapshot.distance.fused_total_m);
    println!("Steps:          {} (~{:.1} m)", snapshot.total_steps, snapshot.step_distance_m);
    Ok(())
}

fn report_health(engine: &WalkEngine) -> (trace_walk::ArHealth, trace_walk::MotionHealth) {
    let health = engine.health();
    (health.ar, health.motion)
}
