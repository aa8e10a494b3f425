//! Trace Walk Engine Library
//!
//! A walk tracking kernel for AR sessions. Each frame tick it fuses GPS
//! distance with AR camera displacement, counts steps from accelerometer
//! magnitudes, fires debounced milestones and keeps a daily-reset record on
//! disk.
//!
//! # Design Philosophy
//!
//! - **Nothing fails a tick**: malformed samples are dropped and logged, a
//!   failed save leaves in-memory totals untouched.
//! - **Totals only grow**: every accumulator is monotonic between resets.
//! - **Daily scope**: counters belong to one calendar date and reset on the
//!   first load or tick of a new day.
//! - **Explicit lifecycle**: the host owns the engine, ticks it and calls
//!   shutdown; there is no process-wide singleton.
//!
//! # Example
//!
//! ```ignore
//! use trace_walk::{EngineConfig, PersistenceStore, TickInput, WalkEngine};
//! use trace_walk::types::CameraPose;
//!
//! let store = PersistenceStore::json_file("walk_record.json");
//! let mut engine = WalkEngine::new(EngineConfig::default(), store)?;
//!
//! let report = engine.tick(&TickInput::at(0).with_pose(CameraPose::new([0.0, 0.0, 0.0], 0)));
//! println!("fused: {:.1} m, steps: {}", engine.fused_distance_m(), engine.total_steps());
//!
//! engine.shutdown()?;
//! ```

pub mod config;
pub mod error;
pub mod ffi;
pub mod fusion;
pub mod geodesic;
pub mod milestones;
pub mod persistence;
pub mod pipeline;
pub mod sources;
pub mod step_detection;
pub mod types;
pub mod visual;


#[cfg(test)]
mod stress_tests;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{ConfigError, EngineError, EngineResult, PersistenceError};
pub use fusion::{DistanceFusionEngine, FusionWeights};
pub use geodesic::{haversine_distance_m, FixOutcome, GeodesicAccumulator};
pub use milestones::{MilestoneDispatcher, MilestoneListener};
pub use persistence::{PersistedRecord, PersistenceStore};
pub use pipeline::{EngineSnapshot, TickInput, TickReport, WalkEngine};
pub use sources::{LocationLink, SampleSlot, SensorHub, SharedLocation};
pub use step_detection::{StepDetector, StepDetectorConfig};
pub use types::{
    ArHealth, CameraPose, DistanceState, LinkPhase, MilestoneEvent, MilestoneKind, MotionHealth,
    MotionSample, PositionFix, SourceHealth, StepEvent,
};
pub use visual::VisualDisplacementAccumulator;
