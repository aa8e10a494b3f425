//! Core data types for the walk tracking engine.
//!
//! This module defines the sensor inputs consumed once per tick and the
//! running state the engine exposes to the host application. Inputs are
//! ephemeral: nothing in here is persisted except through
//! [`crate::persistence::PersistedRecord`].
//!
//! Design principle: Types should make intent obvious. If a concept exists,
//! it gets a type. Never pass raw tuples or untyped collections across boundaries.

use serde::{Deserialize, Serialize};

/// A single location fix reported by the platform location service.
///
/// Coordinates are WGS84 degrees. The accuracy radius is the platform's
/// 1-sigma horizontal estimate in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    /// Latitude in degrees, [-90, 90].
    pub latitude_deg: f64,
    /// Longitude in degrees, [-180, 180].
    pub longitude_deg: f64,
    /// Horizontal accuracy radius in meters. Lower is better.
    pub horizontal_accuracy_m: f64,
    /// Timestamp in milliseconds.
    pub timestamp_ms: u64,
}

impl PositionFix {
    pub fn new(latitude_deg: f64, longitude_deg: f64, horizontal_accuracy_m: f64, timestamp_ms: u64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            horizontal_accuracy_m,
            timestamp_ms,
        }
    }

    /// Whether the fix can be used at all (finite, in range, non-negative accuracy).
    ///
    /// A fix failing this check is dropped for the tick; it is not the same
    /// as an inaccurate fix, which is well formed but gated later.
    pub fn is_well_formed(&self) -> bool {
        self.latitude_deg.is_finite()
            && self.longitude_deg.is_finite()
            && self.horizontal_accuracy_m.is_finite()
            && (-90.0..=90.0).contains(&self.latitude_deg)
            && (-180.0..=180.0).contains(&self.longitude_deg)
            && self.horizontal_accuracy_m >= 0.0
    }
}

/// Tracked camera pose from the AR subsystem.
///
/// Only the world-space position is used; orientation does not contribute
/// to walked distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    /// World position [x, y, z] in meters.
    pub position: [f32; 3],
    /// Timestamp in milliseconds.
    pub timestamp_ms: u64,
}

impl CameraPose {
    pub fn new(position: [f32; 3], timestamp_ms: u64) -> Self {
        Self { position, timestamp_ms }
    }

    pub fn is_well_formed(&self) -> bool {
        self.position.iter().all(|c| c.is_finite())
    }

    /// Euclidean distance to another pose in meters.
    pub fn distance_to(&self, other: &CameraPose) -> f64 {
        let dx = (self.position[0] - other.position[0]) as f64;
        let dy = (self.position[1] - other.position[1]) as f64;
        let dz = (self.position[2] - other.position[2]) as f64;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// One accelerometer reading, reduced to its magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Acceleration magnitude in the platform's native unit.
    pub accel_magnitude: f32,
    /// Timestamp in milliseconds.
    pub timestamp_ms: u64,
}

impl MotionSample {
    pub fn new(accel_magnitude: f32, timestamp_ms: u64) -> Self {
        Self {
            accel_magnitude,
            timestamp_ms,
        }
    }

    /// Build a sample from a raw three-axis reading.
    pub fn from_axes(accel: [f32; 3], timestamp_ms: u64) -> Self {
        let x2 = accel[0] * accel[0];
        let y2 = accel[1] * accel[1];
        let z2 = accel[2] * accel[2];
        Self::new((x2 + y2 + z2).sqrt(), timestamp_ms)
    }

    pub fn is_well_formed(&self) -> bool {
        self.accel_magnitude.is_finite() && self.accel_magnitude >= 0.0
    }
}

/// Running distance totals.
///
/// `fused_total_m` is always recomputed from the two source totals; it is
/// never accumulated on its own.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DistanceState {
    /// Cumulative great-circle distance from accepted position fixes.
    pub gps_total_m: f64,
    /// Cumulative camera displacement from AR poses.
    pub ar_total_m: f64,
    /// Weighted combination of the two totals.
    pub fused_total_m: f64,
}

/// A single detected step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    /// Timestamp of the sample that produced the peak.
    pub timestamp_ms: u64,
    /// Filtered magnitude at the peak.
    pub filtered_accel: f32,
    /// Dynamic threshold the peak had to exceed.
    pub threshold: f32,
    /// Step count including this step.
    pub total_steps: u64,
}

impl StepEvent {
    pub fn new(timestamp_ms: u64, filtered_accel: f32, threshold: f32, total_steps: u64) -> Self {
        Self {
            timestamp_ms,
            filtered_accel,
            threshold,
            total_steps,
        }
    }
}

/// Which counter crossed a milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    Distance,
    Steps,
}

/// A one-shot notification that a fixed-size increment was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneEvent {
    pub kind: MilestoneKind,
    /// 1-based rung on the milestone ladder since the last reset.
    pub rung: u64,
    /// Tick time at which the event fired.
    pub timestamp_ms: u64,
}

/// Phase of the location link, advanced once per tick.
///
/// Only `Running` delivers fixes to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    Uninitialized,
    AwaitingPermission,
    AwaitingServiceStart,
    #[default]
    Running,
    Failed,
}

/// Health of the AR camera pose stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArHealth {
    /// Poses are arriving.
    Tracking,
    /// No pose this tick, still within the grace period.
    NotTracking,
    /// No pose for longer than the grace period. Needs operator attention.
    Lost,
}

/// Health of the accelerometer stream as seen by the step detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionHealth {
    /// Filter window not yet full; detection suppressed.
    WarmingUp,
    /// Detection running.
    Active,
    /// Platform reports no accelerometer.
    Unsupported,
}

/// Per-source status published with every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub gps: LinkPhase,
    pub ar: ArHealth,
    pub motion: MotionHealth,
}

impl Default for SourceHealth {
    fn default() -> Self {
        Self {
            gps: LinkPhase::Uninitialized,
            ar: ArHealth::NotTracking,
            motion: MotionHealth::WarmingUp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_fix_validation() {
        assert!(PositionFix::new(48.85, 2.35, 5.0, 0).is_well_formed());
        assert!(!PositionFix::new(f64::NAN, 2.35, 5.0, 0).is_well_formed());
        assert!(!PositionFix::new(91.0, 2.35, 5.0, 0).is_well_formed());
        assert!(!PositionFix::new(48.85, -181.0, 5.0, 0).is_well_formed());
        assert!(!PositionFix::new(48.85, 2.35, -1.0, 0).is_well_formed());
        assert!(!PositionFix::new(48.85, 2.35, f64::INFINITY, 0).is_well_formed());
    }

    #[test]
    fn test_camera_pose_distance() {
        let a = CameraPose::new([0.0, 0.0, 0.0], 0);
        let b = CameraPose::new([3.0, 0.0, 4.0], 16);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-9);
        assert!(!CameraPose::new([f32::NAN, 0.0, 0.0], 0).is_well_formed());
    }

    #[test]
    fn test_motion_sample_from_axes() {
        let sample = MotionSample::from_axes([0.0, 0.6, 0.8], 100);
        assert!((sample.accel_magnitude - 1.0).abs() < 1e-6);
        assert_eq!(sample.timestamp_ms, 100);
        assert!(!MotionSample::new(f32::NAN, 0).is_well_formed());
    }

    #[test]
    fn test_milestone_kind_serializes_snake_case() {
        let json = serde_json::to_string(&MilestoneKind::Distance).unwrap();
        assert_eq!(json, "\"distance\"");
    }
}
