//! Camera displacement distance from the AR pose stream.
//!
//! The AR subsystem is locally consistent but jittery at small scales, so
//! the noise floor is larger than the GPS one and there is no accuracy gate.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::CameraPose;

/// Configuration for AR displacement accumulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    /// Per-update displacements at or below this (meters) are ignored.
    pub noise_floor_m: f64,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self { noise_floor_m: 0.2 }
    }
}

/// Accumulates camera displacement between consecutive poses.
#[derive(Debug, Clone)]
pub struct VisualDisplacementAccumulator {
    config: VisualConfig,
    last_pose: Option<CameraPose>,
    total_m: f64,
}

impl VisualDisplacementAccumulator {
    pub fn new(config: VisualConfig) -> Self {
        Self {
            config,
            last_pose: None,
            total_m: 0.0,
        }
    }

    /// Start from a previously persisted total.
    pub fn with_total(config: VisualConfig, total_m: f64) -> Self {
        let mut acc = Self::new(config);
        acc.total_m = total_m.max(0.0);
        acc
    }

    /// Feed one pose. Returns the distance added (0 when seeded or below the floor).
    ///
    /// Malformed poses return `None` and leave the reference untouched.
    pub fn update(&mut self, pose: &CameraPose) -> Option<f64> {
        if !pose.is_well_formed() {
            return None;
        }

        let Some(previous) = self.last_pose.replace(*pose) else {
            return Some(0.0);
        };

        let distance_m = previous.distance_to(pose);
        if distance_m > self.config.noise_floor_m {
            self.total_m += distance_m;
            Some(distance_m)
        } else {
            trace!(distance_m, "ignoring AR jitter");
            Some(0.0)
        }
    }

    /// Cumulative AR distance in meters.
    pub fn total_m(&self) -> f64 {
        self.total_m
    }

    pub fn last_pose(&self) -> Option<&CameraPose> {
        self.last_pose.as_ref()
    }

    /// Zero the total; the reference pose is kept.
    pub fn reset(&mut self) {
        self.total_m = 0.0;
    }

    /// Forget the reference pose, e.g. after the AR session relocalised.
    pub fn forget_reference(&mut self) {
        self.last_pose = None;
    }
}
