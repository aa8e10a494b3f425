//! Ground distance from consecutive position fixes.
//!
//! Each accepted fix is compared with the previous reference fix using the
//! Haversine great-circle formula. Fixes with a poor accuracy radius are
//! rejected without moving the reference, so the next good fix is measured
//! from the last trusted point. Small displacements are treated as jitter.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::PositionFix;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Configuration for GPS distance accumulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeodesicConfig {
    /// Fixes with a larger accuracy radius (meters) are rejected.
    pub max_horizontal_accuracy_m: f64,
    /// Displacements at or below this (meters) are discarded as jitter.
    pub noise_floor_m: f64,
    /// Sphere radius used by the Haversine formula (meters).
    pub earth_radius_m: f64,
}

impl Default for GeodesicConfig {
    fn default() -> Self {
        Self {
            max_horizontal_accuracy_m: 10.0,
            noise_floor_m: 0.5,
            earth_radius_m: EARTH_RADIUS_M,
        }
    }
}

/// Great-circle distance in meters between two lat/lon pairs in degrees.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64, radius_m: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for antipodal points.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    radius_m * c
}

/// Outcome of feeding one fix to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixOutcome {
    /// First usable fix; stored as reference only.
    Seeded,
    /// Distance added to the running total.
    Accepted { distance_m: f64 },
    /// Displacement at or below the noise floor; reference advanced.
    Jitter { distance_m: f64 },
    /// Accuracy radius too large; reference unchanged.
    Inaccurate,
    /// Non-finite or out-of-range fix; dropped.
    Malformed,
}

/// Accumulates ground distance from successive position fixes.
#[derive(Debug, Clone)]
pub struct GeodesicAccumulator {
    config: GeodesicConfig,
    reference: Option<PositionFix>,
    total_m: f64,
    accepted_fixes: u64,
    rejected_fixes: u64,
}

impl GeodesicAccumulator {
    pub fn new(config: GeodesicConfig) -> Self {
        Self {
            config,
            reference: None,
            total_m: 0.0,
            accepted_fixes: 0,
            rejected_fixes: 0,
        }
    }

    /// Start from a previously persisted total.
    pub fn with_total(config: GeodesicConfig, total_m: f64) -> Self {
        let mut acc = Self::new(config);
        acc.total_m = total_m.max(0.0);
        acc
    }

    /// Feed one fix.
    pub fn update(&mut self, fix: &PositionFix) -> FixOutcome {
        if !fix.is_well_formed() {
            return FixOutcome::Malformed;
        }

        if fix.horizontal_accuracy_m > self.config.max_horizontal_accuracy_m {
            self.rejected_fixes += 1;
            trace!(
                accuracy_m = fix.horizontal_accuracy_m,
                "rejecting inaccurate position fix"
            );
            return FixOutcome::Inaccurate;
        }

        let Some(previous) = self.reference.replace(*fix) else {
            return FixOutcome::Seeded;
        };

        let distance_m = haversine_distance_m(
            previous.latitude_deg,
            previous.longitude_deg,
            fix.latitude_deg,
            fix.longitude_deg,
            self.config.earth_radius_m,
        );

        if distance_m > self.config.noise_floor_m {
            self.total_m += distance_m;
            self.accepted_fixes += 1;
            FixOutcome::Accepted { distance_m }
        } else {
            trace!(distance_m, "discarding GPS jitter");
            FixOutcome::Jitter { distance_m }
        }
    }

    /// Cumulative accepted distance in meters.
    pub fn total_m(&self) -> f64 {
        self.total_m
    }

    /// The fix new updates are measured from, if any.
    pub fn reference(&self) -> Option<&PositionFix> {
        self.reference.as_ref()
    }

    pub fn accepted_fixes(&self) -> u64 {
        self.accepted_fixes
    }

    pub fn rejected_fixes(&self) -> u64 {
        self.rejected_fixes
    }

    /// Zero the total. The reference fix is kept so walking continues
    /// seamlessly after a reset.
    pub fn reset(&mut self) {
        self.total_m = 0.0;
        self.accepted_fixes = 0;
        self.rejected_fixes = 0;
    }
}
