//! Weighted combination of the GPS and AR distance totals.
//!
//! The weights are independent dials, not a probability split: they are each
//! clamped to [0, 1] but need not sum to one. The fused value is recomputed
//! from scratch every tick so it can never drift from its inputs.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::DistanceState;

/// Fusion weights for the two distance sources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub gps_weight: f64,
    pub ar_weight: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            gps_weight: 0.7,
            ar_weight: 0.3,
        }
    }
}

impl FusionWeights {
    /// Build weights, clamping each into [0, 1]. Non-finite values become 0.
    pub fn new(gps_weight: f64, ar_weight: f64) -> Self {
        Self {
            gps_weight: clamp_weight("gps_weight", gps_weight),
            ar_weight: clamp_weight("ar_weight", ar_weight),
        }
    }

    /// Return a copy with both weights forced into range.
    pub fn clamped(self) -> Self {
        Self::new(self.gps_weight, self.ar_weight)
    }
}

fn clamp_weight(name: &str, value: f64) -> f64 {
    if !value.is_finite() {
        warn!(weight = name, value, "non-finite fusion weight, using 0");
        return 0.0;
    }
    let clamped = value.clamp(0.0, 1.0);
    if clamped != value {
        warn!(weight = name, value, clamped, "fusion weight clamped into [0, 1]");
    }
    clamped
}

/// Stateless combiner; holds only its weights.
#[derive(Debug, Clone)]
pub struct DistanceFusionEngine {
    weights: FusionWeights,
}

impl DistanceFusionEngine {
    pub fn new(weights: FusionWeights) -> Self {
        Self {
            weights: weights.clamped(),
        }
    }

    /// `gps_weight * gps_total + ar_weight * ar_total`.
    pub fn fuse(&self, gps_total_m: f64, ar_total_m: f64) -> f64 {
        self.weights.gps_weight * gps_total_m + self.weights.ar_weight * ar_total_m
    }

    /// Recompute `fused_total_m` in place from the source totals.
    pub fn recompute(&self, state: &mut DistanceState) {
        state.fused_total_m = self.fuse(state.gps_total_m, state.ar_total_m);
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    /// Replace the weights at runtime; they are clamped like at construction.
    pub fn set_weights(&mut self, weights: FusionWeights) {
        self.weights = weights.clamped();
    }
}

impl Default for DistanceFusionEngine {
    fn default() -> Self {
        Self::new(FusionWeights::default())
    }
}
