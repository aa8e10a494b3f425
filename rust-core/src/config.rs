//! Engine configuration.
//!
//! Bundles every stage's configuration into one serde document so a host can
//! ship a single JSON file. Missing sections and fields fall back to their
//! defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fusion::FusionWeights;
use crate::geodesic::GeodesicConfig;
use crate::milestones::MilestoneConfig;
use crate::persistence::PersistenceConfig;
use crate::sources::LinkConfig;
use crate::step_detection::StepDetectorConfig;
use crate::visual::VisualConfig;

/// Configuration for the complete walk tracking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// GPS accumulation (accuracy gate, noise floor).
    pub geodesic: GeodesicConfig,

    /// AR displacement accumulation.
    pub visual: VisualConfig,

    /// Fusion weights. Clamped to [0, 1] when the engine is built.
    pub fusion: FusionWeights,

    /// Step detection.
    pub steps: StepDetectorConfig,

    /// Milestone ladders.
    pub milestones: MilestoneConfig,

    /// Material-change autosave.
    pub persistence: PersistenceConfig,

    /// Location link bring-up timeouts.
    pub link: LinkConfig,

    /// How long the AR stream may be silent before it is reported lost (ms).
    pub ar_lost_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            geodesic: GeodesicConfig::default(),
            visual: VisualConfig::default(),
            fusion: FusionWeights::default(),
            steps: StepDetectorConfig::default(),
            milestones: MilestoneConfig::default(),
            persistence: PersistenceConfig::default(),
            link: LinkConfig::default(),
            ar_lost_grace_ms: 10_000,
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be read,
    /// [`ConfigError::Parse`] if the JSON is malformed and
    /// [`ConfigError::InvalidValue`] if validation fails.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON, creating parent directories.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        let file_error = |source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(file_error)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(file_error)
    }

    /// Check every field for values the engine cannot work with.
    ///
    /// Fusion weights are not rejected here: out-of-range weights are clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let geo = &self.geodesic;
        positive("geodesic.max_horizontal_accuracy_m", geo.max_horizontal_accuracy_m)?;
        non_negative("geodesic.noise_floor_m", geo.noise_floor_m)?;
        positive("geodesic.earth_radius_m", geo.earth_radius_m)?;

        non_negative("visual.noise_floor_m", self.visual.noise_floor_m)?;

        finite("fusion.gps_weight", self.fusion.gps_weight)?;
        finite("fusion.ar_weight", self.fusion.ar_weight)?;

        let steps = &self.steps;
        non_negative("steps.stationary_threshold", steps.stationary_threshold as f64)?;
        let alpha = steps.smoothing_alpha;
        if !alpha.is_finite() || alpha <= 0.0 || alpha > 1.0 {
            return Err(ConfigError::invalid_value(
                "steps.smoothing_alpha",
                format!("must be in (0, 1], got {}", alpha),
            ));
        }
        if steps.window_capacity < 2 {
            return Err(ConfigError::invalid_value(
                "steps.window_capacity",
                format!("must be >= 2, got {}", steps.window_capacity),
            ));
        }
        non_negative("steps.min_std_dev", steps.min_std_dev as f64)?;
        non_negative("steps.std_dev_factor", steps.std_dev_factor as f64)?;
        non_negative("steps.min_peak_threshold", steps.min_peak_threshold as f64)?;
        non_negative("steps.average_step_length_m", steps.average_step_length_m)?;

        positive("milestones.distance_threshold_m", self.milestones.distance_threshold_m)?;
        if self.milestones.steps_threshold == 0 {
            return Err(ConfigError::invalid_value("milestones.steps_threshold", "must be > 0"));
        }

        non_negative(
            "persistence.save_distance_delta_m",
            self.persistence.save_distance_delta_m,
        )?;

        Ok(())
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid_value(field, format!("must be finite, got {}", value)))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value < 0.0 {
        return Err(ConfigError::invalid_value(field, format!("must be >= 0, got {}", value)));
    }
    Ok(())
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value <= 0.0 {
        return Err(ConfigError::invalid_value(field, format!("must be > 0, got {}", value)));
    }
    Ok(())
}
