use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SimError};

const ENV_TIMESTEP_HZ: &str = "RAGDOLL_TIMESTEP_HZ";
const ENV_STAGNATION_SECONDS: &str = "RAGDOLL_STAGNATION_SECONDS";
const ENV_FALL_GRACE_SECONDS: &str = "RAGDOLL_FALL_GRACE_SECONDS";
const ENV_MAX_TRIAL_SECONDS: &str = "RAGDOLL_MAX_TRIAL_SECONDS";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialConfig {
    #[serde(default = "default_timestep_hz")]
    pub timestep_hz: u32,
    #[serde(default = "default_gravity")]
    pub gravity: f32,
    #[serde(default = "default_ground_friction")]
    pub ground_friction: f32,
    #[serde(default = "default_segment_friction")]
    pub segment_friction: f32,
    #[serde(default = "default_segment_radius")]
    pub segment_radius: f32,
    #[serde(default = "default_stagnation_timeout_seconds")]
    pub stagnation_timeout_seconds: f32,
    #[serde(default = "default_fall_grace_seconds")]
    pub fall_grace_seconds: f32,
    #[serde(default = "default_max_trial_seconds")]
    pub max_trial_seconds: f32,
    #[serde(default = "default_tilt_cutoff_degrees")]
    pub tilt_cutoff_degrees: f32,
    #[serde(default)]
    pub state_includes_rates: bool,
    #[serde(default = "default_rate_scale")]
    pub rate_scale: f32,
    #[serde(default = "default_torque_mode_rate")]
    pub torque_mode_rate: f32,
    #[serde(default = "default_limit_strength_ratio")]
    pub limit_strength_ratio: f32,
    #[serde(default = "default_max_linear_speed")]
    pub max_linear_speed: f32,
    #[serde(default = "default_max_angular_speed")]
    pub max_angular_speed: f32,
    /// Solver passes per control step; joint limits are checked on each.
    #[serde(default = "default_solver_substeps")]
    pub solver_substeps: u32,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            timestep_hz: default_timestep_hz(),
            gravity: default_gravity(),
            ground_friction: default_ground_friction(),
            segment_friction: default_segment_friction(),
            segment_radius: default_segment_radius(),
            stagnation_timeout_seconds: default_stagnation_timeout_seconds(),
            fall_grace_seconds: default_fall_grace_seconds(),
            max_trial_seconds: default_max_trial_seconds(),
            tilt_cutoff_degrees: default_tilt_cutoff_degrees(),
            state_includes_rates: false,
            rate_scale: default_rate_scale(),
            torque_mode_rate: default_torque_mode_rate(),
            limit_strength_ratio: default_limit_strength_ratio(),
            max_linear_speed: default_max_linear_speed(),
            max_angular_speed: default_max_angular_speed(),
            solver_substeps: default_solver_substeps(),
        }
    }
}

impl TrialConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: TrialConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `RAGDOLL_*` environment overrides. Unparseable values are
    /// reported and ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(hz) = resolve_env::<u32>(ENV_TIMESTEP_HZ) {
            self.timestep_hz = hz;
        }
        if let Some(seconds) = resolve_env::<f32>(ENV_STAGNATION_SECONDS) {
            self.stagnation_timeout_seconds = seconds;
        }
        if let Some(seconds) = resolve_env::<f32>(ENV_FALL_GRACE_SECONDS) {
            self.fall_grace_seconds = seconds;
        }
        if let Some(seconds) = resolve_env::<f32>(ENV_MAX_TRIAL_SECONDS) {
            self.max_trial_seconds = seconds;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.timestep_hz == 0 {
            return Err(SimError::Config("timestepHz must be positive".into()));
        }
        if self.solver_substeps == 0 {
            return Err(SimError::Config("solverSubsteps must be positive".into()));
        }
        let positive = [
            ("stagnationTimeoutSeconds", self.stagnation_timeout_seconds),
            ("fallGraceSeconds", self.fall_grace_seconds),
            ("maxTrialSeconds", self.max_trial_seconds),
            ("tiltCutoffDegrees", self.tilt_cutoff_degrees),
            ("segmentRadius", self.segment_radius),
            ("torqueModeRate", self.torque_mode_rate),
            ("maxLinearSpeed", self.max_linear_speed),
            ("maxAngularSpeed", self.max_angular_speed),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::Config(format!(
                    "{name} must be a positive finite number; got {value}"
                )));
            }
        }
        let durations = [
            ("stagnationTimeoutSeconds", self.stagnation_timeout_seconds),
            ("fallGraceSeconds", self.fall_grace_seconds),
            ("maxTrialSeconds", self.max_trial_seconds),
        ];
        for (name, value) in durations {
            if Duration::try_from_secs_f32(value).is_err() {
                return Err(SimError::Config(format!(
                    "{name} is not a representable duration; got {value}"
                )));
            }
        }
        if !(self.rate_scale.is_finite() && self.rate_scale >= 0.0) {
            return Err(SimError::Config(format!(
                "rateScale must be non-negative; got {}",
                self.rate_scale
            )));
        }
        if !(self.limit_strength_ratio.is_finite() && self.limit_strength_ratio > 1.0) {
            return Err(SimError::Config(format!(
                "limitStrengthRatio must exceed 1 so limits overpower motors; got {}",
                self.limit_strength_ratio
            )));
        }
        if self.tilt_cutoff_degrees >= 90.0 {
            return Err(SimError::Config(format!(
                "tiltCutoffDegrees must be below 90; got {}",
                self.tilt_cutoff_degrees
            )));
        }
        Ok(())
    }

    pub fn timestep(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.timestep_hz.max(1)))
    }

    pub fn stagnation_timeout(&self) -> Duration {
        seconds(self.stagnation_timeout_seconds)
    }

    pub fn fall_grace(&self) -> Duration {
        seconds(self.fall_grace_seconds)
    }

    pub fn max_trial(&self) -> Duration {
        seconds(self.max_trial_seconds)
    }

    pub fn tilt_cutoff(&self) -> f32 {
        self.tilt_cutoff_degrees.to_radians()
    }
}

// Saturating; `validate` rejects the values this would clamp.
fn seconds(value: f32) -> Duration {
    Duration::try_from_secs_f32(value.max(0.0)).unwrap_or(Duration::MAX)
}

fn resolve_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw_value = std::env::var(name).ok()?;
    match raw_value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("{name} could not be parsed; got '{raw_value}'. Keeping configured value");
            None
        }
    }
}

fn default_timestep_hz() -> u32 {
    50
}

fn default_gravity() -> f32 {
    -9.81
}

fn default_ground_friction() -> f32 {
    0.9
}

fn default_segment_friction() -> f32 {
    1.0
}

fn default_segment_radius() -> f32 {
    0.025
}

fn default_stagnation_timeout_seconds() -> f32 {
    5.0
}

fn default_fall_grace_seconds() -> f32 {
    1.0
}

fn default_max_trial_seconds() -> f32 {
    120.0
}

fn default_tilt_cutoff_degrees() -> f32 {
    30.0
}

fn default_rate_scale() -> f32 {
    0.1
}

fn default_torque_mode_rate() -> f32 {
    100.0
}

fn default_limit_strength_ratio() -> f32 {
    2.0
}

fn default_max_linear_speed() -> f32 {
    22.0
}

fn default_max_angular_speed() -> f32 {
    15.0
}

fn default_solver_substeps() -> u32 {
    8
}
