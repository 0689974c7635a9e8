use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub simulation: SimulationSettings,
    pub track: TrackSettings,
    pub car: CarSettings,
    pub lap: LapSettings,
    pub ghost: GhostSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub step_hz: u32,
    /// Upper bound on unprocessed real time carried between frames
    pub max_backlog_s: f32,
    pub countdown_s: f32,
    pub race_laps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackSettings {
    /// Width in world units the terrain image is stretched to
    pub world_width: f32,
}

/// Vehicle tunables. Rates are per second, distances in world units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarSettings {
    pub max_speed: f32,
    pub acceleration: f32,
    pub braking: f32,
    pub reverse_acceleration: f32,
    pub max_reverse_speed: f32,
    /// Forward speed under which the brake intent drives in reverse
    pub reverse_threshold: f32,

    // Steering
    pub max_turn_rate_deg: f32,
    pub turn_reference_speed: f32,
    pub steering_response: f32,

    // Grass transition
    pub grass_ramp_up: f32,
    pub grass_decay: f32,
    pub grass_power_loss: f32,
    pub corner_power_loss: f32,

    // Resistance
    pub rolling_friction: f32,
    pub grass_friction_factor: f32,
    pub steer_friction_factor: f32,
    pub engine_brake_factor: f32,
    pub drag_coefficient: f32,
    pub grass_drag_factor: f32,

    // Lateral grip
    pub lateral_retention: f32,
    pub grip_speed_scale: f32,
    pub grip_speed_bonus: f32,

    pub bounce_restitution: f32,

    pub length: f32,
    pub width: f32,

    pub spawn_x: f32,
    pub spawn_y: f32,
    pub spawn_rotation_deg: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LapSettings {
    pub checkpoint_cooldown_s: f32,
    pub checkpoints_required: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostSettings {
    pub record_hz: u32,
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            step_hz: 60,
            max_backlog_s: 0.2,
            countdown_s: 3.0,
            race_laps: 1,
        }
    }
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self { world_width: 1280.0 }
    }
}

impl Default for CarSettings {
    fn default() -> Self {
        Self {
            max_speed: 80.0,
            acceleration: 40.0,
            braking: 60.0,
            reverse_acceleration: 8.0,
            max_reverse_speed: 20.0,
            reverse_threshold: 1.0,

            max_turn_rate_deg: 90.0,
            turn_reference_speed: 20.0,
            steering_response: 6.0,

            grass_ramp_up: 2.0,
            grass_decay: 4.0,
            grass_power_loss: 0.6,
            corner_power_loss: 0.25,

            rolling_friction: 3.0,
            grass_friction_factor: 1.5,
            steer_friction_factor: 0.5,
            engine_brake_factor: 2.0,
            drag_coefficient: 0.004,
            grass_drag_factor: 5.0,

            lateral_retention: 0.7,
            grip_speed_scale: 100.0,
            grip_speed_bonus: 0.4,

            bounce_restitution: 0.3,

            length: 8.0,
            width: 4.0,

            spawn_x: 782.082,
            spawn_y: 458.342,
            spawn_rotation_deg: 145.0,
        }
    }
}

impl Default for LapSettings {
    fn default() -> Self {
        Self {
            checkpoint_cooldown_s: 0.5,
            checkpoints_required: 1,
        }
    }
}

impl Default for GhostSettings {
    fn default() -> Self {
        Self {
            record_hz: 60,
            file: "ghost.bin".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SimConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: SimConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}, using defaults", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.step_hz == 0 {
            return Err(ConfigError::Invalid("simulation.step_hz must be positive".into()));
        }
        if !(sim.max_backlog_s.is_finite() && sim.max_backlog_s >= 1.0 / sim.step_hz as f32) {
            return Err(ConfigError::Invalid(format!(
                "simulation.max_backlog_s ({}) must cover at least one step",
                sim.max_backlog_s
            )));
        }
        if sim.countdown_s < 0.0 {
            return Err(ConfigError::Invalid("simulation.countdown_s must not be negative".into()));
        }
        if !(self.track.world_width > 0.0) {
            return Err(ConfigError::Invalid("track.world_width must be positive".into()));
        }
        if self.ghost.record_hz == 0 {
            return Err(ConfigError::Invalid("ghost.record_hz must be positive".into()));
        }
        let car = &self.car;
        if !(car.length > 0.0 && car.width > 0.0) {
            return Err(ConfigError::Invalid("car dimensions must be positive".into()));
        }
        if !(car.max_speed > 0.0 && car.turn_reference_speed > 0.0 && car.grip_speed_scale > 0.0) {
            return Err(ConfigError::Invalid(
                "car.max_speed, car.turn_reference_speed and car.grip_speed_scale must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&car.bounce_restitution) {
            return Err(ConfigError::Invalid("car.bounce_restitution must be within [0, 1]".into()));
        }
        if self.lap.checkpoint_cooldown_s < 0.0 {
            return Err(ConfigError::Invalid("lap.checkpoint_cooldown_s must not be negative".into()));
        }
        if self.lap.checkpoints_required == 0 {
            return Err(ConfigError::Invalid("lap.checkpoints_required must be at least 1".into()));
        }
        Ok(())
    }
}
