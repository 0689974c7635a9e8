//! Top-down vehicle dynamics, integrated at a fixed step.
//!
//! Each step runs the same pipeline in a fixed order, every stage consuming
//! the output of the previous one:
//! 1. progressive steering (bias eased toward the target, authority grows with speed)
//! 2. forward vector from the new heading
//! 3. grass transition smoothing
//! 4. throttle / brake / reverse along the forward vector
//! 5. rolling friction plus quadratic drag
//! 6. absolute speed cap
//! 7. lateral grip (partial drift)
//! 8. probe-based collision against the terrain grid, with a damped bounce

use crate::config::CarSettings;
use crate::data::{normalize_degrees, ControlIntents, Pose, TrackBounds};
use crate::terrain::TerrainGrid;
use glam::Vec2;

/// Below this speed, velocity is never normalized
const SPEED_EPSILON: f32 = 0.01;

/// A coasting car slower than this is brought to rest
const REST_SPEED: f32 = 0.05;

/// Full dynamic state of the car
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    pub position: Vec2,
    pub rotation_deg: f32,
    pub velocity: Vec2,
    /// Smoothed steering input in [-1, 1]
    pub steer_bias: f32,
    /// Smoothed 0..1 blend between road and grass behaviour
    pub grass_intensity: f32,

    // Previous step, kept for render interpolation
    pub prev_position: Vec2,
    pub prev_rotation_deg: f32,

    /// Odometer
    pub distance: f32,
    /// Set when the last step ended in a wall bounce
    pub is_colliding: bool,
}

impl VehicleState {
    pub fn at_pose(pose: Pose) -> Self {
        Self {
            position: pose.position,
            rotation_deg: pose.rotation_deg,
            velocity: Vec2::ZERO,
            steer_bias: 0.0,
            grass_intensity: 0.0,
            prev_position: pose.position,
            prev_rotation_deg: pose.rotation_deg,
            distance: 0.0,
            is_colliding: false,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            rotation_deg: self.rotation_deg,
        }
    }

    pub fn previous_pose(&self) -> Pose {
        Pose {
            position: self.prev_position,
            rotation_deg: self.prev_rotation_deg,
        }
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    pub fn forward(&self) -> Vec2 {
        Vec2::from_angle(self.rotation_deg.to_radians())
    }
}

pub struct VehicleModel {
    settings: CarSettings,
    spawn: Pose,
    state: VehicleState,
}

impl VehicleModel {
    pub fn new(settings: CarSettings) -> Self {
        let spawn = Pose::new(
            Vec2::new(settings.spawn_x, settings.spawn_y),
            settings.spawn_rotation_deg,
        );
        Self {
            settings,
            spawn,
            state: VehicleState::at_pose(spawn),
        }
    }

    pub fn settings(&self) -> &CarSettings {
        &self.settings
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn position(&self) -> Vec2 {
        self.state.position
    }

    pub fn rotation(&self) -> f32 {
        self.state.rotation_deg
    }

    pub fn speed(&self) -> f32 {
        self.state.speed()
    }

    /// Speed for HUD display
    pub fn speed_kmh(&self) -> f32 {
        self.state.speed() * 3.6
    }

    pub fn distance(&self) -> f32 {
        self.state.distance
    }

    pub fn spawn(&self) -> Pose {
        self.spawn
    }

    /// Move the spawn point and place the car on it
    pub fn set_spawn(&mut self, spawn: Pose) {
        self.spawn = spawn;
        self.reset();
    }

    /// Teleport; also collapses the interpolation window onto the new pose
    pub fn set_pose(&mut self, pose: Pose) {
        let pose = Pose::new(pose.position, pose.rotation_deg);
        self.state.position = pose.position;
        self.state.rotation_deg = pose.rotation_deg;
        self.state.prev_position = pose.position;
        self.state.prev_rotation_deg = pose.rotation_deg;
    }

    pub fn reset_velocity(&mut self) {
        self.state.velocity = Vec2::ZERO;
    }

    /// Back to the spawn pose with all dynamic state cleared
    pub fn reset(&mut self) {
        self.state = VehicleState::at_pose(self.spawn);
    }

    pub fn interpolated_position(&self, alpha: f32) -> Vec2 {
        self.interpolated_pose(alpha).position
    }

    /// Render pose between the previous and current step. Read-only.
    pub fn interpolated_pose(&self, alpha: f32) -> Pose {
        let alpha = alpha.clamp(0.0, 1.0);
        self.state.previous_pose().lerp(&self.state.pose(), alpha)
    }

    /// Advance the car by one fixed step
    pub fn step(
        &mut self,
        dt: f32,
        intents: &ControlIntents,
        bounds: &TrackBounds,
        terrain: &TerrainGrid,
    ) {
        let cfg = &self.settings;
        let state = &mut self.state;

        state.prev_position = state.position;
        state.prev_rotation_deg = state.rotation_deg;

        // 1. Steering
        let speed = state.speed();
        update_steering(state, cfg, intents, speed, dt);

        // 2. Forward vector from the new heading
        let forward = state.forward();

        // 3. Terrain transition smoothing
        let on_grass = terrain.is_on_grass(state.position);
        update_grass_intensity(state, cfg, on_grass, dt);

        // 4. Acceleration
        apply_drive(state, cfg, intents, forward, dt);

        // 5. Resistance
        apply_resistance(state, cfg, intents, dt);

        // 6. Absolute speed cap; off-road top speed comes from drag alone
        state.velocity = state.velocity.clamp_length_max(cfg.max_speed);

        // 7. Lateral grip
        apply_lateral_grip(state, cfg, forward);

        // 8. Collision resolution
        resolve_motion(state, cfg, forward, bounds, terrain, dt);
    }
}

fn update_steering(
    state: &mut VehicleState,
    cfg: &CarSettings,
    intents: &ControlIntents,
    speed: f32,
    dt: f32,
) {
    let target = intents.steer_target();
    let max_delta = cfg.steering_response * dt;
    state.steer_bias += (target - state.steer_bias).clamp(-max_delta, max_delta);
    state.steer_bias = state.steer_bias.clamp(-1.0, 1.0);

    let turn_factor = (speed / cfg.turn_reference_speed).min(1.0);
    let rotation_delta = state.steer_bias * cfg.max_turn_rate_deg * turn_factor * dt;
    state.rotation_deg = normalize_degrees(state.rotation_deg + rotation_delta);
}

fn update_grass_intensity(state: &mut VehicleState, cfg: &CarSettings, on_grass: bool, dt: f32) {
    state.grass_intensity = if on_grass {
        (state.grass_intensity + cfg.grass_ramp_up * dt).min(1.0)
    } else {
        (state.grass_intensity - cfg.grass_decay * dt).max(0.0)
    };
}

fn apply_drive(
    state: &mut VehicleState,
    cfg: &CarSettings,
    intents: &ControlIntents,
    forward: Vec2,
    dt: f32,
) {
    if intents.accelerate {
        let power = cfg.acceleration
            * (1.0 - cfg.grass_power_loss * state.grass_intensity)
            * (1.0 - cfg.corner_power_loss * state.steer_bias.abs());
        state.velocity += forward * power.max(0.0) * dt;
    }

    if intents.brake {
        let forward_speed = state.velocity.dot(forward);
        if forward_speed > cfg.reverse_threshold {
            state.velocity -= forward * cfg.braking * dt;
        } else if -forward_speed < cfg.max_reverse_speed {
            state.velocity -= forward * cfg.reverse_acceleration * dt;
        }
    }
}

fn apply_resistance(state: &mut VehicleState, cfg: &CarSettings, intents: &ControlIntents, dt: f32) {
    let speed = state.speed();
    if speed <= SPEED_EPSILON {
        if intents.is_coasting() {
            state.velocity = Vec2::ZERO;
        }
        return;
    }

    let grass = state.grass_intensity;
    let mut friction = cfg.rolling_friction
        * (1.0 + cfg.grass_friction_factor * grass)
        * (1.0 + cfg.steer_friction_factor * state.steer_bias.abs());
    if intents.is_coasting() {
        friction *= cfg.engine_brake_factor;
    }
    let drag = cfg.drag_coefficient * (1.0 + cfg.grass_drag_factor * grass) * speed * speed;

    let new_speed = (speed - (friction + drag) * dt).max(0.0);
    if new_speed < REST_SPEED && intents.is_coasting() {
        state.velocity = Vec2::ZERO;
    } else {
        state.velocity *= new_speed / speed;
    }
}

fn apply_lateral_grip(state: &mut VehicleState, cfg: &CarSettings, forward: Vec2) {
    let speed = state.speed();
    let forward_speed = state.velocity.dot(forward);
    let lateral = state.velocity - forward * forward_speed;

    let retention = (cfg.lateral_retention - (speed / cfg.grip_speed_scale).min(cfg.grip_speed_bonus))
        .clamp(0.0, 1.0);
    state.velocity = forward * forward_speed + lateral * retention;
}

/// Half extents of the car's rotated bounding box
fn rotated_half_extents(cfg: &CarSettings, forward: Vec2) -> Vec2 {
    let half_length = cfg.length / 2.0;
    let half_width = cfg.width / 2.0;
    let (c, s) = (forward.x.abs(), forward.y.abs());
    Vec2::new(c * half_length + s * half_width, s * half_length + c * half_width)
}

fn resolve_motion(
    state: &mut VehicleState,
    cfg: &CarSettings,
    forward: Vec2,
    bounds: &TrackBounds,
    terrain: &TerrainGrid,
    dt: f32,
) {
    let candidate = bounds.clamp_with_margin(
        state.position + state.velocity * dt,
        rotated_half_extents(cfg, forward),
    );

    // Probe the bumper on the side we are moving towards, plus the centre
    let half_length = cfg.length / 2.0;
    let bumper = if state.velocity.dot(forward) >= 0.0 {
        candidate + forward * half_length
    } else {
        candidate - forward * half_length
    };

    let blocked = !terrain.is_traversable(candidate) || !terrain.is_traversable(bumper);
    if blocked {
        state.velocity = -state.velocity * cfg.bounce_restitution;
        state.is_colliding = true;
        return;
    }

    state.distance += candidate.distance(state.position);
    state.position = candidate;
    state.is_colliding = false;
}
