//! Composition root: owns the terrain grid and every simulation component,
//! drives them from the fixed-step clock and turns their signals into race
//! flow (countdown, lap events, finish).

use crate::checkpoint::LapValidator;
use crate::clock::FixedStepClock;
use crate::config::{ConfigError, SimConfig};
use crate::data::{ControlIntents, Pose, TrackBounds};
use crate::ghost::{GhostStore, GhostTrack};
use crate::physics::VehicleModel;
use crate::terrain::{TerrainError, TerrainGrid};
use crate::track::TrackImage;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Terrain error: {0}")]
    Terrain(#[from] TerrainError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RacePhase {
    /// Inputs ignored, car held on the grid
    Countdown { remaining_s: f32 },
    Racing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapEvent {
    /// 1-based
    pub lap: u32,
    pub lap_time: f32,
    pub new_best: bool,
}

/// What happened during one presentation frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub steps: u32,
    pub alpha: f32,
    pub laps: Vec<LapEvent>,
}

pub struct Session<S: GhostStore> {
    config: SimConfig,
    terrain: Arc<TerrainGrid>,
    bounds: TrackBounds,
    vehicle: VehicleModel,
    checkpoints: LapValidator,
    ghost: GhostTrack,
    clock: FixedStepClock,
    store: S,
    phase: RacePhase,
    lap_count: u32,
    race_time: Option<f32>,
}

impl<S: GhostStore> Session<S> {
    /// Build every component. An invalid config or terrain image is fatal; a
    /// missing or unreadable ghost is not.
    pub fn new(config: SimConfig, track: &TrackImage, mut store: S) -> Result<Self, SessionError> {
        config.validate()?;

        let scale = config.track.world_width / track.width.max(1) as f32;
        let terrain = Arc::new(TerrainGrid::build(&track.pixels, track.width, track.height)?.with_scale(scale));
        let bounds = TrackBounds::from_size(terrain.world_size());

        let vehicle = VehicleModel::new(config.car.clone());
        let checkpoints = LapValidator::new(Arc::clone(&terrain), &config.lap);
        let mut ghost = GhostTrack::new(&config.ghost);
        ghost.load_from(&mut store);
        let clock = FixedStepClock::from_settings(&config.simulation);

        info!(
            "Session ready: world {}x{}, {} Hz, {} lap(s)",
            bounds.size().x,
            bounds.size().y,
            config.simulation.step_hz,
            config.simulation.race_laps
        );

        let phase = Self::starting_phase(&config);
        Ok(Self {
            config,
            terrain,
            bounds,
            vehicle,
            checkpoints,
            ghost,
            clock,
            store,
            phase,
            lap_count: 0,
            race_time: None,
        })
    }

    fn starting_phase(config: &SimConfig) -> RacePhase {
        if config.simulation.countdown_s > 0.0 {
            RacePhase::Countdown {
                remaining_s: config.simulation.countdown_s,
            }
        } else {
            RacePhase::Racing
        }
    }

    /// Feed one presentation frame of real time and run the steps it pays for
    pub fn advance(&mut self, real_dt: f32, intents: &ControlIntents) -> FrameReport {
        self.clock.accumulate(real_dt);

        let mut report = FrameReport::default();
        while self.clock.consume_step() {
            report.steps += 1;
            if let Some(event) = self.tick(intents) {
                report.laps.push(event);
            }
        }
        report.alpha = self.clock.alpha();
        report
    }

    /// One fixed simulation step
    pub fn tick(&mut self, intents: &ControlIntents) -> Option<LapEvent> {
        let dt = self.clock.step_secs();

        match self.phase {
            RacePhase::Countdown { remaining_s } => {
                let remaining_s = remaining_s - dt;
                self.phase = if remaining_s <= 0.0 {
                    info!("Race started");
                    RacePhase::Racing
                } else {
                    RacePhase::Countdown { remaining_s }
                };
                return None;
            }
            RacePhase::Finished => return None,
            RacePhase::Racing => {}
        }

        self.vehicle.step(dt, intents, &self.bounds, &self.terrain);
        let position = self.vehicle.position();
        self.checkpoints.step(dt, position);
        if let Some(race_time) = self.race_time.as_mut() {
            *race_time += dt;
        }
        self.ghost.step(dt, position, self.vehicle.rotation());

        if !self.terrain.is_finish_line(position) {
            return None;
        }

        // Checkpoints touched before the first attempt is armed do not count
        if !self.ghost.is_recording() {
            self.start_lap_attempt();
            return None;
        }

        if self.checkpoints.is_lap_complete() {
            return self.complete_lap();
        }
        None
    }

    fn start_lap_attempt(&mut self) {
        if self.race_time.is_none() {
            self.race_time = Some(0.0);
        }
        self.checkpoints.reset();
        self.ghost.start_recording();
    }

    fn complete_lap(&mut self) -> Option<LapEvent> {
        let outcome = self.ghost.handle_lap_complete()?;
        if outcome.is_new_best() {
            if let Err(e) = self.ghost.save_to(&mut self.store) {
                warn!("Failed to save ghost: {}", e);
            }
        }

        self.lap_count += 1;
        let event = LapEvent {
            lap: self.lap_count,
            lap_time: outcome.lap_time(),
            new_best: outcome.is_new_best(),
        };
        info!(
            "Lap {} complete: {:.3}s{}",
            event.lap,
            event.lap_time,
            if event.new_best { " (new best)" } else { "" }
        );

        self.checkpoints.reset();
        if self.lap_count >= self.config.simulation.race_laps {
            self.phase = RacePhase::Finished;
            info!(
                "Race finished: {} lap(s) in {:.3}s",
                self.lap_count,
                self.race_time.unwrap_or_default()
            );
        } else {
            self.ghost.start_recording();
        }
        Some(event)
    }

    /// Back to the grid; the best lap ghost is kept
    pub fn reset(&mut self) {
        self.vehicle.reset();
        self.checkpoints.reset();
        self.ghost.reset();
        self.clock.reset();
        self.lap_count = 0;
        self.race_time = None;
        self.phase = Self::starting_phase(&self.config);
    }

    pub fn set_spawn(&mut self, spawn: Pose) {
        self.vehicle.set_spawn(spawn);
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn lap_count(&self) -> u32 {
        self.lap_count
    }

    /// Seconds since the first finish-line crossing
    pub fn race_time(&self) -> Option<f32> {
        self.race_time
    }

    pub fn terrain(&self) -> &Arc<TerrainGrid> {
        &self.terrain
    }

    pub fn bounds(&self) -> &TrackBounds {
        &self.bounds
    }

    pub fn vehicle(&self) -> &VehicleModel {
        &self.vehicle
    }

    pub fn checkpoints(&self) -> &LapValidator {
        &self.checkpoints
    }

    pub fn ghost(&self) -> &GhostTrack {
        &self.ghost
    }

    pub fn best_time(&self) -> Option<Duration> {
        self.ghost.best_time()
    }

    pub fn alpha(&self) -> f32 {
        self.clock.alpha()
    }

    /// Car pose to draw this frame
    pub fn render_pose(&self) -> Pose {
        self.vehicle.interpolated_pose(self.clock.alpha())
    }

    /// Ghost pose to draw this frame, on the same timeline as `render_pose`
    pub fn ghost_pose(&self) -> Option<Pose> {
        self.ghost
            .playback_pose_at(self.clock.alpha(), self.clock.step_secs())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ghost::MemoryGhostStore;
    use crate::terrain::TerrainCategory;

    fn road(width: u32, height: u32) -> TrackImage {
        TrackImage::filled(width, height, TerrainCategory::Road)
    }

    fn config() -> SimConfig {
        let mut config = SimConfig::default();
        config.track.world_width = 200.0;
        config.car.spawn_x = 50.0;
        config.car.spawn_y = 10.0;
        config.car.spawn_rotation_deg = 0.0;
        config
    }

    #[test]
    fn test_bad_terrain_is_fatal() {
        let image = TrackImage::new(4, 4, vec![0; 10]);
        let result = Session::new(config(), &image, MemoryGhostStore::new());
        assert!(matches!(result, Err(SessionError::Terrain(_))));
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let mut config = config();
        config.simulation.step_hz = 0;
        let result = Session::new(config, &road(200, 20), MemoryGhostStore::new());
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[test]
    fn test_corrupt_ghost_is_not_fatal() {
        let store = MemoryGhostStore::with_bytes(vec![1, 2, 3]);
        let session = Session::new(config(), &road(200, 20), store).unwrap();
        assert!(session.best_time().is_none());
    }

    #[test]
    fn test_countdown_holds_the_car() {
        let mut session = Session::new(config(), &road(200, 20), MemoryGhostStore::new()).unwrap();
        let start = session.vehicle().position();

        // 3 s countdown at 60 Hz
        for _ in 0..170 {
            session.tick(&ControlIntents::THROTTLE);
        }
        assert!(matches!(session.phase(), RacePhase::Countdown { .. }));
        assert_eq!(session.vehicle().position(), start);

        for _ in 0..20 {
            session.tick(&ControlIntents::THROTTLE);
        }
        assert_eq!(session.phase(), RacePhase::Racing);
        assert!(session.vehicle().position().x > start.x);
    }

    #[test]
    fn test_advance_reports_steps_and_alpha() {
        let mut config = config();
        config.simulation.countdown_s = 0.0;
        let mut session = Session::new(config, &road(200, 20), MemoryGhostStore::new()).unwrap();

        let report = session.advance(2.5 / 60.0, &ControlIntents::THROTTLE);

        assert_eq!(report.steps, 2);
        assert!((report.alpha - 0.5).abs() < 1e-3);
        assert!(report.laps.is_empty());

        let stalled = session.advance(10.0, &ControlIntents::NONE);
        assert_eq!(stalled.steps, 12);
    }

    #[test]
    fn test_render_pose_does_not_move_the_car() {
        let mut config = config();
        config.simulation.countdown_s = 0.0;
        let mut session = Session::new(config, &road(200, 20), MemoryGhostStore::new()).unwrap();
        session.advance(10.5 / 60.0, &ControlIntents::THROTTLE);

        let before = session.vehicle().state().clone();
        let pose = session.render_pose();

        assert_eq!(session.vehicle().state(), &before);
        assert!(pose.position.x >= before.prev_position.x);
        assert!(pose.position.x <= before.position.x);
    }

    #[test]
    fn test_reset_returns_to_countdown() {
        let mut session = Session::new(config(), &road(200, 20), MemoryGhostStore::new()).unwrap();
        for _ in 0..400 {
            session.tick(&ControlIntents::THROTTLE);
        }

        session.reset();

        assert!(matches!(session.phase(), RacePhase::Countdown { .. }));
        assert_eq!(session.vehicle().position().x, 50.0);
        assert_eq!(session.vehicle().speed(), 0.0);
        assert_eq!(session.lap_count(), 0);
        assert_eq!(session.race_time(), None);
    }
}
