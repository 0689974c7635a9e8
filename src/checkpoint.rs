use crate::config::LapSettings;
use crate::terrain::TerrainGrid;
use glam::Vec2;
use std::sync::Arc;
use tracing::debug;

/// Counts checkpoint crossings for the current lap.
///
/// A checkpoint region spans many cells, so after each counted crossing the
/// validator ignores further contact until the cooldown (simulated time) has
/// elapsed.
pub struct LapValidator {
    terrain: Arc<TerrainGrid>,
    cooldown_s: f32,
    required: u32,
    passed: u32,
    since_last_s: f32,
}

impl LapValidator {
    pub fn new(terrain: Arc<TerrainGrid>, settings: &LapSettings) -> Self {
        Self {
            terrain,
            cooldown_s: settings.checkpoint_cooldown_s.max(0.0),
            required: settings.checkpoints_required,
            passed: 0,
            since_last_s: 0.0,
        }
    }

    pub fn set_terrain(&mut self, terrain: Arc<TerrainGrid>) {
        self.terrain = terrain;
    }

    /// New lap: zero the count and restart the cooldown
    pub fn reset(&mut self) {
        self.passed = 0;
        self.since_last_s = 0.0;
    }

    pub fn step(&mut self, dt: f32, position: Vec2) {
        self.since_last_s += dt;
        if self.since_last_s < self.cooldown_s {
            return;
        }

        if self.terrain.is_checkpoint(position) {
            self.passed += 1;
            self.since_last_s = 0.0;
            debug!("Checkpoint {} of {} passed", self.passed, self.required);
        }
    }

    pub fn is_lap_complete(&self) -> bool {
        self.passed >= self.required
    }

    pub fn checkpoints_passed(&self) -> u32 {
        self.passed
    }

    pub fn checkpoints_required(&self) -> u32 {
        self.required
    }

    /// At least one checkpoint counted this lap
    pub fn has_started(&self) -> bool {
        self.passed > 0
    }
}
