use crate::config::SimulationSettings;
use std::time::Duration;
use tracing::debug;

/// Fixed-step accumulator with a bounded backlog.
///
/// Real frame time goes in through [`accumulate`](Self::accumulate); the
/// caller then drains whole steps with [`consume_step`](Self::consume_step)
/// and renders with [`alpha`](Self::alpha).
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    step: Duration,
    /// Step length handed to the simulation
    step_secs: f32,
    max_backlog: Duration,
    accumulator: Duration,
}

impl FixedStepClock {
    pub fn new(step: Duration, max_backlog: Duration) -> Self {
        Self {
            step,
            step_secs: step.as_secs_f32(),
            max_backlog: max_backlog.max(step),
            accumulator: Duration::ZERO,
        }
    }

    pub fn from_settings(settings: &SimulationSettings) -> Self {
        let hz = settings.step_hz.max(1);
        let step = Duration::from_nanos(1_000_000_000 / hz as u64);
        let backlog = Duration::try_from_secs_f64(settings.max_backlog_s as f64).unwrap_or(step);
        Self {
            step_secs: 1.0 / hz as f32,
            ..Self::new(step, backlog)
        }
    }

    /// Add real elapsed time. Negative or non-finite deltas are ignored.
    pub fn accumulate(&mut self, real_dt: f32) {
        let Ok(dt) = Duration::try_from_secs_f32(real_dt) else {
            return;
        };
        self.accumulator += dt;
        if self.accumulator > self.max_backlog {
            debug!(
                "Clamping simulation backlog {:?} to {:?}",
                self.accumulator, self.max_backlog
            );
            self.accumulator = self.max_backlog;
        }
    }

    /// Take one step off the backlog if a whole step is available
    pub fn consume_step(&mut self) -> bool {
        if self.accumulator >= self.step {
            self.accumulator -= self.step;
            true
        } else {
            false
        }
    }

    /// Leftover time as a fraction of one step, in [0, 1)
    pub fn alpha(&self) -> f32 {
        (self.accumulator.as_secs_f64() / self.step.as_secs_f64()) as f32
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn step_secs(&self) -> f32 {
        self.step_secs
    }

    pub fn backlog(&self) -> Duration {
        self.accumulator
    }

    /// Most steps a single frame can ever trigger
    pub fn max_steps_per_frame(&self) -> u32 {
        (self.max_backlog.as_nanos() / self.step.as_nanos().max(1)) as u32
    }

    pub fn reset(&mut self) {
        self.accumulator = Duration::ZERO;
    }
}
