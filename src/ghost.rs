//! Best-lap ghost: fixed-rate recording, compare-and-commit on lap
//! completion, interpolated playback and bincode persistence.
//!
//! On disk a trajectory is the bincode (fixed-int, little endian) encoding of
//! [`GhostTrajectory`]: `f32` lap time, `u64` sample count, then `count`
//! samples of three `f32` (x, y, rotation in degrees).

use crate::config::GhostSettings;
use crate::data::Pose;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum GhostError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Decode error: {0}")]
    Decode(#[from] bincode::Error),
    #[error("Invalid ghost: {0}")]
    Invalid(String),
    #[error("No best lap recorded")]
    NoBest,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GhostSample {
    pub x: f32,
    pub y: f32,
    pub rotation_deg: f32,
}

impl GhostSample {
    pub fn from_pose(position: Vec2, rotation_deg: f32) -> Self {
        Self {
            x: position.x,
            y: position.y,
            rotation_deg,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(Vec2::new(self.x, self.y), self.rotation_deg)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GhostTrajectory {
    pub total_time_s: f32,
    pub samples: Vec<GhostSample>,
}

impl GhostTrajectory {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn clear(&mut self) {
        self.total_time_s = 0.0;
        self.samples.clear();
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, GhostError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GhostError> {
        let trajectory: GhostTrajectory = bincode::deserialize(bytes)?;
        trajectory.validate()?;
        Ok(trajectory)
    }

    fn validate(&self) -> Result<(), GhostError> {
        if !(self.total_time_s.is_finite() && self.total_time_s > 0.0) {
            return Err(GhostError::Invalid(format!("lap time {}", self.total_time_s)));
        }
        if self.samples.is_empty() {
            return Err(GhostError::Invalid("no samples".into()));
        }
        let finite = self
            .samples
            .iter()
            .all(|s| s.x.is_finite() && s.y.is_finite() && s.rotation_deg.is_finite());
        if !finite {
            return Err(GhostError::Invalid("non-finite sample".into()));
        }
        Ok(())
    }

    /// Blend sample `index` towards the next one; `t` in [0, 1].
    /// Past the last sample, holds the final pose.
    pub fn interpolate(&self, index: usize, t: f32) -> Option<Pose> {
        let last = self.samples.len().checked_sub(1)?;
        let a = index.min(last);
        let b = (a + 1).min(last);
        let from = self.samples[a].pose();
        let to = self.samples[b].pose();
        Some(from.lerp(&to, t.clamp(0.0, 1.0)))
    }

    /// Pose at `elapsed_s` into the lap. Sample `i` was taken at
    /// `(i + 1) / record_hz` seconds.
    pub fn pose_at(&self, elapsed_s: f32, record_hz: u32) -> Option<Pose> {
        let last = self.samples.len().checked_sub(1)?;
        if elapsed_s >= self.total_time_s {
            return Some(self.samples[last].pose());
        }

        let position = (elapsed_s * record_hz as f32 - 1.0).max(0.0);
        let index = position.floor() as usize;
        if index >= last {
            return Some(self.samples[last].pose());
        }
        self.interpolate(index, position - index as f32)
    }
}

/// Result of a finished lap attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LapOutcome {
    NewBest { lap_time: f32 },
    Completed { lap_time: f32 },
}

impl LapOutcome {
    pub fn is_new_best(&self) -> bool {
        matches!(self, LapOutcome::NewBest { .. })
    }

    pub fn lap_time(&self) -> f32 {
        match self {
            LapOutcome::NewBest { lap_time } | LapOutcome::Completed { lap_time } => *lap_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GhostState {
    Idle,
    Recording,
}

pub struct GhostTrack {
    record_hz: u32,
    state: GhostState,
    lap_time_s: f32,
    since_sample_s: f32,
    current: GhostTrajectory,
    best: Option<GhostTrajectory>,
}

impl GhostTrack {
    pub fn new(settings: &GhostSettings) -> Self {
        Self {
            record_hz: settings.record_hz.max(1),
            state: GhostState::Idle,
            lap_time_s: 0.0,
            since_sample_s: 0.0,
            current: GhostTrajectory::default(),
            best: None,
        }
    }

    fn sample_interval(&self) -> f32 {
        1.0 / self.record_hz as f32
    }

    /// Arm recording for a new lap attempt
    pub fn start_recording(&mut self) {
        self.current.clear();
        self.lap_time_s = 0.0;
        self.since_sample_s = 0.0;
        self.state = GhostState::Recording;
        debug!("Ghost recording started");
    }

    pub fn is_recording(&self) -> bool {
        self.state == GhostState::Recording
    }

    /// Advance the lap clock. Negative or non-finite deltas are ignored.
    pub fn step(&mut self, dt: f32, position: Vec2, rotation_deg: f32) {
        if self.state != GhostState::Recording || !(dt.is_finite() && dt >= 0.0) {
            return;
        }
        self.lap_time_s += dt;
        self.since_sample_s += dt;

        let interval = self.sample_interval();
        while self.since_sample_s >= interval {
            self.since_sample_s -= interval;
            self.current
                .samples
                .push(GhostSample::from_pose(position, rotation_deg));
        }
    }

    /// Close the current attempt. `None` when nothing was being recorded.
    pub fn handle_lap_complete(&mut self) -> Option<LapOutcome> {
        if self.state != GhostState::Recording {
            return None;
        }
        let lap_time = self.lap_time_s;
        self.current.total_time_s = lap_time;

        let improves = match &self.best {
            Some(best) => lap_time < best.total_time_s,
            None => true,
        };

        let outcome = if improves && !self.current.is_empty() {
            let trajectory = std::mem::take(&mut self.current);
            info!(
                "New best lap: {:.3}s ({} samples)",
                lap_time,
                trajectory.len()
            );
            self.best = Some(trajectory);
            LapOutcome::NewBest { lap_time }
        } else {
            LapOutcome::Completed { lap_time }
        };

        self.reset();
        Some(outcome)
    }

    /// Drop the attempt in progress; the best lap is kept
    pub fn reset(&mut self) {
        self.state = GhostState::Idle;
        self.current.clear();
        self.lap_time_s = 0.0;
        self.since_sample_s = 0.0;
    }

    pub fn lap_time(&self) -> f32 {
        self.lap_time_s
    }

    pub fn best(&self) -> Option<&GhostTrajectory> {
        self.best.as_ref()
    }

    pub fn best_time(&self) -> Option<Duration> {
        self.best
            .as_ref()
            .and_then(|b| Duration::try_from_secs_f32(b.total_time_s).ok())
    }

    pub fn best_time_s(&self) -> Option<f32> {
        self.best.as_ref().map(|b| b.total_time_s)
    }

    /// Ghost pose for the current lap attempt, if one is running and a best
    /// lap exists
    pub fn playback_pose(&self) -> Option<Pose> {
        if self.state != GhostState::Recording {
            return None;
        }
        self.best.as_ref()?.pose_at(self.lap_time_s, self.record_hz)
    }

    /// Playback pose blended between the previous and current step, for a
    /// renderer that draws the car at `alpha` of the way through the last step
    pub fn playback_pose_at(&self, alpha: f32, step_s: f32) -> Option<Pose> {
        if self.state != GhostState::Recording {
            return None;
        }
        let behind = (1.0 - alpha.clamp(0.0, 1.0)) * step_s.max(0.0);
        let elapsed = (self.lap_time_s - behind).max(0.0);
        self.best.as_ref()?.pose_at(elapsed, self.record_hz)
    }

    pub fn save<W: Write>(&self, mut writer: W) -> Result<(), GhostError> {
        let best = self.best.as_ref().ok_or(GhostError::NoBest)?;
        writer.write_all(&best.to_bytes()?)?;
        writer.flush()?;
        Ok(())
    }

    /// Replace the best lap from `reader`. Any failure leaves no ghost and
    /// returns false.
    pub fn load<R: Read>(&mut self, mut reader: R) -> bool {
        let mut bytes = Vec::new();
        let result = reader
            .read_to_end(&mut bytes)
            .map_err(GhostError::from)
            .and_then(|_| GhostTrajectory::from_bytes(&bytes));
        self.accept_loaded(result)
    }

    pub fn save_to<S: GhostStore + ?Sized>(&self, store: &mut S) -> Result<(), GhostError> {
        let best = self.best.as_ref().ok_or(GhostError::NoBest)?;
        store.write(&best.to_bytes()?)?;
        info!("Saved best lap ghost ({:.3}s)", best.total_time_s);
        Ok(())
    }

    pub fn load_from<S: GhostStore + ?Sized>(&mut self, store: &mut S) -> bool {
        match store.read() {
            Ok(Some(bytes)) => self.accept_loaded(GhostTrajectory::from_bytes(&bytes)),
            Ok(None) => {
                info!("No saved ghost");
                self.best = None;
                false
            }
            Err(e) => self.accept_loaded(Err(e.into())),
        }
    }

    fn accept_loaded(&mut self, result: Result<GhostTrajectory, GhostError>) -> bool {
        match result {
            Ok(trajectory) => {
                info!(
                    "Loaded ghost: {:.3}s, {} samples",
                    trajectory.total_time_s,
                    trajectory.len()
                );
                self.best = Some(trajectory);
                true
            }
            Err(e) => {
                warn!("Ignoring saved ghost: {}", e);
                self.best = None;
                false
            }
        }
    }
}

/// Byte-stream collaborator holding the persisted best lap
pub trait GhostStore {
    /// `Ok(None)` when nothing has been stored yet
    fn read(&mut self) -> io::Result<Option<Vec<u8>>>;
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
}

pub struct FileGhostStore {
    path: PathBuf,
}

impl FileGhostStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GhostStore for FileGhostStore {
    fn read(&mut self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, bytes)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryGhostStore {
    pub bytes: Option<Vec<u8>>,
}

impl MemoryGhostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes: Some(bytes) }
    }
}

impl GhostStore for MemoryGhostStore {
    fn read(&mut self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.bytes.clone())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.bytes = Some(bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn settings(record_hz: u32) -> GhostSettings {
        GhostSettings {
            record_hz,
            file: String::new(),
        }
    }

    /// Record a lap of `seconds`, moving one unit along x per step
    fn record_lap(ghost: &mut GhostTrack, seconds: f32, dt: f32) -> Option<LapOutcome> {
        ghost.start_recording();
        let steps = (seconds / dt).round() as usize;
        for i in 0..steps {
            ghost.step(dt, Vec2::new(i as f32, 0.0), 0.0);
        }
        ghost.handle_lap_complete()
    }

    fn sample(x: f32, y: f32, rotation_deg: f32) -> GhostSample {
        GhostSample { x, y, rotation_deg }
    }

    #[test]
    fn test_best_only_improves_strictly() {
        let mut ghost = GhostTrack::new(&settings(2));
        let laps = [12.0, 15.0, 9.5, 9.5];
        let mut new_best = Vec::new();

        for (i, lap) in laps.iter().enumerate() {
            let outcome = record_lap(&mut ghost, *lap, 0.5).unwrap();
            assert_eq!(outcome.lap_time(), *lap);
            new_best.push(outcome.is_new_best());
            if i >= 2 {
                assert_eq!(ghost.best_time(), Some(Duration::from_secs_f32(9.5)));
            }
        }

        assert_eq!(new_best, vec![true, false, true, false]);
        assert_eq!(ghost.best_time_s(), Some(9.5));
    }

    #[test]
    fn test_records_at_fixed_rate_regardless_of_dt() {
        let mut coarse = GhostTrack::new(&settings(60));
        let mut fine = GhostTrack::new(&settings(60));

        record_lap(&mut coarse, 1.0, 1.0 / 30.0);
        record_lap(&mut fine, 1.0, 1.0 / 120.0);

        let coarse_len = coarse.best().unwrap().len() as i64;
        let fine_len = fine.best().unwrap().len() as i64;
        assert!((coarse_len - 60).abs() <= 1, "coarse {}", coarse_len);
        assert!((fine_len - 60).abs() <= 1, "fine {}", fine_len);
    }

    #[test]
    fn test_lap_complete_while_idle_is_ignored() {
        let mut ghost = GhostTrack::new(&settings(60));
        assert_eq!(ghost.handle_lap_complete(), None);

        ghost.step(1.0, Vec2::ZERO, 0.0);
        assert_eq!(ghost.lap_time(), 0.0);
        assert!(ghost.best().is_none());
    }

    #[test]
    fn test_empty_lap_never_becomes_best() {
        let mut ghost = GhostTrack::new(&settings(60));
        ghost.start_recording();

        let outcome = ghost.handle_lap_complete().unwrap();

        assert!(!outcome.is_new_best());
        assert!(ghost.best().is_none());
        assert!(!ghost.is_recording());
    }

    #[test]
    fn test_interpolate_endpoints_and_shortest_arc() {
        let trajectory = GhostTrajectory {
            total_time_s: 1.0,
            samples: vec![sample(0.0, 0.0, 350.0), sample(10.0, 4.0, 10.0)],
        };

        let start = trajectory.interpolate(0, 0.0).unwrap();
        let end = trajectory.interpolate(0, 1.0).unwrap();
        let mid = trajectory.interpolate(0, 0.5).unwrap();

        assert_eq!(start.position, Vec2::new(0.0, 0.0));
        assert_eq!(start.rotation_deg, 350.0);
        assert_eq!(end.position, Vec2::new(10.0, 4.0));
        assert!((end.rotation_deg - 10.0).abs() < 1e-4);
        assert_eq!(mid.position, Vec2::new(5.0, 2.0));
        assert!(mid.rotation_deg.abs() < 1e-4 || (mid.rotation_deg - 360.0).abs() < 1e-4);
    }

    #[test]
    fn test_playback_holds_final_sample() {
        let trajectory = GhostTrajectory {
            total_time_s: 0.5,
            samples: vec![sample(0.0, 0.0, 0.0), sample(1.0, 0.0, 0.0), sample(2.0, 0.0, 0.0)],
        };

        let held = trajectory.pose_at(30.0, 4).unwrap();
        assert_eq!(held.position, Vec2::new(2.0, 0.0));

        // Between sample 0 (0.25 s) and sample 1 (0.5 s)
        let between = trajectory.pose_at(0.375, 4).unwrap();
        assert!((between.position.x - 0.5).abs() < 1e-5);

        assert!(GhostTrajectory::default().pose_at(0.1, 4).is_none());
    }

    #[test]
    fn test_playback_pose_only_during_attempt() {
        let mut ghost = GhostTrack::new(&settings(2));
        record_lap(&mut ghost, 2.0, 0.5);
        assert!(ghost.playback_pose().is_none());

        ghost.start_recording();
        ghost.step(0.5, Vec2::ZERO, 0.0);
        let pose = ghost.playback_pose().unwrap();
        assert_eq!(pose.position, Vec2::new(0.0, 0.0));

        ghost.reset();
        assert!(ghost.playback_pose().is_none());
        assert!(ghost.best().is_some());
    }

    #[test]
    fn test_playback_follows_render_alpha() {
        let mut ghost = GhostTrack::new(&settings(60));
        ghost.best = Some(GhostTrajectory {
            total_time_s: 10.0,
            samples: (0..600).map(|i| sample(i as f32, 0.0, 0.0)).collect(),
        });
        ghost.start_recording();
        for _ in 0..10 {
            ghost.step(1.0 / 60.0, Vec2::ZERO, 0.0);
        }

        let step = 1.0 / 60.0;
        let xs: Vec<f32> = [0.0, 0.25, 0.5, 1.0]
            .iter()
            .map(|alpha| ghost.playback_pose_at(*alpha, step).unwrap().position.x)
            .collect();

        assert!(xs.windows(2).all(|w| w[0] < w[1]), "ghost should advance with alpha: {:?}", xs);
        let current = ghost.playback_pose().unwrap().position.x;
        assert!((xs[3] - current).abs() < 1e-3);
        assert!((xs[0] - (current - 1.0)).abs() < 1e-2);
    }

    #[test]
    fn test_invalid_dt_is_ignored() {
        let mut ghost = GhostTrack::new(&settings(2));
        ghost.start_recording();
        ghost.step(0.5, Vec2::ZERO, 0.0);

        ghost.step(-100.0, Vec2::ZERO, 0.0);
        ghost.step(f32::NAN, Vec2::ZERO, 0.0);
        ghost.step(f32::INFINITY, Vec2::ZERO, 0.0);
        assert_eq!(ghost.lap_time(), 0.5);

        let outcome = ghost.handle_lap_complete().unwrap();
        assert_eq!(outcome.lap_time(), 0.5);
        assert_eq!(ghost.best_time(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut ghost = GhostTrack::new(&settings(2));
        record_lap(&mut ghost, 3.0, 0.5);
        let original = ghost.best().unwrap().clone();

        let mut bytes = Vec::new();
        ghost.save(&mut bytes).unwrap();

        let mut loaded = GhostTrack::new(&settings(2));
        assert!(loaded.load(bytes.as_slice()));
        assert_eq!(loaded.best(), Some(&original));
    }

    #[test]
    fn test_byte_layout() {
        let trajectory = GhostTrajectory {
            total_time_s: 1.5,
            samples: vec![sample(1.0, 2.0, 90.0)],
        };
        let bytes = trajectory.to_bytes().unwrap();

        assert_eq!(bytes.len(), 4 + 8 + 3 * 4);
        assert_eq!(&bytes[0..4], &1.5f32.to_le_bytes());
        assert_eq!(&bytes[4..12], &1u64.to_le_bytes());
        assert_eq!(&bytes[12..16], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[20..24], &90.0f32.to_le_bytes());
    }

    #[test]
    fn test_truncated_or_invalid_data_means_no_ghost() {
        let trajectory = GhostTrajectory {
            total_time_s: 1.5,
            samples: vec![sample(1.0, 2.0, 90.0), sample(3.0, 4.0, 95.0)],
        };
        let bytes = trajectory.to_bytes().unwrap();

        let mut ghost = GhostTrack::new(&settings(60));
        assert!(!ghost.load(&bytes[..bytes.len() - 3]));
        assert!(ghost.best().is_none());

        assert!(!ghost.load(&[0u8; 0][..]));

        let empty = GhostTrajectory {
            total_time_s: 1.0,
            samples: Vec::new(),
        };
        assert!(!ghost.load(empty.to_bytes().unwrap().as_slice()));

        let nan_time = GhostTrajectory {
            total_time_s: f32::NAN,
            samples: vec![sample(0.0, 0.0, 0.0)],
        };
        assert!(!ghost.load(nan_time.to_bytes().unwrap().as_slice()));
    }

    #[test]
    fn test_failed_load_clears_previous_best() {
        let mut ghost = GhostTrack::new(&settings(2));
        record_lap(&mut ghost, 2.0, 0.5);
        assert!(ghost.best().is_some());

        assert!(!ghost.load(&[1u8, 2, 3][..]));
        assert!(ghost.best().is_none());
    }

    #[test]
    fn test_save_without_best_fails() {
        let ghost = GhostTrack::new(&settings(60));
        let mut store = MemoryGhostStore::new();
        assert!(matches!(ghost.save_to(&mut store), Err(GhostError::NoBest)));
        assert!(store.bytes.is_none());
    }

    #[test]
    fn test_memory_store_round_trip() {
        let mut ghost = GhostTrack::new(&settings(2));
        record_lap(&mut ghost, 2.0, 0.5);
        let mut store = MemoryGhostStore::new();
        ghost.save_to(&mut store).unwrap();

        let mut restored = GhostTrack::new(&settings(2));
        assert!(restored.load_from(&mut store));
        assert_eq!(restored.best_time_s(), Some(2.0));

        let mut empty = MemoryGhostStore::new();
        assert!(!restored.load_from(&mut empty));
    }

    #[test]
    fn test_file_store_missing_and_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileGhostStore::new(dir.path().join("saves").join("ghost.bin"));
        assert_eq!(store.read().unwrap(), None);

        store.write(&[1, 2, 3]).unwrap();
        assert_eq!(store.read().unwrap(), Some(vec![1, 2, 3]));
    }

    proptest! {
        #[test]
        fn prop_round_trip_is_exact(
            time in 0.01f32..600.0,
            raw in proptest::collection::vec((-1e4f32..1e4, -1e4f32..1e4, 0f32..360.0), 1..200)
        ) {
            let trajectory = GhostTrajectory {
                total_time_s: time,
                samples: raw.iter().map(|&(x, y, r)| sample(x, y, r)).collect(),
            };
            let decoded = GhostTrajectory::from_bytes(&trajectory.to_bytes().unwrap()).unwrap();
            prop_assert_eq!(decoded, trajectory);
        }

        #[test]
        fn prop_interpolated_rotation_stays_on_shorter_arc(
            from in 0f32..360.0,
            to in 0f32..360.0,
            t in 0f32..=1.0
        ) {
            let trajectory = GhostTrajectory {
                total_time_s: 1.0,
                samples: vec![sample(0.0, 0.0, from), sample(0.0, 0.0, to)],
            };
            let pose = trajectory.interpolate(0, t).unwrap();
            let arc = crate::data::shortest_arc_degrees(from, to).abs();
            let travelled = crate::data::shortest_arc_degrees(from, pose.rotation_deg).abs();
            prop_assert!((0.0..360.0).contains(&pose.rotation_deg));
            prop_assert!(travelled <= arc + 1e-3);
        }
    }
}
