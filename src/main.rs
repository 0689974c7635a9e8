use clap::Parser;
use retrorush_sim::{
    config::SimConfig,
    data::ControlIntents,
    ghost::FileGhostStore,
    session::{RacePhase, Session},
    track::{DemoOval, TrackImage},
};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless RetroRush simulation runner", long_about = None)]
struct Args {
    /// Path to the simulation TOML configuration file
    #[arg(short, long, default_value = "./retrorush.toml")]
    config: PathBuf,

    /// Override log level (trace|debug|info|warn|error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Raw RGBA track mask; the built-in demo oval is used when omitted
    #[arg(short, long, requires_all = ["width", "height"])]
    track: Option<PathBuf>,

    /// Track mask width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Track mask height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Ghost file (defaults to `ghost.file` from the config)
    #[arg(short, long)]
    ghost: Option<PathBuf>,

    /// Input script: one `<seconds> <flags>` entry per line, flags from A B L R or `-`
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Seconds to hold the throttle when no script is given
    #[arg(short, long, default_value_t = 10.0)]
    duration: f32,

    /// Presentation frame rate fed to the scheduler
    #[arg(long, default_value_t = 144.0)]
    fps: f32,
}

#[derive(Debug, Error)]
enum ScriptError {
    #[error("line {line}: expected `<seconds> <flags>`")]
    Malformed { line: usize },
    #[error("line {line}: invalid duration `{value}`")]
    Duration { line: usize, value: String },
    #[error("line {line}: unknown input flag `{flag}`")]
    Flag { line: usize, flag: char },
}

#[derive(Debug, Clone, PartialEq)]
struct ScriptEntry {
    duration_s: f32,
    intents: ControlIntents,
}

/// Timed sequence of held inputs
#[derive(Debug, Clone, Default, PartialEq)]
struct InputScript {
    entries: Vec<ScriptEntry>,
}

impl InputScript {
    fn parse(source: &str) -> Result<Self, ScriptError> {
        let mut entries = Vec::new();
        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            let text = raw.split('#').next().unwrap_or_default().trim();
            if text.is_empty() {
                continue;
            }

            let mut fields = text.split_whitespace();
            let (Some(seconds), Some(flags), None) = (fields.next(), fields.next(), fields.next()) else {
                return Err(ScriptError::Malformed { line });
            };

            let duration_s = seconds
                .parse::<f32>()
                .ok()
                .filter(|d| d.is_finite() && *d >= 0.0)
                .ok_or_else(|| ScriptError::Duration {
                    line,
                    value: seconds.to_string(),
                })?;

            let mut intents = ControlIntents::NONE;
            for flag in flags.chars() {
                match flag.to_ascii_uppercase() {
                    'A' => intents.accelerate = true,
                    'B' => intents.brake = true,
                    'L' => intents.turn_left = true,
                    'R' => intents.turn_right = true,
                    '-' => {}
                    _ => return Err(ScriptError::Flag { line, flag }),
                }
            }
            entries.push(ScriptEntry { duration_s, intents });
        }
        Ok(Self { entries })
    }

    fn hold(duration_s: f32, intents: ControlIntents) -> Self {
        Self {
            entries: vec![ScriptEntry { duration_s, intents }],
        }
    }

    fn total_duration(&self) -> f32 {
        self.entries.iter().map(|e| e.duration_s).sum()
    }

    /// Inputs held at `time_s`; nothing once the script has run out
    fn intents_at(&self, time_s: f32) -> ControlIntents {
        let mut end = 0.0;
        for entry in &self.entries {
            end += entry.duration_s;
            if time_s < end {
                return entry.intents;
            }
        }
        ControlIntents::NONE
    }
}

fn load_track(args: &Args) -> Result<(TrackImage, bool), Box<dyn std::error::Error>> {
    match (&args.track, args.width, args.height) {
        (Some(path), Some(width), Some(height)) => {
            let pixels = fs::read(path)?;
            info!("Loaded track mask {:?} ({}x{})", path, width, height);
            Ok((TrackImage::new(width, height, pixels), false))
        }
        _ => {
            info!("No track mask given, using the demo oval");
            Ok((DemoOval::image(256, 144), true))
        }
    }
}

fn load_script(path: Option<&Path>, duration: f32) -> Result<InputScript, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let script = InputScript::parse(&fs::read_to_string(path)?)?;
            info!(
                "Loaded input script {:?}: {} entries, {:.1}s",
                path,
                script.entries.len(),
                script.total_duration()
            );
            Ok(script)
        }
        None => Ok(InputScript::hold(duration.max(0.0), ControlIntents::THROTTLE)),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Config first so its log level can apply; report load failures once tracing is up
    let loaded = SimConfig::load(&args.config);
    let log_level = args
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|c| c.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    info!("Starting RetroRush simulation v{}", env!("CARGO_PKG_VERSION"));

    let config = loaded.unwrap_or_else(|e| {
        warn!("Failed to load config {:?}: {}, using defaults", args.config, e);
        SimConfig::default()
    });

    let (track, is_demo) = load_track(&args)?;
    let script = load_script(args.script.as_deref(), args.duration)?;
    let ghost_path = args
        .ghost
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.ghost.file));

    let countdown_s = config.simulation.countdown_s;
    let mut session = Session::new(config, &track, FileGhostStore::new(ghost_path))?;
    if is_demo {
        session.set_spawn(DemoOval::spawn(session.terrain().world_size()));
    }

    let fps = if args.fps.is_finite() && args.fps > 0.0 { args.fps } else { 60.0 };
    let frame_dt = 1.0 / fps;
    // The script starts once the countdown is over
    let total_s = countdown_s + script.total_duration();
    let frames = (total_s * fps).ceil() as u64;

    let mut time_s = 0.0f32;
    for frame in 0..frames {
        let intents = if matches!(session.phase(), RacePhase::Countdown { .. }) {
            ControlIntents::NONE
        } else {
            script.intents_at((time_s - countdown_s).max(0.0))
        };

        let report = session.advance(frame_dt, &intents);
        for lap in &report.laps {
            info!(
                "Lap {}: {:.3}s{}",
                lap.lap,
                lap.lap_time,
                if lap.new_best { " NEW BEST" } else { "" }
            );
        }
        if frame % fps.max(1.0) as u64 == 0 {
            let pose = session.render_pose();
            debug!(
                "t={:.2}s pos=({:.1}, {:.1}) rot={:.1} speed={:.1} km/h",
                time_s,
                pose.position.x,
                pose.position.y,
                pose.rotation_deg,
                session.vehicle().speed_kmh()
            );
        }

        time_s += frame_dt;
        if session.phase() == RacePhase::Finished {
            break;
        }
    }

    let vehicle = session.vehicle();
    info!(
        "Final pose ({:.1}, {:.1}) rot {:.1}, {:.1} km/h, odometer {:.0}",
        vehicle.position().x,
        vehicle.position().y,
        vehicle.rotation(),
        vehicle.speed_kmh(),
        vehicle.distance()
    );
    info!(
        "Laps: {}, checkpoints this lap: {}, race time: {}, best: {}",
        session.lap_count(),
        session.checkpoints().checkpoints_passed(),
        session
            .race_time()
            .map_or_else(|| "-".to_string(), |t| format!("{:.3}s", t)),
        session
            .best_time()
            .map_or_else(|| "-".to_string(), |t| format!("{:.3}s", t.as_secs_f32()))
    );

    Ok(())
}
