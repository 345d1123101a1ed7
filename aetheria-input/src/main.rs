//! Aetheria Input - diagnostic console
//!
//! Starts the sensor hub, optionally runs a breath calibration window, then
//! prints breath and motion readings at 10 Hz. Sensitivity can be stepped
//! from stdin while it runs.
//!
//! Usage:
//!   cargo run -p aetheria-input -- --simulate --calibrate 4 --duration 20

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use aetheria_input::telemetry::{init_logging, LogConfig};
use aetheria_input::{
    normalized_effort, BreathCalibration, CalibrationPhase, SensitivityControls, SensorConfig, SensorHub,
};
use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};

const TICK: Duration = Duration::from_millis(100);

/// Seconds from the command line; anything not positive and finite is zero
fn seconds(value: f32) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f32(value.min(1.0e9))
    } else {
        Duration::ZERO
    }
}

/// Live breath and motion readings from the microphone and camera.
#[derive(Parser)]
#[command(name = "aetheria-input", version, about = "Print live breath and motion readings")]
struct Cli {
    /// Input device name (default: system default microphone).
    #[arg(long)]
    mic: Option<String>,

    /// Requested microphone sample rate in Hz.
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Camera index.
    #[arg(long)]
    camera: Option<u32>,

    /// Use simulated devices even when hardware support is compiled in.
    #[arg(long)]
    simulate: bool,

    /// Run a breath calibration window of this many seconds first.
    #[arg(long, value_name = "SECS")]
    calibrate: Option<f32>,

    /// Stop after this many seconds.
    #[arg(long, value_name = "SECS", default_value_t = 30.0)]
    duration: f32,

    /// Breath gain applied at read time.
    #[arg(long)]
    multiplier: Option<f32>,

    /// Motion intensity threshold (0-100).
    #[arg(long)]
    threshold: Option<f32>,

    /// Sensor profile to load instead of the one in the config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the last camera frame to this image file on exit.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Also append logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Sensitivity commands read from stdin
enum Command {
    MultiplierUp,
    MultiplierDown,
    ThresholdUp,
    ThresholdDown,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "+" => Some(Command::MultiplierUp),
            "-" => Some(Command::MultiplierDown),
            ">" => Some(Command::ThresholdUp),
            "<" => Some(Command::ThresholdDown),
            "q" | "quit" => Some(Command::Quit),
            _ => None,
        }
    }
}

fn spawn_stdin_reader() -> Receiver<Command> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let spawned = std::thread::Builder::new().name("stdin".to_string()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match Command::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None => eprintln!("commands: + / - (breath gain), > / < (motion threshold), q (quit)"),
            }
        }
    });
    if let Err(e) = spawned {
        tracing::warn!("Interactive controls disabled: {}", e);
    }
    rx
}

fn load_config(cli: &Cli) -> Result<SensorConfig, String> {
    let mut config = match cli.config.as_ref() {
        Some(path) => SensorConfig::load_from_file(path).map_err(|e| format!("{}: {}", path.display(), e))?,
        None => SensorConfig::load(),
    };

    if let Some(mic) = cli.mic.as_ref() {
        config.audio.device = Some(mic.clone());
    }
    if let Some(rate) = cli.sample_rate {
        config.audio.sample_rate = rate;
    }
    if let Some(camera) = cli.camera {
        config.video.camera_index = camera;
    }
    if let Some(multiplier) = cli.multiplier {
        config.audio.breath_multiplier = multiplier;
    }
    if let Some(threshold) = cli.threshold {
        config.video.motion_threshold = threshold;
    }
    config.sanitize();
    Ok(config)
}

fn run_calibration(hub: &SensorHub, window: Duration) -> f32 {
    let mut calibration = BreathCalibration::new(window);
    eprintln!("Calibrating: breathe out as hard as you can for {:.1}s", window.as_secs_f32());

    calibration.begin(Instant::now());
    while calibration.sample(Instant::now(), hub.breath_intensity()) == CalibrationPhase::Listening {
        std::thread::sleep(TICK);
    }

    let max_breath = calibration.max_breath();
    eprintln!("Calibration peak {:.3}, using max breath {:.3}", calibration.peak(), max_breath);
    max_breath
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig {
        json_format: cli.log_json,
        file_path: cli.log_file.clone(),
        ..Default::default()
    };
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: cannot load sensor config {}", e);
            return ExitCode::FAILURE;
        }
    };
    let shutdown_timeout = config.shutdown_timeout();

    let mut hub = if cli.simulate {
        SensorHub::simulated(config)
    } else {
        SensorHub::with_default_backends(config)
    };

    if let Err(e) = hub.start() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let max_breath = cli
        .calibrate
        .map(seconds)
        .filter(|window| !window.is_zero())
        .map(|window| run_calibration(&hub, window));

    let tuning = hub.tuning();
    let mut controls = SensitivityControls::with_values(tuning.clone(), tuning.breath_multiplier(), tuning.motion_threshold());
    let commands = spawn_stdin_reader();

    let deadline = Instant::now() + seconds(cli.duration);
    'run: while Instant::now() < deadline {
        let snapshot = hub.snapshot();
        let effort = max_breath
            .map(|max| format!(" effort={:4.0}%", normalized_effort(snapshot.breath_intensity, max) * 100.0))
            .unwrap_or_default();
        println!(
            "breath={:8.2}{} motion={:5} ({:5.1}) audio={} video={} gain={:.0}x threshold={:.0}",
            snapshot.breath_intensity,
            effort,
            snapshot.motion.detected,
            snapshot.motion.intensity,
            snapshot.audio_status,
            snapshot.video_status,
            tuning.breath_multiplier(),
            tuning.motion_threshold(),
        );

        let tick_end = Instant::now() + TICK;
        loop {
            let wait = tick_end.saturating_duration_since(Instant::now());
            match commands.recv_timeout(wait) {
                Ok(Command::MultiplierUp) => {
                    controls.increase_multiplier();
                }
                Ok(Command::MultiplierDown) => {
                    controls.decrease_multiplier();
                }
                Ok(Command::ThresholdUp) => {
                    controls.increase_threshold();
                }
                Ok(Command::ThresholdDown) => {
                    controls.decrease_threshold();
                }
                Ok(Command::Quit) => break 'run,
                Err(RecvTimeoutError::Timeout) => break,
                // stdin closed; keep printing until the deadline
                Err(RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(wait);
                    break;
                }
            }
        }
    }

    if let Some(path) = cli.snapshot.as_ref() {
        match hub.camera_frame() {
            Some(frame) => match frame.save(path) {
                Ok(()) => eprintln!("Saved frame {} to {}", frame.frame_number, path.display()),
                Err(e) => eprintln!("Failed to save frame: {}", e),
            },
            None => eprintln!("No camera frame to save"),
        }
    }

    if hub.shutdown(shutdown_timeout) {
        ExitCode::SUCCESS
    } else {
        eprintln!("Warning: a capture thread did not exit within {:?}", shutdown_timeout);
        ExitCode::FAILURE
    }
}
