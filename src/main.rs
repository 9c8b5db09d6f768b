//! camcheck — camera test tool.
//!
//! Live-monitors a webcam, samples frames for subject (face) presence in the
//! background, and captures timestamped snapshots or clips on command.
//! Commands are read from stdin: `s` snapshot, `r` record, `q` quit.

mod app;
mod camera;
mod capture;
mod config;
mod detector;
mod display;
mod error;
mod frame;
mod scheduler;
mod source;

use app::{Application, Command, TaskPeriods};
use camera::{CameraDevice, NokhwaCamera, RequestedMode, TestPatternCamera};
use capture::sink::FfmpegSinkFactory;
use capture::{CaptureController, ClipSettings};
use clap::Parser;
use detector::{ClassificationWorker, VarianceDetector};
use display::ConsoleDisplay;
use source::FrameSource;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Camera test tool: live monitor, subject detection, snapshot/clip capture
#[derive(Parser, Debug)]
#[command(name = "camcheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Output directory for snapshots and clips (default: current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Camera device index
    #[arg(long)]
    device: Option<u32>,

    /// Use a synthetic test pattern instead of a real camera
    #[arg(long)]
    test_pattern: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("camcheck starting (pid: {})", std::process::id());

    let mut config = config::load_config();
    if let Some(device) = cli.device {
        config.camera.device_index = device;
    }
    if let Some(output) = &cli.output {
        config.output.directory = Some(output.to_string_lossy().to_string());
    }

    let output_dir = config::get_output_dir(&config);
    if let Err(e) = config::validate_directory(&output_dir) {
        error!("Output directory {:?}: {}", output_dir, e);
        std::process::exit(1);
    }

    // The camera handle is constructed inside the acquisition thread.
    let camera_config = config.camera.clone();
    let test_pattern = cli.test_pattern;
    let source = match FrameSource::start(Box::new(move || {
        if test_pattern {
            Ok(Box::new(TestPatternCamera::new(
                camera_config.width,
                camera_config.height,
            )) as Box<dyn CameraDevice>)
        } else {
            let mode = RequestedMode {
                width: camera_config.width,
                height: camera_config.height,
                fps: camera_config.fps,
            };
            Ok(Box::new(NokhwaCamera::open(camera_config.device_index, mode)?)
                as Box<dyn CameraDevice>)
        }
    })) {
        Ok(source) => source,
        Err(e) => {
            // The one fatal error class: the device cannot be opened.
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let (width, height) = source.dimensions();
    info!("Camera ready at {}x{}", width, height);

    let worker = ClassificationWorker::spawn(Box::new(VarianceDetector::new(
        config.detection.variance_threshold,
    )));

    let clip = ClipSettings {
        duration: Duration::from_secs(config.capture.clip_seconds),
        fps: config.capture.clip_fps,
    };
    let controller = CaptureController::new(output_dir, clip, Box::new(FfmpegSinkFactory));

    let (command_tx, command_rx) = mpsc::channel();
    spawn_command_reader(command_tx);

    info!("Commands: 's' snapshot, 'r' record, 'q' quit");

    let periods = TaskPeriods::from_config(&config.timing, config.detection.sample_interval_ms);
    let mut application = Application::new(
        source,
        worker,
        controller,
        Box::new(ConsoleDisplay::new()),
        command_rx,
        periods,
    );
    application.run();

    info!("camcheck stopped");
}

/// Read user commands from stdin on a dedicated thread.
///
/// This stands in for the windowing surface's buttons; any frontend that can
/// feed the command channel works the same way.
fn spawn_command_reader(tx: mpsc::Sender<Command>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let command = match line.trim() {
                "s" | "snapshot" => Command::Snapshot,
                "r" | "record" => Command::Record,
                "q" | "quit" | "exit" => Command::Shutdown,
                "" => continue,
                other => {
                    warn!("Unknown command: {:?}", other);
                    continue;
                }
            };
            let is_shutdown = command == Command::Shutdown;
            if tx.send(command).is_err() || is_shutdown {
                break;
            }
        }
    });
}
