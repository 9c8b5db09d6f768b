//! Snapshot and clip capture.
//!
//! `CaptureController` holds the mode state machine. The display task calls
//! `run_pending_action` when a non-live mode is set; the action runs
//! synchronously on the control thread (suspending live display for its
//! duration) and always returns the mode to live when it completes.

pub mod sink;

use crate::display::DisplaySink;
use crate::error::CaptureError;
use crate::frame::Frame;
use crate::source::FrameSource;
use chrono::Local;
use sink::VideoSinkFactory;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Capture mode state. Exactly one value at any instant; transitions are
/// triggered by user commands and cleared when the action completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Live display, no capture pending
    Live,
    /// Persist one annotated still on the next display firing
    SnapshotPending,
    /// Record a fixed-duration clip on the next display firing
    RecordingPending,
}

/// Settings for clip recording.
#[derive(Debug, Clone, Copy)]
pub struct ClipSettings {
    pub duration: Duration,
    pub fps: u32,
}

impl Default for ClipSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            fps: 15,
        }
    }
}

/// Capacity of the recording tap channel, sized for about two seconds of
/// frames at the default camera rate.
const TAP_CAPACITY: usize = 64;

/// How long to wait for the first tapped frame before giving up on a clip.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Executes user-requested persistence actions.
pub struct CaptureController {
    mode: CaptureMode,
    output_dir: PathBuf,
    clip: ClipSettings,
    sinks: Box<dyn VideoSinkFactory>,
}

impl CaptureController {
    pub fn new(output_dir: PathBuf, clip: ClipSettings, sinks: Box<dyn VideoSinkFactory>) -> Self {
        Self {
            mode: CaptureMode::Live,
            output_dir,
            clip,
            sinks,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Arm a snapshot. Idempotent while already pending; ignored while a
    /// recording is armed.
    pub fn request_snapshot(&mut self) {
        match self.mode {
            CaptureMode::Live | CaptureMode::SnapshotPending => {
                self.mode = CaptureMode::SnapshotPending;
            }
            CaptureMode::RecordingPending => {
                warn!("Snapshot request ignored: recording already pending");
            }
        }
    }

    /// Arm a clip recording. Idempotent while already pending; ignored while
    /// a snapshot is armed.
    pub fn request_recording(&mut self) {
        match self.mode {
            CaptureMode::Live | CaptureMode::RecordingPending => {
                self.mode = CaptureMode::RecordingPending;
            }
            CaptureMode::SnapshotPending => {
                warn!("Recording request ignored: snapshot already pending");
            }
        }
    }

    /// Execute whatever action is armed, then return to live mode.
    ///
    /// Invoked from the display task. A capture-action failure is reported
    /// to the display log, never propagated: the process keeps running.
    pub fn run_pending_action(
        &mut self,
        source: &FrameSource,
        subject_present: bool,
        display: &mut dyn DisplaySink,
    ) {
        match self.mode {
            CaptureMode::Live => {}
            CaptureMode::SnapshotPending => {
                match self.save_snapshot(source.latest(), subject_present) {
                    Ok(path) => {
                        info!("Saved snapshot: {}", path.display());
                        display.log(&format!("Saved file: {}", path.display()));
                    }
                    Err(e) => {
                        warn!("Snapshot failed: {}", e);
                        display.log(&format!("Snapshot failed: {}", e));
                    }
                }
            }
            CaptureMode::RecordingPending => match self.record_clip(source, display) {
                Ok((path, frames)) => {
                    info!("Saved clip: {} ({} frames)", path.display(), frames);
                    display.log(&format!("Saved file: {}", path.display()));
                }
                Err(e) => {
                    warn!("Recording failed: {}", e);
                    display.log(&format!("Recording failed: {}", e));
                }
            },
        }
        self.mode = CaptureMode::Live;
    }

    /// Persist one annotated still as `<timestamp>.jpg`.
    fn save_snapshot(
        &self,
        frame: Option<Arc<Frame>>,
        subject_present: bool,
    ) -> Result<PathBuf, CaptureError> {
        let frame = frame.ok_or(CaptureError::NoFrame)?;
        let path = self.output_dir.join(timestamp_name("jpg"));

        // Annotation happens on a copy; the shared frame is never touched.
        let annotated = frame.annotated(subject_present);
        let (width, height) = (annotated.width(), annotated.height());
        let buffer = image::RgbImage::from_raw(width, height, annotated.into_data())
            .ok_or_else(|| CaptureError::EncodeFailed("frame buffer mismatch".to_string()))?;
        buffer
            .save(&path)
            .map_err(|e| CaptureError::Io(e.to_string()))?;
        Ok(path)
    }

    /// Record a clip of the configured duration as `<timestamp>.avi`.
    ///
    /// Drains the frame tap so every captured frame lands in the file. Runs
    /// synchronously on the caller's thread for the whole duration; live
    /// display and the other periodic tasks are suspended meanwhile.
    fn record_clip(
        &self,
        source: &FrameSource,
        display: &mut dyn DisplaySink,
    ) -> Result<(PathBuf, u64), CaptureError> {
        let path = self.output_dir.join(timestamp_name("avi"));
        let frames = source.tap(TAP_CAPACITY);

        let result = (|| {
            let first = frames
                .recv_timeout(FIRST_FRAME_TIMEOUT)
                .map_err(|_| CaptureError::NoFrame)?;

            let mut sink = self
                .sinks
                .open(&path, first.width(), first.height(), self.clip.fps)?;

            display.log(&format!(
                "Recording clip: {} seconds",
                self.clip.duration.as_secs()
            ));
            info!("Recording started: {}", path.display());

            let started = Instant::now();
            sink.write_frame(&first)?;

            while started.elapsed() < self.clip.duration {
                let remaining = self.clip.duration.saturating_sub(started.elapsed());
                match frames.recv_timeout(remaining.min(Duration::from_millis(250))) {
                    Ok(frame) => sink.write_frame(&frame)?,
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                        debug!("Frame tap closed mid-clip");
                        break;
                    }
                }
            }

            let written = sink.finish()?;
            Ok((path.clone(), written))
        })();

        source.untap();
        result
    }
}

/// Timestamp-derived filename, `YYYY-MM-DD_HH-MM-SS.<ext>`.
fn timestamp_name(ext: &str) -> String {
    format!("{}.{}", Local::now().format("%Y-%m-%d_%H-%M-%S"), ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraDevice, TestPatternCamera};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct NullDisplay {
        lines: Vec<String>,
        frames: u64,
    }

    impl NullDisplay {
        fn new() -> Self {
            Self {
                lines: Vec::new(),
                frames: 0,
            }
        }
    }

    impl DisplaySink for NullDisplay {
        fn show_frame(&mut self, _frame: &Frame) {
            self.frames += 1;
        }
        fn show_status(&mut self, _status: &str) {}
        fn log(&mut self, line: &str) {
            self.lines.push(line.to_string());
        }
    }

    #[derive(Default)]
    struct MockSinkState {
        frames: AtomicU64,
        finished: AtomicU64,
    }

    struct MockSink {
        state: Arc<MockSinkState>,
    }

    impl sink::VideoSink for MockSink {
        fn write_frame(&mut self, _frame: &Frame) -> Result<(), CaptureError> {
            self.state.frames.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn finish(self: Box<Self>) -> Result<u64, CaptureError> {
            self.state.finished.fetch_add(1, Ordering::SeqCst);
            Ok(self.state.frames.load(Ordering::SeqCst))
        }
    }

    struct MockSinkFactory {
        state: Arc<MockSinkState>,
        opened: Mutex<Vec<PathBuf>>,
    }

    impl VideoSinkFactory for MockSinkFactory {
        fn open(
            &self,
            path: &std::path::Path,
            _width: u32,
            _height: u32,
            _fps: u32,
        ) -> Result<Box<dyn sink::VideoSink>, CaptureError> {
            self.opened.lock().unwrap().push(path.to_path_buf());
            Ok(Box::new(MockSink {
                state: self.state.clone(),
            }))
        }
    }

    fn pattern_source() -> FrameSource {
        FrameSource::start(Box::new(|| {
            Ok(Box::new(TestPatternCamera::new(32, 24)) as Box<dyn CameraDevice>)
        }))
        .expect("start source")
    }

    fn temp_output_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "camcheck_test_{}_{}",
            tag,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn snapshot_without_frame_reports_error_and_writes_nothing() {
        let dir = temp_output_dir("nosnap");
        let mut controller = CaptureController::new(
            dir.clone(),
            ClipSettings::default(),
            Box::new(sink::FfmpegSinkFactory),
        );
        // A source whose camera never produces a frame
        let mut source = FrameSource::start(Box::new(|| {
            struct DeadCamera;
            impl CameraDevice for DeadCamera {
                fn dimensions(&self) -> (u32, u32) {
                    (0, 0)
                }
                fn read(&mut self) -> Option<Frame> {
                    std::thread::sleep(Duration::from_millis(1));
                    None
                }
            }
            Ok(Box::new(DeadCamera) as Box<dyn CameraDevice>)
        }))
        .unwrap();

        let mut display = NullDisplay::new();
        controller.request_snapshot();
        controller.run_pending_action(&source, false, &mut display);

        assert_eq!(controller.mode(), CaptureMode::Live);
        assert!(display.lines.iter().any(|l| l.contains("Snapshot failed")));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        source.stop();
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn snapshot_writes_one_jpg_and_returns_to_live() {
        let dir = temp_output_dir("snap");
        let mut controller = CaptureController::new(
            dir.clone(),
            ClipSettings::default(),
            Box::new(sink::FfmpegSinkFactory),
        );
        let mut source = pattern_source();
        // Wait until a frame exists
        let deadline = Instant::now() + Duration::from_secs(2);
        while source.latest().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        let mut display = NullDisplay::new();
        controller.request_snapshot();
        controller.run_pending_action(&source, true, &mut display);

        assert_eq!(controller.mode(), CaptureMode::Live);
        let files: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].extension().unwrap(), "jpg");
        assert!(display.lines.iter().any(|l| l.contains("Saved file")));
        source.stop();
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn recording_lasts_configured_duration_and_finalizes_sink() {
        let state = Arc::new(MockSinkState::default());
        let factory = MockSinkFactory {
            state: state.clone(),
            opened: Mutex::new(Vec::new()),
        };
        let dir = temp_output_dir("clip");
        let clip = ClipSettings {
            duration: Duration::from_millis(200),
            fps: 15,
        };
        let mut controller = CaptureController::new(dir.clone(), clip, Box::new(factory));
        let mut source = pattern_source();

        let mut display = NullDisplay::new();
        controller.request_recording();
        let started = Instant::now();
        controller.run_pending_action(&source, false, &mut display);
        let elapsed = started.elapsed();

        assert_eq!(controller.mode(), CaptureMode::Live);
        assert!(elapsed >= Duration::from_millis(200), "{:?}", elapsed);
        assert!(state.frames.load(Ordering::SeqCst) >= 1);
        assert_eq!(state.finished.load(Ordering::SeqCst), 1);
        // Recording is blocking: the display saw no frames while it ran.
        assert_eq!(display.frames, 0);
        source.stop();
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn snapshot_request_is_idempotent_and_exclusive() {
        let mut controller = CaptureController::new(
            PathBuf::from("."),
            ClipSettings::default(),
            Box::new(sink::FfmpegSinkFactory),
        );
        controller.request_snapshot();
        controller.request_snapshot();
        assert_eq!(controller.mode(), CaptureMode::SnapshotPending);
        controller.request_recording();
        assert_eq!(controller.mode(), CaptureMode::SnapshotPending);
    }

    #[test]
    fn timestamp_name_has_expected_shape() {
        let name = timestamp_name("jpg");
        // YYYY-MM-DD_HH-MM-SS.jpg
        assert_eq!(name.len(), "2000-01-01_00-00-00.jpg".len());
        assert!(name.ends_with(".jpg"));
    }
}
