//! Video sink backed by FFmpeg via ffmpeg-sidecar.
//!
//! Raw RGB frames are piped to ffmpeg's stdin and muxed into an MJPEG AVI,
//! the container the capture controller writes clips to.

use crate::error::CaptureError;
use crate::frame::Frame;
use ffmpeg_sidecar::command::FfmpegCommand;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Stdio};
use tracing::{debug, warn};

/// An open video container accepting frames until finalized.
pub trait VideoSink {
    /// Append one frame. Frames must match the dimensions the sink was
    /// opened with.
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError>;

    /// Close the container. Returns the number of frames written.
    fn finish(self: Box<Self>) -> Result<u64, CaptureError>;
}

/// Opens video sinks; the seam that lets capture tests run without ffmpeg.
pub trait VideoSinkFactory {
    fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn VideoSink>, CaptureError>;
}

/// FFmpeg-backed sink writing MJPEG into an AVI container.
pub struct FfmpegSink {
    stdin: Option<ChildStdin>,
    child: Option<std::process::Child>,
    path: PathBuf,
    frame_len: usize,
    frames_written: u64,
}

impl FfmpegSink {
    pub fn open(path: &Path, width: u32, height: u32, fps: u32) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::SinkFailed(format!(
                "Invalid dimensions: {}x{}",
                width, height
            )));
        }

        let mut command = FfmpegCommand::new();
        command
            // Input: raw RGB frames from stdin
            .args(["-f", "rawvideo"])
            .args(["-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", width, height)])
            .args(["-r", &fps.to_string()])
            .args(["-i", "-"])
            // Output: MJPEG in AVI, the classic camera-clip container
            .args(["-c:v", "mjpeg"])
            .args(["-q:v", "3"])
            .args(["-y"])
            .arg(path.to_string_lossy().to_string());

        let inner = command.as_inner_mut();
        inner.stdin(Stdio::piped());
        inner.stdout(Stdio::null());
        inner.stderr(Stdio::piped());

        let mut child = inner
            .spawn()
            .map_err(|e| CaptureError::SinkFailed(format!("Failed to start FFmpeg: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CaptureError::SinkFailed("Failed to get FFmpeg stdin".to_string()))?;

        // Drain stderr so ffmpeg never blocks on a full pipe.
        if let Some(stderr) = child.stderr.take() {
            std::thread::spawn(move || {
                use std::io::{BufRead, BufReader};
                let reader = BufReader::new(stderr);
                for line in reader.lines().map_while(Result::ok) {
                    debug!("[ffmpeg] {}", line);
                }
            });
        }

        Ok(Self {
            stdin: Some(stdin),
            child: Some(child),
            path: path.to_path_buf(),
            frame_len: (width as usize) * (height as usize) * 3,
            frames_written: 0,
        })
    }
}

impl VideoSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        if frame.data().len() != self.frame_len {
            warn!(
                "Skipping frame: {}x{} does not match sink dimensions",
                frame.width(),
                frame.height()
            );
            return Ok(());
        }
        if let Some(ref mut stdin) = self.stdin {
            stdin
                .write_all(frame.data())
                .map_err(|e| CaptureError::SinkFailed(format!("Failed to write frame: {}", e)))?;
            self.frames_written += 1;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64, CaptureError> {
        // Closing stdin signals end of input.
        drop(self.stdin.take());

        if let Some(mut child) = self.child.take() {
            let status = child
                .wait()
                .map_err(|e| CaptureError::SinkFailed(format!("FFmpeg process error: {}", e)))?;
            if !status.success() {
                return Err(CaptureError::SinkFailed(format!(
                    "FFmpeg exited with {:?} writing {}",
                    status.code(),
                    self.path.display()
                )));
            }
        }
        Ok(self.frames_written)
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        // Abandoned sink: close the pipe and reap the child so the file is
        // finalized rather than left open.
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
    }
}

/// Default factory producing [`FfmpegSink`]s.
pub struct FfmpegSinkFactory;

impl VideoSinkFactory for FfmpegSinkFactory {
    fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn VideoSink>, CaptureError> {
        Ok(Box::new(FfmpegSink::open(path, width, height, fps)?))
    }
}
