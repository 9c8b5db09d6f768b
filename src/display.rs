//! Display collaborator interface.
//!
//! The real windowing surface lives outside this crate; the application only
//! needs somewhere to push decoded frames, a one-line status, and log lines.
//! `ConsoleDisplay` is the terminal frontend used by the binary.

use crate::frame::Frame;
use tracing::{info, trace};

/// Narrow interface to whatever renders frames and status for the user.
pub trait DisplaySink {
    /// Hand over a decoded frame for rendering.
    fn show_frame(&mut self, frame: &Frame);

    /// Update the one-line classification/FPS status area.
    fn show_status(&mut self, status: &str);

    /// Append a line to the user-visible event log.
    fn log(&mut self, line: &str);
}

/// Terminal frontend: status and log lines go to the log output, frame
/// pushes are counted but not rendered.
pub struct ConsoleDisplay {
    last_status: String,
    frames_shown: u64,
}

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self {
            last_status: String::new(),
            frames_shown: 0,
        }
    }
}

impl Default for ConsoleDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for ConsoleDisplay {
    fn show_frame(&mut self, frame: &Frame) {
        self.frames_shown += 1;
        trace!(
            "Frame {} ({}x{})",
            self.frames_shown,
            frame.width(),
            frame.height()
        );
    }

    fn show_status(&mut self, status: &str) {
        // Status refreshes every few hundred ms; only log changes.
        if status != self.last_status {
            info!("{}", status);
            self.last_status = status.to_string();
        }
    }

    fn log(&mut self, line: &str) {
        info!("{}", line);
    }
}
