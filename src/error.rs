//! Error types for camera and capture operations.

use std::fmt;

/// Error type for camera operations.
#[derive(Debug)]
pub enum CameraError {
    /// The camera device could not be opened
    DeviceUnavailable(String),
    /// The camera stream could not be started
    StreamFailed(String),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::DeviceUnavailable(msg) => write!(f, "Camera unavailable: {}", msg),
            CameraError::StreamFailed(msg) => write!(f, "Camera stream failed: {}", msg),
        }
    }
}

impl std::error::Error for CameraError {}

impl From<CameraError> for String {
    fn from(err: CameraError) -> Self {
        err.to_string()
    }
}

/// Error type for snapshot and clip capture operations.
#[derive(Debug)]
pub enum CaptureError {
    /// No frame has been acquired yet
    NoFrame,
    /// The video sink could not be opened or written
    SinkFailed(String),
    /// Image encoding failed
    EncodeFailed(String),
    /// Filesystem error while persisting output
    Io(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::NoFrame => write!(f, "No frame available yet"),
            CaptureError::SinkFailed(msg) => write!(f, "Video sink error: {}", msg),
            CaptureError::EncodeFailed(msg) => write!(f, "Encode error: {}", msg),
            CaptureError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<CaptureError> for String {
    fn from(err: CaptureError) -> Self {
        err.to_string()
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err.to_string())
    }
}
