//! Camera device backends.
//!
//! The acquisition loop talks to cameras through the [`CameraDevice`] trait.
//! `NokhwaCamera` is the real webcam backend; `TestPatternCamera` generates a
//! synthetic moving pattern for runs without hardware and for tests.

use crate::error::CameraError;
use crate::frame::Frame;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use tracing::{debug, info};

/// A camera the acquisition loop can read frames from.
///
/// Opening a device is fatal on failure and happens at construction time.
/// A per-frame read failure is transient: `read` returns `None` and the
/// caller simply retries.
pub trait CameraDevice {
    /// Frame dimensions (width, height) the device delivers.
    fn dimensions(&self) -> (u32, u32);

    /// Read the next frame, or `None` on a transient failure.
    fn read(&mut self) -> Option<Frame>;
}

/// Requested capture format passed to the device at open time.
///
/// Devices treat this as a hint and may deliver the closest supported mode.
#[derive(Debug, Clone, Copy)]
pub struct RequestedMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for RequestedMode {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Webcam backend built on nokhwa.
pub struct NokhwaCamera {
    camera: Camera,
    width: u32,
    height: u32,
}

impl NokhwaCamera {
    /// Open the camera at `index`, requesting the given mode.
    pub fn open(index: u32, mode: RequestedMode) -> Result<Self, CameraError> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(mode.width, mode.height),
                FrameFormat::MJPEG,
                mode.fps,
            ),
        ));

        let mut camera = Camera::new(CameraIndex::Index(index), requested)
            .map_err(|e| CameraError::DeviceUnavailable(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| CameraError::StreamFailed(e.to_string()))?;

        let format = camera.camera_format();
        let width = format.resolution().width();
        let height = format.resolution().height();
        info!(
            "Opened camera {} at {}x{} @ {} fps",
            index,
            width,
            height,
            format.frame_rate()
        );

        Ok(Self {
            camera,
            width,
            height,
        })
    }
}

impl CameraDevice for NokhwaCamera {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read(&mut self) -> Option<Frame> {
        let buffer = match self.camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                debug!("Frame read failed: {}", e);
                return None;
            }
        };
        let image = match buffer.decode_image::<RgbFormat>() {
            Ok(image) => image,
            Err(e) => {
                debug!("Frame decode failed: {}", e);
                return None;
            }
        };
        let (width, height) = (image.width(), image.height());
        Frame::from_rgb(width, height, image.into_raw())
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        let _ = self.camera.stop_stream();
    }
}

/// Synthetic camera producing a moving diagonal gradient.
///
/// The pattern has high luma variance, so the built-in detector reports a
/// subject; useful for exercising the whole pipeline without a webcam.
pub struct TestPatternCamera {
    width: u32,
    height: u32,
    tick: u32,
}

impl TestPatternCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }
}

impl CameraDevice for TestPatternCamera {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read(&mut self) -> Option<Frame> {
        self.tick = self.tick.wrapping_add(1);
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let v = (x + y + self.tick * 4) as u8;
                data.extend_from_slice(&[v, v.wrapping_add(85), v.wrapping_add(170)]);
            }
        }
        // Pace roughly like a 30 fps device
        std::thread::sleep(std::time::Duration::from_millis(33));
        Frame::from_rgb(self.width, self.height, data)
    }
}
