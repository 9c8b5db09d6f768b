//! Frame acquisition.
//!
//! `FrameSource` owns the camera on a dedicated thread. The camera handle is
//! not `Send`, so the thread receives a factory and constructs the device
//! itself, reporting the open result back over a channel before entering its
//! read loop. The newest decoded frame is published into a single guarded
//! slot; while a recording tap is installed, every captured frame is also
//! forwarded into a bounded channel.

use crate::camera::CameraDevice;
use crate::error::CameraError;
use crate::frame::Frame;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Factory constructing the camera inside the acquisition thread.
pub type CameraFactory =
    Box<dyn FnOnce() -> Result<Box<dyn CameraDevice>, CameraError> + Send + 'static>;

/// Backoff applied after a transient read failure before retrying.
const READ_RETRY_DELAY: Duration = Duration::from_millis(5);

struct Shared {
    latest: Mutex<Option<Arc<Frame>>>,
    tap: Mutex<Option<SyncSender<Arc<Frame>>>>,
    running: AtomicBool,
    /// Smoothed acquisition rate, stored as f64 bits.
    fps_bits: AtomicU64,
}

/// Continuously pulls frames from the camera and publishes the newest one.
pub struct FrameSource {
    shared: Arc<Shared>,
    dimensions: (u32, u32),
    handle: Option<JoinHandle<()>>,
}

impl FrameSource {
    /// Spawn the acquisition thread.
    ///
    /// Blocks until the camera is open; a device-open failure is fatal and
    /// returned here. Per-frame read failures after that are retried silently.
    pub fn start(factory: CameraFactory) -> Result<Self, CameraError> {
        let shared = Arc::new(Shared {
            latest: Mutex::new(None),
            tap: Mutex::new(None),
            running: AtomicBool::new(true),
            fps_bits: AtomicU64::new(0f64.to_bits()),
        });

        let (setup_tx, setup_rx) = mpsc::channel::<Result<(u32, u32), CameraError>>();
        let thread_shared = shared.clone();

        let handle = std::thread::spawn(move || {
            let mut camera = match factory() {
                Ok(camera) => camera,
                Err(e) => {
                    let _ = setup_tx.send(Err(e));
                    return;
                }
            };
            if setup_tx.send(Ok(camera.dimensions())).is_err() {
                return;
            }
            info!("Acquisition thread started");
            acquisition_loop(&thread_shared, camera.as_mut());
            info!("Acquisition thread exiting");
            // Camera is dropped here, releasing the device handle.
        });

        let dimensions = match setup_rx.recv() {
            Ok(Ok(dimensions)) => dimensions,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(CameraError::DeviceUnavailable(
                    "acquisition thread failed to start".to_string(),
                ));
            }
        };

        Ok(Self {
            shared,
            dimensions,
            handle: Some(handle),
        })
    }

    /// Dimensions the camera delivers.
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    /// The most recent frame, or `None` before the first successful read.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.shared.latest.lock().unwrap().clone()
    }

    /// Smoothed acquisition rate in frames per second.
    pub fn fps(&self) -> f64 {
        f64::from_bits(self.shared.fps_bits.load(Ordering::Relaxed))
    }

    /// Install a bounded per-frame tap.
    ///
    /// While installed, every captured frame is forwarded to the returned
    /// receiver; frames are dropped rather than blocking when the receiver
    /// falls behind. Replaces any previous tap.
    pub fn tap(&self, capacity: usize) -> Receiver<Arc<Frame>> {
        let (tx, rx) = mpsc::sync_channel(capacity);
        *self.shared.tap.lock().unwrap() = Some(tx);
        rx
    }

    /// Remove the current tap, if any.
    pub fn untap(&self) {
        self.shared.tap.lock().unwrap().take();
    }

    /// Signal the acquisition loop to exit and wait for it. Idempotent.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Acquisition thread panicked");
            }
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn acquisition_loop(shared: &Shared, camera: &mut dyn CameraDevice) {
    let mut last_read: Option<Instant> = None;

    while shared.running.load(Ordering::Acquire) {
        let frame = match camera.read() {
            Some(frame) => Arc::new(frame),
            None => {
                // Transient failure, retry on the next iteration
                std::thread::sleep(READ_RETRY_DELAY);
                continue;
            }
        };

        let now = Instant::now();
        if let Some(previous) = last_read {
            let dt = now.duration_since(previous).as_secs_f64();
            if dt > 0.0 {
                let instant_fps = 1.0 / dt;
                let previous_fps = f64::from_bits(shared.fps_bits.load(Ordering::Relaxed));
                let smoothed = if previous_fps > 0.0 {
                    previous_fps * 0.9 + instant_fps * 0.1
                } else {
                    instant_fps
                };
                shared.fps_bits.store(smoothed.to_bits(), Ordering::Relaxed);
            }
        }
        last_read = Some(now);

        *shared.latest.lock().unwrap() = Some(frame.clone());

        let mut tap = shared.tap.lock().unwrap();
        if let Some(sender) = tap.as_ref() {
            match sender.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("Tap receiver slow, dropping frame");
                }
                Err(TrySendError::Disconnected(_)) => {
                    tap.take();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Device that plays back a fixed sequence of solid-color frames, then
    /// reports transient failures forever.
    struct SequenceCamera {
        frames: Vec<Frame>,
        next: usize,
        looping: bool,
    }

    impl SequenceCamera {
        fn new(values: &[u8]) -> Self {
            let frames = values
                .iter()
                .map(|&v| Frame::from_rgb(4, 4, vec![v; 4 * 4 * 3]).unwrap())
                .collect();
            Self {
                frames,
                next: 0,
                looping: false,
            }
        }

        fn looping(values: &[u8]) -> Self {
            let mut camera = Self::new(values);
            camera.looping = true;
            camera
        }
    }

    impl CameraDevice for SequenceCamera {
        fn dimensions(&self) -> (u32, u32) {
            (4, 4)
        }

        fn read(&mut self) -> Option<Frame> {
            std::thread::sleep(Duration::from_millis(1));
            if self.looping && self.next >= self.frames.len() {
                self.next = 0;
            }
            let frame = self.frames.get(self.next).cloned();
            if frame.is_some() {
                self.next += 1;
            }
            frame
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn open_failure_is_fatal() {
        let result = FrameSource::start(Box::new(|| {
            Err(CameraError::DeviceUnavailable("no device".to_string()))
        }));
        assert!(matches!(result, Err(CameraError::DeviceUnavailable(_))));
    }

    #[test]
    fn latest_is_none_before_first_read() {
        let mut source =
            FrameSource::start(Box::new(|| Ok(Box::new(SequenceCamera::new(&[])) as _)))
                .expect("start");
        assert!(source.latest().is_none());
        source.stop();
    }

    #[test]
    fn latest_wins_over_older_frames() {
        let mut source = FrameSource::start(Box::new(|| {
            Ok(Box::new(SequenceCamera::new(&[1, 2, 3])) as _)
        }))
        .expect("start");

        // Once the sequence is exhausted the slot must hold the last frame,
        // never an earlier one.
        assert!(wait_for(|| source
            .latest()
            .is_some_and(|f| f.data()[0] == 3)));
        source.stop();
    }

    #[test]
    fn transient_failures_keep_previous_frame() {
        let mut source = FrameSource::start(Box::new(|| {
            Ok(Box::new(SequenceCamera::new(&[7])) as _)
        }))
        .expect("start");

        assert!(wait_for(|| source.latest().is_some()));
        // The device now fails every read; the published frame must survive.
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(source.latest().unwrap().data()[0], 7);
        source.stop();
    }

    #[test]
    fn tap_receives_frames_and_untap_detaches() {
        let mut source = FrameSource::start(Box::new(|| {
            Ok(Box::new(SequenceCamera::looping(&[1, 2])) as _)
        }))
        .expect("start");

        let rx = source.tap(8);
        let frame = rx.recv_timeout(Duration::from_secs(1)).expect("tapped frame");
        assert_eq!(frame.width(), 4);
        source.untap();
        source.stop();
    }

    #[test]
    fn stop_terminates_within_bounded_time() {
        let mut source = FrameSource::start(Box::new(|| {
            Ok(Box::new(SequenceCamera::new(&[0; 1000])) as _)
        }))
        .expect("start");

        let started = Instant::now();
        source.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
        // Idempotent
        source.stop();
    }
}
