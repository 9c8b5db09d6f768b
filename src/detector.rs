//! Background classification of sampled frames.
//!
//! The worker owns a capacity-one pending slot with "latest sample wins"
//! semantics: offering a new sample while one is still waiting replaces it,
//! and the submitting task never blocks. The most recent boolean result is
//! republished through an atomic and defaults to false before the first
//! completed pass.

use crate::frame::Frame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Domain interface for subject detection on a grayscale frame.
///
/// Implementations may be stateful (e.g. tracking across samples), hence
/// `&mut self`. An error from `detect` is treated as "no detection" for that
/// sample and never stops the worker.
pub trait Detector: Send {
    fn detect(
        &mut self,
        luma: &[u8],
        width: u32,
        height: u32,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// Built-in detector: luma variance above a threshold counts as a subject.
///
/// A blank frame has zero variance; a textured subject raises it sharply.
/// Cascade- or model-based detectors plug in behind [`Detector`] instead.
pub struct VarianceDetector {
    threshold: f64,
}

impl VarianceDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Detector for VarianceDetector {
    fn detect(
        &mut self,
        luma: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        if luma.is_empty() {
            return Ok(false);
        }
        let n = luma.len() as f64;
        let mean = luma.iter().map(|&v| v as f64).sum::<f64>() / n;
        let variance = luma
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        Ok(variance >= self.threshold)
    }
}

/// Poll interval for the shutdown flag while the worker is idle.
const IDLE_WAIT: Duration = Duration::from_millis(200);

struct Shared {
    pending: Mutex<Option<Arc<Frame>>>,
    available: Condvar,
    result: AtomicBool,
    running: AtomicBool,
}

/// Runs a detector on sampled frames without blocking acquisition or display.
pub struct ClassificationWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl ClassificationWorker {
    /// Spawn the worker thread around the given detector.
    pub fn spawn(detector: Box<dyn Detector>) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(None),
            available: Condvar::new(),
            result: AtomicBool::new(false),
            running: AtomicBool::new(true),
        });
        let thread_shared = shared.clone();
        let handle = std::thread::spawn(move || {
            info!("Classification worker started");
            worker_loop(&thread_shared, detector);
            info!("Classification worker exiting");
        });
        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Offer a frame for classification. Never blocks; a sample still
    /// waiting is replaced by the fresher one.
    pub fn submit(&self, frame: Arc<Frame>) {
        let mut pending = self.shared.pending.lock().unwrap();
        if pending.replace(frame).is_some() {
            debug!("Replacing unconsumed sample with a fresher one");
        }
        self.shared.available.notify_one();
    }

    /// The most recent classification result; false before the first pass.
    pub fn latest_result(&self) -> bool {
        self.shared.result.load(Ordering::Acquire)
    }

    /// Whether a submitted sample is still waiting to be picked up.
    #[cfg(test)]
    fn has_pending(&self) -> bool {
        self.shared.pending.lock().unwrap().is_some()
    }

    /// Signal the worker to exit and wait for it. Idempotent.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.available.notify_one();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Classification worker panicked");
            }
        }
    }
}

impl Drop for ClassificationWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: &Shared, mut detector: Box<dyn Detector>) {
    loop {
        let frame = {
            let mut pending = shared.pending.lock().unwrap();
            loop {
                if !shared.running.load(Ordering::Acquire) {
                    return;
                }
                if let Some(frame) = pending.take() {
                    break frame;
                }
                let (guard, _) = shared
                    .available
                    .wait_timeout(pending, IDLE_WAIT)
                    .unwrap();
                pending = guard;
            }
        };

        let luma = frame.to_luma();
        let present = match detector.detect(&luma, frame.width(), frame.height()) {
            Ok(present) => present,
            Err(e) => {
                warn!("Detector failed on sample, treating as no detection: {}", e);
                false
            }
        };
        shared.result.store(present, Ordering::Release);
    }
}
