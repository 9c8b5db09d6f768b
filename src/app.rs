//! Application wiring and the control-thread task bodies.

use crate::capture::{CaptureController, CaptureMode};
use crate::config::TimingConfig;
use crate::detector::ClassificationWorker;
use crate::display::DisplaySink;
use crate::scheduler::{Scheduler, Task, TaskOutcome, TaskRunner};
use crate::source::FrameSource;
use std::sync::mpsc::Receiver;
use std::time::Duration;
use tracing::info;

/// User commands forwarded from the UI collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Snapshot,
    Record,
    Shutdown,
}

/// Periods for the three control-thread tasks.
#[derive(Debug, Clone, Copy)]
pub struct TaskPeriods {
    pub display: Duration,
    pub status: Duration,
    pub sample: Duration,
}

impl TaskPeriods {
    pub fn from_config(timing: &TimingConfig, sample_interval_ms: u64) -> Self {
        Self {
            display: Duration::from_millis(timing.display_refresh_ms),
            status: Duration::from_millis(timing.status_refresh_ms),
            sample: Duration::from_millis(sample_interval_ms),
        }
    }
}

/// Owns every component and runs the cooperative control loop.
///
/// Ownership is strictly top-down: components never hold references to each
/// other or back to the application.
pub struct Application {
    source: FrameSource,
    worker: ClassificationWorker,
    controller: CaptureController,
    display: Box<dyn DisplaySink>,
    commands: Receiver<Command>,
    periods: TaskPeriods,
}

impl Application {
    pub fn new(
        source: FrameSource,
        worker: ClassificationWorker,
        controller: CaptureController,
        display: Box<dyn DisplaySink>,
        commands: Receiver<Command>,
        periods: TaskPeriods,
    ) -> Self {
        Self {
            source,
            worker,
            controller,
            display,
            commands,
            periods,
        }
    }

    /// Run until a shutdown command arrives, then stop both background
    /// loops before returning.
    pub fn run(&mut self) {
        let mut scheduler = Scheduler::new();
        scheduler.add(Task::Display, self.periods.display);
        scheduler.add(Task::Status, self.periods.status);
        scheduler.add(Task::Sample, self.periods.sample);
        scheduler.run(self);
        self.shutdown();
    }

    /// Drain pending user commands. Returns true when shutdown was requested.
    fn handle_commands(&mut self) -> bool {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Snapshot => self.controller.request_snapshot(),
                Command::Record => self.controller.request_recording(),
                Command::Shutdown => return true,
            }
        }
        false
    }

    fn run_display_task(&mut self) -> TaskOutcome {
        if self.handle_commands() {
            return TaskOutcome::Shutdown;
        }
        if self.controller.mode() != CaptureMode::Live {
            // Capture action suspends live display for its duration.
            let subject_present = self.worker.latest_result();
            self.controller
                .run_pending_action(&self.source, subject_present, self.display.as_mut());
        } else if let Some(frame) = self.source.latest() {
            self.display.show_frame(&frame);
        }
        TaskOutcome::Continue
    }

    fn run_status_task(&mut self) -> TaskOutcome {
        let status = if self.worker.latest_result() {
            format!("Subject present | {:.0} fps", self.source.fps())
        } else {
            format!("No subject | {:.0} fps", self.source.fps())
        };
        self.display.show_status(&status);
        TaskOutcome::Continue
    }

    fn run_sample_task(&mut self) -> TaskOutcome {
        if let Some(frame) = self.source.latest() {
            self.worker.submit(frame);
        }
        TaskOutcome::Continue
    }

    fn shutdown(&mut self) {
        info!("Shutting down");
        self.source.stop();
        self.worker.stop();
    }
}

impl TaskRunner for Application {
    fn run_task(&mut self, task: Task) -> TaskOutcome {
        match task {
            Task::Display => self.run_display_task(),
            Task::Status => self.run_status_task(),
            Task::Sample => self.run_sample_task(),
        }
    }
}
