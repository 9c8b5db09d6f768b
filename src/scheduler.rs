//! Cooperative fixed-delay scheduling of the periodic control-thread tasks.
//!
//! Three tasks share one control thread: display refresh, status refresh and
//! sample submission. Each task is re-armed relative to the completion of its
//! previous firing (fixed-delay, not fixed-rate), so a long-running firing —
//! notably a blocking capture action on the display task — defers everything
//! else rather than piling up missed firings.

use std::time::{Duration, Instant};
use tracing::debug;

/// The periodic control-thread tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Push the latest frame to the display, or run a pending capture action
    Display,
    /// Refresh the classification status line
    Status,
    /// Submit the latest frame for classification
    Sample,
}

/// What the runner wants after a task firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Continue,
    Shutdown,
}

/// Executes task firings. Implemented by the application; mocked in tests.
pub trait TaskRunner {
    fn run_task(&mut self, task: Task) -> TaskOutcome;
}

struct Slot {
    task: Task,
    period: Duration,
    next_due: Instant,
}

/// Single-threaded cooperative loop over fixed-delay periodic tasks.
pub struct Scheduler {
    slots: Vec<Slot>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Register a task with its firing period. The first firing is due
    /// one period after `run` starts.
    pub fn add(&mut self, task: Task, period: Duration) {
        self.slots.push(Slot {
            task,
            period,
            next_due: Instant::now() + period,
        });
    }

    /// Drive the loop until a task requests shutdown.
    ///
    /// Tasks run to completion sequentially; nothing preempts a firing.
    pub fn run(&mut self, runner: &mut dyn TaskRunner) {
        assert!(!self.slots.is_empty(), "no tasks registered");

        let start = Instant::now();
        for slot in &mut self.slots {
            slot.next_due = start + slot.period;
        }

        loop {
            // Earliest-due task; ties resolve in registration order.
            let idx = self
                .slots
                .iter()
                .enumerate()
                .min_by_key(|(_, slot)| slot.next_due)
                .map(|(i, _)| i)
                .unwrap_or(0);

            let due = self.slots[idx].next_due;
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }

            let task = self.slots[idx].task;
            let outcome = runner.run_task(task);

            // Fixed-delay: re-arm relative to completion, not to `due`.
            self.slots[idx].next_due = Instant::now() + self.slots[idx].period;

            if outcome == TaskOutcome::Shutdown {
                debug!("Scheduler shutting down after {:?} task", task);
                break;
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
