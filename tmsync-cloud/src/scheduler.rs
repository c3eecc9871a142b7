//! Daily schedule.
//!
//! A periodic check rather than a one-shot timer: hosts sleep, clocks jump,
//! and a check every minute catches up on all of that. The run itself is
//! enqueued by the service, which also records the day it succeeded.

use chrono::{NaiveDate, NaiveDateTime};
use std::time::Duration;
use tokio::task::JoinHandle;

/// How often the schedule is checked.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// True when the scheduled time for `now`'s day has passed and no run has
/// been recorded for that day yet.
pub fn is_due(now: NaiveDateTime, hour: u32, minute: u32, last_run: Option<NaiveDate>) -> bool {
    let today = now.date();
    if last_run == Some(today) {
        return false;
    }
    match today.and_hms_opt(hour, minute, 0) {
        Some(scheduled) => now >= scheduled,
        None => false,
    }
}

/// Owns the background check task. Dropping it stops the task.
#[derive(Default)]
pub struct SchedulerHandle {
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn start(&mut self, task: JoinHandle<()>) {
        self.stop();
        self.task = Some(task);
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
