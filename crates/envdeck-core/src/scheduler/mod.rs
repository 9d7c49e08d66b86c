//! Cooperative task scheduler.
//!
//! The scheduler is a plain task table. It does not own a thread or a clock:
//! the caller is responsible for calling `tick()` at a fixed cadence with the
//! current tick count.
//!
//! ## Semantics
//!
//! ```text
//! tick(now):  capture every task with due <= now
//!             run them ordered by (due, registration order)
//!             re-arm periodic tasks at now + interval
//!             apply schedule/cancel requests made by the callbacks
//! ```
//!
//! Callbacks receive a [`TaskContext`] giving them mutable access to the
//! runtime state and a deferred scheduling handle. Anything a callback
//! schedules or cancels takes effect once the current pass is over, so the
//! captured due set always runs to completion.
//!
//! ## Usage
//!
//! ```ignore
//! let mut scheduler = Scheduler::new();
//! scheduler.schedule_interval(0, 900, |ctx: &mut TaskContext<'_, Station>| {
//!     ctx.state.netatmo.refresh();
//! });
//! // In a loop:
//! scheduler.tick(elapsed_secs, &mut station);
//! ```

mod task;

pub use task::{TaskContext, TaskId, Ticks};

use task::{Callback, Pending, Task};
use tracing::trace;

/// Tick-driven task table.
///
/// No parallelism: `tick()` is the sole entry point and must be driven from
/// one logical thread of control.
pub struct Scheduler<S> {
    tasks: Vec<Task<S>>,
    next_id: u64,
    /// The most recent tick seen; delays passed to `schedule()` outside of a
    /// pass are relative to it.
    now: Ticks,
}

impl<S> Default for Scheduler<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Scheduler<S> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 0,
            now: 0,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// The tick of the most recent pass (0 before the first one).
    pub fn now(&self) -> Ticks {
        self.now
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|t| t.id == id)
    }

    /// Absolute tick at which the task will next run.
    pub fn due_time(&self, id: TaskId) -> Option<Ticks> {
        self.tasks.iter().find(|t| t.id == id).map(|t| t.due)
    }

    /// Repeat interval of a periodic task.
    pub fn interval(&self, id: TaskId) -> Option<Ticks> {
        self.tasks.iter().find(|t| t.id == id).and_then(|t| t.interval)
    }

    /// Earliest due tick across all tasks.
    pub fn next_due(&self) -> Option<Ticks> {
        self.tasks.iter().map(|t| t.due).min()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Register a task due `delay` ticks from now, repeating every
    /// `interval` ticks when given.
    pub fn schedule<F>(&mut self, delay: Ticks, interval: Option<Ticks>, callback: F) -> TaskId
    where
        F: FnMut(&mut TaskContext<'_, S>) + 'static,
    {
        let id = TaskId::next(&mut self.next_id);
        self.tasks.push(Task {
            id,
            due: self.now.saturating_add(delay),
            interval,
            callback: Box::new(callback) as Callback<S>,
        });
        id
    }

    pub fn schedule_once<F>(&mut self, delay: Ticks, callback: F) -> TaskId
    where
        F: FnMut(&mut TaskContext<'_, S>) + 'static,
    {
        self.schedule(delay, None, callback)
    }

    pub fn schedule_interval<F>(&mut self, delay: Ticks, interval: Ticks, callback: F) -> TaskId
    where
        F: FnMut(&mut TaskContext<'_, S>) + 'static,
    {
        self.schedule(delay, Some(interval), callback)
    }

    /// Remove a task. Returns `false` if it was not scheduled.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    /// Run every task due at or before `now`.
    ///
    /// Returns the number of callbacks executed.
    pub fn tick(&mut self, now: Ticks, state: &mut S) -> usize {
        self.now = now;

        let (mut ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|t| t.due <= now);
        self.tasks = waiting;

        if ready.is_empty() {
            return 0;
        }

        ready.sort_by_key(|t| (t.due, t.id));

        let mut pending = Vec::new();
        let mut rearmed = Vec::new();
        let executed = ready.len();

        for mut task in ready {
            trace!(task = %task.id, due = task.due, now, "running task");
            {
                let mut ctx = TaskContext::new(now, task.id, &mut *state, &mut pending, &mut self.next_id);
                (task.callback)(&mut ctx);
            }
            // Re-armed relative to the pass, after the callback returned.
            if let Some(interval) = task.interval {
                task.due = now.saturating_add(interval);
                rearmed.push(task);
            }
        }

        self.tasks.extend(rearmed);
        for request in pending {
            match request {
                Pending::Schedule(task) => self.tasks.push(task),
                Pending::Cancel(id) => self.tasks.retain(|t| t.id != id),
            }
        }

        executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        runs: Vec<(&'static str, Ticks)>,
    }

    fn record(name: &'static str) -> impl FnMut(&mut TaskContext<'_, Log>) {
        move |ctx| {
            let now = ctx.now();
            ctx.state.runs.push((name, now));
        }
    }

    #[test]
    fn one_shot_runs_once_and_is_removed() {
        let mut scheduler = Scheduler::new();
        let mut log = Log::default();
        let id = scheduler.schedule_once(5, record("a"));

        assert_eq!(scheduler.tick(4, &mut log), 0);
        assert_eq!(scheduler.tick(5, &mut log), 1);
        assert!(!scheduler.is_scheduled(id));
        assert_eq!(scheduler.tick(10, &mut log), 0);
        assert_eq!(log.runs, vec![("a", 5)]);
    }

    #[test]
    fn periodic_task_rearms_relative_to_execution() {
        let mut scheduler = Scheduler::new();
        let mut log = Log::default();
        let id = scheduler.schedule_interval(0, 10, record("p"));

        scheduler.tick(0, &mut log);
        assert_eq!(scheduler.due_time(id), Some(10));

        // A late tick does not cause a burst of catch-up runs.
        scheduler.tick(35, &mut log);
        assert_eq!(scheduler.due_time(id), Some(45));
        assert_eq!(log.runs, vec![("p", 0), ("p", 35)]);
    }

    #[test]
    fn due_tasks_run_in_due_order_then_registration_order() {
        let mut scheduler = Scheduler::new();
        let mut log = Log::default();
        scheduler.schedule_once(3, record("late"));
        scheduler.schedule_once(1, record("first"));
        scheduler.schedule_once(1, record("second"));

        scheduler.tick(5, &mut log);
        let names: Vec<_> = log.runs.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["first", "second", "late"]);
    }

    #[test]
    fn cancel_removes_pending_task() {
        let mut scheduler = Scheduler::new();
        let mut log = Log::default();
        let id = scheduler.schedule_interval(1, 1, record("x"));

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        scheduler.tick(10, &mut log);
        assert!(log.runs.is_empty());
    }

    #[test]
    fn tasks_scheduled_from_callback_wait_for_next_tick() {
        let mut scheduler = Scheduler::new();
        let mut log = Log::default();
        scheduler.schedule_once(0, |ctx: &mut TaskContext<'_, Log>| {
            ctx.state.runs.push(("parent", ctx.now()));
            ctx.schedule_once(0, record("child"));
        });

        assert_eq!(scheduler.tick(0, &mut log), 1);
        assert_eq!(log.runs, vec![("parent", 0)]);

        assert_eq!(scheduler.tick(1, &mut log), 1);
        assert_eq!(log.runs, vec![("parent", 0), ("child", 1)]);
    }

    #[test]
    fn periodic_task_can_cancel_itself() {
        let mut scheduler = Scheduler::new();
        let mut log = Log::default();
        let id = scheduler.schedule_interval(0, 1, |ctx: &mut TaskContext<'_, Log>| {
            ctx.state.runs.push(("self", ctx.now()));
            let me = ctx.task_id();
            ctx.cancel(me);
        });

        scheduler.tick(0, &mut log);
        assert!(!scheduler.is_scheduled(id));
        scheduler.tick(1, &mut log);
        assert_eq!(log.runs.len(), 1);
    }

    #[test]
    fn cancel_from_callback_does_not_touch_captured_due_set() {
        let mut scheduler = Scheduler::new();
        let mut log = Log::default();
        // Registered second, so it runs after the canceller in the same pass.
        let victim_slot = std::rc::Rc::new(std::cell::Cell::new(None));
        let slot = victim_slot.clone();
        scheduler.schedule_once(0, move |ctx: &mut TaskContext<'_, Log>| {
            if let Some(victim) = slot.get() {
                ctx.cancel(victim);
            }
        });
        let victim = scheduler.schedule_interval(0, 5, record("victim"));
        victim_slot.set(Some(victim));

        scheduler.tick(0, &mut log);
        assert_eq!(log.runs, vec![("victim", 0)]);
        assert!(!scheduler.is_scheduled(victim));
    }

    #[test]
    fn delays_outside_a_pass_are_relative_to_last_tick() {
        let mut scheduler: Scheduler<Log> = Scheduler::new();
        let mut log = Log::default();
        scheduler.tick(100, &mut log);
        let id = scheduler.schedule_once(60, record("retry"));
        assert_eq!(scheduler.due_time(id), Some(160));
        assert_eq!(scheduler.next_due(), Some(160));
    }
}
