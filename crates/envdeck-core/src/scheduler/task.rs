use std::fmt;

/// Scheduler time unit. The CLI host advances it once per second.
pub type Ticks = u64;

/// Handle returned by `schedule()`, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(super) fn next(counter: &mut u64) -> Self {
        let id = TaskId(*counter);
        *counter += 1;
        id
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(super) type Callback<S> = Box<dyn FnMut(&mut TaskContext<'_, S>)>;

pub(super) struct Task<S> {
    pub(super) id: TaskId,
    pub(super) due: Ticks,
    /// `None` for one-shot tasks.
    pub(super) interval: Option<Ticks>,
    pub(super) callback: Callback<S>,
}

pub(super) enum Pending<S> {
    Schedule(Task<S>),
    Cancel(TaskId),
}

/// What a running callback sees.
///
/// `state` is the runtime state the scheduler was ticked with. Schedule and
/// cancel requests are buffered until the current pass completes.
pub struct TaskContext<'a, S> {
    now: Ticks,
    id: TaskId,
    pub state: &'a mut S,
    pending: &'a mut Vec<Pending<S>>,
    next_id: &'a mut u64,
}

impl<'a, S> TaskContext<'a, S> {
    pub(super) fn new(
        now: Ticks,
        id: TaskId,
        state: &'a mut S,
        pending: &'a mut Vec<Pending<S>>,
        next_id: &'a mut u64,
    ) -> Self {
        Self {
            now,
            id,
            state,
            pending,
            next_id,
        }
    }

    /// Tick of the pass this callback runs in.
    pub fn now(&self) -> Ticks {
        self.now
    }

    /// Id of the task currently running.
    pub fn task_id(&self) -> TaskId {
        self.id
    }

    pub fn schedule<F>(&mut self, delay: Ticks, interval: Option<Ticks>, callback: F) -> TaskId
    where
        F: FnMut(&mut TaskContext<'_, S>) + 'static,
    {
        let id = TaskId::next(self.next_id);
        self.pending.push(Pending::Schedule(Task {
            id,
            due: self.now.saturating_add(delay),
            interval,
            callback: Box::new(callback),
        }));
        id
    }

    pub fn schedule_once<F>(&mut self, delay: Ticks, callback: F) -> TaskId
    where
        F: FnMut(&mut TaskContext<'_, S>) + 'static,
    {
        self.schedule(delay, None, callback)
    }

    pub fn cancel(&mut self, id: TaskId) {
        self.pending.push(Pending::Cancel(id));
    }
}
