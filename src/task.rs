//! # Task Control Block
//!
//! Defines the task model for the tickos scheduler: the task state
//! machine, the TCB with its priority pair and timing fields, and the
//! scheduler-level task operations (state transitions, priority
//! changes, held-mutex tracking).
//!
//! ## Priority Model
//!
//! Priorities are plain integers where a numerically **lower** value is
//! a logically **higher** priority (the POSIX/VxWorks convention). Each
//! task carries a pair:
//!
//! - `priority` — the effective priority the dispatcher sees,
//! - `original_priority` — the creation/assignment priority, restored
//!   when a priority-inheritance episode ends.
//!
//! `priority_inherited` is true exactly while the two differ because of
//! inheritance. Inheritance only ever lowers the number (boosts).

use heapless::Vec;
use log::{error, warn};

use crate::config::{HELD_MUTEX_CAP, NAME_MAX, PRIORITY_IDLE};
use crate::mutex::MutexId;
use crate::scheduler::Scheduler;
use crate::timeline::VisState;

/// Simulated time, in ticks.
pub type Tick = u64;

/// Task priority. Lower number = higher logical priority.
pub type Priority = u64;

/// Stable handle into the scheduler's task registry. Tasks are never
/// removed from the registry, so a `TaskId` stays valid for the life
/// of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub usize);

/// Workload entry point. The simulator accounts execution in whole
/// ticks of `remaining_work` and never invokes the function itself.
pub type TaskEntry = fn();

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌──────────┐      dispatch       ┌─────────┐
///   │  Ready   │ ──────────────────► │ Running │
///   └──────────┘                     └─────────┘
///        ▲        preempt / resume        │
///        └────────────────────────────────┤
///        ▲                                │ mutex/semaphore
///        │        wake / release          ▼
///   ┌───────────┐                   ┌──────────┐
///   │ Suspended │                   │ Blocked  │
///   └───────────┘                   └──────────┘
/// ```
///
/// `Terminated` is terminal; a task reaches it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting in the ready queue for the CPU.
    Ready,
    /// Currently executing (at most one task at a time).
    Running,
    /// Waiting on a mutex or semaphore.
    Blocked,
    /// Not schedulable; periodic tasks park here between releases.
    Suspended,
    /// Finished; never scheduled again.
    Terminated,
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Per-task record of identity, state, priority, timing, statistics,
/// and held resources. TCBs live in the scheduler's registry and are
/// referenced everywhere by `TaskId`.
#[derive(Debug)]
pub struct Tcb {
    /// Registry handle (also the task's position in the registry).
    pub id: TaskId,
    /// Display name, truncated to `NAME_MAX` characters.
    pub name: String,
    pub state: TaskState,
    /// Workload entry; retained for the driver, never called here.
    pub entry: TaskEntry,

    /// Current effective priority.
    pub priority: Priority,
    /// Priority saved at the start of an inheritance episode.
    pub original_priority: Priority,
    /// True while `priority` is boosted above `original_priority`.
    pub priority_inherited: bool,

    /// Release period in ticks; 0 = aperiodic.
    pub period: u64,
    /// Deadline relative to each release.
    pub relative_deadline: u64,
    /// Absolute tick of the next periodic release.
    pub next_release: Tick,
    /// Absolute deadline of the current release window. Set to
    /// `u64::MAX` after a recorded miss so the window fires once.
    pub absolute_deadline: Tick,
    /// Execution ticks accumulated this period.
    pub exec_time: u64,
    /// Largest `exec_time` observed across all periods.
    pub wcet_observed: u64,
    /// Execution ticks accumulated over the task's whole life.
    pub total_exec_time: u64,
    /// Work budget given at creation, frozen for analysis.
    pub wcet_budget: u64,
    /// Remaining simulated work in ticks.
    pub remaining_work: u64,
    /// Tick at which the task last became Ready.
    pub ready_since: Tick,

    // Statistics
    pub invocations: u32,
    pub deadline_misses: u32,
    pub preemptions: u32,
    pub priority_boosts: u32,

    /// Mutexes currently held, in acquisition order.
    pub held_mutexes: Vec<MutexId, HELD_MUTEX_CAP>,
    /// The mutex this task is blocked on, if any.
    pub blocked_on: Option<MutexId>,
}

impl Tcb {
    /// Build a TCB in the Ready state. A `deadline` of 0 means the
    /// deadline equals the period (implicit-deadline task).
    pub(crate) fn new(
        id: TaskId,
        name: &str,
        entry: TaskEntry,
        priority: Priority,
        now: Tick,
        period: u64,
        deadline: u64,
        wcet: u64,
    ) -> Self {
        let relative_deadline = if deadline > 0 { deadline } else { period };
        Self {
            id,
            name: name.chars().take(NAME_MAX).collect(),
            state: TaskState::Ready,
            entry,
            priority,
            original_priority: priority,
            priority_inherited: false,
            period,
            relative_deadline,
            next_release: now + period,
            absolute_deadline: now + relative_deadline,
            exec_time: 0,
            wcet_observed: 0,
            total_exec_time: 0,
            wcet_budget: wcet,
            remaining_work: wcet,
            ready_since: now,
            invocations: 1,
            deadline_misses: 0,
            preemptions: 0,
            priority_boosts: 0,
            held_mutexes: Vec::new(),
            blocked_on: None,
        }
    }

    /// True for the idle task (and nothing else).
    pub fn is_idle(&self) -> bool {
        self.original_priority == PRIORITY_IDLE
    }
}

// ---------------------------------------------------------------------------
// Scheduler-level task operations
// ---------------------------------------------------------------------------

impl Scheduler {
    /// Change a task's state, keeping the ready queue consistent:
    /// a task is in the ready queue exactly while it is Ready.
    pub fn task_set_state(&mut self, id: TaskId, new_state: TaskState) {
        if !self.task_id_valid(id) {
            return;
        }
        let old = self.tasks[id.0].state;
        if old == new_state {
            return;
        }
        self.tasks[id.0].state = new_state;

        if old == TaskState::Ready {
            self.ready.remove(id);
        }
        if new_state == TaskState::Ready {
            self.tasks[id.0].ready_since = self.system_ticks;
            self.ready_enqueue(id);
        }

        self.timeline
            .record_state_change(self.system_ticks, id, VisState::from(new_state));
    }

    /// Suspend a task (no-op on terminated tasks).
    pub fn task_suspend(&mut self, id: TaskId) {
        if !self.task_id_valid(id) || self.tasks[id.0].state == TaskState::Terminated {
            return;
        }
        self.task_set_state(id, TaskState::Suspended);
    }

    /// Resume a suspended task.
    pub fn task_resume(&mut self, id: TaskId) {
        if !self.task_id_valid(id) || self.tasks[id.0].state != TaskState::Suspended {
            return;
        }
        self.task_set_state(id, TaskState::Ready);
    }

    /// Terminate a task permanently.
    pub fn task_terminate(&mut self, id: TaskId) {
        if !self.task_id_valid(id) {
            return;
        }
        self.task_set_state(id, TaskState::Terminated);
    }

    /// Set a task's effective priority, re-sorting the ready queue if
    /// the task is queued.
    pub fn task_set_priority(&mut self, id: TaskId, new_priority: Priority) {
        if !self.task_id_valid(id) {
            return;
        }
        self.tasks[id.0].priority = new_priority;
        if self.tasks[id.0].state == TaskState::Ready {
            self.ready.remove(id);
            self.ready_enqueue(id);
        }
    }

    /// A task's current effective priority; `PRIORITY_IDLE` for
    /// invalid handles.
    pub fn task_priority(&self, id: TaskId) -> Priority {
        if self.task_id_valid(id) {
            self.tasks[id.0].priority
        } else {
            PRIORITY_IDLE
        }
    }

    /// Track a newly acquired mutex in the task's held set.
    pub(crate) fn task_add_held_mutex(&mut self, id: TaskId, m: MutexId) {
        if self.tasks[id.0].held_mutexes.push(m).is_err() {
            // The acquisition itself stands; only the PI bookkeeping
            // entry is lost.
            error!(
                "held-mutex set full for {}; inheritance may under-boost",
                self.tasks[id.0].name
            );
        }
    }

    /// Drop a mutex from the task's held set.
    pub(crate) fn task_remove_held_mutex(&mut self, id: TaskId, m: MutexId) {
        match self.tasks[id.0].held_mutexes.iter().position(|&h| h == m) {
            Some(pos) => {
                self.tasks[id.0].held_mutexes.remove(pos);
            }
            None => warn!(
                "{} released a mutex missing from its held set",
                self.tasks[id.0].name
            ),
        }
    }

    pub(crate) fn task_id_valid(&self, id: TaskId) -> bool {
        id.0 < self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedPolicy;

    fn noop() {}

    fn sched() -> Scheduler {
        Scheduler::new(SchedPolicy::Priority, false)
    }

    #[test]
    fn creation_defaults() {
        let mut s = sched();
        let id = s.create_task("Worker", noop, 4, 10, 0, 3).unwrap();
        let t = s.task(id);

        assert_eq!(t.state, TaskState::Ready);
        assert_eq!(t.priority, 4);
        assert_eq!(t.original_priority, 4);
        assert!(!t.priority_inherited);
        // Implicit deadline = period.
        assert_eq!(t.relative_deadline, 10);
        assert_eq!(t.next_release, 10);
        assert_eq!(t.absolute_deadline, 10);
        assert_eq!(t.remaining_work, 3);
        assert_eq!(t.wcet_budget, 3);
        assert_eq!(t.invocations, 1);
    }

    #[test]
    fn long_names_are_truncated() {
        let mut s = sched();
        let long = "x".repeat(NAME_MAX + 10);
        let id = s.create_task(&long, noop, 1, 0, 0, 1).unwrap();
        assert_eq!(s.task(id).name.len(), NAME_MAX);
    }

    #[test]
    fn ready_queue_tracks_state() {
        let mut s = sched();
        let id = s.create_task("A", noop, 1, 0, 0, 5).unwrap();
        assert!(s.ready_contains(id));

        s.task_suspend(id);
        assert_eq!(s.task(id).state, TaskState::Suspended);
        assert!(!s.ready_contains(id));

        s.task_resume(id);
        assert_eq!(s.task(id).state, TaskState::Ready);
        assert!(s.ready_contains(id));
    }

    #[test]
    fn resume_only_affects_suspended_tasks() {
        let mut s = sched();
        let id = s.create_task("A", noop, 1, 0, 0, 5).unwrap();
        s.task_terminate(id);
        s.task_resume(id);
        assert_eq!(s.task(id).state, TaskState::Terminated);
        s.task_suspend(id);
        assert_eq!(s.task(id).state, TaskState::Terminated);
    }

    #[test]
    fn priority_change_resorts_ready_queue() {
        let mut s = sched();
        let a = s.create_task("A", noop, 1, 0, 0, 5).unwrap();
        let b = s.create_task("B", noop, 2, 0, 0, 5).unwrap();
        assert_eq!(s.ready_peek(), Some(a));

        s.task_set_priority(b, 0);
        assert_eq!(s.ready_peek(), Some(b));
        assert_eq!(s.task_priority(b), 0);
    }
}
