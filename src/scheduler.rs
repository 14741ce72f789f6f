//! # Scheduler Core
//!
//! The central `Scheduler` owns every task, mutex, and semaphore in the
//! simulation and references them by stable integer handles. This
//! breaks the natural reference cycle between TCBs and mutexes (a task
//! holds mutexes; a mutex points at its owner and waiters) without any
//! shared-ownership machinery: all state lives in the arena, all
//! mutation goes through `&mut Scheduler`.
//!
//! ## Dispatch Algorithm
//!
//! `schedule()` compares the ready-queue head against the current task:
//!
//! 1. No change if the head *is* the current task.
//! 2. If the current task is Running and the head's priority number is
//!    not strictly lower, the incumbent keeps the CPU (ties go to the
//!    running task).
//! 3. Otherwise a context switch moves the Running task back into the
//!    ready queue (counting a preemption) and dispatches the head.
//!
//! With an empty ready queue the idle task is dispatched. There is one
//! logical CPU; preemption is expressed purely through these state
//! transitions.

use heapless::Vec as BoundedVec;
use log::error;

use crate::config::{MAX_TASKS, PRIORITY_IDLE, READY_QUEUE_CAP};
use crate::mutex::{MutexCb, MutexId};
use crate::queue::PrioQueue;
use crate::semaphore::{SemCb, SemId};
use crate::task::{Priority, TaskEntry, TaskId, TaskState, Tcb, Tick};
use crate::timeline::{prio_label, Timeline, VisState};

/// Scheduling policy selected at scheduler creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    /// Fixed priorities as given at task creation.
    Priority,
    /// Priorities derived from periods (shorter period = higher).
    RateMonotonic,
}

fn idle_entry() {
    // Idle loop — runs when nothing else can.
}

// ---------------------------------------------------------------------------
// Scheduler state
// ---------------------------------------------------------------------------

/// Scheduler state: policy, registries, ready queue, timing counters,
/// and the event timeline. Dropping the scheduler drops every task,
/// mutex, and semaphore it registered.
pub struct Scheduler {
    pub policy: SchedPolicy,
    /// Whether contended mutexes boost their owner's priority.
    pub pi_enabled: bool,

    pub(crate) current: Option<TaskId>,
    pub(crate) idle: TaskId,

    /// Priority-sorted ready queue (index 0 = next to run).
    pub(crate) ready: PrioQueue<READY_QUEUE_CAP>,
    /// All tasks, indexed by `TaskId`. Never shrinks.
    pub(crate) tasks: BoundedVec<Tcb, MAX_TASKS>,
    pub(crate) mutexes: Vec<MutexCb>,
    pub(crate) semaphores: Vec<SemCb>,

    pub(crate) system_ticks: Tick,
    pub(crate) context_switches: u64,

    /// Append-only event log consumed by the renderer.
    pub timeline: Timeline,
}

impl Scheduler {
    /// Create a scheduler with the given policy and an idle task.
    ///
    /// The idle task is registered like any other (id 0) but parked
    /// outside the ready queue; the dispatcher returns it only when
    /// the queue is empty.
    pub fn new(policy: SchedPolicy, pi_enabled: bool) -> Self {
        let mut sched = Self {
            policy,
            pi_enabled,
            current: None,
            idle: TaskId(0),
            ready: PrioQueue::new(),
            tasks: BoundedVec::new(),
            mutexes: Vec::new(),
            semaphores: Vec::new(),
            system_ticks: 0,
            context_switches: 0,
            timeline: Timeline::new(),
        };

        let idle = sched
            .create_task("Idle", idle_entry, PRIORITY_IDLE, 0, 0, 0)
            .expect("empty registry always has room for the idle task");
        sched.ready.remove(idle);
        sched.tasks[idle.0].state = TaskState::Suspended;
        sched.tasks[idle.0].remaining_work = u64::MAX;
        sched.idle = idle;
        sched
    }

    // -----------------------------------------------------------------
    // Task registration
    // -----------------------------------------------------------------

    /// Create a task and insert it into the ready queue.
    ///
    /// Under `RateMonotonic` policy a periodic task's initial priority
    /// is its period (a later [`rm_recalculate`](Self::rm_recalculate)
    /// turns these into dense ranks). A `deadline` of 0 means the
    /// deadline equals the period.
    ///
    /// Returns `Err(())` when the task registry is full; the error is
    /// reported and no state changes.
    pub fn create_task(
        &mut self,
        name: &str,
        entry: TaskEntry,
        priority: Priority,
        period: u64,
        deadline: u64,
        wcet: u64,
    ) -> Result<TaskId, ()> {
        if self.tasks.is_full() {
            error!("task registry full ({MAX_TASKS}); {name} not created");
            return Err(());
        }

        let id = TaskId(self.tasks.len());
        let mut tcb = Tcb::new(id, name, entry, priority, self.system_ticks, period, deadline, wcet);

        if self.policy == SchedPolicy::RateMonotonic && period > 0 {
            tcb.priority = period;
            tcb.original_priority = period;
        }

        let prio = tcb.priority;
        if self.tasks.push(tcb).is_err() {
            // Unreachable after the is_full check; keep the registry
            // untouched regardless.
            return Err(());
        }
        self.ready_enqueue(id);

        let ann = format!("{} created ({})", self.tasks[id.0].name, prio_label(prio));
        self.timeline
            .record(self.system_ticks, id, VisState::Ready, ann);
        Ok(id)
    }

    // -----------------------------------------------------------------
    // Ready queue
    // -----------------------------------------------------------------

    /// Insert a task into the ready queue at its current priority.
    /// Overflow is a configuration error: it is reported to the event
    /// log and the insertion is dropped.
    pub(crate) fn ready_enqueue(&mut self, id: TaskId) {
        let prio = self.tasks[id.0].priority;
        if self.ready.insert(id, prio).is_err() {
            let ann = format!("ready queue full: {} dropped", self.tasks[id.0].name);
            error!("{ann}");
            self.timeline
                .record(self.system_ticks, id, VisState::None, ann);
        }
    }

    /// Whether a task currently sits in the ready queue.
    pub fn ready_contains(&self, id: TaskId) -> bool {
        self.ready.contains(id)
    }

    /// The ready-queue head without dispatching it.
    pub fn ready_peek(&self) -> Option<TaskId> {
        self.ready.peek()
    }

    // -----------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------

    /// The task the dispatcher would run next: the ready-queue head,
    /// or the idle task when the queue is empty.
    pub fn next_task(&self) -> TaskId {
        self.ready.peek().unwrap_or(self.idle)
    }

    /// True if the ready-queue head would preempt the current task.
    pub fn needs_preemption(&self) -> bool {
        let Some(curr) = self.current else {
            return true;
        };
        match self.ready.peek() {
            Some(next) => self.tasks[next.0].priority < self.tasks[curr.0].priority,
            None => false,
        }
    }

    /// Run the scheduling decision: dispatch the highest-priority
    /// ready task, preempting the current one only when the newcomer
    /// is strictly higher priority.
    pub fn schedule(&mut self) {
        let next = self.next_task();
        let curr = self.current;

        if curr == Some(next) {
            return;
        }

        if let Some(c) = curr {
            if self.tasks[c.0].state == TaskState::Running {
                if self.tasks[next.0].priority >= self.tasks[c.0].priority {
                    return; // Incumbent wins ties.
                }
                self.timeline.record_preemption(
                    self.system_ticks,
                    &self.tasks[c.0],
                    &self.tasks[next.0],
                );
            }
        }

        self.context_switch(curr, next);
    }

    /// Switch the CPU from `from` to `to`.
    ///
    /// A Running `from` goes back to Ready (counting a preemption);
    /// `to` leaves the ready queue and becomes Running.
    pub(crate) fn context_switch(&mut self, from: Option<TaskId>, to: TaskId) {
        if from == Some(to) {
            return;
        }

        if let Some(f) = from {
            if self.tasks[f.0].state == TaskState::Running {
                self.tasks[f.0].state = TaskState::Ready;
                self.tasks[f.0].ready_since = self.system_ticks;
                self.ready_enqueue(f);
                self.tasks[f.0].preemptions += 1;
                self.timeline
                    .record_state_change(self.system_ticks, f, VisState::Ready);
            }
        }

        self.ready.remove(to);
        self.tasks[to.0].state = TaskState::Running;
        self.current = Some(to);
        self.context_switches += 1;
        self.timeline
            .record_state_change(self.system_ticks, to, VisState::Running);
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn current_task(&self) -> Option<TaskId> {
        self.current
    }

    pub fn idle_task(&self) -> TaskId {
        self.idle
    }

    pub fn ticks(&self) -> Tick {
        self.system_ticks
    }

    pub fn context_switches(&self) -> u64 {
        self.context_switches
    }

    /// Number of registered tasks, idle included.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Borrow a task record.
    ///
    /// # Panics
    /// On a handle from a different scheduler instance.
    pub fn task(&self, id: TaskId) -> &Tcb {
        &self.tasks[id.0]
    }

    /// Iterate all registered tasks in creation order.
    pub fn all_tasks(&self) -> impl Iterator<Item = &Tcb> {
        self.tasks.iter()
    }

    /// Borrow a mutex record.
    ///
    /// # Panics
    /// On a handle from a different scheduler instance.
    pub fn mutex(&self, id: MutexId) -> &MutexCb {
        &self.mutexes[id.0]
    }

    /// Borrow a semaphore record.
    ///
    /// # Panics
    /// On a handle from a different scheduler instance.
    pub fn semaphore(&self, id: SemId) -> &SemCb {
        &self.semaphores[id.0]
    }

    /// Render the recorded timeline to stdout.
    pub fn render_timeline(&self) {
        self.timeline.render(&self.tasks, self.context_switches);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() {}

    #[test]
    fn idle_task_is_registered_but_not_queued() {
        let s = Scheduler::new(SchedPolicy::Priority, false);
        assert_eq!(s.task_count(), 1);
        let idle = s.idle_task();
        assert!(s.task(idle).is_idle());
        assert!(!s.ready_contains(idle));
        assert_eq!(s.next_task(), idle);
    }

    #[test]
    fn dispatch_picks_lowest_priority_number() {
        let mut s = Scheduler::new(SchedPolicy::Priority, false);
        let a = s.create_task("A", noop, 3, 0, 0, 5).unwrap();
        let b = s.create_task("B", noop, 1, 0, 0, 5).unwrap();
        let c = s.create_task("C", noop, 2, 0, 0, 5).unwrap();

        s.schedule();
        assert_eq!(s.current_task(), Some(b));
        assert_eq!(s.task(b).state, TaskState::Running);
        assert!(s.ready_contains(a));
        assert!(s.ready_contains(c));
        assert!(!s.ready_contains(b));
    }

    #[test]
    fn equal_priority_does_not_preempt() {
        let mut s = Scheduler::new(SchedPolicy::Priority, false);
        let a = s.create_task("A", noop, 2, 0, 0, 5).unwrap();
        s.schedule();
        assert_eq!(s.current_task(), Some(a));
        let switches = s.context_switches();

        let b = s.create_task("B", noop, 2, 0, 0, 5).unwrap();
        s.schedule();
        assert_eq!(s.current_task(), Some(a));
        assert_eq!(s.context_switches(), switches);
        assert_eq!(s.task(b).state, TaskState::Ready);
        assert_eq!(s.task(a).preemptions, 0);
    }

    #[test]
    fn strictly_higher_priority_preempts() {
        let mut s = Scheduler::new(SchedPolicy::Priority, false);
        let low = s.create_task("Low", noop, 9, 0, 0, 5).unwrap();
        s.schedule();
        assert_eq!(s.current_task(), Some(low));

        let high = s.create_task("High", noop, 1, 0, 0, 5).unwrap();
        s.schedule();
        assert_eq!(s.current_task(), Some(high));
        assert_eq!(s.task(low).state, TaskState::Ready);
        assert_eq!(s.task(low).preemptions, 1);
        assert!(s.ready_contains(low));
    }

    #[test]
    fn idle_runs_when_queue_empties() {
        let mut s = Scheduler::new(SchedPolicy::Priority, false);
        let a = s.create_task("A", noop, 1, 0, 0, 5).unwrap();
        s.schedule();
        s.task_terminate(a);
        s.schedule();
        assert_eq!(s.current_task(), Some(s.idle_task()));
    }

    #[test]
    fn needs_preemption_reflects_queue_head() {
        let mut s = Scheduler::new(SchedPolicy::Priority, false);
        assert!(s.needs_preemption()); // nothing running yet

        let low = s.create_task("Low", noop, 5, 0, 0, 5).unwrap();
        s.schedule();
        assert_eq!(s.current_task(), Some(low));
        assert!(!s.needs_preemption()); // queue empty

        s.create_task("Equal", noop, 5, 0, 0, 5).unwrap();
        assert!(!s.needs_preemption()); // tie keeps incumbent

        s.create_task("High", noop, 1, 0, 0, 5).unwrap();
        assert!(s.needs_preemption());
    }

    #[test]
    fn rm_policy_overrides_initial_priority_with_period() {
        let mut s = Scheduler::new(SchedPolicy::RateMonotonic, false);
        let t = s.create_task("T", noop, 7, 25, 0, 5).unwrap();
        assert_eq!(s.task(t).priority, 25);
        assert_eq!(s.task(t).original_priority, 25);

        let ap = s.create_task("Ap", noop, 7, 0, 0, 5).unwrap();
        assert_eq!(s.task(ap).priority, 7); // aperiodic keeps its own
    }

    #[test]
    fn registry_overflow_is_reported_not_fatal() {
        let mut s = Scheduler::new(SchedPolicy::Priority, false);
        for i in 0..(MAX_TASKS - 1) {
            s.create_task(&format!("T{i}"), noop, 5, 0, 0, 1).unwrap();
        }
        assert_eq!(s.task_count(), MAX_TASKS);
        assert!(s.create_task("Overflow", noop, 5, 0, 0, 1).is_err());
        assert_eq!(s.task_count(), MAX_TASKS);
    }
}
