//! # Counting Semaphore
//!
//! Classic P/V counting semaphore for signaling and resource counting.
//! The wait queue uses the same priority-ordered discipline as the
//! mutex, but semaphores never invoke priority inheritance — there is
//! no single "owner" to boost.

use log::error;

use crate::config::WAIT_QUEUE_CAP;
use crate::queue::PrioQueue;
use crate::scheduler::Scheduler;
use crate::task::{TaskId, TaskState};
use crate::timeline::VisState;

/// Stable handle into the scheduler's semaphore registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemId(pub usize);

/// Semaphore control block.
#[derive(Debug)]
pub struct SemCb {
    pub name: String,
    /// Available units; never exceeds `max_count`.
    pub count: u32,
    pub max_count: u32,
    pub(crate) waiters: PrioQueue<WAIT_QUEUE_CAP>,
}

impl SemCb {
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

impl Scheduler {
    /// Create a semaphore with `initial` available units and a cap of
    /// `max_count`.
    pub fn semaphore_create(&mut self, name: &str, initial: u32, max_count: u32) -> SemId {
        let id = SemId(self.semaphores.len());
        self.semaphores.push(SemCb {
            name: name.to_string(),
            count: initial.min(max_count),
            max_count,
            waiters: PrioQueue::new(),
        });
        id
    }

    /// P operation: take a unit, or block in priority order until one
    /// is signalled.
    pub fn semaphore_wait(&mut self, s: SemId, task: TaskId) {
        if !self.sem_id_valid(s) || !self.task_id_valid(task) {
            return;
        }

        if self.semaphores[s.0].count > 0 {
            self.semaphores[s.0].count -= 1;
            return;
        }

        if self.semaphores[s.0].waiters.is_full() {
            let ann = format!(
                "wait queue full on {}: {} dropped",
                self.semaphores[s.0].name, self.tasks[task.0].name
            );
            error!("{ann}");
            self.timeline
                .record(self.system_ticks, task, VisState::None, ann);
            return;
        }

        self.task_set_state(task, TaskState::Blocked);
        let prio = self.tasks[task.0].priority;
        // Capacity checked above; the insert cannot fail here.
        let _ = self.semaphores[s.0].waiters.insert(task, prio);

        self.schedule();
    }

    /// V operation: wake the highest-priority waiter, or bank a unit
    /// up to `max_count`.
    pub fn semaphore_signal(&mut self, s: SemId, _task: TaskId) {
        if !self.sem_id_valid(s) {
            return;
        }

        match self.semaphores[s.0].waiters.pop() {
            Some(waiter) => {
                // The unit passes straight to the waiter; the count is
                // untouched.
                self.task_set_state(waiter, TaskState::Ready);
                self.schedule();
            }
            None => {
                if self.semaphores[s.0].count < self.semaphores[s.0].max_count {
                    self.semaphores[s.0].count += 1;
                }
            }
        }
    }

    fn sem_id_valid(&self, s: SemId) -> bool {
        s.0 < self.semaphores.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedPolicy;

    fn noop() {}

    #[test]
    fn wait_consumes_available_units() {
        let mut sched = Scheduler::new(SchedPolicy::Priority, false);
        let t = sched.create_task("T", noop, 5, 0, 0, 10).unwrap();
        let s = sched.semaphore_create("S", 2, 5);
        sched.schedule();

        sched.semaphore_wait(s, t);
        sched.semaphore_wait(s, t);
        assert_eq!(sched.semaphore(s).count, 0);
        assert_eq!(sched.task(t).state, TaskState::Running);
    }

    #[test]
    fn wait_on_depleted_semaphore_blocks() {
        let mut sched = Scheduler::new(SchedPolicy::Priority, false);
        let t = sched.create_task("T", noop, 5, 0, 0, 10).unwrap();
        let s = sched.semaphore_create("S", 0, 5);
        sched.schedule();

        sched.semaphore_wait(s, t);
        assert_eq!(sched.task(t).state, TaskState::Blocked);
        assert_eq!(sched.semaphore(s).waiter_count(), 1);
        // Blocking on a semaphore involves no mutex.
        assert_eq!(sched.task(t).blocked_on, None);
    }

    #[test]
    fn signal_wakes_highest_priority_waiter() {
        let mut sched = Scheduler::new(SchedPolicy::Priority, false);
        let runner = sched.create_task("Runner", noop, 1, 0, 0, 50).unwrap();
        let lo = sched.create_task("Lo", noop, 9, 0, 0, 5).unwrap();
        let hi = sched.create_task("Hi", noop, 3, 0, 0, 5).unwrap();
        let s = sched.semaphore_create("S", 0, 5);
        sched.schedule();
        assert_eq!(sched.current_task(), Some(runner));

        sched.semaphore_wait(s, lo);
        sched.semaphore_wait(s, hi);
        assert_eq!(sched.semaphore(s).waiter_count(), 2);

        sched.semaphore_signal(s, runner);
        assert_eq!(sched.task(hi).state, TaskState::Ready);
        assert_eq!(sched.task(lo).state, TaskState::Blocked);
        // Passing the unit to a waiter leaves the count untouched.
        assert_eq!(sched.semaphore(s).count, 0);
    }

    #[test]
    fn signal_never_exceeds_max_count() {
        let mut sched = Scheduler::new(SchedPolicy::Priority, false);
        let t = sched.create_task("T", noop, 5, 0, 0, 10).unwrap();
        let s = sched.semaphore_create("S", 5, 5);
        sched.schedule();

        sched.semaphore_signal(s, t);
        assert_eq!(sched.semaphore(s).count, 5);
    }

    #[test]
    fn semaphores_do_not_inherit_priority() {
        let mut sched = Scheduler::new(SchedPolicy::Priority, true);
        let low = sched.create_task("Low", noop, 10, 0, 0, 20).unwrap();
        let s = sched.semaphore_create("S", 0, 5);
        sched.schedule();

        let high = sched.create_task("High", noop, 1, 0, 0, 10).unwrap();
        sched.schedule();
        sched.semaphore_wait(s, high);

        // High blocks, but Low's priority is untouched even with the
        // inheritance protocol enabled on the scheduler.
        assert_eq!(sched.task(high).state, TaskState::Blocked);
        assert_eq!(sched.task(low).priority, 10);
        assert_eq!(sched.task(low).priority_boosts, 0);
    }
}
