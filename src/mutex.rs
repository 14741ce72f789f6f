//! # Mutex with Priority Inheritance
//!
//! Mutual exclusion with an optional priority inheritance protocol
//! (PIP) that solves unbounded priority inversion: when a high-priority
//! task blocks on a mutex held by a lower-priority task, the holder
//! temporarily inherits the blocker's priority so no medium-priority
//! task can starve it. Inheritance propagates transitively through
//! chains of holders that are themselves blocked.
//!
//! ## Unlock Ordering
//!
//! The release sequence is load-bearing:
//!
//! 1. record the unlock event,
//! 2. drop the mutex from the owner's held set,
//! 3. restore the owner's priority (computed from what it *still*
//!    holds),
//! 4. hand ownership to the highest-priority waiter,
//! 5. re-dispatch (the woken waiter may preempt immediately).
//!
//! Restoring before the handoff makes the restored priority reflect
//! the post-release held set.

use log::{error, warn};

use crate::config::WAIT_QUEUE_CAP;
use crate::queue::PrioQueue;
use crate::scheduler::Scheduler;
use crate::task::{Priority, TaskId, TaskState};
use crate::timeline::{prio_label, VisState};

/// Stable handle into the scheduler's mutex registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutexId(pub usize);

/// Mutex control block. `locked` and `owner` move together: a locked
/// mutex always has an owner whose held set contains this mutex.
#[derive(Debug)]
pub struct MutexCb {
    pub name: String,
    pub locked: bool,
    pub owner: Option<TaskId>,
    /// Blocked tasks in priority order (FIFO among equals).
    pub(crate) waiters: PrioQueue<WAIT_QUEUE_CAP>,
    pub(crate) destroyed: bool,
}

impl MutexCb {
    /// Number of tasks currently blocked on this mutex.
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

impl Scheduler {
    /// Create an unlocked mutex.
    pub fn mutex_create(&mut self, name: &str) -> MutexId {
        let id = MutexId(self.mutexes.len());
        self.mutexes.push(MutexCb {
            name: name.to_string(),
            locked: false,
            owner: None,
            waiters: PrioQueue::new(),
            destroyed: false,
        });
        id
    }

    /// Destroy a mutex. Refused while tasks are blocked on it; a
    /// still-locked mutex is force-released from its owner with a
    /// warning (shutdown cleanup).
    pub fn mutex_destroy(&mut self, m: MutexId) {
        if !self.mutex_usable(m) {
            return;
        }
        if !self.mutexes[m.0].waiters.is_empty() {
            error!(
                "mutex {} destroyed with {} waiter(s); refusing",
                self.mutexes[m.0].name,
                self.mutexes[m.0].waiters.len()
            );
            return;
        }
        if self.mutexes[m.0].locked {
            if let Some(owner) = self.mutexes[m.0].owner {
                warn!(
                    "mutex {} destroyed while held by {}; force-releasing",
                    self.mutexes[m.0].name, self.tasks[owner.0].name
                );
                self.task_remove_held_mutex(owner, m);
            }
            self.mutexes[m.0].locked = false;
            self.mutexes[m.0].owner = None;
        }
        self.mutexes[m.0].destroyed = true;
    }

    // -----------------------------------------------------------------
    // Lock / Unlock
    // -----------------------------------------------------------------

    /// Lock `m` on behalf of `task`.
    ///
    /// An unlocked mutex is acquired immediately. A locked one blocks
    /// the requester: the contention is recorded, the owner is boosted
    /// if PIP is enabled and the requester outranks it, the requester
    /// joins the wait queue, and the dispatcher runs.
    pub fn mutex_lock(&mut self, m: MutexId, task: TaskId) {
        if !self.mutex_usable(m) || !self.task_id_valid(task) {
            return;
        }

        if !self.mutexes[m.0].locked {
            self.mutexes[m.0].locked = true;
            self.mutexes[m.0].owner = Some(task);
            self.task_add_held_mutex(task, m);
            self.timeline.record_mutex_op(
                self.system_ticks,
                &self.tasks[task.0],
                &self.mutexes[m.0].name,
                "locks",
            );
            return;
        }

        let owner = match self.mutexes[m.0].owner {
            Some(o) => o,
            None => {
                error!("mutex {} locked without owner", self.mutexes[m.0].name);
                return;
            }
        };
        if owner == task {
            error!(
                "{} attempted to re-lock {} it already owns",
                self.tasks[task.0].name, self.mutexes[m.0].name
            );
            return;
        }

        let ann = format!(
            "{} tries to lock {} (blocked by {})",
            self.tasks[task.0].name, self.mutexes[m.0].name, self.tasks[owner.0].name
        );
        self.timeline
            .record(self.system_ticks, task, VisState::None, ann);

        if self.mutexes[m.0].waiters.is_full() {
            let ann = format!(
                "wait queue full on {}: {} dropped",
                self.mutexes[m.0].name, self.tasks[task.0].name
            );
            error!("{ann}");
            self.timeline
                .record(self.system_ticks, task, VisState::None, ann);
            return;
        }

        if self.pi_enabled && self.tasks[task.0].priority < self.tasks[owner.0].priority {
            self.timeline.record_priority_inherit(
                self.system_ticks,
                &self.tasks[owner.0],
                &self.tasks[task.0],
                &self.mutexes[m.0].name,
            );
            let donated = self.tasks[task.0].priority;
            self.priority_inherit(owner, donated);
        }

        self.tasks[task.0].blocked_on = Some(m);
        self.task_set_state(task, TaskState::Blocked);
        let prio = self.tasks[task.0].priority;
        // Capacity checked above; the insert cannot fail here.
        let _ = self.mutexes[m.0].waiters.insert(task, prio);

        self.schedule();
    }

    /// Unlock `m`. Only the owner may unlock; anyone else is reported
    /// and nothing changes.
    pub fn mutex_unlock(&mut self, m: MutexId, task: TaskId) {
        if !self.mutex_usable(m) || !self.task_id_valid(task) {
            return;
        }
        if self.mutexes[m.0].owner != Some(task) {
            error!(
                "{} is not the owner of {}",
                self.tasks[task.0].name, self.mutexes[m.0].name
            );
            return;
        }

        self.timeline.record_mutex_op(
            self.system_ticks,
            &self.tasks[task.0],
            &self.mutexes[m.0].name,
            "unlocks",
        );

        self.task_remove_held_mutex(task, m);

        // Restore before the handoff so the new priority reflects the
        // post-release held set.
        if self.pi_enabled {
            self.priority_restore(task);
        }

        match self.mutexes[m.0].waiters.pop() {
            Some(waiter) => {
                self.tasks[waiter.0].blocked_on = None;
                self.mutexes[m.0].owner = Some(waiter);
                self.task_add_held_mutex(waiter, m);
                self.task_set_state(waiter, TaskState::Ready);

                let ann = format!(
                    "{} acquires {} (was waiting)",
                    self.tasks[waiter.0].name, self.mutexes[m.0].name
                );
                self.timeline
                    .record(self.system_ticks, waiter, VisState::None, ann);
            }
            None => {
                self.mutexes[m.0].locked = false;
                self.mutexes[m.0].owner = None;
            }
        }

        // The newly woken waiter may preempt immediately.
        self.schedule();
    }

    // -----------------------------------------------------------------
    // Priority inheritance
    // -----------------------------------------------------------------

    /// Boost `task` to `new_priority` if that is strictly higher
    /// (numerically lower), propagating through the block chain.
    ///
    /// The original priority is snapshotted exactly once per
    /// inheritance episode; nested boosts never overwrite it.
    pub fn priority_inherit(&mut self, task: TaskId, new_priority: Priority) {
        self.inherit_boost(task, new_priority, 0);
    }

    fn inherit_boost(&mut self, task: TaskId, new_priority: Priority, depth: usize) {
        // The chain is acyclic while no task blocks on a mutex it
        // owns; the depth cap tolerates malformed inputs anyway.
        if depth >= self.tasks.len() || !self.task_id_valid(task) {
            return;
        }
        if new_priority >= self.tasks[task.0].priority {
            return;
        }

        let old = self.tasks[task.0].priority;
        if !self.tasks[task.0].priority_inherited {
            self.tasks[task.0].original_priority = old;
            self.tasks[task.0].priority_inherited = true;
        }
        self.tasks[task.0].priority = new_priority;
        self.tasks[task.0].priority_boosts += 1;

        let ann = format!(
            "{} priority boosted: {} -> {} (inherited)",
            self.tasks[task.0].name,
            prio_label(old),
            prio_label(new_priority)
        );
        self.timeline
            .record(self.system_ticks, task, VisState::None, ann);

        if self.tasks[task.0].state == TaskState::Ready {
            self.ready.remove(task);
            self.ready_enqueue(task);
        }

        // Transitive step: the boosted holder may itself be blocked on
        // a mutex whose owner must also outrank the donor.
        if let Some(next_mutex) = self.tasks[task.0].blocked_on {
            if let Some(next_owner) = self.mutexes[next_mutex.0].owner {
                self.inherit_boost(next_owner, new_priority, depth + 1);
            }
        }
    }

    /// Recompute `task`'s priority after it released a mutex: the
    /// original priority, raised only as far as the highest-priority
    /// waiter across the mutexes it still holds.
    pub fn priority_restore(&mut self, task: TaskId) {
        if !self.task_id_valid(task) || !self.tasks[task.0].priority_inherited {
            return;
        }

        let old = self.tasks[task.0].priority;
        let mut needed = self.tasks[task.0].original_priority;
        let held = self.tasks[task.0].held_mutexes.clone();
        for m in held.iter().copied() {
            for waiter in self.mutexes[m.0].waiters.iter() {
                needed = needed.min(self.tasks[waiter.0].priority);
            }
        }

        self.tasks[task.0].priority = needed;
        if needed == self.tasks[task.0].original_priority {
            self.tasks[task.0].priority_inherited = false;
        }

        self.timeline
            .record_priority_restore(self.system_ticks, &self.tasks[task.0], old, needed);

        if self.tasks[task.0].state == TaskState::Ready {
            self.ready.remove(task);
            self.ready_enqueue(task);
        }
    }

    fn mutex_usable(&self, m: MutexId) -> bool {
        m.0 < self.mutexes.len() && !self.mutexes[m.0].destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedPolicy;

    fn noop() {}

    fn pi_sched() -> Scheduler {
        Scheduler::new(SchedPolicy::Priority, true)
    }

    #[test]
    fn unheld_mutex_acquired_immediately() {
        let mut s = pi_sched();
        let t = s.create_task("T", noop, 5, 0, 0, 10).unwrap();
        let m = s.mutex_create("M");
        s.schedule();

        s.mutex_lock(m, t);
        assert!(s.mutex(m).locked);
        assert_eq!(s.mutex(m).owner, Some(t));
        assert_eq!(s.task(t).held_mutexes.as_slice(), &[m]);
        assert_eq!(s.task(t).state, TaskState::Running);
    }

    #[test]
    fn non_owner_unlock_is_rejected() {
        let mut s = pi_sched();
        let a = s.create_task("A", noop, 5, 0, 0, 10).unwrap();
        let b = s.create_task("B", noop, 6, 0, 0, 10).unwrap();
        let m = s.mutex_create("M");
        s.schedule();
        s.mutex_lock(m, a);

        s.mutex_unlock(m, b);
        assert!(s.mutex(m).locked);
        assert_eq!(s.mutex(m).owner, Some(a));
    }

    #[test]
    fn self_relock_is_rejected() {
        let mut s = pi_sched();
        let a = s.create_task("A", noop, 5, 0, 0, 10).unwrap();
        let m = s.mutex_create("M");
        s.schedule();
        s.mutex_lock(m, a);

        s.mutex_lock(m, a);
        assert_eq!(s.task(a).state, TaskState::Running);
        assert_eq!(s.mutex(m).waiter_count(), 0);
    }

    #[test]
    fn contention_blocks_and_boosts_owner() {
        let mut s = pi_sched();
        let low = s.create_task("Low", noop, 10, 0, 0, 20).unwrap();
        let m = s.mutex_create("M");
        s.schedule();
        s.mutex_lock(m, low);

        let high = s.create_task("High", noop, 1, 0, 0, 10).unwrap();
        s.schedule();
        assert_eq!(s.current_task(), Some(high));

        s.mutex_lock(m, high);
        assert_eq!(s.task(high).state, TaskState::Blocked);
        assert_eq!(s.task(high).blocked_on, Some(m));
        assert_eq!(s.mutex(m).waiter_count(), 1);

        // The holder inherited the blocker's priority and runs again.
        assert_eq!(s.task(low).priority, 1);
        assert_eq!(s.task(low).original_priority, 10);
        assert!(s.task(low).priority_inherited);
        assert_eq!(s.task(low).priority_boosts, 1);
        assert_eq!(s.current_task(), Some(low));
    }

    #[test]
    fn no_boost_without_priority_inheritance() {
        let mut s = Scheduler::new(SchedPolicy::Priority, false);
        let low = s.create_task("Low", noop, 10, 0, 0, 20).unwrap();
        let m = s.mutex_create("M");
        s.schedule();
        s.mutex_lock(m, low);

        let high = s.create_task("High", noop, 1, 0, 0, 10).unwrap();
        s.schedule();
        s.mutex_lock(m, high);

        assert_eq!(s.task(low).priority, 10);
        assert_eq!(s.task(low).priority_boosts, 0);
        assert_eq!(s.task(high).state, TaskState::Blocked);
    }

    #[test]
    fn lower_priority_requester_does_not_boost() {
        let mut s = pi_sched();
        let a = s.create_task("A", noop, 3, 0, 0, 20).unwrap();
        let m = s.mutex_create("M");
        s.schedule();
        s.mutex_lock(m, a);

        let b = s.create_task("B", noop, 7, 0, 0, 10).unwrap();
        s.mutex_lock(m, b);
        assert_eq!(s.task(a).priority, 3);
        assert_eq!(s.task(a).priority_boosts, 0);
        assert_eq!(s.task(b).state, TaskState::Blocked);
    }

    #[test]
    fn unlock_restores_priority_and_hands_off() {
        let mut s = pi_sched();
        let low = s.create_task("Low", noop, 10, 0, 0, 20).unwrap();
        let m = s.mutex_create("M");
        s.schedule();
        s.mutex_lock(m, low);

        let high = s.create_task("High", noop, 1, 0, 0, 10).unwrap();
        s.schedule();
        s.mutex_lock(m, high);

        s.mutex_unlock(m, low);

        assert_eq!(s.task(low).priority, 10);
        assert!(!s.task(low).priority_inherited);
        assert!(s.task(low).held_mutexes.is_empty());

        // Ownership moved to the waiter, which preempts immediately.
        assert_eq!(s.mutex(m).owner, Some(high));
        assert!(s.mutex(m).locked);
        assert_eq!(s.task(high).blocked_on, None);
        assert_eq!(s.task(high).held_mutexes.as_slice(), &[m]);
        assert_eq!(s.current_task(), Some(high));
    }

    #[test]
    fn waiters_wake_in_priority_order_fifo_on_ties() {
        let mut s = Scheduler::new(SchedPolicy::Priority, false);
        let holder = s.create_task("Holder", noop, 1, 0, 0, 50).unwrap();
        let m = s.mutex_create("M");
        s.schedule();
        s.mutex_lock(m, holder);

        let w1 = s.create_task("W1", noop, 5, 0, 0, 5).unwrap();
        let w2 = s.create_task("W2", noop, 5, 0, 0, 5).unwrap();
        let w3 = s.create_task("W3", noop, 2, 0, 0, 5).unwrap();
        s.mutex_lock(m, w1);
        s.mutex_lock(m, w2);
        s.mutex_lock(m, w3);

        s.mutex_unlock(m, holder);
        assert_eq!(s.mutex(m).owner, Some(w3)); // strictly higher first
        s.mutex_unlock(m, w3);
        assert_eq!(s.mutex(m).owner, Some(w1)); // FIFO among equals
        s.mutex_unlock(m, w1);
        assert_eq!(s.mutex(m).owner, Some(w2));
    }

    #[test]
    fn transitive_chain_boosts_every_holder() {
        let mut s = pi_sched();
        let very_low = s.create_task("VeryLow", noop, 20, 0, 0, 30).unwrap();
        let low = s.create_task("Low", noop, 15, 0, 0, 20).unwrap();
        let a = s.mutex_create("A");
        let b = s.mutex_create("B");

        s.schedule();
        s.mutex_lock(a, very_low);
        s.mutex_lock(b, low);
        s.mutex_lock(a, low); // Low blocks on A, boosting VeryLow to 15

        assert_eq!(s.task(very_low).priority, 15);

        let high = s.create_task("High", noop, 1, 0, 0, 10).unwrap();
        s.schedule();
        s.mutex_lock(b, high); // High blocks on B -> Low -> VeryLow

        assert_eq!(s.task(low).priority, 1);
        assert_eq!(s.task(very_low).priority, 1);
        assert!(s.task(low).priority_boosts >= 1);
        assert!(s.task(very_low).priority_boosts >= 2);
        // Snapshots survive the nested boost.
        assert_eq!(s.task(low).original_priority, 15);
        assert_eq!(s.task(very_low).original_priority, 20);
    }

    #[test]
    fn restore_respects_remaining_waiter_pressure() {
        let mut s = pi_sched();
        let holder = s.create_task("Holder", noop, 20, 0, 0, 50).unwrap();
        let m1 = s.mutex_create("M1");
        let m2 = s.mutex_create("M2");
        s.schedule();
        s.mutex_lock(m1, holder);
        s.mutex_lock(m2, holder);

        let mid = s.create_task("Mid", noop, 8, 0, 0, 5).unwrap();
        s.schedule();
        s.mutex_lock(m1, mid); // boost to 8

        let high = s.create_task("High", noop, 2, 0, 0, 5).unwrap();
        s.schedule();
        s.mutex_lock(m2, high); // boost to 2

        assert_eq!(s.task(holder).priority, 2);

        // Releasing M2 hands it to High; M1's waiter still pins the
        // holder at priority 8.
        s.mutex_unlock(m2, holder);
        assert_eq!(s.task(holder).priority, 8);
        assert!(s.task(holder).priority_inherited);

        s.mutex_unlock(m1, holder);
        assert_eq!(s.task(holder).priority, 20);
        assert!(!s.task(holder).priority_inherited);
    }

    #[test]
    fn destroy_force_releases_held_mutex() {
        let mut s = pi_sched();
        let t = s.create_task("T", noop, 5, 0, 0, 10).unwrap();
        let m = s.mutex_create("M");
        s.schedule();
        s.mutex_lock(m, t);

        s.mutex_destroy(m);
        assert!(s.task(t).held_mutexes.is_empty());
        // Destroyed mutexes ignore further operations.
        s.mutex_lock(m, t);
        assert!(s.task(t).held_mutexes.is_empty());
    }

    #[test]
    fn destroy_refused_while_waited_on() {
        let mut s = pi_sched();
        let a = s.create_task("A", noop, 5, 0, 0, 10).unwrap();
        let b = s.create_task("B", noop, 6, 0, 0, 10).unwrap();
        let m = s.mutex_create("M");
        s.schedule();
        s.mutex_lock(m, a);
        s.mutex_lock(m, b);

        s.mutex_destroy(m);
        assert!(s.mutex(m).locked);
        assert_eq!(s.mutex(m).owner, Some(a));
        assert_eq!(s.mutex(m).waiter_count(), 1);
    }
}
