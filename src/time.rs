//! # Time Engine
//!
//! Simulated time advances in whole ticks under driver control. Each
//! tick does three passes, in a fixed order:
//!
//! 1. **Accounting** — charge the Running task one tick of execution
//!    and consume one tick of its work budget.
//! 2. **Periodic release** — move Suspended periodic tasks whose
//!    release boundary is exactly now back to Ready and open a fresh
//!    deadline window.
//! 3. **Deadline check** — record a miss for any Running/Ready task
//!    strictly past its absolute deadline with work outstanding.
//!
//! Dispatch is *not* part of the tick; drivers call
//! [`Scheduler::schedule`] after each tick (or use
//! [`Scheduler::advance_time`], which bundles the two).

use crate::scheduler::Scheduler;
use crate::task::{TaskId, TaskState, Tick};
use crate::timeline::VisState;

impl Scheduler {
    /// Process one system tick: accounting, releases, deadlines.
    pub fn tick_handler(&mut self) {
        self.system_ticks += 1;

        if let Some(curr) = self.current {
            if self.tasks[curr.0].state == TaskState::Running {
                let t = &mut self.tasks[curr.0];
                t.exec_time += 1;
                t.total_exec_time += 1;
                if t.remaining_work > 0 {
                    t.remaining_work -= 1;
                }
                if t.exec_time > t.wcet_observed {
                    t.wcet_observed = t.exec_time;
                }
            }
        }

        self.check_periodic_releases();
        self.check_deadlines();
    }

    /// Release every Suspended periodic task whose period boundary is
    /// exactly this tick: schedule the next release, open a new
    /// deadline window, reset per-period accounting, and make it
    /// Ready.
    pub fn check_periodic_releases(&mut self) {
        for i in 0..self.tasks.len() {
            let id = TaskId(i);
            if id == self.idle || self.tasks[i].period == 0 {
                continue;
            }
            if self.tasks[i].state != TaskState::Suspended
                || self.system_ticks != self.tasks[i].next_release
            {
                continue;
            }

            let period = self.tasks[i].period;
            self.tasks[i].next_release = self.system_ticks + period;
            self.tasks[i].absolute_deadline = self.system_ticks + self.tasks[i].relative_deadline;
            self.tasks[i].exec_time = 0;
            self.tasks[i].invocations += 1;

            self.task_set_state(id, TaskState::Ready);

            let ann = format!(
                "{} released (period={}, deadline={})",
                self.tasks[i].name, period, self.tasks[i].absolute_deadline
            );
            self.timeline
                .record(self.system_ticks, id, VisState::None, ann);
        }
    }

    /// Record a deadline miss for each Running/Ready task strictly
    /// past its absolute deadline with work left. The window is then
    /// pushed to the far future so one release misses at most once.
    pub fn check_deadlines(&mut self) {
        for i in 0..self.tasks.len() {
            let id = TaskId(i);
            if id == self.idle {
                continue;
            }
            // Aperiodic tasks without a deadline are exempt.
            if self.tasks[i].period == 0 && self.tasks[i].relative_deadline == 0 {
                continue;
            }

            let state = self.tasks[i].state;
            let miss = (state == TaskState::Running || state == TaskState::Ready)
                && self.tasks[i].absolute_deadline > 0
                && self.system_ticks > self.tasks[i].absolute_deadline
                && self.tasks[i].remaining_work > 0;
            if !miss {
                continue;
            }

            self.tasks[i].deadline_misses += 1;
            self.timeline.record_deadline_miss(
                self.system_ticks,
                &self.tasks[i],
                self.tasks[i].absolute_deadline,
                self.system_ticks,
            );
            self.tasks[i].absolute_deadline = u64::MAX;
        }
    }

    /// Advance simulated time by `ticks`, dispatching after each tick.
    pub fn advance_time(&mut self, ticks: Tick) {
        for _ in 0..ticks {
            self.tick_handler();
            self.schedule();
        }
    }

    /// Give `task` a fresh work budget of `work_ticks` and run the
    /// tick loop while it stays current. The loop bails as soon as a
    /// higher-priority task becomes ready; progress survives only as
    /// consumed `remaining_work`, and the dispatcher re-selects the
    /// task later.
    pub fn simulate_work(&mut self, task: TaskId, work_ticks: u64) {
        if !self.task_id_valid(task) {
            return;
        }

        self.tasks[task.0].remaining_work = work_ticks;

        for _ in 0..work_ticks {
            if self.current != Some(task) {
                return;
            }

            self.tick_handler();

            if self.needs_preemption() {
                self.schedule();
                return;
            }
        }
    }
}
