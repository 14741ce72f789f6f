//! # Rate Monotonic Analysis
//!
//! Priority assignment and schedulability analysis for the
//! `RateMonotonic` policy. Priorities become dense ranks by ascending
//! period (rank 0 = shortest period = highest priority), and the
//! classic Liu–Layland utilization test gives a quick verdict:
//!
//! - `U ≤ n(2^(1/n) − 1)` — guaranteed schedulable,
//! - `bound < U ≤ 1` — possibly schedulable, simulate to find out,
//! - `U > 1` — overloaded, not schedulable.
//!
//! Utilization divides each periodic task's *current* work budget by
//! its period, so the analysis matches the configured workload only
//! before the simulation starts consuming it (the frozen
//! `wcet_budget` is what the report table shows).

use crate::scheduler::Scheduler;
use crate::task::{TaskId, TaskState};

/// Outcome of the Liu–Layland utilization test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RmVerdict {
    /// `U ≤ bound`: every deadline is guaranteed.
    Schedulable,
    /// `bound < U ≤ 1`: the test is inconclusive.
    PossiblySchedulable,
    /// `U > 1`: demand exceeds the CPU.
    NotSchedulable,
}

/// Schedulability analysis over the current periodic task set.
#[derive(Debug, Clone, Copy)]
pub struct RmAnalysis {
    /// Number of periodic tasks analyzed.
    pub periodic_tasks: usize,
    /// Total utilization `Σ C_i / T_i`.
    pub utilization: f64,
    /// Liu–Layland bound `n(2^(1/n) − 1)`.
    pub bound: f64,
    pub verdict: RmVerdict,
}

impl Scheduler {
    /// Reassign every live periodic task's priority to its rank by
    /// ascending period, then rebuild the ready queue in the new
    /// order. Idempotent on a fixed task set.
    pub fn rm_recalculate(&mut self) {
        let mut periodic: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|t| {
                t.period > 0 && t.state != TaskState::Terminated && t.id != self.idle
            })
            .map(|t| t.id)
            .collect();
        // Stable sort keeps registration order among equal periods.
        periodic.sort_by_key(|&id| self.tasks[id.0].period);

        for (rank, &id) in periodic.iter().enumerate() {
            self.tasks[id.0].priority = rank as u64;
            self.tasks[id.0].original_priority = rank as u64;
        }

        self.ready.clear();
        for i in 0..self.tasks.len() {
            let id = TaskId(i);
            if id != self.idle && self.tasks[i].state == TaskState::Ready {
                self.ready_enqueue(id);
            }
        }
    }

    /// Total CPU utilization `Σ C_i / T_i` over periodic tasks, with
    /// the remaining work budget standing in for WCET.
    pub fn rm_utilization(&self) -> f64 {
        self.tasks
            .iter()
            .filter(|t| t.period > 0 && t.id != self.idle)
            .map(|t| t.remaining_work as f64 / t.period as f64)
            .sum()
    }

    /// Run the Liu–Layland test. `None` when there are no periodic
    /// tasks to analyze.
    pub fn rm_schedulability(&self) -> Option<RmAnalysis> {
        let n = self
            .tasks
            .iter()
            .filter(|t| t.period > 0 && t.id != self.idle)
            .count();
        if n == 0 {
            return None;
        }

        let utilization = self.rm_utilization();
        let bound = n as f64 * (2f64.powf(1.0 / n as f64) - 1.0);
        let verdict = if utilization <= bound {
            RmVerdict::Schedulable
        } else if utilization <= 1.0 {
            RmVerdict::PossiblySchedulable
        } else {
            RmVerdict::NotSchedulable
        };

        Some(RmAnalysis {
            periodic_tasks: n,
            utilization,
            bound,
            verdict,
        })
    }

    /// Print the per-task table and the schedulability verdict.
    pub fn rm_print_report(&self) {
        println!();
        println!("{}", "=".repeat(64));
        println!("         RATE MONOTONIC SCHEDULING ANALYSIS");
        println!("{}", "=".repeat(64));
        println!();

        println!(
            "  {:<15} {:>8} {:>8} {:>8} {:>10}",
            "Task", "Period", "WCET", "Priority", "Util"
        );
        println!(
            "  {:<15} {:>8} {:>8} {:>8} {:>10}",
            "----", "------", "----", "--------", "----"
        );

        for t in self.tasks.iter() {
            if t.period == 0 || t.id == self.idle {
                continue;
            }
            let util = t.wcet_budget as f64 / t.period as f64;
            println!(
                "  {:<15} {:>8} {:>8} {:>8} {:>9.3}",
                t.name, t.period, t.wcet_budget, t.priority, util
            );
        }
        println!();

        match self.rm_schedulability() {
            None => println!("  No periodic tasks to analyze."),
            Some(a) => {
                println!("  Number of periodic tasks : {}", a.periodic_tasks);
                println!("  Total utilization (U)    : {:.3}", a.utilization);
                println!("  RMS bound n(2^(1/n)-1)   : {:.3}", a.bound);
                match a.verdict {
                    RmVerdict::Schedulable => {
                        println!("  Verdict: SCHEDULABLE (U <= bound, guaranteed)");
                    }
                    RmVerdict::PossiblySchedulable => {
                        println!("  Verdict: POSSIBLY schedulable (bound < U <= 1.0)");
                        println!("           Run simulation to verify.");
                    }
                    RmVerdict::NotSchedulable => {
                        println!("  Verdict: NOT SCHEDULABLE (U > 1.0)");
                    }
                }
            }
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedPolicy;

    fn noop() {}

    fn rm_sched() -> Scheduler {
        Scheduler::new(SchedPolicy::RateMonotonic, false)
    }

    #[test]
    fn shorter_period_gets_higher_priority() {
        let mut s = rm_sched();
        let t2 = s.create_task("T2", noop, 0, 15, 0, 4).unwrap();
        let t1 = s.create_task("T1", noop, 0, 10, 0, 3).unwrap();
        let t3 = s.create_task("T3", noop, 0, 20, 0, 5).unwrap();

        s.rm_recalculate();
        assert_eq!(s.task(t1).priority, 0);
        assert_eq!(s.task(t2).priority, 1);
        assert_eq!(s.task(t3).priority, 2);
        assert_eq!(s.ready_peek(), Some(t1));
    }

    #[test]
    fn recalculation_is_idempotent() {
        let mut s = rm_sched();
        let a = s.create_task("A", noop, 0, 10, 0, 3).unwrap();
        let b = s.create_task("B", noop, 0, 15, 0, 4).unwrap();

        s.rm_recalculate();
        let first = (s.task(a).priority, s.task(b).priority);
        s.rm_recalculate();
        assert_eq!((s.task(a).priority, s.task(b).priority), first);
        assert_eq!(s.ready_peek(), Some(a));
    }

    #[test]
    fn equal_periods_rank_in_registration_order() {
        let mut s = rm_sched();
        let a = s.create_task("A", noop, 0, 10, 0, 2).unwrap();
        let b = s.create_task("B", noop, 0, 10, 0, 2).unwrap();
        s.rm_recalculate();
        assert!(s.task(a).priority < s.task(b).priority);
    }

    #[test]
    fn terminated_tasks_are_not_ranked() {
        let mut s = rm_sched();
        let dead = s.create_task("Dead", noop, 0, 5, 0, 2).unwrap();
        let live = s.create_task("Live", noop, 0, 10, 0, 3).unwrap();
        s.task_terminate(dead);

        s.rm_recalculate();
        assert_eq!(s.task(live).priority, 0);
    }

    #[test]
    fn utilization_and_bound_for_classic_set() {
        let mut s = rm_sched();
        s.create_task("T1", noop, 0, 10, 0, 3).unwrap();
        s.create_task("T2", noop, 0, 15, 0, 4).unwrap();
        s.create_task("T3", noop, 0, 20, 0, 5).unwrap();

        let a = s.rm_schedulability().unwrap();
        assert_eq!(a.periodic_tasks, 3);
        assert!((a.utilization - 0.8167).abs() < 1e-3);
        assert!((a.bound - 0.7798).abs() < 1e-3);
        assert_eq!(a.verdict, RmVerdict::PossiblySchedulable);
    }

    #[test]
    fn light_load_is_guaranteed_schedulable() {
        let mut s = rm_sched();
        s.create_task("T", noop, 0, 10, 0, 1).unwrap();
        let a = s.rm_schedulability().unwrap();
        assert_eq!(a.verdict, RmVerdict::Schedulable);
    }

    #[test]
    fn overload_is_not_schedulable() {
        let mut s = rm_sched();
        s.create_task("Hog", noop, 0, 10, 0, 15).unwrap();
        let a = s.rm_schedulability().unwrap();
        assert_eq!(a.verdict, RmVerdict::NotSchedulable);
    }

    #[test]
    fn no_periodic_tasks_means_no_analysis() {
        let mut s = rm_sched();
        s.create_task("Ap", noop, 4, 0, 0, 5).unwrap();
        assert!(s.rm_schedulability().is_none());
    }

    #[test]
    fn aperiodic_tasks_keep_their_priority_across_recalculation() {
        let mut s = rm_sched();
        let ap = s.create_task("Ap", noop, 4, 0, 0, 5).unwrap();
        s.create_task("P", noop, 0, 10, 0, 3).unwrap();
        s.rm_recalculate();
        assert_eq!(s.task(ap).priority, 4);
    }
}
