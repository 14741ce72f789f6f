//! # Demo Scenarios
//!
//! Eight self-contained scenarios that exercise every feature of the
//! scheduler, from basic priority dispatch to transitive priority
//! inheritance and deadline-miss detection. Each scenario builds its
//! own scheduler, drives the tick loop, renders the timeline, and
//! returns whether its expected observations held.
//!
//! | # | Scenario | Demonstrates |
//! |---|----------|--------------|
//! | 1 | Basic priority | Strict priority order, three aperiodic tasks |
//! | 2 | Preemption | A late high-priority arrival displaces the CPU hog |
//! | 3 | Inversion with PI | Inheritance lets the holder outrun the middle task |
//! | 4 | Inversion without PI | The failure mode inheritance exists to fix |
//! | 5 | Transitive PI | A boost rides a chain of nested mutex holders |
//! | 6 | Rate monotonic | Period-derived priorities and the Liu–Layland test |
//! | 7 | Semaphores | Producer/consumer counting without inheritance |
//! | 8 | Deadline miss | A tight deadline starved by a higher-priority hog |

use crate::rms::RmVerdict;
use crate::scheduler::{SchedPolicy, Scheduler};
use crate::task::{TaskId, TaskState, Tick};

fn workload() {}

fn banner(title: &str) {
    println!();
    println!("{}", "=".repeat(65));
    println!("  TEST: {title}");
    println!("{}", "=".repeat(65));
}

fn verdict(pass: bool, name: &str) -> bool {
    println!();
    println!("  Result: {} {name}", if pass { "PASS" } else { "FAIL" });
    println!();
    pass
}

/// Terminate the current task if it has exhausted its work budget.
/// Returns the terminated task for completion-order bookkeeping.
fn reap_completed(sched: &mut Scheduler) -> Option<TaskId> {
    let curr = sched.current_task()?;
    if curr != sched.idle_task()
        && sched.task(curr).remaining_work == 0
        && sched.task(curr).state == TaskState::Running
    {
        sched.task_terminate(curr);
        return Some(curr);
    }
    None
}

// ---------------------------------------------------------------------------
// 1: Basic priority scheduling
// ---------------------------------------------------------------------------

/// Three aperiodic tasks with distinct priorities run to completion in
/// strict priority order: A (P1) first, then B (P2), then C (P3).
pub fn basic_priority() -> bool {
    banner("Basic Priority Scheduling");

    let mut sched = Scheduler::new(SchedPolicy::Priority, false);
    let a = sched
        .create_task("TaskA", workload, 1, 0, 0, 5)
        .expect("failed to create TaskA");
    let b = sched
        .create_task("TaskB", workload, 2, 0, 0, 10)
        .expect("failed to create TaskB");
    let c = sched
        .create_task("TaskC", workload, 3, 0, 0, 8)
        .expect("failed to create TaskC");

    sched.schedule();

    let mut finish: Vec<(TaskId, Tick)> = Vec::new();
    for _ in 0..30 {
        sched.tick_handler();
        if let Some(done) = reap_completed(&mut sched) {
            finish.push((done, sched.ticks()));
        }
        sched.schedule();
    }

    sched.render_timeline();

    let finish_tick = |id| finish.iter().find(|&&(t, _)| t == id).map(|&(_, at)| at);
    let all_done = [a, b, c]
        .iter()
        .all(|&t| sched.task(t).state == TaskState::Terminated);
    let ordered = matches!(
        (finish_tick(a), finish_tick(b), finish_tick(c)),
        (Some(fa), Some(fb), Some(fc)) if fa < fb && fb < fc
    );

    println!("  Completion order correct: {}", if ordered { "yes" } else { "no" });
    println!("  Context switches:         {}", sched.context_switches());

    verdict(all_done && ordered && sched.context_switches() >= 2, "Basic Priority Scheduling")
}

// ---------------------------------------------------------------------------
// 2: Preemption
// ---------------------------------------------------------------------------

/// A low-priority task owns the CPU until a high-priority task arrives
/// at t=5 and takes it immediately. The latecomer still finishes
/// first.
pub fn preemption() -> bool {
    banner("Preemption");

    let mut sched = Scheduler::new(SchedPolicy::Priority, false);
    let low = sched
        .create_task("TaskLow", workload, 10, 0, 0, 20)
        .expect("failed to create TaskLow");

    sched.schedule();
    sched.advance_time(5);

    let high = sched
        .create_task("TaskHigh", workload, 1, 0, 0, 10)
        .expect("failed to create TaskHigh");
    sched.schedule();

    let mut finish: Vec<(TaskId, Tick)> = Vec::new();
    for _ in 0..30 {
        sched.tick_handler();
        if let Some(done) = reap_completed(&mut sched) {
            finish.push((done, sched.ticks()));
        }
        sched.schedule();
    }

    sched.render_timeline();

    let finish_tick = |id| finish.iter().find(|&&(t, _)| t == id).map(|&(_, at)| at);
    let high_first = matches!(
        (finish_tick(high), finish_tick(low)),
        (Some(fh), Some(fl)) if fh < fl
    );

    println!("  TaskLow preemptions: {}", sched.task(low).preemptions);
    println!("  Context switches:    {}", sched.context_switches());

    let pass = sched.task(high).state == TaskState::Terminated
        && sched.task(low).state == TaskState::Terminated
        && sched.task(low).preemptions >= 1
        && high_first;
    verdict(pass, "Preemption")
}

// ---------------------------------------------------------------------------
// 3: Priority inversion WITH priority inheritance
// ---------------------------------------------------------------------------

/// The inversion setup: TaskLow (P10) holds MutexA when TaskHigh (P1)
/// requests it, while TaskMed (P5) would otherwise monopolize the CPU.
/// With inheritance enabled, TaskLow borrows priority 1 for exactly as
/// long as TaskHigh is blocked, preempts TaskMed, releases, and drops
/// back to P10 — so TaskHigh waits only for the critical section, not
/// for TaskMed.
pub fn inversion_with_pi() -> bool {
    banner("Priority Inversion WITH Priority Inheritance");

    let mut sched = Scheduler::new(SchedPolicy::Priority, true);
    let mtx_a = sched.mutex_create("MutexA");

    // t=0: TaskLow starts and takes the mutex.
    let t_low = sched
        .create_task("TaskLow", workload, 10, 0, 0, 20)
        .expect("failed to create TaskLow");
    sched.schedule();
    sched.mutex_lock(mtx_a, t_low);

    sched.advance_time(2);

    // t=2: TaskMed preempts TaskLow.
    let t_med = sched
        .create_task("TaskMed", workload, 5, 0, 0, 10)
        .expect("failed to create TaskMed");
    sched.schedule();
    sched.advance_time(3);

    // t=5: TaskHigh arrives and blocks on the mutex.
    let t_high = sched
        .create_task("TaskHigh", workload, 1, 0, 0, 8)
        .expect("failed to create TaskHigh");
    sched.schedule();
    sched.mutex_lock(mtx_a, t_high);

    // The inheritance window: the holder runs at the blocker's
    // priority and owns the CPU despite TaskMed.
    let boosted_window =
        sched.task(t_low).priority == 1 && sched.current_task() == Some(t_low);

    let mut released = false;
    let mut restored_after_unlock = false;
    let mut low_work_done: u64 = 0;

    for _ in 0..15 {
        sched.tick_handler();

        if sched.current_task() == Some(t_low) {
            low_work_done += 1;
        }
        if sched.current_task() == Some(t_low)
            && !released
            && low_work_done >= 13
            && sched.mutex(mtx_a).owner == Some(t_low)
        {
            sched.mutex_unlock(mtx_a, t_low);
            released = true;
            restored_after_unlock =
                sched.task(t_low).priority == 10 && !sched.task(t_low).priority_inherited;
        }

        sched.schedule();
    }

    for _ in 0..30 {
        sched.tick_handler();
        reap_completed(&mut sched);
        sched.schedule();
    }

    sched.render_timeline();

    println!("  TaskLow  priority boosts: {}", sched.task(t_low).priority_boosts);
    println!("  Boosted window observed:  {}", if boosted_window { "yes" } else { "no" });
    println!("  Priority restored:        {}", if restored_after_unlock { "yes" } else { "no" });
    println!("  TaskMed  preemptions:     {}", sched.task(t_med).preemptions);

    let pass = sched.task(t_low).priority_boosts >= 1
        && boosted_window
        && restored_after_unlock
        && sched.task(t_high).state == TaskState::Terminated;
    verdict(pass, "Priority Inversion WITH PI")
}

// ---------------------------------------------------------------------------
// 4: Priority inversion WITHOUT priority inheritance
// ---------------------------------------------------------------------------

/// The same setup with inheritance disabled shows the problem it
/// solves: TaskLow stays at P10, TaskMed runs instead, and TaskHigh's
/// completion is delayed until TaskMed has finished — unbounded
/// priority inversion.
pub fn inversion_without_pi() -> bool {
    banner("Priority Inversion WITHOUT Priority Inheritance");

    let mut sched = Scheduler::new(SchedPolicy::Priority, false);
    let mtx_a = sched.mutex_create("MutexA");

    let t_low = sched
        .create_task("TaskLow", workload, 10, 0, 0, 20)
        .expect("failed to create TaskLow");
    sched.schedule();
    sched.mutex_lock(mtx_a, t_low);

    sched.advance_time(2);

    let t_med = sched
        .create_task("TaskMed", workload, 5, 0, 0, 10)
        .expect("failed to create TaskMed");
    sched.schedule();
    sched.advance_time(3);

    let t_high = sched
        .create_task("TaskHigh", workload, 1, 0, 0, 8)
        .expect("failed to create TaskHigh");
    sched.schedule();
    sched.mutex_lock(mtx_a, t_high);

    // TaskMed keeps running here: TaskHigh waits on TaskLow, but
    // TaskLow never outranks TaskMed.
    let mut released = false;
    let mut low_work_done: u64 = 0;
    let mut finish: Vec<(TaskId, Tick)> = Vec::new();

    for _ in 0..50 {
        sched.tick_handler();

        if sched.current_task() == Some(t_low) {
            low_work_done += 1;
        }
        if sched.current_task() == Some(t_low)
            && !released
            && low_work_done >= 13
            && sched.mutex(mtx_a).owner == Some(t_low)
        {
            sched.mutex_unlock(mtx_a, t_low);
            released = true;
        }

        if let Some(done) = reap_completed(&mut sched) {
            finish.push((done, sched.ticks()));
        }
        sched.schedule();
    }

    sched.render_timeline();

    let finish_tick = |id| finish.iter().find(|&&(t, _)| t == id).map(|&(_, at)| at);
    let med_before_high = matches!(
        (finish_tick(t_med), finish_tick(t_high)),
        (Some(fm), Some(fh)) if fm < fh
    );

    println!(
        "  TaskLow  priority boosts: {} (should be 0)",
        sched.task(t_low).priority_boosts
    );
    println!("  TaskMed  preemptions:     {}", sched.task(t_med).preemptions);
    println!(
        "  TaskMed finished before TaskHigh: {}",
        if med_before_high { "yes" } else { "no" }
    );

    verdict(
        sched.task(t_low).priority_boosts == 0 && med_before_high,
        "Priority Inversion WITHOUT PI",
    )
}

// ---------------------------------------------------------------------------
// 5: Transitive priority inheritance
// ---------------------------------------------------------------------------

/// A blocked chain of holders: TaskHigh waits on MutexB held by
/// TaskLow, which itself waits on MutexA held by TaskVeryLow. The
/// boost must ride the whole chain, lifting TaskVeryLow to priority 1
/// while the contention lasts.
pub fn transitive_pi() -> bool {
    banner("Transitive Priority Inheritance");

    let mut sched = Scheduler::new(SchedPolicy::Priority, true);
    let mtx_a = sched.mutex_create("MutexA");
    let mtx_b = sched.mutex_create("MutexB");

    // t=0: TaskVeryLow takes MutexA.
    let t_very_low = sched
        .create_task("TaskVeryLow", workload, 20, 0, 0, 30)
        .expect("failed to create TaskVeryLow");
    sched.schedule();
    sched.mutex_lock(mtx_a, t_very_low);
    sched.advance_time(1);

    // t=1: TaskLow takes MutexB, then blocks on MutexA.
    let t_low = sched
        .create_task("TaskLow", workload, 15, 0, 0, 20)
        .expect("failed to create TaskLow");
    sched.schedule();
    sched.mutex_lock(mtx_b, t_low);
    sched.advance_time(1);
    sched.mutex_lock(mtx_a, t_low);

    // t=3: a middle-priority workload joins.
    sched.tick_handler();
    let _t_med = sched
        .create_task("TaskMed", workload, 10, 0, 0, 15)
        .expect("failed to create TaskMed");
    sched.schedule();
    sched.advance_time(1);

    // t=4: TaskHigh blocks on MutexB; the boost propagates
    // High -> Low -> VeryLow.
    let t_high = sched
        .create_task("TaskHigh", workload, 1, 0, 0, 10)
        .expect("failed to create TaskHigh");
    sched.schedule();
    sched.mutex_lock(mtx_b, t_high);

    let chain_boosted =
        sched.task(t_very_low).priority == 1 && sched.task(t_low).priority == 1;

    let mut a_released_by_very_low = false;
    let mut b_released_by_low = false;
    let mut a_released_by_low = false;

    for _ in 0..50 {
        sched.tick_handler();

        if sched.current_task() == Some(t_very_low)
            && !a_released_by_very_low
            && sched.task(t_very_low).remaining_work <= 15
            && sched.mutex(mtx_a).owner == Some(t_very_low)
        {
            sched.mutex_unlock(mtx_a, t_very_low);
            a_released_by_very_low = true;
        }

        if sched.current_task() == Some(t_low)
            && !b_released_by_low
            && sched.task(t_low).remaining_work <= 10
            && sched.mutex(mtx_b).owner == Some(t_low)
        {
            sched.mutex_unlock(mtx_b, t_low);
            b_released_by_low = true;
        }

        if sched.current_task() == Some(t_low)
            && !a_released_by_low
            && sched.task(t_low).remaining_work <= 8
            && sched.mutex(mtx_a).owner == Some(t_low)
        {
            sched.mutex_unlock(mtx_a, t_low);
            a_released_by_low = true;
        }

        reap_completed(&mut sched);
        sched.schedule();
    }

    sched.render_timeline();

    println!("  TaskVeryLow boosts: {}", sched.task(t_very_low).priority_boosts);
    println!("  TaskLow     boosts: {}", sched.task(t_low).priority_boosts);
    println!("  Chain held at P1:   {}", if chain_boosted { "yes" } else { "no" });
    println!("  Transitive chain: High(P1) -> Low -> VeryLow");

    let pass = sched.task(t_very_low).priority_boosts >= 1
        && sched.task(t_low).priority_boosts >= 1
        && chain_boosted;
    verdict(pass, "Transitive Priority Inheritance")
}

// ---------------------------------------------------------------------------
// 6: Rate monotonic scheduling
// ---------------------------------------------------------------------------

/// Three periodic tasks under the RM policy get their priorities from
/// their periods (shortest first) and the Liu–Layland test lands in
/// the "possibly schedulable" band: U ≈ 0.817 against a bound of
/// ≈ 0.780 for n = 3.
pub fn rate_monotonic() -> bool {
    banner("Rate Monotonic Scheduling");

    let mut sched = Scheduler::new(SchedPolicy::RateMonotonic, false);
    let t1 = sched
        .create_task("T1_p10", workload, 0, 10, 10, 3)
        .expect("failed to create T1");
    let t2 = sched
        .create_task("T2_p15", workload, 0, 15, 15, 4)
        .expect("failed to create T2");
    let t3 = sched
        .create_task("T3_p20", workload, 0, 20, 20, 5)
        .expect("failed to create T3");

    sched.rm_recalculate();

    let analysis = sched.rm_schedulability();
    sched.rm_print_report();

    println!("  Assigned priorities:");
    println!("    T1 (period=10): P{}", sched.task(t1).priority);
    println!("    T2 (period=15): P{}", sched.task(t2).priority);
    println!("    T3 (period=20): P{}", sched.task(t3).priority);

    sched.schedule();

    // One hyperperiod (lcm(10, 15, 20) = 60). Completed periodic
    // tasks park in Suspended until their next release.
    for _ in 0..60 {
        sched.tick_handler();

        if let Some(curr) = sched.current_task() {
            if curr != sched.idle_task()
                && sched.task(curr).remaining_work == 0
                && sched.task(curr).state == TaskState::Running
            {
                if sched.task(curr).period > 0 {
                    sched.task_suspend(curr);
                } else {
                    sched.task_terminate(curr);
                }
            }
        }

        sched.schedule();
    }

    sched.render_timeline();

    for t in [t1, t2, t3] {
        println!(
            "  {}: invocations={}, misses={}",
            sched.task(t).name,
            sched.task(t).invocations,
            sched.task(t).deadline_misses
        );
    }

    let priorities_ok = sched.task(t1).priority < sched.task(t2).priority
        && sched.task(t2).priority < sched.task(t3).priority;
    let analysis_ok = matches!(
        analysis,
        Some(a) if a.verdict == RmVerdict::PossiblySchedulable
            && (a.utilization - 0.8167).abs() < 1e-3
            && (a.bound - 0.7798).abs() < 1e-3
    );

    println!("  Priority assignment correct: {}", if priorities_ok { "yes" } else { "no" });

    verdict(priorities_ok && analysis_ok, "Rate Monotonic Scheduling")
}

// ---------------------------------------------------------------------------
// 7: Semaphore producer/consumer
// ---------------------------------------------------------------------------

/// Counting semaphores guard a five-slot buffer: `sem_empty` counts
/// free slots, `sem_full` counts filled ones. Their counts must sum to
/// the buffer size at every observation point.
pub fn semaphore_producer_consumer() -> bool {
    banner("Semaphore Producer-Consumer");

    let mut sched = Scheduler::new(SchedPolicy::Priority, false);
    let sem_full = sched.semaphore_create("sem_full", 0, 5);
    let sem_empty = sched.semaphore_create("sem_empty", 5, 5);

    let producer = sched
        .create_task("Producer", workload, 2, 0, 0, 50)
        .expect("failed to create Producer");
    let consumer = sched
        .create_task("Consumer", workload, 3, 0, 0, 50)
        .expect("failed to create Consumer");

    sched.schedule();

    let mut items_produced = 0u32;
    let mut items_consumed = 0u32;
    let mut invariant_held = true;

    for _ in 0..100 {
        sched.tick_handler();

        if sched.current_task() == Some(producer)
            && sched.ticks() % 3 == 0
            && sched.semaphore(sem_empty).count > 0
        {
            sched.semaphore_wait(sem_empty, producer);
            items_produced += 1;
            sched.semaphore_signal(sem_full, producer);
        }

        if sched.current_task() == Some(consumer)
            && sched.ticks() % 4 == 0
            && sched.semaphore(sem_full).count > 0
        {
            sched.semaphore_wait(sem_full, consumer);
            items_consumed += 1;
            sched.semaphore_signal(sem_empty, consumer);
        }

        invariant_held &=
            sched.semaphore(sem_full).count + sched.semaphore(sem_empty).count == 5;

        reap_completed(&mut sched);
        sched.schedule();
    }

    sched.render_timeline();

    println!("  Items produced: {items_produced}");
    println!("  Items consumed: {items_consumed}");
    println!("  sem_full count:  {}", sched.semaphore(sem_full).count);
    println!("  sem_empty count: {}", sched.semaphore(sem_empty).count);

    let pass = items_produced > 0
        && items_consumed > 0
        && invariant_held
        && sched.semaphore(sem_full).count + sched.semaphore(sem_empty).count == 5;
    verdict(pass, "Semaphore Producer-Consumer")
}

// ---------------------------------------------------------------------------
// 8: Deadline miss detection
// ---------------------------------------------------------------------------

/// TaskTight needs 15 ticks of work against a 10-tick deadline, and
/// cannot even start until the higher-priority TaskHog has run its 12
/// ticks — a guaranteed miss, recorded exactly once per window.
pub fn deadline_miss() -> bool {
    banner("Deadline Miss Detection");

    let mut sched = Scheduler::new(SchedPolicy::Priority, false);
    let tight = sched
        .create_task("TaskTight", workload, 2, 0, 10, 15)
        .expect("failed to create TaskTight");
    let relax = sched
        .create_task("TaskRelax", workload, 3, 0, 50, 8)
        .expect("failed to create TaskRelax");
    let hog = sched
        .create_task("TaskHog", workload, 1, 0, 100, 12)
        .expect("failed to create TaskHog");

    sched.schedule();

    for _ in 0..50 {
        sched.tick_handler();
        reap_completed(&mut sched);
        sched.schedule();
    }

    sched.render_timeline();

    println!("  TaskHog   deadline misses: {}", sched.task(hog).deadline_misses);
    println!("  TaskTight deadline misses: {}", sched.task(tight).deadline_misses);
    println!("  TaskRelax deadline misses: {}", sched.task(relax).deadline_misses);

    verdict(sched.task(tight).deadline_misses >= 1, "Deadline Miss Detection")
}

/// Run every scenario in order. True only if all of them pass.
pub fn run_all() -> bool {
    let mut all = true;
    all &= basic_priority();
    all &= preemption();
    all &= inversion_with_pi();
    all &= inversion_without_pi();
    all &= transitive_pi();
    all &= rate_monotonic();
    all &= semaphore_producer_consumer();
    all &= deadline_miss();
    all
}
