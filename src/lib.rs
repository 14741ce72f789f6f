//! # tickos — Simulated RTOS Scheduler with Priority Inheritance
//!
//! A single-threaded, tick-driven simulation of a priority-based
//! preemptive real-time scheduler. The centerpiece is the **priority
//! inheritance protocol** (PIP): when a high-priority task blocks on a
//! mutex held by a lower-priority task, the holder temporarily
//! inherits the blocker's priority — transitively through chains of
//! nested mutexes — so medium-priority tasks cannot cause unbounded
//! priority inversion.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Scenario Drivers (scenarios.rs)            │
//! │        create tasks · drive ticks · assert outcomes     │
//! ├──────────────┬─────────────────────┬────────────────────┤
//! │  Scheduler   │   Sync Primitives   │  Time Engine       │
//! │  scheduler.rs│   mutex.rs (PIP)    │  time.rs           │
//! │  ─ schedule()│   semaphore.rs      │  ─ tick_handler()  │
//! │  ─ dispatch  │   ─ lock/unlock     │  ─ releases        │
//! │  ─ preempt   │   ─ inherit/restore │  ─ deadlines       │
//! ├──────────────┴─────────────────────┴────────────────────┤
//! │       Task Model (task.rs) · Ready Queue (queue.rs)     │
//! │       TCB · priority pair · held mutexes · statistics   │
//! ├─────────────────────────────────────────────────────────┤
//! │   RM Analysis (rms.rs)   │   Event Timeline (timeline.rs)│
//! │   ranks · Liu–Layland    │   append-only log · renderer │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Simulation Model
//!
//! Everything runs on one logical CPU inside one `Scheduler` value.
//! "Preemption" is a dispatcher-driven state transition, not a thread
//! operation; no API call ever blocks the caller. Time advances only
//! when the driver calls [`Scheduler::tick_handler`] (or
//! [`Scheduler::advance_time`]), and each tick charges the running
//! task, releases due periodic tasks, and checks deadlines — in that
//! order. Every observable transition lands exactly once in the event
//! timeline, which the ASCII renderer turns into a Gantt chart.
//!
//! ## Priority Convention
//!
//! A numerically **lower** priority value is logically **higher**
//! (priority 0 beats priority 10), matching POSIX fixed-priority
//! scheduling. The idle task sits at the maximum representable value.

pub mod config;
pub mod queue;
pub mod task;
pub mod scheduler;
pub mod mutex;
pub mod semaphore;
pub mod time;
pub mod rms;
pub mod timeline;
pub mod scenarios;
