//! # tickos Configuration
//!
//! Compile-time constants governing scheduler capacities and sentinels.
//! All queue and registry limits are fixed at compile time; the event
//! timeline is the only structure that grows.

/// Maximum number of tasks the scheduler can register, including the
/// idle task. Bounds the task registry and therefore every `TaskId`.
pub const MAX_TASKS: usize = 64;

/// Capacity of the ready queue. Every registered task can be Ready at
/// once, so this matches `MAX_TASKS`.
pub const READY_QUEUE_CAP: usize = 64;

/// Capacity of each mutex/semaphore wait queue. Conservative for an
/// RTOS demo; overflow is reported and the insertion dropped.
pub const WAIT_QUEUE_CAP: usize = 16;

/// Maximum number of mutexes a single task can hold simultaneously.
/// Overflow is reported and the held-set entry is lost.
pub const HELD_MUTEX_CAP: usize = 8;

/// Maximum task/mutex/semaphore name length in characters. Longer
/// names are truncated on creation.
pub const NAME_MAX: usize = 32;

/// Initial capacity of the event timeline. The timeline grows
/// geometrically beyond this.
pub const TIMELINE_INITIAL_CAP: usize = 1024;

/// Maximum number of tick columns the ASCII renderer will draw.
/// Longer simulations are clamped to this span.
pub const RENDER_SPAN_MAX: u64 = 500;

/// Idle priority sentinel. Numerically lower = logically higher, so
/// the maximum representable value is the lowest possible priority.
pub const PRIORITY_IDLE: u64 = u64::MAX;

/// The highest logical priority.
pub const PRIORITY_HIGHEST: u64 = 0;
