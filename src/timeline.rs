//! # Event Timeline
//!
//! Append-only log of everything observable in the simulation: task
//! state changes, mutex traffic, priority inheritance boosts and
//! restorations, periodic releases, deadline misses, and preemptions.
//! The scheduler records each transition exactly once; the ASCII
//! renderer consumes the log as opaque input.
//!
//! Entries carry a [`VisState`] for the Gantt rows; `VisState::None`
//! marks annotation-only records (they appear in the events log but do
//! not change a row).

use crate::config::{PRIORITY_IDLE, RENDER_SPAN_MAX, TIMELINE_INITIAL_CAP};
use crate::task::{Priority, TaskId, TaskState, Tcb, Tick};

/// Render state of a task at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisState {
    Running,
    Ready,
    Blocked,
    Suspended,
    /// Pure annotation, no state change.
    None,
}

impl From<TaskState> for VisState {
    fn from(s: TaskState) -> Self {
        match s {
            TaskState::Running => VisState::Running,
            TaskState::Ready => VisState::Ready,
            TaskState::Blocked => VisState::Blocked,
            TaskState::Suspended | TaskState::Terminated => VisState::Suspended,
        }
    }
}

/// Priority label for annotations: `P<number>`, or `Pidle` for the
/// idle sentinel.
pub fn prio_label(p: Priority) -> String {
    if p == PRIORITY_IDLE {
        "Pidle".to_string()
    } else {
        format!("P{p}")
    }
}

/// One recorded event.
#[derive(Debug)]
pub struct TimelineEntry {
    pub tick: Tick,
    pub task: TaskId,
    pub state: VisState,
    pub annotation: String,
}

/// The event log. Grows geometrically; tracks the tick range so the
/// renderer knows what to draw.
#[derive(Debug)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    start_tick: Tick,
    end_tick: Tick,
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(TIMELINE_INITIAL_CAP),
            start_tick: u64::MAX,
            end_tick: 0,
        }
    }

    /// Append a record and widen the tracked tick range.
    pub fn record(&mut self, tick: Tick, task: TaskId, state: VisState, annotation: String) {
        self.entries.push(TimelineEntry {
            tick,
            task,
            state,
            annotation,
        });
        if tick < self.start_tick {
            self.start_tick = tick;
        }
        if tick > self.end_tick {
            self.end_tick = tick;
        }
    }

    // -----------------------------------------------------------------
    // Convenience recorders
    // -----------------------------------------------------------------

    pub fn record_state_change(&mut self, tick: Tick, task: TaskId, state: VisState) {
        self.record(tick, task, state, String::new());
    }

    pub fn record_priority_inherit(
        &mut self,
        tick: Tick,
        holder: &Tcb,
        donor: &Tcb,
        mutex_name: &str,
    ) {
        let ann = format!(
            "PRIORITY INHERITANCE: {} ({}) inherits from {} ({}) via {}",
            holder.name,
            prio_label(holder.original_priority),
            donor.name,
            prio_label(donor.priority),
            mutex_name
        );
        self.record(tick, holder.id, VisState::None, ann);
    }

    pub fn record_priority_restore(
        &mut self,
        tick: Tick,
        task: &Tcb,
        old_priority: Priority,
        new_priority: Priority,
    ) {
        let ann = format!(
            "PRIORITY RESTORED: {} ({} -> {})",
            task.name,
            prio_label(old_priority),
            prio_label(new_priority)
        );
        self.record(tick, task.id, VisState::None, ann);
    }

    pub fn record_mutex_op(&mut self, tick: Tick, task: &Tcb, mutex_name: &str, action: &str) {
        let ann = format!("{} {} {}", task.name, action, mutex_name);
        self.record(tick, task.id, VisState::None, ann);
    }

    pub fn record_deadline_miss(&mut self, tick: Tick, task: &Tcb, deadline: Tick, actual: Tick) {
        let ann = format!(
            "DEADLINE MISS: {} deadline={} actual={} late={}",
            task.name,
            deadline,
            actual,
            actual - deadline
        );
        self.record(tick, task.id, VisState::None, ann);
    }

    pub fn record_preemption(&mut self, tick: Tick, preempted: &Tcb, preemptor: &Tcb) {
        let ann = format!(
            "{} preempted by {} ({} > {})",
            preempted.name,
            preemptor.name,
            prio_label(preemptor.priority),
            prio_label(preempted.priority)
        );
        self.record(tick, preempted.id, VisState::None, ann);
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest recorded tick (`u64::MAX` while empty).
    pub fn min_tick(&self) -> Tick {
        self.start_tick
    }

    /// Latest recorded tick (0 while empty).
    pub fn max_tick(&self) -> Tick {
        self.end_tick
    }

    // -----------------------------------------------------------------
    // ASCII rendering
    // -----------------------------------------------------------------

    /// Render the Gantt chart, events log, and analysis footer to
    /// stdout. `tasks` is the scheduler's registry in creation order.
    pub fn render(&self, tasks: &[Tcb], context_switches: u64) {
        if self.entries.is_empty() {
            println!("  (no timeline data)");
            return;
        }

        let t_start = self.start_tick;
        let span = (self.end_tick + 1 - t_start).clamp(1, RENDER_SPAN_MAX) as usize;

        println!();
        println!("{}", "=".repeat(65));
        println!("           RTOS SCHEDULER TIMELINE VISUALIZATION");
        println!("{}", "=".repeat(65));
        println!();

        // Time axis, labeled every 5 ticks.
        print!("Time (ticks): ");
        let mut col = 0;
        while col < span {
            if (t_start + col as u64) % 5 == 0 {
                let label = format!("{:<4}", t_start + col as u64);
                col += label.len();
                print!("{label}");
            } else {
                print!(" ");
                col += 1;
            }
        }
        println!();

        print!("              ");
        for col in 0..span {
            if (t_start + col as u64) % 5 == 0 {
                print!("|");
            } else {
                print!(" ");
            }
        }
        println!();
        println!();

        // One row per task, idle excluded.
        for task in tasks {
            if task.is_idle() {
                continue;
            }
            print!("{:<11}(P{:<3}) ", task.name, task.original_priority);

            let mut row = vec![b'_'; span];
            let mut cur_state = VisState::Suspended;
            let mut cur_pos: Option<usize> = None;

            for entry in &self.entries {
                if entry.task != task.id || entry.state == VisState::None {
                    continue;
                }
                let pos = (entry.tick - t_start) as usize;
                if pos >= span {
                    continue;
                }
                if let Some(from) = cur_pos {
                    for cell in &mut row[from..pos] {
                        *cell = state_char(cur_state);
                    }
                }
                cur_state = entry.state;
                cur_pos = Some(pos);
            }
            if let Some(from) = cur_pos {
                for cell in &mut row[from..span] {
                    *cell = state_char(cur_state);
                }
            }

            println!("{}", String::from_utf8_lossy(&row));
        }

        println!();
        println!("Legend: # = RUNNING  - = READY  . = BLOCKED  _ = SUSPENDED/NOT_RELEASED");

        println!();
        println!("Events Log:");
        for entry in &self.entries {
            if !entry.annotation.is_empty() {
                println!("  [t={:<4}] {}", entry.tick, entry.annotation);
            }
        }

        let pi_count = self
            .entries
            .iter()
            .filter(|e| e.annotation.contains("PRIORITY INHERITANCE"))
            .count();
        let dl_misses = self
            .entries
            .iter()
            .filter(|e| e.annotation.contains("DEADLINE MISS"))
            .count();

        println!();
        println!("Analysis:");
        if pi_count > 0 {
            println!("  * Priority inheritance triggered: {pi_count} time(s)");
        } else {
            println!("  * No priority inheritance events");
        }
        if dl_misses > 0 {
            println!("  * Deadline misses detected: {dl_misses}");
        } else {
            println!("  * No deadline misses");
        }
        println!("  * Context switches: {context_switches}");
        println!();
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

fn state_char(state: VisState) -> u8 {
    match state {
        VisState::Running => b'#',
        VisState::Ready => b'-',
        VisState::Blocked => b'.',
        VisState::Suspended | VisState::None => b'_',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_range_tracks_min_and_max() {
        let mut tl = Timeline::new();
        assert!(tl.is_empty());
        assert_eq!(tl.min_tick(), u64::MAX);

        tl.record(7, TaskId(0), VisState::Running, String::new());
        tl.record(3, TaskId(0), VisState::Ready, String::new());
        tl.record(12, TaskId(0), VisState::Running, String::new());

        assert_eq!(tl.min_tick(), 3);
        assert_eq!(tl.max_tick(), 12);
        assert_eq!(tl.entries().len(), 3);
    }

    #[test]
    fn terminated_renders_as_suspended() {
        assert_eq!(VisState::from(TaskState::Terminated), VisState::Suspended);
        assert_eq!(VisState::from(TaskState::Running), VisState::Running);
    }

    #[test]
    fn idle_priority_has_its_own_label() {
        assert_eq!(prio_label(3), "P3");
        assert_eq!(prio_label(PRIORITY_IDLE), "Pidle");
    }

    #[test]
    fn rendering_an_empty_timeline_is_harmless() {
        let tl = Timeline::new();
        tl.render(&[], 0);
    }
}
