//! End-to-end scenario coverage: every demo scenario must reach its
//! expected observations. These drive the full stack — task creation,
//! tick loop, dispatch, mutexes, semaphores, RM analysis, and the
//! timeline — exactly as the CLI does.

use tickos::scenarios;

#[test]
fn basic_priority_order_holds() {
    assert!(scenarios::basic_priority());
}

#[test]
fn late_high_priority_arrival_preempts() {
    assert!(scenarios::preemption());
}

#[test]
fn priority_inheritance_resolves_inversion() {
    assert!(scenarios::inversion_with_pi());
}

#[test]
fn inversion_occurs_without_inheritance() {
    assert!(scenarios::inversion_without_pi());
}

#[test]
fn inheritance_propagates_through_chains() {
    assert!(scenarios::transitive_pi());
}

#[test]
fn rate_monotonic_ranks_and_analysis() {
    assert!(scenarios::rate_monotonic());
}

#[test]
fn semaphore_counts_stay_conserved() {
    assert!(scenarios::semaphore_producer_consumer());
}

#[test]
fn tight_deadline_is_missed() {
    assert!(scenarios::deadline_miss());
}
