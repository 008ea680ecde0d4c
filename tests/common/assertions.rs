//! Custom assertion helpers for devtools integration tests.

use std::time::Duration;

use devtools::report::MemoryReporter;
use devtools::Phase;

/// Assert the reporter saw exactly this sequence of phases.
pub fn assert_phases(reporter: &MemoryReporter, expected: &[Phase]) {
    let actual: Vec<Phase> = reporter.events().iter().map(|e| e.phase).collect();
    assert_eq!(
        actual, expected,
        "Expected event phases {:?}, but got {:?}",
        expected, actual
    );
}

/// Assert that `actual` lies within `tolerance` of `expected`.
pub fn assert_duration_near(actual: Duration, expected: Duration, tolerance: Duration) {
    let low = expected.saturating_sub(tolerance);
    let high = expected + tolerance;
    assert!(
        actual >= low && actual <= high,
        "Expected a duration of {:?} (+/- {:?}), but got {:?}",
        expected,
        tolerance,
        actual
    );
}
