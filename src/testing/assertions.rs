//! Assertions for comparing profiling results.

use crate::stats::AggregateResult;

const AVG_TOLERANCE: f64 = 1e-9;

/// Assert two aggregates agree on header, histogram and every column figure.
///
/// Averages are compared with a small absolute tolerance since merge order
/// changes nothing but summation order.
///
/// # Panics
///
/// Panics with the first differing field.
pub fn assert_aggregates_equal(actual: &AggregateResult, expected: &AggregateResult) {
    assert_eq!(actual.header, expected.header, "header mismatch");
    assert_eq!(actual.histogram, expected.histogram, "histogram mismatch");
    assert_eq!(
        actual.columns.len(),
        expected.columns.len(),
        "column count mismatch"
    );
    for (a, e) in actual.columns.iter().zip(&expected.columns) {
        assert_eq!(a.name, e.name, "column {} name", e.index);
        assert_eq!(a.fill_count, e.fill_count, "column {} fill_count", e.index);
        assert_eq!(a.min_len, e.min_len, "column {} min_len", e.index);
        assert_eq!(a.max_len, e.max_len, "column {} max_len", e.index);
        match (a.avg_len, e.avg_len) {
            (Some(x), Some(y)) => assert!(
                (x - y).abs() <= AVG_TOLERANCE,
                "column {} avg_len: expected {y}, got {x}",
                e.index
            ),
            (x, y) => assert_eq!(x, y, "column {} avg_len", e.index),
        }
    }
}
