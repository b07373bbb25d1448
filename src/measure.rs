//! Dual-invocation measurement of a contender kernel against its baseline.
//!
//! The baseline runs once, untimed, to produce a reference figure. Only the
//! contender runs inside the timed loop. When the loop ends, throughput
//! counters and the contender's deviation from the reference are recorded on
//! the [`State`].

use std::hint::black_box;

use serde::{Deserialize, Serialize};

use crate::bench::{Counter, State};
use crate::pair::{Scalar, VectorPair};
use crate::simd::{Distance, MetricFn};

/// Deltas below this are reported as exactly zero.
pub const TOLERANCE: f64 = 1e-4;

/// Family of a similarity function, deciding how its outputs are folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// One scalar distance or similarity.
    Distance,
    /// Complex dot product: real and imaginary parts.
    ComplexDot,
    /// Great-circle distance. Reserved, nothing registers it.
    Haversine,
}

impl FunctionKind {
    /// Number of output slots the kernel writes.
    pub fn output_slots(self) -> usize {
        match self {
            FunctionKind::ComplexDot => 2,
            FunctionKind::Distance | FunctionKind::Haversine => 1,
        }
    }

    /// Collapse a kernel's output buffer into one comparable scalar by
    /// summing its populated slots.
    pub fn fold(self, out: &[Distance; 2]) -> Distance {
        out[..self.output_slots()].iter().sum()
    }
}

impl std::fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionKind::Distance => write!(f, "distance"),
            FunctionKind::ComplexDot => write!(f, "complex_dot"),
            FunctionKind::Haversine => write!(f, "haversine"),
        }
    }
}

/// Deviation of a contender's result from the reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Accuracy {
    pub absolute_delta: f64,
    pub relative_error: f64,
}

impl Accuracy {
    pub fn compare(contender: Distance, reference: Distance) -> Self {
        let mut absolute_delta = (contender - reference).abs();
        if absolute_delta < TOLERANCE {
            absolute_delta = 0.0;
        }
        let relative_error = if absolute_delta != 0.0 && reference != 0.0 {
            absolute_delta / reference.abs()
        } else {
            0.0
        };
        Self {
            absolute_delta,
            relative_error,
        }
    }
}

/// Time `contender` on `pair` and compare its last result with `baseline`.
///
/// Sets the counters `bytes` and `pairs` (rates), `abs_delta` and
/// `relative_error`.
pub fn measure<T: Scalar>(
    state: &mut State,
    pair: &VectorPair<T>,
    kind: FunctionKind,
    contender: MetricFn<T>,
    baseline: MetricFn<T>,
) -> Accuracy {
    let (a, b, n) = (pair.a(), pair.b(), pair.dimensions());

    let mut out = [0.0; 2];
    baseline(a, b, n, &mut out);
    let reference = kind.fold(&out);

    let mut result = 0.0;
    while state.keep_running() {
        let mut out = [0.0; 2];
        contender(black_box(a), black_box(b), n, &mut out);
        result = black_box(kind.fold(&out));
    }

    let iterations = state.iterations() as f64;
    state.set_counter("bytes", Counter::rate(iterations * pair.size_bytes() as f64 * 2.0));
    state.set_counter("pairs", Counter::rate(iterations));

    let accuracy = Accuracy::compare(result, reference);
    state.set_counter("abs_delta", Counter::plain(accuracy.absolute_delta));
    state.set_counter("relative_error", Counter::plain(accuracy.relative_error));
    accuracy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::{CounterKind, RunLimit};
    use crate::simd::{accurate, serial};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn zero_kernel(_: &[f32], _: &[f32], _: usize, out: &mut [Distance; 2]) {
        out[0] = 0.0;
    }

    static DRIFT_CALLS: AtomicU64 = AtomicU64::new(0);

    /// Dot product that grows by 0.01 on every call.
    fn drifting_dot(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
        serial::dot_f32(a, b, n, out);
        let calls = DRIFT_CALLS.fetch_add(1, Ordering::Relaxed) + 1;
        out[0] += calls as f64 * 0.01;
    }

    #[test]
    fn small_deltas_are_clamped() {
        let acc = Accuracy::compare(1.00005, 1.0);
        assert_eq!(acc.absolute_delta, 0.0);
        assert_eq!(acc.relative_error, 0.0);
    }

    #[test]
    fn zero_reference_has_no_relative_error() {
        let acc = Accuracy::compare(0.5, 0.0);
        assert_eq!(acc.absolute_delta, 0.5);
        assert_eq!(acc.relative_error, 0.0);
    }

    #[test]
    fn relative_error_uses_reference_magnitude() {
        let acc = Accuracy::compare(-1.5, -1.0);
        assert_eq!(acc.absolute_delta, 0.5);
        assert_eq!(acc.relative_error, 0.5);
    }

    #[test]
    fn fold_sums_populated_slots() {
        assert_eq!(FunctionKind::ComplexDot.fold(&[-5.0, 10.0]), 5.0);
        assert_eq!(FunctionKind::Distance.fold(&[0.25, 0.0]), 0.25);
        assert_eq!(FunctionKind::Distance.fold(&[0.25, 9.0]), 0.25);
        assert_eq!(FunctionKind::ComplexDot.output_slots(), 2);
        assert_eq!(FunctionKind::Distance.output_slots(), 1);
    }

    #[test]
    fn counters_follow_iteration_count() {
        let mut state = State::new(4, 42, RunLimit::Iterations(10));
        let mut pair = VectorPair::<f32>::new(4);
        pair.randomize(&mut StdRng::seed_from_u64(1));

        let acc = measure(&mut state, &pair, FunctionKind::Distance, serial::dot_f32, serial::dot_f32);
        assert_eq!(acc.absolute_delta, 0.0);

        let counters = state.counters();
        assert_eq!(counters["pairs"], Counter::rate(10.0));
        assert_eq!(counters["bytes"].value, 10.0 * 16.0 * 2.0);
        assert_eq!(counters["abs_delta"].kind, CounterKind::Plain);
        assert_eq!(counters["relative_error"].value, 0.0);
    }

    #[test]
    fn constant_pair_gives_exact_agreement() {
        let mut state = State::new(1536, 42, RunLimit::Iterations(3));
        let mut pair = VectorPair::<f32>::new(1536);
        pair.set(0.5);
        let acc = measure(&mut state, &pair, FunctionKind::Distance, serial::cos_f32, accurate::cos_f32);
        assert_eq!(acc.absolute_delta, 0.0);
    }

    #[test]
    fn broken_contender_is_fully_wrong() {
        let mut state = State::new(1536, 42, RunLimit::Iterations(2));
        let mut pair = VectorPair::<f32>::new(1536);
        pair.randomize(&mut StdRng::seed_from_u64(42));
        let acc = measure(&mut state, &pair, FunctionKind::Distance, zero_kernel, accurate::dot_f32);
        assert!((acc.relative_error - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hidden_state_shows_up_as_error() {
        let mut pair = VectorPair::<f32>::new(4);
        pair.set(0.5);

        let mut state = State::new(4, 42, RunLimit::Iterations(20));
        let acc = measure(&mut state, &pair, FunctionKind::Distance, drifting_dot, accurate::dot_f32);
        assert!(DRIFT_CALLS.load(Ordering::Relaxed) >= 20);
        assert!(acc.absolute_delta > 0.19);
        assert!(acc.relative_error > 0.0);
        assert!(state.counters()["relative_error"].value > 0.0);

        let mut state = State::new(4, 42, RunLimit::Iterations(20));
        let acc = measure(&mut state, &pair, FunctionKind::Distance, serial::dot_f32, accurate::dot_f32);
        assert_eq!(acc.relative_error, 0.0);
        assert_eq!(state.counters()["relative_error"].value, 0.0);
    }

    #[test]
    fn complex_kernels_compare_folded_outputs() {
        let mut state = State::new(8, 42, RunLimit::Iterations(1));
        let mut pair = VectorPair::<f32>::new(8);
        pair.randomize(&mut StdRng::seed_from_u64(5));
        let acc = measure(&mut state, &pair, FunctionKind::ComplexDot, serial::dot_f32c, accurate::dot_f32c);
        assert_eq!(acc.absolute_delta, 0.0);
    }
}
