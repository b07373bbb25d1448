//! Executes one case on a group of scoped threads and aggregates the results.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use super::report::{CaseReport, ReportedCounter};
use super::state::{CounterKind, State, ThreadOutcome};
use super::BenchmarkCase;

/// Run `case` on `case.threads()` threads whose timed loops start together.
///
/// Each thread passes a shared start gate on its first `keep_running` call, or
/// when its routine returns or panics without ever calling it. A panic in any
/// thread is resumed on the caller.
pub fn run_case(case: &BenchmarkCase) -> CaseReport {
    let threads = case.threads();
    let _span = tracing::info_span!("case", name = %case.name(), threads).entered();
    let gate = Arc::new(Barrier::new(threads));
    let wall = Instant::now();

    let outcomes: Vec<ThreadOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|index| {
                let gate = Arc::clone(&gate);
                scope.spawn(move || {
                    let mut state =
                        State::for_thread(case.dimensions(), case.seed(), case.limit(), index, threads)
                            .with_start_gate(gate);
                    let result = panic::catch_unwind(AssertUnwindSafe(|| (case.routine)(&mut state)));
                    state.release_start_gate();
                    match result {
                        Ok(()) => state.finish(),
                        Err(payload) => panic::resume_unwind(payload),
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(outcome) => outcome,
                Err(payload) => panic::resume_unwind(payload),
            })
            .collect()
    });

    let report = aggregate(case, &outcomes, wall.elapsed());
    tracing::info!(iterations = report.iterations, ns_per_iter = report.time_per_iteration_ns, "case finished");
    report
}

/// Combine per-thread outcomes.
///
/// Iterations are summed. Rate counters become the sum of each thread's
/// `value / elapsed`. Plain counters are averaged over the threads that set
/// them. Time per iteration is the mean of each thread's `elapsed / iterations`.
pub fn aggregate(case: &BenchmarkCase, outcomes: &[ThreadOutcome], wall_time: Duration) -> CaseReport {
    let iterations = outcomes.iter().map(|o| o.iterations).sum();

    let per_iteration: Vec<f64> = outcomes
        .iter()
        .filter(|o| o.iterations > 0)
        .map(|o| o.elapsed.as_nanos() as f64 / o.iterations as f64)
        .collect();
    let time_per_iteration_ns = if per_iteration.is_empty() {
        0.0
    } else {
        per_iteration.iter().sum::<f64>() / per_iteration.len() as f64
    };

    let mut sums: BTreeMap<&str, (CounterKind, f64, usize)> = BTreeMap::new();
    for outcome in outcomes {
        let seconds = outcome.elapsed.as_secs_f64();
        for (name, counter) in &outcome.counters {
            let value = match counter.kind {
                CounterKind::Rate => counter.value / seconds,
                CounterKind::Plain => counter.value,
            };
            let entry = sums.entry(name.as_str()).or_insert((counter.kind, 0.0, 0));
            entry.1 += value;
            entry.2 += 1;
        }
    }
    let counters = sums
        .into_iter()
        .map(|(name, (kind, total, count))| {
            let value = match kind {
                CounterKind::Rate => total,
                CounterKind::Plain => total / count as f64,
            };
            (name.to_string(), ReportedCounter { value, kind })
        })
        .collect();

    CaseReport {
        name: case.name().to_string(),
        display_name: case.display_name(),
        scalar: case.scalar(),
        kind: case.kind(),
        dimensions: case.dimensions(),
        threads: case.threads(),
        iterations,
        time_per_iteration_ns,
        wall_time_ns: wall_time.as_nanos() as f64,
        counters,
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Counter, Registry};
    use super::*;
    use crate::measure::FunctionKind;
    use crate::pair::ScalarKind;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn outcome(iterations: u64, elapsed_ms: u64, counters: &[(&str, Counter)]) -> ThreadOutcome {
        ThreadOutcome {
            iterations,
            elapsed: Duration::from_millis(elapsed_ms),
            counters: counters.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
        }
    }

    fn case(registry: &mut Registry, threads: usize) -> BenchmarkCase {
        registry
            .register("case", ScalarKind::F32, FunctionKind::Distance, |s: &mut State| {
                while s.keep_running() {}
            })
            .threads(threads)
            .iterations(Some(3));
        registry.cases()[registry.len() - 1].clone()
    }

    #[test]
    fn aggregation_rules() {
        let mut registry = Registry::new();
        let case = case(&mut registry, 2);
        let outcomes = [
            outcome(100, 1000, &[("pairs", Counter::rate(100.0)), ("abs_delta", Counter::plain(1.0))]),
            outcome(50, 500, &[("pairs", Counter::rate(50.0)), ("abs_delta", Counter::plain(3.0))]),
        ];
        let report = aggregate(&case, &outcomes, Duration::from_secs(1));
        assert_eq!(report.iterations, 150);
        assert!((report.counters["pairs"].value - 200.0).abs() < 1e-9);
        assert_eq!(report.counters["abs_delta"].value, 2.0);
        assert!((report.time_per_iteration_ns - 1.0e7).abs() < 1e-3);
    }

    #[test]
    fn every_thread_runs_the_routine() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut registry = Registry::new();
        registry
            .register("count", ScalarKind::F32, FunctionKind::Distance, move |s: &mut State| {
                seen.fetch_add(1, Ordering::SeqCst);
                while s.keep_running() {}
                s.set_counter("thread", Counter::plain(s.thread_index() as f64));
            })
            .threads(4)
            .iterations(Some(10));

        let report = run_case(&registry.cases()[0]);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(report.iterations, 40);
        assert_eq!(report.threads, 4);
        assert_eq!(report.counters["thread"].value, 1.5);
    }

    #[test]
    fn timed_loops_wait_for_the_slowest_setup() {
        let setup_done = Arc::new(AtomicBool::new(false));
        let early_start = Arc::new(AtomicBool::new(false));
        let (done, early) = (Arc::clone(&setup_done), Arc::clone(&early_start));
        let mut registry = Registry::new();
        registry
            .register("skew", ScalarKind::F32, FunctionKind::Distance, move |s: &mut State| {
                if s.thread_index() == 0 {
                    thread::sleep(Duration::from_millis(20));
                    done.store(true, Ordering::SeqCst);
                }
                while s.keep_running() {
                    if !done.load(Ordering::SeqCst) {
                        early.store(true, Ordering::SeqCst);
                    }
                }
            })
            .threads(3)
            .iterations(Some(5));

        let report = run_case(&registry.cases()[0]);
        assert_eq!(report.iterations, 15);
        assert!(!early_start.load(Ordering::SeqCst));
    }

    #[test]
    #[should_panic(expected = "setup failed")]
    fn panic_before_the_loop_does_not_block_other_threads() {
        let mut registry = Registry::new();
        registry
            .register("half", ScalarKind::F32, FunctionKind::Distance, |s: &mut State| {
                if s.thread_index() == 1 {
                    panic!("setup failed");
                }
                while s.keep_running() {}
            })
            .threads(2)
            .iterations(Some(3));
        run_case(&registry.cases()[0]);
    }

    #[test]
    #[should_panic(expected = "kernel exploded")]
    fn panics_propagate() {
        let mut registry = Registry::new();
        registry.register("boom", ScalarKind::F32, FunctionKind::Distance, |_: &mut State| {
            panic!("kernel exploded");
        });
        run_case(&registry.cases()[0]);
    }
}
