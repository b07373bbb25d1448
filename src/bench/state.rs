//! Per-thread iteration handle passed to every benchmark routine.

use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// The clock is read once every this many iterations.
const CLOCK_CHECK_INTERVAL: u64 = 64;

/// How a counter is aggregated and displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    /// Reported as-is, averaged across threads.
    Plain,
    /// Divided by the thread's elapsed time, summed across threads.
    Rate,
}

/// A user counter attached to a benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub value: f64,
    pub kind: CounterKind,
}

impl Counter {
    pub fn plain(value: f64) -> Self {
        Self {
            value,
            kind: CounterKind::Plain,
        }
    }

    pub fn rate(value: f64) -> Self {
        Self {
            value,
            kind: CounterKind::Rate,
        }
    }
}

/// When a timed loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLimit {
    /// Keep going until at least this much time has passed.
    MinTime(Duration),
    /// Run exactly this many iterations.
    Iterations(u64),
}

/// What one thread hands back to the runner.
#[derive(Debug, Clone)]
pub struct ThreadOutcome {
    pub iterations: u64,
    pub elapsed: Duration,
    pub counters: BTreeMap<String, Counter>,
}

/// Iteration state owned by one benchmark thread.
///
/// The timer starts on the first call to [`State::keep_running`], so any setup
/// a routine performs before its loop is not measured. Threads of one case
/// share a start gate: no thread starts its clock until every thread has
/// finished its setup.
#[derive(Debug)]
pub struct State {
    thread_index: usize,
    threads: usize,
    dimensions: usize,
    limit: RunLimit,
    iterations: u64,
    started: Option<Instant>,
    elapsed: Option<Duration>,
    counters: BTreeMap<String, Counter>,
    rng: StdRng,
    start_gate: Option<Arc<Barrier>>,
}

impl State {
    /// Single-thread state; the RNG is seeded with `seed` directly.
    pub fn new(dimensions: usize, seed: u64, limit: RunLimit) -> Self {
        Self {
            thread_index: 0,
            threads: 1,
            dimensions,
            limit,
            iterations: 0,
            started: None,
            elapsed: None,
            counters: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
            start_gate: None,
        }
    }

    /// State for thread `thread_index` of a group; the RNG is seeded with
    /// `seed + thread_index`.
    pub(crate) fn for_thread(
        dimensions: usize,
        seed: u64,
        limit: RunLimit,
        thread_index: usize,
        threads: usize,
    ) -> Self {
        let mut state = Self::new(dimensions, seed.wrapping_add(thread_index as u64), limit);
        state.thread_index = thread_index;
        state.threads = threads;
        state
    }

    /// Make the first `keep_running` call wait on `gate` before starting the clock.
    pub(crate) fn with_start_gate(mut self, gate: Arc<Barrier>) -> Self {
        self.start_gate = Some(gate);
        self
    }

    /// Pass the start gate if this thread has not yet done so.
    pub(crate) fn release_start_gate(&mut self) {
        if let Some(gate) = self.start_gate.take() {
            gate.wait();
        }
    }

    /// Returns `true` while the routine should run another iteration.
    pub fn keep_running(&mut self) -> bool {
        if self.elapsed.is_some() {
            return false;
        }
        let started = match self.started {
            Some(started) => started,
            None => {
                self.release_start_gate();
                *self.started.insert(Instant::now())
            }
        };
        let done = match self.limit {
            RunLimit::Iterations(max) => self.iterations >= max,
            RunLimit::MinTime(min_time) => {
                self.iterations > 0
                    && self.iterations % CLOCK_CHECK_INTERVAL == 0
                    && started.elapsed() >= min_time
            }
        };
        if done {
            self.elapsed = Some(started.elapsed());
            return false;
        }
        self.iterations += 1;
        true
    }

    /// Iterations started so far.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn set_counter(&mut self, name: impl Into<String>, counter: Counter) {
        self.counters.insert(name.into(), counter);
    }

    pub fn counters(&self) -> &BTreeMap<String, Counter> {
        &self.counters
    }

    /// This thread's random source.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn thread_index(&self) -> usize {
        self.thread_index
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Vector length the case was registered with.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Stop the clock and hand the results over. Elapsed time is at least 1 ns.
    pub(crate) fn finish(self) -> ThreadOutcome {
        let elapsed = self
            .elapsed
            .or_else(|| self.started.map(|s| s.elapsed()))
            .unwrap_or_default()
            .max(Duration::from_nanos(1));
        ThreadOutcome {
            iterations: self.iterations,
            elapsed,
            counters: self.counters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn fixed_iteration_count_is_exact() {
        let mut state = State::new(4, 42, RunLimit::Iterations(5));
        let mut runs = 0;
        while state.keep_running() {
            runs += 1;
        }
        assert_eq!(runs, 5);
        assert_eq!(state.iterations(), 5);
        assert!(!state.keep_running());
    }

    #[test]
    fn zero_min_time_still_runs_one_clock_interval() {
        let mut state = State::new(4, 42, RunLimit::MinTime(Duration::ZERO));
        while state.keep_running() {}
        assert_eq!(state.iterations(), CLOCK_CHECK_INTERVAL);
    }

    #[test]
    fn min_time_is_honoured() {
        let min_time = Duration::from_millis(20);
        let mut state = State::new(4, 42, RunLimit::MinTime(min_time));
        while state.keep_running() {
            std::hint::black_box(state.iterations());
        }
        let outcome = state.finish();
        assert!(outcome.elapsed >= min_time);
        assert!(outcome.iterations >= CLOCK_CHECK_INTERVAL);
    }

    #[test]
    fn threads_get_distinct_seeds() {
        let limit = RunLimit::Iterations(1);
        let mut t0 = State::for_thread(4, 42, limit, 0, 2);
        let mut t1 = State::for_thread(4, 42, limit, 1, 2);
        let mut single = State::new(4, 42, limit);
        let (x0, x1, xs): (u64, u64, u64) = (t0.rng().r#gen(), t1.rng().r#gen(), single.rng().r#gen());
        assert_eq!(x0, xs);
        assert_ne!(x0, x1);
        assert_eq!(t1.thread_index(), 1);
        assert_eq!(t1.threads(), 2);
    }

    #[test]
    fn unstarted_state_reports_minimal_elapsed() {
        let mut state = State::new(4, 42, RunLimit::Iterations(1));
        state.set_counter("pairs", Counter::rate(0.0));
        let outcome = state.finish();
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.elapsed, Duration::from_nanos(1));
        assert_eq!(outcome.counters["pairs"].kind, CounterKind::Rate);
    }
}
