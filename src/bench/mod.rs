//! A small multi-threaded micro-benchmark engine.
//!
//! Cases are registered once into a [`Registry`], each with a routine that
//! receives a per-thread [`State`]. Running the registry executes every case
//! whose name matches the filter and streams a [`CaseReport`] per case to a
//! [`Reporter`].
//!
//! - [`State`]: iteration loop, timer, counters and the thread's RNG
//! - [`Registry`]: registration, filtering and execution
//! - [`ConsoleReporter`] / [`JsonReporter`]: output formats

pub mod report;
pub mod runner;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::error::{BenchError, BenchResult};
use crate::measure::FunctionKind;
use crate::pair::ScalarKind;

pub use report::{CaseReport, ConsoleReporter, JsonReporter, Reporter, RunContext};
pub use state::{Counter, CounterKind, RunLimit, State, ThreadOutcome};

/// Body of a benchmark, invoked once per thread.
pub type Routine = Arc<dyn Fn(&mut State) + Send + Sync>;

/// Default minimum run time per case.
pub const DEFAULT_MIN_TIME: Duration = Duration::from_secs(10);

/// One registered benchmark.
#[derive(Clone)]
pub struct BenchmarkCase {
    name: String,
    scalar: ScalarKind,
    kind: FunctionKind,
    dimensions: usize,
    min_time: Duration,
    threads: usize,
    iterations: Option<u64>,
    seed: u64,
    routine: Routine,
}

impl BenchmarkCase {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scalar(&self) -> ScalarKind {
        self.scalar
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn min_time(&self) -> Duration {
        self.min_time
    }

    pub fn fixed_iterations(&self) -> Option<u64> {
        self.iterations
    }

    /// Fixed iteration count wins over the minimum time.
    pub fn limit(&self) -> RunLimit {
        match self.iterations {
            Some(n) => RunLimit::Iterations(n),
            None => RunLimit::MinTime(self.min_time),
        }
    }

    /// Name as shown by the console reporter.
    pub fn display_name(&self) -> String {
        match self.iterations {
            Some(n) => format!("{}/iterations:{n}/threads:{}", self.name, self.threads),
            None => format!(
                "{}/min_time:{:.3}/threads:{}",
                self.name,
                self.min_time.as_secs_f64(),
                self.threads
            ),
        }
    }
}

/// Builder returned by [`Registry::register`].
pub struct CaseBuilder<'a> {
    case: &'a mut BenchmarkCase,
}

impl CaseBuilder<'_> {
    pub fn min_time(mut self, min_time: Duration) -> Self {
        self.case.min_time = min_time;
        self
    }

    /// Number of concurrent threads, at least one.
    pub fn threads(mut self, threads: usize) -> Self {
        self.case.threads = threads.max(1);
        self
    }

    /// Run exactly this many iterations per thread instead of a minimum time.
    /// A fixed count is at least one.
    pub fn iterations(mut self, iterations: Option<u64>) -> Self {
        self.case.iterations = iterations.map(|n| n.max(1));
        self
    }

    pub fn dimensions(mut self, dimensions: usize) -> Self {
        self.case.dimensions = dimensions;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.case.seed = seed;
        self
    }
}

impl std::fmt::Debug for BenchmarkCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkCase")
            .field("name", &self.name)
            .field("scalar", &self.scalar)
            .field("kind", &self.kind)
            .field("dimensions", &self.dimensions)
            .field("min_time", &self.min_time)
            .field("threads", &self.threads)
            .field("iterations", &self.iterations)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

/// Options for one invocation of [`Registry::run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Regex matched against case names; `None` runs everything.
    pub filter: Option<String>,
    pub context: RunContext,
}

/// Registered benchmark cases, in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    cases: Vec<BenchmarkCase>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a case and return a builder for its settings.
    ///
    /// Defaults: 10 s minimum time, one thread, no fixed iteration count,
    /// zero dimensions, seed 42.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        scalar: ScalarKind,
        kind: FunctionKind,
        routine: impl Fn(&mut State) + Send + Sync + 'static,
    ) -> CaseBuilder<'_> {
        let name = name.into();
        tracing::debug!(case = %name, %scalar, %kind, "registered benchmark");
        let index = self.cases.len();
        self.cases.push(BenchmarkCase {
            name,
            scalar,
            kind,
            dimensions: 0,
            min_time: DEFAULT_MIN_TIME,
            threads: 1,
            iterations: None,
            seed: 42,
            routine: Arc::new(routine),
        });
        CaseBuilder {
            case: &mut self.cases[index],
        }
    }

    pub fn cases(&self) -> &[BenchmarkCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&BenchmarkCase> {
        self.cases.iter().find(|c| c.name == name)
    }

    /// Cases whose name matches `filter`, in registration order.
    ///
    /// A filter that matches nothing is an error.
    pub fn matching(&self, filter: Option<&str>) -> BenchResult<Vec<&BenchmarkCase>> {
        let Some(filter) = filter else {
            return Ok(self.cases.iter().collect());
        };
        let re = Regex::new(filter).map_err(|e| BenchError::InvalidFilter {
            filter: filter.to_string(),
            message: e.to_string(),
        })?;
        let selected: Vec<_> = self.cases.iter().filter(|c| re.is_match(&c.name)).collect();
        if selected.is_empty() {
            return Err(BenchError::NoMatch {
                filter: filter.to_string(),
            });
        }
        Ok(selected)
    }

    /// Run every selected case, streaming results to `reporter`.
    pub fn run(&self, options: &RunOptions, reporter: &mut dyn Reporter) -> BenchResult<Vec<CaseReport>> {
        let selected = self.matching(options.filter.as_deref())?;
        tracing::info!(cases = selected.len(), filter = ?options.filter, "starting benchmark run");

        reporter.report_context(&options.context)?;
        let mut reports = Vec::with_capacity(selected.len());
        for case in selected {
            let report = runner::run_case(case);
            reporter.report_case(&report)?;
            reports.push(report);
        }
        reporter.finalize()?;
        Ok(reports)
    }
}
