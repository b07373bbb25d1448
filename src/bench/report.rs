//! Result types and output formats.

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use super::state::CounterKind;
use crate::error::{BenchError, BenchResult};
use crate::measure::FunctionKind;
use crate::pair::ScalarKind;
use crate::simd::Capabilities;

/// An aggregated counter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReportedCounter {
    pub value: f64,
    pub kind: CounterKind,
}

/// Result of running one case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseReport {
    pub name: String,
    #[serde(skip)]
    pub display_name: String,
    pub scalar: ScalarKind,
    pub kind: FunctionKind,
    pub dimensions: usize,
    pub threads: usize,
    /// Summed over all threads.
    pub iterations: u64,
    pub time_per_iteration_ns: f64,
    pub wall_time_ns: f64,
    pub counters: BTreeMap<String, ReportedCounter>,
}

impl CaseReport {
    pub fn counter(&self, name: &str) -> Option<f64> {
        self.counters.get(name).map(|c| c.value)
    }
}

/// Machine and run settings printed before the first case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunContext {
    pub capabilities: Capabilities,
    pub num_cpus: usize,
    pub threads: usize,
    pub dimensions: usize,
    pub min_time_secs: f64,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::detect(),
            num_cpus: num_cpus::get(),
            threads: 1,
            dimensions: 0,
            min_time_secs: 0.0,
        }
    }
}

/// Sink for benchmark results.
pub trait Reporter {
    fn report_context(&mut self, context: &RunContext) -> BenchResult<()>;

    fn report_case(&mut self, report: &CaseReport) -> BenchResult<()>;

    /// Called once after the last case.
    fn finalize(&mut self) -> BenchResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

const NAME_WIDTH: usize = 56;
const RULE_WIDTH: usize = 110;

/// Human-readable table, one line per case.
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn report_context(&mut self, context: &RunContext) -> BenchResult<()> {
        writeln!(
            self.out,
            "Running on {} CPUs, {} threads per case, {} dimensions",
            context.num_cpus, context.threads, context.dimensions
        )?;
        writeln!(self.out, "{}", "-".repeat(RULE_WIDTH))?;
        writeln!(
            self.out,
            "{:<NAME_WIDTH$} {:>14} {:>12} UserCounters...",
            "Benchmark", "Time", "Iterations"
        )?;
        writeln!(self.out, "{}", "-".repeat(RULE_WIDTH))?;
        Ok(())
    }

    fn report_case(&mut self, report: &CaseReport) -> BenchResult<()> {
        let counters: Vec<String> = report
            .counters
            .iter()
            .map(|(name, c)| match c.kind {
                CounterKind::Rate => format!("{name}={}/s", humanize(c.value)),
                CounterKind::Plain => format!("{name}={}", humanize(c.value)),
            })
            .collect();
        writeln!(
            self.out,
            "{:<NAME_WIDTH$} {:>11.0} ns {:>12} {}",
            report.display_name,
            report.time_per_iteration_ns,
            report.iterations,
            counters.join(" ")
        )?;
        Ok(())
    }

    fn finalize(&mut self) -> BenchResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Format a value with a decimal SI suffix: `12.3457G`, `0.000123`, `0`.
pub fn humanize(value: f64) -> String {
    const UNITS: [(f64, &str); 4] = [(1e12, "T"), (1e9, "G"), (1e6, "M"), (1e3, "k")];
    if value == 0.0 || !value.is_finite() {
        return format!("{value}");
    }
    for (scale, suffix) in UNITS {
        if value.abs() >= scale {
            return format!("{}{suffix}", significant(value / scale));
        }
    }
    significant(value)
}

fn significant(value: f64) -> String {
    let text = if value.abs() >= 1.0 {
        format!("{value:.4}")
    } else {
        format!("{value:.6}")
    };
    let text = text.trim_end_matches('0').trim_end_matches('.');
    text.to_string()
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct JsonDocument<'a> {
    context: &'a RunContext,
    benchmarks: &'a [CaseReport],
}

/// Collects everything and writes one JSON document on [`Reporter::finalize`].
pub struct JsonReporter<W: Write> {
    out: W,
    context: Option<RunContext>,
    cases: Vec<CaseReport>,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            context: None,
            cases: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn report_context(&mut self, context: &RunContext) -> BenchResult<()> {
        self.context = Some(context.clone());
        Ok(())
    }

    fn report_case(&mut self, report: &CaseReport) -> BenchResult<()> {
        self.cases.push(report.clone());
        Ok(())
    }

    fn finalize(&mut self) -> BenchResult<()> {
        let context = self.context.clone().unwrap_or_default();
        let document = JsonDocument {
            context: &context,
            benchmarks: &self.cases,
        };
        serde_json::to_writer_pretty(&mut self.out, &document).map_err(|e| BenchError::Serialize {
            message: e.to_string(),
        })?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CaseReport {
        let mut counters = BTreeMap::new();
        counters.insert(
            "bytes".to_string(),
            ReportedCounter {
                value: 12.3e9,
                kind: CounterKind::Rate,
            },
        );
        counters.insert(
            "abs_delta".to_string(),
            ReportedCounter {
                value: 0.0,
                kind: CounterKind::Plain,
            },
        );
        CaseReport {
            name: "serial_f32_dot_1536d".into(),
            display_name: "serial_f32_dot_1536d/min_time:10.000/threads:1".into(),
            scalar: ScalarKind::F32,
            kind: FunctionKind::Distance,
            dimensions: 1536,
            threads: 1,
            iterations: 1000,
            time_per_iteration_ns: 512.4,
            wall_time_ns: 512_400.0,
            counters,
        }
    }

    #[test]
    fn humanize_scales() {
        assert_eq!(humanize(0.0), "0");
        assert_eq!(humanize(12.3e9), "12.3G");
        assert_eq!(humanize(1500.0), "1.5k");
        assert_eq!(humanize(42.0), "42");
        assert_eq!(humanize(0.00025), "0.00025");
    }

    #[test]
    fn console_line_contains_counters() {
        let mut reporter = ConsoleReporter::new(Vec::new());
        reporter.report_context(&RunContext::default()).unwrap();
        reporter.report_case(&sample()).unwrap();
        reporter.finalize().unwrap();
        let text = String::from_utf8(reporter.into_inner()).unwrap();
        let line = text.lines().last().unwrap();
        assert!(line.starts_with("serial_f32_dot_1536d/min_time:10.000/threads:1"));
        assert!(line.contains("bytes=12.3G/s"));
        assert!(line.contains("abs_delta=0"));
        assert!(line.contains("1000"));
    }

    #[test]
    fn json_document_has_context_and_cases() {
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.report_context(&RunContext::default()).unwrap();
        reporter.report_case(&sample()).unwrap();
        reporter.finalize().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&reporter.into_inner()).unwrap();
        assert!(value["context"]["capabilities"]["haswell"].is_boolean());
        let case = &value["benchmarks"][0];
        assert_eq!(case["name"], "serial_f32_dot_1536d");
        assert_eq!(case["scalar"], "f32");
        assert_eq!(case["counters"]["bytes"]["kind"], "rate");
        assert!(case.get("display_name").is_none());
    }
}
