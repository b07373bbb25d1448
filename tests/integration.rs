//! End-to-end tests for the benchmark harness.
//!
//! These run real cases through the registry, the threaded runner and the
//! reporters, using fixed iteration counts so they finish quickly.

use std::time::Duration;

use simbench::bench::{CaseReport, ConsoleReporter, JsonReporter, Registry, RunOptions};
use simbench::catalog::{self, CaseSettings};
use simbench::config::HarnessConfig;
use simbench::error::BenchError;
use simbench::measure::FunctionKind;
use simbench::pair::InputFill;
use simbench::simd::{Distance, Tier, accurate, serial};

fn settings(dimensions: usize) -> CaseSettings {
    CaseSettings {
        dimensions,
        min_time: Duration::from_millis(1),
        threads: 1,
        iterations: Some(1),
        fill: InputFill::Random,
        seed: 42,
    }
}

fn run_one(registry: &Registry, name: &str) -> CaseReport {
    let options = RunOptions {
        filter: Some(format!("^{name}$")),
        ..Default::default()
    };
    let mut reporter = ConsoleReporter::new(Vec::new());
    let mut reports = registry.run(&options, &mut reporter).unwrap();
    assert_eq!(reports.len(), 1);
    reports.remove(0)
}

fn always_zero(_: &[f32], _: &[f32], _: usize, out: &mut [Distance; 2]) {
    out[0] = 0.0;
}

#[test]
fn trivial_dot_product_is_exact() {
    let mut registry = Registry::new();
    catalog::register::<f32>(
        &mut registry,
        &settings(4),
        "serial_f32_dot",
        FunctionKind::Distance,
        serial::dot_f32,
        serial::dot_f32,
    );
    let report = run_one(&registry, "serial_f32_dot_4d");

    assert_eq!(report.iterations, 1);
    assert_eq!(report.dimensions, 4);
    assert_eq!(report.counter("abs_delta"), Some(0.0));
    assert_eq!(report.counter("relative_error"), Some(0.0));
    assert!(report.counter("pairs").unwrap() > 0.0);
    assert!(report.counter("bytes").unwrap() > report.counter("pairs").unwrap());
}

#[test]
fn broken_contender_reports_full_relative_error() {
    let mut registry = Registry::new();
    catalog::register::<f32>(
        &mut registry,
        &settings(1536),
        "broken_f32_dot",
        FunctionKind::Distance,
        always_zero,
        accurate::dot_f32,
    );
    let report = run_one(&registry, "broken_f32_dot_1536d");

    let relative = report.counter("relative_error").unwrap();
    assert!((relative - 1.0).abs() < 1e-9, "relative_error = {relative}");
    assert!(report.counter("abs_delta").unwrap() > 0.0);
}

#[test]
fn constant_inputs_agree_exactly() {
    let mut registry = Registry::new();
    let constant = CaseSettings {
        fill: InputFill::Constant(0.25),
        ..settings(64)
    };
    catalog::register::<f32>(
        &mut registry,
        &constant,
        "serial_f32_l2sq",
        FunctionKind::Distance,
        serial::l2sq_f32,
        accurate::l2sq_f32,
    );
    let report = run_one(&registry, "serial_f32_l2sq_64d");
    assert_eq!(report.counter("abs_delta"), Some(0.0));
}

#[test]
fn serial_catalog_stays_within_tolerance() {
    let mut registry = Registry::new();
    catalog::register_all(&mut registry, &settings(1536), &[Tier::Serial]);
    let options = RunOptions {
        filter: Some("^serial_(f32|f64|i8|b8)_".into()),
        ..Default::default()
    };
    let reports = registry.run(&options, &mut ConsoleReporter::new(Vec::new())).unwrap();
    assert!(!reports.is_empty());
    for report in &reports {
        let relative = report.counter("relative_error").unwrap();
        assert!(relative < 1e-3, "{}: relative_error = {relative}", report.name);
    }
}

#[test]
fn multi_threaded_run_sums_iterations() {
    let mut registry = Registry::new();
    let threaded = CaseSettings {
        threads: 4,
        iterations: Some(25),
        ..settings(128)
    };
    catalog::register::<f32>(
        &mut registry,
        &threaded,
        "serial_f32_cos",
        FunctionKind::Distance,
        serial::cos_f32,
        accurate::cos_f32,
    );
    let report = run_one(&registry, "serial_f32_cos_128d");
    assert_eq!(report.threads, 4);
    assert_eq!(report.iterations, 100);
    assert_eq!(report.counter("abs_delta"), Some(0.0));
}

#[test]
fn same_seed_same_results() {
    let run = || {
        let mut registry = Registry::new();
        catalog::register::<f32>(
            &mut registry,
            &settings(256),
            "broken_f32_dot",
            FunctionKind::Distance,
            always_zero,
            accurate::dot_f32,
        );
        run_one(&registry, "broken_f32_dot_256d").counter("abs_delta")
    };
    assert_eq!(run(), run());
}

#[test]
fn time_bounded_run_respects_minimum() {
    let mut registry = Registry::new();
    let timed = CaseSettings {
        iterations: None,
        min_time: Duration::from_millis(30),
        ..settings(64)
    };
    catalog::register::<f32>(
        &mut registry,
        &timed,
        "serial_f32_dot",
        FunctionKind::Distance,
        serial::dot_f32,
        accurate::dot_f32,
    );
    let started = std::time::Instant::now();
    let report = run_one(&registry, "serial_f32_dot_64d");
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert!(report.iterations >= 64);
    assert!(report.time_per_iteration_ns > 0.0);
}

#[test]
fn json_report_lists_every_case() {
    let mut registry = Registry::new();
    catalog::register_all(&mut registry, &settings(32), &[]);
    let options = RunOptions {
        filter: Some("^serial_f16".into()),
        ..Default::default()
    };
    let mut reporter = JsonReporter::new(Vec::new());
    let reports = registry.run(&options, &mut reporter).unwrap();

    let value: serde_json::Value = serde_json::from_slice(&reporter.into_inner()).unwrap();
    let benchmarks = value["benchmarks"].as_array().unwrap();
    assert_eq!(benchmarks.len(), reports.len());
    assert_eq!(benchmarks.len(), 6);
    assert!(benchmarks.iter().any(|b| b["name"] == "serial_f16c_dot_32d"));
    assert!(value["context"]["num_cpus"].as_u64().unwrap() >= 1);
}

#[test]
fn unmatched_filter_is_an_error() {
    let mut registry = Registry::new();
    catalog::register_all(&mut registry, &settings(16), &[]);
    let options = RunOptions {
        filter: Some("^sapphire_".into()),
        ..Default::default()
    };
    let err = registry
        .run(&options, &mut ConsoleReporter::new(Vec::new()))
        .unwrap_err();
    assert!(matches!(err, BenchError::NoMatch { .. }));
}

#[test]
fn config_file_drives_case_settings() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("simbench.toml");
    std::fs::write(&path, "dimensions = 8\nthreads = 2\niterations = 3\nseed = 9\n").unwrap();

    let config = HarnessConfig::load(&path).unwrap();
    let mut registry = Registry::new();
    catalog::register_all(&mut registry, &config.case_settings().unwrap(), &[]);

    let case = registry.get("serial_i8_cos_8d").unwrap();
    assert_eq!(case.threads(), 2);
    assert_eq!(case.fixed_iterations(), Some(3));
    assert_eq!(case.seed(), 9);

    let report = run_one(&registry, "serial_i8_cos_8d");
    assert_eq!(report.iterations, 6);
}
