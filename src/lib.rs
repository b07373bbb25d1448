// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # simbench
//!
//! A micro-benchmark harness for vector similarity kernels. Every accelerated
//! kernel is timed against its own inputs and compared with a higher-precision
//! baseline, so each result carries both throughput and numerical error.
//!
//! ## Architecture
//!
//! - **Input generation** (`pair`): normalized random vector pairs per scalar type
//! - **Kernels** (`simd`): serial, accurate, and runtime-detected SIMD tiers
//! - **Measurement** (`measure`): baseline once, contender in the timed loop
//! - **Catalog** (`catalog`): which contender is measured against which baseline
//! - **Engine** (`bench`): threaded, time-bounded runs with console/JSON reports
//!
//! ## Library usage
//!
//! ```no_run
//! use simbench::bench::{ConsoleReporter, Registry, RunOptions};
//! use simbench::catalog::{self, CaseSettings};
//!
//! let mut registry = Registry::new();
//! catalog::register_available(&mut registry, &CaseSettings::default());
//! let options = RunOptions {
//!     filter: Some("^serial_f32_".into()),
//!     ..Default::default()
//! };
//! registry.run(&options, &mut ConsoleReporter::new(std::io::stdout())).unwrap();
//! ```

pub mod bench;
pub mod catalog;
pub mod config;
pub mod error;
pub mod measure;
pub mod pair;
pub mod simd;
