//! simbench CLI: similarity kernel benchmarks.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use clap::error::ErrorKind;
use miette::{IntoDiagnostic, Result};

use simbench::bench::{ConsoleReporter, JsonReporter, Registry, RunContext, RunOptions};
use simbench::catalog;
use simbench::config::{HarnessConfig, OutputFormat};
use simbench::error::{BenchError, SimbenchResult};
use simbench::simd::Capabilities;

#[derive(Parser)]
#[command(name = "simbench", version, about = "Benchmark vector similarity kernels")]
struct Cli {
    /// Only run benchmarks whose name matches this regex.
    #[arg(long)]
    filter: Option<String>,

    /// Minimum run time per benchmark, in seconds.
    #[arg(long)]
    min_time: Option<f64>,

    /// Threads per benchmark.
    #[arg(long)]
    threads: Option<usize>,

    /// Elements per vector.
    #[arg(long)]
    dimensions: Option<usize>,

    /// Run exactly this many iterations per thread instead of a minimum time.
    #[arg(long)]
    iterations: Option<u64>,

    /// Base seed for the per-thread random generators.
    #[arg(long)]
    seed: Option<u64>,

    /// Report format.
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Write the report to this file instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// List matching benchmark names and exit.
    #[arg(long)]
    list: bool,

    /// TOML config file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the effective configuration to this TOML file.
    #[arg(long)]
    write_config: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(filter) = &self.filter {
            config.filter = Some(filter.clone());
        }
        if let Some(min_time) = self.min_time {
            config.min_time_secs = min_time;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(dimensions) = self.dimensions {
            config.dimensions = dimensions;
        }
        if self.iterations.is_some() {
            config.iterations = self.iterations;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let capabilities = Capabilities::detect();
    capabilities.report(&mut io::stdout().lock()).into_diagnostic()?;

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            e.print().ok();
            std::process::exit(1);
        }
    };

    run(&cli, capabilities)?;
    Ok(())
}

fn run(cli: &Cli, capabilities: Capabilities) -> SimbenchResult<()> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    cli.apply(&mut config);
    let settings = config.case_settings()?;

    if let Some(path) = &cli.write_config {
        config.save(path)?;
        tracing::info!(path = %path.display(), "saved config");
    }

    let mut registry = Registry::new();
    catalog::register_available(&mut registry, &settings);

    if cli.list {
        let mut stdout = io::stdout().lock();
        for case in registry.matching(config.filter.as_deref())? {
            writeln!(stdout, "{}", case.name()).map_err(BenchError::from)?;
        }
        return Ok(());
    }

    let options = RunOptions {
        filter: config.filter.clone(),
        context: RunContext {
            capabilities,
            num_cpus: num_cpus::get(),
            threads: settings.threads,
            dimensions: settings.dimensions,
            min_time_secs: config.min_time_secs,
        },
    };

    let out: Box<dyn Write> = match &cli.out {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(BenchError::from)?)),
        None => Box::new(io::stdout().lock()),
    };
    match config.format {
        OutputFormat::Console => registry.run(&options, &mut ConsoleReporter::new(out))?,
        OutputFormat::Json => registry.run(&options, &mut JsonReporter::new(out))?,
    };
    Ok(())
}
