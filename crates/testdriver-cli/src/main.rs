mod output;

use anyhow::Context;
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use testdriver_core::{DriverConfig, DriverError, TestDriver};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "testdriver",
    about = "Run an XML messaging test script, one worker thread per thread tag",
    version
)]
struct Cli {
    /// Test script (XML)
    script: PathBuf,

    /// Only run these top-level actions (split on the script's actionDelim, default ",")
    #[arg(short = 'n', long = "names")]
    names: Option<String>,

    /// Log level: error|warn|info|debug|trace, or 0-9
    #[arg(short = 'l', long = "log-level", default_value = "info", value_parser = parse_level)]
    log_level: Level,

    /// Write trace output to this file instead of stderr
    #[arg(short = 'f', long = "log-file")]
    log_file: Option<PathBuf>,

    /// Output the report as JSON
    #[arg(short = 'j', long)]
    json: bool,

    /// Driver configuration (YAML)
    #[arg(long, env = "TESTDRIVER_CONFIG")]
    config: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// DriverExit: typed non-zero exit codes
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum DriverExit {
    TestFailed { test: String },
}

impl DriverExit {
    fn exit_code(&self) -> i32 {
        match self {
            DriverExit::TestFailed { .. } => 1,
        }
    }
}

impl std::fmt::Display for DriverExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverExit::TestFailed { test } => write!(f, "test '{test}' failed"),
        }
    }
}

impl std::error::Error for DriverExit {}

/// Exit status for an error that escaped `run`: 1 for a failed test, 3 when
/// the test could not be loaded or reported.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(exit) = err.downcast_ref::<DriverExit>() {
        return exit.exit_code();
    }
    3
}

/// Accept a level name or a number 0-9 (0-1 error ... 8-9 trace).
fn parse_level(raw: &str) -> Result<Level, String> {
    if let Ok(n) = raw.parse::<u8>() {
        return match n {
            0..=1 => Ok(Level::ERROR),
            2..=3 => Ok(Level::WARN),
            4..=5 => Ok(Level::INFO),
            6..=7 => Ok(Level::DEBUG),
            8..=9 => Ok(Level::TRACE),
            _ => Err(format!("log level {n} is out of range 0-9")),
        };
    }
    raw.parse::<Level>()
        .map_err(|_| format!("unknown log level '{raw}'"))
}

fn init_logging(level: Level, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file '{}'", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    init_logging(cli.log_level, cli.log_file.as_deref())?;

    let config = match &cli.config {
        Some(path) => DriverConfig::load(path)
            .with_context(|| format!("failed to load driver config '{}'", path.display()))?,
        None => DriverConfig::default(),
    };

    let driver = TestDriver::new(config);
    let plan = driver
        .load(&cli.script, cli.names.as_deref())
        .map_err(|e| config_error(e, &cli.script))?;
    let report = driver.run(plan);

    if cli.json {
        output::print_json(&report)?;
    } else {
        output::print_report(&report);
    }

    if !report.passed {
        return Err(DriverExit::TestFailed { test: report.name }.into());
    }
    Ok(())
}

fn config_error(err: DriverError, script: &Path) -> anyhow::Error {
    anyhow::Error::new(err).context(format!("cannot run '{}'", script.display()))
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        // the summary line already reported the failure
        if e.downcast_ref::<DriverExit>().is_none() {
            eprintln!("error: {e:#}");
        }
        std::process::exit(exit_code(&e));
    }
}
