// cohort - extract cohort purchase summaries two ways and reconcile them

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cohort_cli::exit_codes::{
    error_exit_code, reconciliation_exit_code, EXIT_ERROR, EXIT_SUCCESS,
};
use cohort_cli::{report, ConfigOverrides, ReportConfig};
use cohort_recon::error::CohortError;

#[derive(Parser)]
#[command(name = "cohort")]
#[command(about = "Extract 18-35 cohort purchase summaries via SQL and in-memory relational algebra, then reconcile")]
#[command(long_version = long_version())]
#[command(version)]
#[command(after_help = "\
Examples:
  cohort --source data/sales.db
  cohort --source data/sales.db --output-dir reports --output-name cohort.csv
  cohort --config report.toml --json

Logging goes to stderr; set RUST_LOG=debug for per-stage counts.")]
struct Cli {
    /// Report config file (TOML); flags below override its values
    #[arg(long, short = 'c', env = "COHORT_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database with Customer, Sales, Orders and Items tables
    #[arg(long, short = 's', env = "COHORT_SOURCE")]
    source: Option<PathBuf>,

    /// Directory the two report files are written to [default: output]
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Base file name for the reports [default: sales_analysis.csv]
    #[arg(long)]
    output_name: Option<String>,

    /// Print the run summary as JSON instead of the console report
    #[arg(long)]
    json: bool,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("COHORT_COMMIT"), ")",
        "\nengine:  cohort-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("COHORT_TARGET"),
    )
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Message already reported on the console; exit with `code` only.
    fn silent(code: u8) -> Self {
        Self { code, message: String::new(), hint: None }
    }
}

impl From<CohortError> for CliError {
    fn from(err: CohortError) -> Self {
        let hint = match &err {
            CohortError::Connection { .. } => {
                Some("check --source points at an existing SQLite database".to_string())
            }
            CohortError::Config(_) => Some("see cohort --help".to_string()),
            _ => None,
        };
        Self { code: error_exit_code(&err), message: err.to_string(), hint }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cmd_report(cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn cmd_report(cli: Cli) -> Result<(), CliError> {
    let base = match &cli.config {
        Some(path) => ReportConfig::load(path)?,
        None => ReportConfig::default(),
    };
    let config = base.apply(ConfigOverrides {
        source: cli.source,
        output_dir: cli.output_dir,
        output_name: cli.output_name,
    });

    let summary = if cli.json {
        let summary = report::run(&config, &mut io::sink())?;
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::io(format!("cannot serialize summary: {e}")))?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", json).map_err(|e| CliError::io(e.to_string()))?;
        summary
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        report::run(&config, &mut handle)?
    };

    match reconciliation_exit_code(&summary.reconciliation) {
        EXIT_SUCCESS => Ok(()),
        code => Err(CliError::silent(code)),
    }
}
