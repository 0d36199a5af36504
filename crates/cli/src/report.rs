//! Orchestration of one report run.
//!
//! open source → query path → export → algebra path → export → reconcile →
//! close source → summary. Extraction and export faults are soft: they are
//! logged, noted in the summary, and the run carries on. Only a source that
//! cannot be opened stops the run, before anything is written.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use cohort_io::sink::{render_preview, write_summaries};
use cohort_io::{extract_with_algebra, extract_with_query, SourceConnection};
use cohort_recon::error::Result;
use cohort_recon::model::{AgeBand, Extraction, ExtractionPath};
use cohort_recon::reconcile::{reconcile, ReconOutcome, Reconciliation};

use crate::config::ReportConfig;

/// Most differences listed on the console; the JSON summary carries all.
const MAX_LISTED_DIFFERENCES: usize = 20;

const RULE_WIDTH: usize = 60;

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// What happened on one extraction path.
#[derive(Debug, Clone, Serialize)]
pub struct PathReport {
    pub path: ExtractionPath,
    pub records: usize,
    /// Extraction fault, if the path soft-failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Report file written for this path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Export fault, if the report file could not be written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_at: String,
    pub source: PathBuf,
    pub age_band: AgeBand,
    pub query: PathReport,
    pub algebra: PathReport,
    pub reconciliation: Reconciliation,
}

impl RunSummary {
    /// Report files that were actually written.
    pub fn outputs(&self) -> impl Iterator<Item = &Path> {
        [&self.query, &self.algebra]
            .into_iter()
            .filter_map(|p| p.output.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// Console writer. A failed write is logged once and further output dropped,
/// so a closed stdout never aborts the run.
struct Console<'a> {
    out: &'a mut dyn Write,
    broken: bool,
}

impl<'a> Console<'a> {
    fn new(out: &'a mut dyn Write) -> Self {
        Self { out, broken: false }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        if self.broken {
            return;
        }
        if let Err(e) = writeln!(self.out, "{}", text.as_ref()) {
            log::warn!("console output stopped: {e}");
            self.broken = true;
        }
    }

    fn banner(&mut self, title: &str) {
        self.line("=".repeat(RULE_WIDTH));
        self.line(title);
        self.line("=".repeat(RULE_WIDTH));
    }

    fn section(&mut self, title: &str) {
        self.line("");
        self.line(title);
        self.line("-".repeat(RULE_WIDTH * 2 / 3));
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Run the full report for `config`, writing progress to `out`.
pub fn run(config: &ReportConfig, out: &mut dyn Write) -> Result<RunSummary> {
    config.validate()?;
    let source_path = config.source_path()?;
    let band = AgeBand::TARGET;
    let mut console = Console::new(out);

    console.banner("COHORT PURCHASE REPORT");
    console.line(format!("source:   {}", source_path.display()));
    console.line(format!("age band: {band}"));

    let mut source = SourceConnection::open(source_path)?;

    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        log::error!("cannot create output directory {}: {e}", config.output_dir.display());
    }

    console.section("PATH 1: SQL query");
    let query = extract_with_query(&source, band);
    let query_report = export(&mut console, config, ExtractionPath::Query, &query);

    console.section("PATH 2: relational algebra");
    let algebra = extract_with_algebra(&source, band);
    let algebra_report = export(&mut console, config, ExtractionPath::Algebra, &algebra);

    let reconciliation = reconcile(&query, &algebra);
    verify(&mut console, &reconciliation);

    source.close();

    let summary = RunSummary {
        run_at: chrono::Utc::now().to_rfc3339(),
        source: source_path.to_path_buf(),
        age_band: band,
        query: query_report,
        algebra: algebra_report,
        reconciliation,
    };

    console.line("");
    console.banner("REPORT COMPLETE");
    let outputs: Vec<&Path> = summary.outputs().collect();
    if outputs.is_empty() {
        console.line("No files generated.");
    } else {
        console.line("Generated files:");
        for path in outputs {
            console.line(format!("  {}", path.display()));
        }
    }

    Ok(summary)
}

/// Report one path's outcome and, when it has rows, write and preview them.
fn export(
    console: &mut Console<'_>,
    config: &ReportConfig,
    path: ExtractionPath,
    extraction: &Extraction,
) -> PathReport {
    let mut report = PathReport {
        path,
        records: extraction.rows().len(),
        error: None,
        output: None,
        sink_error: None,
    };

    if let Extraction::Failed { reason } = extraction {
        console.line(format!("{} path failed: {reason}", path.label()));
        report.error = Some(reason.clone());
        return report;
    }

    console.line(format!("Retrieved {} records", report.records));
    if extraction.is_empty() {
        console.line("Nothing to export.");
        return report;
    }

    let target = config.output_path(path);
    match write_summaries(&target, extraction.rows()) {
        Ok(()) => {
            console.line(format!("Saved to {}", target.display()));
            console.line("");
            console.line("Preview:");
            for line in render_preview(extraction.rows()).lines() {
                console.line(line);
            }
            report.output = Some(target);
        }
        Err(e) => {
            log::error!("{e}");
            console.line(format!("Export failed: {e}"));
            report.sink_error = Some(e.to_string());
        }
    }
    report
}

fn verify(console: &mut Console<'_>, recon: &Reconciliation) {
    console.section("VERIFICATION: comparing both paths");

    if let ReconOutcome::Skipped { reason } = &recon.outcome {
        if reason.is_one_sided() {
            log::warn!(
                "reconciliation skipped although one path returned rows \
                 (query: {}, algebra: {})",
                recon.query_rows,
                recon.algebra_rows
            );
        }
    }

    for diff in recon.differences.iter().take(MAX_LISTED_DIFFERENCES) {
        console.line(format!("  {diff}"));
    }
    if recon.differences.len() > MAX_LISTED_DIFFERENCES {
        console.line(format!(
            "  ... and {} more",
            recon.differences.len() - MAX_LISTED_DIFFERENCES
        ));
    }

    console.line(recon.verdict());
}
