// End-to-end runs of the cohort report against scratch SQLite databases.
// Run with: cargo test -p cohort-cli --test report_tests

use std::path::{Path, PathBuf};
use std::process::Command;

use rusqlite::Connection;
use tempfile::{tempdir, TempDir};

use cohort_cli::exit_codes::{EXIT_CONNECTION, EXIT_SUCCESS, EXIT_USAGE};
use cohort_cli::{report, ReportConfig};
use cohort_recon::error::CohortError;
use cohort_recon::reconcile::{ReconOutcome, SkipReason};

const SCHEMA: &str = "
    CREATE TABLE Customer (customer_id INTEGER PRIMARY KEY, age INTEGER);
    CREATE TABLE Sales (sales_id INTEGER PRIMARY KEY, customer_id INTEGER);
    CREATE TABLE Orders (order_id INTEGER PRIMARY KEY, sales_id INTEGER, item_id INTEGER, quantity NUMERIC);
    CREATE TABLE Items (item_id INTEGER PRIMARY KEY, item_name TEXT);";

const STORE_DATA: &str = "
    INSERT INTO Customer VALUES (1, 21), (2, 23), (3, 35), (4, 40), (5, 17);
    INSERT INTO Items VALUES (1, 'x'), (2, 'y'), (3, 'z');
    INSERT INTO Sales VALUES (1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (6, 1);
    INSERT INTO Orders (sales_id, item_id, quantity) VALUES
        (1, 1, 10), (6, 1, NULL), (6, 2, 0),
        (2, 1, 1), (2, 2, 1), (2, 3, 1),
        (3, 3, 2), (3, 3, 2),
        (4, 1, 9), (5, 2, 9);";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(data: &str) -> Self {
        let dir = tempdir().unwrap();
        let conn = Connection::open(dir.path().join("sales.db")).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(data).unwrap();
        Self { dir }
    }

    fn db(&self) -> PathBuf {
        self.dir.path().join("sales.db")
    }

    fn out_dir(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    fn config(&self) -> ReportConfig {
        ReportConfig {
            source: Some(self.db()),
            output_dir: self.out_dir(),
            output_name: "sales_analysis.csv".into(),
        }
    }

    fn report(&self, prefix: &str) -> PathBuf {
        self.out_dir().join(format!("{prefix}_sales_analysis.csv"))
    }
}

fn run_to_string(config: &ReportConfig) -> (cohort_recon::Result<cohort_cli::RunSummary>, String) {
    let mut console = Vec::new();
    let result = report::run(config, &mut console);
    (result, String::from_utf8(console).unwrap())
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

const EXPECTED_REPORT: &str = "\
Customer;Age;Item;Quantity
1;21;x;10
2;23;x;1
2;23;y;1
2;23;z;1
3;35;z;4
";

#[test]
fn writes_both_reports_and_reports_a_match() {
    let ws = Workspace::new(STORE_DATA);
    let (result, console) = run_to_string(&ws.config());
    let summary = result.unwrap();

    assert_eq!(read(&ws.report("query")), EXPECTED_REPORT);
    assert_eq!(read(&ws.report("algebra")), EXPECTED_REPORT);

    assert_eq!(summary.query.records, 5);
    assert_eq!(summary.algebra.records, 5);
    assert_eq!(summary.reconciliation.outcome, ReconOutcome::Matched);
    assert_eq!(summary.outputs().count(), 2);

    assert!(console.contains("PATH 1: SQL query"));
    assert!(console.contains("PATH 2: relational algebra"));
    assert!(console.contains("Retrieved 5 records"));
    assert!(console.contains("Customer Age Item Quantity"));
    assert!(console.contains("results match"));
}

#[test]
fn reruns_are_byte_identical() {
    let ws = Workspace::new(STORE_DATA);
    let snapshot = || {
        run_to_string(&ws.config()).0.unwrap();
        (
            std::fs::read(ws.report("query")).unwrap(),
            std::fs::read(ws.report("algebra")).unwrap(),
        )
    };

    let first = snapshot();
    let second = snapshot();
    assert_eq!(first, second);
}

#[test]
fn missing_source_aborts_without_output() {
    let dir = tempdir().unwrap();
    let config = ReportConfig {
        source: Some(dir.path().join("nope.db")),
        output_dir: dir.path().join("output"),
        output_name: "r.csv".into(),
    };

    let (result, console) = run_to_string(&config);
    assert!(matches!(result, Err(CohortError::Connection { .. })));
    assert!(!dir.path().join("output").exists());
    assert!(!console.contains("PATH 1"));
}

#[test]
fn empty_orders_skip_reconciliation_and_write_nothing() {
    let ws = Workspace::new(
        "INSERT INTO Customer VALUES (1, 25);
         INSERT INTO Sales VALUES (1, 1);
         INSERT INTO Items VALUES (1, 'x');",
    );
    let (result, console) = run_to_string(&ws.config());
    let summary = result.unwrap();

    assert_eq!(
        summary.reconciliation.outcome,
        ReconOutcome::Skipped { reason: SkipReason::BothEmpty }
    );
    assert!(!ws.report("query").exists());
    assert!(!ws.report("algebra").exists());
    assert!(console.contains("No files generated."));
}

#[test]
fn broken_schema_soft_fails_both_paths() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("sales.db");
    Connection::open(&db)
        .unwrap()
        .execute_batch("CREATE TABLE Customer (customer_id INTEGER, age INTEGER);")
        .unwrap();
    let config = ReportConfig {
        source: Some(db),
        output_dir: dir.path().join("output"),
        output_name: "r.csv".into(),
    };

    let (result, console) = run_to_string(&config);
    let summary = result.unwrap();

    assert!(summary.query.error.is_some());
    assert!(summary.algebra.error.is_some());
    assert!(!summary.reconciliation.is_mismatch());
    assert!(console.contains("SQL query path failed"));
    assert!(console.contains("relational algebra path failed"));
}

#[test]
fn unwritable_output_is_reported_and_run_continues() {
    let ws = Workspace::new(STORE_DATA);
    // A regular file where the output directory should be
    std::fs::write(ws.out_dir(), "occupied").unwrap();

    let (result, _) = run_to_string(&ws.config());
    let summary = result.unwrap();

    assert!(summary.query.sink_error.is_some());
    assert!(summary.algebra.sink_error.is_some());
    assert_eq!(summary.outputs().count(), 0);
    assert_eq!(summary.reconciliation.outcome, ReconOutcome::Matched);
}

// -------------------------------------------------------------------------
// Binary
// -------------------------------------------------------------------------

fn cohort() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cohort"));
    cmd.env_remove("COHORT_CONFIG").env_remove("COHORT_SOURCE");
    cmd
}

#[test]
fn binary_json_summary() {
    let ws = Workspace::new(STORE_DATA);
    let output = cohort()
        .arg("--source")
        .arg(ws.db())
        .arg("--output-dir")
        .arg(ws.out_dir())
        .arg("--json")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(EXIT_SUCCESS as i32));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["reconciliation"]["outcome"]["status"], "matched");
    assert_eq!(json["query"]["records"], 5);
    assert_eq!(json["age_band"]["min"], 18);
}

#[test]
fn binary_config_file_and_flag_override() {
    let ws = Workspace::new(STORE_DATA);
    let config = ws.dir.path().join("report.toml");
    std::fs::write(
        &config,
        "source = \"sales.db\"\noutput_dir = \"output\"\noutput_name = \"from_file.csv\"\n",
    )
    .unwrap();

    let output = cohort()
        .arg("--config")
        .arg(&config)
        .arg("--output-name")
        .arg("from_flag.csv")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(EXIT_SUCCESS as i32));
    assert!(ws.out_dir().join("query_from_flag.csv").exists());
    assert!(!ws.out_dir().join("query_from_file.csv").exists());
}

#[test]
fn binary_exit_codes() {
    let dir = tempdir().unwrap();

    let missing = cohort().arg("--source").arg(dir.path().join("nope.db")).output().unwrap();
    assert_eq!(missing.status.code(), Some(EXIT_CONNECTION as i32));
    assert!(String::from_utf8_lossy(&missing.stderr).contains("error: cannot open source"));

    let no_source = cohort().current_dir(dir.path()).output().unwrap();
    assert_eq!(no_source.status.code(), Some(EXIT_USAGE as i32));
}
