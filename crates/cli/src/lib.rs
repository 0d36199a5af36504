// Library half of the `cohort` binary, shared with integration tests.

pub mod config;
pub mod exit_codes;
pub mod report;

pub use config::{ConfigOverrides, ReportConfig};
pub use report::{run, RunSummary};
