use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cohort_recon::error::{CohortError, Result};
use cohort_recon::model::ExtractionPath;

// ---------------------------------------------------------------------------
// Report config
// ---------------------------------------------------------------------------

/// Run configuration, read from a `.toml` file and/or command-line flags.
///
/// ```toml
/// source      = "data/sales.db"
/// output_dir  = "output"
/// output_name = "sales_analysis.csv"
/// ```
///
/// Relative paths in a config file resolve against the file's directory.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// SQLite database holding Customer, Sales, Orders and Items.
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Base file name; each path's report is written as `<path>_<output_name>`.
    #[serde(default = "default_output_name")]
    pub output_name: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_output_name() -> String {
    "sales_analysis.csv".into()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            source: None,
            output_dir: default_output_dir(),
            output_name: default_output_name(),
        }
    }
}

/// Values given on the command line. Each one present wins over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub output_name: Option<String>,
}

impl ReportConfig {
    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| CohortError::Config(e.to_string()))
    }

    /// Read a config file, resolving relative paths against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CohortError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_toml(&text)?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        if let Some(source) = config.source.take() {
            config.source = Some(base_dir.join(source));
        }
        config.output_dir = base_dir.join(&config.output_dir);
        Ok(config)
    }

    pub fn apply(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(source) = overrides.source {
            self.source = Some(source);
        }
        if let Some(output_dir) = overrides.output_dir {
            self.output_dir = output_dir;
        }
        if let Some(output_name) = overrides.output_name {
            self.output_name = output_name;
        }
        self
    }

    /// Check the config is complete enough to run.
    pub fn validate(&self) -> Result<()> {
        self.source_path()?;

        let name = self.output_name.as_str();
        if name.is_empty() {
            return Err(CohortError::Config("output_name must not be empty".into()));
        }
        if Path::new(name).file_name().and_then(|n| n.to_str()) != Some(name) {
            return Err(CohortError::Config(format!(
                "output_name must be a bare file name, got \"{name}\""
            )));
        }
        Ok(())
    }

    pub fn source_path(&self) -> Result<&Path> {
        match self.source.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(CohortError::Config("no source database given".into())),
        }
    }

    /// Report file for one extraction path, e.g. `output/query_sales_analysis.csv`.
    pub fn output_path(&self, path: ExtractionPath) -> PathBuf {
        self.output_dir.join(format!("{path}_{}", self.output_name))
    }
}
