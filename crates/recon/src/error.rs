use std::path::PathBuf;

use thiserror::Error;

use crate::model::ExtractionPath;

#[derive(Debug, Error)]
pub enum CohortError {
    /// Source store missing, unreadable, or already closed. Fatal for a run.
    #[error("cannot open source '{}': {message}", .path.display())]
    Connection { path: PathBuf, message: String },

    /// Fault inside one extraction path. Recovered as an empty result.
    #[error("{path} extraction failed: {message}")]
    Extraction { path: ExtractionPath, message: String },

    /// Fault writing an output file. Recovered, the file is skipped.
    #[error("cannot write '{}': {message}", .path.display())]
    Sink { path: PathBuf, message: String },

    /// Bad or missing configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl CohortError {
    pub fn extraction(path: ExtractionPath, message: impl Into<String>) -> Self {
        Self::Extraction { path, message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, CohortError>;
