use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("couldn't find the config file {0}")]
    ConfigNotFound(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid dataset identifier: {0}")]
    InvalidDatasetId(String),

    #[error("invalid option for {dataset}: {message}")]
    InvalidOption { dataset: String, message: String },

    #[error("Eurostat request failed: {0}")]
    Http(String),

    #[error("Eurostat returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed SDMX response: {0}")]
    Sdmx(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to serialize {0}")]
    Serialize(String),

    #[error("{failed} of {total} datasets failed")]
    Incomplete { failed: usize, total: usize },
}
