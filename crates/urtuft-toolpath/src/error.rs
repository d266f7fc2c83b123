//! Error types for the toolpath crate.
//!
//! Compilation failures come from `urtuft-core`; this module adds the
//! failures of looking up and reading back stored job plans.

use std::io;
use thiserror::Error;
use urtuft_core::CompileError;

/// Errors that can occur while compiling or querying job plans.
#[derive(Error, Debug)]
pub enum ToolpathError {
    /// Compilation rejected the input.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// No plan is registered under the identifier.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// I/O error while reading an input image.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl ToolpathError {
    /// Whether this is an unknown-job error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ToolpathError::JobNotFound(_))
    }
}

impl From<ToolpathError> for urtuft_core::Error {
    fn from(err: ToolpathError) -> Self {
        match err {
            ToolpathError::Compile(e) => urtuft_core::Error::Compile(e),
            ToolpathError::JobNotFound(job_id) => urtuft_core::Error::JobNotFound { job_id },
            ToolpathError::IoError(e) => urtuft_core::Error::Io(e),
        }
    }
}

/// Result type alias for toolpath operations.
pub type ToolpathResult<T> = Result<T, ToolpathError>;
