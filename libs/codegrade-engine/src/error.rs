//! Error types for the evaluation engine.
//!
//! Only misconfigured requests surface as errors. A bad submission always
//! ends in a [`codegrade_common::Verdict`] instead.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("No file at {} or Incorrect path", .path.display())]
    Setup { path: PathBuf },
    #[error("Unknown language: {0}")]
    UnknownLanguage(String),
    #[error("Invalid evaluator transition: {operation} called in state {state}")]
    Lifecycle {
        operation: &'static str,
        state: &'static str,
    },
    #[error("Working directory error at {}: {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EvalError {
    pub fn setup(path: impl Into<PathBuf>) -> Self {
        EvalError::Setup { path: path.into() }
    }
}

/// Failures of a single child process invocation
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error while waiting for {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {}ms", .after.as_millis())]
    Timeout { program: String, after: Duration },
}

pub type Result<T> = std::result::Result<T, EvalError>;
