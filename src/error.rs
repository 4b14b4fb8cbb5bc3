//! # Error Types
//!
//! Structured error hierarchy for the compressor using `thiserror`.
//!
//! Failures of a single Ghostscript trial are [`AttemptError`]s. They are
//! absorbed by the compressor and only surface, wrapped in
//! [`CompressError::Unavailable`], when no trial in the whole
//! profile × candidate matrix succeeded. Filesystem errors propagate
//! unmodified as [`NoteflowError::Io`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type encompassing all failure modes.
#[derive(Error, Debug)]
pub enum NoteflowError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compress(#[from] CompressError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown quality preset '{0}' (expected screen, ebook, printer or prepress)")]
    UnknownQuality(String),

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("invalid config: {message}")]
    Validation { message: String },
}

/// Failure of one Ghostscript invocation.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("executable not found: {program}")]
    ExecutableNotFound { program: String },

    #[error("{program} exited with {}: {stderr}", display_code(.code))]
    ToolExecutionFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {}s", secs(.after))]
    TimedOut { program: String, after: Duration },

    #[error("{program} exited cleanly but produced no output")]
    MissingOutput {
        program: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl AttemptError {
    /// True when the candidate could not be launched at all.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AttemptError::ExecutableNotFound { .. })
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn secs(after: &Duration) -> f64 {
    after.as_secs_f64()
}

/// Errors surfaced by the compressor.
#[derive(Error, Debug)]
pub enum CompressError {
    #[error(
        "unable to compress PDF automatically (Ghostscript not available or failed): {source}. \
         Install Ghostscript (Windows: gswin64c) or set GHOSTSCRIPT_PATH"
    )]
    Unavailable {
        #[source]
        source: AttemptError,
    },

    #[error("no compression profiles configured")]
    NoProfiles,

    #[error("no Ghostscript candidates configured")]
    NoCandidates,

    #[error("input is empty")]
    EmptyInput,
}

impl CompressError {
    /// True when the run failed because no candidate executable could be launched.
    pub fn is_executable_not_found(&self) -> bool {
        matches!(self, CompressError::Unavailable { source } if source.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, NoteflowError>;
