use std::path::PathBuf;

use thiserror::Error;

/// Every fallible outcome the preprocessor can produce, matching the error
/// kinds named in the specification. The CLI entry point maps each variant
/// to an exit code; parse-phase variants carry enough context (path, and a
/// line number where applicable) to report a useful stderr message.
#[derive(Debug, Error)]
pub enum ThermalError {
    #[error("bad arguments: {0}")]
    BadArguments(String),

    #[error("missing required file: {0}")]
    MissingFile(PathBuf),

    #[error("bad mesh in {path}: {reason}")]
    BadMesh { path: PathBuf, reason: String },

    #[error("bad properties in {path}: {reason}")]
    BadProperties { path: PathBuf, reason: String },

    #[error("bad orbit report in {path}:{line}: {reason}")]
    BadOrbit {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("requested {requested} orbit divisions but only {available} samples fall inside one period")]
    TooFewOrbitSamples { requested: usize, available: usize },

    #[error("viewer unavailable: {0}")]
    ViewerUnavailable(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ThermalError {
    /// Exit code contract from the specification: 1 argument error, 2 bad
    /// input file, 3 runtime error during compute.
    pub fn exit_code(&self) -> i32 {
        match self {
            ThermalError::BadArguments(_) => 1,
            ThermalError::MissingFile(_)
            | ThermalError::BadMesh { .. }
            | ThermalError::BadProperties { .. }
            | ThermalError::BadOrbit { .. } => 2,
            ThermalError::TooFewOrbitSamples { .. }
            | ThermalError::ViewerUnavailable(_)
            | ThermalError::Io { .. } => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, ThermalError>;
