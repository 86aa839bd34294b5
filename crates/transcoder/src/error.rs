use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::discovery::DiscoveryError;
use crate::preset::{self, UnknownPresetError};

/// Which side of the batch a fatal error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FatalKind {
    /// Settings are wrong: encoder path, input folder, output folder or preset
    Configuration,
    /// The input folder or a discovered file changed under a run
    Discovery,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPathError {
    #[error("FFmpeg executable not found at \"{}\"; set the FFmpeg path to an existing executable", .0.display())]
    Encoder(PathBuf),
    #[error("source file \"{}\" no longer exists; check the input folder and start the batch again", .0.display())]
    Source(PathBuf),
}

/// Errors that halt a whole batch run
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    UnknownPreset(#[from] UnknownPresetError),
    #[error(transparent)]
    InvalidPath(#[from] InvalidPathError),
    #[error("input folder not found: \"{}\"; choose an existing input folder", .0.display())]
    InputNotFound(PathBuf),
    #[error("could not create output folder \"{}\": {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

impl BatchError {
    pub fn kind(&self) -> FatalKind {
        match self {
            BatchError::InvalidPath(InvalidPathError::Source(_)) | BatchError::Discovery(_) => {
                FatalKind::Discovery
            }
            _ => FatalKind::Configuration,
        }
    }
}

/// Returned when a run is requested while another one is still active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a batch is already running; wait for it to finish before starting another")]
pub struct AlreadyRunning;

/// Why a single job failed. Never halts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum JobFailure {
    #[error("encoder rejected filter chain or input (exit code {exit_code})")]
    EncoderRejected { exit_code: i32, stderr: String },
    #[error("encoder could not be run: {detail}")]
    Unexpected { detail: String },
    #[error("encoder did not finish within {secs}s and was stopped")]
    TimedOut { secs: u64 },
}

impl JobFailure {
    /// Suggested next step, shown next to the failure
    pub fn remediation(&self) -> String {
        match self {
            JobFailure::EncoderRejected { .. } => {
                format!("Try the '{}' filter.", preset::fallback().name)
            }
            JobFailure::Unexpected { .. } => {
                "Check that the FFmpeg path points to a working FFmpeg executable.".to_string()
            }
            JobFailure::TimedOut { .. } => format!(
                "Raise the encoder timeout or try the '{}' filter.",
                preset::fallback().name
            ),
        }
    }

    /// Tail of the encoder's diagnostics, when any were captured
    pub fn stderr_summary(&self) -> Option<&str> {
        match self {
            JobFailure::EncoderRejected { stderr, .. } if !stderr.is_empty() => Some(stderr),
            _ => None,
        }
    }
}
