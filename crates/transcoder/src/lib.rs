pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod job;
pub mod preset;
pub mod progress;

#[cfg(test)]
mod testing;

pub use config::BatchConfig;
pub use coordinator::{run_batch, BatchRun, Coordinator};
pub use error::{AlreadyRunning, BatchError, FatalKind, JobFailure};
pub use executor::{EncoderRunner, ExecutionResult, Executor, JobOutcome, ProcessRunner};
pub use job::{Job, JobStatus};
pub use preset::{FilterPreset, UnknownPresetError};
pub use progress::{BatchEvent, BatchHandle, JobProgress, RunOutcome, RunSnapshot, RunState, RunSummary};
