use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use crate::error::{InvalidPathError, JobFailure};
use crate::job::Job;
use crate::preset::FilterPreset;

pub const VIDEO_CODEC: &str = "libx264";
pub const SPEED_PRESET: &str = "fast";
pub const AUDIO_CODEC: &str = "aac";
pub const AUDIO_BITRATE: &str = "128k";

/// Number of trailing stderr lines kept as failure detail
pub const STDERR_SUMMARY_LINES: usize = 20;

/// Longest stderr line kept, in characters
pub const STDERR_LINE_MAX_CHARS: usize = 240;

/// A fully resolved encoder command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        format!("{} {}", self.program.display(), self.args.join(" "))
    }
}

/// Build the encoder invocation for one job
pub fn build_invocation(encoder: &Path, job: &Job, preset: &FilterPreset) -> Invocation {
    let mut args = Vec::new();

    // Overwrite existing output
    args.push("-y".to_string());

    args.push("-i".to_string());
    args.push(job.source_path.to_string_lossy().to_string());

    args.push("-vf".to_string());
    args.push(preset.video_filter());
    args.push("-af".to_string());
    args.push(preset.audio_filter());

    args.push("-c:v".to_string());
    args.push(VIDEO_CODEC.to_string());
    args.push("-preset".to_string());
    args.push(SPEED_PRESET.to_string());

    args.push("-c:a".to_string());
    args.push(AUDIO_CODEC.to_string());
    args.push("-b:a".to_string());
    args.push(AUDIO_BITRATE.to_string());

    // Strip all source metadata
    args.push("-map_metadata".to_string());
    args.push("-1".to_string());

    args.push(job.output_path.to_string_lossy().to_string());

    Invocation {
        program: encoder.to_path_buf(),
        args,
    }
}

/// What the encoder process left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

/// Runs an encoder invocation to completion
pub trait EncoderRunner: Send + Sync + 'static {
    fn run(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<ProcessOutput, RunError>> + Send;
}

/// Spawns the encoder as a child process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl EncoderRunner for ProcessRunner {
    fn run(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<ProcessOutput, RunError>> + Send {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        async move {
            let mut child = cmd.spawn()?;
            let mut stderr = child
                .stderr
                .take()
                .ok_or_else(|| std::io::Error::other("failed to capture encoder stderr"))?;

            // Drain stderr while waiting; a full pipe would stall the encoder
            let reader = tokio::spawn(async move {
                let mut buf = Vec::new();
                stderr.read_to_end(&mut buf).await.map(|_| buf)
            });

            let status = match timeout {
                Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                    Ok(status) => status?,
                    Err(_) => {
                        // The child may exit on its own while being killed
                        if let Err(e) = child.kill().await {
                            debug!("Failed to kill timed-out encoder: {}", e);
                        }
                        reader.abort();
                        return Err(RunError::TimedOut(limit));
                    }
                },
                None => child.wait().await?,
            };

            let stderr = reader.await.map_err(std::io::Error::other)??;

            Ok(ProcessOutput {
                exit_code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded { output_path: PathBuf },
    Failed(JobFailure),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }
}

/// One result per invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub outcome: JobOutcome,
    pub stderr_summary: Option<String>,
}

/// Keep the last `STDERR_SUMMARY_LINES` non-empty lines.
///
/// FFmpeg redraws its `frame=` status with bare `\r`, so both `\r` and `\n`
/// end a line here. Overlong lines are cut to `STDERR_LINE_MAX_CHARS`.
pub fn summarize_stderr(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .split(['\r', '\n'])
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_SUMMARY_LINES);
    lines[start..]
        .iter()
        .map(|line| truncate_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_line(line: &str) -> String {
    match line.char_indices().nth(STDERR_LINE_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

/// Turns a job into exactly one encoder invocation and classifies the result
pub struct Executor<R> {
    runner: Arc<R>,
    timeout: Option<Duration>,
}

impl<R: EncoderRunner> Executor<R> {
    pub fn new(runner: Arc<R>, timeout: Option<Duration>) -> Self {
        Self { runner, timeout }
    }

    /// Run `job` through the encoder.
    ///
    /// Returns `Err` only when the encoder or the source file is missing;
    /// that leaves the job `Pending` and is fatal to the batch. Every other
    /// problem becomes a failed job.
    pub async fn execute(
        &self,
        job: &mut Job,
        preset: &FilterPreset,
        encoder_path: &Path,
    ) -> Result<ExecutionResult, InvalidPathError> {
        if !encoder_path.exists() {
            return Err(InvalidPathError::Encoder(encoder_path.to_path_buf()));
        }
        if !job.source_path.exists() {
            return Err(InvalidPathError::Source(job.source_path.clone()));
        }

        let invocation = build_invocation(encoder_path, job, preset);
        debug!("ffmpeg command: {}", invocation.command_line());

        job.mark_running();
        let outcome = match self.runner.run(&invocation, self.timeout).await {
            Ok(output) if output.success() => JobOutcome::Succeeded {
                output_path: job.output_path.clone(),
            },
            Ok(output) => {
                debug!("ffmpeg exit code: {:?}, stderr length: {}", output.exit_code, output.stderr.len());
                JobOutcome::Failed(JobFailure::EncoderRejected {
                    exit_code: output.exit_code.unwrap_or(-1),
                    stderr: summarize_stderr(&output.stderr),
                })
            }
            Err(RunError::TimedOut(limit)) => JobOutcome::Failed(JobFailure::TimedOut {
                secs: limit.as_secs(),
            }),
            Err(RunError::Io(e)) => JobOutcome::Failed(JobFailure::Unexpected {
                detail: e.to_string(),
            }),
        };

        let stderr_summary = match &outcome {
            JobOutcome::Succeeded { output_path } => {
                info!("Done: {} -> {}", job.file_name(), output_path.display());
                job.mark_succeeded();
                None
            }
            JobOutcome::Failed(failure) => {
                warn!("FFmpeg failed for {}: {}", job.file_name(), failure);
                job.mark_failed(failure.to_string());
                failure.stderr_summary().map(str::to_string)
            }
        };

        Ok(ExecutionResult {
            outcome,
            stderr_summary,
        })
    }
}
