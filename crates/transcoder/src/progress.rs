use std::sync::Arc;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;
use crate::coordinator::RunGuard;
use crate::error::FatalKind;
use crate::executor::JobOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Completed,
}

/// Published copy of a run's state, readable without touching the worker
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub run_id: Option<Uuid>,
    pub state: RunState,
    pub preset: Option<String>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// File being encoded right now
    pub current_file: Option<String>,
}

impl RunSnapshot {
    pub fn idle() -> Self {
        Self {
            run_id: None,
            state: RunState::Idle,
            preset: None,
            total: 0,
            succeeded: 0,
            failed: 0,
            current_file: None,
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Emitted once per resolved job
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub run_id: Uuid,
    pub processed: usize,
    pub total: usize,
    pub file_name: String,
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every discovered job was attempted
    Completed,
    /// Discovery found no video files
    NothingToDo,
    /// A batch-fatal error stopped the run
    Aborted { kind: FatalKind, message: String },
}

/// Final counts of a run, carried by the terminal event
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub preset: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub not_attempted: usize,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn elapsed_secs(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }

    /// Completed with no failed jobs
    pub fn is_clean(&self) -> bool {
        self.outcome == RunOutcome::Completed && self.failed == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Progress(JobProgress),
    /// Terminal event, sent exactly once per run
    Finished(RunSummary),
}

impl BatchEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            BatchEvent::Progress(p) => p.run_id,
            BatchEvent::Finished(s) => s.run_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchEvent::Finished(_))
    }

    /// Human-readable lines for a log view
    pub fn log_lines(&self) -> Vec<String> {
        match self {
            BatchEvent::Progress(p) => {
                let mut lines = Vec::new();
                match &p.outcome {
                    JobOutcome::Succeeded { output_path } => {
                        lines.push(format!("✅ Done: {}", output_path.display()));
                    }
                    JobOutcome::Failed(failure) => {
                        lines.push(format!(
                            "❌ ERROR: FFmpeg failed for {}: {}. {}",
                            p.file_name,
                            failure,
                            failure.remediation()
                        ));
                        if let Some(stderr) = failure.stderr_summary() {
                            lines.extend(stderr.lines().map(|l| format!("    {}", l)));
                        }
                    }
                }
                lines.push(format!("Processed {} of {} videos.", p.processed, p.total));
                lines
            }
            BatchEvent::Finished(s) => match &s.outcome {
                RunOutcome::Completed => vec![format!(
                    "--- BATCH COMPLETE! --- {} succeeded, {} failed of {} ({}s)",
                    s.succeeded,
                    s.failed,
                    s.total,
                    s.elapsed_secs()
                )],
                RunOutcome::NothingToDo => {
                    vec!["No video files found in the input folder. Nothing to do.".to_string()]
                }
                RunOutcome::Aborted { message, .. } => vec![
                    format!("❌ ERROR: {}", message),
                    format!(
                        "--- BATCH ABORTED --- {} succeeded, {} failed, {} not attempted of {}",
                        s.succeeded, s.failed, s.not_attempted, s.total
                    ),
                ],
            },
        }
    }
}

/// Worker side of the observer bridge. Sending never blocks, and a missing
/// observer is not an error.
pub struct ProgressReporter {
    run_id: Uuid,
    events: mpsc::UnboundedSender<BatchEvent>,
    snapshot: Arc<watch::Sender<RunSnapshot>>,
    processed: usize,
    guard: Option<RunGuard>,
}

impl ProgressReporter {
    pub fn new(
        run_id: Uuid,
        events: mpsc::UnboundedSender<BatchEvent>,
        snapshot: Arc<watch::Sender<RunSnapshot>>,
    ) -> Self {
        Self {
            run_id,
            events,
            snapshot,
            processed: 0,
            guard: None,
        }
    }

    /// Reporter with its own event channel and snapshot cell
    pub fn detached(run_id: Uuid) -> (Self, mpsc::UnboundedReceiver<BatchEvent>, watch::Receiver<RunSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(RunSnapshot::idle());
        (Self::new(run_id, tx, Arc::new(snapshot_tx)), rx, snapshot_rx)
    }

    pub(crate) fn holding(mut self, guard: RunGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn publish(&self, snapshot: RunSnapshot) {
        self.snapshot.send_replace(snapshot);
    }

    /// Report one resolved job. Counts must advance by exactly one.
    pub fn job_finished(&mut self, progress: JobProgress) {
        debug_assert_eq!(progress.processed, self.processed + 1);
        self.processed = progress.processed;
        self.send(BatchEvent::Progress(progress));
    }

    /// Publish the final snapshot, release the run slot, then send the
    /// terminal event. Consumes the reporter so it can fire only once.
    pub fn finish(mut self, snapshot: RunSnapshot, summary: RunSummary) {
        self.publish(snapshot);
        drop(self.guard.take());
        self.send(BatchEvent::Finished(summary));
    }

    fn send(&self, event: BatchEvent) {
        if self.events.send(event).is_err() {
            debug!("No observer for run {}; event dropped", self.run_id);
        }
    }
}

/// Observer side of one started run
pub struct BatchHandle {
    pub run_id: Uuid,
    pub events: mpsc::UnboundedReceiver<BatchEvent>,
    pub snapshot: watch::Receiver<RunSnapshot>,
    worker: JoinHandle<RunSummary>,
}

impl BatchHandle {
    pub(crate) fn new(
        run_id: Uuid,
        events: mpsc::UnboundedReceiver<BatchEvent>,
        snapshot: watch::Receiver<RunSnapshot>,
        worker: JoinHandle<RunSummary>,
    ) -> Self {
        Self {
            run_id,
            events,
            snapshot,
            worker,
        }
    }

    /// Wait for the next event; `None` once the run has finished and the
    /// terminal event was consumed
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Non-blocking poll for UI loops
    pub fn try_next_event(&mut self) -> Option<BatchEvent> {
        self.events.try_recv().ok()
    }

    /// Wait for the worker and return its summary
    pub async fn wait(self) -> Result<RunSummary, JoinError> {
        self.worker.await
    }
}
