use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;
use crate::config::BatchConfig;
use crate::discovery;
use crate::error::{AlreadyRunning, BatchError, InvalidPathError};
use crate::executor::{EncoderRunner, Executor, JobOutcome, ProcessRunner};
use crate::job::{Job, JobStatus};
use crate::preset::{self, FilterPreset};
use crate::progress::{
    BatchHandle, JobProgress, ProgressReporter, RunOutcome, RunSnapshot, RunState, RunSummary,
};

/// One pass over a discovered file list under one preset
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub id: Uuid,
    pub preset: &'static FilterPreset,
    /// Snapshotted at start; order never changes
    pub jobs: Vec<Job>,
    pub state: RunState,
    pub succeeded: usize,
    pub failed: usize,
    pub current: Option<usize>,
    pub started_at: DateTime<Utc>,
}

impl BatchRun {
    pub fn new(id: Uuid, preset: &'static FilterPreset, jobs: Vec<Job>) -> Self {
        Self {
            id,
            preset,
            jobs,
            state: RunState::Idle,
            succeeded: 0,
            failed: 0,
            current: None,
            started_at: Utc::now(),
        }
    }

    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Jobs still `Pending`: never attempted
    pub fn not_attempted(&self) -> usize {
        self.jobs.iter().filter(|j| j.status == JobStatus::Pending).count()
    }

    fn record(&mut self, outcome: &JobOutcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.current = None;
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: Some(self.id),
            state: self.state,
            preset: Some(self.preset.name.to_string()),
            total: self.total(),
            succeeded: self.succeeded,
            failed: self.failed,
            current_file: self.current.map(|i| self.jobs[i].file_name()),
        }
    }

    fn summary(&self, outcome: RunOutcome) -> RunSummary {
        RunSummary {
            run_id: self.id,
            preset: self.preset.name.to_string(),
            total: self.total(),
            succeeded: self.succeeded,
            failed: self.failed,
            not_attempted: self.not_attempted(),
            outcome,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Resolve everything a run needs before the first encoder invocation
fn preflight(config: &BatchConfig) -> Result<(&'static FilterPreset, Vec<Job>), BatchError> {
    let preset = preset::resolve(&config.preset)?;

    if !config.ffmpeg_path.is_file() {
        return Err(InvalidPathError::Encoder(config.ffmpeg_path.clone()).into());
    }
    if !config.input_path.is_dir() {
        return Err(BatchError::InputNotFound(config.input_path.clone()));
    }

    std::fs::create_dir_all(&config.output_dir).map_err(|source| BatchError::OutputDir {
        path: config.output_dir.clone(),
        source,
    })?;

    let jobs = discovery::discover(&config.input_path, &config.output_dir)?;
    Ok((preset, jobs))
}

fn aborted(err: &BatchError) -> RunOutcome {
    RunOutcome::Aborted {
        kind: err.kind(),
        message: err.to_string(),
    }
}

/// Execute one batch run on the current task.
///
/// Jobs run strictly one at a time in discovery order. A job-scoped failure
/// is counted and the run moves on; a batch-fatal error stops the run and
/// leaves the remaining jobs `Pending`. Exactly one terminal event is sent
/// in every case.
pub async fn run_batch<R: EncoderRunner>(
    config: &BatchConfig,
    runner: Arc<R>,
    mut reporter: ProgressReporter,
) -> RunSummary {
    let run_id = reporter.run_id();
    let started_at = Utc::now();

    let (preset, jobs) = match preflight(config) {
        Ok(ready) => ready,
        Err(err) => {
            error!("❌ Batch {} not started: {}", run_id, err);
            let summary = RunSummary {
                run_id,
                preset: config.preset.clone(),
                total: 0,
                succeeded: 0,
                failed: 0,
                not_attempted: 0,
                outcome: aborted(&err),
                started_at,
                finished_at: Utc::now(),
            };
            let snapshot = RunSnapshot {
                run_id: Some(run_id),
                state: RunState::Completed,
                preset: Some(config.preset.clone()),
                ..RunSnapshot::idle()
            };
            reporter.finish(snapshot, summary.clone());
            return summary;
        }
    };

    let mut run = BatchRun::new(run_id, preset, jobs);
    run.started_at = started_at;

    if run.jobs.is_empty() {
        info!("No video files found in {}", config.input_path.display());
        run.state = RunState::Completed;
        let summary = run.summary(RunOutcome::NothingToDo);
        reporter.finish(run.snapshot(), summary.clone());
        return summary;
    }

    info!("Starting batch {}: {} file(s) with filter: {}", run.id, run.total(), preset.name);
    run.state = RunState::Running;
    reporter.publish(run.snapshot());

    let executor = Executor::new(runner, config.encoder_timeout());
    let mut outcome = RunOutcome::Completed;

    for index in 0..run.jobs.len() {
        run.current = Some(index);
        reporter.publish(run.snapshot());
        info!("Processing: {} with filter: {}...", run.jobs[index].file_name(), preset.name);

        let result = executor
            .execute(&mut run.jobs[index], preset, &config.ffmpeg_path)
            .await;

        match result {
            Ok(result) => {
                run.record(&result.outcome);
                reporter.publish(run.snapshot());
                reporter.job_finished(JobProgress {
                    run_id: run.id,
                    processed: run.processed(),
                    total: run.total(),
                    file_name: run.jobs[index].file_name(),
                    outcome: result.outcome,
                });
            }
            Err(err) => {
                let err = BatchError::from(err);
                error!("❌ Batch {} aborted: {}", run.id, err);
                run.current = None;
                outcome = aborted(&err);
                break;
            }
        }
    }

    run.state = RunState::Completed;
    let summary = run.summary(outcome);
    if summary.failed > 0 {
        warn!("Batch {} finished with {} failed file(s)", run.id, summary.failed);
    }
    info!(
        "Batch {} complete: {} succeeded, {} failed, {} not attempted of {}",
        run.id, summary.succeeded, summary.failed, summary.not_attempted, summary.total
    );
    reporter.finish(run.snapshot(), summary.clone());
    summary
}

/// Holds the coordinator's single run slot; frees it on drop
pub(crate) struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Starts batch runs on a background worker, one at a time.
///
/// A start request while a run is active is rejected with
/// [`AlreadyRunning`]; runs are never queued or cancelled.
pub struct Coordinator<R = ProcessRunner> {
    runner: Arc<R>,
    active: Arc<AtomicBool>,
    snapshot: Arc<watch::Sender<RunSnapshot>>,
}

impl Coordinator<ProcessRunner> {
    pub fn new() -> Self {
        Self::with_runner(ProcessRunner)
    }
}

impl Default for Coordinator<ProcessRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: EncoderRunner> Coordinator<R> {
    pub fn with_runner(runner: R) -> Self {
        let (snapshot, _) = watch::channel(RunSnapshot::idle());
        Self {
            runner: Arc::new(runner),
            active: Arc::new(AtomicBool::new(false)),
            snapshot: Arc::new(snapshot),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Latest published state of the current or most recent run
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshot.subscribe()
    }

    /// Spawn a run for `config` and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, config: BatchConfig) -> Result<BatchHandle, AlreadyRunning> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Batch start rejected: a batch is already running");
            return Err(AlreadyRunning);
        }
        let guard = RunGuard(self.active.clone());

        let run_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(run_id, tx, self.snapshot.clone()).holding(guard);
        let runner = self.runner.clone();

        let worker = tokio::spawn(async move { run_batch(&config, runner, reporter).await });
        Ok(BatchHandle::new(run_id, rx, self.subscribe(), worker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FatalKind;
    use crate::progress::BatchEvent;
    use crate::testing::{exit_with, GatedRunner, ScriptedRunner};
    use proptest::prelude::*;
    use std::path::{Path, PathBuf};
    use tokio::sync::Notify;

    struct Scratch {
        dir: tempfile::TempDir,
        config: BatchConfig,
    }

    fn scratch(files: &[&str]) -> Scratch {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        std::fs::create_dir(&input).unwrap();
        for name in files {
            std::fs::write(input.join(name), b"").unwrap();
        }
        let ffmpeg = dir.path().join("ffmpeg");
        std::fs::write(&ffmpeg, b"").unwrap();

        let config = BatchConfig {
            ffmpeg_path: ffmpeg,
            input_path: input,
            output_dir: dir.path().join("output"),
            preset: "4. Simple Speed Change (Safe Bypass)".to_string(),
            encoder_timeout_secs: None,
        };
        Scratch { dir, config }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<BatchEvent>) -> Vec<BatchEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn input_name(inv: &crate::executor::Invocation) -> String {
        Path::new(&inv.args[2])
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string()
    }

    #[tokio::test]
    async fn test_first_fails_second_succeeds() {
        let s = scratch(&["a.mp4", "b.mp4"]);
        let runner = Arc::new(ScriptedRunner::new(|inv| {
            if input_name(inv) == "a.mp4" {
                exit_with(1, "Invalid argument")
            } else {
                exit_with(0, "")
            }
        }));
        let (reporter, mut rx, snapshot) = ProgressReporter::detached(Uuid::new_v4());

        let summary = run_batch(&s.config, runner.clone(), reporter).await;

        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.not_attempted, 0);
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert!(s.config.output_dir.is_dir());

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        match (&events[0], &events[1]) {
            (BatchEvent::Progress(first), BatchEvent::Progress(second)) => {
                assert_eq!((first.processed, first.file_name.as_str()), (1, "a.mp4"));
                assert!(!first.outcome.is_success());
                assert_eq!((second.processed, second.file_name.as_str()), (2, "b.mp4"));
                assert!(second.outcome.is_success());
            }
            other => panic!("unexpected events: {:?}", other),
        }
        assert_eq!(events[2], BatchEvent::Finished(summary));

        let last = snapshot.borrow().clone();
        assert_eq!(last.state, RunState::Completed);
        assert_eq!(last.processed(), 2);
        assert_eq!(last.current_file, None);
    }

    #[tokio::test]
    async fn test_safe_bypass_single_clip_invocation() {
        let s = scratch(&["clip.mp4"]);
        let runner = Arc::new(ScriptedRunner::new(|_| exit_with(0, "")));
        let (reporter, _rx, _snapshot) = ProgressReporter::detached(Uuid::new_v4());

        run_batch(&s.config, runner.clone(), reporter).await;

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        let args = &calls[0].args;
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "setpts=PTS/1.05");
        let af = args.iter().position(|a| a == "-af").unwrap();
        assert_eq!(args[af + 1], "atempo=1.05");
        assert_eq!(
            PathBuf::from(args.last().unwrap()),
            s.config.output_dir.join("Fixed_clip.mp4")
        );
    }

    #[tokio::test]
    async fn test_missing_encoder_yields_single_fatal_event() {
        let mut s = scratch(&["a.mp4", "b.mp4"]);
        s.config.ffmpeg_path = s.dir.path().join("missing-ffmpeg");
        let runner = Arc::new(ScriptedRunner::new(|_| exit_with(0, "")));
        let (reporter, mut rx, _snapshot) = ProgressReporter::detached(Uuid::new_v4());

        let summary = run_batch(&s.config, runner.clone(), reporter).await;

        assert!(runner.calls().is_empty());
        assert_eq!(summary.processed(), 0);
        assert!(matches!(
            summary.outcome,
            RunOutcome::Aborted { kind: FatalKind::Configuration, ref message } if message.contains("missing-ffmpeg")
        ));
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal());
    }

    #[tokio::test]
    async fn test_missing_input_folder_is_configuration_error() {
        let mut s = scratch(&[]);
        s.config.input_path = s.dir.path().join("nowhere");
        let runner = Arc::new(ScriptedRunner::new(|_| exit_with(0, "")));
        let (reporter, mut rx, _snapshot) = ProgressReporter::detached(Uuid::new_v4());

        let summary = run_batch(&s.config, runner, reporter).await;

        assert!(matches!(summary.outcome, RunOutcome::Aborted { kind: FatalKind::Configuration, .. }));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_preset_is_fatal() {
        let mut s = scratch(&["a.mp4"]);
        s.config.preset = "9. Vaporwave".to_string();
        let runner = Arc::new(ScriptedRunner::new(|_| exit_with(0, "")));
        let (reporter, _rx, _snapshot) = ProgressReporter::detached(Uuid::new_v4());

        let summary = run_batch(&s.config, runner.clone(), reporter).await;

        assert!(runner.calls().is_empty());
        assert_eq!(summary.preset, "9. Vaporwave");
        assert!(matches!(summary.outcome, RunOutcome::Aborted { kind: FatalKind::Configuration, .. }));
    }

    #[tokio::test]
    async fn test_empty_folder_is_nothing_to_do() {
        let s = scratch(&["readme.txt"]);
        let runner = Arc::new(ScriptedRunner::new(|_| exit_with(0, "")));
        let (reporter, mut rx, _snapshot) = ProgressReporter::detached(Uuid::new_v4());

        let summary = run_batch(&s.config, runner.clone(), reporter).await;

        assert_eq!(summary.outcome, RunOutcome::NothingToDo);
        assert_eq!((summary.total, summary.succeeded, summary.failed), (0, 0, 0));
        assert!(runner.calls().is_empty());
        let events = drain(&mut rx);
        assert_eq!(events, vec![BatchEvent::Finished(summary)]);
    }

    #[tokio::test]
    async fn test_vanished_source_aborts_and_leaves_rest_pending() {
        let s = scratch(&["a.mp4", "b.mp4", "c.mp4"]);
        let doomed = s.config.input_path.join("b.mp4");
        // Remove b.mp4 while a.mp4 is being encoded
        let runner = Arc::new(ScriptedRunner::new(move |_| {
            let _ = std::fs::remove_file(&doomed);
            exit_with(0, "")
        }));
        let (reporter, mut rx, _snapshot) = ProgressReporter::detached(Uuid::new_v4());

        let summary = run_batch(&s.config, runner.clone(), reporter).await;

        assert_eq!(runner.calls().len(), 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.not_attempted, 2);
        assert!(matches!(summary.outcome, RunOutcome::Aborted { kind: FatalKind::Discovery, .. }));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events[1].is_terminal());
    }

    #[tokio::test]
    async fn test_concurrent_start_is_rejected() {
        let s = scratch(&["a.mp4"]);
        let gate = Arc::new(Notify::new());
        let coordinator = Coordinator::with_runner(GatedRunner { gate: gate.clone() });

        let handle = coordinator.start(s.config.clone()).unwrap();
        assert!(coordinator.is_running());
        assert!(matches!(coordinator.start(s.config.clone()), Err(AlreadyRunning)));

        gate.notify_one();
        let summary = handle.wait().await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert!(!coordinator.is_running());

        // The slot is free again
        gate.notify_one();
        let second = coordinator.start(s.config.clone()).unwrap();
        assert_ne!(second.run_id, summary.run_id);
        assert_eq!(second.wait().await.unwrap().succeeded, 1);
    }

    #[tokio::test]
    async fn test_observer_receives_events_through_handle() {
        let s = scratch(&["a.mp4", "b.mkv", "c.avi"]);
        let coordinator = Coordinator::with_runner(ScriptedRunner::new(|_| exit_with(0, "")));
        let mut snapshots = coordinator.subscribe();

        let mut handle = coordinator.start(s.config.clone()).unwrap();
        let mut seen = Vec::new();
        while let Some(event) = handle.next_event().await {
            assert_eq!(event.run_id(), handle.run_id);
            seen.push(event);
        }

        assert_eq!(seen.len(), 4);
        assert!(seen[3].is_terminal());
        let last = snapshots.borrow_and_update().clone();
        assert_eq!(last.state, RunState::Completed);
        assert_eq!(last.succeeded, 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Every job resolves to exactly one count and one progress event,
        /// counts climb by one, and a single terminal event closes the run
        #[test]
        fn test_run_counts_and_events(outcomes in prop::collection::vec(prop::bool::ANY, 1..8)) {
            let names: Vec<String> = (0..outcomes.len()).map(|i| format!("clip{:02}.mp4", i)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let s = scratch(&refs);

            let plan = outcomes.clone();
            let runner = Arc::new(ScriptedRunner::new(move |inv| {
                let name = input_name(inv);
                let index: usize = name[4..6].parse().unwrap();
                if plan[index] { exit_with(0, "") } else { exit_with(1, "boom") }
            }));

            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let (reporter, mut rx, _snapshot) = ProgressReporter::detached(Uuid::new_v4());
            let summary = rt.block_on(run_batch(&s.config, runner, reporter));

            let expected_ok = outcomes.iter().filter(|ok| **ok).count();
            prop_assert_eq!(summary.succeeded + summary.failed, outcomes.len());
            prop_assert_eq!(summary.succeeded, expected_ok);
            prop_assert_eq!(summary.total, outcomes.len());

            let events = drain(&mut rx);
            prop_assert_eq!(events.len(), outcomes.len() + 1);
            for (i, event) in events[..outcomes.len()].iter().enumerate() {
                match event {
                    BatchEvent::Progress(p) => {
                        prop_assert_eq!(p.processed, i + 1);
                        prop_assert_eq!(p.total, outcomes.len());
                        prop_assert_eq!(p.outcome.is_success(), outcomes[i]);
                    }
                    BatchEvent::Finished(_) => prop_assert!(false, "terminal event before last job"),
                }
            }
            prop_assert!(events[outcomes.len()].is_terminal());
        }
    }
}
