use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix prepended to every output file name
pub const OUTPUT_PREFIX: &str = "Fixed_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One input file's unit of work within a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub status: JobStatus,
    /// Failure reason, set only when `status` is `Failed`
    pub reason: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(source_path: PathBuf, output_dir: &Path) -> Self {
        let output_path = output_path_for(&source_path, output_dir);
        Self {
            source_path,
            output_path,
            status: JobStatus::Pending,
            reason: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// File name of the source, lossily converted for display
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source_path.display().to_string())
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_succeeded(&mut self) {
        self.status = JobStatus::Succeeded;
        self.reason = None;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, reason: String) {
        self.status = JobStatus::Failed;
        self.reason = Some(reason);
        self.finished_at = Some(Utc::now());
    }
}

/// `<output_dir>/Fixed_<file name>`
pub fn output_path_for(source: &Path, output_dir: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(OUTPUT_PREFIX);
    if let Some(file_name) = source.file_name() {
        name.push(file_name);
    }
    output_dir.join(name)
}
