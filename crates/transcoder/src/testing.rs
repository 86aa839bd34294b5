//! In-memory encoder runners for unit tests.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use crate::executor::{EncoderRunner, Invocation, ProcessOutput, RunError};

type Script = Box<dyn Fn(&Invocation) -> Result<ProcessOutput, RunError> + Send + Sync>;

pub fn exit_with(code: i32, stderr: &str) -> Result<ProcessOutput, RunError> {
    Ok(ProcessOutput {
        exit_code: Some(code),
        stderr: stderr.to_string(),
    })
}

/// Answers each invocation from a closure and records what it was asked to run
pub struct ScriptedRunner {
    script: Script,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&Invocation) -> Result<ProcessOutput, RunError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

impl EncoderRunner for ScriptedRunner {
    fn run(
        &self,
        invocation: &Invocation,
        _timeout: Option<Duration>,
    ) -> impl Future<Output = Result<ProcessOutput, RunError>> + Send {
        self.calls.lock().unwrap().push(invocation.clone());
        let result = (self.script)(invocation);
        async move { result }
    }
}

/// Succeeds, but only once the test releases it
pub struct GatedRunner {
    pub gate: Arc<Notify>,
}

impl EncoderRunner for GatedRunner {
    fn run(
        &self,
        _invocation: &Invocation,
        _timeout: Option<Duration>,
    ) -> impl Future<Output = Result<ProcessOutput, RunError>> + Send {
        let gate = self.gate.clone();
        async move {
            gate.notified().await;
            exit_with(0, "")
        }
    }
}
