//! Test doubles shared by the engine's unit tests.

use crate::error::RunnerError;
use crate::runner::{CommandSpec, ProcessOutput, ProcessRunner};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub command: CommandSpec,
    pub timeout: Duration,
    pub stdin: Option<Vec<u8>>,
}

type Responder =
    Box<dyn Fn(usize, &CommandSpec) -> Result<ProcessOutput, RunnerError> + Send + Sync>;

/// Answers each call with a canned result chosen by call index
pub struct FakeRunner {
    responder: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeRunner {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(usize, &CommandSpec) -> Result<ProcessOutput, RunnerError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput, RunnerError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RecordedCall {
                command: command.clone(),
                timeout,
                stdin: stdin.map(<[u8]>::to_vec),
            });
            calls.len() - 1
        };
        (self.responder)(index, command)
    }
}

pub fn exited(code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        exit_code: Some(code),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
        elapsed_ms: 1,
    }
}

pub fn ok(stdout: &str) -> ProcessOutput {
    exited(0, stdout, "")
}

pub fn stderr(text: &str) -> ProcessOutput {
    exited(1, "", text)
}
