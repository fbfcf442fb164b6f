/// Process Runner - bounded execution of external tools
///
/// **Core Responsibility:**
/// Spawn exactly one child per call, feed it stdin, capture stdout/stderr
/// and report its exit status.
///
/// **Guarantees:**
/// - Returns within `timeout` plus the configured grace period
/// - Each child leads its own process group; at the deadline the group gets
///   SIGTERM, then SIGKILL once the grace period runs out
/// - Nothing spawned by the child outlives the call, whatever the exit path
/// - Captured output is bounded; the pipes keep draining past the bound
/// - No shell is involved, arguments go straight to the OS
use crate::error::RunnerError;
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// A structured command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &std::path::Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Raw result of one child process
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// `None` when the child was ended by a signal
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Process runner trait
///
/// Any implementation must guarantee:
/// 1. One child per call, owned by that call
/// 2. Respect `timeout` and report [`RunnerError::Timeout`] instead of blocking
/// 3. Leave no running or unreaped child behind on any exit path
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput, RunnerError>;
}

/// Runs commands as local OS processes through tokio
#[derive(Debug, Clone)]
pub struct LocalRunner {
    grace: Duration,
    max_output_bytes: usize,
}

impl LocalRunner {
    pub fn new(grace: Duration, max_output_bytes: usize) -> Self {
        Self {
            grace,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &codegrade_common::Config) -> Self {
        Self::new(
            Duration::from_millis(config.process_grace_ms),
            config.max_output_bytes,
        )
    }

    /// SIGTERM the group, escalate to SIGKILL after the grace period and reap
    async fn terminate(&self, child: &mut Child, group: &mut ProcessGroup, program: &str) {
        if !group.signal(Signal::SIGTERM) {
            // Already exited between the deadline and the signal
            let _ = child.start_kill();
        }
        let exited = match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(program = program, ?status, "timed out child exited on SIGTERM");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(program = program, error = %e, "failed to wait for timed out child");
                false
            }
            Err(_) => {
                tracing::warn!(
                    program = program,
                    grace_ms = self.grace.as_millis() as u64,
                    "child ignored SIGTERM, sending SIGKILL"
                );
                false
            }
        };

        // Descendants that ignored SIGTERM or outlived the leader
        group.kill();
        if exited {
            return;
        }
        let _ = child.start_kill();
        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(program = program, ?status, "timed out child reaped");
            }
            Ok(Err(e)) => {
                tracing::warn!(program = program, error = %e, "failed to reap timed out child");
            }
            Err(_) => {
                // kill_on_drop plus tokio's orphan reaper take over from here
                tracing::warn!(program = program, "child not reaped within grace period after SIGKILL");
            }
        }
    }

    async fn collect(&self, task: Option<JoinHandle<Vec<u8>>>, program: &str) -> Vec<u8> {
        let Some(mut task) = task else {
            return Vec::new();
        };
        match tokio::time::timeout(self.grace, &mut task).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                tracing::warn!(program = program, error = %e, "output reader task failed");
                Vec::new()
            }
            Err(_) => {
                // A grandchild inherited the pipe and keeps it open
                task.abort();
                tracing::warn!(program = program, "output pipe still open after exit, discarded");
                Vec::new()
            }
        }
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 64 * 1024)
    }
}

#[async_trait]
impl ProcessRunner for LocalRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput, RunnerError> {
        let program = command.program.clone();
        let started = Instant::now();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            program: program.clone(),
            source,
        })?;
        let mut group = ProcessGroup::of(&child);

        let limit = self.max_output_bytes;
        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(read_capped(out, limit)));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(read_capped(err, limit)));
        let stdin_task = match (child.stdin.take(), stdin) {
            (Some(mut pipe), Some(data)) => {
                let data = data.to_vec();
                Some(tokio::spawn(async move {
                    // EPIPE just means the child stopped reading
                    let _ = pipe.write_all(&data).await;
                    let _ = pipe.shutdown().await;
                }))
            }
            _ => None,
        };

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                self.terminate(&mut child, &mut group, &program).await;
                if let Some(task) = stdin_task {
                    task.abort();
                }
                for task in [stdout_task, stderr_task].into_iter().flatten() {
                    task.abort();
                }
                return Err(RunnerError::Io { program, source });
            }
            Err(_) => {
                self.terminate(&mut child, &mut group, &program).await;
                if let Some(task) = stdin_task {
                    task.abort();
                }
                let stderr = self.collect(stderr_task, &program).await;
                let _ = self.collect(stdout_task, &program).await;
                tracing::warn!(
                    program = %program,
                    timeout_ms = timeout.as_millis() as u64,
                    stderr_bytes = stderr.len(),
                    "process killed after timeout"
                );
                return Err(RunnerError::Timeout {
                    program,
                    after: timeout,
                });
            }
        };

        // Background processes left by the child would hold the pipes open
        group.kill();
        if let Some(task) = stdin_task {
            task.abort();
        }
        let stdout = self.collect(stdout_task, &program).await;
        let stderr = self.collect(stderr_task, &program).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(
            program = %program,
            exit_code = ?status.code(),
            elapsed_ms = elapsed_ms,
            "process finished"
        );

        Ok(ProcessOutput {
            exit_code: status.code(),
            stdout,
            stderr,
            elapsed_ms,
        })
    }
}

/// Process group led by a spawned child; SIGKILLed when dropped so a
/// cancelled `run` cannot leave descendants behind
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self {
            pgid: child.id().map(|id| Pid::from_raw(id as i32)),
        }
    }

    /// Returns whether any process received the signal
    fn signal(&self, signal: Signal) -> bool {
        let Some(pgid) = self.pgid else {
            return false;
        };
        match killpg(pgid, signal) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(e) => {
                tracing::warn!(pgid = pgid.as_raw(), ?signal, error = %e, "failed to signal process group");
                false
            }
        }
    }

    fn kill(&mut self) {
        self.signal(Signal::SIGKILL);
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Read to EOF, keeping at most `limit` bytes
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Vec<u8> {
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(captured.len());
                captured.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    captured
}
