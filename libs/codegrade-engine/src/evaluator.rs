/// Code Evaluator - compile, run, compare
///
/// **Core Responsibility:**
/// Drive one submission through the fixed pipeline:
/// 1. Compile the submission
/// 2. Compile the reference program against the submission's output
/// 3. Run the reference program, which exercises the submission
///
/// **Critical Properties:**
/// - Language details live behind [`CodeEvaluator`]; the pipeline does not
///   know which compiler it is driving
/// - Every stage is strictly sequential and gated on the previous one
/// - A bad submission always ends in a [`Verdict`], never an error
/// - Each evaluation owns its own [`Workspace`]
use crate::error::{EvalError, Result, RunnerError};
use crate::normalizer::{has_diagnostics, normalize};
use crate::runner::{CommandSpec, ProcessOutput, ProcessRunner};
use crate::workspace::{remove_artifact, Workspace};
use codegrade_common::{FailureKind, Language, TestCaseData, Verdict};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Everything `check` needs, computed once by `setup`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    pub reference_path: PathBuf,
    pub submission_path: PathBuf,
    pub compile_submission: CommandSpec,
    pub compile_reference: CommandSpec,
    pub run_reference: CommandSpec,
    /// Generated by `compile_submission`
    pub submission_artifact: PathBuf,
    /// Generated by `compile_reference`
    pub reference_artifact: PathBuf,
}

/// Language-specific half of an evaluation
///
/// Implementations only describe commands and file names. Staging, process
/// execution, classification and cleanup are shared.
pub trait CodeEvaluator: Send + Sync {
    fn language(&self) -> Language;

    /// Name the submission is staged under inside the workspace
    fn submission_file_name(&self) -> &'static str;

    /// Build the three stage commands plus the artifacts they generate.
    /// `reference` is absolute, `submission` lives inside `workspace`.
    fn commands(&self, workspace: &Path, reference: &Path, submission: &Path) -> CommandSet;
}

/// Evaluation lifecycle state
/// Created → SetUp → Checked → TornDown, TornDown reachable from anywhere
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationState {
    Created,
    SetUp,
    Checked,
    TornDown,
}

impl EvaluationState {
    fn name(&self) -> &'static str {
        match self {
            EvaluationState::Created => "created",
            EvaluationState::SetUp => "set_up",
            EvaluationState::Checked => "checked",
            EvaluationState::TornDown => "torn_down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    CompileSubmission,
    CompileReference,
    RunReference,
}

impl Stage {
    /// Failure class reported when this stage goes wrong
    fn failure_kind(&self) -> FailureKind {
        match self {
            Stage::CompileSubmission => FailureKind::CompilationError,
            Stage::CompileReference => FailureKind::HarnessError,
            Stage::RunReference => FailureKind::RuntimeFailure,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::CompileSubmission => write!(f, "compile_submission"),
            Stage::CompileReference => write!(f, "compile_reference"),
            Stage::RunReference => write!(f, "run_reference"),
        }
    }
}

/// One submission being evaluated by one evaluator
pub struct Evaluation {
    id: Uuid,
    evaluator: Box<dyn CodeEvaluator>,
    runner: Arc<dyn ProcessRunner>,
    work_root: PathBuf,
    submission_source: String,
    process_timeout: Duration,
    test_case: TestCaseData,
    workspace: Option<Workspace>,
    submission_path: Option<PathBuf>,
    state: EvaluationState,
}

impl Evaluation {
    pub fn new(
        evaluator: Box<dyn CodeEvaluator>,
        runner: Arc<dyn ProcessRunner>,
        work_root: impl Into<PathBuf>,
        submission_source: impl Into<String>,
        process_timeout: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            evaluator,
            runner,
            work_root: work_root.into(),
            submission_source: submission_source.into(),
            process_timeout,
            test_case: TestCaseData::default(),
            workspace: None,
            submission_path: None,
            state: EvaluationState::Created,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> EvaluationState {
        self.state
    }

    pub fn language(&self) -> Language {
        self.evaluator.language()
    }

    /// Staged submission, once setup got that far
    pub fn submission_path(&self) -> Option<&Path> {
        self.submission_path.as_deref()
    }

    fn expect_state(&self, expected: EvaluationState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EvalError::Lifecycle {
                operation,
                state: self.state.name(),
            })
        }
    }

    /// Stage the submission in a fresh workspace and derive the commands.
    ///
    /// Fails with [`EvalError::Setup`] when the reference program or the
    /// staged copy of the submission is not a readable file.
    pub fn setup(&mut self, test_case: &TestCaseData, reference: &Path) -> Result<CommandSet> {
        self.expect_state(EvaluationState::Created, "setup")?;

        let reference = readable_file(reference)?;

        let workspace = Workspace::create(&self.work_root, self.language())?;
        let staged = workspace.stage(self.evaluator.submission_file_name(), &self.submission_source);
        let workspace_dir = workspace.path().to_path_buf();
        self.workspace = Some(workspace);
        let submission = staged?;
        self.submission_path = Some(submission.clone());
        let submission = readable_file(&submission)?;

        let commands = self
            .evaluator
            .commands(&workspace_dir, &reference, &submission);
        self.test_case = test_case.clone();
        self.state = EvaluationState::SetUp;

        tracing::info!(
            evaluation_id = %self.id,
            language = %self.language(),
            workspace = %workspace_dir.display(),
            reference = %reference.display(),
            "evaluation set up"
        );
        Ok(commands)
    }

    /// Run the compile / compile / run pipeline and produce the verdict
    pub async fn check(&mut self, commands: &CommandSet) -> Result<Verdict> {
        self.expect_state(EvaluationState::SetUp, "check")?;

        let verdict = self.run_pipeline(commands).await;
        self.state = EvaluationState::Checked;

        tracing::info!(
            evaluation_id = %self.id,
            language = %self.language(),
            success = verdict.success,
            kind = ?verdict.failure_kind(),
            "evaluation checked"
        );
        Ok(verdict)
    }

    async fn run_pipeline(&self, commands: &CommandSet) -> Verdict {
        // Stage 1: the submission on its own
        let compiled = self
            .run_stage(Stage::CompileSubmission, &commands.compile_submission, None)
            .await;
        if let Err(verdict) = compiled.and_then(|output| compile_outcome(Stage::CompileSubmission, &output)) {
            remove_artifact(&commands.submission_artifact);
            return verdict;
        }

        // Stage 2: the reference against the submission's artifacts
        let linked = self
            .run_stage(Stage::CompileReference, &commands.compile_reference, None)
            .await;
        if let Err(verdict) = linked.and_then(|output| compile_outcome(Stage::CompileReference, &output)) {
            remove_artifact(&commands.reference_artifact);
            remove_artifact(&commands.submission_artifact);
            return verdict;
        }

        // Stage 3: the reference exercises the submission
        let stdin = self.test_case.stdin.as_deref().map(str::as_bytes);
        let verdict = match self
            .run_stage(Stage::RunReference, &commands.run_reference, stdin)
            .await
        {
            Ok(output) if output.success() => Verdict::correct(),
            Ok(output) => run_failure(&output),
            Err(verdict) => verdict,
        };
        remove_artifact(&commands.reference_artifact);
        remove_artifact(&commands.submission_artifact);
        verdict
    }

    fn stage_timeout(&self, stage: Stage) -> Duration {
        match (stage, self.test_case.time_limit_ms) {
            (Stage::RunReference, Some(limit_ms)) => {
                self.process_timeout.min(Duration::from_millis(limit_ms.max(1)))
            }
            _ => self.process_timeout,
        }
    }

    /// Run one stage; runner failures are already turned into verdicts
    async fn run_stage(
        &self,
        stage: Stage,
        command: &CommandSpec,
        stdin: Option<&[u8]>,
    ) -> std::result::Result<ProcessOutput, Verdict> {
        let timeout = self.stage_timeout(stage);
        tracing::debug!(
            evaluation_id = %self.id,
            stage = %stage,
            command = %command,
            timeout_ms = timeout.as_millis() as u64,
            "running stage"
        );

        match self.runner.run(command, timeout, stdin).await {
            Ok(output) => {
                tracing::debug!(
                    evaluation_id = %self.id,
                    stage = %stage,
                    exit_code = ?output.exit_code,
                    elapsed_ms = output.elapsed_ms,
                    "stage finished"
                );
                Ok(output)
            }
            Err(RunnerError::Timeout { after, .. }) => {
                tracing::warn!(evaluation_id = %self.id, stage = %stage, "stage timed out");
                Err(Verdict::labelled(
                    FailureKind::Timeout,
                    &format!("{} exceeded {}ms", stage, after.as_millis()),
                ))
            }
            Err(e) => {
                tracing::error!(evaluation_id = %self.id, stage = %stage, error = %e, "stage could not run");
                Err(Verdict::labelled(stage.failure_kind(), &e.to_string()))
            }
        }
    }

    /// Remove the staged submission and the workspace. Idempotent.
    pub fn teardown(&mut self) {
        if self.state == EvaluationState::TornDown {
            return;
        }
        if let Some(path) = self.submission_path.as_deref() {
            remove_artifact(path);
        }
        if let Some(mut workspace) = self.workspace.take() {
            workspace.remove();
        }
        tracing::debug!(
            evaluation_id = %self.id,
            from_state = self.state.name(),
            "evaluation torn down"
        );
        self.state = EvaluationState::TornDown;
    }
}

impl Drop for Evaluation {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn readable_file(path: &Path) -> Result<PathBuf> {
    let resolved = path.canonicalize().map_err(|_| EvalError::setup(path))?;
    if !resolved.is_file() || std::fs::File::open(&resolved).is_err() {
        return Err(EvalError::setup(path));
    }
    Ok(resolved)
}

/// A compile stage fails on any diagnostic output or a non-zero exit
fn compile_outcome(stage: Stage, output: &ProcessOutput) -> std::result::Result<(), Verdict> {
    if has_diagnostics(&output.stderr) {
        return Err(Verdict::labelled(stage.failure_kind(), &normalize(&output.stderr)));
    }
    if !output.success() {
        let detail = if has_diagnostics(&output.stdout) {
            normalize(&output.stdout)
        } else {
            format!("{} exited with status {}", stage, describe_exit(output.exit_code))
        };
        return Err(Verdict::labelled(stage.failure_kind(), &detail));
    }
    Ok(())
}

fn run_failure(output: &ProcessOutput) -> Verdict {
    let stdout = output.stdout_lossy();
    let stderr = output.stderr_lossy();
    if stdout.trim().is_empty() && stderr.trim().is_empty() {
        return Verdict::failure(
            FailureKind::RuntimeFailure,
            format!(
                "Reference program exited with status {}",
                describe_exit(output.exit_code)
            ),
        );
    }
    Verdict::failure(FailureKind::RuntimeFailure, format!("{}\n{}", stdout, stderr))
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::java::JavaEvaluator;
    use crate::testing::{exited, ok, stderr, FakeRunner};
    use codegrade_common::{FailureKind, Toolchain};

    struct Fixture {
        _root: tempfile::TempDir,
        reference: PathBuf,
        work_root: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let reference = root.path().join("Main.java");
        std::fs::write(&reference, "public class Main {}").unwrap();
        let work_root = root.path().join("work");
        Fixture {
            reference,
            work_root,
            _root: root,
        }
    }

    fn evaluation(fx: &Fixture, runner: Arc<FakeRunner>) -> Evaluation {
        Evaluation::new(
            Box::new(JavaEvaluator::new(&Toolchain::default())),
            runner,
            &fx.work_root,
            "public class Test {}",
            Duration::from_secs(5),
        )
    }

    fn touch_artifacts(commands: &CommandSet) {
        std::fs::write(&commands.submission_artifact, b"class").unwrap();
        std::fs::write(&commands.reference_artifact, b"class").unwrap();
    }

    #[tokio::test]
    async fn test_correct_answer() {
        let fx = fixture();
        let runner = Arc::new(FakeRunner::new(|_, _| Ok(ok(""))));
        let mut eval = evaluation(&fx, runner.clone());

        let commands = eval.setup(&TestCaseData::default(), &fx.reference).unwrap();
        touch_artifacts(&commands);
        let verdict = eval.check(&commands).await.unwrap();

        assert_eq!(verdict, Verdict::correct());
        assert_eq!(runner.calls().len(), 3);
        assert!(!commands.submission_artifact.exists());
        assert!(!commands.reference_artifact.exists());
        assert_eq!(eval.state(), EvaluationState::Checked);
    }

    #[tokio::test]
    async fn test_compilation_error_skips_reference() {
        let fx = fixture();
        let runner = Arc::new(FakeRunner::new(|_, _| {
            Ok(stderr(
                "/w/Test.java:1: error: ';' expected\n public class Test { int x }\n",
            ))
        }));
        let mut eval = evaluation(&fx, runner.clone());

        let commands = eval.setup(&TestCaseData::default(), &fx.reference).unwrap();
        touch_artifacts(&commands);
        let verdict = eval.check(&commands).await.unwrap();

        assert!(!verdict.success);
        assert_eq!(
            verdict.message,
            "Compilation Error:\n1: error: ';' expected\n public class Test { int x }"
        );
        assert_eq!(runner.calls().len(), 1);
        assert!(!commands.submission_artifact.exists());
    }

    #[tokio::test]
    async fn test_harness_error_when_reference_does_not_compile() {
        let fx = fixture();
        let runner = Arc::new(FakeRunner::new(|call, _| match call {
            0 => Ok(ok("")),
            _ => Ok(stderr("Main.java:4: error: cannot find symbol\n")),
        }));
        let mut eval = evaluation(&fx, runner.clone());

        let commands = eval.setup(&TestCaseData::default(), &fx.reference).unwrap();
        touch_artifacts(&commands);
        let verdict = eval.check(&commands).await.unwrap();

        assert!(!verdict.success);
        assert!(verdict.message.starts_with("Error:"));
        assert_eq!(verdict.failure_kind(), Some(FailureKind::HarnessError));
        assert_eq!(runner.calls().len(), 2);
        assert!(!commands.submission_artifact.exists());
    }

    #[tokio::test]
    async fn test_runtime_failure_combines_output() {
        let fx = fixture();
        let runner = Arc::new(FakeRunner::new(|call, _| match call {
            2 => Ok(exited(1, "expected 6 got 5", "AssertionError")),
            _ => Ok(ok("")),
        }));
        let mut eval = evaluation(&fx, runner.clone());

        let commands = eval.setup(&TestCaseData::default(), &fx.reference).unwrap();
        let verdict = eval.check(&commands).await.unwrap();

        assert!(!verdict.success);
        assert_eq!(verdict.message, "expected 6 got 5\nAssertionError");
        assert_eq!(verdict.failure_kind(), Some(FailureKind::RuntimeFailure));
    }

    #[tokio::test]
    async fn test_runtime_output_starting_with_error_is_still_runtime_failure() {
        let fx = fixture();
        let runner = Arc::new(FakeRunner::new(|call, _| match call {
            2 => Ok(exited(1, "Error: expected 6 got 5", "")),
            _ => Ok(ok("")),
        }));
        let mut eval = evaluation(&fx, runner);

        let commands = eval.setup(&TestCaseData::default(), &fx.reference).unwrap();
        let verdict = eval.check(&commands).await.unwrap();

        assert_eq!(verdict.message, "Error: expected 6 got 5\n");
        assert_eq!(verdict.failure_kind(), Some(FailureKind::RuntimeFailure));
    }

    #[tokio::test]
    async fn test_run_timeout_is_a_failed_verdict() {
        let fx = fixture();
        let runner = Arc::new(FakeRunner::new(|call, cmd| match call {
            2 => Err(RunnerError::Timeout {
                program: cmd.program.clone(),
                after: Duration::from_millis(100),
            }),
            _ => Ok(ok("")),
        }));
        let mut eval = evaluation(&fx, runner);

        let commands = eval.setup(&TestCaseData::default(), &fx.reference).unwrap();
        let verdict = eval.check(&commands).await.unwrap();

        assert!(!verdict.success);
        assert!(verdict.message.starts_with("Time limit exceeded:"));
    }

    #[tokio::test]
    async fn test_stdin_and_time_limit_reach_run_stage() {
        let fx = fixture();
        let runner = Arc::new(FakeRunner::new(|_, _| Ok(ok(""))));
        let mut eval = evaluation(&fx, runner.clone());
        let test_case = TestCaseData {
            stdin: Some("5\n".to_string()),
            expected_output: None,
            time_limit_ms: Some(250),
        };

        let commands = eval.setup(&test_case, &fx.reference).unwrap();
        eval.check(&commands).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].stdin, None);
        assert_eq!(calls[2].stdin.as_deref(), Some(b"5\n".as_slice()));
        assert_eq!(calls[0].timeout, Duration::from_secs(5));
        assert_eq!(calls[2].timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_setup_rejects_missing_reference() {
        let fx = fixture();
        let runner = Arc::new(FakeRunner::new(|_, _| Ok(ok(""))));
        let mut eval = evaluation(&fx, runner);

        let err = eval
            .setup(&TestCaseData::default(), &fx.work_root.join("Nope.java"))
            .unwrap_err();
        assert!(matches!(err, EvalError::Setup { .. }));
        assert!(err.to_string().starts_with("No file at"));

        eval.teardown();
        eval.teardown();
        assert_eq!(eval.state(), EvaluationState::TornDown);
    }

    #[tokio::test]
    async fn test_check_requires_setup() {
        let fx = fixture();
        let runner = Arc::new(FakeRunner::new(|_, _| Ok(ok(""))));
        let mut eval = evaluation(&fx, runner.clone());
        let commands = JavaEvaluator::new(&Toolchain::default()).commands(
            &fx.work_root,
            &fx.reference,
            &fx.work_root.join("Test.java"),
        );

        let err = eval.check(&commands).await.unwrap_err();
        assert!(matches!(err, EvalError::Lifecycle { .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_teardown_removes_submission_and_is_idempotent() {
        let fx = fixture();
        let runner = Arc::new(FakeRunner::new(|_, _| Ok(ok(""))));
        let mut eval = evaluation(&fx, runner);

        let commands = eval.setup(&TestCaseData::default(), &fx.reference).unwrap();
        assert!(commands.submission_path.is_file());

        eval.teardown();
        assert!(!commands.submission_path.exists());
        assert!(!commands.submission_path.parent().unwrap().exists());
        eval.teardown();
        assert!(fx.reference.exists());
    }

    #[test]
    fn test_submission_paths_never_collide() {
        let fx = fixture();
        let runner = Arc::new(FakeRunner::new(|_, _| Ok(ok(""))));
        let mut a = evaluation(&fx, runner.clone());
        let mut b = evaluation(&fx, runner);

        let ca = a.setup(&TestCaseData::default(), &fx.reference).unwrap();
        let cb = b.setup(&TestCaseData::default(), &fx.reference).unwrap();
        assert_ne!(ca.submission_path, cb.submission_path);
        assert_ne!(ca.submission_artifact, cb.submission_artifact);
    }
}
