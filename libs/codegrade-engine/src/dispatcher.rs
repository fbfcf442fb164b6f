/// Evaluation Dispatcher - High-Level Orchestration
///
/// **Responsibility:**
/// Resolve the language, build its evaluator, run setup → check → teardown
/// in order and bound the whole thing with a hard wall-clock ceiling.
///
/// This module is the glue layer - it knows nothing about:
/// - How processes run (runner's job)
/// - Which commands a language needs (evaluator's job)
use crate::error::Result;
use crate::evaluator::Evaluation;
use crate::languages::build_evaluator;
use crate::registry::LanguageRegistry;
use crate::runner::{LocalRunner, ProcessRunner};
use codegrade_common::{
    Config, EvaluationRequest, EvaluationResult, EvaluationStatus, FailureKind, TestCaseData,
    Verdict,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Process stages a single evaluation may run
const STAGE_COUNT: u32 = 3;

pub struct Dispatcher {
    registry: Arc<LanguageRegistry>,
    runner: Arc<dyn ProcessRunner>,
    config: Config,
}

impl Dispatcher {
    /// Dispatcher running tools as local processes
    pub fn new(registry: Arc<LanguageRegistry>, config: Config) -> Self {
        let runner = Arc::new(LocalRunner::from_config(&config));
        Self::with_runner(registry, runner, config)
    }

    pub fn with_runner(
        registry: Arc<LanguageRegistry>,
        runner: Arc<dyn ProcessRunner>,
        config: Config,
    ) -> Self {
        Self {
            registry,
            runner,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<LanguageRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Wall-clock budget for a whole evaluation given the per-process timeout
    fn ceiling(&self, process_timeout: Duration) -> Duration {
        let grace = Duration::from_millis(self.config.process_grace_ms);
        // A timed out stage may spend one grace period after SIGTERM and one after SIGKILL
        let budget = (process_timeout + grace * 2) * STAGE_COUNT + grace;
        budget.min(Duration::from_millis(self.config.max_evaluation_ms.max(1)))
    }

    /// Evaluate one submission.
    ///
    /// Only a misconfigured request is an `Err` ([`crate::EvalError::UnknownLanguage`],
    /// [`crate::EvalError::Setup`]). Everything the submission can cause,
    /// including running out of time, comes back as a failed [`Verdict`].
    pub async fn evaluate(
        &self,
        language_id: &str,
        test_case: &TestCaseData,
        reference_path: &Path,
        submission_source: &str,
        timeout: Duration,
    ) -> Result<Verdict> {
        let language = self.registry.get_class(language_id)?;
        let timeout_ms = self
            .config
            .clamp_timeout_ms(timeout.as_millis().min(u64::MAX as u128) as u64);
        let process_timeout = Duration::from_millis(timeout_ms);
        let ceiling = self.ceiling(process_timeout);

        let mut evaluation = Evaluation::new(
            build_evaluator(language, &self.config.toolchain),
            self.runner.clone(),
            &self.config.work_root,
            submission_source,
            process_timeout,
        );
        let evaluation_id = evaluation.id();

        tracing::info!(
            evaluation_id = %evaluation_id,
            language_id = language_id,
            language = %language,
            timeout_ms = timeout_ms,
            ceiling_ms = ceiling.as_millis() as u64,
            "dispatching evaluation"
        );

        let outcome = tokio::time::timeout(ceiling, async {
            let commands = evaluation.setup(test_case, reference_path)?;
            evaluation.check(&commands).await
        })
        .await;
        evaluation.teardown();

        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    evaluation_id = %evaluation_id,
                    ceiling_ms = ceiling.as_millis() as u64,
                    "evaluation exceeded its wall-clock ceiling"
                );
                Ok(Verdict::labelled(
                    FailureKind::Timeout,
                    &format!("evaluation exceeded {}ms", ceiling.as_millis()),
                ))
            }
        }
    }

    /// Evaluate a queued request; rejected requests become error results
    pub async fn handle(&self, request: &EvaluationRequest) -> EvaluationResult {
        let started = Instant::now();
        let outcome = self
            .evaluate(
                &request.language,
                &request.test_case,
                &request.reference_path,
                &request.source_code,
                Duration::from_millis(request.timeout_ms),
            )
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(verdict) => EvaluationResult {
                request_id: request.id,
                language: request.language.clone(),
                status: EvaluationStatus::Completed,
                verdict: Some(verdict),
                error: None,
                elapsed_ms,
            },
            Err(e) => {
                tracing::warn!(request_id = %request.id, error = %e, "request rejected");
                EvaluationResult {
                    request_id: request.id,
                    language: request.language.clone(),
                    status: EvaluationStatus::Rejected,
                    verdict: None,
                    error: Some(e.to_string()),
                    elapsed_ms,
                }
            }
        }
    }
}
