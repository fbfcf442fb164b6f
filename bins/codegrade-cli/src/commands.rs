// CLI commands for evaluating submissions
use crate::SubmissionArgs;
use anyhow::{bail, Context, Result};
use codegrade_common::redis as queue;
use codegrade_common::{
    Config, EvaluationRequest, EvaluationResult, EvaluationStatus, Language, TestCaseData, Verdict,
};
use codegrade_engine::{set_registry, Dispatcher, LanguageRegistry};
use std::fs;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Read the submission and optional stdin into a request
fn build_request(args: &SubmissionArgs, config: &Config) -> Result<EvaluationRequest> {
    let source_code = fs::read_to_string(&args.submission)
        .with_context(|| format!("Failed to read submission {}", args.submission.display()))?;
    let stdin = args
        .stdin
        .as_ref()
        .map(|path| {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read stdin file {}", path.display()))
        })
        .transpose()?;
    let reference_path = args
        .reference
        .canonicalize()
        .with_context(|| format!("No file at {} or Incorrect path", args.reference.display()))?;

    Ok(EvaluationRequest {
        id: Uuid::new_v4(),
        language: args.language.clone(),
        test_case: TestCaseData {
            stdin,
            expected_output: None,
            time_limit_ms: args.time_limit_ms,
        },
        reference_path,
        source_code,
        timeout_ms: args.timeout_ms.unwrap_or(config.default_timeout_ms),
    })
}

fn print_verdict(verdict: &Verdict) {
    if verdict.success {
        println!("✅ {}", verdict.message);
    } else {
        println!("❌ {}", verdict.message);
    }
}

/// Evaluate locally; returns whether the answer was correct
pub async fn evaluate(args: &SubmissionArgs, json: bool) -> Result<bool> {
    let config = Config::from_env();
    let request = build_request(args, &config)?;
    let dispatcher = Dispatcher::new(set_registry(), config);

    let started = Instant::now();
    let verdict = dispatcher
        .evaluate(
            &request.language,
            &request.test_case,
            &request.reference_path,
            &request.source_code,
            Duration::from_millis(request.timeout_ms),
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        print_verdict(&verdict);
        println!("⏱  {}ms", started.elapsed().as_millis());
    }
    Ok(verdict.success)
}

/// Print every registered language and the evaluator behind it
pub fn list_languages() {
    let registry = set_registry();
    let ids = registry.language_ids();

    if ids.is_empty() {
        println!("No languages registered");
        return;
    }

    println!("📋 Registered languages:\n");
    println!("{:<10} {:<10}", "ID", "EVALUATOR");
    println!("{}", "-".repeat(21));
    for id in ids {
        if let Ok(evaluator) = registry.get_class(&id) {
            println!("{:<10} {:<10}", id, evaluator.to_string());
        }
    }
}

/// Queue a request; with `wait_secs > 0` poll for the worker's result
pub async fn submit(args: &SubmissionArgs, wait_secs: u64) -> Result<bool> {
    let config = Config::from_env();
    // Fail fast instead of parking the request on a queue nobody serves
    let language = resolve_language(&set_registry(), &args.language)?;

    let request = build_request(args, &config)?;
    let client = redis::Client::open(config.redis_url.as_str()).context("Invalid REDIS_URL")?;
    let mut conn = redis::aio::ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;

    queue::push_request(&mut conn, language, &request)
        .await
        .context("Failed to queue request")?;
    println!("🚀 Queued request {} on {}", request.id, queue::queue_name(language));

    if wait_secs == 0 {
        return Ok(true);
    }

    let deadline = Instant::now() + Duration::from_secs(wait_secs);
    while Instant::now() < deadline {
        if let Some(result) = queue::fetch_result(&mut conn, &request.id).await? {
            return Ok(report(&result));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    bail!("No result for {} after {}s", request.id, wait_secs)
}

/// Queues are keyed by the resolved language so aliases reach the same workers
fn resolve_language(registry: &LanguageRegistry, language_id: &str) -> Result<Language> {
    Ok(registry.get_class(language_id)?)
}

fn report(result: &EvaluationResult) -> bool {
    match (&result.status, &result.verdict) {
        (EvaluationStatus::Completed, Some(verdict)) => {
            print_verdict(verdict);
            println!("⏱  {}ms", result.elapsed_ms);
            verdict.success
        }
        _ => {
            println!(
                "⚠️  Request rejected: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
            false
        }
    }
}
