use anyhow::Context;
use codegrade_common::redis as queue;
use codegrade_common::{Config, EvaluationResult, EvaluationStatus};
use codegrade_engine::{set_registry, Dispatcher, LanguageRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// BLPOP timeout, short enough to notice shutdown promptly
const POLL_TIMEOUT_SECS: u64 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Codegrade worker booting...");

    let config = Config::from_env();
    let registry = set_registry();

    // Languages served by this worker, e.g. WORKER_LANGUAGE=java,cpp
    let languages = std::env::var("WORKER_LANGUAGE").unwrap_or_else(|_| "java".to_string());
    let queues = queues_for(&languages, &registry)?;

    let client = ::redis::Client::open(config.redis_url.as_str())
        .context("invalid REDIS_URL")?;
    // BLPOP parks its connection, so results go out on a second one
    let pop_conn = ::redis::aio::ConnectionManager::new(client.clone())
        .await
        .context("failed to connect to Redis")?;
    let result_conn = ::redis::aio::ConnectionManager::new(client)
        .await
        .context("failed to connect to Redis")?;

    info!(redis_url = %config.redis_url, "Connected to Redis");
    info!(queues = ?queues, work_root = %config.work_root.display(), "Listening for evaluation requests");

    let dispatcher = Arc::new(Dispatcher::new(registry, config.clone()));
    let mut in_flight = JoinSet::new();

    // Setup graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, draining in-flight evaluations...");
    };

    tokio::select! {
        result = worker_loop(pop_conn, result_conn, &queues, dispatcher, &config, &mut in_flight) => result?,
        _ = shutdown => {},
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "evaluation task failed");
        }
    }

    info!("Worker shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolve a comma separated language list into queue names.
/// Every entry must be registered; a worker never serves an unknown queue.
fn queues_for(languages: &str, registry: &LanguageRegistry) -> anyhow::Result<Vec<String>> {
    let mut queues = Vec::new();
    for language_id in languages.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        let language = registry.get_class(language_id).with_context(|| {
            format!(
                "invalid WORKER_LANGUAGE entry '{}' (valid options: {})",
                language_id,
                registry.language_ids().join(", ")
            )
        })?;
        info!(language_id = language_id, language = %language, "Worker configured for language");

        let name = queue::queue_name(language);
        if !queues.contains(&name) {
            queues.push(name);
        }
    }
    if queues.is_empty() {
        anyhow::bail!("WORKER_LANGUAGE does not name any language");
    }
    Ok(queues)
}

async fn worker_loop(
    mut pop_conn: ::redis::aio::ConnectionManager,
    result_conn: ::redis::aio::ConnectionManager,
    queues: &[String],
    dispatcher: Arc<Dispatcher>,
    config: &Config,
    in_flight: &mut JoinSet<()>,
) -> anyhow::Result<()> {
    let permits = Arc::new(Semaphore::new(config.max_parallel_evaluations.max(1)));

    loop {
        // Take a slot before popping so excess work stays queued for other workers
        let permit = permits.clone().acquire_owned().await?;

        while let Some(joined) = in_flight.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "evaluation task failed");
            }
        }

        match queue::pop_request(&mut pop_conn, queues, POLL_TIMEOUT_SECS).await {
            Ok(Some(request)) => {
                info!(
                    request_id = %request.id,
                    language = %request.language,
                    timeout_ms = request.timeout_ms,
                    source_bytes = request.source_code.len(),
                    "Received evaluation request"
                );

                let dispatcher = dispatcher.clone();
                let mut conn = result_conn.clone();
                let ttl_secs = config.result_ttl_secs;
                in_flight.spawn(async move {
                    let result = dispatcher.handle(&request).await;
                    log_result(&result);
                    if let Err(e) = queue::store_result(&mut conn, &result, ttl_secs).await {
                        error!(request_id = %result.request_id, error = %e, "failed to store result");
                    }
                    drop(permit);
                });
            }
            Ok(None) => {
                // Timeout - check for shutdown
                continue;
            }
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

fn log_result(result: &EvaluationResult) {
    match (&result.status, &result.verdict) {
        (EvaluationStatus::Completed, Some(verdict)) => info!(
            request_id = %result.request_id,
            language = %result.language,
            success = verdict.success,
            kind = ?verdict.failure_kind(),
            elapsed_ms = result.elapsed_ms,
            "Evaluation complete"
        ),
        _ => warn!(
            request_id = %result.request_id,
            language = %result.language,
            error = result.error.as_deref().unwrap_or("unknown"),
            elapsed_ms = result.elapsed_ms,
            "Evaluation rejected"
        ),
    }
}
