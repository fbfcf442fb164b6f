use crate::types::{EvaluationRequest, EvaluationResult, Language};
use redis::aio::ConnectionLike;
use redis::RedisResult;

/// Redis queue semantics
/// Keeps the worker and every producer agreeing on key names

pub const QUEUE_PREFIX: &str = "codegrade:queue";
pub const RESULT_PREFIX: &str = "codegrade:result";

/// Generate deterministic queue name for a resolved language.
/// Aliases of the same language always share one queue.
pub fn queue_name(language: Language) -> String {
    format!("{}:{}", QUEUE_PREFIX, language)
}

/// Generate result key for a request
pub fn result_key(request_id: &uuid::Uuid) -> String {
    format!("{}:{}", RESULT_PREFIX, request_id)
}

/// Append a request to the queue of the language it resolved to
pub async fn push_request<C: ConnectionLike>(
    conn: &mut C,
    language: Language,
    request: &EvaluationRequest,
) -> RedisResult<()> {
    let payload = serde_json::to_string(request).map_err(json_error)?;
    redis::cmd("RPUSH")
        .arg(queue_name(language))
        .arg(payload)
        .query_async(conn)
        .await
}

/// Blocking pop across one or more queues
///
/// Returns `Ok(None)` when `timeout_secs` elapses with nothing queued, which
/// lets the caller check for shutdown between polls.
pub async fn pop_request<C: ConnectionLike>(
    conn: &mut C,
    queues: &[String],
    timeout_secs: u64,
) -> RedisResult<Option<EvaluationRequest>> {
    let popped: Option<(String, String)> = redis::cmd("BLPOP")
        .arg(queues)
        .arg(timeout_secs)
        .query_async(conn)
        .await?;

    match popped {
        Some((_queue, payload)) => serde_json::from_str(&payload)
            .map(Some)
            .map_err(json_error),
        None => Ok(None),
    }
}

/// Store a result with expiry
pub async fn store_result<C: ConnectionLike>(
    conn: &mut C,
    result: &EvaluationResult,
    ttl_secs: u64,
) -> RedisResult<()> {
    let payload = serde_json::to_string(result).map_err(json_error)?;
    redis::cmd("SET")
        .arg(result_key(&result.request_id))
        .arg(payload)
        .arg("EX")
        .arg(ttl_secs.max(1))
        .query_async(conn)
        .await
}

/// Fetch a stored result, `None` while the request is still pending
pub async fn fetch_result<C: ConnectionLike>(
    conn: &mut C,
    request_id: &uuid::Uuid,
) -> RedisResult<Option<EvaluationResult>> {
    let payload: Option<String> = redis::cmd("GET")
        .arg(result_key(request_id))
        .query_async(conn)
        .await?;

    payload
        .map(|p| serde_json::from_str(&p).map_err(json_error))
        .transpose()
}

fn json_error(err: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((
        redis::ErrorKind::TypeError,
        "invalid JSON payload",
        err.to_string(),
    ))
}
