use crate::types::{ExecutionResult, Job, StatusRecord};
use redis::{AsyncCommands, RedisResult};

/// Redis key semantics - defines only semantics, not runtime logic.
/// Ensures API and worker never drift and keys stay deterministic.

pub const QUEUE_KEY: &str = "queue:code-execution";
pub const STATUS_PREFIX: &str = "job:status";
pub const RESULT_PREFIX: &str = "job:result";
pub const CACHE_PREFIX: &str = "cache";
pub const RATE_LIMIT_PREFIX: &str = "ratelimit";

pub fn status_key(job_id: &str) -> String {
    format!("{}:{}", STATUS_PREFIX, job_id)
}

pub fn result_key(job_id: &str) -> String {
    format!("{}:{}", RESULT_PREFIX, job_id)
}

pub fn cache_key(fingerprint: &str) -> String {
    format!("{}:{}", CACHE_PREFIX, fingerprint)
}

pub fn rate_limit_key(client_fingerprint: &str) -> String {
    format!("{}:{}", RATE_LIMIT_PREFIX, client_fingerprint)
}

fn serde_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

/// Push a job to the queue tail. RPUSH pairs with the worker's BLPOP
/// for FIFO semantics.
pub async fn push_job(conn: &mut redis::aio::ConnectionManager, job: &Job) -> RedisResult<()> {
    let payload = serde_json::to_string(job).map_err(serde_error)?;
    conn.rpush(QUEUE_KEY, payload).await
}

/// Blocking pop from the queue head. BLPOP is atomic across workers, so
/// a job id is handed to at most one of them. The timeout keeps the
/// dispatcher responsive to shutdown.
pub async fn pop_job(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<Job>> {
    let result: Option<(String, String)> = conn.blpop(QUEUE_KEY, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => {
            let job: Job = serde_json::from_str(&payload).map_err(serde_error)?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

pub async fn set_status(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &str,
    record: &StatusRecord,
    ttl_seconds: u64,
) -> RedisResult<()> {
    let payload = serde_json::to_string(record).map_err(serde_error)?;
    let _: () = conn.set_ex(status_key(job_id), payload, ttl_seconds).await?;
    Ok(())
}

pub async fn get_status(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &str,
) -> RedisResult<Option<StatusRecord>> {
    let payload: Option<String> = conn.get(status_key(job_id)).await?;
    match payload {
        Some(data) => {
            let record: StatusRecord = serde_json::from_str(&data).map_err(serde_error)?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Completed jobs carry their state in the result key alone.
pub async fn delete_status(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &str,
) -> RedisResult<()> {
    let _: () = conn.del(status_key(job_id)).await?;
    Ok(())
}

pub async fn store_result(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &str,
    result: &ExecutionResult,
    ttl_seconds: u64,
) -> RedisResult<()> {
    let payload = serde_json::to_string(result).map_err(serde_error)?;
    let _: () = conn.set_ex(result_key(job_id), payload, ttl_seconds).await?;
    Ok(())
}

pub async fn get_result(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &str,
) -> RedisResult<Option<ExecutionResult>> {
    let payload: Option<String> = conn.get(result_key(job_id)).await?;
    match payload {
        Some(data) => {
            let result: ExecutionResult = serde_json::from_str(&data).map_err(serde_error)?;
            Ok(Some(result))
        }
        None => Ok(None),
    }
}

pub async fn cache_get(
    conn: &mut redis::aio::ConnectionManager,
    fingerprint: &str,
) -> RedisResult<Option<ExecutionResult>> {
    let payload: Option<String> = conn.get(cache_key(fingerprint)).await?;
    match payload {
        Some(data) => {
            let result: ExecutionResult = serde_json::from_str(&data).map_err(serde_error)?;
            Ok(Some(result))
        }
        None => Ok(None),
    }
}

pub async fn cache_put(
    conn: &mut redis::aio::ConnectionManager,
    fingerprint: &str,
    result: &ExecutionResult,
    ttl_seconds: u64,
) -> RedisResult<()> {
    let payload = serde_json::to_string(result).map_err(serde_error)?;
    let _: () = conn.set_ex(cache_key(fingerprint), payload, ttl_seconds).await?;
    Ok(())
}

/// Atomic increment of a caller's window counter. The expiration is set
/// only on the 0 -> 1 transition so the window never slides.
pub async fn rate_limit_hit(
    conn: &mut redis::aio::ConnectionManager,
    client_fingerprint: &str,
    window_seconds: u64,
) -> RedisResult<i64> {
    let key = rate_limit_key(client_fingerprint);
    let count: i64 = conn.incr(&key, 1).await?;
    if count == 1 {
        let _: () = conn.expire(&key, window_seconds as i64).await?;
    }
    Ok(count)
}
