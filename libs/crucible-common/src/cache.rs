//! Content cache policy over the key/value store.
//!
//! Read-through on submission, write-through on successful completion.
//! Failures, non-zero exits, and compile errors are never written, so
//! a cache entry always proves a clean run happened within the TTL.

use redis::RedisResult;
use tracing::debug;

use crate::redis as store;
use crate::types::ExecutionResult;

/// Look up a submission fingerprint. A hit comes back stamped
/// `cached: true`, ready to serve.
pub async fn lookup(
    conn: &mut redis::aio::ConnectionManager,
    fingerprint: &str,
) -> RedisResult<Option<ExecutionResult>> {
    let mut result = match store::cache_get(conn, fingerprint).await? {
        Some(result) => result,
        None => return Ok(None),
    };
    debug!(fingerprint, "cache hit");
    result.cached = true;
    Ok(Some(result))
}

/// Write-through after a worker run. Returns whether the entry was
/// written. Concurrent duplicate writes of identical content are
/// benign; last write wins with an equivalent value.
pub async fn store_on_success(
    conn: &mut redis::aio::ConnectionManager,
    fingerprint: &str,
    result: &ExecutionResult,
    ttl_seconds: u64,
) -> RedisResult<bool> {
    if !result.is_cacheable() {
        return Ok(false);
    }
    store::cache_put(conn, fingerprint, result, ttl_seconds).await?;
    debug!(fingerprint, "cached result");
    Ok(true)
}
