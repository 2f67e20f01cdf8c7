//! Fixed-window rate limiter over the key/value store.
//!
//! Increment-then-check: the counter moves first, the decision reads
//! the post-increment value. Concurrent callers may overshoot the
//! limit by at most (N_concurrent - 1), which is accepted.

use redis::RedisResult;

use crate::redis as store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub count: i64,
    pub remaining: i64,
}

/// Pure decision over a post-increment counter value. Reject when the
/// pre-increment value was already at the limit.
pub fn decide(count: i64, max: i64) -> Decision {
    Decision {
        allowed: count <= max,
        count,
        remaining: (max - count).max(0),
    }
}

/// Charge one request against the caller's window and decide.
pub async fn check(
    conn: &mut redis::aio::ConnectionManager,
    client_fingerprint: &str,
    max: i64,
    window_seconds: u64,
) -> RedisResult<Decision> {
    let count = store::rate_limit_hit(conn, client_fingerprint, window_seconds).await?;
    Ok(decide(count, max))
}
