// HTTP route handlers for the Crucible API

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use crucible_common::languages::PublicLanguage;
use crucible_common::types::{
    client_fingerprint, fingerprint, new_cached_id, new_job_id, unix_now, ExecutionResult,
    is_valid_job_id, Job, JobStatus, StatusRecord, MAX_CODE_BYTES,
};
use crucible_common::{cache, ratelimit, redis};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub language: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub job_id: String,
    /// "queued" for enqueued jobs, "completed" for inline cache hits.
    pub status: &'static str,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
}

/// POST /execute - validate, rate-limit, consult the cache, enqueue
pub async fn submit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<ExecuteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ExecuteRequest { language, code } = payload;

    if !state.registry.has(&language) {
        return Err(ApiError::Validation(format!(
            "Unsupported language: {}",
            language
        )));
    }
    if code.is_empty() {
        return Err(ApiError::Validation("Code must not be empty".to_string()));
    }
    if code.len() > MAX_CODE_BYTES {
        return Err(ApiError::Validation(format!(
            "Code exceeds maximum size of {} bytes",
            MAX_CODE_BYTES
        )));
    }

    let client_key = client_fingerprint(&addr.ip().to_string());
    let content_hash = fingerprint(&language, &code);
    let mut conn = state.redis.clone();
    let config = &state.config;

    // Default policy: cache hits still cost budget, so identical
    // submissions cannot be used to probe the cache for free.
    if !config.rate_limit_free_cache_hits {
        charge_rate_limit(&mut conn, &client_key, &state).await?;
    }

    if let Some(result) = cache::lookup(&mut conn, &content_hash)
        .await
        .map_err(ApiError::internal)?
    {
        let job_id = new_cached_id();
        info!(job_id = %job_id, language = %language, "Cache hit served inline");
        return Ok((
            StatusCode::OK,
            Json(SubmitResponse {
                success: true,
                job_id,
                status: "completed",
                cached: true,
                result: Some(result),
            }),
        ));
    }

    if config.rate_limit_free_cache_hits {
        charge_rate_limit(&mut conn, &client_key, &state).await?;
    }

    let job_id = new_job_id();
    let now = unix_now();

    redis::set_status(
        &mut conn,
        &job_id,
        &StatusRecord::pending(now),
        config.result_ttl_seconds,
    )
    .await
    .map_err(ApiError::internal)?;

    let job = Job {
        id: job_id.clone(),
        language: language.clone(),
        code,
        submitted_at: now,
        client_fingerprint: client_key,
        attempts: 0,
    };

    redis::push_job(&mut conn, &job)
        .await
        .map_err(ApiError::internal)?;

    info!(
        job_id = %job_id,
        language = %language,
        source_size = job.code.len(),
        "Job queued"
    );

    Ok((
        StatusCode::OK,
        Json(SubmitResponse {
            success: true,
            job_id,
            status: "queued",
            cached: false,
            result: None,
        }),
    ))
}

async fn charge_rate_limit(
    conn: &mut ::redis::aio::ConnectionManager,
    client_key: &str,
    state: &AppState,
) -> Result<(), ApiError> {
    let decision = ratelimit::check(
        conn,
        client_key,
        state.config.rate_limit_max,
        state.config.rate_limit_window_seconds,
    )
    .await
    .map_err(ApiError::internal)?;

    if !decision.allowed {
        warn!(client = client_key, count = decision.count, "Rate limit exceeded");
        return Err(ApiError::RateLimited);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
}

/// GET /status?job_id=... - result key first, then status key, then 404
pub async fn status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = query.job_id;

    if !is_valid_job_id(&job_id) {
        return Err(ApiError::Validation("Invalid job id format".to_string()));
    }

    let mut conn = state.redis.clone();

    if let Some(result) = redis::get_result(&mut conn, &job_id)
        .await
        .map_err(ApiError::internal)?
    {
        return Ok(Json(StatusResponse {
            success: true,
            job_id,
            status: JobStatus::Completed,
            created_at: None,
            result: Some(result),
        }));
    }

    if let Some(record) = redis::get_status(&mut conn, &job_id)
        .await
        .map_err(ApiError::internal)?
    {
        return Ok(Json(StatusResponse {
            success: true,
            job_id,
            status: record.status,
            created_at: record.created_at.or(record.started_at),
            result: None,
        }));
    }

    Err(ApiError::NotFound)
}

#[derive(Debug, Serialize)]
pub struct RateLimitInfo {
    pub max: i64,
    pub window_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct LanguagesResponse {
    pub success: bool,
    pub languages: BTreeMap<String, PublicLanguage>,
    pub rate_limit: RateLimitInfo,
}

/// GET /languages - public registry view plus rate-limit parameters
pub async fn languages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(LanguagesResponse {
        success: true,
        languages: state.registry.public_view(),
        rate_limit: RateLimitInfo {
            max: state.config.rate_limit_max,
            window_seconds: state.config.rate_limit_window_seconds,
        },
    })
}

/// GET /health - liveness probe
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_response_omits_result_when_queued() {
        let response = SubmitResponse {
            success: true,
            job_id: "job_abc".to_string(),
            status: "queued",
            cached: false,
            result: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"queued\""));
        assert!(json.contains("\"cached\":false"));
        assert!(!json.contains("result"));
    }

    #[test]
    fn test_cached_response_shape() {
        let response = SubmitResponse {
            success: true,
            job_id: new_cached_id(),
            status: "completed",
            cached: true,
            result: Some(ExecutionResult {
                stdout: "hi\n".to_string(),
                stderr: String::new(),
                exit_code: 0,
                compile_error: false,
                execution_time_ms: 3,
                cached: true,
                error: false,
            }),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"job_id\":\"cached_"));
        assert!(json.contains("\"status\":\"completed\""));
        assert!(json.contains("\"cached\":true"));
        assert!(json.contains("\"stdout\":\"hi\\n\""));
    }

    #[test]
    fn test_status_response_for_pending_carries_created_at() {
        let response = StatusResponse {
            success: true,
            job_id: "job_x".to_string(),
            status: JobStatus::Pending,
            created_at: Some(1_700_000_000),
            result: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("created_at"));
        assert!(!json.contains("result"));
    }

    #[test]
    fn test_code_size_boundary() {
        // Exactly at the cap is accepted, one past is not; mirrored in
        // the handler's check on byte length.
        assert!("x".repeat(MAX_CODE_BYTES).len() <= MAX_CODE_BYTES);
        assert!("x".repeat(MAX_CODE_BYTES + 1).len() > MAX_CODE_BYTES);
    }
}
