use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Maximum accepted submission size in bytes.
pub const MAX_CODE_BYTES: usize = 65_536;

/// Cap applied independently to captured stdout and stderr.
pub const MAX_OUTPUT_BYTES: usize = 65_536;

/// A queued execution job. The queue entry is the whole record, so a
/// worker crash before the first status update orphans nothing beyond
/// the key TTLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub language: String,
    pub code: String,
    pub submitted_at: u64,
    /// One-way hash of the caller's network identifier, for observability.
    pub client_fingerprint: String,
    /// Attempt hint only; every pop is treated as a fresh attempt.
    #[serde(default)]
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Absent,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Absent => "absent",
        };
        write!(f, "{}", s)
    }
}

/// Payload stored under `job:status:<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
}

impl StatusRecord {
    pub fn pending(created_at: u64) -> Self {
        Self {
            status: JobStatus::Pending,
            created_at: Some(created_at),
            started_at: None,
        }
    }

    pub fn processing(started_at: u64) -> Self {
        Self {
            status: JobStatus::Processing,
            created_at: None,
            started_at: Some(started_at),
        }
    }
}

/// Outcome of one execution, as persisted and as served to clients.
///
/// Compile and runtime failures are outcomes, not errors: they travel
/// through this record with `compile_error` set or a non-zero
/// `exit_code`. Exit code -1 is reserved for watchdog kills and
/// internal failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub compile_error: bool,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub error: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl ExecutionResult {
    /// Only clean runs enter the content cache.
    pub fn is_cacheable(&self) -> bool {
        self.exit_code == 0 && !self.compile_error && !self.error
    }

    /// Result recorded when the pipeline itself failed, so a polling
    /// client never waits forever.
    pub fn infrastructure(message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            exit_code: -1,
            compile_error: false,
            execution_time_ms,
            cached: false,
            error: true,
        }
    }
}

static JOB_ID_PATTERN: OnceLock<Regex> = OnceLock::new();

fn job_id_pattern() -> &'static Regex {
    JOB_ID_PATTERN
        .get_or_init(|| Regex::new(r"^(job_|cached_)[A-Za-z0-9._]+$").expect("job id pattern"))
}

/// Fresh id for an asynchronous job. UUIDv4 carries 122 random bits, so
/// collisions across processes and clock resets are not a concern.
pub fn new_job_id() -> String {
    format!("job_{}", Uuid::new_v4().simple())
}

/// Fresh id for a synchronous cache hit. The prefix distinguishes the
/// two submission paths in every client-visible surface.
pub fn new_cached_id() -> String {
    format!("cached_{}", Uuid::new_v4().simple())
}

pub fn is_valid_job_id(id: &str) -> bool {
    job_id_pattern().is_match(id)
}

/// Content fingerprint over `language ':' code`. The separator cannot
/// appear in a language identifier, so distinct submissions never
/// collide by concatenation.
pub fn fingerprint(language: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(language.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// One-way hash of a caller identifier (rate-limit key, job field).
pub fn client_fingerprint(identifier: &str) -> String {
    let digest = Sha256::digest(identifier.as_bytes());
    hex::encode(&digest[..16])
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
