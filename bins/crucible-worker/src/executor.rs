//! Per-job pipeline: workspace, optional compile, sandboxed run,
//! result persistence, cache write-through, cleanup.
//!
//! The pipeline is split in two layers. `run_job` does the filesystem
//! and process work and knows nothing about Redis; `execute_job` wraps
//! it with status updates, result persistence, and the cache policy.
//! A job always ends with a stored result - infrastructure failures
//! are collapsed into one - so a polling client never waits forever.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use crucible_common::config::Config;
use crucible_common::languages::{LanguageRegistry, LanguageSpec};
use crucible_common::types::{fingerprint, unix_now, ExecutionResult, Job, StatusRecord};
use crucible_common::{cache, redis};
use tracing::{error, info, warn};

use crate::engine;
use crate::sandbox::{self, LauncherCommand};
use crate::workspace::Workspace;

/// Drive one job from pickup to persisted result.
pub async fn execute_job(
    job: Job,
    config: &Config,
    registry: &LanguageRegistry,
    conn: &mut ::redis::aio::ConnectionManager,
) {
    let started = Instant::now();

    // Mark processing first so pollers see progress. If Redis is
    // unavailable the run still proceeds; the result write below is
    // what clients ultimately wait on.
    if let Err(e) = redis::set_status(
        conn,
        &job.id,
        &StatusRecord::processing(unix_now()),
        config.result_ttl_seconds,
    )
    .await
    {
        warn!(job_id = %job.id, error = %e, "Failed to mark job processing");
    }

    let result = match registry.get(&job.language) {
        Some(spec) => match run_job(&job, spec, config, started).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    job_id = %job.id,
                    phase = "execution_failed",
                    error = %e,
                    "Job pipeline failed"
                );
                ExecutionResult::infrastructure(e.to_string(), elapsed_ms(started))
            }
        },
        // Unknown language in the queue means a registry mismatch
        // between API and worker builds
        None => ExecutionResult::infrastructure(
            format!("Unknown language in queue: {}", job.language),
            elapsed_ms(started),
        ),
    };

    info!(
        job_id = %job.id,
        phase = "persisting",
        exit_code = result.exit_code,
        compile_error = result.compile_error,
        execution_ms = result.execution_time_ms,
        "Storing result"
    );

    match redis::store_result(conn, &job.id, &result, config.result_ttl_seconds).await {
        Ok(()) => {
            info!(job_id = %job.id, phase = "completed", "Result persisted");
        }
        Err(e) => {
            error!(job_id = %job.id, phase = "persist_failed", error = %e, "Failed to persist result");
        }
    }

    let content_hash = fingerprint(&job.language, &job.code);
    match cache::store_on_success(conn, &content_hash, &result, config.cache_ttl_seconds).await {
        Ok(true) => info!(job_id = %job.id, "Result cached"),
        Ok(false) => {}
        Err(e) => warn!(job_id = %job.id, error = %e, "Failed to write cache"),
    }

    if let Err(e) = redis::delete_status(conn, &job.id).await {
        warn!(job_id = %job.id, error = %e, "Failed to delete status key");
    }
}

/// The Redis-free part of the pipeline: workspace, compile, sandboxed
/// run. The workspace guard removes the directory on every return
/// path.
pub async fn run_job(
    job: &Job,
    spec: &LanguageSpec,
    config: &Config,
    started: Instant,
) -> anyhow::Result<ExecutionResult> {
    let workspace =
        Workspace::create(&config.jobs_root, &job.id).context("workspace creation failed")?;

    workspace
        .write_file(&spec.source_file, job.code.as_bytes())
        .context("failed to write source file")?;

    if let Some(compile_argv) = spec.compile_argv() {
        if let Some(result) = compile(&compile_argv, spec, &workspace, started).await? {
            // Compile failed; report the outcome and skip execution
            return Ok(result);
        }
    }

    let rendered = sandbox::render_config(
        &config.sandbox_config_dir,
        &spec.sandbox_template,
        workspace.path(),
    )
    .await
    .context("failed to render sandbox config")?;

    let argv = LauncherCommand::new(&config.launcher_bin, &rendered)
        .program(spec.run_argv())
        .build();
    let mut command = engine::command_from_argv(&argv).map_err(|e| anyhow!(e))?;
    command.current_dir(workspace.path());
    for (key, value) in &spec.env {
        command.env(key, value);
    }

    let timeout = Duration::from_millis(spec.timeout_ms + engine::WALL_CLOCK_GRACE_MS);
    let outcome = match engine::run_captured(command, timeout).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // SandboxFailure: the launcher itself could not start
            return Ok(ExecutionResult::infrastructure(
                format!("Sandbox launcher failed to start: {}", e),
                elapsed_ms(started),
            ));
        }
    };

    let execution_time_ms = elapsed_ms(started);
    let stdout = engine::lossy_utf8(outcome.stdout);
    let mut stderr = engine::lossy_utf8(outcome.stderr);
    let mut exit_code = outcome.exit_code;

    if outcome.timed_out {
        exit_code = -1;
        stderr = engine::EXECUTION_TIMEOUT_MESSAGE.to_string();
    } else if outcome.output_overflow {
        exit_code = -1;
        stderr = engine::OUTPUT_LIMIT_MESSAGE.to_string();
    } else {
        stderr = engine::filter_launcher_noise(&stderr, &config.launcher_log_filter);
        if let Some(signal) = outcome.killed_by_signal {
            exit_code = -1;
            if stderr.is_empty() {
                stderr = format!("Killed by signal {}", signal);
            }
        }
    }

    Ok(ExecutionResult {
        stdout,
        stderr,
        exit_code,
        compile_error: false,
        execution_time_ms,
        cached: false,
        error: false,
    })
}

/// Run the compiler in the workspace. Returns `Some(result)` when
/// compilation failed and the job must stop with a compile-error
/// outcome, `None` on success.
async fn compile(
    compile_argv: &[String],
    spec: &LanguageSpec,
    workspace: &Workspace,
    started: Instant,
) -> anyhow::Result<Option<ExecutionResult>> {
    let mut command = engine::command_from_argv(compile_argv).map_err(|e| anyhow!(e))?;
    command.current_dir(workspace.path());
    for (key, value) in &spec.env {
        command.env(key, value);
    }

    let outcome = engine::run_captured(command, Duration::from_millis(engine::COMPILE_TIMEOUT_MS))
        .await
        .context("compiler spawn failed")?;

    if outcome.timed_out {
        return Ok(Some(ExecutionResult {
            stdout: String::new(),
            stderr: "Compilation timed out".to_string(),
            exit_code: -1,
            compile_error: true,
            execution_time_ms: elapsed_ms(started),
            cached: false,
            error: false,
        }));
    }

    if outcome.exit_code != 0 {
        // Diagnostics land on stderr for every toolchain we ship;
        // fall back to stdout just in case
        let mut diagnostics = engine::lossy_utf8(outcome.stderr);
        if diagnostics.is_empty() {
            diagnostics = engine::lossy_utf8(outcome.stdout);
        }
        return Ok(Some(ExecutionResult {
            stdout: String::new(),
            stderr: diagnostics,
            exit_code: outcome.exit_code,
            compile_error: true,
            execution_time_ms: elapsed_ms(started),
            cached: false,
            error: false,
        }));
    }

    Ok(None)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
