//! Pipeline tests driven through a stub launcher.
//!
//! The stub is a shell script with the real launcher's calling
//! convention (`--config <path> -- program...`) that simply execs the
//! program, so the whole workspace/compile/run/capture path runs
//! without namespaces. Tests that need a live Redis are ignored.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Instant;

use crucible_common::config::Config;
use crucible_common::languages::LanguageSpec;
use crucible_common::types::{unix_now, Job, MAX_OUTPUT_BYTES};

use crate::engine;
use crate::executor::run_job;

struct Fixture {
    _root: tempfile::TempDir,
    config: Config,
}

fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let jobs_root = root.path().join("jobs");
    let config_dir = root.path().join("sandbox-configs");
    std::fs::create_dir_all(&config_dir).unwrap();

    // Stub launcher: drop `--config <path> --`, exec the program
    let launcher = root.path().join("stub-launcher");
    std::fs::write(&launcher, "#!/bin/sh\nshift 3\nexec \"$@\"\n").unwrap();
    std::fs::set_permissions(&launcher, std::fs::Permissions::from_mode(0o755)).unwrap();

    std::fs::write(config_dir.join("shell.cfg"), "cwd {{WORKSPACE}}\n").unwrap();

    let config = Config {
        redis_host: "127.0.0.1".to_string(),
        redis_port: 6379,
        redis_password: None,
        worker_concurrency: 1,
        jobs_root,
        sandbox_config_dir: config_dir,
        launcher_bin: launcher,
        result_ttl_seconds: 300,
        cache_ttl_seconds: 3600,
        rate_limit_max: 10,
        rate_limit_window_seconds: 60,
        rate_limit_free_cache_hits: false,
        launcher_log_filter: "nsjail".to_string(),
        api_addr: "127.0.0.1:0".to_string(),
    };

    Fixture { _root: root, config }
}

fn shell_spec(script: &str) -> LanguageSpec {
    LanguageSpec {
        id: "shell".to_string(),
        display_name: "Shell".to_string(),
        extension: "sh".to_string(),
        source_file: "main.sh".to_string(),
        is_compiled: false,
        compiler: None,
        compile_args: Vec::new(),
        runtime: Some(PathBuf::from("/bin/sh")),
        run_args: vec!["-c".to_string(), script.to_string()],
        artifact: String::new(),
        timeout_ms: 5_000,
        memory_limit_bytes: 64 * 1024 * 1024,
        max_processes: 4,
        sandbox_template: "shell.cfg".to_string(),
        env: Vec::new(),
    }
}

fn compiled_spec(compile_script: &str, run_script: &str) -> LanguageSpec {
    LanguageSpec {
        is_compiled: true,
        compiler: Some(PathBuf::from("/bin/sh")),
        compile_args: vec!["-c".to_string(), compile_script.to_string()],
        ..shell_spec(run_script)
    }
}

fn job(id: &str) -> Job {
    Job {
        id: id.to_string(),
        language: "shell".to_string(),
        code: "# placeholder source".to_string(),
        submitted_at: unix_now(),
        client_fingerprint: "test".to_string(),
        attempts: 0,
    }
}

fn workspace_path(config: &Config, job_id: &str) -> std::path::PathBuf {
    config.jobs_root.join(job_id)
}

#[tokio::test]
async fn test_successful_run_captures_stdout() {
    let fx = fixture();
    let spec = shell_spec("echo hello");
    let result = run_job(&job("job_ok"), &spec, &fx.config, Instant::now())
        .await
        .unwrap();

    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.stderr, "");
    assert_eq!(result.exit_code, 0);
    assert!(!result.compile_error);
    assert!(!result.error);
}

#[tokio::test]
async fn test_workspace_destroyed_after_run() {
    let fx = fixture();
    let spec = shell_spec("pwd");
    let id = "job_cleanup";
    let result = run_job(&job(id), &spec, &fx.config, Instant::now())
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert!(!workspace_path(&fx.config, id).exists());
}

#[tokio::test]
async fn test_source_file_lands_in_workspace() {
    let fx = fixture();
    // The program reads back the source file the pipeline wrote
    let spec = shell_spec("cat main.sh");
    let result = run_job(&job("job_source"), &spec, &fx.config, Instant::now())
        .await
        .unwrap();

    assert_eq!(result.stdout, "# placeholder source");
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn test_nonzero_exit_is_an_outcome() {
    let fx = fixture();
    let spec = shell_spec("echo err >&2; exit 2");
    let result = run_job(&job("job_fail"), &spec, &fx.config, Instant::now())
        .await
        .unwrap();

    assert_eq!(result.exit_code, 2);
    assert_eq!(result.stderr, "err\n");
    assert!(!result.compile_error);
    assert!(!result.error);
}

#[tokio::test]
async fn test_launcher_noise_filtered_from_stderr() {
    let fx = fixture();
    let spec = shell_spec("printf '[I] nsjail boot\\nuser line\\n' >&2");
    let result = run_job(&job("job_filter"), &spec, &fx.config, Instant::now())
        .await
        .unwrap();

    assert_eq!(result.stderr, "user line\n");
}

#[tokio::test]
async fn test_output_flood_is_killed() {
    let fx = fixture();
    let spec = shell_spec("while :; do echo xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx; done");
    let result = run_job(&job("job_flood"), &spec, &fx.config, Instant::now())
        .await
        .unwrap();

    assert_eq!(result.exit_code, -1);
    assert_eq!(result.stderr, engine::OUTPUT_LIMIT_MESSAGE);
    assert!(result.stdout.len() <= MAX_OUTPUT_BYTES);
    assert!(!workspace_path(&fx.config, "job_flood").exists());
}

#[tokio::test]
async fn test_compile_failure_skips_execution() {
    let fx = fixture();
    let spec = compiled_spec("echo boom >&2; exit 1", "echo should-not-run");
    let result = run_job(&job("job_cerr"), &spec, &fx.config, Instant::now())
        .await
        .unwrap();

    assert!(result.compile_error);
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stdout, "");
    assert!(result.stderr.contains("boom"));
}

#[tokio::test]
async fn test_compile_success_then_run() {
    let fx = fixture();
    let spec = compiled_spec("exit 0", "echo built");
    let result = run_job(&job("job_cok"), &spec, &fx.config, Instant::now())
        .await
        .unwrap();

    assert!(!result.compile_error);
    assert_eq!(result.stdout, "built\n");
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn test_missing_template_is_pipeline_error() {
    let fx = fixture();
    let mut spec = shell_spec("echo hi");
    spec.sandbox_template = "missing.cfg".to_string();

    let err = run_job(&job("job_notpl"), &spec, &fx.config, Instant::now())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("sandbox config"));
    assert!(!workspace_path(&fx.config, "job_notpl").exists());
}

#[tokio::test]
async fn test_missing_launcher_is_sandbox_failure() {
    let fx = fixture();
    let config = Config {
        launcher_bin: PathBuf::from("/nonexistent/launcher"),
        ..fx.config.clone()
    };
    let spec = shell_spec("echo hi");
    let result = run_job(&job("job_nolaunch"), &spec, &config, Instant::now())
        .await
        .unwrap();

    assert_eq!(result.exit_code, -1);
    assert!(result.error);
    assert!(result.stderr.contains("Sandbox launcher failed to start"));
}

#[tokio::test]
#[ignore] // ~5s wall clock: waits out the watchdog grace period
async fn test_wall_clock_timeout_kill() {
    let fx = fixture();
    let mut spec = shell_spec("sleep 30");
    spec.timeout_ms = 100;

    let result = run_job(&job("job_spin"), &spec, &fx.config, Instant::now())
        .await
        .unwrap();

    assert_eq!(result.exit_code, -1);
    assert_eq!(result.stderr, engine::EXECUTION_TIMEOUT_MESSAGE);
    assert!(!workspace_path(&fx.config, "job_spin").exists());
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_execute_job_persists_result_and_clears_status() {
    use crucible_common::languages::LanguageRegistry;
    use crucible_common::redis as store;

    let fx = fixture();
    let registry = LanguageRegistry::builtin();

    let client = redis::Client::open("redis://127.0.0.1:6379").expect("redis client");
    let mut conn = redis::aio::ConnectionManager::new(client)
        .await
        .expect("redis connection");

    let job = Job {
        id: crucible_common::types::new_job_id(),
        language: "python".to_string(),
        code: "print('hi')".to_string(),
        submitted_at: unix_now(),
        client_fingerprint: "test".to_string(),
        attempts: 0,
    };
    let job_id = job.id.clone();

    crate::executor::execute_job(job, &fx.config, &registry, &mut conn).await;

    let result = store::get_result(&mut conn, &job_id).await.unwrap();
    assert!(result.is_some());
    let status = store::get_status(&mut conn, &job_id).await.unwrap();
    assert!(status.is_none());
}
