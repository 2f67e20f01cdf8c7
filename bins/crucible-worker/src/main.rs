mod engine;
mod executor;
mod sandbox;
mod workspace;

#[cfg(test)]
mod executor_tests;

use std::sync::Arc;

use crucible_common::config::Config;
use crucible_common::languages::LanguageRegistry;
use crucible_common::redis;
use tokio::signal;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Crucible worker booting...");

    let config = Arc::new(Config::from_env());
    let registry = Arc::new(LanguageRegistry::builtin());

    info!("Supported languages: {:?}", registry.ids());
    info!("Jobs root: {}", config.jobs_root.display());
    info!("Sandbox launcher: {}", config.launcher_bin.display());
    info!("Execution slots: {}", config.worker_concurrency);

    if config.launcher_bin.is_absolute() && !config.launcher_bin.exists() {
        warn!(
            "Launcher binary not found at {} - jobs will fail until it is installed",
            config.launcher_bin.display()
        );
    }

    // Connect to Redis
    let redis_url = config.redis_url();
    let client = ::redis::Client::open(redis_url.as_str())?;
    let conn = ::redis::aio::ConnectionManager::new(client).await?;

    info!("Connected to Redis: {}:{}", config.redis_host, config.redis_port);
    info!("Worker is READY - waiting for jobs from queue: {}", redis::QUEUE_KEY);

    // Setup graceful shutdown
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        warn!("Received SIGTERM/CTRL+C - initiating graceful shutdown");
        warn!("In-flight jobs will finish; the dispatcher stops pulling");
    };

    tokio::select! {
        _ = dispatch_loop(conn, config, registry) => {},
        _ = shutdown => {},
    }

    info!("Worker shutdown complete");
    Ok(())
}

/// Dispatcher: one loop blocks on the queue and hands jobs to bounded
/// execution slots. When every slot is busy the loop waits on the
/// semaphore, so backpressure accumulates in the queue rather than in
/// worker memory.
async fn dispatch_loop(
    mut conn: ::redis::aio::ConnectionManager,
    config: Arc<Config>,
    registry: Arc<LanguageRegistry>,
) -> anyhow::Result<()> {
    let slots = Arc::new(Semaphore::new(config.worker_concurrency));

    loop {
        let permit = slots.clone().acquire_owned().await?;

        debug!("Worker IDLE - waiting for job from queue");

        // 1s poll keeps shutdown responsive
        match redis::pop_job(&mut conn, 1.0).await {
            Ok(Some(job)) => {
                info!(
                    job_id = %job.id,
                    language = %job.language,
                    source_size = job.code.len(),
                    phase = "dequeued",
                    "Worker BUSY - processing job"
                );

                let mut task_conn = conn.clone();
                let config = config.clone();
                let registry = registry.clone();
                tokio::spawn(async move {
                    let _slot = permit;
                    executor::execute_job(job, &config, &registry, &mut task_conn).await;
                });
            }
            Ok(None) => {
                // Poll timeout - release the slot and loop
                drop(permit);
            }
            Err(e) => {
                drop(permit);
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}
