use std::path::PathBuf;
use std::str::FromStr;

/// Service configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub worker_concurrency: usize,
    /// Root directory under which per-job workspaces are created.
    pub jobs_root: PathBuf,
    /// Directory holding per-language sandbox config templates.
    pub sandbox_config_dir: PathBuf,
    /// Path to the sandbox launcher binary.
    pub launcher_bin: PathBuf,
    pub result_ttl_seconds: u64,
    pub cache_ttl_seconds: u64,
    pub rate_limit_max: i64,
    pub rate_limit_window_seconds: u64,
    /// When set, cache hits do not consume rate-limit budget.
    pub rate_limit_free_cache_hits: bool,
    /// Substring identifying launcher log lines in captured stderr.
    pub launcher_log_filter: String,
    pub api_addr: String,
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            redis_host: env_string("REDIS_HOST", "127.0.0.1"),
            redis_port: env_parse("REDIS_PORT", 6379),
            redis_password: std::env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
            worker_concurrency: env_parse("WORKER_CONCURRENCY", 4),
            jobs_root: PathBuf::from(env_string("SANDBOX_JOBS", "/tmp/crucible-jobs")),
            sandbox_config_dir: PathBuf::from(env_string("SANDBOX_CONFIG_DIR", "config/sandbox")),
            launcher_bin: PathBuf::from(env_string("LAUNCHER_BIN", "nsjail")),
            result_ttl_seconds: env_parse("RESULT_TTL_SECONDS", 300),
            cache_ttl_seconds: env_parse("CACHE_TTL_SECONDS", 3600),
            rate_limit_max: env_parse("RATE_LIMIT_MAX", 10),
            rate_limit_window_seconds: env_parse("RATE_LIMIT_WINDOW_SECONDS", 60),
            rate_limit_free_cache_hits: env_bool("RATE_LIMIT_FREE_CACHE_HITS", false),
            launcher_log_filter: env_string("LAUNCHER_LOG_FILTER", "nsjail"),
            api_addr: env_string("API_ADDR", "0.0.0.0:3000"),
        }
    }

    pub fn redis_url(&self) -> String {
        match self.redis_password {
            Some(ref password) => {
                format!("redis://:{}@{}:{}", password, self.redis_host, self.redis_port)
            }
            None => format!("redis://{}:{}", self.redis_host, self.redis_port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            redis_host: "127.0.0.1".to_string(),
            redis_port: 6379,
            redis_password: None,
            worker_concurrency: 4,
            jobs_root: PathBuf::from("/tmp/crucible-jobs"),
            sandbox_config_dir: PathBuf::from("config/sandbox"),
            launcher_bin: PathBuf::from("nsjail"),
            result_ttl_seconds: 300,
            cache_ttl_seconds: 3600,
            rate_limit_max: 10,
            rate_limit_window_seconds: 60,
            rate_limit_free_cache_hits: false,
            launcher_log_filter: "nsjail".to_string(),
            api_addr: "0.0.0.0:3000".to_string(),
        }
    }

    #[test]
    fn test_redis_url_without_password() {
        assert_eq!(base_config().redis_url(), "redis://127.0.0.1:6379");
    }

    #[test]
    fn test_redis_url_with_password() {
        let config = Config {
            redis_password: Some("hunter2".to_string()),
            ..base_config()
        };
        assert_eq!(config.redis_url(), "redis://:hunter2@127.0.0.1:6379");
    }

    #[test]
    fn test_spec_defaults() {
        let config = base_config();
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.result_ttl_seconds, 300);
        assert_eq!(config.cache_ttl_seconds, 3600);
        assert_eq!(config.rate_limit_max, 10);
        assert_eq!(config.rate_limit_window_seconds, 60);
        assert!(!config.rate_limit_free_cache_hits);
    }
}
