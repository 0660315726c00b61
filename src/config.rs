//! Service configuration.
//!
//! Both deployables are configured through the environment, the same way the
//! sandbox pods receive their identity (`LAB_ID`, `LAB_LANGUAGE`,
//! `LAB_CODE_LINK`, `WORKSPACE_DIR`); service-level knobs use the
//! `QUESTLAB_` prefix. Defaults are sensible for local runs.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the in-sandbox runner service.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub port: u16,
    /// Root directory confining all workspace operations.
    pub workspace_dir: PathBuf,
    /// Identity of the lab instance this runner serves.
    pub lab_id: String,
    pub language: String,
    /// Durable-storage prefix for this instance's content.
    pub code_link: String,
    /// Root of the durable object store (mounted checkpoint volume).
    pub storage_root: PathBuf,
    pub ping_interval: Duration,
    /// Reconciliation worker cap: maximum storage operations in flight.
    pub sync_workers: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            workspace_dir: PathBuf::from("./workspace"),
            lab_id: String::new(),
            language: String::new(),
            code_link: String::new(),
            storage_root: PathBuf::from("./objects"),
            ping_interval: Duration::from_secs(10),
            sync_workers: 10,
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_or("QUESTLAB_RUNNER_PORT", defaults.port),
            workspace_dir: std::env::var("WORKSPACE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_dir),
            lab_id: std::env::var("LAB_ID").unwrap_or(defaults.lab_id),
            language: std::env::var("LAB_LANGUAGE").unwrap_or(defaults.language),
            code_link: std::env::var("LAB_CODE_LINK").unwrap_or(defaults.code_link),
            storage_root: std::env::var("QUESTLAB_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            ping_interval: Duration::from_secs(env_or(
                "QUESTLAB_PING_INTERVAL_SECS",
                defaults.ping_interval.as_secs(),
            )),
            sync_workers: env_or("QUESTLAB_SYNC_WORKERS", defaults.sync_workers),
        }
    }
}

/// Configuration for the admission gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    /// Process-wide ceiling on concurrently active lab instances.
    pub max_concurrent_labs: usize,
    /// Namespace handed to the container orchestrator.
    pub namespace: String,
    /// Domain under which runner pods are reachable as `{lab_id}.{domain}`.
    pub lab_domain: String,
    /// Root of the durable object store.
    pub storage_root: PathBuf,
    /// How long to wait for a runner's sync acknowledgement before moving on.
    pub sync_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_concurrent_labs: 5,
            namespace: "questlab".to_string(),
            lab_domain: "labs.localhost".to_string(),
            storage_root: PathBuf::from("./objects"),
            sync_timeout: Duration::from_secs(8),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_or("QUESTLAB_GATEWAY_PORT", defaults.port),
            max_concurrent_labs: env_or("QUESTLAB_MAX_CONCURRENT_LABS", defaults.max_concurrent_labs),
            namespace: std::env::var("QUESTLAB_NAMESPACE").unwrap_or(defaults.namespace),
            lab_domain: std::env::var("QUESTLAB_LAB_DOMAIN").unwrap_or(defaults.lab_domain),
            storage_root: std::env::var("QUESTLAB_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            sync_timeout: Duration::from_secs(env_or(
                "QUESTLAB_SYNC_TIMEOUT_SECS",
                defaults.sync_timeout.as_secs(),
            )),
        }
    }
}

/// Parse an env var, falling back to `default` when unset or malformed.
fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.port, 8081);
        assert_eq!(config.workspace_dir, PathBuf::from("./workspace"));
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.sync_workers, 10);
    }

    #[test]
    fn gateway_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_concurrent_labs, 5);
        assert_eq!(config.sync_timeout, Duration::from_secs(8));
    }

    #[test]
    fn env_or_parses_and_falls_back() {
        std::env::set_var("QUESTLAB_TEST_ENV_OR_A", "42");
        assert_eq!(env_or("QUESTLAB_TEST_ENV_OR_A", 7u16), 42);
        std::env::remove_var("QUESTLAB_TEST_ENV_OR_A");
        assert_eq!(env_or("QUESTLAB_TEST_ENV_OR_A", 7u16), 7);

        std::env::set_var("QUESTLAB_TEST_ENV_OR_B", "not-a-number");
        assert_eq!(env_or("QUESTLAB_TEST_ENV_OR_B", 9usize), 9);
        std::env::remove_var("QUESTLAB_TEST_ENV_OR_B");
    }
}
