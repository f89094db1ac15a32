//! Daemon configuration
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML file,
//! then `TUNEKEEPER_*` environment variables (`__` separates nested keys, so
//! `TUNEKEEPER_RPC__PORT=9600` sets `rpc.port`).

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tunekeeper_core::application::constants::DEFAULT_POLL_INTERVAL;
use tunekeeper_core::application::LifecycleSettings;

const ENV_PREFIX: &str = "TUNEKEEPER";
const FALLBACK_DB_PATH: &str = "~/.tunekeeper/tunekeeper.db";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9531;
const DEFAULT_PROVIDER_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EXPORTER_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// SQLite file, `~` allowed
    pub database_path: String,
    pub log_format: LogFormat,
    /// Directory for daily rolling log files; stdout only when unset
    pub log_dir: Option<String>,
    pub rpc: RpcSection,
    pub poller: PollerSection,
    pub provider: ProviderSection,
    pub exporter: ExporterSection,
    pub notifier: NotifierSection,
    pub lifecycle: LifecycleSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcSection {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerSection {
    /// Built-in poll timer period; 0 leaves polling to `poller.run.v1`
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterSection {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotifierSection {
    /// Chat webhook; notifications are only logged when unset
    pub webhook_url: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_format: LogFormat::default(),
            log_dir: None,
            rpc: RpcSection::default(),
            poller: PollerSection::default(),
            provider: ProviderSection::default(),
            exporter: ExporterSection::default(),
            notifier: NotifierSection::default(),
            lifecycle: LifecycleSettings::default(),
        }
    }
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
        }
    }
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVIDER_URL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl Default for ExporterSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EXPORTER_URL.to_string(),
            api_key: None,
        }
    }
}

/// Platform data dir (e.g. `~/.local/share/tunekeeper/tunekeeper.db`)
fn default_database_path() -> String {
    ProjectDirs::from("dev", "tunekeeper", "tunekeeper")
        .map(|dirs| {
            dirs.data_dir()
                .join("tunekeeper.db")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| FALLBACK_DB_PATH.to_string())
}

impl DaemonConfig {
    /// Load defaults, then `path` (if any), then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(environment(None))
            .build()
            .context("Failed to read configuration")?;
        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let mut cfg: DaemonConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.database_path = shellexpand::tilde(&cfg.database_path).into_owned();
        if let Some(dir) = &cfg.log_dir {
            cfg.log_dir = Some(shellexpand::tilde(dir).into_owned());
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.database_path.trim().is_empty() {
            bail!("database_path must not be empty");
        }
        let l = &self.lifecycle;
        if l.max_retries < 0 {
            bail!("lifecycle.max_retries must be >= 0");
        }
        if l.lock_ttl_ms <= 0 {
            bail!("lifecycle.lock_ttl_ms must be positive");
        }
        if l.retry_cooldown_ms < 0 {
            bail!("lifecycle.retry_cooldown_ms must be >= 0");
        }
        if l.provider_max_attempts == 0 {
            bail!("lifecycle.provider_max_attempts must be at least 1");
        }
        if self.provider.timeout_secs == 0 {
            bail!("provider.timeout_secs must be positive");
        }
        Ok(())
    }

    /// `sqlite://` URL for the configured database file
    pub fn database_url(&self) -> String {
        if self.database_path.starts_with("sqlite:") {
            self.database_path.clone()
        } else {
            format!("sqlite://{}", self.database_path)
        }
    }

    /// Parent directory that must exist before the pool opens the file
    pub fn database_dir(&self) -> Option<PathBuf> {
        if self.database_path.starts_with("sqlite:") {
            return None;
        }
        Path::new(&self.database_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }
}

/// `TUNEKEEPER_FOO__BAR` -> `foo.bar`; `source` replaces the process env in tests
fn environment(source: Option<HashMap<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .source(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_from(toml: &str, env: &[(&str, &str)]) -> Result<DaemonConfig> {
        let vars = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .add_source(environment(Some(vars)))
            .build()?;
        DaemonConfig::finish(config)
    }

    #[test]
    fn test_defaults_without_sources() {
        let cfg = load_from("", &[]).unwrap();
        assert_eq!(cfg.rpc.host, "127.0.0.1");
        assert_eq!(cfg.rpc.port, 9531);
        assert_eq!(cfg.poller.interval_secs, 60);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.lifecycle.max_retries, 3);
        assert!(cfg.notifier.webhook_url.is_none());
        assert!(!cfg.database_path.starts_with('~'));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let cfg = load_from(
            r#"
            database_path = "/var/lib/tunekeeper/state.db"
            log_format = "json"

            [rpc]
            port = 9600

            [lifecycle]
            max_retries = 5
            retry_cooldown_ms = 1000
            "#,
            &[],
        )
        .unwrap();

        assert_eq!(cfg.database_path, "/var/lib/tunekeeper/state.db");
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.rpc.port, 9600);
        assert_eq!(cfg.rpc.host, "127.0.0.1");
        assert_eq!(cfg.lifecycle.max_retries, 5);
        assert_eq!(cfg.lifecycle.retry_cooldown_ms, 1000);
        // Untouched lifecycle keys keep their defaults
        assert_eq!(cfg.lifecycle.lock_ttl_ms, 600_000);
    }

    #[test]
    fn test_env_overrides_file() {
        let cfg = load_from(
            "[rpc]\nport = 9600\n",
            &[
                ("TUNEKEEPER_RPC__PORT", "9700"),
                ("TUNEKEEPER_NOTIFIER__WEBHOOK_URL", "https://hooks.example.com/x"),
                ("TUNEKEEPER_POLLER__INTERVAL_SECS", "0"),
            ],
        )
        .unwrap();

        assert_eq!(cfg.rpc.port, 9700);
        assert_eq!(
            cfg.notifier.webhook_url.as_deref(),
            Some("https://hooks.example.com/x")
        );
        assert_eq!(cfg.poller.interval_secs, 0);
    }

    #[test]
    fn test_tilde_is_expanded() {
        let cfg = load_from(
            "database_path = \"~/tk/state.db\"\nlog_dir = \"~/tk/logs\"\n",
            &[],
        )
        .unwrap();
        assert!(!cfg.database_path.starts_with('~'));
        assert!(cfg.database_path.ends_with("tk/state.db"));
        assert!(!cfg.log_dir.unwrap().starts_with('~'));
    }

    #[test]
    fn test_invalid_lifecycle_rejected() {
        let err = load_from("[lifecycle]\nlock_ttl_ms = 0\n", &[]).unwrap_err();
        assert!(err.to_string().contains("lock_ttl_ms"));

        let err = load_from("[lifecycle]\nprovider_max_attempts = 0\n", &[]).unwrap_err();
        assert!(err.to_string().contains("provider_max_attempts"));
    }

    #[test]
    fn test_database_url() {
        let mut cfg = DaemonConfig {
            database_path: "/tmp/tk/state.db".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.database_url(), "sqlite:///tmp/tk/state.db");
        assert_eq!(cfg.database_dir(), Some(PathBuf::from("/tmp/tk")));

        cfg.database_path = "sqlite::memory:".to_string();
        assert_eq!(cfg.database_url(), "sqlite::memory:");
        assert_eq!(cfg.database_dir(), None);
    }
}
