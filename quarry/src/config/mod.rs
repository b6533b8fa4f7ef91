//! Configuration management
//!
//! Default config location: ~/.quarry/quarry.toml

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::credentials::{AesGcmCredentials, CredentialProvider, PlaintextCredentials};
use crate::engine::PageLimits;
use crate::remote::RemoteDefaults;
use crate::source::{DEFAULT_CACHE_TTL_SECS, DEFAULT_TIMEOUT_SECS};

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub cors: CorsConfig,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8090".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Allowed origins, "*" for any
    #[serde(default = "default_cors_origins")]
    pub origins: Vec<String>,
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub default_cache_ttl_secs: u64,
    /// Where uploaded tabular files are stored
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

fn default_limit() -> usize {
    100
}

fn default_max_limit() -> usize {
    1000
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".quarry")
}

fn default_upload_dir() -> PathBuf {
    default_data_dir().join("uploads")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            default_timeout_secs: default_timeout_secs(),
            default_cache_ttl_secs: default_cache_ttl_secs(),
            upload_dir: default_upload_dir(),
        }
    }
}

impl EngineConfig {
    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }

    pub fn remote_defaults(&self) -> RemoteDefaults {
        RemoteDefaults {
            timeout: Duration::from_secs(self.default_timeout_secs),
            cache_ttl: Duration::from_secs(self.default_cache_ttl_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CredentialsConfig {
    /// Environment variable holding a hex or base64 AES-256 key.
    /// Unset means stored credentials are plaintext.
    #[serde(default)]
    pub key_env: Option<String>,
}

impl CredentialsConfig {
    pub fn provider(&self) -> Result<Arc<dyn CredentialProvider>> {
        let Some(var) = &self.key_env else {
            tracing::warn!("No credentials.key_env configured, stored credentials are plaintext");
            return Ok(Arc::new(PlaintextCredentials));
        };

        let raw = std::env::var(var)
            .with_context(|| format!("Environment variable '{}' not set", var))?;
        let key_id = format!("env:{}", var);
        let provider = if raw.trim().len() == 64 {
            AesGcmCredentials::from_hex(&raw, key_id)
        } else {
            AesGcmCredentials::from_base64(&raw, key_id)
        }
        .map_err(|e| anyhow!("{}", e))?;
        Ok(Arc::new(provider))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RegistryConfig {
    /// JSON or YAML list of sources
    #[serde(default)]
    pub sources_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LoggingConfig {
    /// Also append JSON log lines to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Log filter string, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Serve Prometheus metrics at GET /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "info,quarry=debug".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Default config file path
    pub fn default_path() -> PathBuf {
        default_data_dir().join("quarry.toml")
    }

    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let mut config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid config file {:?}", config_path))?;
            config.expand_paths()?;
            Ok(config)
        } else {
            let mut config = Config::default();
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = config.save(config_path);
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Expand ~ in all paths
    fn expand_paths(&mut self) -> Result<()> {
        self.engine.upload_dir = expand_tilde(&self.engine.upload_dir)?;
        if let Some(ref p) = self.cache.path {
            self.cache.path = Some(expand_tilde(p)?);
        }
        if let Some(ref p) = self.registry.sources_file {
            self.registry.sources_file = Some(expand_tilde(p)?);
        }
        if let Some(ref f) = self.logging.file {
            self.logging.file = Some(expand_tilde(f)?);
        }
        Ok(())
    }

    /// Ensure the upload directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.engine.upload_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBackend;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.default_limit, 100);
        assert_eq!(config.engine.max_limit, 1000);
        assert_eq!(config.engine.default_timeout_secs, 30);
        assert_eq!(config.engine.default_cache_ttl_secs, 3600);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.observability.log_level, "info,quarry=debug");
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [engine]
            max_limit = 50

            [cache]
            backend = "sqlite"
            path = "/tmp/q.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.max_limit, 50);
        assert_eq!(config.engine.default_limit, 100);
        assert_eq!(config.cache.backend, CacheBackend::Sqlite);
        assert_eq!(config.engine.page_limits().max_limit, 50);
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde(Path::new("~/x")).unwrap(), home.join("x"));
        assert_eq!(expand_tilde(Path::new("/abs")).unwrap(), PathBuf::from("/abs"));
    }

    #[test]
    fn test_plaintext_provider_without_key_env() {
        let provider = CredentialsConfig::default().provider().unwrap();
        assert_eq!(provider.decrypt("abc").unwrap(), "abc");
    }

    #[test]
    fn test_missing_key_env_fails() {
        let config = CredentialsConfig {
            key_env: Some("QUARRY_TEST_KEY_THAT_IS_NOT_SET".to_string()),
        };
        assert!(config.provider().is_err());
    }
}
