//! Application configuration
//!
//! Layers, lowest priority first: the defaults compiled into the binary,
//! the file named by `ADMIN_GATE_CONFIG` (default `config.yml`, optional),
//! then `ADMIN_GATE__SECTION__KEY` environment variables.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use common::cache::CacheConfig;
use config::{Config as ConfigBuilder, Environment, File, FileFormat, FileSourceString};
use serde::Deserialize;

use crate::audit::AuditConfig;
use crate::jwt::JwtConfig;
use crate::rate_limiter::RateLimiterConfig;

const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    /// `debug` raises the default log level
    pub mode: String,
    /// Mount point of every gated route, stripped before policy lookup
    pub url_path_prefix: String,
    pub host: String,
    pub port: u16,
}

impl SystemConfig {
    pub fn is_debug(&self) -> bool {
        self.mode.eq_ignore_ascii_case("debug")
    }

    /// Prefix normalized to `/prefix`, or empty
    pub fn path_prefix(&self) -> String {
        let trimmed = self.url_path_prefix.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CasbinConfig {
    /// Empty selects the embedded model
    #[serde(default)]
    pub model_path: String,
}

/// Identity cache lifetimes in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub ttl: u64,
    pub idle: u64,
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            time_to_live: Duration::from_secs(self.ttl),
            time_to_idle: Duration::from_secs(self.idle),
            ..CacheConfig::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub system: SystemConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimiterConfig,
    pub casbin: CasbinConfig,
    pub audit: AuditConfig,
    pub cache: CacheSettings,
}

impl AppConfig {
    /// Load all layers, reading the file path from `ADMIN_GATE_CONFIG`
    pub fn load() -> Result<Self> {
        let path = std::env::var("ADMIN_GATE_CONFIG").unwrap_or_else(|_| "config.yml".to_string());
        Self::load_from(Some(Path::new(&path)))
    }

    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder().add_source(defaults_source()?);

        if let Some(path) = file {
            let user = ConfigBuilder::builder()
                .add_source(File::from(path).required(false))
                .build()
                .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
            builder = builder.add_source(normalized(user)?);
        }

        builder = builder.add_source(
            Environment::with_prefix("ADMIN_GATE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Built-in defaults only, ignoring files and environment
    pub fn defaults() -> Result<Self> {
        ConfigBuilder::builder()
            .add_source(defaults_source()?)
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

fn defaults_source() -> Result<File<FileSourceString, FileFormat>> {
    let defaults = ConfigBuilder::builder()
        .add_source(File::from_str(DEFAULT_CONFIG_TOML, FileFormat::Toml))
        .build()
        .context("Failed to parse built-in configuration")?;
    normalized(defaults)
}

/// Re-key a configuration layer with `-` turned into `_`, so documented
/// keys such as `jwt.max-refresh` and environment variables such as
/// `ADMIN_GATE__JWT__MAX_REFRESH` land on the same field
fn normalized(layer: config::Config) -> Result<File<FileSourceString, FileFormat>> {
    fn rekey(value: serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| (key.replace('-', "_"), rekey(value)))
                .collect::<serde_json::Map<_, _>>()
                .into(),
            other => other,
        }
    }

    let value: serde_json::Value = layer
        .try_deserialize()
        .context("Failed to read configuration layer")?;
    let json = rekey(value).to_string();
    Ok(File::from_str(&json, FileFormat::Json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn embedded_defaults() {
        let config = AppConfig::defaults().unwrap();
        assert_eq!(config.jwt.timeout, 24);
        assert_eq!(config.jwt.max_refresh, 24);
        assert!(!config.jwt.strict_token_lookup);
        assert_eq!(config.audit.capacity, 30);
        assert_eq!(config.audit.workers, 3);
        assert_eq!(config.audit.shutdown_grace, 5);
        assert_eq!(config.cache.ttl, 24 * 3600);
        assert_eq!(config.system.path_prefix(), "/api");
        assert!(config.casbin.model_path.is_empty());
    }

    #[test]
    #[serial]
    fn environment_overrides() {
        unsafe {
            std::env::set_var("ADMIN_GATE__JWT__KEY", "from-env");
            std::env::set_var("ADMIN_GATE__RATE_LIMIT__CAPACITY", "7");
            std::env::set_var("ADMIN_GATE__SYSTEM__MODE", "debug");
        }

        let config = AppConfig::load_from(None).unwrap();
        assert_eq!(config.jwt.key, "from-env");
        assert_eq!(config.rate_limit.capacity, 7);
        assert!(config.system.is_debug());

        unsafe {
            std::env::remove_var("ADMIN_GATE__JWT__KEY");
            std::env::remove_var("ADMIN_GATE__RATE_LIMIT__CAPACITY");
            std::env::remove_var("ADMIN_GATE__SYSTEM__MODE");
        }
    }

    #[test]
    #[serial]
    fn file_keys_may_use_hyphens() {
        let dir = std::env::temp_dir().join(format!("admin-gate-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yml");
        std::fs::write(
            &path,
            "jwt:\n  max-refresh: 2\n  strict-token-lookup: true\nsystem:\n  url-path-prefix: \"\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.jwt.max_refresh, 2);
        assert!(config.jwt.strict_token_lookup);
        assert_eq!(config.jwt.timeout, 24);
        assert_eq!(config.system.path_prefix(), "");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn prefix_normalization() {
        let mut system = AppConfig::defaults().unwrap().system;
        system.url_path_prefix = "/api/".into();
        assert_eq!(system.path_prefix(), "/api");
        system.url_path_prefix = String::new();
        assert_eq!(system.path_prefix(), "");
    }
}
