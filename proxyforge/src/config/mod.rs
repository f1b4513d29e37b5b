//! Configuration for proxy generation.
//!
//! Loaded from TOML or from `PROXYFORGE_*` environment variables; every field
//! has a default so partial files are accepted.

use crate::error::{ProxyError, ProxyResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_FIELD_PREFIX: &str = "$$proxy_";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Prefix of the instance fields generated for captured properties
    pub field_prefix: String,
    /// Drop specs equal to an earlier one before classification
    pub dedupe_specs: bool,
    /// Reuse proxy classes built from identical configurations
    pub cache_classes: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            field_prefix: DEFAULT_FIELD_PREFIX.to_string(),
            dedupe_specs: true,
            cache_classes: true,
        }
    }
}

impl ProxyConfig {
    pub fn from_toml_str(content: &str) -> ProxyResult<Self> {
        let config: ProxyConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ProxyResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Create a configuration from environment variables, falling back to defaults
    pub fn from_env() -> ProxyResult<Self> {
        let mut config = ProxyConfig::default();

        if let Ok(prefix) = std::env::var("PROXYFORGE_FIELD_PREFIX") {
            config.field_prefix = prefix;
        }
        config.dedupe_specs = env_flag("PROXYFORGE_DEDUPE_SPECS", config.dedupe_specs)?;
        config.cache_classes = env_flag("PROXYFORGE_CACHE_CLASSES", config.cache_classes)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ProxyResult<()> {
        if self.field_prefix.is_empty() {
            return Err(ProxyError::Config("field_prefix must not be empty".to_string()));
        }
        if self.field_prefix.chars().any(char::is_whitespace) {
            return Err(ProxyError::Config(format!(
                "field_prefix '{}' contains whitespace",
                self.field_prefix
            )));
        }
        Ok(())
    }
}

fn env_flag(name: &str, default: bool) -> ProxyResult<bool> {
    match std::env::var(name) {
        Ok(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Ok(true),
            "0" | "false" | "off" | "no" => Ok(false),
            _ => Err(ProxyError::Config(format!("{} must be a boolean, got '{}'", name, raw))),
        },
        Err(_) => Ok(default),
    }
}
