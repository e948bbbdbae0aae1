//! Configuration management for servicehub
//!
//! Handles loading the registry policy and logging settings from TOML or
//! JSON files.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a second `unregister` of the same registration does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnregisterPolicy {
    /// Report `RegistryError::AlreadyUnregistered`
    #[default]
    Error,
    /// Treat the call as a no-op
    Ignore,
}

/// Service registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Behaviour of repeated unregistration
    #[serde(default)]
    pub unregister_policy: UnregisterPolicy,

    /// Run the class conformance predicate on published and created objects
    #[serde(default = "default_true")]
    pub check_conformance: bool,

    /// Send factory and listener failures to the diagnostic channel
    /// (they are logged either way)
    #[serde(default = "default_true")]
    pub report_diagnostics: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            unregister_policy: UnregisterPolicy::Error,
            check_conformance: true,
            report_diagnostics: true,
        }
    }
}

impl RegistryConfig {
    pub fn with_unregister_policy(mut self, policy: UnregisterPolicy) -> Self {
        self.unregister_policy = policy;
        self
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "servicehub::registry=debug"); RUST_LOG wins
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Registry policy
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl PlatformConfig {
    /// Load configuration from TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PlatformConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PlatformConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from either format, chosen by file extension
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            Some("toml") => Self::from_toml_file(path),
            other => anyhow::bail!("unsupported config extension: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlatformConfig::default();
        assert_eq!(config.registry.unregister_policy, UnregisterPolicy::Error);
        assert!(config.registry.check_conformance);
        assert!(config.logging.is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PlatformConfig = toml::from_str(
            r#"
            [registry]
            unregister_policy = "ignore"
            "#,
        )
        .unwrap();
        assert_eq!(config.registry.unregister_policy, UnregisterPolicy::Ignore);
        assert!(config.registry.report_diagnostics);
    }
}
