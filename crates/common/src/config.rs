//! Dispatch configuration: which engines exist, how their servers are
//! started, and which engine is the default.
//!
//! The configuration is a JSON file loaded once per process (the analog of an
//! engine catalog); engines are described declaratively and bound to concrete
//! implementations through the engine registry at startup.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, EngineError, Result};

/// Server process description for engines that can run distributed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `host:port` the server listens on.
    pub address: String,
    /// Script that launches the server when it is not already running.
    pub start_script: PathBuf,
    /// Files that must exist before the start script may be invoked.
    #[serde(default)]
    pub required_files: Vec<PathBuf>,
}

/// One configured execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDescriptor {
    /// Engine name as shown to users; matched case-insensitively.
    pub name: String,
    /// Implementation key resolved through the engine registry.
    pub implementation: String,
    /// Server process configuration, absent for embedded-only engines.
    #[serde(default)]
    pub server: Option<ServerConfig>,
    /// Engine-specific parameters attached to the director while this
    /// engine is active.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Top-level dispatch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Name of the engine selected when the director is left at "default".
    #[serde(default)]
    pub default_engine: Option<String>,
    /// All configured engines.
    #[serde(default)]
    pub engines: Vec<EngineDescriptor>,
}

impl DispatchConfig {
    /// Load the configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Look up an engine descriptor by case-insensitive name.
    pub fn engine(&self, name: &str) -> std::result::Result<&EngineDescriptor, EngineError> {
        if self.engines.is_empty() {
            return Err(EngineError::NoEnginesConfigured);
        }
        self.engines
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    /// Resolve the default engine name, falling back to the first configured
    /// engine when the configuration names none.
    pub fn default_engine_name(&self) -> std::result::Result<String, EngineError> {
        if let Some(name) = self
            .default_engine
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            return Ok(name.to_string());
        }
        self.engines
            .first()
            .map(|e| e.name.clone())
            .ok_or(EngineError::NoEnginesConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_engine_config() -> DispatchConfig {
        DispatchConfig {
            default_engine: Some("EngineA".to_string()),
            engines: vec![
                EngineDescriptor {
                    name: "EngineA".to_string(),
                    implementation: "local".to_string(),
                    server: None,
                    parameters: BTreeMap::new(),
                },
                EngineDescriptor {
                    name: "EngineB".to_string(),
                    implementation: "cluster".to_string(),
                    server: None,
                    parameters: BTreeMap::new(),
                },
            ],
        }
    }

    #[test]
    fn engine_lookup_is_case_insensitive() {
        let cfg = two_engine_config();
        assert_eq!(cfg.engine("engineb").unwrap().name, "EngineB");
    }

    #[test]
    fn missing_engine_is_not_found() {
        let cfg = two_engine_config();
        assert_eq!(
            cfg.engine("Nonexistent").unwrap_err(),
            EngineError::NotFound("Nonexistent".to_string())
        );
    }

    #[test]
    fn empty_registry_is_reported_before_name_lookup() {
        let cfg = DispatchConfig::default();
        assert_eq!(
            cfg.engine("EngineA").unwrap_err(),
            EngineError::NoEnginesConfigured
        );
    }

    #[test]
    fn default_engine_falls_back_to_first_entry() {
        let mut cfg = two_engine_config();
        cfg.default_engine = Some("  ".to_string());
        assert_eq!(cfg.default_engine_name().unwrap(), "EngineA");
    }
}
