//! Registry configuration types and serialization

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RegistryError, RegistryResult};
use crate::loader::DEFAULT_UNLOAD_DENYLIST;
use crate::naming::{BuildMode, ModuleNaming, Platform};

/// Complete registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Prefix of synthesized instance ids (`obj001`, `obj002`, ...)
    pub default_id_prefix: String,
    /// Maximum number of interned strings
    pub string_capacity: usize,
    /// Component kind held in the event hub singleton slot
    pub event_hub_kind: String,
    /// Component kind held in the execution clock singleton slot
    pub clock_kind: String,
    /// Separator of the `name:id` shorthand accepted by `create`
    pub id_separator: char,
    /// Module file naming policy
    pub naming: NamingConfig,
    /// Module names that are never unloaded
    pub unload_denylist: Vec<String>,
    /// Base directory for relative plugin paths
    pub plugin_dir: Option<PathBuf>,
    /// Modules loaded by `Registry::load_configured_plugins`
    pub plugins: Vec<PathBuf>,
}

/// Module file naming configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Prefix every module name carries
    pub prefix: String,
    /// Marker appended to module names in debug builds
    pub debug_marker: Option<String>,
    /// Build flavour of the module tree; defaults to the host's
    pub build: Option<BuildMode>,
    /// Native library directory on Android
    pub android_lib_dir: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_id_prefix: "obj".to_string(),
            string_capacity: 1024,
            event_hub_kind: "EventHub".to_string(),
            clock_kind: "ExecutionClock".to_string(),
            id_separator: ':',
            naming: NamingConfig::default(),
            unload_denylist: DEFAULT_UNLOAD_DENYLIST
                .iter()
                .map(|name| name.to_string())
                .collect(),
            plugin_dir: None,
            plugins: vec![],
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            prefix: "sp_".to_string(),
            debug_marker: None,
            build: None,
            android_lib_dir: None,
        }
    }
}

impl NamingConfig {
    /// Builds the naming policy for the running host.
    pub fn policy(&self) -> ModuleNaming {
        ModuleNaming {
            prefix: self.prefix.clone(),
            debug_marker: self.debug_marker.clone(),
            build: self.build.unwrap_or_else(BuildMode::host),
            platform: Platform::host(self.android_lib_dir.as_deref()),
        }
    }
}

impl RegistryConfig {
    /// Validate the configuration
    pub fn validate(&self) -> RegistryResult<()> {
        if self.event_hub_kind.is_empty() || self.clock_kind.is_empty() {
            return Err(RegistryError::Config(
                "singleton kinds must not be empty".to_string(),
            ));
        }
        if self.event_hub_kind == self.clock_kind {
            return Err(RegistryError::Config(format!(
                "event hub and clock share the kind '{}'",
                self.clock_kind
            )));
        }
        if self.default_id_prefix.contains(self.id_separator) {
            return Err(RegistryError::Config(format!(
                "default id prefix '{}' contains the id separator '{}'",
                self.default_id_prefix, self.id_separator
            )));
        }
        Ok(())
    }

    /// Load configuration from JSON
    pub fn from_json(json: &str) -> RegistryResult<Self> {
        let config: RegistryConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from YAML
    pub fn from_yaml(yaml: &str) -> RegistryResult<Self> {
        let config: RegistryConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a `.json`, `.yaml` or `.yml` file
    pub fn from_path(path: &Path) -> RegistryResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents),
            Some("yaml") | Some("yml") => Self::from_yaml(&contents),
            _ => Err(RegistryError::Config(format!(
                "unsupported configuration format '{}'",
                path.display()
            ))),
        }
    }

    /// Convert configuration to JSON
    pub fn to_json(&self) -> RegistryResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Joins relative plugin paths onto `plugin_dir`.
    pub fn plugin_path(&self, raw: &Path) -> PathBuf {
        match &self.plugin_dir {
            Some(dir) if raw.is_relative() => dir.join(raw),
            _ => raw.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.default_id_prefix, "obj");
        assert_eq!(config.id_separator, ':');
        assert_eq!(config.unload_denylist, vec!["sp_xsens".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = RegistryConfig::from_json(
            r#"{ "string_capacity": 8, "naming": { "debug_marker": "d", "build": "release" } }"#,
        )
        .unwrap();

        assert_eq!(config.string_capacity, 8);
        assert_eq!(config.clock_kind, "ExecutionClock");
        assert_eq!(config.naming.prefix, "sp_");

        let policy = config.naming.policy();
        assert_eq!(policy.build, BuildMode::Release);
        assert_eq!(policy.debug_marker.as_deref(), Some("d"));
    }

    #[test]
    fn test_yaml_and_plugin_dir() {
        let config = RegistryConfig::from_yaml(
            "default_id_prefix: node\nplugin_dir: /opt/pipeline/plugins\nplugins:\n  - signal\n  - /abs/camera\n",
        )
        .unwrap();

        assert_eq!(config.default_id_prefix, "node");
        assert_eq!(
            config.plugin_path(&config.plugins[0]),
            PathBuf::from("/opt/pipeline/plugins/signal")
        );
        assert_eq!(
            config.plugin_path(&config.plugins[1]),
            PathBuf::from("/abs/camera")
        );
    }

    #[test]
    fn test_invalid_configs() {
        let same_kinds = r#"{ "event_hub_kind": "Hub", "clock_kind": "Hub" }"#;
        assert!(matches!(
            RegistryConfig::from_json(same_kinds),
            Err(RegistryError::Config(_))
        ));

        let bad_prefix = r#"{ "default_id_prefix": "a:b" }"#;
        assert!(RegistryConfig::from_json(bad_prefix).is_err());

        assert!(RegistryConfig::from_json("{ not json").is_err());
    }

    #[test]
    fn test_from_path_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("registry.json");
        std::fs::write(&json, RegistryConfig::default().to_json().unwrap()).unwrap();
        assert_eq!(RegistryConfig::from_path(&json).unwrap(), RegistryConfig::default());

        let toml = dir.path().join("registry.toml");
        std::fs::write(&toml, "").unwrap();
        assert!(matches!(
            RegistryConfig::from_path(&toml),
            Err(RegistryError::Config(_))
        ));
    }
}
