//! Configuration loading and types for pipewright.
//!
//! This module handles all aspects of configuration:
//! - Type definitions for config structures (`types`)
//! - Loading configs from files and the environment (`load`)

mod load;
mod types;

pub use load::{DEFAULT_CONFIG_FILE, LoadedConfig};
pub use types::{
    BundleConfig, BundlerConfig, DevConfig, EmailConfig, LicenseConfig, ProjectConfig,
    ScriptsConfig, StylesConfig, TemplateCacheConfig, TriggerPolicy, WatchConfig,
};

// =============================================================================
// Errors
// =============================================================================

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to deserialize config: {0}")]
    Deserialize(#[from] config::ConfigError),

    #[error("failed to get current working directory: {0}")]
    CwdFailure(std::io::Error),

    #[error("config file not found: {0}")]
    NotFound(std::path::PathBuf),

    #[error("failed to read license file {path}: {source}")]
    License {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    Validation(String),
}

impl ProjectConfig {
    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (section, bundles) in [("styles", &self.styles.bundles), ("scripts", &self.scripts.bundles)] {
            let mut seen = std::collections::HashSet::new();
            for bundle in bundles {
                if bundle.name.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "invalid config: every bundle in '{section}.bundles' needs a name"
                    )));
                }
                if !seen.insert(bundle.name.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "invalid config: duplicate bundle '{}' in '{section}.bundles'",
                        bundle.name
                    )));
                }
                if bundle.sources.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "invalid config: bundle '{}' in '{section}.bundles' has no sources",
                        bundle.name
                    )));
                }
            }
        }

        if let Some(bundler) = &self.scripts.bundler
            && bundler.command.is_empty()
        {
            return Err(ConfigError::Validation(
                "invalid config: 'scripts.bundler.command' must name a program".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        ProjectConfig::default().validate().unwrap();
    }

    #[test]
    fn test_duplicate_bundle_rejected() {
        let mut config = ProjectConfig::default();
        let first = config.styles.bundles[0].clone();
        config.styles.bundles.push(first);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate bundle 'app'"));
    }

    #[test]
    fn test_empty_bundler_command_rejected() {
        let mut config = ProjectConfig::default();
        config.scripts.bundler = Some(BundlerConfig {
            command: vec![],
            production_args: vec![],
            development_args: vec![],
        });

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trigger_policy_kebab_case() {
        let dev: DevConfig = serde_yaml::from_str("trigger_policy: coalesce").unwrap();
        assert_eq!(dev.trigger_policy, TriggerPolicy::Coalesce);

        let dev: DevConfig = serde_yaml::from_str("port: 8080").unwrap();
        assert_eq!(dev.trigger_policy, TriggerPolicy::RunEach);
        assert_eq!(dev.port, 8080);
        assert_eq!(dev.host, "localhost");
    }
}
