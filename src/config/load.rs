//! Configuration loading from files.
//!
//! This module handles reading and parsing configuration files. Values from
//! the file can be overridden by `PIPEWRIGHT_*` environment variables, using
//! `__` between nested keys (`PIPEWRIGHT_DEV__PORT=8080`).

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};

use super::{ConfigError, ProjectConfig};

/// Config file looked up when none is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "pipewright.yaml";

/// A loaded configuration together with the directory it was found in.
///
/// All relative paths in `config` have already been resolved against
/// `base_path`.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ProjectConfig,
    pub base_path: PathBuf,
    pub config_path: PathBuf,
}

impl LoadedConfig {
    /// Load the config from the command line argument, defaulting to `pipewright.yaml`
    pub async fn load_from_arg(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let config_file = config_file.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        let config_file = if config_file.is_relative() {
            std::env::current_dir()
                .map_err(ConfigError::CwdFailure)?
                .join(config_file)
        } else {
            config_file.to_path_buf()
        };

        Self::load_from_file(&config_file).await
    }

    /// Load the config from a file path
    pub(crate) async fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(
                Environment::with_prefix("PIPEWRIGHT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: ProjectConfig = settings.try_deserialize()?;
        config.validate()?;

        let base_path = base_path_from_config(path);
        config.resolve_paths(&base_path);
        config.load_license().await?;

        Ok(Self {
            config,
            base_path,
            config_path: path.to_path_buf(),
        })
    }
}

impl ProjectConfig {
    /// Make every top-level path absolute relative to `base`.
    ///
    /// Email sub-directories stay relative to `email.source` / `email.output`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| *p = base.join(&*p);

        join(&mut self.styles.base);
        join(&mut self.styles.output);
        self.styles.include_paths.iter_mut().for_each(join);
        join(&mut self.scripts.base);
        join(&mut self.scripts.output);
        join(&mut self.templates.source);
        join(&mut self.email.source);
        join(&mut self.email.output);
        self.email.include_paths.iter_mut().for_each(join);
        join(&mut self.dev.public_dir);
        if let Some(file) = self.license.file.as_mut() {
            join(file);
        }
    }

    /// Replace a license `file` with its contents. Inline `text` wins.
    async fn load_license(&mut self) -> Result<(), ConfigError> {
        if self.license.text.is_some() {
            return Ok(());
        }
        if let Some(path) = &self.license.file {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::License {
                    path: path.clone(),
                    source,
                })?;
            self.license.text = Some(text);
        }
        Ok(())
    }

    /// The license header, if any, ready to prepend (ends with a newline).
    pub fn license_header(&self) -> Option<String> {
        let text = self.license.text.as_deref()?.trim_end();
        if text.is_empty() {
            return None;
        }
        Some(format!("{text}\n"))
    }
}

/// Get the base path from a config file path (its parent directory).
pub fn base_path_from_config(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
