// src/config/loader.rs
//! Layered TOML configuration loader
//!
//! Files are merged over the built-in defaults in precedence order, then environment
//! overrides are applied, then the result is validated.

use crate::config::{constants::paths, ModelConfig};
use crate::error::{DynamicsError, ErrorContext};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

/// Configuration loader
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    env_overrides: bool,
    current_config: Arc<RwLock<ModelConfig>>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
    #[error("Configuration parse error: {0}")]
    ParseError(String),
    #[error("Configuration validation errors: {}", .0.join("; "))]
    ValidationError(Vec<String>),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for DynamicsError {
    fn from(err: ConfigError) -> Self {
        DynamicsError::Configuration {
            component: "config_loader".to_string(),
            reason: err.to_string(),
            context: ErrorContext::new("config_loader", "load"),
        }
    }
}

impl ConfigLoader {
    /// Create loader over the standard configuration locations
    pub fn new() -> Self {
        Self::with_paths(Self::discover_config_paths())
    }

    /// Create loader with custom paths, lowest precedence first
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            env_overrides: true,
            current_config: Arc::new(RwLock::new(ModelConfig::default())),
        }
    }

    /// Ignore `LIMB_DYNAMICS_*` environment variables
    pub fn without_env_overrides(mut self) -> Self {
        self.env_overrides = false;
        self
    }

    /// Load, merge and validate the model configuration
    pub fn load(&mut self) -> Result<ModelConfig, ConfigError> {
        let config = self.load_and_merge_configs()?;
        *self.current_config.write() = config.clone();
        tracing::debug!(paths = self.config_paths.len(), "model configuration loaded");
        Ok(config)
    }

    /// Parse a single TOML document over the defaults
    pub fn load_from_str(content: &str) -> Result<ModelConfig, ConfigError> {
        let mut merged = Self::default_value()?;
        let overlay: toml::Value = toml::from_str(content)?;
        merge_toml_values(&mut merged, overlay);
        Self::finish(merged)
    }

    /// Get current configuration
    pub fn get_current_config(&self) -> ModelConfig {
        self.current_config.read().clone()
    }

    /// Reload configuration manually
    pub fn reload(&mut self) -> Result<ModelConfig, ConfigError> {
        self.load()
    }

    /// Validate a configuration file without loading it
    pub fn validate_config_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content).map(|_| ())
    }

    /// Export current configuration to file
    pub fn export_config<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let config = self.get_current_config();
        let toml_content =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Get configuration file modification times
    pub fn get_config_timestamps(&self) -> Vec<(PathBuf, Option<SystemTime>)> {
        self.config_paths
            .iter()
            .map(|path| {
                let timestamp = std::fs::metadata(path)
                    .and_then(|meta| meta.modified())
                    .ok();
                (path.clone(), timestamp)
            })
            .collect()
    }

    fn load_and_merge_configs(&self) -> Result<ModelConfig, ConfigError> {
        let mut merged_config = Self::default_value()?;

        for config_path in &self.config_paths {
            if config_path.exists() {
                match self.load_config_file(config_path) {
                    Ok(file_config) => merge_toml_values(&mut merged_config, file_config),
                    Err(ConfigError::FileNotFound(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        if self.env_overrides {
            apply_environment_overrides(&mut merged_config, std::env::vars());
        }

        Self::finish(merged_config)
    }

    fn default_value() -> Result<toml::Value, ConfigError> {
        toml::Value::try_from(ModelConfig::default())
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn finish(merged: toml::Value) -> Result<ModelConfig, ConfigError> {
        let config: ModelConfig = merged
            .try_into()
            .map_err(|e| ConfigError::ParseError(format!("Failed to deserialize config: {}", e)))?;

        config
            .validate_consistency()
            .map_err(ConfigError::ValidationError)?;

        Ok(config)
    }

    fn load_config_file<P: AsRef<Path>>(&self, path: P) -> Result<toml::Value, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn discover_config_paths() -> Vec<PathBuf> {
        let mut config_paths = vec![PathBuf::from(paths::SYSTEM_CONFIG_PATH)];

        if let Some(home_dir) = std::env::var_os("HOME").map(PathBuf::from) {
            config_paths.push(home_dir.join(paths::USER_CONFIG_DIR).join("model.toml"));
        }

        config_paths.push(PathBuf::from(paths::DEFAULT_CONFIG_FILE));
        config_paths.push(PathBuf::from(paths::LOCAL_CONFIG_FILE));
        config_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_toml_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(&key) {
                    merge_toml_values(base_value, value);
                } else {
                    base_table.insert(key, value);
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

/// `LIMB_DYNAMICS_DYNAMICS__NN_RATIO=0.3` sets `dynamics.nn_ratio`
fn apply_environment_overrides<I>(config: &mut toml::Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(stripped) = key.strip_prefix(paths::ENV_PREFIX) else {
            continue;
        };
        let config_key: Vec<String> = stripped
            .split(paths::ENV_SEPARATOR)
            .map(|part| part.to_lowercase())
            .collect();

        set_nested_value(config, &config_key, parse_env_value(&value));
    }
}

fn parse_env_value(value: &str) -> toml::Value {
    if let Ok(int_val) = value.parse::<i64>() {
        toml::Value::Integer(int_val)
    } else if let Ok(float_val) = value.parse::<f64>() {
        toml::Value::Float(float_val)
    } else if let Ok(bool_val) = value.parse::<bool>() {
        toml::Value::Boolean(bool_val)
    } else {
        toml::Value::String(value.to_string())
    }
}

fn set_nested_value(config: &mut toml::Value, path: &[String], value: toml::Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = config;
    for part in parents {
        let toml::Value::Table(table) = current else {
            return;
        };
        current = table
            .entry(part.clone())
            .or_insert_with(|| toml::Value::Table(toml::value::Table::new()));
    }

    if let toml::Value::Table(table) = current {
        // Float fields written as integers in the environment stay floats
        let value = match (table.get(last), value) {
            (Some(toml::Value::Float(_)), toml::Value::Integer(i)) => toml::Value::Float(i as f64),
            (_, value) => value,
        };
        table.insert(last.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntegrationMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_loader_creation() {
        let loader = ConfigLoader::new();
        assert!(!loader.config_paths.is_empty());
    }

    #[test]
    fn test_load_missing_files_gives_defaults() {
        let mut loader =
            ConfigLoader::with_paths(vec![PathBuf::from("/nonexistent/model.toml")]).without_env_overrides();
        let config = loader.load().unwrap();
        assert_eq!(config, ModelConfig::default());
    }

    #[test]
    fn test_later_files_take_precedence() {
        let mut base = NamedTempFile::new().unwrap();
        writeln!(base, "[dynamics]\nnn_ratio = 0.2\nintegration = \"approximate\"").unwrap();
        let mut local = NamedTempFile::new().unwrap();
        writeln!(local, "[dynamics]\nnn_ratio = 0.4").unwrap();

        let mut loader = ConfigLoader::with_paths(vec![
            base.path().to_path_buf(),
            local.path().to_path_buf(),
        ])
        .without_env_overrides();
        let config = loader.load().unwrap();

        assert_eq!(config.dynamics.nn_ratio, 0.4);
        assert_eq!(config.dynamics.integration, IntegrationMode::Approximate);
        assert_eq!(loader.get_current_config(), config);
    }

    #[test]
    fn test_invalid_config_validation() {
        let loader = ConfigLoader::with_paths(Vec::new());

        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[dynamics]\nnn_ratio = 2.0").unwrap();

        match loader.validate_config_file(temp_file.path()) {
            Err(ConfigError::ValidationError(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error() {
        let result = ConfigLoader::load_from_str("[dynamics\nnn_ratio = ");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_environment_override() {
        let mut config = toml::Value::try_from(ModelConfig::default()).unwrap();
        apply_environment_overrides(
            &mut config,
            vec![
                ("LIMB_DYNAMICS_DYNAMICS__NN_RATIO".to_string(), "1".to_string()),
                ("LIMB_DYNAMICS_PERFORMANCE__PARALLEL_BATCH_THRESHOLD".to_string(), "8".to_string()),
                ("UNRELATED".to_string(), "x".to_string()),
            ],
        );
        let config: ModelConfig = config.try_into().unwrap();

        assert_eq!(config.dynamics.nn_ratio, 1.0);
        assert_eq!(config.performance.parallel_batch_threshold, 8);
    }

    #[test]
    fn test_config_export() {
        let loader = ConfigLoader::with_paths(Vec::new());
        let temp_file = NamedTempFile::new().unwrap();

        loader.export_config(temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("[dynamics]"));
        assert_eq!(ConfigLoader::load_from_str(&content).unwrap(), ModelConfig::default());
    }

    #[test]
    fn test_config_error_converts() {
        let err: DynamicsError = ConfigError::ValidationError(vec!["bad".to_string()]).into();
        assert!(matches!(err, DynamicsError::Configuration { .. }));
    }
}
