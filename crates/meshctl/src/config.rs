//! Configuration management for meshctl.
//!
//! Flag values are resolved with precedence:
//! 1. Command line
//! 2. Config file (`--config`, `MESHCTL_CONFIG`, or the platform config dir)
//! 3. Built-in defaults
//!
//! ```toml
//! [connectivity]
//! namespace = "cilium"
//! timeout = "30s"
//!
//! [connectivity.flags]
//! acme-gateway = "gw.acme.internal:8443"
//!
//! [sysdump]
//! worker_count = 4
//! ```

use anyhow::{Context, Result};
use directories::ProjectDirs;
use meshctl_core::connectivity::{
    FLAG_FAIL_FAST, FLAG_NAMESPACE, FLAG_TARGET, FLAG_TEST, FLAG_TEST_NAMESPACE, FLAG_TIMEOUT,
};
use meshctl_core::flags::FlagSet;
use meshctl_core::sysdump::{
    FLAG_OUTPUT_DIRECTORY, FLAG_OUTPUT_FILENAME, FLAG_QUICK, FLAG_TASK_TIMEOUT, FLAG_WORKER_COUNT,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// `connectivity test` settings
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    /// `sysdump` settings
    #[serde(default)]
    pub sysdump: SysdumpConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    pub namespace: Option<String>,
    pub test_namespace: Option<String>,
    /// Test filters, as for `--test`
    pub tests: Option<Vec<String>>,
    /// Per-test timeout, e.g. "30s"
    pub timeout: Option<String>,
    pub targets: Option<Vec<String>>,
    pub fail_fast: Option<bool>,

    /// Raw values for any other flag, extension flags included
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SysdumpConfig {
    pub output_directory: Option<PathBuf>,
    pub output_filename: Option<String>,
    pub worker_count: Option<usize>,
    pub quick: Option<bool>,
    /// Per-task timeout, e.g. "2m"
    pub task_timeout: Option<String>,

    /// Raw values for any other flag, extension flags included
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, String>,
}

fn push<T: ToString>(values: &mut Vec<(String, String)>, name: &str, value: &Option<T>) {
    if let Some(value) = value {
        values.push((name.to_string(), value.to_string()));
    }
}

impl ConnectivityConfig {
    /// Configured values as raw flag text.
    pub fn flag_values(&self) -> Vec<(String, String)> {
        let mut values = Vec::new();
        push(&mut values, FLAG_NAMESPACE, &self.namespace);
        push(&mut values, FLAG_TEST_NAMESPACE, &self.test_namespace);
        push(&mut values, FLAG_TEST, &self.tests.as_ref().map(|v| v.join(",")));
        push(&mut values, FLAG_TIMEOUT, &self.timeout);
        push(&mut values, FLAG_TARGET, &self.targets.as_ref().map(|v| v.join(",")));
        push(&mut values, FLAG_FAIL_FAST, &self.fail_fast);
        values.extend(self.flags.iter().map(|(k, v)| (k.clone(), v.clone())));
        values
    }
}

impl SysdumpConfig {
    /// Configured values as raw flag text.
    pub fn flag_values(&self) -> Vec<(String, String)> {
        let mut values = Vec::new();
        push(
            &mut values,
            FLAG_OUTPUT_DIRECTORY,
            &self.output_directory.as_ref().map(|p| p.display().to_string()),
        );
        push(&mut values, FLAG_OUTPUT_FILENAME, &self.output_filename);
        push(&mut values, FLAG_WORKER_COUNT, &self.worker_count);
        push(&mut values, FLAG_QUICK, &self.quick);
        push(&mut values, FLAG_TASK_TIMEOUT, &self.task_timeout);
        values.extend(self.flags.iter().map(|(k, v)| (k.clone(), v.clone())));
        values
    }
}

/// Apply configured values to flags the command line left alone.
///
/// Unknown names are skipped with a warning; the extension that declares
/// them may simply not be installed.
pub fn apply(values: &[(String, String)], flags: &mut FlagSet) -> Result<()> {
    for (name, raw) in values {
        if !flags.contains(name) {
            tracing::warn!(flag_set = %flags.name(), flag = %name, "config sets an undeclared flag");
            continue;
        }
        if flags.changed(name) {
            continue;
        }
        flags
            .set(name, raw)
            .with_context(|| format!("Invalid config value for {}", name))?;
    }
    Ok(())
}

fn default_config_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("io", "meshctl", "meshctl") {
        proj_dirs.config_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".meshctl")
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing file yields the defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::config_path(path);

        if !config_path.exists() {
            if path.is_some() {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
        tracing::debug!(path = %config_path.display(), "config loaded");
        Ok(config)
    }

    /// Get the config file path.
    pub fn config_path(path: Option<&Path>) -> PathBuf {
        match path {
            Some(path) => path.to_path_buf(),
            None => default_config_dir().join("config.toml"),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
