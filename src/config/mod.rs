//! Configuration management for `test_janitor`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. CLI overrides
//! 2. Environment variables (`TJ_*`)
//! 3. Project config (`<target>/.test-janitor.yaml`)
//! 4. User config (`~/.config/test-janitor/config.yaml`)
//! 5. Defaults
//!
//! YAML files are flattened into dotted keys (`analysis.fragile-threshold`)
//! and merged as string layers before being resolved into [`JanitorConfig`].

use crate::error::{JanitorError, Result, StructuredError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Project config filename, looked up in the target directory.
pub const PROJECT_CONFIG_FILE: &str = ".test-janitor.yaml";
/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "TJ_";
/// Default output directory name (relative to the target).
pub const DEFAULT_OUTPUT_DIR: &str = ".test-janitor";
/// Default backup root name (relative to the target).
pub const DEFAULT_BACKUP_DIR: &str = ".test-janitor-backups";
/// Default history directory name (relative to the target).
pub const DEFAULT_HISTORY_DIR: &str = ".test-history";

/// Every key the resolver understands.
pub const KNOWN_KEYS: &[&str] = &[
    "analysis.name-threshold",
    "analysis.assertion-threshold",
    "analysis.fragile-threshold",
    "analysis.overlap-threshold",
    "analysis.history-dir",
    "analysis.module-search-paths",
    "analysis.deprecation-markers",
    "cleanup.min-fixture-frequency",
    "cleanup.abort-on-error",
    "runner.timeout-secs",
    "runner.python-command",
    "runner.node-command",
    "validation.iterations",
    "validation.stability-threshold",
    "validation.workers",
    "output-dir",
    "backup-dir",
];

/// A flat configuration layer of normalized dotted keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub values: BTreeMap<String, String>,
}

impl ConfigLayer {
    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(normalize_key(key), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&normalize_key(key)).map(String::as_str)
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        let layer = layer_from_yaml_value(&value);
        for key in layer.values.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                let hint = StructuredError::unknown_config_key(key, KNOWN_KEYS);
                tracing::warn!(
                    path = %path.display(),
                    key = %key,
                    hint = hint.hint.as_deref().unwrap_or(""),
                    "Ignoring unknown config key"
                );
            }
        }
        Ok(layer)
    }

    /// Build a layer from environment variables.
    ///
    /// Each known key is read from `TJ_<KEY>` (dots and dashes become
    /// underscores), and also from the short form without the section
    /// (`TJ_FRAGILE_THRESHOLD`). The full form wins.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|name| env::var(name).ok())
    }

    fn from_env_with<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut layer = Self::default();
        for key in KNOWN_KEYS {
            let full = env_var_name(key);
            let short = key
                .split_once('.')
                .map(|(_, rest)| env_var_name(rest));
            let value = lookup(&full).or_else(|| short.as_deref().and_then(&lookup));
            if let Some(value) = value {
                layer.insert(key, value);
            }
        }
        layer
    }
}

/// CLI overrides for config loading (optional).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub history_dir: Option<PathBuf>,
    pub fragile_threshold: Option<f64>,
    pub name_threshold: Option<f64>,
    pub assertion_threshold: Option<f64>,
    pub iterations: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub workers: Option<usize>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();

        if let Some(path) = &self.output_dir {
            layer.insert("output-dir", path.to_string_lossy());
        }
        if let Some(path) = &self.backup_dir {
            layer.insert("backup-dir", path.to_string_lossy());
        }
        if let Some(path) = &self.history_dir {
            layer.insert("analysis.history-dir", path.to_string_lossy());
        }
        if let Some(value) = self.fragile_threshold {
            layer.insert("analysis.fragile-threshold", value.to_string());
        }
        if let Some(value) = self.name_threshold {
            layer.insert("analysis.name-threshold", value.to_string());
        }
        if let Some(value) = self.assertion_threshold {
            layer.insert("analysis.assertion-threshold", value.to_string());
        }
        if let Some(value) = self.iterations {
            layer.insert("validation.iterations", value.to_string());
        }
        if let Some(value) = self.timeout_secs {
            layer.insert("runner.timeout-secs", value.to_string());
        }
        if let Some(value) = self.workers {
            layer.insert("validation.workers", value.to_string());
        }

        layer
    }
}

/// Analysis thresholds and lookup paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub name_threshold: f64,
    pub assertion_threshold: f64,
    pub fragile_threshold: f64,
    pub overlap_threshold: f64,
    pub history_dir: PathBuf,
    pub module_search_paths: Vec<PathBuf>,
    /// Extra deprecation markers on top of the built-in list.
    pub deprecation_markers: Vec<String>,
}

/// Cleanup behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupConfig {
    pub min_fixture_frequency: usize,
    pub abort_on_error: bool,
}

/// External runner commands and limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub timeout_secs: u64,
    pub python_command: Vec<String>,
    pub node_command: Vec<String>,
}

/// Validation probe settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub iterations: usize,
    pub stability_threshold: f64,
    pub workers: usize,
}

/// Fully resolved configuration for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JanitorConfig {
    pub target: PathBuf,
    pub output_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub analysis: AnalysisConfig,
    pub cleanup: CleanupConfig,
    pub runner: RunnerConfig,
    pub validation: ValidationConfig,
}

impl JanitorConfig {
    /// Defaults for a target directory.
    #[must_use]
    pub fn defaults_for(target: &Path) -> Self {
        let workers = std::thread::available_parallelism().map_or(4, std::num::NonZero::get);
        Self {
            target: target.to_path_buf(),
            output_dir: target.join(DEFAULT_OUTPUT_DIR),
            backup_dir: target.join(DEFAULT_BACKUP_DIR),
            analysis: AnalysisConfig {
                name_threshold: 0.7,
                assertion_threshold: 0.5,
                fragile_threshold: 0.05,
                overlap_threshold: 0.9,
                history_dir: target.join(DEFAULT_HISTORY_DIR),
                module_search_paths: Vec::new(),
                deprecation_markers: Vec::new(),
            },
            cleanup: CleanupConfig {
                min_fixture_frequency: 2,
                abort_on_error: false,
            },
            runner: RunnerConfig {
                timeout_secs: 300,
                python_command: split_command("python -m pytest"),
                node_command: split_command("npx vitest run"),
            },
            validation: ValidationConfig {
                iterations: 100,
                stability_threshold: 0.95,
                workers,
            },
        }
    }

    /// Resolve a merged layer on top of the defaults.
    ///
    /// Relative paths in the layer are resolved against the target.
    ///
    /// # Errors
    ///
    /// Returns an error when a value does not parse or is out of range.
    pub fn from_layer(target: &Path, layer: &ConfigLayer) -> Result<Self> {
        let mut config = Self::defaults_for(target);
        let resolve = |value: &str| {
            let path = PathBuf::from(value.trim());
            if path.is_absolute() { path } else { target.join(path) }
        };

        if let Some(v) = layer.get("output-dir") {
            config.output_dir = resolve(v);
        }
        if let Some(v) = layer.get("backup-dir") {
            config.backup_dir = resolve(v);
        }

        let analysis = &mut config.analysis;
        if let Some(v) = parse_ratio(layer, "analysis.name-threshold")? {
            analysis.name_threshold = v;
        }
        if let Some(v) = parse_ratio(layer, "analysis.assertion-threshold")? {
            analysis.assertion_threshold = v;
        }
        if let Some(v) = parse_ratio(layer, "analysis.fragile-threshold")? {
            analysis.fragile_threshold = v;
        }
        if let Some(v) = parse_ratio(layer, "analysis.overlap-threshold")? {
            analysis.overlap_threshold = v;
        }
        if let Some(v) = layer.get("analysis.history-dir") {
            analysis.history_dir = resolve(v);
        }
        if let Some(v) = layer.get("analysis.module-search-paths") {
            analysis.module_search_paths = split_list(v).iter().map(|p| resolve(p)).collect();
        }
        if let Some(v) = layer.get("analysis.deprecation-markers") {
            analysis.deprecation_markers = split_list(v);
        }

        if let Some(v) = parse_number::<usize>(layer, "cleanup.min-fixture-frequency")? {
            if v < 2 {
                return Err(JanitorError::invalid_value(
                    "cleanup.min-fixture-frequency",
                    "must be at least 2",
                ));
            }
            config.cleanup.min_fixture_frequency = v;
        }
        if let Some(v) = layer.get("cleanup.abort-on-error") {
            config.cleanup.abort_on_error = parse_bool(v).ok_or_else(|| {
                JanitorError::invalid_value("cleanup.abort-on-error", format!("not a bool: {v}"))
            })?;
        }

        if let Some(v) = parse_number::<u64>(layer, "runner.timeout-secs")? {
            if v == 0 {
                return Err(JanitorError::invalid_value(
                    "runner.timeout-secs",
                    "must be positive",
                ));
            }
            config.runner.timeout_secs = v;
        }
        if let Some(v) = layer.get("runner.python-command") {
            config.runner.python_command = non_empty_command("runner.python-command", v)?;
        }
        if let Some(v) = layer.get("runner.node-command") {
            config.runner.node_command = non_empty_command("runner.node-command", v)?;
        }

        if let Some(v) = parse_number::<usize>(layer, "validation.iterations")? {
            config.validation.iterations = v;
        }
        if let Some(v) = parse_ratio(layer, "validation.stability-threshold")? {
            config.validation.stability_threshold = v;
        }
        if let Some(v) = parse_number::<usize>(layer, "validation.workers")? {
            config.validation.workers = v.max(1);
        }

        Ok(config)
    }

    /// Look up a single effective value by key, as a display string.
    ///
    /// # Errors
    ///
    /// Returns a config error (with near-match hints) for unknown keys.
    pub fn get_display(&self, key: &str) -> Result<String> {
        let key = normalize_key(key);
        let join = |paths: &[PathBuf]| {
            paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        let value = match key.as_str() {
            "analysis.name-threshold" => self.analysis.name_threshold.to_string(),
            "analysis.assertion-threshold" => self.analysis.assertion_threshold.to_string(),
            "analysis.fragile-threshold" => self.analysis.fragile_threshold.to_string(),
            "analysis.overlap-threshold" => self.analysis.overlap_threshold.to_string(),
            "analysis.history-dir" => self.analysis.history_dir.display().to_string(),
            "analysis.module-search-paths" => join(&self.analysis.module_search_paths),
            "analysis.deprecation-markers" => self.analysis.deprecation_markers.join(","),
            "cleanup.min-fixture-frequency" => self.cleanup.min_fixture_frequency.to_string(),
            "cleanup.abort-on-error" => self.cleanup.abort_on_error.to_string(),
            "runner.timeout-secs" => self.runner.timeout_secs.to_string(),
            "runner.python-command" => self.runner.python_command.join(" "),
            "runner.node-command" => self.runner.node_command.join(" "),
            "validation.iterations" => self.validation.iterations.to_string(),
            "validation.stability-threshold" => self.validation.stability_threshold.to_string(),
            "validation.workers" => self.validation.workers.to_string(),
            "output-dir" => self.output_dir.display().to_string(),
            "backup-dir" => self.backup_dir.display().to_string(),
            _ => {
                let structured = StructuredError::unknown_config_key(&key, KNOWN_KEYS);
                return Err(JanitorError::Config(format!(
                    "{} ({})",
                    structured.message,
                    structured.hint.unwrap_or_default()
                )));
            }
        };
        Ok(value)
    }
}

/// Load user config (~/.config/test-janitor/config.yaml).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<ConfigLayer> {
    user_config_path().map_or_else(
        || Ok(ConfigLayer::default()),
        |path| ConfigLayer::from_yaml(&path),
    )
}

/// `~/.config/test-janitor/config.yaml`, when `HOME` is set.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    let home = env::var("HOME").ok()?;
    Some(
        Path::new(&home)
            .join(".config")
            .join("test-janitor")
            .join("config.yaml"),
    )
}

/// Load project config (`<target>/.test-janitor.yaml`).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(target: &Path) -> Result<ConfigLayer> {
    ConfigLayer::from_yaml(&target.join(PROJECT_CONFIG_FILE))
}

/// Load configuration with the standard precedence order.
///
/// # Errors
///
/// Returns an error if any config file cannot be read or parsed, or a value
/// is invalid.
pub fn load_config(target: &Path, cli: &CliOverrides) -> Result<JanitorConfig> {
    let merged = ConfigLayer::merge_layers(&[
        load_user_config()?,
        load_project_config(target)?,
        ConfigLayer::from_env(),
        cli.as_layer(),
    ]);
    tracing::debug!(
        keys = merged.values.len(),
        target = %target.display(),
        "Resolved config layers"
    );
    JanitorConfig::from_layer(target, &merged)
}

/// Split a command string on whitespace.
#[must_use]
pub fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

fn non_empty_command(field: &str, value: &str) -> Result<Vec<String>> {
    let parts = split_command(value);
    if parts.is_empty() {
        return Err(JanitorError::invalid_value(field, "command cannot be empty"));
    }
    Ok(parts)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_var_name(key: &str) -> String {
    format!(
        "{ENV_PREFIX}{}",
        key.to_uppercase().replace(['.', '-'], "_")
    )
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number<T: std::str::FromStr>(layer: &ConfigLayer, key: &str) -> Result<Option<T>> {
    layer
        .get(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| JanitorError::invalid_value(key, format!("not a number: {value}")))
        })
        .transpose()
}

fn parse_ratio(layer: &ConfigLayer, key: &str) -> Result<Option<f64>> {
    let Some(value) = parse_number::<f64>(layer, key)? else {
        return Ok(None);
    };
    if !(0.0..=1.0).contains(&value) {
        return Err(JanitorError::invalid_value(
            key,
            format!("{value} is outside 0.0..=1.0"),
        ));
    }
    Ok(Some(value))
}

fn layer_from_yaml_value(value: &serde_yaml::Value) -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    let mut flat = BTreeMap::new();
    flatten_yaml(value, "", &mut flat);

    for (key, value) in flat {
        layer.insert(&key, value);
    }

    layer
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut BTreeMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        serde_yaml::Value::Sequence(values) => {
            let joined = values
                .iter()
                .filter_map(yaml_scalar_to_string)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}
