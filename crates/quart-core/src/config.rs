//! Configuration resolution for Quart.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/quart/settings.json)
//! 3. Project config (.quart/settings.json)
//! 4. Environment variables (`QUART_*`)
//! 5. CLI arguments (highest priority, applied by the binary)
//!
//! Config files may be partial. Each layer is deep-merged into the one below
//! it, so a project file that only sets `params.security` keeps every other
//! value from the global file.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete Quart configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub params: ProtocolParams,
    #[serde(default)]
    pub network: NetworkConfig,
    /// Directory holding published `<party>_pkey.pem` files. `None` means the
    /// current directory.
    #[serde(default)]
    pub keys_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            params: ProtocolParams::default(),
            network: NetworkConfig::default(),
            keys_dir: None,
            log_level: default_log_level(),
        }
    }
}

/// Security and correctness parameters of the key exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// Raw-qubit over-provisioning factor `c`; the sender transmits
    /// `ceil((4 + c) * n) + 25` qubits for an `n`-bit key.
    pub correctness: f64,
    /// Security parameter; smaller is stricter.
    pub security: f64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            correctness: 2.0,
            security: 0.01,
        }
    }
}

/// Timeouts and limits of the classical and quantum links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub receive_timeout_secs: u64,
    /// How often to look for the peer's published public key.
    pub key_poll_interval_ms: u64,
    pub key_wait_timeout_secs: u64,
    /// Frames announcing a longer body are rejected.
    pub max_frame_bytes: u64,
    pub reconnect: ReconnectConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            receive_timeout_secs: 120,
            key_poll_interval_ms: 250,
            key_wait_timeout_secs: 60,
            max_frame_bytes: 64 * 1024 * 1024, // 64 MiB
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Backoff used while dialing the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            multiplier: 2.0,
            max_attempts: 20,
        }
    }
}

impl Config {
    /// Key directory, falling back to the current directory.
    pub fn keys_dir(&self) -> PathBuf {
        self.keys_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<()> {
        let ProtocolParams {
            correctness,
            security,
        } = self.params;
        if !correctness.is_finite() || correctness < 0.0 {
            return Err(Error::Config(format!(
                "params.correctness must be a non-negative number, got {correctness}"
            )));
        }
        if !(security > 0.0 && security <= 1.0) {
            return Err(Error::Config(format!(
                "params.security must be in (0, 1], got {security}"
            )));
        }
        let reconnect = &self.network.reconnect;
        if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
            return Err(Error::Config(format!(
                "network.reconnect.multiplier must be at least 1, got {}",
                reconnect.multiplier
            )));
        }
        if reconnect.initial_delay_ms > reconnect.max_delay_ms {
            return Err(Error::Config(
                "network.reconnect.initial_delay_ms exceeds max_delay_ms".into(),
            ));
        }
        if self.network.max_frame_bytes == 0 {
            return Err(Error::Config("network.max_frame_bytes must be positive".into()));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            merge_config(&mut merged, load_config_file(&global_path)?);
        }
    }

    if let Some(dir) = project_dir {
        let project_path = project_config_path(dir);
        if project_path.exists() {
            merge_config(&mut merged, load_config_file(&project_path)?);
        }
    }

    let mut config: Config = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// `<dir>/.quart/settings.json`.
pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(".quart").join("settings.json")
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".quart").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/quart/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("quart").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Deep-merge `overlay` into `base`. Objects merge key by key, anything else
/// replaces.
fn merge_config(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_config(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(n) = var("QUART_CORRECTNESS").and_then(|v| v.parse().ok()) {
        config.params.correctness = n;
    }
    if let Some(n) = var("QUART_SECURITY").and_then(|v| v.parse().ok()) {
        config.params.security = n;
    }
    if let Some(n) = var("QUART_RECEIVE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.network.receive_timeout_secs = n;
    }
    if let Some(n) = var("QUART_MAX_FRAME_BYTES").and_then(|v| v.parse().ok()) {
        config.network.max_frame_bytes = n;
    }
    if let Some(dir) = var("QUART_KEYS_DIR") {
        config.keys_dir = Some(PathBuf::from(dir));
    }
    if let Some(level) = var("QUART_LOG_LEVEL") {
        config.log_level = level;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.params.correctness, 2.0);
        assert_eq!(config.params.security, 0.01);
        assert_eq!(config.network.receive_timeout_secs, 120);
        assert_eq!(config.network.reconnect.max_attempts, 20);
        config.validate().unwrap();
    }

    #[test]
    fn empty_file_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn partial_overlay_keeps_sibling_values() {
        let mut base = serde_json::to_value(Config::default()).unwrap();
        merge_config(
            &mut base,
            serde_json::json!({ "network": { "reconnect": { "max_attempts": 3 } } }),
        );
        merge_config(&mut base, serde_json::json!({ "params": { "security": 0.001 } }));
        let config: Config = serde_json::from_value(base).unwrap();
        assert_eq!(config.network.reconnect.max_attempts, 3);
        assert_eq!(config.network.reconnect.initial_delay_ms, 100);
        assert_eq!(config.params.security, 0.001);
        assert_eq!(config.params.correctness, 2.0);
    }

    #[test]
    fn project_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".quart")).unwrap();
        std::fs::write(
            project_config_path(dir.path()),
            r#"{ "params": { "correctness": 3.5 }, "keys_dir": "/tmp/keys" }"#,
        )
        .unwrap();
        let config = load_config(Some(dir.path())).unwrap();
        assert_eq!(config.params.correctness, 3.5);
        assert_eq!(config.keys_dir(), PathBuf::from("/tmp/keys"));
    }

    #[test]
    fn malformed_project_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".quart")).unwrap();
        std::fs::write(project_config_path(dir.path()), "{ not json").unwrap();
        assert!(matches!(load_config(Some(dir.path())), Err(Error::Config(_))));
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let vars: HashMap<&str, &str> = [
            ("QUART_SECURITY", "0.05"),
            ("QUART_CORRECTNESS", "not-a-number"),
            ("QUART_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(ToString::to_string));
        assert_eq!(config.params.security, 0.05);
        assert_eq!(config.params.correctness, 2.0);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn out_of_range_params_are_rejected() {
        let mut config = Config::default();
        config.params.security = 0.0;
        assert!(config.validate().is_err());
        config.params.security = 1.5;
        assert!(config.validate().is_err());
        config.params.security = 1.0;
        config.params.correctness = -0.1;
        assert!(config.validate().is_err());
        config.params.correctness = 0.0;
        config.validate().unwrap();
    }

    #[test]
    fn keys_dir_defaults_to_cwd() {
        assert_eq!(Config::default().keys_dir(), PathBuf::from("."));
    }
}
