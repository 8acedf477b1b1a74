//! Client configuration.
//!
//! Loaded from `config.toml` in the platform config directory (or an explicit
//! path). Problems never abort startup: they come back as warnings next to a
//! usable configuration, and the caller decides how to surface them.

use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gridshare_model::model::UserId;

/// Refuse to read config files larger than this.
const MAX_CONFIG_BYTES: u64 = 64 * 1024;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000/api";

/// When a committed edit triggers a reload of the sheet's computed values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPolicy {
    /// After every plain literal edit.
    Always,
    /// Only when some formula on the sheet reads the edited cell.
    #[default]
    Dependents,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    pub max_reconnect_attempts: u32,
    pub backoff_step_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            backoff_step_ms: 1000,
        }
    }
}

impl SyncSettings {
    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditSettings {
    pub reload_delay_ms: u64,
    pub reload_policy: ReloadPolicy,
}

impl Default for EditSettings {
    fn default() -> Self {
        Self {
            reload_delay_ms: 150,
            reload_policy: ReloadPolicy::default(),
        }
    }
}

impl EditSettings {
    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistorySettings {
    pub capacity: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self { capacity: 50 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub api_base: String,
    /// WebSocket origin. Derived from `api_base` when absent.
    pub ws_base: Option<String>,
    pub token: Option<String>,
    /// Identity used when the server cannot be asked (offline mode).
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub sync: SyncSettings,
    pub edit: EditSettings,
    pub history: HistorySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            ws_base: None,
            token: None,
            user_id: None,
            username: None,
            sync: SyncSettings::default(),
            edit: EditSettings::default(),
            history: HistorySettings::default(),
        }
    }
}

impl Config {
    /// Parse TOML text. Unknown keys are errors.
    pub fn from_toml(text: &str) -> Result<Config, String> {
        let config: Config = toml::from_str(text).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.history.capacity == 0 {
            return Err("history.capacity must be at least 1".to_string());
        }
        if self.api_base.trim().is_empty() {
            return Err("api_base must not be empty".to_string());
        }
        Ok(())
    }

    /// The WebSocket origin: `ws_base`, or `api_base` with its scheme swapped
    /// and any `/api` suffix dropped.
    pub fn effective_ws_base(&self) -> String {
        if let Some(ws) = self.ws_base.as_deref().filter(|s| !s.trim().is_empty()) {
            return ws.trim_end_matches('/').to_string();
        }
        let base = self.api_base.trim_end_matches('/');
        let base = base.strip_suffix("/api").unwrap_or(base);
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        }
    }
}

/// Load configuration, returning warnings for anything that was ignored.
///
/// With no explicit path, a missing user config file is not a warning.
pub fn load_config(explicit: Option<&Path>) -> (Config, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();
    let path = explicit.map(Path::to_path_buf).or_else(user_config_path);

    let Some(path) = path else {
        return (Config::default(), warnings);
    };

    if !path.exists() {
        if explicit.is_some() {
            warnings.push(format!("Config file not found: {}", path.display()));
        }
        return (Config::default(), warnings);
    }

    match std::fs::metadata(&path) {
        Ok(meta) if meta.len() > MAX_CONFIG_BYTES => {
            warnings.push(format!(
                "Ignoring {}: larger than {} bytes",
                path.display(),
                MAX_CONFIG_BYTES
            ));
            return (Config::default(), warnings);
        }
        Ok(_) => {}
        Err(err) => {
            warnings.push(format!("Failed to read {}: {}", path.display(), err));
            return (Config::default(), warnings);
        }
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match Config::from_toml(&content) {
            Ok(config) => (config, warnings),
            Err(err) => {
                warnings.push(format!("Failed to parse {}: {}", path.display(), err));
                (Config::default(), warnings)
            }
        },
        Err(err) => {
            warnings.push(format!("Failed to read {}: {}", path.display(), err));
            (Config::default(), warnings)
        }
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "gridshare")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("config.toml");
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sync.max_reconnect_attempts, 5);
        assert_eq!(config.sync.backoff_step(), Duration::from_secs(1));
        assert_eq!(config.edit.reload_delay(), Duration::from_millis(150));
        assert_eq!(config.edit.reload_policy, ReloadPolicy::Dependents);
        assert_eq!(config.history.capacity, 50);
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = Config::from_toml(
            r#"
            api_base = "https://sheets.example.com/api"
            token = "abc"

            [edit]
            reload_policy = "always"

            [sync]
            backoff_step_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert_eq!(config.edit.reload_policy, ReloadPolicy::Always);
        assert_eq!(config.edit.reload_delay_ms, 150);
        assert_eq!(config.sync.backoff_step_ms, 250);
        assert_eq!(config.sync.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        assert!(Config::from_toml("colour = \"red\"").is_err());
        assert!(Config::from_toml("[history]\ndepth = 3").is_err());
        assert!(Config::from_toml("[history]\ncapacity = 0").is_err());
    }

    #[test]
    fn test_effective_ws_base() {
        let mut config = Config::default();
        assert_eq!(config.effective_ws_base(), "ws://localhost:8000");

        config.api_base = "https://sheets.example.com/api/".into();
        assert_eq!(config.effective_ws_base(), "wss://sheets.example.com");

        config.ws_base = Some("wss://live.example.com/".into());
        assert_eq!(config.effective_ws_base(), "wss://live.example.com");
    }

    #[test]
    fn test_load_config_missing_explicit_file_warns() {
        let path = std::env::temp_dir().join("gridshare-missing-config-test.toml");
        let (config, warnings) = load_config(Some(&path));
        assert_eq!(config, Config::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("not found"));
    }

    #[test]
    fn test_load_config_bad_file_falls_back() {
        let path = std::env::temp_dir().join(format!(
            "gridshare-bad-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "api_base = [").unwrap();
        let (config, warnings) = load_config(Some(&path));
        let _ = std::fs::remove_file(&path);
        assert_eq!(config, Config::default());
        assert!(warnings[0].starts_with("Failed to parse"));
    }
}
