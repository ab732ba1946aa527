//! Configuration management for fluxplayer
//!
//! This module handles loading and managing application configuration
//! from config files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::provider::ProviderId;
use crate::utils::error::{FluxError, IntoFluxError, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Embed providers and their domain rings
    pub providers: ProvidersConfig,

    /// Session controller timings and resume policy
    pub session: SessionConfig,

    /// Cosmetic embed URL parameters
    pub embed: EmbedConfig,

    /// General application settings
    pub general: GeneralConfig,
}

/// Both embed providers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Provider used when no preference has been persisted yet
    pub default_provider: ProviderId,

    /// Provider A
    pub a: ProviderSettings,

    /// Provider B
    pub b: ProviderSettings,
}

/// One embed provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Substring that identifies the provider's message origins
    pub family: String,

    /// Fallback ring of hostnames, tried in order
    pub domains: Vec<String>,

    /// Path between the host and `{kind}/{id}`
    #[serde(default = "default_embed_path")]
    pub embed_path: String,
}

fn default_embed_path() -> String {
    "embed".to_string()
}

/// Session controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay between player-ready and the deferred resume seek
    pub seek_settle_ms: u64,

    /// Time allowed for the first success signal after a load
    pub load_timeout_ms: u64,

    /// Number of countdown ticks before auto-advancing
    pub countdown_ticks: u32,

    /// Length of one countdown tick
    pub countdown_tick_ms: u64,

    /// How long a manual selection suppresses auto-advance
    pub manual_window_ms: u64,

    /// Minimum spacing of throttled progress writes
    pub progress_throttle_ms: u64,

    /// Resume positions below this are ignored
    pub resume_min_secs: f64,

    /// Resume positions above this are applied by a deferred seek
    pub resume_url_max_secs: f64,

    /// Rewind applied when reopening an almost finished title
    pub near_end_rewind_secs: f64,

    /// Percent watched above which a title counts as almost finished
    pub near_end_percent: f64,
}

/// Fixed embed parameters passed through to the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Player accent color (hex without '#')
    pub color: String,

    /// Start playback as soon as the frame loads
    pub autoplay: bool,

    /// Default subtitle language
    pub subtitle_language: String,

    /// Show captions by default
    pub captions: bool,
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Override for the key-value store file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// Capacity of the "my list" collection
    pub my_list_limit: usize,

    /// Capacity of the "continue watching" collection
    pub continue_watching_limit: usize,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderId::A,
            a: ProviderSettings {
                family: "vidfast".to_string(),
                domains: vec![
                    "vidfast.pro".to_string(),
                    "vidfast.in".to_string(),
                    "vidfast.io".to_string(),
                    "vidfast.me".to_string(),
                    "vidfast.net".to_string(),
                ],
                embed_path: default_embed_path(),
            },
            b: ProviderSettings {
                family: "videasy".to_string(),
                domains: vec!["player.videasy.net".to_string()],
                embed_path: default_embed_path(),
            },
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seek_settle_ms: 1_500,
            load_timeout_ms: 15_000,
            countdown_ticks: 5,
            countdown_tick_ms: 1_000,
            manual_window_ms: 30_000,
            progress_throttle_ms: 5_000,
            resume_min_secs: 60.0,
            resume_url_max_secs: 300.0,
            near_end_rewind_secs: 60.0,
            near_end_percent: 95.0,
        }
    }
}

impl SessionConfig {
    pub fn seek_settle(&self) -> Duration {
        Duration::from_millis(self.seek_settle_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn manual_window(&self) -> Duration {
        Duration::from_millis(self.manual_window_ms)
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            color: "e50914".to_string(),
            autoplay: true,
            subtitle_language: "en".to_string(),
            captions: false,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            store_path: None,
            my_list_limit: 12,
            continue_watching_limit: 100,
        }
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/fluxplayer/config.toml on Linux)
    /// 3. User config file (~/.config/fluxplayer/config.toml on Linux)
    /// 4. Environment variables (FLUX_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config.merge_from_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config.merge_from_file(&user_path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load a single file on top of the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge_from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path()
            .ok_or_else(|| FluxError::Config("Cannot determine user config path".to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self).config_err("Failed to serialize config")?;
        std::fs::write(&path, toml).config_err("Failed to write config file")?;

        Ok(())
    }

    /// Default location of the key-value store file
    pub fn store_path(&self) -> PathBuf {
        if let Some(path) = &self.general.store_path {
            return path.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fluxplayer")
            .join("store.json")
    }

    /// Merge configuration from a TOML file
    ///
    /// The file's tables are merged key by key over the current values, so
    /// a later file only overrides what it names and earlier layers survive.
    fn merge_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path).config_err("Failed to read config file")?;
        let overlay: toml::Table = toml::from_str(&contents).config_err("Failed to parse config file")?;

        let mut merged = match toml::Value::try_from(&*self).config_err("Failed to serialize config")? {
            toml::Value::Table(table) => table,
            _ => return Err(FluxError::Config("Config did not serialize to a table".to_string())),
        };
        merge_tables(&mut merged, overlay);

        *self = toml::Value::Table(merged)
            .try_into()
            .config_err("Failed to parse config file")?;
        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(provider) = std::env::var("FLUX_PROVIDER") {
            self.providers.default_provider = provider
                .parse()
                .map_err(|_| FluxError::Config("Invalid FLUX_PROVIDER".to_string()))?;
        }

        if let Ok(timeout) = std::env::var("FLUX_LOAD_TIMEOUT_MS") {
            self.session.load_timeout_ms = timeout
                .parse()
                .map_err(|_| FluxError::Config("Invalid FLUX_LOAD_TIMEOUT_MS".to_string()))?;
        }

        if let Ok(window) = std::env::var("FLUX_MANUAL_WINDOW_MS") {
            self.session.manual_window_ms = window
                .parse()
                .map_err(|_| FluxError::Config("Invalid FLUX_MANUAL_WINDOW_MS".to_string()))?;
        }

        if let Ok(path) = std::env::var("FLUX_STORE_PATH") {
            self.general.store_path = Some(PathBuf::from(path));
        }

        if let Ok(log_level) = std::env::var("FLUX_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for (id, settings) in [(ProviderId::A, &self.providers.a), (ProviderId::B, &self.providers.b)] {
            if settings.domains.is_empty() {
                return Err(FluxError::Config(format!("Provider {} has no domains", id)));
            }
            if settings.domains.iter().any(|d| d.trim().is_empty() || d.contains('/')) {
                return Err(FluxError::Config(format!(
                    "Provider {} domains must be bare hostnames",
                    id
                )));
            }
            if settings.family.trim().is_empty() {
                return Err(FluxError::Config(format!("Provider {} has an empty family", id)));
            }
        }

        let session = &self.session;
        if session.resume_min_secs > session.resume_url_max_secs {
            return Err(FluxError::Config(
                "resume_min_secs must not exceed resume_url_max_secs".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&session.near_end_percent) {
            return Err(FluxError::Config(
                "near_end_percent must be between 0 and 100".to_string(),
            ));
        }
        if session.load_timeout_ms == 0 || session.countdown_tick_ms == 0 {
            return Err(FluxError::Config("Session timers must be non-zero".to_string()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(FluxError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, valid_log_levels
            )));
        }

        if self.general.my_list_limit == 0 || self.general.continue_watching_limit == 0 {
            return Err(FluxError::Config("Collection limits must be non-zero".to_string()));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/fluxplayer/config.toml"));

        #[cfg(target_os = "windows")]
        return std::env::var("PROGRAMDATA")
            .ok()
            .map(|p| PathBuf::from(p).join("fluxplayer").join("config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/fluxplayer/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("fluxplayer").join("config.toml"))
    }
}

/// Deep-merge `overlay` into `base`; non-table values replace
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(overlay_table) = value {
            if let Some(toml::Value::Table(base_table)) = base.get_mut(&key) {
                merge_tables(base_table, overlay_table);
                continue;
            }
            base.insert(key, toml::Value::Table(overlay_table));
        } else {
            base.insert(key, value);
        }
    }
}
