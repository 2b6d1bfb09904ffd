use crate::domain::motion::DEFAULT_ACCEL_WINDOW;
use crate::domain::profile::DeviceIdentity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under the user config dir holding settings and profiles
pub const APP_DIR_NAME: &str = "BcoreDriver";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "bcore_driver".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    // Command scheduling
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    // Motion steering
    #[serde(default = "default_accel_window")]
    pub accel_window: usize,

    // Profiles live here; None means the user config dir
    #[serde(default)]
    pub profile_dir: Option<String>,

    #[serde(default)]
    pub last_device: Option<DeviceIdentity>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            tick_interval_ms: default_tick_interval_ms(),
            accel_window: default_accel_window(),
            profile_dir: None,
            last_device: None,
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    50
}
fn default_accel_window() -> usize {
    DEFAULT_ACCEL_WINDOW
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_else(|e| {
            tracing::debug!("Using default settings ({})", e);
            Settings::default()
        });

        Self {
            settings,
            settings_path,
        }
    }

    /// `<config_dir>/BcoreDriver`, created on demand
    pub fn app_dir() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push(APP_DIR_NAME);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = Self::app_dir()?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Profile directory from settings, or the default under the config dir
    pub fn profile_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.settings.profile_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(Self::app_dir()?.join("profiles")),
        }
    }

    pub fn remember_device(&mut self, identity: DeviceIdentity) -> anyhow::Result<()> {
        if self.settings.last_device.as_ref() != Some(&identity) {
            self.settings.last_device = Some(identity);
            self.save()?;
        }
        Ok(())
    }
}
