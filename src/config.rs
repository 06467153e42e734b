//! Configuration management for oscbell
//!
//! Settings come from `~/.oscbell/config.toml`, then environment
//! variables, then command-line flags. The resolved settings live in a
//! [`SharedSettings`] snapshot that dispatch reads on every notification,
//! so enable/disable and reload take effect immediately.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::terminal::osc::DEFAULT_TITLE;

/// oscbell configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Master switch: when off, terminal output is not parsed at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Send notifications to the desktop notifier
    #[serde(default = "default_true")]
    pub prefer_external_notifications: bool,

    /// Show the in-terminal banner
    #[serde(default = "default_true")]
    pub show_in_app_notification: bool,

    /// Drop OSC 9;4 progress reports (Ghostty, Windows Terminal)
    #[serde(default = "default_true")]
    pub ignore_progress_style_subtype4: bool,

    /// Title used when a notification has none
    #[serde(default = "default_title")]
    pub default_title: String,

    /// Icon passed to the desktop notifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<PathBuf>,

    /// macOS: bundle id the notification appears to come from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// macOS: bundle id to activate when the notification is clicked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activate_id: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            prefer_external_notifications: true,
            show_in_app_notification: true,
            ignore_progress_style_subtype4: true,
            default_title: default_title(),
            icon: None,
            sender: None,
            activate_id: None,
        }
    }
}

impl Settings {
    /// Get config directory path (~/.oscbell)
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".oscbell"))
    }

    /// Get config file path (~/.oscbell/config.toml)
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, or defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save config atomically
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // Atomic write: write to temp file then rename
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &contents)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to rename config file to {}", path.display()))?;

        Ok(())
    }

    /// Apply environment and command-line overrides on top of file values
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(v) = overrides.external {
            self.prefer_external_notifications = v;
        }
        if let Some(v) = overrides.in_app {
            self.show_in_app_notification = v;
        }
        if let Some(v) = overrides.show_progress {
            self.ignore_progress_style_subtype4 = !v;
        }
        if let Some(title) = &overrides.default_title {
            self.default_title = title.clone();
        }
        self
    }
}

/// Values that take precedence over the config file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    pub external: Option<bool>,
    pub in_app: Option<bool>,
    pub show_progress: Option<bool>,
    /// Label for untitled notifications (`watch --name`)
    pub default_title: Option<String>,
}

impl Overrides {
    /// Read OSCBELL_EXTERNAL, OSCBELL_IN_APP and OSCBELL_SHOW_PROGRESS
    pub fn from_env() -> Self {
        let flag = |name: &str| env::var(name).ok().and_then(|v| parse_flag(&v));
        Self {
            external: flag("OSCBELL_EXTERNAL"),
            in_app: flag("OSCBELL_IN_APP"),
            show_progress: flag("OSCBELL_SHOW_PROGRESS"),
            default_title: None,
        }
    }

    /// Layer `other` on top of `self`; set values in `other` win
    pub fn merge(self, other: &Overrides) -> Self {
        Self {
            external: other.external.or(self.external),
            in_app: other.in_app.or(self.in_app),
            show_progress: other.show_progress.or(self.show_progress),
            default_title: other.default_title.clone().or(self.default_title),
        }
    }
}

/// Parse a boolean-ish environment value
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// Settings shared between the session task, dispatch and the control socket
#[derive(Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> Settings {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn replace(&self, settings: Settings) {
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = settings;
    }

    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        f(&mut self.inner.write().unwrap_or_else(|p| p.into_inner()));
    }
}
