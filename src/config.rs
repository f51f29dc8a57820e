//! Configuration for the network menu
//!
//! Loads configuration from TOML file at `~/.config/area/netmenu.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::popup::Side;
use crate::session::SessionPolicy;

/// Setting this (to anything) treats every connectivity below full as a
/// captive portal
pub const CONNECTIVITY_TEST_ENV: &str = "AREA_CONNECTIVITY_TEST";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub menu: MenuConfig,
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            // Auto-generate default config file
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default().with_env());
        }

        Ok(Self::load_from(&config_path)?.with_env())
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("area");

        Ok(config_dir.join("netmenu.toml"))
    }

    /// Save default configuration to file
    pub fn save_default(path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string)
            .context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }

    fn with_env(mut self) -> Self {
        if std::env::var_os(CONNECTIVITY_TEST_ENV).is_some() {
            debug!("{} set, enabling connectivity test mode", CONNECTIVITY_TEST_ENV);
            self.network.connectivity_test = true;
        }
        self
    }

    /// Session policy of a regular session, as far as configured
    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            allow_settings: self.session.allow_settings,
            has_windows: self.session.has_windows,
            ..SessionPolicy::default()
        }
    }
}

/// Network applet configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Devices listed per category before collapsing into a summary row
    pub max_device_items: usize,
    /// Wi-Fi networks listed per device
    pub max_visible_networks: usize,
    /// Treat limited connectivity as a captive portal
    pub connectivity_test: bool,
    /// Notify when a connection fails to activate
    pub notify_activation_failures: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_device_items: 4,
            max_visible_networks: 8,
            connectivity_test: false,
            notify_activation_failures: true,
        }
    }
}

/// Popup menu configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuConfig {
    /// Side of the panel the arrow points to
    pub arrow_side: Side,
}

/// Session overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Show "Settings" actions
    pub allow_settings: bool,
    /// Offer actions that need an application window (e.g. Wi-Fi networks
    /// without a saved connection)
    pub has_windows: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allow_settings: true,
            has_windows: true,
        }
    }
}
