//! Configuration file support.
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/troop/config.toml`
//! - macOS: `~/Library/Application Support/troop/config.toml`
//! - Windows: `%APPDATA%\troop\config.toml`
//!
//! Every section is optional; missing values fall back to the defaults
//! below. The network credential may be stored here, but front ends usually
//! pass it in from the command line or the environment instead.

use crate::backend::BackendKind;
use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which backend to construct at startup
    pub backend: BackendKind,
    /// Local participant
    pub session: SessionSettings,
    /// Embedded engine settings
    pub embedded: EmbeddedSettings,
    /// OSC network settings
    pub network: NetworkSettings,
    /// External REPL settings
    pub process: ProcessSettings,
}

impl Config {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Err(Error::Config(format!("Config file not found at {:?}", path)))
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration, or return the default if there is no file.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default() -> Result<Self> {
        match Self::config_path() {
            Ok(path) => Self::load_from_or_default(&path),
            Err(e) => {
                log::debug!("{}, using default config", e);
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from `path`, or return the default if it does not exist.
    pub fn load_from_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "troop") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }
}

/// The local participant's identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Name shown in front of echoed code
    pub name: String,
    /// Display colour for echoed code
    pub colour: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            name: "troop".to_string(),
            colour: crate::echo::DEFAULT_COLOUR.to_string(),
        }
    }
}

/// Embedded engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddedSettings {
    /// Initial tempo in BPM
    pub bpm: f64,
    /// Maximum script operations per block (guards against runaway loops)
    pub max_operations: u64,
}

impl Default for EmbeddedSettings {
    fn default() -> Self {
        Self {
            bpm: crate::clock::DEFAULT_BPM,
            max_operations: crate::engine::DEFAULT_MAX_OPERATIONS,
        }
    }
}

/// OSC network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Host running sclang with the Troop quark
    pub host: String,
    /// sclang's OSC port
    pub port: u16,
    /// OSC address the quark listens on
    pub address: String,
    /// Shared secret expected by the quark
    pub credential: Option<String>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 57120,
            address: crate::backend::network::TROOP_ADDRESS.to_string(),
            credential: None,
        }
    }
}

/// External REPL settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSettings {
    /// REPL executable
    pub program: String,
    /// Extra arguments for the REPL
    pub args: Vec<String>,
    /// Number of output channels (d1..dN) bound during bootstrap
    pub channels: u8,
    /// How long to wait for the REPL's first output, in milliseconds
    pub startup_timeout_ms: u64,
    /// How long the REPL gets to exit after its input closes, in milliseconds
    pub shutdown_grace_ms: u64,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            program: "ghci".to_string(),
            args: Vec::new(),
            channels: 9,
            startup_timeout_ms: 30_000,
            shutdown_grace_ms: 2_000,
        }
    }
}

impl ProcessSettings {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
