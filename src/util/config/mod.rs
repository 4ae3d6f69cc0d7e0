//! love-fragment configuration
//!
//! Settings for one embedded session: the synthetic command line handed to the
//! engine, the bootstrap module names, worker thread parameters and the
//! optional bound on the shutdown wait.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (LOVE_FRAGMENT_*)
//! 3. Config file (love-fragment.toml, or $LOVE_FRAGMENT_CONFIG)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use love_fragment::util::config::FragmentConfig;
//!
//! let config = FragmentConfig::default();
//! assert_eq!(config.program_name, "love");
//! assert!(config.quit_timeout().is_none());
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::worker::BootPlan;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "LOVE_FRAGMENT_CONFIG";
/// Environment override for [`FragmentConfig::quit_timeout_ms`].
pub const QUIT_TIMEOUT_ENV: &str = "LOVE_FRAGMENT_QUIT_TIMEOUT_MS";
/// Environment override for [`FragmentConfig::thread_name`].
pub const THREAD_NAME_ENV: &str = "LOVE_FRAGMENT_THREAD_NAME";
/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "love-fragment.toml";

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentConfig {
    /// argv[0] sentinel handed to the engine
    #[serde(default = "default_program_name")]
    pub program_name: String,
    /// Label stored at arg index -1
    #[serde(default = "default_boot_script_label")]
    pub boot_script_label: String,
    /// Name of the dedicated worker thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    /// Worker stack size in bytes (platform default when unset)
    #[serde(default)]
    pub stack_size: Option<usize>,
    /// Window id stamped on injected lifecycle events
    #[serde(default = "default_window_id")]
    pub window_id: u32,
    /// Upper bound on the shutdown wait; unset waits forever
    #[serde(default)]
    pub quit_timeout_ms: Option<u64>,
    /// Bootstrap module names
    #[serde(default)]
    pub modules: ModuleConfig,
}

/// Bootstrap module names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Pre-runtime setup module
    #[serde(default = "default_setup_module")]
    pub setup: String,
    /// Main engine module
    #[serde(default = "default_main_module")]
    pub main: String,
    /// Boot sequence module
    #[serde(default = "default_boot_module")]
    pub boot: String,
}

fn default_program_name() -> String {
    "love".to_string()
}

fn default_boot_script_label() -> String {
    "embedded boot.lua".to_string()
}

fn default_thread_name() -> String {
    "LoveMain".to_string()
}

fn default_window_id() -> u32 {
    1
}

fn default_setup_module() -> String {
    "love.jitsetup".to_string()
}

fn default_main_module() -> String {
    "love".to_string()
}

fn default_boot_module() -> String {
    "love.boot".to_string()
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            setup: default_setup_module(),
            main: default_main_module(),
            boot: default_boot_module(),
        }
    }
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            program_name: default_program_name(),
            boot_script_label: default_boot_script_label(),
            thread_name: default_thread_name(),
            stack_size: None,
            window_id: default_window_id(),
            quit_timeout_ms: None,
            modules: ModuleConfig::default(),
        }
    }
}

impl FragmentConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: FragmentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve the full configuration from the process environment.
    ///
    /// `explicit` wins over `$LOVE_FRAGMENT_CONFIG`, which wins over
    /// `./love-fragment.toml`. A missing default file is not an error; a
    /// missing explicit file is.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `LOVE_FRAGMENT_*` overrides through a lookup function.
    pub fn apply_overrides<F>(
        &mut self,
        lookup: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(QUIT_TIMEOUT_ENV) {
            let raw = raw.trim();
            self.quit_timeout_ms = if raw.is_empty() {
                None
            } else {
                Some(raw.parse().map_err(|_| ConfigError::Invalid {
                    key: QUIT_TIMEOUT_ENV,
                    reason: format!("expected milliseconds, got {:?}", raw),
                })?)
            };
        }
        if let Some(name) = lookup(THREAD_NAME_ENV) {
            self.thread_name = name;
        }
        self.validate()
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.program_name.is_empty() {
            return Err(ConfigError::Invalid {
                key: "program_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.thread_name.is_empty() || self.thread_name.contains('\0') {
            return Err(ConfigError::Invalid {
                key: "thread_name",
                reason: "must be a non-empty string without NUL".to_string(),
            });
        }
        for (key, name) in [
            ("modules.setup", &self.modules.setup),
            ("modules.main", &self.modules.main),
            ("modules.boot", &self.modules.boot),
        ] {
            if name.is_empty() {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "module name must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Shutdown wait bound, if any.
    #[inline]
    pub fn quit_timeout(&self) -> Option<Duration> {
        self.quit_timeout_ms.map(Duration::from_millis)
    }

    /// Bootstrap plan derived from [`ModuleConfig`].
    pub fn boot_plan(&self) -> BootPlan {
        BootPlan {
            setup_module: self.modules.setup.clone(),
            main_module: self.modules.main.clone(),
            boot_module: self.modules.boot.clone(),
        }
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
