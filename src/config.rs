//! # Configuration
//!
//! Settings come from an optional TOML file, searched in a fixed priority
//! order, with the deployment's environment variables layered on top once at
//! startup. The result is turned into an explicit [`CompressorConfig`], so
//! the compressor itself never reads the environment.

use crate::compressor::CompressorConfig;
use crate::error::{ConfigError, Result};
use crate::ghostscript::{DEFAULT_PROBE_TIMEOUT, DEFAULT_RUN_TIMEOUT};
use crate::locate::{self, Platform};
use crate::profile::{self, Downsampling, Profile, QualityPreset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

pub const ENV_MAX_MB: &str = "PDF_CLOUDINARY_MAX_MB";
pub const ENV_GHOSTSCRIPT_PATH: &str = "GHOSTSCRIPT_PATH";
pub const ENV_QUALITIES: &str = "PDF_GS_QUALITIES";
pub const ENV_QUALITY: &str = "PDF_GS_QUALITY";
pub const ENV_AGGRESSIVE: &str = "PDF_GS_AGGRESSIVE";
pub const ENV_TIMEOUT: &str = "PDF_GS_TIMEOUT_SECS";
pub const ENV_PROBE_TIMEOUT: &str = "PDF_GS_PROBE_TIMEOUT_SECS";

/// Top-level configuration structure.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
}

/// Compressor settings. Every field has a default.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Size budget in megabytes (at least 1, fractions allowed).
    #[serde(default = "default_max_mb")]
    pub max_mb: f64,

    /// Explicit Ghostscript binary, tried before any discovered one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ghostscript_path: Option<String>,

    /// Presets tried in order, gentlest first.
    #[serde(default = "profile::default_ladder")]
    pub qualities: Vec<QualityPreset>,

    /// Append the `/screen` + downsampling pass after the ladder.
    #[serde(default = "default_aggressive")]
    pub aggressive: bool,

    /// Ceiling for one Ghostscript run, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Ceiling for the availability probe, in seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Directory for compressed outputs (defaults to the OS temp dir).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Resolution caps for the aggressive pass.
    #[serde(default)]
    pub downsampling: Downsampling,
}

fn default_max_mb() -> f64 {
    10.0
}
fn default_aggressive() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    DEFAULT_RUN_TIMEOUT.as_secs()
}
fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_secs()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_mb: default_max_mb(),
            ghostscript_path: None,
            qualities: profile::default_ladder(),
            aggressive: default_aggressive(),
            timeout_secs: default_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            temp_dir: None,
            downsampling: Downsampling::default(),
        }
    }
}

impl Settings {
    /// Budget in bytes.
    pub fn max_bytes(&self) -> u64 {
        mb_to_bytes(self.max_mb)
    }

    pub fn profiles(&self) -> Vec<Profile> {
        let aggressive = self.aggressive.then_some(&self.downsampling);
        profile::build_profiles(&self.qualities, aggressive)
    }

    pub fn candidates(&self, platform: Platform, program_dirs: &[PathBuf]) -> Vec<String> {
        locate::candidates(self.ghostscript_path.as_deref(), platform, program_dirs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Resolves settings for the running platform.
    pub fn compressor_config(&self) -> CompressorConfig {
        let candidates = self.candidates(Platform::current(), &locate::program_dirs_from_env());
        let mut config = CompressorConfig::new(self.max_bytes(), self.profiles(), candidates);
        config.timeout = Duration::from_secs(self.timeout_secs);
        if let Some(dir) = &self.temp_dir {
            config.temp_dir = dir.clone();
        }
        config
    }

    /// Layers environment overrides on top of the file settings.
    ///
    /// `lookup` returns the value of a variable; blank values count as unset.
    /// The legacy single quality only applies when no ladder is given.
    pub fn apply_env<F>(&mut self, lookup: F) -> std::result::Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get(ENV_MAX_MB) {
            self.max_mb = parse_megabytes(ENV_MAX_MB, &v)?;
        }
        if let Some(v) = get(ENV_GHOSTSCRIPT_PATH) {
            self.ghostscript_path = Some(v);
        }

        let ladder = match get(ENV_QUALITIES) {
            Some(raw) => profile::parse_ladder(&raw)?,
            None => Vec::new(),
        };
        if !ladder.is_empty() {
            self.qualities = ladder;
        } else if let Some(v) = get(ENV_QUALITY) {
            self.qualities = vec![v.parse()?];
        }

        if let Some(v) = get(ENV_AGGRESSIVE) {
            self.aggressive = !v.eq_ignore_ascii_case("false");
        }
        if let Some(v) = get(ENV_TIMEOUT) {
            self.timeout_secs = parse_number(ENV_TIMEOUT, &v)?;
        }
        if let Some(v) = get(ENV_PROBE_TIMEOUT) {
            self.probe_timeout_secs = parse_number(ENV_PROBE_TIMEOUT, &v)?;
        }
        Ok(())
    }
}

/// Converts a megabyte budget to bytes, with a 1 MB floor.
///
/// Float-to-integer casts saturate, so huge budgets become `u64::MAX`.
pub fn mb_to_bytes(mb: f64) -> u64 {
    (mb.max(1.0) * 1024.0 * 1024.0) as u64
}

/// Parses a megabyte value such as `10` or `2.5`.
pub fn parse_megabytes(key: &str, value: &str) -> std::result::Result<f64, ConfigError> {
    match value.parse::<f64>() {
        Ok(mb) if mb.is_finite() && mb >= 0.0 => Ok(mb),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_number(key: &str, value: &str) -> std::result::Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Standard configuration file search paths, in descending priority order.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/noteflow-pdf.toml")];
    if let Ok(home) = env::var("HOME") {
        paths.push(PathBuf::from(format!("{home}/.config/noteflow-pdf.toml")));
    }
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(format!("{xdg}/noteflow-pdf.toml")));
    }
    paths.push(PathBuf::from("noteflow-pdf.toml"));
    paths
}

/// Loads the first config file found in the search path, or the defaults
/// when there is none, then applies the process environment.
pub fn load_config() -> Result<Config> {
    let found = config_search_paths().into_iter().find(|p| p.exists());
    let mut config = match found {
        Some(path) => read_config(&path)?,
        None => {
            log::debug!("no config file found, using defaults");
            Config::default()
        }
    };
    finish(&mut config)?;
    Ok(config)
}

/// Loads a specific file, then applies the process environment.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let mut config = read_config(path)?;
    finish(&mut config)?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    log::debug!("loaded config from {}", path.display());
    parse_config(path, &content)
}

fn parse_config(path: &Path, content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| {
        ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        }
        .into()
    })
}

fn finish(config: &mut Config) -> Result<()> {
    config.settings.apply_env(|key| env::var(key).ok())?;
    validate_settings(&config.settings)?;
    Ok(())
}

/// Validates configuration invariants after parsing and overrides.
fn validate_settings(settings: &Settings) -> std::result::Result<(), ConfigError> {
    if settings.qualities.is_empty() && !settings.aggressive {
        return Err(ConfigError::Validation {
            message: "no compression profiles: set at least one quality or enable aggressive"
                .to_string(),
        });
    }

    if !settings.max_mb.is_finite() || settings.max_mb < 0.0 {
        return Err(ConfigError::Validation {
            message: format!("max_mb must be a non-negative number, got {}", settings.max_mb),
        });
    }

    if settings.timeout_secs == 0 || settings.probe_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "timeouts must be greater than 0".to_string(),
        });
    }

    let caps = &settings.downsampling;
    if caps.color_dpi == 0 || caps.gray_dpi == 0 || caps.mono_dpi == 0 {
        return Err(ConfigError::Validation {
            message: "downsampling resolutions must be greater than 0".to_string(),
        });
    }

    Ok(())
}

/// Generates a default configuration file at the given path.
pub fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(anyhow::anyhow!("config file already exists: {}", path.display()).into());
    }

    let toml_str = toml::to_string_pretty(&Config::default())
        .map_err(|e| anyhow::anyhow!("failed to serialize config: {e}"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml_str)?;

    Ok(())
}
