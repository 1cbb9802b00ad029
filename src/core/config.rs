//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.hashnav/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::compaction::CompactionConfig;
use crate::core::router::RouterConfig;

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct HashnavConfig {
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub compaction: CompactionSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RouterSection {
    pub technical_parameters: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CompactionSection {
    pub retained_parameters: Option<Vec<String>>,
    pub threshold: Option<usize>,
    pub reference_parameter: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub file: Option<String>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_TECHNICAL_PARAMETERS: &[&str] = &[
    "sap-ui-app-id-hint",
    "sap-ui-debug",
    "sap-ui-fl-control-variant-id",
    "sap-ui-fl-max-layer",
    "sap-ui-fl-version",
    "sap-ui-tech-hint",
];
pub const DEFAULT_RETAINED_PARAMETERS: &[&str] = &[
    "sap-system",
    "sap-ushell-navmode",
    "sap-xapp-state",
    "sap-iapp-state",
];
pub const DEFAULT_REFERENCE_PARAMETER: &str = "sap-intent-param";
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 0;
pub const DEFAULT_LOG_LEVEL: &str = "debug";
pub const DEFAULT_LOG_FILE: &str = "hashnav.log";

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub technical_parameters: BTreeSet<String>,
    pub retained_parameters: Vec<String>,
    pub compaction_threshold: usize,
    pub reference_parameter: String,
    pub log_level: String,
    pub log_file: String,
}

impl ResolvedConfig {
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            technical_parameters: self.technical_parameters.clone(),
        }
    }

    pub fn compaction_config(&self) -> CompactionConfig {
        CompactionConfig {
            retained_parameters: self.retained_parameters.clone(),
            threshold: self.compaction_threshold,
            reference_parameter: self.reference_parameter.clone(),
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.hashnav/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".hashnav").join("config.toml"))
}

/// Load config from `~/.hashnav/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `HashnavConfig::default()`.
pub fn load_config() -> Result<HashnavConfig, ConfigError> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(HashnavConfig::default());
        }
    };

    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(&path);
        return Ok(HashnavConfig::default());
    }

    load_config_from(&path)
}

/// Load config from an explicit path. A missing file is an error here.
pub fn load_config_from(path: &Path) -> Result<HashnavConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: HashnavConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}

fn generate_default_config(path: &Path) {
    let default_content = r#"# hashnav configuration
# All settings are optional; defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [router]
# Parameters ignored when deciding whether two fragments carry the same parameters.
# technical_parameters = ["sap-ui-debug", "sap-ui-fl-version"]   # Or HASHNAV_TECHNICAL_PARAMETERS=a,b

# [compaction]
# retained_parameters = ["sap-system", "sap-xapp-state"]          # Always kept inline
# threshold = 0                                                   # Minimum hash length before compacting
# reference_parameter = "sap-intent-param"

# [logging]
# level = "debug"                    # Or HASHNAV_LOG_LEVEL
# file = "hashnav.log"               # Or HASHNAV_LOG_FILE
"#;

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Failed to create config directory: {}", e);
            return;
        }
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
///
/// `cli_log_level` comes from the command line (None = not specified).
pub fn resolve(config: &HashnavConfig, cli_log_level: Option<&str>) -> ResolvedConfig {
    // Technical parameters: env → config → default
    let technical_parameters = std::env::var("HASHNAV_TECHNICAL_PARAMETERS")
        .ok()
        .map(|list| split_list(&list))
        .or_else(|| config.router.technical_parameters.clone())
        .unwrap_or_else(|| to_strings(DEFAULT_TECHNICAL_PARAMETERS))
        .into_iter()
        .collect();

    let retained_parameters = config
        .compaction
        .retained_parameters
        .clone()
        .unwrap_or_else(|| to_strings(DEFAULT_RETAINED_PARAMETERS));

    // Log level: CLI → env → config → default
    let log_level = cli_log_level
        .map(|s| s.to_string())
        .or_else(|| std::env::var("HASHNAV_LOG_LEVEL").ok())
        .or_else(|| config.logging.level.clone())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

    let log_file = std::env::var("HASHNAV_LOG_FILE")
        .ok()
        .or_else(|| config.logging.file.clone())
        .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());

    ResolvedConfig {
        technical_parameters,
        retained_parameters,
        compaction_threshold: config
            .compaction
            .threshold
            .unwrap_or(DEFAULT_COMPACTION_THRESHOLD),
        reference_parameter: config
            .compaction
            .reference_parameter
            .clone()
            .unwrap_or_else(|| DEFAULT_REFERENCE_PARAMETER.to_string()),
        log_level,
        log_file,
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn to_strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
