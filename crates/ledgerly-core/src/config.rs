//! Application configuration
//!
//! Loaded with a two-layer resolution:
//! 1. Override file in the data dir (~/.local/share/ledgerly/config.toml)
//! 2. Embedded defaults (compiled into the binary)
//!
//! Keys missing from an override keep their default value.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::policy::DEFAULT_APPROACHING_LIMIT_RATIO;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/ledgerly.toml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Organization used when none is given
    pub default_organization_id: i64,
    /// Share of `max_amount` at which policy evaluation warns
    pub approaching_limit_ratio: f64,
    /// Largest page size list endpoints will return
    pub max_page_limit: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_organization_id: 1,
            approaching_limit_ratio: DEFAULT_APPROACHING_LIMIT_RATIO,
            max_page_limit: 500,
        }
    }
}

impl AppConfig {
    /// Load from the default override location, falling back to embedded defaults
    pub fn load() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => parse_config(DEFAULT_CONFIG),
        }
    }

    /// Load from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        parse_config(&content)
    }

    /// Clamp a requested page size into `1..=max_page_limit`
    pub fn page_limit(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(100)
            .clamp(1, self.max_page_limit.max(1))
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("ledgerly").join("config.toml"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    organization: Option<RawOrganization>,
    policy: Option<RawPolicy>,
    server: Option<RawServer>,
}

#[derive(Debug, Deserialize)]
struct RawOrganization {
    default_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawPolicy {
    approaching_limit_ratio: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawServer {
    max_page_limit: Option<i64>,
}

/// Parse config from TOML content
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = AppConfig::default();

    if let Some(org) = raw.organization {
        if let Some(id) = org.default_id {
            config.default_organization_id = id;
        }
    }

    if let Some(policy) = raw.policy {
        if let Some(ratio) = policy.approaching_limit_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(Error::Config(format!(
                    "policy.approaching_limit_ratio must be between 0 and 1, got {}",
                    ratio
                )));
            }
            config.approaching_limit_ratio = ratio;
        }
    }

    if let Some(server) = raw.server {
        if let Some(limit) = server.max_page_limit {
            if limit < 1 {
                return Err(Error::Config(
                    "server.max_page_limit must be at least 1".to_string(),
                ));
            }
            config.max_page_limit = limit;
        }
    }

    Ok(config)
}
