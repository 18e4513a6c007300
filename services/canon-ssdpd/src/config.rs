//! Daemon settings.
//!
//! Device definitions come from the key file named on the command line.
//! Everything else is read from `CANON_SSDP_*` environment variables:
//!
//! | Variable                           | Default                    |
//! |------------------------------------|----------------------------|
//! | `CANON_SSDP_LOG_LEVEL`             | `info`                     |
//! | `CANON_SSDP_DESCRIPTION_FILE`      | `canon-ssdp.xml`           |
//! | `CANON_SSDP_HTTP_PORT`             | `0` (ephemeral)            |
//! | `CANON_SSDP_SERVER_ID`             | see [`DEFAULT_SERVER_ID`]  |
//! | `CANON_SSDP_SEARCH_TARGET`         | `ssdp:all`                 |
//! | `CANON_SSDP_SEARCH_INTERVAL_SECS`  | `60`                       |
//! | `CANON_SSDP_MAX_AGE_SECS`          | `1800`                     |

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CANON_SSDP";

/// `SERVER` header sent with our own announcements. Some Canon cameras
/// ignore devices that do not claim to be Windows.
pub const DEFAULT_SERVER_ID: &str = "Microsoft-Windows-NT/5.1 UPnP/1.0 UPnP-Device-Host/1.0";

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Device description document, created if absent.
    #[serde(default = "default_description_file")]
    pub description_file: PathBuf,

    /// Port serving the description document.
    #[serde(default)]
    pub http_port: u16,

    /// `SERVER` header for our announcements.
    #[serde(default = "default_server_id")]
    pub server_id: String,

    /// Search target used when browsing.
    #[serde(default = "default_search_target")]
    pub search_target: String,

    /// Interval between `M-SEARCH` rounds.
    #[serde(default = "default_search_interval_secs")]
    pub search_interval_secs: u64,

    /// Lifetime advertised for our own device.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_description_file() -> PathBuf {
    PathBuf::from("canon-ssdp.xml")
}

fn default_server_id() -> String {
    DEFAULT_SERVER_ID.to_string()
}

fn default_search_target() -> String {
    canon_ssdp_protocol::SSDP_ALL.to_string()
}

fn default_search_interval_secs() -> u64 {
    60
}

fn default_max_age_secs() -> u32 {
    canon_ssdp_protocol::DEFAULT_MAX_AGE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            description_file: default_description_file(),
            http_port: 0,
            server_id: default_server_id(),
            search_target: default_search_target(),
            search_interval_secs: default_search_interval_secs(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn from_source(source: ::config::Environment) -> Result<Self> {
        ::config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read environment configuration")?
            .try_deserialize()
            .context("Invalid environment configuration")
    }

    pub fn search_interval(&self) -> Duration {
        Duration::from_secs(self.search_interval_secs.max(1))
    }

    /// Interval between our own `ssdp:alive` rounds.
    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_age_secs / 2).max(1))
    }
}
