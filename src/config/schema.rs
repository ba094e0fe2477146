//! Configuration schema for Burrow
//!
//! Configuration is stored at `~/.config/burrow/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Chroot layout settings
    pub chroot: ChrootConfig,

    /// Tarball cache settings
    pub cache: CacheConfig,

    /// Remote fetch settings
    pub fetch: FetchConfig,

    /// SDK defaults
    pub sdk: SdkConfig,
}

/// General application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Baseline verbosity, same scale as repeated `-v` flags
    pub verbose: u8,
}

impl Config {
    /// Effective verbosity: the louder of the command line and the config
    pub fn verbosity(&self, cli_verbose: u8) -> u8 {
        cli_verbose.max(self.general.verbose)
    }
}

/// Chroot layout configuration
///
/// Unset paths are derived from the source root: `<source_root>/chroot`
/// and `<source_root>/out`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChrootConfig {
    /// Chroot root tree
    pub dir: Option<PathBuf>,

    /// Persistent out-of-chroot storage
    pub out_dir: Option<PathBuf>,

    /// Root of the source checkout; defaults to the current directory
    pub source_root: Option<PathBuf>,

    /// Directory of versioned upgrade hooks; defaults to
    /// `<source_root>/sdk/hooks`
    pub hooks_dir: Option<PathBuf>,

    /// User to run commands as inside the chroot; defaults to the
    /// invoking user
    pub user: Option<String>,
}

/// Tarball cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root; defaults to `~/.cache/burrow`
    pub dir: Option<PathBuf>,

    /// Evict entries untouched for this many days
    pub max_age_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_age_days: 30,
        }
    }
}

/// Remote fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Base URL of the SDK archive
    pub base_url: String,

    /// Retries per download before giving up
    pub retries: u32,

    /// Concurrent component downloads
    pub parallelism: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://storage.googleapis.com/burrow-sdk".to_string(),
            retries: 3,
            parallelism: 2,
        }
    }
}

/// SDK defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Default board when none is given on the command line
    pub board: Option<String>,
}
