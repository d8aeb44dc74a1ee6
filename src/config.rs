//! Configuration for the crawl, download and unfold commands.
//!
//! Persistent defaults live in `~/.config/asset-harvester/settings.json`
//! (or a file passed with `--config`). Command-line flags override them and
//! the result is turned into one typed config per command.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default catalog listing to crawl
pub const DEFAULT_BASE_URL: &str = "https://itch.io/game-assets/free";

/// Default number of catalog entries to collect
pub const DEFAULT_TARGET_COUNT: usize = 1000;

const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_GROWTH_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_STEP_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SETTLE_DELAY_MS: u64 = 1_000;

/// Leaf file types kept by the unfold pipeline.
pub fn default_accepted_extensions() -> Vec<String> {
    ["png", "gif", "svg"].iter().map(|s| s.to_string()).collect()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_growth_timeout_ms() -> u64 {
    DEFAULT_GROWTH_TIMEOUT_MS
}

fn default_step_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

/// User settings file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the geckodriver executable
    #[serde(default)]
    pub geckodriver_path: Option<PathBuf>,

    /// Run the browser headless unless a command overrides it
    #[serde(default)]
    pub headless: Option<bool>,

    /// Interval between visible-entry polls while waiting for the listing to grow
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long to wait for new listing entries after a scroll
    #[serde(default = "default_growth_timeout_ms")]
    pub growth_timeout_ms: u64,

    /// Ceiling for each wait in the download workflow
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    /// Pause after the download confirmation so the browser can finish writing
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Extensions (lowercase, no dot) kept by `unfold`
    #[serde(default = "default_accepted_extensions")]
    pub accepted_extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            geckodriver_path: None,
            headless: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            growth_timeout_ms: DEFAULT_GROWTH_TIMEOUT_MS,
            step_timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            accepted_extensions: default_accepted_extensions(),
        }
    }
}

impl Settings {
    /// Default settings file path (~/.config/asset-harvester/settings.json)
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("asset-harvester");
        Ok(dir.join("settings.json"))
    }

    /// Load settings from `path`, or the default location when `None`.
    ///
    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn growth_timeout(&self) -> Duration {
        Duration::from_millis(self.growth_timeout_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Browser session options shared by `crawl` and `download`
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run Firefox without a window
    pub headless: bool,

    /// geckodriver binary, spawned for the session
    pub geckodriver_path: Option<PathBuf>,

    /// Already-running WebDriver server (skips spawning geckodriver)
    pub webdriver_url: Option<String>,

    /// Directory Firefox saves downloads into
    pub download_dir: Option<PathBuf>,
}

impl BrowserConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.webdriver_url.is_some() {
            return Ok(());
        }

        match &self.geckodriver_path {
            None => Err(ConfigError::MissingDriver),
            Some(p) if p.components().count() > 1 && !p.exists() => {
                Err(ConfigError::DriverNotFound(p.clone()))
            }
            Some(_) => Ok(()),
        }
    }
}

/// Configuration for a catalog crawl
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Listing page to start from
    pub base_url: String,

    /// Directory receiving one JSON file per discovered entry
    pub out_dir: PathBuf,

    /// Stop once at least this many entries were parsed
    pub target_count: usize,

    /// Interval between visible-entry polls
    pub poll_interval: Duration,

    /// Give up waiting for new entries after this long
    pub growth_timeout: Duration,
}

impl CrawlConfig {
    pub fn from_settings(base_url: String, out_dir: PathBuf, target_count: usize, settings: &Settings) -> Self {
        Self {
            base_url,
            out_dir,
            target_count,
            poll_interval: settings.poll_interval(),
            growth_timeout: settings.growth_timeout(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_count == 0 {
            return Err(ConfigError::ZeroTarget);
        }
        validate_timing(self.poll_interval, self.growth_timeout)
    }
}

/// Configuration for the download run
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Directory of metadata JSON files written by `crawl`
    pub metadata_dir: PathBuf,

    /// Directory receiving the archives and the ledger
    pub out_dir: PathBuf,

    /// Ceiling for each wait in the checkout sequence
    pub step_timeout: Duration,

    /// Interval between element polls during a wait
    pub poll_interval: Duration,

    /// Pause after the download confirmation appears
    pub settle_delay: Duration,
}

impl DownloadConfig {
    pub fn from_settings(metadata_dir: PathBuf, out_dir: PathBuf, settings: &Settings) -> Self {
        Self {
            metadata_dir,
            out_dir,
            step_timeout: settings.step_timeout(),
            poll_interval: settings.poll_interval(),
            settle_delay: settings.settle_delay(),
        }
    }

    /// Path of the download ledger
    pub fn ledger_path(&self) -> PathBuf {
        self.out_dir.join("assets.csv")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.metadata_dir.is_dir() {
            return Err(ConfigError::MetadataDirNotFound(self.metadata_dir.clone()));
        }
        validate_timing(self.poll_interval, self.step_timeout)
    }
}

/// Configuration for flattening downloaded packs
#[derive(Debug, Clone)]
pub struct UnfoldConfig {
    /// Directory whose direct entries are unfolded
    pub input_dir: PathBuf,

    /// Root of the type-partitioned output tree
    pub output_dir: PathBuf,

    /// Extensions kept as leaf files (lowercase, no dot)
    pub accepted_extensions: Vec<String>,
}

impl UnfoldConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.input_dir.is_dir() {
            return Err(ConfigError::InputDirNotFound(self.input_dir.clone()));
        }
        if self.accepted_extensions.is_empty() {
            return Err(ConfigError::NoAcceptedExtensions);
        }
        Ok(())
    }
}

fn validate_timing(poll: Duration, ceiling: Duration) -> Result<(), ConfigError> {
    if poll.is_zero() || poll > ceiling {
        return Err(ConfigError::InvalidTiming { poll, ceiling });
    }
    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("geckodriver path is required (--geckodriver, settings file, or --webdriver-url)")]
    MissingDriver,

    #[error("geckodriver not found: {0}")]
    DriverNotFound(PathBuf),

    #[error("Target count must be at least 1")]
    ZeroTarget,

    #[error("Poll interval {poll:?} must be non-zero and not exceed the wait ceiling {ceiling:?}")]
    InvalidTiming { poll: Duration, ceiling: Duration },

    #[error("Metadata directory not found: {0}")]
    MetadataDirNotFound(PathBuf),

    #[error("Asset directory not found: {0}")]
    InputDirNotFound(PathBuf),

    #[error("At least one accepted extension is required")]
    NoAcceptedExtensions,
}
