//! TOML-based configuration for livemerge.
//!
//! Every field has a default, so a missing file or an empty one yields a
//! working configuration. Relative paths are resolved against the working
//! directory of the merge, which is normally the repository root.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conflict::launcher::default_opener;
use crate::errors::ConfigError;
use crate::package::Compression;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Conflict hand-off settings.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Output file settings.
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Where conflict containers go, how the resolver is opened and how its
/// answer is collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Root for per-merge scratch directories holding containers.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Blank Live set the containers are built from.
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,

    /// File the resolver writes its choices to.
    #[serde(default = "default_resolution_file")]
    pub resolution_file: PathBuf,

    /// URI prefix the container paths are appended to.
    #[serde(default = "default_handler_uri")]
    pub handler_uri: String,

    /// Command that opens the URI.
    #[serde(default = "default_launcher")]
    pub launcher: String,

    /// Milliseconds between checks for the resolution file.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up after this many seconds. Waits forever when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from(".conftemp")
}
fn default_template_path() -> PathBuf {
    PathBuf::from(".merge/blank.xml")
}
fn default_resolution_file() -> PathBuf {
    PathBuf::from(".merge/done")
}
fn default_handler_uri() -> String {
    "jackdaw://merge/".into()
}
fn default_launcher() -> String {
    default_opener().into()
}
fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            template_path: default_template_path(),
            resolution_file: default_resolution_file(),
            handler_uri: default_handler_uri(),
            launcher: default_launcher(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: None,
        }
    }
}

impl ResolverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Whether the merged document is gzip-compressed.
    #[serde(default)]
    pub compression: Compression,
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl MergeConfig {
    /// Load a [`MergeConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: MergeConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let resolver = &self.resolver;
        for (field, path) in [
            ("resolver.scratch_dir", &resolver.scratch_dir),
            ("resolver.template_path", &resolver.template_path),
            ("resolver.resolution_file", &resolver.resolution_file),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "path must not be empty".into(),
                });
            }
        }
        if resolver.handler_uri.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "resolver.handler_uri".into(),
                detail: "handler URI must not be empty".into(),
            });
        }
        if resolver.launcher.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "resolver.launcher".into(),
                detail: "launcher command must not be empty".into(),
            });
        }
        if resolver.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "resolver.poll_interval_ms".into(),
                detail: "poll interval must be > 0".into(),
            });
        }
        if resolver.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "resolver.timeout_secs".into(),
                detail: "timeout must be > 0 when set".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}
