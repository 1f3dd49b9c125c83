//! Configuration for a watch session.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::EventFilter;
use crate::error::{Result, WatcherError};

/// Default allowlist file name, relative to the working directory.
pub const DEFAULT_ALLOWLIST: &str = "allowed_extensions.txt";

/// Configuration for watching a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Root of the watched tree.
    pub root: PathBuf,

    /// File listing the allowed extensions.
    pub allowlist_path: PathBuf,

    /// Operation kinds that get logged.
    pub events: EventFilter,

    /// Poll the file system at this interval instead of using the
    /// platform's native notifications.
    pub poll_interval_ms: Option<u64>,

    /// Whether to raise desktop notifications for removed files.
    pub desktop_notifications: bool,

    /// Whether the tree walk follows symbolic links.
    pub follow_symlinks: bool,
}

impl WatcherConfig {
    /// Create a new config for the given root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allowlist_path: PathBuf::from(DEFAULT_ALLOWLIST),
            events: EventFilter::default(),
            poll_interval_ms: None,
            desktop_notifications: true,
            follow_symlinks: false,
        }
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Set the allowlist file.
    pub fn with_allowlist(mut self, path: impl Into<PathBuf>) -> Self {
        self.allowlist_path = path.into();
        self
    }

    /// Set the logged event kinds.
    pub fn with_events(mut self, events: EventFilter) -> Self {
        self.events = events;
        self
    }

    /// Use polling with the given interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = Some(interval.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    /// Report removals in the log only.
    pub fn without_desktop_notifications(mut self) -> Self {
        self.desktop_notifications = false;
        self
    }

    /// Enable following symbolic links.
    pub fn follow_symlinks(mut self) -> Self {
        self.follow_symlinks = true;
        self
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    /// Check settings that cannot be expressed in the types.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == Some(0) {
            return Err(WatcherError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.root.as_os_str().is_empty() {
            return Err(WatcherError::Config("watch root is empty".to_string()));
        }
        Ok(())
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::new(".")
    }
}
