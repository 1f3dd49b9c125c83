//! Command-line arguments and their resolution into a [`WatcherConfig`].

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dirguard_watcher::{EventFilter, WatcherConfig};

/// Default log file, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "monitor.log";

#[derive(Parser, Debug)]
#[command(name = "dirguard", version)]
#[command(about = "Watch a directory tree and remove files with disallowed extensions")]
#[command(after_help = "EXIT CODES:
    1  Startup failed (bad root, unreadable allowlist, watcher setup)
    2  Invalid arguments

The process keeps running until it is killed.")]
pub struct Args {
    /// Directory to monitor [default: .]
    pub dir: Option<PathBuf>,

    /// Log file, appended to; falls back to stdout if it cannot be opened
    #[arg(short, long, default_value = DEFAULT_LOG_FILE)]
    pub log: PathBuf,

    /// Comma-separated event kinds to log: create,write,remove,rename,move,chmod;
    /// rename includes moves [default: create,write,remove,rename]
    #[arg(short, long)]
    pub events: Option<String>,

    /// File with one allowed extension per line [default: allowed_extensions.txt]
    #[arg(short = 'x', long)]
    pub extensions: Option<PathBuf>,

    /// JSON configuration file; explicit flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Poll for changes at this interval instead of using native notifications
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Report removed files in the log only
    #[arg(long)]
    pub no_desktop_notify: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Merge built-in defaults, the config file and explicit flags.
    pub fn resolve(&self) -> Result<WatcherConfig> {
        let mut config = match &self.config {
            Some(path) => WatcherConfig::from_json_file(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => WatcherConfig::default(),
        };

        if let Some(dir) = &self.dir {
            config.root = dir.clone();
        }
        if let Some(events) = &self.events {
            config.events = events
                .parse::<EventFilter>()
                .with_context(|| format!("invalid event list {events:?}"))?;
        }
        if let Some(extensions) = &self.extensions {
            config.allowlist_path = extensions.clone();
        }
        if let Some(interval) = self.poll_interval_ms {
            config = config.with_poll_interval(Duration::from_millis(interval));
        }
        if self.no_desktop_notify {
            config = config.without_desktop_notifications();
        }

        config.validate()?;
        Ok(config)
    }
}
