//! Startup: validate the root, build the notification source, seed the
//! watch set and hand back a dispatcher that is ready to run.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Config, PollWatcher, RecommendedWatcher, Watcher};
use tracing::info;

use crate::allowlist::AllowedExtensions;
use crate::config::WatcherConfig;
use crate::dispatcher::{Dispatcher, HandledEvent, SourceSenders, source_channels};
use crate::error::{Result, WatcherError};
use crate::notifier::Notifier;
use crate::policy::PolicyEnforcer;
use crate::watch_set::WatchSet;

/// Handle to the running notification source.
pub type SourceHandle = Box<dyn Watcher + Send>;

/// A fully initialized watch session.
pub struct Monitor {
    /// Canonical path of the watched root.
    root: PathBuf,

    dispatcher: Dispatcher<SourceHandle>,
}

impl Monitor {
    /// Set up everything needed to watch `config.root`.
    ///
    /// Every failure here is fatal: a bad root, an unreadable allowlist, a
    /// notification source that cannot start, or a tree that cannot be
    /// fully registered.
    pub fn start(config: &WatcherConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        config.validate()?;
        let root = validate_root(&config.root)?;
        let allowlist = AllowedExtensions::load(&config.allowlist_path)?;

        let (senders, receivers) = source_channels();
        let source = create_source(config, senders)?;

        let mut watch_set = WatchSet::new(source).follow_symlinks(config.follow_symlinks);
        watch_set.initialize(&root)?;

        info!("Starting to monitor directory: {}", root.display());

        let enforcer = PolicyEnforcer::new(allowlist, notifier);
        let dispatcher = Dispatcher::new(watch_set, config.events.clone(), enforcer, receivers);

        Ok(Self { root, dispatcher })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of directories registered so far.
    pub fn watched_directories(&self) -> usize {
        self.dispatcher.watch_set().len()
    }

    /// Handle the next item from the notification source.
    ///
    /// Returns `None` once the source has shut down.
    pub async fn next(&mut self) -> Option<Vec<HandledEvent>> {
        self.dispatcher.next().await
    }

    /// Run the event loop. Returns only if the notification source shuts down.
    pub async fn run(self) {
        self.dispatcher.run().await;
    }
}

/// Check that `path` is an existing directory and return its canonical form.
pub fn validate_root(path: &Path) -> Result<PathBuf> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(WatcherError::DirectoryNotFound(path.display().to_string()));
        }
        Err(source) => {
            return Err(WatcherError::RootUnavailable {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if !metadata.is_dir() {
        return Err(WatcherError::NotADirectory(path.display().to_string()));
    }

    Ok(path.canonicalize()?)
}

fn create_source(config: &WatcherConfig, senders: SourceSenders) -> Result<SourceHandle> {
    let handler = move |result: notify::Result<notify::Event>| senders.forward(result);

    let source: SourceHandle = match config.poll_interval() {
        Some(interval) => {
            info!("Polling for changes every {interval:?}");
            Box::new(PollWatcher::new(
                handler,
                Config::default().with_poll_interval(interval),
            )?)
        }
        None => Box::new(RecommendedWatcher::new(handler, Config::default())?),
    };
    Ok(source)
}
