//! The set of directories registered with the notification source.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::{RecursiveMode, Watcher};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::Result;

/// Registers a single directory with the notification source.
pub trait WatchRegistrar: Send {
    /// Start receiving events for the direct children of `path`.
    fn register(&mut self, path: &Path) -> notify::Result<()>;
}

impl WatchRegistrar for Box<dyn Watcher + Send> {
    fn register(&mut self, path: &Path) -> notify::Result<()> {
        self.watch(path, RecursiveMode::NonRecursive)
    }
}

/// Directories currently watched, together with the handle that watches them.
///
/// Entries are never removed, not even when the directory is deleted. A
/// stale entry does not stop a later registration of the same path: a
/// directory deleted and created again is a new directory to the OS and
/// needs a new watch.
pub struct WatchSet<R> {
    /// Notification source handle.
    registrar: R,

    /// Registered directory paths.
    watched: HashSet<PathBuf>,

    /// Whether the tree walk follows symbolic links.
    follow_symlinks: bool,
}

impl<R: WatchRegistrar> WatchSet<R> {
    /// Create an empty watch set around a notification source.
    pub fn new(registrar: R) -> Self {
        Self {
            registrar,
            watched: HashSet::new(),
            follow_symlinks: false,
        }
    }

    /// Follow symbolic links while walking.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Walk the tree under `root` and register every directory in it.
    ///
    /// Any walk or registration failure aborts the walk: a partially
    /// registered tree would leave whole subtrees silently unmonitored.
    pub fn initialize(&mut self, root: &Path) -> Result<usize> {
        let walker = WalkDir::new(root).follow_links(self.follow_symlinks);

        let mut registered = 0;
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                continue;
            }
            if self.add_directory(entry.path())? {
                registered += 1;
            }
        }

        info!(
            "Registered {registered} directories under {}",
            root.display()
        );
        Ok(registered)
    }

    /// Register a single directory.
    ///
    /// The notification source is always asked to watch `path`; registering
    /// the same live directory twice leaves a single watch behind. Returns
    /// `Ok(true)` when the path was not in the set before.
    pub fn add_directory(&mut self, path: &Path) -> Result<bool> {
        self.registrar.register(path)?;

        if self.watched.insert(path.to_path_buf()) {
            debug!("Started watching: {}", path.display());
            Ok(true)
        } else {
            debug!("Refreshed watch: {}", path.display());
            Ok(false)
        }
    }

    /// Register the subdirectories that already exist below a newly created
    /// directory.
    ///
    /// Failures are logged and skipped. Returns the number of directories
    /// registered.
    pub fn add_tree(&mut self, path: &Path) -> usize {
        let walker = WalkDir::new(path)
            .min_depth(1)
            .follow_links(self.follow_symlinks);

        let mut registered = 0;
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to walk new directory {}: {e}", path.display());
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            match self.add_directory(entry.path()) {
                Ok(_) => registered += 1,
                Err(e) => warn!(
                    "Failed to add new directory to watcher {}: {e}",
                    entry.path().display()
                ),
            }
        }
        registered
    }

    /// Check if a directory is watched.
    pub fn contains(&self, path: &Path) -> bool {
        self.watched.contains(path)
    }

    /// Number of watched directories.
    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    /// Iterate over watched directories.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.watched.iter().map(PathBuf::as_path)
    }

    /// The notification source handle.
    pub fn registrar(&self) -> &R {
        &self.registrar
    }
}
