//! Raw file events and their operation kinds.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

use crate::error::WatcherError;

/// Kind of file system operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// An entry was created.
    Create,

    /// File contents were written.
    Write,

    /// An entry was removed.
    Remove,

    /// An entry was renamed within its directory.
    Rename,

    /// An entry was moved to another directory.
    Move,

    /// Permissions or other metadata changed.
    Chmod,
}

impl OpKind {
    /// All operation kinds, in display order.
    pub const ALL: [OpKind; 6] = [
        OpKind::Create,
        OpKind::Write,
        OpKind::Remove,
        OpKind::Rename,
        OpKind::Move,
        OpKind::Chmod,
    ];

    /// Lower-case name used in log lines and filter tokens.
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Write => "write",
            OpKind::Remove => "remove",
            OpKind::Rename => "rename",
            OpKind::Move => "move",
            OpKind::Chmod => "chmod",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = WatcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        OpKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == token)
            .ok_or_else(|| WatcherError::UnknownEventKind(s.trim().to_string()))
    }
}

/// A set of operation kinds.
///
/// One event may carry several kinds at once; two sets match when they
/// share at least one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpSet(BTreeSet<OpKind>);

impl OpSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set holding a single kind.
    pub fn single(kind: OpKind) -> Self {
        Self(BTreeSet::from([kind]))
    }

    /// Add a kind to the set.
    pub fn insert(&mut self, kind: OpKind) {
        self.0.insert(kind);
    }

    pub fn contains(&self, kind: OpKind) -> bool {
        self.0.contains(&kind)
    }

    /// Whether the two sets share at least one kind.
    pub fn intersects(&self, other: &OpSet) -> bool {
        self.0.iter().any(|kind| other.contains(*kind))
    }

    /// Kinds present in both sets, in display order.
    pub fn intersection<'a>(&'a self, other: &'a OpSet) -> impl Iterator<Item = OpKind> + 'a {
        self.0.intersection(&other.0).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = OpKind> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<OpKind> for OpSet {
    fn from_iter<I: IntoIterator<Item = OpKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A file system event as delivered by the notification source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Path to the affected entry (the new path for renames and moves).
    pub path: PathBuf,

    /// Previous path, for renames and moves.
    pub old_path: Option<PathBuf>,

    /// Operation kinds carried by the event.
    pub ops: OpSet,
}

impl RawEvent {
    /// Create a new event with a single operation kind.
    pub fn new(kind: OpKind, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            old_path: None,
            ops: OpSet::single(kind),
        }
    }

    /// Set the previous path.
    pub fn with_old_path(mut self, old_path: impl Into<PathBuf>) -> Self {
        self.old_path = Some(old_path.into());
        self
    }

    /// Add another operation kind to the event.
    pub fn with_op(mut self, kind: OpKind) -> Self {
        self.ops.insert(kind);
        self
    }

    /// Check if the event reports a creation.
    pub fn is_create(&self) -> bool {
        self.ops.contains(OpKind::Create)
    }

    /// Stat the path and report whether it is a directory.
    ///
    /// The answer reflects the file system at call time, not at the time
    /// the event fired; an entry deleted in between reports `false`.
    pub async fn is_directory(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
    }

    /// Translate a `notify` event into raw events, one per affected path.
    ///
    /// A paired rename becomes a single event carrying both paths. Access
    /// notifications are dropped. Each event is translated on its own; the
    /// halves of a tracked rename are paired by
    /// [`EventTranslator`](crate::translate::EventTranslator).
    pub fn from_notify(event: notify::Event) -> Vec<RawEvent> {
        let kind = match event.kind {
            EventKind::Create(_) => OpKind::Create,
            EventKind::Remove(_) => OpKind::Remove,
            EventKind::Modify(ModifyKind::Metadata(_)) => OpKind::Chmod,
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                return RawEvent::renamed(event.paths);
            }
            EventKind::Modify(ModifyKind::Name(_)) => OpKind::Rename,
            EventKind::Modify(_) => OpKind::Write,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
        };

        event
            .paths
            .into_iter()
            .map(|path| RawEvent::new(kind, path))
            .collect()
    }

    /// Events for a rename given as `[from, to]`: Rename within one
    /// directory, Move across directories. Any other number of paths gives a
    /// Rename per path.
    pub(crate) fn renamed(paths: Vec<PathBuf>) -> Vec<RawEvent> {
        match <[PathBuf; 2]>::try_from(paths) {
            Ok([from, to]) => {
                let kind = if same_parent(&from, &to) {
                    OpKind::Rename
                } else {
                    OpKind::Move
                };
                vec![RawEvent::new(kind, to).with_old_path(from)]
            }
            Err(paths) => paths
                .into_iter()
                .map(|path| RawEvent::new(OpKind::Rename, path))
                .collect(),
        }
    }
}

fn same_parent(a: &Path, b: &Path) -> bool {
    a.parent() == b.parent()
}
