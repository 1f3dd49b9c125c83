//! Event classification against the configured filter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WatcherError;
use crate::event::{OpKind, OpSet, RawEvent};

/// The operation kinds selected for reporting.
///
/// The filter only decides what gets logged. Allowlist enforcement and
/// directory registration run on every creation regardless of the filter.
///
/// Selecting [`OpKind::Rename`] also selects [`OpKind::Move`]: a move is a
/// rename across directories. `move` alone selects only moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OpSet", into = "OpSet")]
pub struct EventFilter {
    kinds: OpSet,
}

impl EventFilter {
    /// Create a filter from a set of kinds.
    pub fn new(mut kinds: OpSet) -> Self {
        if kinds.contains(OpKind::Rename) {
            kinds.insert(OpKind::Move);
        }
        Self { kinds }
    }

    /// Create a filter that matches every kind.
    pub fn all() -> Self {
        OpKind::ALL.into_iter().collect()
    }

    /// Parse a comma-separated list of kinds, e.g. `"create,write"`.
    ///
    /// Tokens are case-insensitive; empty tokens are skipped.
    pub fn parse(list: &str) -> Result<Self, WatcherError> {
        let kinds = list
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::parse::<OpKind>)
            .collect::<Result<OpSet, _>>()?;
        Ok(Self::new(kinds))
    }

    pub fn kinds(&self) -> &OpSet {
        &self.kinds
    }

    /// Whether the event carries any configured kind.
    pub fn matches(&self, event: &RawEvent) -> bool {
        event.ops.intersects(&self.kinds)
    }

    /// Log labels for each configured kind the event carries.
    ///
    /// Returns an empty list when the event is not of interest.
    pub fn describe(&self, event: &RawEvent) -> Vec<String> {
        event
            .ops
            .intersection(&self.kinds)
            .map(|kind| label(kind, event))
            .collect()
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        [OpKind::Create, OpKind::Write, OpKind::Remove, OpKind::Rename]
            .into_iter()
            .collect()
    }
}

impl FromIterator<OpKind> for EventFilter {
    fn from_iter<I: IntoIterator<Item = OpKind>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl From<OpSet> for EventFilter {
    fn from(kinds: OpSet) -> Self {
        Self::new(kinds)
    }
}

impl From<EventFilter> for OpSet {
    fn from(filter: EventFilter) -> Self {
        filter.kinds
    }
}

impl FromStr for EventFilter {
    type Err = WatcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.kinds.iter().map(OpKind::as_str).collect();
        f.write_str(&names.join(","))
    }
}

fn label(kind: OpKind, event: &RawEvent) -> String {
    match (kind, &event.old_path) {
        (OpKind::Rename | OpKind::Move, Some(old_path)) => format!(
            "{kind}: {} to {}",
            old_path.display(),
            event.path.display()
        ),
        _ => format!("Event: {kind} on file: {}", event.path.display()),
    }
}
