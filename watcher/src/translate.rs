//! Translation of source notifications into raw events, pairing the halves
//! of tracked renames.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};
use tokio::time::Instant;
use tracing::debug;

use crate::event::RawEvent;

/// How long the first half of a tracked rename waits for its partner.
pub const RENAME_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug)]
struct PendingRename {
    from: Vec<PathBuf>,
    to: Option<Vec<PathBuf>>,
    expires: Instant,
}

impl PendingRename {
    fn into_events(self) -> Vec<RawEvent> {
        let mut paths = self.from;
        paths.extend(self.to.unwrap_or_default());
        RawEvent::renamed(paths)
    }
}

/// Turns source notifications into raw events.
///
/// Backends that track renames report a pair as `From`, `To` and finally
/// `Both`, all carrying the same tracker; only `Both` is reported. A half
/// whose partner never arrives, because the entry moved into or out of the
/// watched tree, is reported on its own: a lone `To` immediately, a lone
/// `From` once [`EventTranslator::expire`] finds its grace period over.
#[derive(Debug)]
pub struct EventTranslator {
    pending: HashMap<usize, PendingRename>,
    grace: Duration,
}

impl Default for EventTranslator {
    fn default() -> Self {
        Self::new(RENAME_GRACE)
    }
}

impl EventTranslator {
    pub fn new(grace: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            grace,
        }
    }

    /// Translate one notification received at `now`.
    pub fn translate(&mut self, event: notify::Event, now: Instant) -> Vec<RawEvent> {
        let Some(tracker) = event.tracker() else {
            return RawEvent::from_notify(event);
        };

        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                let pending = PendingRename {
                    from: event.paths,
                    to: None,
                    expires: now + self.grace,
                };
                match self.pending.insert(tracker, pending) {
                    Some(stale) => stale.into_events(),
                    None => Vec::new(),
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                match self.pending.get_mut(&tracker) {
                    Some(pending) => {
                        pending.to = Some(event.paths);
                        Vec::new()
                    }
                    None => RawEvent::from_notify(event),
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                self.pending.remove(&tracker);
                RawEvent::from_notify(event)
            }
            _ => RawEvent::from_notify(event),
        }
    }

    /// Report the rename halves whose grace period ended at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<RawEvent> {
        let (mut expired, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain()
            .partition(|(_, pending)| pending.expires <= now);
        self.pending.extend(waiting);
        expired.sort_by_key(|(_, pending)| pending.expires);

        let events: Vec<RawEvent> = expired
            .into_iter()
            .flat_map(|(_, pending)| pending.into_events())
            .collect();
        if !events.is_empty() {
            debug!("Reporting {} unpaired rename events", events.len());
        }
        events
    }

    /// Report every rename half still waiting for its partner.
    pub fn drain(&mut self) -> Vec<RawEvent> {
        let mut pending: Vec<PendingRename> =
            self.pending.drain().map(|(_, pending)| pending).collect();
        pending.sort_by_key(|pending| pending.expires);
        pending
            .into_iter()
            .flat_map(PendingRename::into_events)
            .collect()
    }

    /// When the oldest waiting rename half expires, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.expires).min()
    }
}
