//! The event loop.
//!
//! A single consumer receives notifications and errors from the source and
//! handles them one at a time: an item is fully processed, including any
//! file removal and notification, before the next one is taken.
//!
//! The channels from the source are unbounded. The source calls its handler
//! on its own thread, sometimes while holding locks that
//! [`WatchRegistrar::register`] needs, so the handler must never wait for the
//! dispatcher.

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info};

use crate::classifier::EventFilter;
use crate::event::RawEvent;
use crate::policy::{PolicyEnforcer, PolicyOutcome};
use crate::translate::EventTranslator;
use crate::watch_set::{WatchRegistrar, WatchSet};

/// Sending halves handed to the notification source.
#[derive(Debug, Clone)]
pub struct SourceSenders {
    events: mpsc::UnboundedSender<notify::Event>,
    errors: mpsc::UnboundedSender<notify::Error>,
}

impl SourceSenders {
    /// Forward one result from the notification source. Never blocks.
    pub fn forward(&self, result: notify::Result<notify::Event>) {
        let sent = match result {
            Ok(event) => self.events.send(event).is_ok(),
            Err(e) => self.errors.send(e).is_ok(),
        };
        if !sent {
            debug!("Dispatcher gone, dropping notification");
        }
    }
}

/// Receiving halves consumed by the dispatcher.
#[derive(Debug)]
pub struct SourceReceivers {
    events: mpsc::UnboundedReceiver<notify::Event>,
    errors: mpsc::UnboundedReceiver<notify::Error>,
}

/// Create the event and error channels between a source and a dispatcher.
pub fn source_channels() -> (SourceSenders, SourceReceivers) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (errors_tx, errors_rx) = mpsc::unbounded_channel();

    (
        SourceSenders {
            events: events_tx,
            errors: errors_tx,
        },
        SourceReceivers {
            events: events_rx,
            errors: errors_rx,
        },
    )
}

/// Effect of handling one raw event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledEvent {
    /// Lines logged for configured kinds.
    pub labels: Vec<String>,

    /// Enforcement result, for creation events.
    pub policy: Option<PolicyOutcome>,
}

/// Owns the watch state and runs the event loop.
pub struct Dispatcher<R> {
    watch_set: WatchSet<R>,
    filter: EventFilter,
    enforcer: PolicyEnforcer,
    translator: EventTranslator,
    receivers: SourceReceivers,
}

impl<R: WatchRegistrar> Dispatcher<R> {
    pub fn new(
        watch_set: WatchSet<R>,
        filter: EventFilter,
        enforcer: PolicyEnforcer,
        receivers: SourceReceivers,
    ) -> Self {
        Self {
            watch_set,
            filter,
            enforcer,
            translator: EventTranslator::default(),
            receivers,
        }
    }

    pub fn watch_set(&self) -> &WatchSet<R> {
        &self.watch_set
    }

    /// Process events and errors until the source closes either channel.
    ///
    /// While the source is alive this never returns.
    pub async fn run(mut self) {
        info!("Dispatcher running with event filter [{}]", self.filter);

        while self.next().await.is_some() {}

        for raw in self.translator.drain() {
            self.handle(raw).await;
        }
    }

    /// Wait for the next item from the source and handle it.
    ///
    /// Returns `None` once the source has closed either channel. A source
    /// error yields an empty list. Rename halves that waited too long for
    /// their partner are handled here as well.
    pub async fn next(&mut self) -> Option<Vec<HandledEvent>> {
        let deadline = self.translator.next_deadline();

        tokio::select! {
            event = self.receivers.events.recv() => match event {
                Some(event) => Some(self.dispatch(event).await),
                None => {
                    info!("Event stream closed, stopping");
                    None
                }
            },
            result = self.receivers.errors.recv() => match result {
                Some(e) => {
                    error!("Watcher error: {e}");
                    Some(Vec::new())
                }
                None => {
                    info!("Error stream closed, stopping");
                    None
                }
            },
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let expired = self.translator.expire(Instant::now());
                Some(self.handle_all(expired).await)
            }
        }
    }

    /// Handle every raw event contained in a source notification.
    pub async fn dispatch(&mut self, event: notify::Event) -> Vec<HandledEvent> {
        let raw = self.translator.translate(event, Instant::now());
        self.handle_all(raw).await
    }

    async fn handle_all(&mut self, events: Vec<RawEvent>) -> Vec<HandledEvent> {
        let mut handled = Vec::with_capacity(events.len());
        for raw in events {
            handled.push(self.handle(raw).await);
        }
        handled
    }

    /// Classify and log one event, then enforce the policy on creations.
    ///
    /// Enforcement does not depend on the filter.
    pub async fn handle(&mut self, event: RawEvent) -> HandledEvent {
        let labels = self.filter.describe(&event);
        for label in &labels {
            info!("{label}");
        }

        let policy = if event.is_create() {
            Some(self.enforcer.enforce(&event, &mut self.watch_set).await)
        } else {
            None
        };

        HandledEvent { labels, policy }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::AllowedExtensions;
    use crate::event::OpKind;
    use crate::notifier::tests::RecordingNotifier;
    use crate::watch_set::tests::FakeRegistrar;
    use notify::EventKind;
    use notify::event::{CreateKind, ModifyKind, RenameMode};
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn dispatcher(
        filter: &str,
        notifier: Arc<RecordingNotifier>,
    ) -> (Dispatcher<FakeRegistrar>, SourceSenders) {
        let (senders, receivers) = source_channels();
        let enforcer = PolicyEnforcer::new(AllowedExtensions::parse(".txt\n.md\n"), notifier);
        let dispatcher = Dispatcher::new(
            WatchSet::new(FakeRegistrar::default()),
            EventFilter::parse(filter).unwrap(),
            enforcer,
            receivers,
        );
        (dispatcher, senders)
    }

    fn create(path: &Path) -> RawEvent {
        RawEvent::new(OpKind::Create, path)
    }

    #[tokio::test]
    async fn test_allowed_creation_logged_and_kept() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        fs::write(&path, "hello").unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let (mut dispatcher, _senders) = dispatcher("create,write,remove,rename", notifier.clone());

        let handled = dispatcher.handle(create(&path)).await;

        assert_eq!(
            handled.labels,
            vec![format!("Event: create on file: {}", path.display())]
        );
        assert_eq!(handled.policy, Some(PolicyOutcome::Allowed));
        assert!(path.exists());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_disallowed_creation_removed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("payload.exe");
        fs::write(&path, "MZ").unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let (mut dispatcher, _senders) = dispatcher("create", notifier.clone());

        let handled = dispatcher.handle(create(&path)).await;

        assert!(matches!(
            handled.policy,
            Some(PolicyOutcome::Removed { notified: true, .. })
        ));
        assert!(!path.exists());
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_filter_does_not_gate_enforcement() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("payload.exe");
        let dir = temp_dir.path().join("data");
        fs::write(&file, "MZ").unwrap();
        fs::create_dir(&dir).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let (mut dispatcher, _senders) = dispatcher("write,remove", notifier.clone());

        let file_handled = dispatcher.handle(create(&file)).await;
        let dir_handled = dispatcher.handle(create(&dir)).await;

        assert!(file_handled.labels.is_empty());
        assert!(dir_handled.labels.is_empty());
        assert!(!file.exists());
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(
            dir_handled.policy,
            Some(PolicyOutcome::DirectoryRegistered { nested: 0 })
        );
        assert!(dispatcher.watch_set().contains(&dir));
    }

    #[tokio::test]
    async fn test_rename_logged_without_enforcement() {
        let temp_dir = TempDir::new().unwrap();
        let old = temp_dir.path().join("a.txt");
        let new = temp_dir.path().join("a.md");
        fs::write(&new, "moved").unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let (mut dispatcher, _senders) = dispatcher("create,write,remove,rename", notifier.clone());

        let handled = dispatcher
            .handle(RawEvent::new(OpKind::Rename, &new).with_old_path(&old))
            .await;

        assert_eq!(
            handled.labels,
            vec![format!("rename: {} to {}", old.display(), new.display())]
        );
        assert_eq!(handled.policy, None);
        assert!(new.exists());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_renamed_in_disallowed_file_is_not_enforced() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("payload.exe");
        fs::write(&path, "MZ").unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let (mut dispatcher, _senders) = dispatcher("rename,move", notifier.clone());

        let handled = dispatcher
            .handle(RawEvent::new(OpKind::Move, &path).with_old_path("/elsewhere/payload.exe"))
            .await;

        assert_eq!(handled.labels.len(), 1);
        assert_eq!(handled.policy, None);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_file_inside_new_directory_enforced() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("data");
        fs::create_dir(&dir).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let (mut dispatcher, _senders) = dispatcher("create", notifier.clone());
        dispatcher.handle(create(&dir)).await;

        let report = dir.join("report.bin");
        fs::write(&report, "bin").unwrap();
        let handled = dispatcher.handle(create(&report)).await;

        assert!(matches!(
            handled.policy,
            Some(PolicyOutcome::Removed { ref notification, .. }) if notification.path == report
        ));
        assert!(!report.exists());
    }

    #[tokio::test]
    async fn test_dispatch_translates_notify_event() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.md");
        fs::write(&path, "# notes").unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let (mut dispatcher, _senders) = dispatcher("create", notifier);

        let handled = dispatcher
            .dispatch(notify::Event::new(EventKind::Create(CreateKind::File)).add_path(path))
            .await;

        assert_eq!(handled.len(), 1);
        assert_eq!(handled[0].policy, Some(PolicyOutcome::Allowed));
    }

    #[tokio::test]
    async fn test_run_services_both_streams_until_closed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("payload.exe");
        fs::write(&path, "MZ").unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let (dispatcher, senders) = dispatcher("create", notifier.clone());
        let SourceSenders { events, errors } = senders;

        errors.send(notify::Error::generic("queue overflow")).unwrap();
        events
            .send(notify::Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone()))
            .unwrap();
        drop(events);

        tokio::time::timeout(Duration::from_secs(5), dispatcher.run())
            .await
            .unwrap();

        assert!(!path.exists());
        assert_eq!(notifier.sent().len(), 1);
        drop(errors);
    }

    fn tracked_rename(mode: RenameMode, paths: &[&str], tracker: usize) -> notify::Event {
        paths
            .iter()
            .fold(
                notify::Event::new(EventKind::Modify(ModifyKind::Name(mode))),
                |event, path| event.add_path(PathBuf::from(path)),
            )
            .set_tracker(tracker)
    }

    #[test]
    fn test_forward_never_blocks_the_source() {
        let (senders, mut receivers) = source_channels();
        let burst = 5000;

        // No dispatcher is draining the channel while the source emits.
        for i in 0..burst {
            let event = notify::Event::new(EventKind::Create(CreateKind::File))
                .add_path(PathBuf::from(format!("/w/{i}.exe")));
            senders.forward(Ok(event));
        }
        senders.forward(Err(notify::Error::generic("queue overflow")));

        let mut received = 0;
        while receivers.events.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, burst);
        assert!(receivers.errors.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_tracked_rename_logged_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (mut dispatcher, _senders) = dispatcher("create,write,remove,rename", notifier);

        let mut labels = Vec::new();
        for event in [
            tracked_rename(RenameMode::From, &["/w/a.txt"], 11),
            tracked_rename(RenameMode::To, &["/w/a.md"], 11),
            tracked_rename(RenameMode::Both, &["/w/a.txt", "/w/a.md"], 11),
        ] {
            for handled in dispatcher.dispatch(event).await {
                labels.extend(handled.labels);
            }
        }

        assert_eq!(labels, vec!["rename: /w/a.txt to /w/a.md".to_string()]);
    }

    #[tokio::test]
    async fn test_move_into_tree_logged() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (mut dispatcher, _senders) = dispatcher("create,write,remove,rename", notifier);

        let handled = dispatcher
            .dispatch(tracked_rename(RenameMode::To, &["/w/in.txt"], 12))
            .await;

        assert_eq!(handled.len(), 1);
        assert_eq!(handled[0].labels, vec!["Event: rename on file: /w/in.txt".to_string()]);
        assert_eq!(handled[0].policy, None);
    }

    #[tokio::test]
    async fn test_move_out_of_tree_logged_after_grace() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (mut dispatcher, senders) = dispatcher("rename", notifier);

        senders.forward(Ok(tracked_rename(RenameMode::From, &["/w/out.txt"], 13)));
        let first = dispatcher.next().await.unwrap();
        assert!(first.is_empty());

        let expired = tokio::time::timeout(Duration::from_secs(5), dispatcher.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].labels, vec!["Event: rename on file: /w/out.txt".to_string()]);
    }
}
