//! Allowlist enforcement for newly created entries.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::allowlist::AllowedExtensions;
use crate::event::RawEvent;
use crate::notifier::{NotificationRequest, Notifier};
use crate::watch_set::{WatchRegistrar, WatchSet};

/// What the enforcer did with a creation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// A new directory was added to the watch set, along with `nested`
    /// subdirectories that already existed inside it.
    DirectoryRegistered { nested: usize },

    /// The path was already in the watch set and its watch was renewed,
    /// e.g. a directory deleted and created again under the same name.
    DirectoryRewatched { nested: usize },

    /// The directory could not be registered; the failure was logged.
    DirectoryRegistrationFailed,

    /// The extension is allowlisted.
    Allowed,

    /// The file was removed and a notification was attempted.
    Removed {
        notification: NotificationRequest,
        notified: bool,
    },

    /// The file was already gone when removal was attempted.
    AlreadyRemoved,

    /// The file could not be removed and was left in place.
    RemovalFailed,
}

/// Applies the extension allowlist to created entries.
pub struct PolicyEnforcer {
    allowlist: AllowedExtensions,
    notifier: Arc<dyn Notifier>,
}

impl PolicyEnforcer {
    pub fn new(allowlist: AllowedExtensions, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            allowlist,
            notifier,
        }
    }

    pub fn allowlist(&self) -> &AllowedExtensions {
        &self.allowlist
    }

    /// Handle a creation event.
    ///
    /// Directories are registered with the watch set instead of being
    /// checked. Files with a disallowed extension are removed and reported.
    /// Nothing here fails: every problem is logged and reflected in the
    /// returned outcome.
    pub async fn enforce<R: WatchRegistrar>(
        &self,
        event: &RawEvent,
        watch_set: &mut WatchSet<R>,
    ) -> PolicyOutcome {
        if event.is_directory().await {
            register_directory(&event.path, watch_set)
        } else {
            self.check_file(&event.path).await
        }
    }

    async fn check_file(&self, path: &Path) -> PolicyOutcome {
        if self.allowlist.is_allowed(path) {
            return PolicyOutcome::Allowed;
        }

        warn!("Disallowed file extension: {}", path.display());

        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Disallowed file already removed: {}", path.display());
                return PolicyOutcome::AlreadyRemoved;
            }
            Err(e) => {
                error!(
                    "Failed to handle disallowed file {}: could not remove disallowed file: {e}",
                    path.display()
                );
                return PolicyOutcome::RemovalFailed;
            }
        }
        info!("Removed disallowed file: {}", path.display());

        let notification = NotificationRequest::disallowed_file(path);
        let notified = match notification.send(self.notifier.as_ref()).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to handle disallowed file {}: failed to send notification: {e}",
                    path.display()
                );
                false
            }
        };

        PolicyOutcome::Removed {
            notification,
            notified,
        }
    }
}

fn register_directory<R: WatchRegistrar>(path: &Path, watch_set: &mut WatchSet<R>) -> PolicyOutcome {
    match watch_set.add_directory(path) {
        Ok(added) => {
            let nested = watch_set.add_tree(path);
            info!("Watching new directory: {}", path.display());
            if added {
                PolicyOutcome::DirectoryRegistered { nested }
            } else {
                PolicyOutcome::DirectoryRewatched { nested }
            }
        }
        Err(e) => {
            warn!(
                "Failed to add new directory to watcher {}: {e}",
                path.display()
            );
            PolicyOutcome::DirectoryRegistrationFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::OpKind;
    use crate::notifier::tests::{FailingNotifier, RecordingNotifier};
    use crate::watch_set::tests::FakeRegistrar;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn enforcer(notifier: Arc<dyn Notifier>) -> PolicyEnforcer {
        PolicyEnforcer::new(AllowedExtensions::parse(".txt\n.md\n"), notifier)
    }

    #[tokio::test]
    async fn test_disallowed_file_removed_and_reported_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("payload.exe");
        fs::write(&path, "MZ").unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let enforcer = enforcer(notifier.clone());
        let mut watch_set = WatchSet::new(FakeRegistrar::default());

        let outcome = enforcer
            .enforce(&RawEvent::new(OpKind::Create, &path), &mut watch_set)
            .await;

        assert!(matches!(outcome, PolicyOutcome::Removed { notified: true, .. }));
        assert!(!path.exists());

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.ends_with(&path.display().to_string()));
    }

    #[tokio::test]
    async fn test_allowed_file_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("NOTES.TXT");
        fs::write(&path, "hello").unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let enforcer = enforcer(notifier.clone());
        let mut watch_set = WatchSet::new(FakeRegistrar::default());

        let outcome = enforcer
            .enforce(&RawEvent::new(OpKind::Create, &path), &mut watch_set)
            .await;

        assert_eq!(outcome, PolicyOutcome::Allowed);
        assert!(path.exists());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_already_removed_file_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gone.exe");

        let notifier = Arc::new(RecordingNotifier::default());
        let enforcer = enforcer(notifier.clone());
        let mut watch_set = WatchSet::new(FakeRegistrar::default());

        let outcome = enforcer
            .enforce(&RawEvent::new(OpKind::Create, &path), &mut watch_set)
            .await;

        assert_eq!(outcome, PolicyOutcome::AlreadyRemoved);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_removal_failure_leaves_no_notification() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker.txt");
        fs::write(&blocker, "not a directory").unwrap();
        // The parent is a regular file, so removal fails with something other than NotFound.
        let path = blocker.join("payload.exe");

        let notifier = Arc::new(RecordingNotifier::default());
        let enforcer = enforcer(notifier.clone());
        let mut watch_set = WatchSet::new(FakeRegistrar::default());

        let outcome = enforcer
            .enforce(&RawEvent::new(OpKind::Create, &path), &mut watch_set)
            .await;

        assert_eq!(outcome, PolicyOutcome::RemovalFailed);
        assert!(blocker.exists());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_removal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("payload.exe");
        fs::write(&path, "MZ").unwrap();

        let enforcer = enforcer(Arc::new(FailingNotifier));
        let mut watch_set = WatchSet::new(FakeRegistrar::default());

        let outcome = enforcer
            .enforce(&RawEvent::new(OpKind::Create, &path), &mut watch_set)
            .await;

        assert!(matches!(outcome, PolicyOutcome::Removed { notified: false, .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_directory_registered_not_checked() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("data.bin");
        fs::create_dir_all(dir.join("nested")).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let enforcer = enforcer(notifier.clone());
        let mut watch_set = WatchSet::new(FakeRegistrar::default());
        let event = RawEvent::new(OpKind::Create, &dir);

        let first = enforcer.enforce(&event, &mut watch_set).await;
        let second = enforcer.enforce(&event, &mut watch_set).await;

        assert_eq!(first, PolicyOutcome::DirectoryRegistered { nested: 1 });
        assert_eq!(second, PolicyOutcome::DirectoryRewatched { nested: 1 });
        assert!(dir.exists());
        assert!(watch_set.contains(&dir));
        assert!(watch_set.contains(&dir.join("nested")));
        assert_eq!(watch_set.len(), 2);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_recreated_directory_is_registered_again() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("data");
        fs::create_dir(&dir).unwrap();

        let enforcer = enforcer(Arc::new(RecordingNotifier::default()));
        let mut watch_set = WatchSet::new(FakeRegistrar::default());
        let event = RawEvent::new(OpKind::Create, &dir);
        enforcer.enforce(&event, &mut watch_set).await;

        fs::remove_dir(&dir).unwrap();
        fs::create_dir(&dir).unwrap();
        let outcome = enforcer.enforce(&event, &mut watch_set).await;

        assert_eq!(outcome, PolicyOutcome::DirectoryRewatched { nested: 0 });
        assert_eq!(watch_set.registrar().calls, 2);
    }

    #[tokio::test]
    async fn test_directory_registration_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("flaky");
        fs::create_dir(&dir).unwrap();

        let registrar = FakeRegistrar {
            fail_on: Some(PathBuf::from(&dir)),
            ..Default::default()
        };
        let enforcer = enforcer(Arc::new(RecordingNotifier::default()));
        let mut watch_set = WatchSet::new(registrar);

        let outcome = enforcer
            .enforce(&RawEvent::new(OpKind::Create, &dir), &mut watch_set)
            .await;

        assert_eq!(outcome, PolicyOutcome::DirectoryRegistrationFailed);
        assert!(watch_set.is_empty());
    }
}
