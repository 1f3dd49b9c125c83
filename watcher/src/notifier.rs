//! User notifications about policy actions.
//!
//! Delivery is fire-and-forget: callers log a [`DeliveryError`] and move on.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::warn;

/// Errors returned when a notification cannot be delivered.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The notification program could not be started.
    #[error("notification channel unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    /// The notification program ran but reported failure.
    #[error("notification command failed: {0}")]
    Command(String),

    /// No desktop notification mechanism on this platform.
    #[error("desktop notifications are not supported on this platform")]
    Unsupported,
}

/// Delivers a titled message to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a notification.
    async fn notify(&self, title: &str, body: &str) -> Result<(), DeliveryError>;
}

/// A notification about an offending path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub path: PathBuf,
}

impl NotificationRequest {
    /// Notification for a disallowed file that was created and removed.
    pub fn disallowed_file(path: &Path) -> Self {
        Self {
            title: "Disallowed File Alert".to_string(),
            body: format!(
                "A file with disallowed extension was created and removed: {}",
                path.display()
            ),
            path: path.to_path_buf(),
        }
    }

    /// Deliver the request through a notifier.
    pub async fn send(&self, notifier: &dyn Notifier) -> Result<(), DeliveryError> {
        notifier.notify(&self.title, &self.body).await
    }
}

/// Desktop notifications through the platform's notification tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    #[cfg(target_os = "linux")]
    async fn notify(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        let output = Command::new("notify-send")
            .arg(title)
            .arg(body)
            .output()
            .await?;
        check_status(&output)
    }

    #[cfg(target_os = "macos")]
    async fn notify(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        let script = format!(
            "display notification {} with title {}",
            applescript_string(body),
            applescript_string(title)
        );
        let output = Command::new("osascript")
            .arg("-e")
            .arg(&script)
            .output()
            .await?;
        check_status(&output)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    async fn notify(&self, _title: &str, _body: &str) -> Result<(), DeliveryError> {
        Err(DeliveryError::Unsupported)
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn check_status(output: &std::process::Output) -> Result<(), DeliveryError> {
    if output.status.success() {
        Ok(())
    } else {
        Err(DeliveryError::Command(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

#[cfg(target_os = "macos")]
fn applescript_string(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Writes notifications to the log instead of the desktop.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        warn!("{title}: {body}");
        Ok(())
    }
}
