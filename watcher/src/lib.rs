//! # Directory Watcher
//!
//! This crate watches a directory tree and enforces a file-extension
//! allowlist on everything created inside it.
//!
//! ## Features
//!
//! - **Tree Tracking**: Every directory is registered at startup, and new
//!   subdirectories are registered as they appear
//! - **Event Filtering**: Log only the operation kinds you care about
//! - **Allowlist Enforcement**: Newly created files with a disallowed
//!   extension are removed and reported
//! - **Pluggable Notifications**: Desktop, log-only, or your own [`Notifier`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Directory Watcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  notify source ──► Dispatcher ──► EventFilter ──► log           │
//! │                        │                                        │
//! │                        ▼                                        │
//! │                  PolicyEnforcer ──► WatchSet / remove / notify  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Files created inside a new subdirectory before it has been registered
//! are not observed. The notification primitives offer no way to make
//! registration atomic with directory creation.

pub mod allowlist;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod monitor;
pub mod notifier;
pub mod policy;
pub mod translate;
pub mod watch_set;

pub use allowlist::AllowedExtensions;
pub use classifier::EventFilter;
pub use config::WatcherConfig;
pub use dispatcher::{Dispatcher, HandledEvent};
pub use error::{Result, WatcherError};
pub use event::{OpKind, OpSet, RawEvent};
pub use monitor::Monitor;
pub use notifier::{DeliveryError, DesktopNotifier, LogNotifier, NotificationRequest, Notifier};
pub use policy::{PolicyEnforcer, PolicyOutcome};
pub use translate::EventTranslator;
pub use watch_set::{WatchRegistrar, WatchSet};
