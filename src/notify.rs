//! Notification sink and navigation capability.
//!
//! The workflow never renders anything itself. It reports transient
//! success/error messages through an [`Arc<dyn NotificationSink>`] and asks
//! for "go back to the first stage" through an [`Arc<dyn Navigator>`]. A
//! terminal, a GUI toast or a test recorder can sit behind either trait.
//!
//! # Example
//!
//! ```rust
//! use suprimento_client::{Notification, NotificationSink};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Recorder {
//!     seen: Mutex<Vec<String>>,
//! }
//!
//! impl NotificationSink for Recorder {
//!     fn notify(&self, notification: &Notification) {
//!         self.seen.lock().unwrap().push(notification.message.clone());
//!     }
//! }
//!
//! let recorder = Arc::new(Recorder::default());
//! recorder.notify(&Notification::success("Upload complete"));
//! assert_eq!(recorder.seen.lock().unwrap().len(), 1);
//! ```

use std::sync::Arc;
use tracing::{error, info};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// An action the user can take straight from a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Tear down the current session and go back to the upload stage.
    StartNewWorkflow,
    /// Repeat the action that just failed.
    Retry,
}

/// A transient message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub follow_up: Option<FollowUp>,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
            follow_up: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
            follow_up: None,
        }
    }

    pub fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = Some(follow_up);
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == NotificationLevel::Error
    }
}

/// Receives user-facing messages from the workflow.
///
/// Implementations must be `Send + Sync`; a download may complete on
/// another task than the one that started it.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Discards every notification.
pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn notify(&self, _notification: &Notification) {}
}

/// Forwards notifications to `tracing` (errors at ERROR, the rest at INFO).
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, n: &Notification) {
        match n.level {
            NotificationLevel::Success => info!(follow_up = ?n.follow_up, "{}", n.message),
            NotificationLevel::Error => error!(follow_up = ?n.follow_up, "{}", n.message),
        }
    }
}

/// Lets the workflow request a return to the initial stage without knowing
/// how stages are presented.
pub trait Navigator: Send + Sync {
    fn reset_workflow(&self);
}

/// Ignores navigation requests; the caller drives stages directly.
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn reset_workflow(&self) {}
}

/// Convenience aliases for the shared trait objects.
pub type SharedNotifier = Arc<dyn NotificationSink>;
pub type SharedNavigator = Arc<dyn Navigator>;
