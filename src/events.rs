//! Download progress events.
//!
//! Events are the only channel from the resolution/download pipeline to
//! its caller. They are pushed through an unbounded channel as they happen
//! so a consumer can render progress while the download is still running.
//! Dropping the receiver asks the producer to stop at its next loop
//! boundary.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Tag of a [`DownloadEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    Progress,
    Skip,
    Message,
    Error,
    Complete,
}

/// One step of a chapter download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadEvent {
    pub kind: EventKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl DownloadEvent {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            current: None,
            total: None,
            path: None,
        }
    }

    pub fn start(message: impl Into<String>, total: usize) -> Self {
        Self {
            total: Some(total),
            ..Self::new(EventKind::Start, message)
        }
    }

    pub fn progress(message: impl Into<String>, current: usize, path: &Path) -> Self {
        Self {
            current: Some(current),
            path: Some(path.to_path_buf()),
            ..Self::new(EventKind::Progress, message)
        }
    }

    pub fn skip(message: impl Into<String>, current: usize) -> Self {
        Self {
            current: Some(current),
            ..Self::new(EventKind::Skip, message)
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::new(EventKind::Message, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, message)
    }

    pub fn complete(message: impl Into<String>, current: usize, total: usize) -> Self {
        Self {
            current: Some(current),
            total: Some(total),
            ..Self::new(EventKind::Complete, message)
        }
    }
}

/// Producer half of an event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<DownloadEvent>,
}

/// Consumer half of an event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<DownloadEvent>;

/// Creates a connected sender/receiver pair.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

impl EventSender {
    /// Pushes an event. Events sent after the receiver is gone are dropped.
    pub fn emit(&self, event: DownloadEvent) {
        let _ = self.tx.send(event);
    }

    /// True once the consumer has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
