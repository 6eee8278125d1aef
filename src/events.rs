//! Hand-off from background tasks to the UI task.
//!
//! Callbacks fire on whichever task detected the change. They never touch
//! UI state directly; they emit a [`DashboardEvent`] and the single UI task
//! applies it.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::{HistoryRecord, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "payload")]
pub enum DashboardEvent {
    /// `HH:MM:SS` for the on-screen clock.
    Now(String),
    SnapshotUpdated(Snapshot),
    AlarmFired { time: String },
    HistoryAdded(HistoryRecord),
    HistoryCleared,
    AlertsChanged { total: usize },
    Notice { message: String, level: NoticeLevel },
}

impl DashboardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DashboardEvent::Now(_) => "clock-now",
            DashboardEvent::SnapshotUpdated(_) => "snapshot-updated",
            DashboardEvent::AlarmFired { .. } => "alarm-fired",
            DashboardEvent::HistoryAdded(_) => "history-added",
            DashboardEvent::HistoryCleared => "history-cleared",
            DashboardEvent::AlertsChanged { .. } => "alerts-changed",
            DashboardEvent::Notice { .. } => "notice",
        }
    }
}

#[derive(Clone)]
pub struct UiSender {
    tx: mpsc::UnboundedSender<DashboardEvent>,
}

pub struct UiReceiver {
    rx: mpsc::UnboundedReceiver<DashboardEvent>,
}

pub fn ui_channel() -> (UiSender, UiReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiSender { tx }, UiReceiver { rx })
}

impl UiSender {
    /// Queue an event for the UI task. A closed UI is not an error for the
    /// producer; the event is dropped.
    pub fn emit(&self, event: DashboardEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            log::debug!("UI channel closed, dropping {name}");
        }
    }

    pub fn notice(&self, message: impl Into<String>, level: NoticeLevel) {
        self.emit(DashboardEvent::Notice {
            message: message.into(),
            level,
        });
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl UiReceiver {
    pub async fn recv(&mut self) -> Option<DashboardEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<DashboardEvent> {
        self.rx.try_recv().ok()
    }

    /// Everything queued so far, without waiting.
    pub fn drain(&mut self) -> Vec<DashboardEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
