//! Progress event protocol
//!
//! A generation run produces a stream of `progress` events followed by exactly
//! one terminal `done` or `error` event. The stream has a single producer and
//! is delivered in order, each event once.

use serde::Serialize;
use serde_json::json;
use std::cell::Cell;
use std::sync::mpsc::{Receiver, SyncSender};
use tracing::debug;

/// Progress report for one pipeline step
///
/// `current` and `total` are both zero when the step has no meaningful count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub step: String,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

impl Progress {
    /// An indeterminate progress report
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::counted(step, 0, 0, message)
    }

    pub fn counted(
        step: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            current,
            total,
            message: message.into(),
        }
    }
}

/// Event emitted by a generation run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Progress(Progress),
    /// Terminal success, carrying the retrieval reference of the package
    Done { download_url: String },
    /// Terminal failure
    Error { message: String },
}

impl PipelineEvent {
    /// Event name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::Progress(_) => "progress",
            PipelineEvent::Done { .. } => "done",
            PipelineEvent::Error { .. } => "error",
        }
    }

    /// JSON payload on the wire
    pub fn payload(&self) -> serde_json::Value {
        match self {
            PipelineEvent::Progress(progress) => json!(progress),
            PipelineEvent::Done { download_url } => json!({ "downloadUrl": download_url }),
            PipelineEvent::Error { message } => json!({ "message": message }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Progress(_))
    }

    /// Frames the event as `event:`/`data:` lines terminated by a blank line
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name(), self.payload())
    }
}

impl From<Progress> for PipelineEvent {
    fn from(progress: Progress) -> Self {
        PipelineEvent::Progress(progress)
    }
}

/// Producer side of an event stream
///
/// Sending never fails from the pipeline's point of view: once the consumer
/// hangs up, events are dropped and the run continues to completion.
pub(crate) struct EventSink {
    tx: SyncSender<PipelineEvent>,
    disconnected: Cell<bool>,
}

impl EventSink {
    pub(crate) fn new(tx: SyncSender<PipelineEvent>) -> Self {
        Self {
            tx,
            disconnected: Cell::new(false),
        }
    }

    pub(crate) fn emit(&self, event: impl Into<PipelineEvent>) {
        if self.disconnected.get() {
            return;
        }
        if self.tx.send(event.into()).is_err() {
            debug!("event consumer disconnected, continuing without it");
            self.disconnected.set(true);
        }
    }
}

/// Consumer side of an event stream
///
/// Iterating yields events until the terminal one has been delivered.
pub struct EventStream {
    rx: Receiver<PipelineEvent>,
}

impl EventStream {
    pub(crate) fn new(rx: Receiver<PipelineEvent>) -> Self {
        Self { rx }
    }
}

impl Iterator for EventStream {
    type Item = PipelineEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_sse_framing() {
        let event = PipelineEvent::Progress(Progress::counted("Images", 1, 3, "poster.jpg"));
        let frame = event.to_sse();
        let data = frame
            .strip_prefix("event: progress\ndata: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .unwrap();
        let payload: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(
            payload,
            json!({ "step": "Images", "current": 1, "total": 3, "message": "poster.jpg" })
        );

        let done = PipelineEvent::Done {
            download_url: "http://x/download?key=a".into(),
        };
        assert_eq!(
            done.to_sse(),
            "event: done\ndata: {\"downloadUrl\":\"http://x/download?key=a\"}\n\n"
        );

        let error = PipelineEvent::Error {
            message: "boom".into(),
        };
        assert_eq!(error.to_sse(), "event: error\ndata: {\"message\":\"boom\"}\n\n");
    }

    #[test]
    fn test_terminal_events() {
        assert!(!PipelineEvent::from(Progress::new("a", "b")).is_terminal());
        assert!(PipelineEvent::Error { message: String::new() }.is_terminal());
    }

    #[test]
    fn test_sink_survives_disconnected_consumer() {
        let (tx, rx) = mpsc::sync_channel(1);
        let sink = EventSink::new(tx);
        drop(rx);
        sink.emit(Progress::new("step", "one"));
        sink.emit(Progress::new("step", "two"));
        assert!(sink.disconnected.get());
    }

    #[test]
    fn test_stream_yields_in_order() {
        let (tx, rx) = mpsc::sync_channel(4);
        let sink = EventSink::new(tx);
        sink.emit(Progress::new("a", "1"));
        sink.emit(Progress::new("b", "2"));
        sink.emit(PipelineEvent::Done {
            download_url: "u".into(),
        });
        drop(sink);

        let steps: Vec<_> = EventStream::new(rx).map(|e| e.name()).collect();
        assert_eq!(steps, vec!["progress", "progress", "done"]);
    }
}
