//! Progress stream of events produced during a run.
//!
//! The sink side never blocks and never fails: a slow listener only grows the
//! buffer, and a dropped listener turns pushes into no-ops.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use chrono::Utc;
use futures::Stream;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{Event, StreamedEvent};

/// Producer half, owned by a single run
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<StreamedEvent>,
    sequence: AtomicU64,
}

/// Consumer half, in production order
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<StreamedEvent>,
}

/// Create a connected sink/stream pair
pub fn channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventSink {
            tx,
            sequence: AtomicU64::new(0),
        },
        EventStream { rx },
    )
}

impl EventSink {
    /// A sink nobody listens to
    pub fn detached() -> Self {
        channel().0
    }

    /// Push a copy of `event`; returns the assigned sequence number
    pub fn emit(&self, run_id: Uuid, step: Option<&str>, event: &Event) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let streamed = StreamedEvent {
            run_id,
            sequence,
            timestamp: Utc::now(),
            step: step.map(str::to_string),
            event: event.clone(),
        };

        // Listener gone: progress is best-effort
        let _ = self.tx.send(streamed);
        sequence
    }

    pub fn is_observed(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl EventStream {
    /// Same as [`channel`]
    pub fn channel() -> (EventSink, EventStream) {
        channel()
    }

    /// Next event, or None once the run finished and the buffer is drained
    pub async fn next(&mut self) -> Option<StreamedEvent> {
        self.rx.recv().await
    }

    /// Drain everything already buffered without waiting
    pub fn drain(&mut self) -> Vec<StreamedEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Stream for EventStream {
    type Item = StreamedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Completion, FileUploaded};
    use futures::StreamExt;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sink, stream) = channel();
        let run_id = Uuid::new_v4();

        for i in 0..3 {
            let event = Event::FileUploaded(FileUploaded {
                file_id: format!("f{}", i),
            });
            sink.emit(run_id, Some("upload_file"), &event);
        }
        sink.emit(run_id, None, &Event::Completed(Completion::success("done")));
        drop(sink);

        let events: Vec<StreamedEvent> = stream.collect().await;
        assert_eq!(events.len(), 4);
        assert_eq!(
            events.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert!(events[3].event.is_terminal());
        assert_eq!(events[0].step.as_deref(), Some("upload_file"));
    }

    #[test]
    fn test_emit_without_listener_does_not_fail() {
        let sink = EventSink::detached();
        assert!(!sink.is_observed());

        let event = Event::Completed(Completion::success("done"));
        assert_eq!(sink.emit(Uuid::new_v4(), None, &event), 0);
        assert_eq!(sink.emit(Uuid::new_v4(), None, &event), 1);
    }
}
