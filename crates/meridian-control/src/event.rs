//! Progress events for deploy operations.
//!
//! Each deploy owns exactly one sink for its lifetime. Progress delivery is
//! best-effort: a slow consumer drops events rather than blocking the
//! operation, and the terminal outcome travels on the operation's return
//! value, never through the sink.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{ReleaseStatus, SlugId};

/// A progress notification emitted during a deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeployEvent {
    /// The deploy has started.
    Started {
        /// Application name.
        app: String,
        /// Image being deployed.
        image: String,
    },

    /// The image build has started.
    BuildStarted {
        /// Image being built.
        image: String,
    },

    /// A line of build output.
    BuildOutput {
        /// The output line.
        line: String,
    },

    /// The image build produced a slug.
    BuildCompleted {
        /// The built slug.
        slug_id: SlugId,
    },

    /// A release record was created.
    ReleaseCreated {
        /// Assigned version number.
        version: i64,
    },

    /// The deploy finished.
    Finished {
        /// Released version.
        version: i64,
        /// Terminal release status.
        status: ReleaseStatus,
    },
}

/// Sending half of a deploy's event stream.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<DeployEvent>>,
}

impl EventSink {
    /// Create a bounded event channel.
    ///
    /// Returns the sink to hand to the deploy and the receiver for the
    /// caller to drain.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DeployEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event.
    #[must_use]
    pub const fn discard() -> Self {
        Self { tx: None }
    }

    /// Deliver an event without blocking.
    ///
    /// Events are dropped when the buffer is full or the receiver is gone.
    pub fn send(&self, event: DeployEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel(8);

        sink.send(DeployEvent::BuildStarted {
            image: "acme/api:v1".to_owned(),
        });
        sink.send(DeployEvent::BuildOutput {
            line: "step 1/3".to_owned(),
        });
        drop(sink);

        assert_eq!(
            rx.recv().await,
            Some(DeployEvent::BuildStarted {
                image: "acme/api:v1".to_owned()
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(DeployEvent::BuildOutput {
                line: "step 1/3".to_owned()
            })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn overflow_drops_instead_of_blocking() {
        let (sink, mut rx) = EventSink::channel(1);

        sink.send(DeployEvent::BuildOutput {
            line: "kept".to_owned(),
        });
        sink.send(DeployEvent::BuildOutput {
            line: "dropped".to_owned(),
        });
        drop(sink);

        assert_eq!(
            rx.recv().await,
            Some(DeployEvent::BuildOutput {
                line: "kept".to_owned()
            })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn discard_sink_never_errors() {
        let sink = EventSink::discard();
        sink.send(DeployEvent::ReleaseCreated { version: 1 });
    }

    #[test]
    fn event_serialisation_is_tagged() {
        let event = DeployEvent::ReleaseCreated { version: 3 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"release_created","version":3}"#);
    }
}
