//! Bounded event queue between sources and the pipeline consumer.
//!
//! Producers publish with a timeout: if the consumer is falling behind and the
//! queue stays full for longer than the timeout, the event is handed back as
//! dropped. Losing events under sustained overload is the accepted policy;
//! blocking a source indefinitely is not.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

use crate::model::Event;

/// Default capacity of the engine's queue.
pub const DEFAULT_CAPACITY: usize = 100;
/// Default time a producer waits for room before dropping.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum PublishError {
    /// The queue stayed full for the whole timeout; the event was not enqueued.
    #[error("event queue full, dropped event for {}", .0.domain())]
    Dropped(Box<Event>),

    /// The consumer closed the queue; no further events are accepted.
    #[error("event queue closed")]
    Closed,
}

/// Producer handle given to every source.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<Event>,
    timeout: Duration,
}

pub type EventReceiver = mpsc::Receiver<Event>;

/// Create a bounded queue of `capacity` events.
pub fn bounded(capacity: usize, publish_timeout: Duration) -> (EventPublisher, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventPublisher { tx, timeout: publish_timeout }, rx)
}

impl EventPublisher {
    /// Enqueue `event`, waiting at most the configured timeout for room.
    pub async fn publish(&self, event: Event) -> Result<(), PublishError> {
        match self.tx.send_timeout(event, self.timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(event)) => {
                metrics::counter!("events_dropped_total").increment(1);
                Err(PublishError::Dropped(Box::new(event)))
            }
            Err(SendTimeoutError::Closed(_)) => Err(PublishError::Closed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
