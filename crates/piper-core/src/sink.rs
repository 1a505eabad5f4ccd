//! Output sinks.
//!
//! A sink is a push destination for structured records. Producers push one
//! record per emission and never wait for an acknowledgment; a refused record
//! comes back as a [`SinkError`] and is simply skipped.
//!
//! Two channel-backed sinks are provided:
//!
//! - [`BroadcastSink`]: fan-out to any number of subscribers (lagging
//!   subscribers lose old records). A push with nobody subscribed succeeds
//!   and the record is dropped, like a network output with no peers.
//! - [`MpscSink`]: single reliable consumer with a bounded queue. Fails with
//!   `Full` instead of blocking the producer tick.

use crate::error::SinkError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Push destination for records of type `T`.
#[async_trait]
pub trait FrameSink<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Sink name used in logs and errors.
    fn name(&self) -> &str;

    /// Push one record.
    async fn send(&self, record: T) -> Result<(), SinkError>;
}

#[async_trait]
impl<T, S> FrameSink<T> for Arc<S>
where
    T: Send + 'static,
    S: FrameSink<T> + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn send(&self, record: T) -> Result<(), SinkError> {
        (**self).send(record).await
    }
}

// =============================================================================
// BroadcastSink
// =============================================================================

/// Fan-out sink over `tokio::sync::broadcast`.
#[derive(Debug, Clone)]
pub struct BroadcastSink<T> {
    name: String,
    sender: broadcast::Sender<T>,
}

impl<T> BroadcastSink<T>
where
    T: Clone + Send + 'static,
{
    /// Create a sink retaining up to `capacity` records per subscriber.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            name: name.into(),
            sender,
        }
    }

    /// Attach a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl<T> FrameSink<T> for BroadcastSink<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, record: T) -> Result<(), SinkError> {
        // The sender lives in `self`, so the channel cannot close; the only
        // error is "no receivers".
        if self.sender.send(record).is_err() {
            tracing::trace!(sink = %self.name, "No subscribers, record dropped");
        }
        Ok(())
    }
}

// =============================================================================
// MpscSink
// =============================================================================

/// Single-consumer sink over a bounded `tokio::sync::mpsc` channel.
#[derive(Debug, Clone)]
pub struct MpscSink<T> {
    name: String,
    sender: mpsc::Sender<T>,
}

impl<T> MpscSink<T>
where
    T: Send + 'static,
{
    /// Create a sink and the receiver that drains it.
    pub fn channel(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.into(),
                sender,
            },
            receiver,
        )
    }
}

#[async_trait]
impl<T> FrameSink<T> for MpscSink<T>
where
    T: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, record: T) -> Result<(), SinkError> {
        self.sender.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full {
                sink: self.name.clone(),
            },
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed {
                sink: self.name.clone(),
            },
        })
    }
}
