//! Primary stream: synthetic detector frames while acquiring.
//!
//! Every tick while the device is Acquiring, the train id advances by one and
//! the frame is re-stamped and pushed to the primary sink. Any other state
//! resets the train id to its initial value without emitting, so the first
//! emission after re-entering Acquiring always carries train id 2.

use crate::producer::Producer;
use async_trait::async_trait;
use piper_core::limits::{INITIAL_TRAIN_ID, SINK_FAILURE_WARN_EVERY};
use piper_core::{AcquisitionStateMachine, FrameSink, SinkError, SyntheticFrame, Timestamp};

/// What a primary-stream tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryTick {
    /// A frame with this train id reached the sink.
    Emitted {
        /// Train id of the emitted frame
        train_id: u64,
    },
    /// The sink refused the frame for this train id; not retried.
    Skipped {
        /// Train id of the lost frame
        train_id: u64,
        /// Why the sink refused it
        error: SinkError,
    },
    /// Not acquiring; the train id was reset.
    Reset,
}

/// Emits [`SyntheticFrame`]s to a sink while the device is acquiring.
pub struct PrimaryStreamProducer<S> {
    state: AcquisitionStateMachine,
    frame: SyntheticFrame,
    sink: S,
    emitted: u64,
    failures: u64,
}

impl<S> PrimaryStreamProducer<S>
where
    S: FrameSink<SyntheticFrame>,
{
    /// Create a producer whose passport names `instance_id`.
    pub fn new(state: AcquisitionStateMachine, sink: S, instance_id: impl Into<String>) -> Self {
        Self {
            state,
            frame: SyntheticFrame::new(instance_id),
            sink,
            emitted: 0,
            failures: 0,
        }
    }

    /// Train id of the most recent emission (or the reset value).
    pub fn train_id(&self) -> u64 {
        self.frame.train_id
    }

    /// Frames delivered to the sink so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Frames the sink refused so far.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Run one tick against the current state.
    pub async fn step(&mut self) -> PrimaryTick {
        if !self.state.current().is_acquiring() {
            self.frame.train_id = INITIAL_TRAIN_ID;
            return PrimaryTick::Reset;
        }

        self.frame.train_id += 1;
        let train_id = self.frame.train_id;
        self.frame.timestamp = Timestamp::now(train_id);

        match self.sink.send(self.frame.clone()).await {
            Ok(()) => {
                self.emitted += 1;
                tracing::trace!(train_id, sink = self.sink.name(), "Frame emitted");
                PrimaryTick::Emitted { train_id }
            }
            Err(error) => {
                self.failures += 1;
                if self.failures % SINK_FAILURE_WARN_EVERY == 1 {
                    tracing::warn!(
                        train_id,
                        failures = self.failures,
                        %error,
                        "Primary frame not delivered"
                    );
                } else {
                    tracing::debug!(train_id, %error, "Primary frame not delivered");
                }
                PrimaryTick::Skipped { train_id, error }
            }
        }
    }
}

#[async_trait]
impl<S> Producer for PrimaryStreamProducer<S>
where
    S: FrameSink<SyntheticFrame> + 'static,
{
    type Outcome = PrimaryTick;

    fn name(&self) -> &'static str {
        "primary"
    }

    async fn tick(&mut self) -> PrimaryTick {
        self.step().await
    }
}
