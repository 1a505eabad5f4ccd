//! Pattern stream: precomputed image triples while processing.
//!
//! Each Processing tick pushes the next triple of the [`FramePatternCycle`]
//! to the pattern sink, then counts the delivery and refreshes the throughput
//! metric. Counting happens after the push, so the published rate only ever
//! reflects completed emissions.
//!
//! When the device leaves Processing the metric drops to zero and the rate
//! window restarts, so a later session does not average in idle time.

use crate::pattern::FramePatternCycle;
use crate::producer::Producer;
use async_trait::async_trait;
use piper_core::limits::SINK_FAILURE_WARN_EVERY;
use piper_core::{
    AcquisitionStateMachine, FrameSink, Observable, PatternTriple, RateCalculator, SinkError,
};
use std::sync::Arc;
use std::time::Duration;

/// What a pattern-stream tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternTick {
    /// The triple at `index` reached the sink.
    Emitted {
        /// Cycle index of the emitted triple
        index: usize,
        /// Throughput published on this tick, if the window closed
        rate: Option<f64>,
    },
    /// The sink refused the triple at `index`.
    Skipped {
        /// Cycle index of the refused triple
        index: usize,
        /// Why the sink refused it
        error: SinkError,
    },
    /// Not processing; nothing emitted.
    Idle,
}

/// Emits pattern triples to a sink while the device is processing.
pub struct PatternStreamProducer<S> {
    state: AcquisitionStateMachine,
    cycle: FramePatternCycle,
    sink: S,
    rate: RateCalculator,
    throughput: Observable<f64>,
    active: bool,
    emitted: u64,
    failures: u64,
}

/// Throughput observable: pattern triples emitted per second.
pub fn throughput_observable() -> Observable<f64> {
    Observable::new("throughput", 0.0).with_units("Hz")
}

impl<S> PatternStreamProducer<S>
where
    S: FrameSink<Arc<PatternTriple>>,
{
    /// Create a producer publishing its rate to `throughput`.
    pub fn new(
        state: AcquisitionStateMachine,
        cycle: FramePatternCycle,
        sink: S,
        refresh_interval: Duration,
        throughput: Observable<f64>,
    ) -> Self {
        Self {
            state,
            cycle,
            sink,
            rate: RateCalculator::new(refresh_interval),
            throughput,
            active: false,
            emitted: 0,
            failures: 0,
        }
    }

    /// Published throughput metric.
    pub fn throughput(&self) -> &Observable<f64> {
        &self.throughput
    }

    /// Index of the triple the next Processing tick will emit.
    pub fn cursor(&self) -> usize {
        self.cycle.cursor()
    }

    /// Triples delivered to the sink so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Run one tick against the current state.
    pub async fn step(&mut self) -> PatternTick {
        if !self.state.current().is_processing() {
            if self.active {
                self.active = false;
                self.throughput.publish(0.0);
            }
            return PatternTick::Idle;
        }

        if !self.active {
            self.active = true;
            self.rate = RateCalculator::new(self.rate.refresh_interval());
        }

        let index = self.cycle.cursor();
        let triple = self.cycle.next_triple();

        let delivered = self.sink.send(triple).await;
        if delivered.is_ok() {
            self.emitted += 1;
            self.rate.update();
        }
        let rate = self.rate.refresh();
        if let Some(hz) = rate {
            self.throughput.publish(hz);
            tracing::debug!(rate_hz = hz, "Pattern throughput updated");
        }

        match delivered {
            Ok(()) => {
                tracing::trace!(index, sink = self.sink.name(), "Pattern triple emitted");
                PatternTick::Emitted { index, rate }
            }
            Err(error) => {
                self.failures += 1;
                if self.failures % SINK_FAILURE_WARN_EVERY == 1 {
                    tracing::warn!(
                        index,
                        failures = self.failures,
                        %error,
                        "Pattern triple not delivered"
                    );
                } else {
                    tracing::debug!(index, %error, "Pattern triple not delivered");
                }
                PatternTick::Skipped { index, error }
            }
        }
    }
}

#[async_trait]
impl<S> Producer for PatternStreamProducer<S>
where
    S: FrameSink<Arc<PatternTriple>> + 'static,
{
    type Outcome = PatternTick;

    fn name(&self) -> &'static str {
        "pattern"
    }

    async fn tick(&mut self) -> PatternTick {
        self.step().await
    }
}
