//! Device lifecycle: owns the state machine, the two producer loops and the
//! ingest loop.
//!
//! ```text
//!                    toggle_acquisition / toggle_processing
//!                                   │
//!                                   ▼
//!                      ┌──────────────────────────┐
//!                      │  AcquisitionStateMachine │
//!                      └──────────┬───────────────┘
//!                  watch (read)   │   watch (read)
//!               ┌─────────────────┴──────────────┐
//!               ▼                                ▼
//!   PrimaryStreamProducer              PatternStreamProducer
//!       │ broadcast "output"               │ broadcast "pattern"
//!       ▼                                  ▼  + throughput observable
//!   subscribe_primary()              subscribe_patterns()
//!
//!   input() ── mpsc ──▶ InputIngestor ──▶ <save_to>/<source>_<train>.npy
//! ```

use crate::config::{validate_save_to, DeviceSettings};
use crate::ingest::InputIngestor;
use crate::pattern::FramePatternCycle;
use crate::pattern_stream::{throughput_observable, PatternStreamProducer};
use crate::primary::PrimaryStreamProducer;
use crate::producer::run_periodic;
use parking_lot::Mutex;
use piper_core::{
    AcquisitionState, AcquisitionStateMachine, AppResult, BroadcastSink, InboundFrame,
    Observable, PatternTriple, PiperError, SyntheticFrame, Transition,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Snapshot of the device for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    /// Current acquisition state
    pub state: AcquisitionState,
    /// Last published pattern throughput (Hz)
    pub throughput_hz: f64,
    /// Ingest attempts so far
    pub saved_count: u64,
    /// Current save directory
    pub save_to: PathBuf,
}

/// Producers and the input receiver, built by `new` and moved into tasks by
/// `start`.
struct Pending {
    primary: PrimaryStreamProducer<BroadcastSink<SyntheticFrame>>,
    pattern: PatternStreamProducer<BroadcastSink<Arc<PatternTriple>>>,
    input: mpsc::Receiver<InboundFrame>,
}

/// The simulated detector.
pub struct PiperDevice {
    settings: DeviceSettings,
    state: AcquisitionStateMachine,
    primary_sink: BroadcastSink<SyntheticFrame>,
    pattern_sink: BroadcastSink<Arc<PatternTriple>>,
    throughput: Observable<f64>,
    ingestor: Arc<InputIngestor>,
    input_tx: mpsc::Sender<InboundFrame>,
    pending: Mutex<Option<Pending>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl PiperDevice {
    /// Build a stopped device from validated settings.
    ///
    /// Pattern triples are generated here, so construction takes time
    /// proportional to `pattern_size²`.
    pub fn new(settings: DeviceSettings) -> AppResult<Self> {
        settings.validate()?;
        let refresh_interval = settings.rate_refresh_interval()?;

        let state = AcquisitionStateMachine::new();
        let primary_sink = BroadcastSink::new("output", settings.channel_capacity);
        let pattern_sink = BroadcastSink::new("pattern", settings.channel_capacity);
        let throughput = throughput_observable();
        let ingestor = Arc::new(InputIngestor::new(settings.save_to.clone()));
        let (input_tx, input_rx) = mpsc::channel(settings.channel_capacity);
        let (shutdown_tx, _) = watch::channel(false);

        let primary =
            PrimaryStreamProducer::new(state.clone(), primary_sink.clone(), &settings.instance_id);
        let pattern = PatternStreamProducer::new(
            state.clone(),
            FramePatternCycle::generate(settings.pattern_size),
            pattern_sink.clone(),
            refresh_interval,
            throughput.clone(),
        );

        tracing::info!(
            instance_id = %settings.instance_id,
            save_to = %settings.save_to.display(),
            "Device created"
        );

        Ok(Self {
            settings,
            state,
            primary_sink,
            pattern_sink,
            throughput,
            ingestor,
            input_tx,
            pending: Mutex::new(Some(Pending {
                primary,
                pattern,
                input: input_rx,
            })),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the producer and ingest loops on the current tokio runtime.
    ///
    /// Fails if the device was already started or has been shut down.
    pub fn start(&self) -> AppResult<()> {
        if *self.shutdown_tx.borrow() {
            return Err(PiperError::Shutdown("device has been shut down".into()));
        }
        let Some(Pending {
            primary,
            pattern,
            input,
        }) = self.pending.lock().take()
        else {
            return Err(PiperError::Configuration("device already started".into()));
        };

        let period = self.settings.tick_interval();
        let mut tasks = self.tasks.lock();

        let shutdown = self.shutdown_tx.subscribe();
        tasks.push((
            "primary",
            tokio::spawn(async move {
                let producer = run_periodic(primary, period, shutdown).await;
                tracing::info!(
                    emitted = producer.emitted(),
                    failures = producer.failures(),
                    "Primary stream stopped"
                );
            }),
        ));

        let shutdown = self.shutdown_tx.subscribe();
        tasks.push((
            "pattern",
            tokio::spawn(async move {
                let producer = run_periodic(pattern, period, shutdown).await;
                tracing::info!(emitted = producer.emitted(), "Pattern stream stopped");
            }),
        ));

        let shutdown = self.shutdown_tx.subscribe();
        let ingestor = Arc::clone(&self.ingestor);
        tasks.push((
            "ingest",
            tokio::spawn(ingestor.run(input, shutdown)),
        ));

        tracing::info!(?period, "Device started");
        Ok(())
    }

    /// Signal every loop to stop and wait for them to finish.
    ///
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.shutdown_tx.send_replace(true);
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        if tasks.is_empty() {
            return Ok(());
        }

        let mut failed = Vec::new();
        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "Device task did not stop cleanly");
                failed.push(format!("{}: {}", name, e));
            }
        }

        if failed.is_empty() {
            tracing::info!("Device shut down");
            Ok(())
        } else {
            Err(PiperError::Shutdown(failed.join("; ")))
        }
    }

    /// Whether `start` has run and `shutdown` has not.
    pub fn is_running(&self) -> bool {
        !*self.shutdown_tx.borrow() && !self.tasks.lock().is_empty()
    }

    /// Toggle between Idle and Acquiring; from Processing, switch to Acquiring.
    pub fn toggle_acquisition(&self) -> Transition {
        self.state.toggle_acquisition()
    }

    /// Toggle between Idle and Processing; from Acquiring, switch to Processing.
    pub fn toggle_processing(&self) -> Transition {
        self.state.toggle_processing()
    }

    /// Current acquisition state.
    pub fn state(&self) -> AcquisitionState {
        self.state.current()
    }

    /// Receive state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<AcquisitionState> {
        self.state.subscribe()
    }

    /// Receive primary-stream frames emitted from now on.
    pub fn subscribe_primary(&self) -> broadcast::Receiver<SyntheticFrame> {
        self.primary_sink.subscribe()
    }

    /// Receive pattern triples emitted from now on.
    pub fn subscribe_patterns(&self) -> broadcast::Receiver<Arc<PatternTriple>> {
        self.pattern_sink.subscribe()
    }

    /// Pattern throughput metric (Hz).
    pub fn throughput(&self) -> &Observable<f64> {
        &self.throughput
    }

    /// Sender for inbound frames to be saved.
    pub fn input(&self) -> mpsc::Sender<InboundFrame> {
        self.input_tx.clone()
    }

    /// Change the save directory; applies from the next inbound frame.
    pub fn set_save_to(&self, path: impl Into<PathBuf>) -> AppResult<()> {
        let path = path.into();
        validate_save_to(&path)?;
        self.ingestor.set_save_to(path);
        Ok(())
    }

    /// Current save directory.
    pub fn save_to(&self) -> PathBuf {
        self.ingestor.save_to()
    }

    /// Ingest attempts so far, successful or not.
    pub fn saved_count(&self) -> u64 {
        self.ingestor.saved_count()
    }

    /// Settings the device was built with.
    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    /// Snapshot of state, throughput and save progress.
    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            state: self.state(),
            throughput_hz: self.throughput.get(),
            saved_count: self.saved_count(),
            save_to: self.save_to(),
        }
    }
}

impl Drop for PiperDevice {
    fn drop(&mut self) {
        // Loops still running exit at their next check.
        self.shutdown_tx.send_replace(true);
    }
}
