//! Synthetic inbound frames for exercising the ingestor without a host.

use ndarray::{ArrayD, IxDyn};
use piper_core::limits::INITIAL_TRAIN_ID;
use piper_core::InboundFrame;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;

/// Height × width × channels of generated frames.
pub const FEED_SHAPE: [usize; 3] = [128, 128, 2];

/// Highest accepted feed rate.
pub const MAX_FEED_RATE_HZ: f64 = 1000.0;

/// A frame whose channel 0 is a diagonal ramp shifted by `train_id`.
pub fn synthetic_frame(source: &str, train_id: u64) -> InboundFrame {
    let shift = (train_id % 256) as usize;
    let image = ArrayD::from_shape_fn(IxDyn(&FEED_SHAPE), |idx| {
        let ramp = ((idx[0] + idx[1] + shift) % 256) as f32;
        ramp + idx[2] as f32 * 1000.0
    });
    InboundFrame::new(source, vec![train_id], image)
}

/// Push frames into `input` at `rate_hz` until the device stops listening.
///
/// A full queue drops the frame rather than stalling the feed.
pub async fn run(input: mpsc::Sender<InboundFrame>, rate_hz: f64, source: String) {
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / rate_hz));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut train_id = INITIAL_TRAIN_ID;

    tracing::info!(rate_hz, %source, "Synthetic input feed started");
    loop {
        ticker.tick().await;
        train_id += 1;
        match input.try_send(synthetic_frame(&source, train_id)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!(train_id, "Input queue full, synthetic frame dropped");
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
    tracing::info!("Synthetic input feed stopped");
}
