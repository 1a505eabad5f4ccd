//! Records flowing through the device.
//!
//! - [`SyntheticFrame`]: one primary-stream emission (gain/ADC maps plus
//!   per-train metadata).
//! - [`PatternTriple`]: one pattern-stream emission (raw/gain/corrected
//!   images of identical shape).
//! - [`InboundFrame`]: one frame delivered by the input stream for saving.
//!
//! Large image buffers are held behind `Arc` so an emission clones pointers,
//! not pixels.

use crate::limits::{
    FRAME_HEIGHT, FRAME_NUMBER, FRAME_WIDTH, INITIAL_EPOCH_SECS, INITIAL_TRAIN_ID, MEMORY_CELL,
};
use chrono::Utc;
use ndarray::{Array2, ArrayD};
use std::sync::Arc;

// =============================================================================
// Timestamp
// =============================================================================

/// Wall-clock epoch paired with the train-indexed logical clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamp {
    /// Seconds since the Unix epoch (microsecond resolution).
    pub epoch_secs: f64,
    /// Train id this timestamp belongs to.
    pub train_id: u64,
}

impl Timestamp {
    /// Stamp `train_id` with the current wall-clock time.
    pub fn now(train_id: u64) -> Self {
        Self {
            epoch_secs: Utc::now().timestamp_micros() as f64 / 1_000_000.0,
            train_id,
        }
    }

    /// Build a timestamp from explicit parts.
    pub fn new(epoch_secs: f64, train_id: u64) -> Self {
        Self {
            epoch_secs,
            train_id,
        }
    }
}

// =============================================================================
// SyntheticFrame
// =============================================================================

/// Primary-stream record.
///
/// Only `train_id` and `timestamp` change between emissions; everything else
/// is fixed at construction.
#[derive(Debug, Clone)]
pub struct SyntheticFrame {
    /// Gain map (`FRAME_HEIGHT` × `FRAME_WIDTH`).
    pub gain: Arc<Array2<f64>>,
    /// ADC map (`FRAME_HEIGHT` × `FRAME_WIDTH`).
    pub adc: Arc<Array2<f64>>,
    /// Identifiers of the devices the frame passed through.
    pub passport: Vec<String>,
    /// Memory-cell marker.
    pub memory_cell: u8,
    /// Constant frame number.
    pub frame_number: u64,
    /// Monotonic train counter.
    pub train_id: u64,
    /// Emission time.
    pub timestamp: Timestamp,
}

impl SyntheticFrame {
    /// Zero-filled frame whose passport names `instance_id`.
    pub fn new(instance_id: impl Into<String>) -> Self {
        let zeros = Arc::new(Array2::<f64>::zeros((FRAME_HEIGHT, FRAME_WIDTH)));
        Self {
            gain: zeros.clone(),
            adc: zeros,
            passport: vec![instance_id.into()],
            memory_cell: MEMORY_CELL,
            frame_number: FRAME_NUMBER,
            train_id: INITIAL_TRAIN_ID,
            timestamp: Timestamp::new(INITIAL_EPOCH_SECS, INITIAL_TRAIN_ID),
        }
    }
}

// =============================================================================
// PatternTriple
// =============================================================================

/// Matched raw/gain/corrected images representing one processing result.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternTriple {
    /// Raw ADC counts.
    pub raw: Array2<u32>,
    /// Per-pixel gain stage.
    pub gain: Array2<u8>,
    /// Gain-corrected intensity.
    pub corrected: Array2<f32>,
}

impl PatternTriple {
    /// Shared image shape as (rows, columns).
    pub fn dim(&self) -> (usize, usize) {
        self.raw.dim()
    }
}

// =============================================================================
// InboundFrame
// =============================================================================

/// A frame delivered by the input stream.
///
/// `image` is expected to be at least three-dimensional (height, width,
/// channel, ...); the ingest path validates this, not the constructor.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Source identifier from the delivery metadata (e.g. `"DET/LPD:output"`).
    pub source: String,
    /// Train ids carried in the payload; the first one names the file.
    pub train_ids: Vec<u64>,
    /// Image data.
    pub image: ArrayD<f32>,
}

impl InboundFrame {
    /// Create an inbound frame.
    pub fn new(source: impl Into<String>, train_ids: Vec<u64>, image: ArrayD<f32>) -> Self {
        Self {
            source: source.into(),
            train_ids,
            image,
        }
    }

    /// First train id, if any.
    pub fn train_id(&self) -> Option<u64> {
        self.train_ids.first().copied()
    }

    /// One-line description of what was received, for diagnostics.
    pub fn describe(&self) -> String {
        format!(
            "source={:?} train_ids={:?} image.shape={:?}",
            self.source,
            self.train_ids,
            self.image.shape()
        )
    }
}
