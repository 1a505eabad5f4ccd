//! Inbound frame persistence.
//!
//! Each frame delivered on the input stream is written to
//! `<save_to>/<sanitized source>_<train id>.npy`, holding channel 0 of the
//! image as a C-ordered `<f4` array that `numpy.load` opens directly. [`InputIngestor::ingest`] reports failures as an
//! [`IngestError`]; [`InputIngestor::on_data`] logs them together with a
//! description of what was received and carries on. Every attempt, saved or
//! not, advances the save counter.

use ndarray::{ArrayViewD, Axis};
use npyz::WriterBuilder;
use parking_lot::RwLock;
use piper_core::{InboundFrame, IngestError, IngestErrorKind};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Extension of saved frame files.
pub const FRAME_FILE_EXTENSION: &str = "npy";

/// Characters that cannot appear in a frame file name.
const UNSAFE_CHARS: [char; 4] = ['/', '\\', ':', '\0'];

/// Replace path separators and other unsafe characters with `_`.
pub fn sanitize_source(source: &str) -> String {
    source
        .chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// File name for the frame of `train_id` from `source`.
///
/// An empty source still yields a usable name, `_<train id>.npy`.
pub fn frame_file_name(source: &str, train_id: u64) -> String {
    format!(
        "{}_{}.{}",
        sanitize_source(source),
        train_id,
        FRAME_FILE_EXTENSION
    )
}

/// Write `image` to `path` as a `.npy` file, replacing any existing file.
fn write_frame_file(path: &Path, image: &ArrayViewD<'_, f32>) -> io::Result<()> {
    let shape: Vec<u64> = image.shape().iter().map(|&n| n as u64).collect();
    let mut writer = npyz::WriteOptions::<f32>::new()
        .default_dtype()
        .shape(&shape)
        .writer(BufWriter::new(File::create(path)?))
        .begin_nd()?;
    // Logical iteration order is C order regardless of the view's strides.
    for value in image.iter() {
        writer.push(value)?;
    }
    writer.finish()
}

/// Writes inbound frames to the configured directory.
#[derive(Debug)]
pub struct InputIngestor {
    save_to: RwLock<PathBuf>,
    saved_count: AtomicU64,
}

impl InputIngestor {
    /// Create an ingestor saving into `save_to`.
    pub fn new(save_to: impl Into<PathBuf>) -> Self {
        Self {
            save_to: RwLock::new(save_to.into()),
            saved_count: AtomicU64::new(0),
        }
    }

    /// Current target directory.
    pub fn save_to(&self) -> PathBuf {
        self.save_to.read().clone()
    }

    /// Change the target directory; takes effect from the next frame.
    pub fn set_save_to(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        tracing::info!(path = %path.display(), "Save directory changed");
        *self.save_to.write() = path;
    }

    /// Ingest attempts so far, successful or not.
    pub fn saved_count(&self) -> u64 {
        self.saved_count.load(Ordering::Relaxed)
    }

    /// Persist channel 0 of `frame` and return the written path.
    ///
    /// Does not touch the save counter.
    pub fn ingest(&self, frame: &InboundFrame) -> Result<PathBuf, IngestError> {
        let train_id = frame.train_id().ok_or_else(|| {
            IngestError::new(IngestErrorKind::MalformedPayload, "no train id in payload")
        })?;
        let file_name = frame_file_name(&frame.source, train_id);

        let shape = frame.image.shape();
        if shape.len() < 3 {
            return Err(IngestError::new(
                IngestErrorKind::MalformedPayload,
                format!(
                    "image must have at least 3 dimensions, got shape {:?}",
                    shape
                ),
            ));
        }
        if shape[2] == 0 {
            return Err(IngestError::new(
                IngestErrorKind::MalformedPayload,
                format!("image has no channels, shape {:?}", shape),
            ));
        }

        let dir = self.save_to();
        std::fs::create_dir_all(&dir)
            .map_err(|e| IngestError::io(IngestErrorKind::DirectoryCreation, &dir, e))?;

        let path = dir.join(file_name);
        let channel = frame.image.index_axis(Axis(2), 0);
        write_frame_file(&path, &channel)
            .map_err(|e| IngestError::io(IngestErrorKind::Write, &path, e))?;
        Ok(path)
    }

    /// Handle one inbound frame: save it, log the outcome, count the attempt.
    ///
    /// Never fails; a frame that cannot be saved is logged and dropped.
    pub fn on_data(&self, frame: &InboundFrame) -> Option<PathBuf> {
        let result = self.ingest(frame);
        let saved_count = self.saved_count.fetch_add(1, Ordering::Relaxed) + 1;

        match result {
            Ok(path) => {
                tracing::info!(path = %path.display(), saved_count, "Frame saved");
                Some(path)
            }
            Err(error) => {
                tracing::warn!(
                    kind = %error.kind,
                    saved_count,
                    received = %frame.describe(),
                    "Frame not saved: {}",
                    error
                );
                None
            }
        }
    }

    /// Drain `frames` in arrival order until shutdown or until every sender
    /// is gone. File I/O runs on the blocking pool, one frame at a time.
    pub async fn run(
        self: Arc<Self>,
        mut frames: mpsc::Receiver<InboundFrame>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::debug!(save_to = %self.save_to().display(), "Ingest loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                frame = frames.recv() => {
                    let Some(frame) = frame else { break };
                    let ingestor = Arc::clone(&self);
                    if let Err(e) = tokio::task::spawn_blocking(move || ingestor.on_data(&frame)).await {
                        tracing::error!(error = %e, "Ingest task panicked");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(saved_count = self.saved_count(), "Ingest loop stopped");
    }
}
