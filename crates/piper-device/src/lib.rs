//! `piper-device`
//!
//! The simulated detector built on [`piper_core`]: two periodic producers
//! gated by the acquisition state, and an ingestor that saves inbound frames.
//!
//! ## Modules
//!
//! - [`config`]: layered [`DeviceSettings`]
//! - [`pattern`]: pattern generation and the [`FramePatternCycle`]
//! - [`producer`]: the [`Producer`] trait and [`run_periodic`] driver
//! - [`primary`]: [`PrimaryStreamProducer`] (Acquiring)
//! - [`pattern_stream`]: [`PatternStreamProducer`] (Processing)
//! - [`ingest`]: [`InputIngestor`]
//! - [`device`]: [`PiperDevice`], which owns and runs all of the above
//!
//! ## Example
//!
//! ```no_run
//! use piper_device::{DeviceSettings, PiperDevice};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let device = PiperDevice::new(DeviceSettings::load(None)?)?;
//! device.start()?;
//! device.toggle_acquisition();
//!
//! let mut frames = device.subscribe_primary();
//! let frame = frames.recv().await?;
//! println!("train {}", frame.train_id);
//!
//! device.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod ingest;
pub mod pattern;
pub mod pattern_stream;
pub mod primary;
pub mod producer;

pub use config::DeviceSettings;
pub use device::{DeviceStatus, PiperDevice};
pub use ingest::InputIngestor;
pub use pattern::FramePatternCycle;
pub use pattern_stream::{PatternStreamProducer, PatternTick};
pub use primary::{PrimaryStreamProducer, PrimaryTick};
pub use producer::{run_periodic, Producer};
