//! `piper-core`
//!
//! Core types and primitives for the Piper simulated detector.
//!
//! ## Key Types
//!
//! - [`AcquisitionStateMachine`]: exclusive Idle / Acquiring / Processing mode
//! - [`RateCalculator`]: events-per-second estimate over a refresh window
//! - [`Observable`]: published values with change notification
//! - [`SyntheticFrame`], [`PatternTriple`], [`InboundFrame`]: records in flight
//! - [`FrameSink`]: push destination for emitted records
//! - [`PiperError`], [`SinkError`], [`IngestError`]: error types

pub mod data;
pub mod error;
pub mod limits;
pub mod observable;
pub mod rate;
pub mod sink;
pub mod state;

pub use data::{InboundFrame, PatternTriple, SyntheticFrame, Timestamp};
pub use error::{AppResult, IngestError, IngestErrorKind, PiperError, SinkError};
pub use observable::Observable;
pub use rate::RateCalculator;
pub use sink::{BroadcastSink, FrameSink, MpscSink};
pub use state::{AcquisitionState, AcquisitionStateMachine, Transition};
