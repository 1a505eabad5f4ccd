//! Shared timing, geometry and frame constants.
//!
//! Centralizes the numbers the producers and the configuration defaults
//! agree on, so tuning happens in one place.

use std::time::Duration;

// =============================================================================
// Timing
// =============================================================================

/// Producer tick period (100 ms).
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Default window over which the pattern throughput is refreshed (1 second).
pub const RATE_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Transient sink failures are logged at `warn` once per this many failures.
pub const SINK_FAILURE_WARN_EVERY: u64 = 100;

// =============================================================================
// Primary Frame
// =============================================================================

/// Rows of the gain and ADC maps.
pub const FRAME_HEIGHT: usize = 512;

/// Columns of the gain and ADC maps.
pub const FRAME_WIDTH: usize = 1024;

/// Frame number stamped on every primary frame.
pub const FRAME_NUMBER: u64 = 524_221;

/// Memory-cell marker byte stamped on every primary frame.
pub const MEMORY_CELL: u8 = 0x0f;

/// Train id the primary stream starts from and resets to.
pub const INITIAL_TRAIN_ID: u64 = 1;

/// Epoch (seconds) carried by the primary frame before its first emission.
pub const INITIAL_EPOCH_SECS: f64 = 1_616_169_094.918_412;

// =============================================================================
// Pattern Stream
// =============================================================================

/// Edge length of the square pattern images.
pub const PATTERN_SIZE: usize = 512;

/// Number of triples in the pattern cycle.
pub const PATTERN_CYCLE_LEN: usize = 3;
