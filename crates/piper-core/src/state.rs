//! Acquisition state machine.
//!
//! The device is in exactly one of three modes. Two external toggles drive it:
//!
//! | from \ toggle | acquisition | processing |
//! |---------------|-------------|------------|
//! | Idle          | Acquiring   | Processing |
//! | Acquiring     | Idle        | Processing |
//! | Processing    | Acquiring   | Idle       |
//!
//! The last toggle wins: toggling one active mode while the other is active
//! leaves the other mode and enters the requested one. Producers only ever
//! read a single value, so at most one of them emits at any instant.
//!
//! The state is held in a `tokio::sync::watch` channel: one logical writer
//! (the control path), many readers (the producer loops, monitors).

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Operating mode of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcquisitionState {
    /// Resting state; nothing is emitted.
    #[default]
    #[serde(rename = "NORMAL")]
    Idle,
    /// The primary stream emits synthetic frames.
    Acquiring,
    /// The pattern stream emits image triples.
    Processing,
}

impl AcquisitionState {
    /// Whether the primary stream should emit.
    pub fn is_acquiring(self) -> bool {
        matches!(self, AcquisitionState::Acquiring)
    }

    /// Whether the pattern stream should emit.
    pub fn is_processing(self) -> bool {
        matches!(self, AcquisitionState::Processing)
    }
}

impl std::fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AcquisitionState::Idle => "NORMAL",
            AcquisitionState::Acquiring => "ACQUIRING",
            AcquisitionState::Processing => "PROCESSING",
        };
        write!(f, "{}", label)
    }
}

/// Result of a toggle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the toggle
    pub from: AcquisitionState,
    /// State after the toggle
    pub to: AcquisitionState,
}

/// Shared handle to the device mode.
///
/// Clones refer to the same state.
#[derive(Debug, Clone)]
pub struct AcquisitionStateMachine {
    sender: watch::Sender<AcquisitionState>,
}

impl Default for AcquisitionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AcquisitionStateMachine {
    /// Create a machine in [`AcquisitionState::Idle`].
    pub fn new() -> Self {
        let (sender, _) = watch::channel(AcquisitionState::Idle);
        Self { sender }
    }

    /// Current mode.
    pub fn current(&self) -> AcquisitionState {
        *self.sender.borrow()
    }

    /// Idle → Acquiring, Acquiring → Idle, Processing → Acquiring.
    pub fn toggle_acquisition(&self) -> Transition {
        self.toggle(AcquisitionState::Acquiring)
    }

    /// Idle → Processing, Processing → Idle, Acquiring → Processing.
    pub fn toggle_processing(&self) -> Transition {
        self.toggle(AcquisitionState::Processing)
    }

    /// Force the machine back to Idle.
    pub fn reset(&self) -> Transition {
        let mut from = AcquisitionState::Idle;
        self.sender.send_if_modified(|state| {
            from = *state;
            *state = AcquisitionState::Idle;
            from != AcquisitionState::Idle
        });
        self.log_transition(from, AcquisitionState::Idle);
        Transition {
            from,
            to: AcquisitionState::Idle,
        }
    }

    /// Subscribe to mode changes.
    pub fn subscribe(&self) -> watch::Receiver<AcquisitionState> {
        self.sender.subscribe()
    }

    fn toggle(&self, active: AcquisitionState) -> Transition {
        let mut from = AcquisitionState::Idle;
        let mut to = AcquisitionState::Idle;
        self.sender.send_modify(|state| {
            from = *state;
            to = if from == active {
                AcquisitionState::Idle
            } else {
                active
            };
            *state = to;
        });
        self.log_transition(from, to);
        Transition { from, to }
    }

    fn log_transition(&self, from: AcquisitionState, to: AcquisitionState) {
        if from != to {
            tracing::info!(%from, %to, "State changed");
        }
    }
}
