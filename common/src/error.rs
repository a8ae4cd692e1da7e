use thiserror::Error;

use crate::types::ProtocolKind;

/// A command payload that could not be interpreted. The command is skipped
/// as a whole; nothing is partially applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unrecognized mode '{0}'")]
    UnknownMode(String),
    #[error("unrecognized fan mode '{0}'")]
    UnknownFan(String),
    #[error("unrecognized swing mode '{0}'")]
    UnknownSwing(String),
    #[error("expected on/off, got '{0}'")]
    InvalidToggle(String),
    #[error("can't convert '{0}' to a number")]
    InvalidNumber(String),
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}

/// A decoded IR frame that does not describe a state this model can hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame for {actual} received by a {expected} device")]
    ProtocolMismatch {
        expected: ProtocolKind,
        actual: ProtocolKind,
    },
    #[error("unknown mode code {0}")]
    UnknownModeCode(u8),
    #[error("unknown fan code {0}")]
    UnknownFanCode(u8),
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("malformed retained state: {0}")]
    Json(#[from] serde_json::Error),
    #[error("retained state names no operating mode")]
    NoOperatingMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ir transmit failed: {0}")]
pub struct TransmitError(pub String);
