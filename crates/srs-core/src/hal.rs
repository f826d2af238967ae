use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Name of a header pin on the controller board (e.g. `P8_10`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinId(String);

impl PinId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PinId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    #[error("no edge on pin {pin} within timeout")]
    Timeout { pin: PinId },
    #[error("pin {pin} has not been configured")]
    NotConfigured { pin: PinId },
    #[error("pin {pin} is configured in the wrong direction")]
    WrongMode { pin: PinId },
    #[error("pin {pin} cannot be claimed: {reason}")]
    Unavailable { pin: PinId, reason: String },
    #[error("I/O error on pin {pin}: {message}")]
    Io { pin: PinId, message: String },
}

/// Minimal GPIO capability set the control core needs from a board.
///
/// Every call reports success or failure; callers track output state only
/// from writes that returned `Ok`.
pub trait PinIo: Send {
    fn configure(&mut self, pin: &PinId, mode: PinMode) -> Result<(), HalError>;

    /// Waits for a rising edge and then a falling edge on `pin`, returning the
    /// time the line was high. Each edge wait is bounded by `edge_timeout`.
    fn read_pulse_high(&mut self, pin: &PinId, edge_timeout: Duration) -> Result<Duration, HalError>;

    fn write(&mut self, pin: &PinId, level: Level) -> Result<(), HalError>;
}

