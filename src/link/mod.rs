//! Actuator link subsystem
//!
//! Owns the point-to-point connection to the MACCEPA control board:
//!
//! 1. [`protocol`] - Frame format (sync bytes, CRC-8) and payload codecs
//! 2. [`maccepa`] - Serial-backed [`ActuatorLink`] with bounded write retries
//!
//! The control loop only sees the [`ActuatorLink`] trait, so it can be
//! driven by any transport that speaks the frame format.

pub mod maccepa;
pub mod protocol;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::mapping::{CommandVector, HardwareLimits, LimitsError};

pub use maccepa::MaccepaLink;
pub use protocol::ProtocolError;

/// Connection to the actuator controller
pub trait ActuatorLink: Debug {
    /// Read the per-channel command bounds from the controller
    fn query_limits(&mut self) -> Result<HardwareLimits, LinkError>;

    /// Send a command vector to the controller
    fn write(&mut self, command: &CommandVector) -> Result<(), LinkError>;
}

/// Serial link settings
///
/// # Examples
///
/// ```toml
/// [link]
/// baud_rate = 115200
/// timeout_ms = 500
/// write_retries = 3
/// retry_delay_ms = 10
/// ```
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LinkSettings {
    /// Serial baud rate (8N1 framing)
    pub baud_rate: u32,

    /// Serial read timeout, also the deadline for the limits reply
    pub timeout_ms: u64,

    /// Extra attempts after a failed command write before giving up
    pub write_retries: u32,

    /// Pause between write attempts
    pub retry_delay_ms: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            timeout_ms: 500,
            write_retries: 3,
            retry_delay_ms: 10,
        }
    }
}

/// Errors raised by the actuator link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The serial device could not be opened
    #[error("Failed to open {port}: {source}")]
    OpenError {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("I/O error on actuator link: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Controller did not answer within {waited_ms} ms")]
    Timeout { waited_ms: u64 },

    #[error("Protocol error: {0}")]
    ProtocolError(#[from] ProtocolError),

    #[error("Controller reported fault code {0:#04x}")]
    ControllerFault(u8),

    #[error("Controller reported invalid limits: {0}")]
    InvalidLimits(#[from] LimitsError),

    #[error("Command limits have not been queried yet")]
    LimitsNotQueried,

    /// A command write kept failing after every retry
    #[error("Command write failed after {attempts} attempts: {source}")]
    WriteFailed {
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
}
