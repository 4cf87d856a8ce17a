//! Mapping of joystick axes onto actuator commands.
//!
//! [`command`] holds the data model shared with the hardware link
//! (command vector and hardware limits), [`mapper`] holds the pure
//! per-axis transfer functions used by the control loop.

pub mod command;
pub mod mapper;

pub use command::{Channel, CommandVector, HardwareLimits, LimitsError};
pub use mapper::{map_axis, transfer, DAMPING_AXIS, EQUILIBRIUM_AXIS, STIFFNESS_AXIS};
