//! Axis-to-command transfer functions
//!
//! Each mapped joystick axis drives exactly one actuator channel:
//!
//! | Axis | Channel     | Transfer                 | Range        |
//! |------|-------------|--------------------------|--------------|
//! | 0 X  | equilibrium | `-v * π/2`               | [-π/2, π/2]  |
//! | 1 Y  | stiffness   | `|v| * π`                | [0, π]       |
//! | 2 Z  | damping     | `0.5 + 0.5 * v`          | [0, 1]       |
//!
//! The stiffness transfer discards the sign of the axis, so pushing the stick
//! forward or back both stiffen the spring. The result is always clamped to
//! the limits the controller reported.

use std::f64::consts::{FRAC_PI_2, PI};

use tracing::{debug, warn};

use crate::controller::AxisEvent;
use crate::mapping::command::{Channel, CommandVector, HardwareLimits};

/// Joystick X axis
pub const EQUILIBRIUM_AXIS: u8 = 0;
/// Joystick Y axis
pub const STIFFNESS_AXIS: u8 = 1;
/// Throttle axis
pub const DAMPING_AXIS: u8 = 2;

/// Raw (unclamped) channel value for an axis position
///
/// Returns `None` for axes that have no channel assigned.
pub fn transfer(axis: u8, value: f64) -> Option<(Channel, f64)> {
    match axis {
        EQUILIBRIUM_AXIS => Some((Channel::Equilibrium, -value * FRAC_PI_2)),
        STIFFNESS_AXIS => Some((Channel::Stiffness, value.abs() * PI)),
        DAMPING_AXIS => Some((Channel::Damping, 0.5 + 0.5 * value)),
        _ => None,
    }
}

/// Apply one axis event to the command vector
///
/// Only the channel bound to the event's axis changes; unknown axes and
/// non-finite readings return the command untouched.
pub fn map_axis(
    command: CommandVector,
    event: &AxisEvent,
    limits: &HardwareLimits,
) -> CommandVector {
    if !event.value.is_finite() {
        warn!(
            "Ignoring non-finite reading {} on axis {}",
            event.value, event.axis
        );
        return command;
    }

    match transfer(event.axis, event.value) {
        Some((channel, raw)) => {
            let clamped = limits.clamp(channel, raw);
            if clamped != raw {
                debug!("Clamped {} from {:.4} to {:.4}", channel, raw, clamped);
            }
            command.with_channel(channel, clamped)
        }
        None => {
            debug!("Axis {} has no channel assigned", event.axis);
            command
        }
    }
}
