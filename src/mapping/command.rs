//! Command vector and hardware limits for the actuator
//!
//! The actuator accepts three channels, always in the same order:
//! equilibrium angle, spring stiffness and damping. Both the command
//! and the limits keep that order so channel indices line up on the wire.

use std::fmt;
use thiserror::Error;

/// Actuator command channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Target angular setpoint (radians)
    Equilibrium = 0,
    /// Spring pretension (radians)
    Stiffness = 1,
    /// Damping fraction (0.0-1.0)
    Damping = 2,
}

impl Channel {
    /// All channels in wire order
    pub const ALL: [Channel; 3] = [Channel::Equilibrium, Channel::Stiffness, Channel::Damping];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Equilibrium => "equilibrium",
            Channel::Stiffness => "stiffness",
            Channel::Damping => "damping",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Three-channel command sent to the actuator controller
///
/// Starts zeroed and is updated one channel at a time as axis events arrive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommandVector {
    channels: [f64; 3],
}

impl CommandVector {
    pub const ZERO: CommandVector = CommandVector {
        channels: [0.0; 3],
    };

    pub fn new(equilibrium: f64, stiffness: f64, damping: f64) -> Self {
        Self {
            channels: [equilibrium, stiffness, damping],
        }
    }

    pub fn get(&self, channel: Channel) -> f64 {
        self.channels[channel.index()]
    }

    pub fn set(&mut self, channel: Channel, value: f64) {
        self.channels[channel.index()] = value;
    }

    /// Returns a copy with one channel replaced
    pub fn with_channel(mut self, channel: Channel, value: f64) -> Self {
        self.set(channel, value);
        self
    }

    pub fn equilibrium(&self) -> f64 {
        self.get(Channel::Equilibrium)
    }

    pub fn stiffness(&self) -> f64 {
        self.get(Channel::Stiffness)
    }

    pub fn damping(&self) -> f64 {
        self.get(Channel::Damping)
    }

    pub fn as_array(&self) -> [f64; 3] {
        self.channels
    }
}

impl fmt::Display for CommandVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.3}, {:.3}, {:.3}]",
            self.channels[0], self.channels[1], self.channels[2]
        )
    }
}

/// Rejected limit sets
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LimitsError {
    #[error("limit on channel {channel} is not a finite number")]
    NotFinite { channel: Channel },

    #[error("lower limit {lower} exceeds upper limit {upper} on channel {channel}")]
    Inverted {
        channel: Channel,
        lower: f64,
        upper: f64,
    },
}

/// Per-channel command bounds reported by the controller
///
/// Always satisfies `lower[i] <= upper[i]` with finite values, which keeps
/// [`HardwareLimits::clamp`] well defined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardwareLimits {
    upper: [f64; 3],
    lower: [f64; 3],
}

impl HardwareLimits {
    pub fn new(upper: [f64; 3], lower: [f64; 3]) -> Result<Self, LimitsError> {
        for channel in Channel::ALL {
            let (hi, lo) = (upper[channel.index()], lower[channel.index()]);
            if !hi.is_finite() || !lo.is_finite() {
                return Err(LimitsError::NotFinite { channel });
            }
            if lo > hi {
                return Err(LimitsError::Inverted {
                    channel,
                    lower: lo,
                    upper: hi,
                });
            }
        }
        Ok(Self { upper, lower })
    }

    pub fn upper(&self) -> [f64; 3] {
        self.upper
    }

    pub fn lower(&self) -> [f64; 3] {
        self.lower
    }

    /// Clamp a raw channel value into `[lower, upper]`
    pub fn clamp(&self, channel: Channel, value: f64) -> f64 {
        let i = channel.index();
        value.clamp(self.lower[i], self.upper[i])
    }

    #[cfg(test)]
    pub fn contains(&self, channel: Channel, value: f64) -> bool {
        let i = channel.index();
        value >= self.lower[i] && value <= self.upper[i]
    }
}
