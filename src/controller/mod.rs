//! Joystick input subsystem
//!
//! Turns raw input-device activity into the two event kinds the control
//! loop understands:
//!
//! 1. [`events`] - Typed axis and button events plus device descriptors
//! 2. [`event_collector`] - gilrs-backed collector implementing [`EventSource`]
//!
//! # Architecture
//!
//! ```text
//! Joystick ──► gilrs ──► EventCollector ──► JoystickEvent ──► ControlLoop
//!                        (filtering)
//! ```
//!
//! Everything runs on the caller's thread. [`EventSource::next_event`] is the
//! only blocking call in the program.

pub mod event_collector;
pub mod events;

use std::fmt::Debug;

pub use event_collector::EventCollector;
pub use events::{AxisEvent, ButtonEvent, DeviceId, DeviceInfo, JoystickEvent, SourceError};

/// Source of joystick events
pub trait EventSource: Debug {
    /// Currently connected input devices
    fn enumerate(&mut self) -> Result<Vec<DeviceInfo>, SourceError>;

    /// Block until the next axis motion or button press arrives
    ///
    /// Other device activity (releases, hot-plug, unmapped axes) is
    /// filtered out before it reaches the caller.
    fn next_event(&mut self) -> Result<JoystickEvent, SourceError>;
}
