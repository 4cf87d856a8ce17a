use chrono::{DateTime, Local};

/// Identifier of an enumerated input device
pub type DeviceId = usize;

/// Connected input device, as reported at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
}

// Axis motion with the axis position normalized to [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct AxisEvent {
    pub device: DeviceId,
    pub axis: u8,
    pub value: f64,
    pub timestamp: DateTime<Local>,
}

impl AxisEvent {
    pub fn new(device: DeviceId, axis: u8, value: f64) -> Self {
        Self {
            device,
            axis,
            value,
            timestamp: Local::now(),
        }
    }
}

// Button press transition
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonEvent {
    pub device: DeviceId,
    pub button: u8,
    pub timestamp: DateTime<Local>,
}

impl ButtonEvent {
    pub fn new(device: DeviceId, button: u8) -> Self {
        Self {
            device,
            button,
            timestamp: Local::now(),
        }
    }
}

/// Event handed to the control loop
#[derive(Debug, Clone, PartialEq)]
pub enum JoystickEvent {
    Axis(AxisEvent),
    Button(ButtonEvent),
}

// Input source errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to initialize input backend: {0}")]
    InitializationError(String),

    #[error("Input backend stopped delivering events")]
    BackendClosed,
}
