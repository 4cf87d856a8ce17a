use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs, GilrsBuilder};
use statum::{machine, state};
use tracing::{debug, error, info, warn};

use crate::controller::events::{
    AxisEvent, ButtonEvent, DeviceId, DeviceInfo, JoystickEvent, SourceError,
};
use crate::controller::EventSource;

// Axis values reach the mapper exactly as the device reports them
const DEFAULT_FILTERS: bool = false;

// Define collector states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct EventCollector<S: CollectionState> {
    // Gilrs context
    gilrs: Gilrs,
}

// Implementation of methods available in all states
impl<S: CollectionState> EventCollector<S> {
    fn list_gamepads(&self) -> Vec<DeviceInfo> {
        self.gilrs
            .gamepads()
            .map(|(id, gamepad)| device_info(id, &gamepad))
            .collect()
    }
}

// Implementation for Initializing state
impl EventCollector<Initializing> {
    pub fn create() -> Result<Self, SourceError> {
        // Initialize gilrs with logging
        info!("Initializing gilrs joystick interface");
        let gilrs = match gilrs_builder().build() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(gilrs::Error::NotImplemented(dummy)) => {
                warn!("gilrs has no backend for this platform, no joysticks will be found");
                dummy
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(SourceError::InitializationError(e.to_string()));
            }
        };

        debug!("Creating new EventCollector instance");
        Ok(Self::new(gilrs))
    }

    // Enumerate joysticks and transition to Collecting state
    pub fn initialize(self) -> Result<EventCollector<Collecting>, SourceError> {
        let devices = self.list_gamepads();

        if devices.is_empty() {
            warn!("No joystick connected");
        } else {
            info!("Found {} joysticks:", devices.len());
            for (idx, device) in devices.iter().enumerate() {
                info!("  [{}] ID: {}, Name: {}", idx, device.id, device.name);
            }
        }

        info!("Event Collector initialized, transitioning to Collecting state");
        Ok(self.transition())
    }
}

// Implementation for Collecting state
impl EventCollector<Collecting> {
    // Convert gilrs event to internal event type, None for filtered events
    fn convert_gilrs_event(&self, id: GamepadId, event: EventType) -> Option<JoystickEvent> {
        let device: DeviceId = usize::from(id);

        match event {
            EventType::AxisChanged(axis, value, _) => match axis_index(axis) {
                Some(index) => {
                    debug!("Axis {:?} (index {}) = {:.4}", axis, index, value);
                    Some(JoystickEvent::Axis(AxisEvent::new(
                        device,
                        index,
                        f64::from(value),
                    )))
                }
                None => {
                    debug!("Ignoring unsupported axis: {:?}", axis);
                    None
                }
            },
            EventType::ButtonPressed(button, _) => match button_index(button) {
                Some(index) => {
                    let raw = ButtonEvent::new(device, index);
                    info!(
                        "Button pressed: {:?} (index {}) at {}",
                        button,
                        index,
                        raw.timestamp.format("%H:%M:%S.%3f")
                    );
                    Some(JoystickEvent::Button(raw))
                }
                None => {
                    debug!("Ignoring unsupported button: {:?}", button);
                    None
                }
            },
            EventType::ButtonReleased(button, _) | EventType::ButtonRepeated(button, _) => {
                debug!("Button release/repeat ignored: {:?}", button);
                None
            }
            EventType::Connected => {
                info!("Joystick {} connected", device);
                None
            }
            EventType::Disconnected => {
                warn!("Joystick {} disconnected", device);
                None
            }
            _ => {
                debug!("Unhandled event type: {:?}", event);
                None
            }
        }
    }
}

impl EventSource for EventCollector<Collecting> {
    fn enumerate(&mut self) -> Result<Vec<DeviceInfo>, SourceError> {
        let devices = self.list_gamepads();
        debug!("Enumerated {} joysticks", devices.len());
        Ok(devices)
    }

    fn next_event(&mut self) -> Result<JoystickEvent, SourceError> {
        loop {
            // Blocks without timeout; None means the backend gave up
            let Some(Event { id, event, time, .. }) = self.gilrs.next_event_blocking(None) else {
                error!("gilrs returned no event from a blocking wait");
                return Err(SourceError::BackendClosed);
            };

            debug!("Processing gilrs event: {:?} at time: {:?}", event, time);

            if let Some(converted) = self.convert_gilrs_event(id, event) {
                return Ok(converted);
            }
        }
    }
}

fn gilrs_builder() -> GilrsBuilder {
    GilrsBuilder::new().with_default_filters(DEFAULT_FILTERS)
}

fn device_info(id: GamepadId, gamepad: &Gamepad<'_>) -> DeviceInfo {
    DeviceInfo {
        id: usize::from(id),
        name: gamepad.name().to_string(),
    }
}

// Helper function to map gilrs Axis to a device axis index
fn axis_index(axis: Axis) -> Option<u8> {
    match axis {
        Axis::LeftStickX => Some(0),
        Axis::LeftStickY => Some(1),
        Axis::LeftZ => Some(2),
        Axis::RightZ => Some(3),
        Axis::RightStickX => Some(4),
        Axis::RightStickY => Some(5),
        Axis::DPadX => Some(6),
        Axis::DPadY => Some(7),
        _ => None,
    }
}

// Helper function to map gilrs Button to a device button index
fn button_index(button: Button) -> Option<u8> {
    match button {
        Button::South => Some(0),
        Button::East => Some(1),
        Button::North => Some(2),
        Button::West => Some(3),
        Button::LeftTrigger => Some(4),
        Button::RightTrigger => Some(5),
        Button::LeftTrigger2 => Some(6),
        Button::RightTrigger2 => Some(7),
        Button::Select => Some(8),
        Button::Start => Some(9),
        Button::Mode => Some(10),
        Button::LeftThumb => Some(11),
        Button::RightThumb => Some(12),
        _ => None,
    }
}
