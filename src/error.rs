use crate::config::ConfigError;
use crate::controller::SourceError;
use crate::link::LinkError;

/// Fatal errors that end the teleoperation session
///
/// Each variant maps to its own process exit status. Usage errors never get
/// here; clap reports them and exits with status 2.
#[derive(Debug, thiserror::Error)]
pub enum TeleopError {
    #[error("No joystick detected. Please connect a joystick and run again.")]
    NoDevice,

    #[error("Actuator link error: {0}")]
    Link(#[from] LinkError),

    #[error("Joystick input error: {0}")]
    Input(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl TeleopError {
    pub fn exit_code(&self) -> u8 {
        match self {
            TeleopError::NoDevice => 3,
            TeleopError::Link(_) => 4,
            TeleopError::Input(_) => 5,
            TeleopError::Config(_) => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_and_non_zero() {
        let errors = [
            TeleopError::NoDevice,
            TeleopError::Link(LinkError::Timeout { waited_ms: 1 }),
            TeleopError::Input(SourceError::BackendClosed),
            TeleopError::Config(ConfigError::InvalidValue {
                field: "link.baud_rate",
                reason: String::new(),
            }),
        ];
        let mut codes: Vec<u8> = errors.iter().map(TeleopError::exit_code).collect();
        assert!(codes.iter().all(|c| *c != 0 && *c != 2));
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn link_errors_convert() {
        let err: TeleopError = LinkError::ControllerFault(1).into();
        assert!(matches!(err, TeleopError::Link(LinkError::ControllerFault(1))));
    }
}
