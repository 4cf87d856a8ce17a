use std::fmt;
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::{DataBits, Parity, SerialPort, StopBits};
use tracing::{debug, error, info, warn};

use crate::link::protocol::{find_sync, Frame, FrameType, ProtocolError, SYNC_0};
use crate::link::{ActuatorLink, LinkError, LinkSettings};
use crate::mapping::{CommandVector, HardwareLimits};

/// Link to a MACCEPA control board
///
/// Generic over the byte transport; [`MaccepaLink::open`] builds one on a
/// serial port.
pub struct MaccepaLink<P> {
    port: P,
    port_name: String,
    settings: LinkSettings,
    read_buffer: Vec<u8>,
}

impl MaccepaLink<Box<dyn SerialPort>> {
    /// Open the control board on a serial device (e.g. `/dev/ttyUSB0`)
    pub fn open(port_name: &str, settings: LinkSettings) -> Result<Self, LinkError> {
        info!(
            "Opening actuator link on {} at {} baud",
            port_name, settings.baud_rate
        );
        let port = serialport::new(port_name, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(settings.timeout_ms))
            .open()
            .map_err(|source| {
                error!("Failed to open {}: {}", port_name, source);
                LinkError::OpenError {
                    port: port_name.to_string(),
                    source,
                }
            })?;

        Ok(Self::with_transport(port, port_name, settings))
    }
}

impl<P: Read + Write> MaccepaLink<P> {
    pub fn with_transport(port: P, port_name: impl Into<String>, settings: LinkSettings) -> Self {
        Self {
            port,
            port_name: port_name.into(),
            settings,
            read_buffer: Vec::with_capacity(128),
        }
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    /// Read until one complete frame arrives or the timeout elapses
    ///
    /// Malformed frames are skipped; only a decoded frame, the deadline or a
    /// transport error ends the wait.
    fn read_frame(&mut self) -> Result<Frame, LinkError> {
        let deadline = Instant::now() + Duration::from_millis(self.settings.timeout_ms);
        let mut chunk = [0u8; 64];

        loop {
            match self.take_buffered_frame() {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {}
                Err(e) => {
                    warn!("Dropping malformed frame from {}: {}", self.port_name, e);
                    continue;
                }
            }
            if Instant::now() >= deadline {
                return Err(LinkError::Timeout {
                    waited_ms: self.settings.timeout_ms,
                });
            }

            match self.port.read(&mut chunk) {
                Ok(0) => thread::sleep(Duration::from_millis(1)),
                Ok(n) => self.read_buffer.extend_from_slice(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn take_buffered_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let Some(sync_pos) = find_sync(&self.read_buffer) else {
            // Keep a trailing first sync byte, its partner may still be in flight
            let keep = usize::from(self.read_buffer.last() == Some(&SYNC_0));
            let discard = self.read_buffer.len() - keep;
            if discard > 0 {
                debug!("Discarding {} bytes without sync", discard);
                self.read_buffer.drain(..discard);
            }
            return Ok(None);
        };

        if sync_pos > 0 {
            debug!("Discarding {} bytes before sync", sync_pos);
            self.read_buffer.drain(..sync_pos);
        }

        match Frame::decode(&self.read_buffer) {
            Ok(Some((frame, used))) => {
                self.read_buffer.drain(..used);
                debug!("Received {:?} frame", frame.frame_type);
                Ok(Some(frame))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                // Skip this sync pair so the next call can resynchronize
                self.read_buffer.drain(..2);
                Err(e)
            }
        }
    }
}

impl<P: Read + Write> ActuatorLink for MaccepaLink<P> {
    fn query_limits(&mut self) -> Result<HardwareLimits, LinkError> {
        debug!("Querying command limits on {}", self.port_name);
        self.read_buffer.clear();

        let request = Frame::query_limits().encode()?;
        self.send_bytes(&request)?;

        let reply = self.read_frame()?;
        if reply.frame_type == FrameType::Fault {
            let code = reply.payload.first().copied().unwrap_or(0);
            error!("Controller answered limits query with fault {:#04x}", code);
            return Err(LinkError::ControllerFault(code));
        }

        let (upper, lower) = reply.limits()?;
        let limits = HardwareLimits::new(upper, lower)?;
        info!(
            "Controller limits: upper {:?}, lower {:?}",
            limits.upper(),
            limits.lower()
        );
        Ok(limits)
    }

    fn write(&mut self, command: &CommandVector) -> Result<(), LinkError> {
        let bytes = Frame::set_command(command).encode()?;
        let attempts = self.settings.write_retries + 1;
        let delay = Duration::from_millis(self.settings.retry_delay_ms);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_bytes(&bytes) {
                Ok(()) => {
                    debug!("Wrote command {} (attempt {})", command, attempt);
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "Command write failed (attempt {}/{}): {}",
                        attempt, attempts, e
                    );
                    // The controller resyncs past any partial frame on the wire
                    debug!("Resending full {} byte frame", bytes.len());
                    thread::sleep(delay);
                }
                Err(source) => {
                    error!("Giving up on command write after {} attempts", attempts);
                    return Err(LinkError::WriteFailed { attempts, source });
                }
            }
        }
    }
}

impl<P> fmt::Debug for MaccepaLink<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaccepaLink")
            .field("port_name", &self.port_name)
            .field("settings", &self.settings)
            .field("buffered", &self.read_buffer.len())
            .finish()
    }
}
