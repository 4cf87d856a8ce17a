//! Teleoperation control loop
//!
//! Drives the actuator from joystick input as a typestate machine:
//!
//! ```text
//! Init ──► Ready ──► WaitEvent ◄──► Apply
//!                        │
//!                        ▼
//!                    Terminated
//! ```
//!
//! - **Init**: enumerate joysticks, fail if none are connected
//! - **Ready**: query and print the controller limits, write a zero command
//! - **WaitEvent**: block for the next joystick event
//! - **Apply**: map the axis onto the command vector and write it
//! - **Terminated**: trigger pressed (or loop cancelled), report and release
//!
//! The command vector is owned by the machine and survives every transition;
//! each axis event rewrites exactly one channel of it. Writes happen in event
//! arrival order, one per axis event.

use chrono::{DateTime, Local};
use statum::{machine, state};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::controller::{AxisEvent, DeviceInfo, EventSource, JoystickEvent};
use crate::error::TeleopError;
use crate::link::{ActuatorLink, LinkError};
use crate::mapping::{map_axis, CommandVector, HardwareLimits};

/// Button index that ends the session
pub const TRIGGER_BUTTON: u8 = 0;

/// Axis legend printed at startup
pub const CONTROLS_LEGEND: &str = "X: equilibrium, Y: stiffness, Throttle: damping";

const STATS_INTERVAL_SECS: i64 = 10;

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Trigger button pressed
    Trigger,
    /// Cancellation token fired between events
    Cancelled,
}

/// Totals reported when the loop ends
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSummary {
    pub events: u64,
    pub writes: u64,
    pub ignored: u64,
    pub final_command: CommandVector,
    pub reason: Termination,
}

#[derive(Debug, Clone)]
struct LoopStats {
    events: u64,
    writes: u64,
    ignored: u64,
    window_events: u64,
    window_writes: u64,
    window_start: DateTime<Local>,
}

impl LoopStats {
    fn new() -> Self {
        Self {
            events: 0,
            writes: 0,
            ignored: 0,
            window_events: 0,
            window_writes: 0,
            window_start: Local::now(),
        }
    }

    fn record_event(&mut self) {
        self.events += 1;
        self.window_events += 1;
    }

    fn record_write(&mut self) {
        self.writes += 1;
        self.window_writes += 1;
    }

    // Log throughput once per interval, checked after each write
    fn maybe_report(&mut self) {
        let now = Local::now();
        let elapsed = now - self.window_start;
        if elapsed > chrono::Duration::seconds(STATS_INTERVAL_SECS) {
            let seconds = elapsed.num_milliseconds() as f64 / 1000.0;
            info!(
                "Control loop stats: {} events, {} writes in last {:.1} seconds (avg {:.2} writes/sec)",
                self.window_events,
                self.window_writes,
                seconds,
                self.window_writes as f64 / seconds
            );
            self.window_events = 0;
            self.window_writes = 0;
            self.window_start = now;
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum LoopState {
    Init,
    Ready,
    WaitEvent,
    Apply(AxisEvent),
    Terminated(Termination),
}

#[machine]
#[derive(Debug)]
pub struct ControlLoop<S: LoopState> {
    // Actuator controller connection
    link: Box<dyn ActuatorLink>,

    // Joystick event source
    source: Box<dyn EventSource>,

    // Checked between events
    cancel: CancellationToken,

    // Last commanded actuator state
    command: CommandVector,

    // Filled in once the controller has reported them
    limits: Option<HardwareLimits>,

    stats: LoopStats,
}

/// Outcome of waiting for one event
pub enum Step {
    /// Axis event to apply
    Dispatch(ControlLoop<Apply>),
    /// Event ignored, keep waiting
    Idle(ControlLoop<WaitEvent>),
    /// Loop is done
    Quit(ControlLoop<Terminated>),
}

// Implementation of methods available in all states
impl<S: LoopState> ControlLoop<S> {
    /// Current command vector
    pub fn command(&self) -> CommandVector {
        self.command
    }

    pub fn limits(&self) -> Option<HardwareLimits> {
        self.limits
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

// Implementation for Init state
impl ControlLoop<Init> {
    pub fn create(
        link: Box<dyn ActuatorLink>,
        source: Box<dyn EventSource>,
        cancel: CancellationToken,
    ) -> Self {
        debug!("Creating control loop with link {:?}", link);
        Self::new(
            link,
            source,
            cancel,
            CommandVector::ZERO,
            None,
            LoopStats::new(),
        )
    }

    // Enumerate joysticks and transition to Ready state
    pub fn initialize(mut self) -> Result<ControlLoop<Ready>, TeleopError> {
        let devices = self.source.enumerate()?;
        if devices.is_empty() {
            error!("No joystick connected, refusing to start");
            return Err(TeleopError::NoDevice);
        }

        for line in device_report(&devices) {
            println!("{}", line);
        }

        info!(
            "Control loop initialized with {} joystick(s), transitioning to Ready state",
            devices.len()
        );
        Ok(self.transition())
    }
}

// Implementation for Ready state
impl ControlLoop<Ready> {
    // Query limits, zero the actuator and transition to WaitEvent state
    pub fn start(mut self) -> Result<ControlLoop<WaitEvent>, TeleopError> {
        println!("Reading robot command limits.");
        let limits = self.link.query_limits()?;
        for line in limits_report(&limits) {
            println!("{}", line);
        }
        println!("Press trigger (button {}) to quit.", TRIGGER_BUTTON);
        println!("{}", CONTROLS_LEGEND);

        self.limits = Some(limits);
        self.command = CommandVector::ZERO;
        self.link.write(&self.command)?;
        self.stats.record_write();

        info!("Actuator zeroed, waiting for joystick events");
        Ok(self.transition())
    }
}

// Implementation for WaitEvent state
impl ControlLoop<WaitEvent> {
    /// Block for one event and decide where to go next
    pub fn next(mut self) -> Result<Step, TeleopError> {
        if self.cancel.is_cancelled() {
            info!("Control loop cancelled");
            return Ok(Step::Quit(self.transition_with(Termination::Cancelled)));
        }

        let event = self.source.next_event()?;
        self.stats.record_event();

        match event {
            JoystickEvent::Axis(axis) => {
                debug!(
                    "Axis {} = {:.4} from joystick {}",
                    axis.axis, axis.value, axis.device
                );
                Ok(Step::Dispatch(self.transition_with(axis)))
            }
            JoystickEvent::Button(button) if button.button == TRIGGER_BUTTON => {
                info!(
                    "Trigger pressed on joystick {} at {}",
                    button.device,
                    button.timestamp.format("%H:%M:%S.%3f")
                );
                println!("Exiting...");
                Ok(Step::Quit(self.transition_with(Termination::Trigger)))
            }
            JoystickEvent::Button(button) => {
                debug!(
                    "Ignoring button {} from joystick {}",
                    button.button, button.device
                );
                self.stats.ignored += 1;
                Ok(Step::Idle(self))
            }
        }
    }

    /// Run until the trigger is pressed or the loop is cancelled
    pub fn run(self) -> Result<LoopSummary, TeleopError> {
        info!("Entering control loop");
        let mut waiting = self;
        loop {
            waiting = match waiting.next()? {
                Step::Dispatch(applying) => applying.apply()?,
                Step::Idle(waiting) => waiting,
                Step::Quit(done) => return Ok(done.finish()),
            };
        }
    }
}

// Implementation for Apply state
impl ControlLoop<Apply> {
    // Map the pending axis event, write the command and go back to waiting
    pub fn apply(mut self) -> Result<ControlLoop<WaitEvent>, TeleopError> {
        let Some(event) = self.get_state_data().cloned() else {
            warn!("Apply state entered without an axis event");
            return Ok(self.transition());
        };
        let Some(limits) = self.limits else {
            error!("Axis event arrived before the controller limits were known");
            return Err(LinkError::LimitsNotQueried.into());
        };

        self.command = map_axis(self.command, &event, &limits);
        self.link.write(&self.command)?;
        self.stats.record_write();
        debug!("Commanded {}", self.command);

        self.stats.maybe_report();
        Ok(self.transition())
    }
}

// Implementation for Terminated state
impl ControlLoop<Terminated> {
    pub fn reason(&self) -> Termination {
        self.get_state_data()
            .copied()
            .unwrap_or(Termination::Trigger)
    }

    /// Release the link and the event source and summarize the session
    pub fn finish(self) -> LoopSummary {
        let summary = LoopSummary {
            events: self.stats.events,
            writes: self.stats.writes,
            ignored: self.stats.ignored,
            final_command: self.command,
            reason: self.reason(),
        };
        info!(
            "Control loop terminated ({:?}): {} events, {} writes, {} ignored, final command {}",
            summary.reason, summary.events, summary.writes, summary.ignored, summary.final_command
        );
        summary
    }
}

/// Startup lines describing the connected joysticks
pub fn device_report(devices: &[DeviceInfo]) -> Vec<String> {
    let mut lines = vec![format!("{} joystick(s) detected.", devices.len())];
    lines.extend(
        devices
            .iter()
            .enumerate()
            .map(|(idx, device)| format!("Joystick {}: {}", idx, device.name)),
    );
    lines
}

/// Startup lines with the controller limits, two decimals per channel
pub fn limits_report(limits: &HardwareLimits) -> [String; 2] {
    let upper = limits.upper();
    let lower = limits.lower();
    [
        format!(
            "Max u [equ stif damp]: [ {:.2}, {:.2}, {:.2}]",
            upper[0], upper[1], upper[2]
        ),
        format!(
            "Min u [equ stif damp]: [{:.2}, {:.2}, {:.2}]",
            lower[0], lower[1], lower[2]
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ButtonEvent, SourceError};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;

    #[derive(Debug)]
    struct RecordingLink {
        limits: Option<HardwareLimits>,
        writes: Rc<RefCell<Vec<CommandVector>>>,
        fail_after: Option<usize>,
    }

    impl ActuatorLink for RecordingLink {
        fn query_limits(&mut self) -> Result<HardwareLimits, LinkError> {
            self.limits.ok_or(LinkError::Timeout { waited_ms: 500 })
        }

        fn write(&mut self, command: &CommandVector) -> Result<(), LinkError> {
            let mut writes = self.writes.borrow_mut();
            if self.fail_after.is_some_and(|max| writes.len() >= max) {
                return Err(LinkError::WriteFailed {
                    attempts: 4,
                    source: io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"),
                });
            }
            writes.push(*command);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct ScriptedSource {
        devices: Vec<DeviceInfo>,
        events: Rc<RefCell<VecDeque<JoystickEvent>>>,
    }

    impl EventSource for ScriptedSource {
        fn enumerate(&mut self) -> Result<Vec<DeviceInfo>, SourceError> {
            Ok(self.devices.clone())
        }

        fn next_event(&mut self) -> Result<JoystickEvent, SourceError> {
            self.events
                .borrow_mut()
                .pop_front()
                .ok_or(SourceError::BackendClosed)
        }
    }

    struct Bench {
        writes: Rc<RefCell<Vec<CommandVector>>>,
        pending: Rc<RefCell<VecDeque<JoystickEvent>>>,
        machine: ControlLoop<Init>,
    }

    fn bench_limits() -> HardwareLimits {
        HardwareLimits::new([1.57, 3.14, 1.0], [-1.57, 0.0, 0.0]).unwrap()
    }

    fn stick() -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            id: 0,
            name: "Logitech Extreme 3D".to_string(),
        }]
    }

    fn bench_with(
        devices: Vec<DeviceInfo>,
        limits: Option<HardwareLimits>,
        fail_after: Option<usize>,
        events: Vec<JoystickEvent>,
    ) -> Bench {
        let writes = Rc::new(RefCell::new(Vec::new()));
        let pending = Rc::new(RefCell::new(VecDeque::from(events)));
        let link = RecordingLink {
            limits,
            writes: writes.clone(),
            fail_after,
        };
        let source = ScriptedSource {
            devices,
            events: pending.clone(),
        };
        let machine =
            ControlLoop::create(Box::new(link), Box::new(source), CancellationToken::new());
        Bench {
            writes,
            pending,
            machine,
        }
    }

    fn bench(events: Vec<JoystickEvent>) -> Bench {
        bench_with(stick(), Some(bench_limits()), None, events)
    }

    fn axis(axis: u8, value: f64) -> JoystickEvent {
        JoystickEvent::Axis(AxisEvent::new(0, axis, value))
    }

    fn button(index: u8) -> JoystickEvent {
        JoystickEvent::Button(ButtonEvent::new(0, index))
    }

    fn waiting(bench: Bench) -> (ControlLoop<WaitEvent>, Rc<RefCell<Vec<CommandVector>>>) {
        let machine = bench.machine.initialize().unwrap().start().unwrap();
        (machine, bench.writes)
    }

    #[test]
    fn startup_writes_zero_command_once() {
        let (machine, writes) = waiting(bench(vec![]));
        assert_eq!(*writes.borrow(), vec![CommandVector::ZERO]);
        assert_eq!(machine.command(), CommandVector::ZERO);
        assert_eq!(machine.limits(), Some(bench_limits()));
    }

    #[test]
    fn full_right_stick_clamps_to_equilibrium_limit() {
        let bench = bench(vec![axis(0, 1.0), button(0)]);
        let writes = bench.writes.clone();
        let summary = bench.machine.initialize().unwrap().start().unwrap().run().unwrap();

        assert_eq!(
            *writes.borrow(),
            vec![CommandVector::ZERO, CommandVector::new(-1.57, 0.0, 0.0)]
        );
        assert_eq!(summary.final_command, CommandVector::new(-1.57, 0.0, 0.0));
        assert_eq!(summary.reason, Termination::Trigger);
    }

    #[test]
    fn two_axis_events_then_trigger_write_twice() {
        let bench = bench(vec![axis(1, 1.0), axis(2, 0.0), button(0), axis(0, 0.5)]);
        let writes = bench.writes.clone();
        let pending = bench.pending.clone();
        let summary = bench.machine.initialize().unwrap().start().unwrap().run().unwrap();

        let writes = writes.borrow();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[1], CommandVector::new(0.0, 3.14, 0.0));
        assert_eq!(writes[2], CommandVector::new(0.0, 3.14, 0.5));
        assert_eq!(summary.events, 3);
        assert_eq!(summary.writes, 3);
        // Nothing after the trigger is consumed
        assert_eq!(pending.borrow().len(), 1);
    }

    #[test]
    fn other_buttons_are_ignored() {
        let (machine, writes) = waiting(bench(vec![axis(2, 1.0), button(3)]));
        let Step::Dispatch(applying) = machine.next().unwrap() else {
            panic!("expected axis event to dispatch");
        };
        let machine = applying.apply().unwrap();
        let before = machine.command();

        let Step::Idle(machine) = machine.next().unwrap() else {
            panic!("expected button 3 to be ignored");
        };
        assert_eq!(machine.command(), before);
        assert_eq!(writes.borrow().len(), 2);
    }

    #[test]
    fn trigger_quits_whatever_the_command() {
        let (machine, writes) = waiting(bench(vec![
            axis(0, -0.3),
            axis(1, 0.8),
            axis(2, 0.2),
            button(0),
        ]));
        let mut machine = machine;
        let done = loop {
            machine = match machine.next().unwrap() {
                Step::Dispatch(applying) => applying.apply().unwrap(),
                Step::Idle(waiting) => waiting,
                Step::Quit(done) => break done,
            };
        };
        assert_eq!(done.reason(), Termination::Trigger);
        assert_ne!(done.command(), CommandVector::ZERO);
        assert_eq!(writes.borrow().len(), 4);
    }

    #[test]
    fn unknown_axis_rewrites_unchanged_command() {
        let (machine, writes) = waiting(bench(vec![axis(0, -1.0), axis(3, 0.9)]));
        let Step::Dispatch(applying) = machine.next().unwrap() else {
            panic!("expected dispatch");
        };
        let machine = applying.apply().unwrap();
        let before = machine.command();

        let Step::Dispatch(applying) = machine.next().unwrap() else {
            panic!("expected dispatch");
        };
        let machine = applying.apply().unwrap();

        assert_eq!(machine.command(), before);
        let writes = writes.borrow();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[2], writes[1]);
    }

    #[test]
    fn no_joystick_fails_before_touching_the_link() {
        let bench = bench_with(Vec::new(), Some(bench_limits()), None, vec![]);
        let writes = bench.writes.clone();
        let err = bench.machine.initialize().unwrap_err();
        assert!(matches!(err, TeleopError::NoDevice));
        assert!(writes.borrow().is_empty());
    }

    #[test]
    fn unanswered_limits_query_is_fatal() {
        let bench = bench_with(stick(), None, None, vec![axis(0, 1.0)]);
        let writes = bench.writes.clone();
        let err = bench.machine.initialize().unwrap().start().unwrap_err();
        assert!(matches!(
            err,
            TeleopError::Link(LinkError::Timeout { .. })
        ));
        assert!(writes.borrow().is_empty());
    }

    #[test]
    fn failed_write_ends_the_loop() {
        let bench = bench_with(
            stick(),
            Some(bench_limits()),
            Some(2),
            vec![axis(0, 0.1), axis(0, 0.2), button(0)],
        );
        let writes = bench.writes.clone();
        let err = bench
            .machine
            .initialize()
            .unwrap()
            .start()
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(
            err,
            TeleopError::Link(LinkError::WriteFailed { .. })
        ));
        assert_eq!(writes.borrow().len(), 2);
    }

    #[test]
    fn closed_source_is_an_input_error() {
        let (machine, _) = waiting(bench(vec![axis(0, 0.5)]));
        let err = machine.run().unwrap_err();
        assert!(matches!(
            err,
            TeleopError::Input(SourceError::BackendClosed)
        ));
    }

    #[test]
    fn cancellation_stops_between_events() {
        let bench = bench(vec![axis(0, 0.5), axis(1, 0.5)]);
        let pending = bench.pending.clone();
        let (machine, writes) = waiting(bench);
        let token = machine.cancellation_token();

        let Step::Dispatch(applying) = machine.next().unwrap() else {
            panic!("expected dispatch");
        };
        let machine = applying.apply().unwrap();
        token.cancel();

        let summary = machine.run().unwrap();
        assert_eq!(summary.reason, Termination::Cancelled);
        assert_eq!(writes.borrow().len(), 2);
        assert_eq!(pending.borrow().len(), 1);
    }

    #[test]
    fn limits_report_uses_two_decimals() {
        let [max, min] = limits_report(&bench_limits());
        assert_eq!(max, "Max u [equ stif damp]: [ 1.57, 3.14, 1.00]");
        assert_eq!(min, "Min u [equ stif damp]: [-1.57, 0.00, 0.00]");
    }

    #[test]
    fn device_report_lists_every_joystick() {
        let devices = vec![
            DeviceInfo {
                id: 3,
                name: "Extreme 3D".to_string(),
            },
            DeviceInfo {
                id: 7,
                name: "Gamepad".to_string(),
            },
        ];
        assert_eq!(
            device_report(&devices),
            vec![
                "2 joystick(s) detected.".to_string(),
                "Joystick 0: Extreme 3D".to_string(),
                "Joystick 1: Gamepad".to_string(),
            ]
        );
    }
}
