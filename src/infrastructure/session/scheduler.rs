//! Command Scheduler
//!
//! Owns one device session: the connect / initialize state machine, the
//! output frame, and the fixed ten-slot tick cycle that pushes the frame to
//! the device and polls battery voltage.
//!
//! ## Tick cycle
//!
//! ```text
//! burst:     R W W W W R W W W W      (R = battery read, W = whole frame)
//! non-burst: S0 S1 S2 M P S0 S1 S2 M R
//! ```
//!
//! The scheduler never fails outward. Transport errors take the same path as
//! an unexpected disconnect.

use crate::domain::models::{
    ConnectionState, ControllerEvent, FunctionInfo, LinkState, MessageSeverity, StatusMessage,
    TransportEvent,
};
use crate::domain::output_frame::{OutputFrame, MOTOR_CHANNEL};
use crate::domain::profile::DeviceProfile;
use crate::infrastructure::session::protocol::{BURST_READ_PERIOD, CYCLE_LEN};
use crate::infrastructure::session::transport::{Transport, TransportError};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// What a single tick does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    WriteBurst,
    WriteServo(u8),
    WriteMotor,
    WritePortOut,
    ReadBattery,
}

/// Slot assignment for `counter` in `0..CYCLE_LEN`
pub fn tick_action(counter: u8, burst: bool) -> TickAction {
    if burst {
        return if counter % BURST_READ_PERIOD == 0 {
            TickAction::ReadBattery
        } else {
            TickAction::WriteBurst
        };
    }

    match counter {
        0 | 1 | 2 | 5 | 6 | 7 => TickAction::WriteServo(counter % 5),
        3 | 8 => TickAction::WriteMotor,
        4 => TickAction::WritePortOut,
        _ => TickAction::ReadBattery,
    }
}

pub struct CommandScheduler<T: Transport> {
    transport: T,
    event_sender: mpsc::UnboundedSender<ControllerEvent>,
    state: ConnectionState,
    target: Option<DeviceProfile>,
    frame: OutputFrame,
    functions: Option<FunctionInfo>,
    functions_requested: bool,
    /// Address whose link-down notice is still due from a teardown
    pending_disconnect: Option<String>,
    counter: u8,
    ticking: bool,
}

impl<T: Transport> CommandScheduler<T> {
    pub fn new(transport: T, event_sender: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self {
            transport,
            event_sender,
            state: ConnectionState::Idle,
            target: None,
            frame: OutputFrame::neutral(),
            functions: None,
            functions_requested: false,
            pending_disconnect: None,
            counter: 0,
            ticking: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Whether the periodic tick should be running
    pub fn is_ticking(&self) -> bool {
        self.ticking
    }

    pub fn tick_counter(&self) -> u8 {
        self.counter
    }

    pub fn frame(&self) -> &OutputFrame {
        &self.frame
    }

    pub fn functions(&self) -> Option<FunctionInfo> {
        self.functions
    }

    pub fn is_burst_enabled(&self) -> bool {
        matches!(self.state, ConnectionState::Active { burst: true })
    }

    /// Whether either auxiliary servo is available on the connected device
    pub fn is_sub_servo_enabled(&self) -> bool {
        self.functions.is_some_and(|f| f.has_sub_servo())
    }

    pub fn profile(&self) -> Option<&DeviceProfile> {
        self.target.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // ---- session lifecycle ----

    /// Start a session with the device described by `profile`.
    ///
    /// Any previous session is torn down first.
    pub fn connect(&mut self, profile: DeviceProfile) {
        if self.state != ConnectionState::Idle {
            self.teardown();
        }

        let address = profile.identity.address.clone();
        info!("Connecting to {} ({})", profile.display_name, address);

        self.target = Some(profile);
        self.frame.reset();
        self.functions = None;
        self.functions_requested = false;
        self.counter = 0;
        self.state = ConnectionState::Connecting;

        if let Err(e) = self.transport.connect(&address) {
            self.fail(e);
        }
    }

    /// End the current session. Idempotent.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Idle {
            return;
        }

        info!("Disconnecting");
        self.teardown();
        self.emit(ControllerEvent::Disconnected);
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if let TransportEvent::ConnectionChanged { address, state } = &event {
            if self.pending_disconnect.as_deref() == Some(address.as_str()) {
                // Anything queued for this address after the notice is the new link
                self.pending_disconnect = None;
                if *state == LinkState::Disconnected {
                    debug!("Dropping link-down notice from teardown of {}", address);
                    return;
                }
            }
        }

        let Some(target) = &self.target else {
            debug!("Ignoring {:?} with no session", event);
            return;
        };
        if event.address() != target.identity.address {
            debug!("Ignoring stale event {:?}", event);
            return;
        }

        match event {
            TransportEvent::ConnectionChanged {
                state: LinkState::Connected,
                ..
            } => {
                if self.state == ConnectionState::Connecting {
                    info!("Link established");
                    self.state = ConnectionState::AwaitingServices;
                    self.emit(ControllerEvent::Connected);
                }
            }
            TransportEvent::ConnectionChanged {
                state: LinkState::Disconnected,
                ..
            } => {
                if self.state != ConnectionState::Idle {
                    warn!("Link lost");
                    self.link_lost();
                }
            }
            TransportEvent::ServiceDiscovered { .. } => {
                if self.state == ConnectionState::AwaitingServices {
                    debug!("Services discovered, probing battery");
                    self.state = ConnectionState::AwaitingFunctions;
                    let result = self.transport.read_battery();
                    self.check(result);
                }
            }
            TransportEvent::BatteryRead { millivolts, .. } => {
                if !self.state.is_connected() {
                    return;
                }
                self.emit(ControllerEvent::BatteryVoltage(millivolts));

                if self.state == ConnectionState::AwaitingFunctions && !self.functions_requested {
                    debug!("Battery {} mV, reading functions", millivolts);
                    self.functions_requested = true;
                    let result = self.transport.read_functions();
                    self.check(result);
                }
            }
            TransportEvent::FunctionsRead { functions, .. } => {
                if self.state == ConnectionState::AwaitingFunctions {
                    self.initialize(functions);
                }
            }
        }
    }

    fn initialize(&mut self, functions: FunctionInfo) {
        let burst = functions.is_burst_enabled();
        info!(
            "Initialized: servos {:#06b}, ports {:#06b}, burst {}",
            functions.servo_bits, functions.port_out_bits, burst
        );

        self.frame.reset();
        self.functions = Some(functions);
        self.state = ConnectionState::Active { burst };
        self.counter = 0;
        self.ticking = true;

        self.emit(ControllerEvent::Initialized {
            functions,
            burst_enabled: burst,
        });
        if let Some(profile) = &self.target {
            let message = format!("{} ready", profile.display_name);
            self.status(MessageSeverity::Success, message);
        }
    }

    // ---- periodic tick ----

    /// Run one tick slot. A no-op unless a session is active.
    pub fn on_tick(&mut self) {
        let ConnectionState::Active { burst } = self.state else {
            return;
        };
        if !self.ticking || !self.transport.is_connected() {
            return;
        }

        let action = tick_action(self.counter, burst);
        trace!("Tick {}: {:?}", self.counter, action);
        let result = match action {
            TickAction::WriteBurst => self.transport.write_burst(self.frame.as_burst()),
            TickAction::WriteServo(index) => {
                let value = self.frame.servo(usize::from(index)).unwrap_or_default();
                self.transport.write_servo(index, value)
            }
            TickAction::WriteMotor => self
                .transport
                .write_motor(MOTOR_CHANNEL, self.frame.motor_pwm()),
            TickAction::WritePortOut => self.transport.write_port_out(self.frame.port_out_bits()),
            TickAction::ReadBattery => self.transport.read_battery(),
        };

        self.counter = (self.counter + 1) % CYCLE_LEN;
        self.check(result);
    }

    // ---- setters ----

    pub fn set_motor_speed(&mut self, value: i32) {
        let Some(profile) = self.connected_profile() else {
            return;
        };
        let flip = profile.is_motor_flip;
        self.frame.set_motor(value, flip);
    }

    /// Fan a steering value out to all three steering servos.
    ///
    /// The auxiliary servos are mounted mirrored, so servos 1 and 2 use the
    /// opposite flip of the primary.
    pub fn set_steer_value(&mut self, value: i32) {
        let Some(profile) = self.connected_profile() else {
            return;
        };
        let offset = profile.steer_offset(value);
        let (flip, trim, sub_trim) = (
            profile.is_servo_flip,
            profile.servo_trim,
            profile.sub_servo_trim,
        );

        self.frame.set_servo(0, offset, trim, flip);
        self.frame.set_servo(1, offset, sub_trim, !flip);
        self.frame.set_servo(2, offset, sub_trim, !flip);
    }

    pub fn set_port_out(&mut self, index: usize, is_on: bool) {
        if !self.is_connected() {
            return;
        }
        self.frame.set_port(index, is_on);
    }

    /// Recenter the primary servo on its trim
    pub fn update_servo_trim(&mut self) {
        let Some(profile) = self.connected_profile() else {
            return;
        };
        let trim = profile.servo_trim;
        self.frame.set_servo(0, 0, trim, false);
    }

    /// Recenter both auxiliary servos on the sub-servo trim
    pub fn update_sub_servo_trim(&mut self) {
        let Some(profile) = self.connected_profile() else {
            return;
        };
        let trim = profile.sub_servo_trim;
        self.frame.set_servo(1, 0, trim, false);
        self.frame.set_servo(2, 0, trim, false);
    }

    /// Motor stopped, steering centered
    pub fn hold_neutral(&mut self) {
        self.set_motor_speed(0);
        self.set_steer_value(0);
    }

    /// Replace the live profile after it was edited.
    ///
    /// Ignored when it belongs to a different device than the session.
    pub fn update_profile(&mut self, profile: DeviceProfile) {
        match &mut self.target {
            Some(target) if target.identity.address == profile.identity.address => {
                debug!("Profile updated for {}", profile.identity.address);
                *target = profile;
            }
            _ => debug!("Ignoring profile for {}", profile.identity.address),
        }
    }

    // ---- internals ----

    fn connected_profile(&self) -> Option<&DeviceProfile> {
        if !self.state.is_connected() {
            return None;
        }
        self.target.as_ref()
    }

    /// Stop ticking, then release the link
    fn teardown(&mut self) {
        self.ticking = false;
        if self.transport.is_connected() {
            self.pending_disconnect = self.target.as_ref().map(|p| p.identity.address.clone());
        }
        self.transport.disconnect();
        self.state = ConnectionState::Idle;
        self.target = None;
        self.functions_requested = false;
    }

    fn link_lost(&mut self) {
        self.ticking = false;
        self.state = ConnectionState::Idle;
        self.target = None;
        self.functions_requested = false;
        self.status(MessageSeverity::Warning, "Connection lost".to_string());
        self.emit(ControllerEvent::Disconnected);
    }

    fn check(&mut self, result: Result<(), TransportError>) {
        if let Err(e) = result {
            self.fail(e);
        }
    }

    fn fail(&mut self, error: TransportError) {
        warn!("Transport error: {}", error);
        self.status(MessageSeverity::Error, error.to_string());
        self.teardown();
        self.emit(ControllerEvent::Disconnected);
    }

    fn status(&self, severity: MessageSeverity, message: String) {
        self.emit(ControllerEvent::LogMessage(StatusMessage { message, severity }));
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.event_sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::output_frame::{CENTER_SERVO_POS, MAX_SERVO_POS, STOP_MOTOR_PWM};
    use crate::domain::profile::DeviceIdentity;
    use crate::infrastructure::session::protocol::WireCommand;
    use crate::infrastructure::session::simulated::{
        SimulatedDevice, SimulatedLink, SimulatedTransport,
    };

    const ADDR: &str = "AA:00";
    const OTHER: &str = "BB:00";

    struct Harness {
        scheduler: CommandScheduler<SimulatedTransport>,
        link: SimulatedLink,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        events_rx: mpsc::UnboundedReceiver<ControllerEvent>,
    }

    impl Harness {
        fn new(burst: bool) -> Self {
            let devices = vec![
                SimulatedDevice::new(
                    DeviceIdentity::new("bCore-A", ADDR),
                    FunctionInfo::new(0b0111, 0b1111, burst),
                ),
                SimulatedDevice::new(
                    DeviceIdentity::new("bCore-B", OTHER),
                    FunctionInfo::new(0b0001, 0b0000, false),
                ),
            ];
            let (transport_tx, transport_rx) = mpsc::unbounded_channel();
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let (transport, link) = SimulatedTransport::new(devices, transport_tx);
            Self {
                scheduler: CommandScheduler::new(transport, events_tx),
                link,
                transport_rx,
                events_rx,
            }
        }

        /// Deliver queued transport events until the queue is empty
        fn pump(&mut self) {
            while let Ok(event) = self.transport_rx.try_recv() {
                self.scheduler.handle_transport_event(event);
            }
        }

        fn pump_one(&mut self) {
            if let Ok(event) = self.transport_rx.try_recv() {
                self.scheduler.handle_transport_event(event);
            }
        }

        fn events(&mut self) -> Vec<ControllerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events_rx.try_recv() {
                events.push(event);
            }
            events
        }

        fn connect(&mut self, address: &str) {
            self.scheduler.connect(profile(address));
        }

        fn connect_active(&mut self) {
            self.connect(ADDR);
            self.pump();
            assert!(matches!(self.scheduler.state(), ConnectionState::Active { .. }));
            self.link.take_commands();
            self.events();
        }

        fn ticks(&mut self, n: usize) {
            for _ in 0..n {
                self.scheduler.on_tick();
            }
        }
    }

    fn profile(address: &str) -> DeviceProfile {
        let mut profile = DeviceProfile::for_device(DeviceIdentity::new("bCore", address));
        profile.is_use_motion = false;
        profile
    }

    #[test]
    fn test_non_burst_slot_table() {
        let expected = [
            TickAction::WriteServo(0),
            TickAction::WriteServo(1),
            TickAction::WriteServo(2),
            TickAction::WriteMotor,
            TickAction::WritePortOut,
            TickAction::WriteServo(0),
            TickAction::WriteServo(1),
            TickAction::WriteServo(2),
            TickAction::WriteMotor,
            TickAction::ReadBattery,
        ];
        for (counter, action) in expected.iter().enumerate() {
            assert_eq!(tick_action(counter as u8, false), *action, "counter {counter}");
        }
    }

    #[test]
    fn test_burst_slot_table() {
        let reads: Vec<u8> = (0..CYCLE_LEN)
            .filter(|c| tick_action(*c, true) == TickAction::ReadBattery)
            .collect();
        assert_eq!(reads, vec![0, 5]);
    }

    #[test]
    fn test_initialization_sequence() {
        let mut h = Harness::new(false);
        h.connect(ADDR);
        assert_eq!(h.scheduler.state(), ConnectionState::Connecting);

        h.pump_one(); // connected
        assert_eq!(h.scheduler.state(), ConnectionState::AwaitingServices);
        assert_eq!(h.events(), vec![ControllerEvent::Connected]);

        h.pump_one(); // services discovered
        assert_eq!(h.scheduler.state(), ConnectionState::AwaitingFunctions);
        assert_eq!(h.link.commands(), vec![WireCommand::ReadBattery]);

        // Ticks before initialization do nothing
        h.ticks(3);
        assert_eq!(h.link.commands(), vec![WireCommand::ReadBattery]);
        assert!(!h.scheduler.is_ticking());

        h.pump_one(); // battery
        assert_eq!(h.events(), vec![ControllerEvent::BatteryVoltage(3700)]);
        assert_eq!(
            h.link.commands(),
            vec![WireCommand::ReadBattery, WireCommand::ReadFunctions]
        );

        h.pump_one(); // functions
        assert_eq!(h.scheduler.state(), ConnectionState::Active { burst: false });
        assert!(h.scheduler.is_ticking());
        assert!(h.scheduler.is_sub_servo_enabled());
        let events = h.events();
        assert_eq!(
            events.first(),
            Some(&ControllerEvent::Initialized {
                functions: FunctionInfo::new(0b0111, 0b1111, false),
                burst_enabled: false,
            })
        );
        assert!(matches!(
            events.last(),
            Some(ControllerEvent::LogMessage(StatusMessage {
                severity: MessageSeverity::Success,
                ..
            }))
        ));

        // No writes were issued during setup
        assert!(h.link.commands().iter().all(|c| c.is_read()));
    }

    #[test]
    fn test_functions_requested_once() {
        let mut h = Harness::new(false);
        h.connect(ADDR);
        h.pump_one();
        h.pump_one();

        // A second battery response before functions arrive
        h.link.inject(TransportEvent::BatteryRead {
            address: ADDR.into(),
            millivolts: 3600,
        });
        h.pump();

        let function_reads = h
            .link
            .commands()
            .into_iter()
            .filter(|c| *c == WireCommand::ReadFunctions)
            .count();
        assert_eq!(function_reads, 1);
    }

    #[test]
    fn test_non_burst_cycle_traffic() {
        let mut h = Harness::new(false);
        h.connect_active();

        h.ticks(10);
        let commands = h.link.take_commands();
        assert_eq!(commands.len(), 10);

        let servo_indices: Vec<u8> = commands
            .iter()
            .filter_map(|c| match c {
                WireCommand::WriteServo { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(servo_indices, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(
            commands[3],
            WireCommand::WriteMotor {
                channel: 1,
                value: STOP_MOTOR_PWM
            }
        );
        assert_eq!(commands[4], WireCommand::WritePortOut(0));
        assert_eq!(commands[8], commands[3]);
        assert_eq!(commands[9], WireCommand::ReadBattery);
        assert_eq!(h.scheduler.tick_counter(), 0);
    }

    #[test]
    fn test_counter_wraps_without_drift() {
        let mut h = Harness::new(false);
        h.connect_active();

        let mut seen = Vec::new();
        for _ in 0..25 {
            seen.push(h.scheduler.tick_counter());
            h.scheduler.on_tick();
        }
        let expected: Vec<u8> = (0..25).map(|i| (i % 10) as u8).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_burst_cycle_traffic() {
        let mut h = Harness::new(true);
        h.connect_active();
        assert!(h.scheduler.is_burst_enabled());

        h.scheduler.set_motor_speed(20);
        h.scheduler.set_port_out(1, true);
        h.ticks(10);

        let commands = h.link.take_commands();
        let reads = commands.iter().filter(|c| **c == WireCommand::ReadBattery).count();
        let bursts: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                WireCommand::WriteBurst(bytes) => Some(*bytes),
                _ => None,
            })
            .collect();
        assert_eq!(reads, 2);
        assert_eq!(bursts.len(), 8);
        assert_eq!(commands[0], WireCommand::ReadBattery);
        assert_eq!(commands[5], WireCommand::ReadBattery);
        assert_eq!(
            bursts[0],
            [STOP_MOTOR_PWM, STOP_MOTOR_PWM - 20, 0b10, 0x80, 0x80, 0x80, 0x80]
        );
    }

    #[test]
    fn test_battery_telemetry_reaches_ui() {
        let mut h = Harness::new(false);
        h.connect_active();

        h.link.set_battery(ADDR, 3950);
        h.ticks(10);
        h.pump();
        assert_eq!(h.events(), vec![ControllerEvent::BatteryVoltage(3950)]);
    }

    #[test]
    fn test_steering_fan_out() {
        let mut h = Harness::new(false);
        h.connect_active();

        h.scheduler.set_steer_value(50);
        let frame = h.scheduler.frame();
        assert_eq!(frame.servo(0), Some(CENTER_SERVO_POS + 50));
        // Both auxiliary servos are mirrored against the primary
        assert_eq!(frame.servo(1), Some(CENTER_SERVO_POS - 50));
        assert_eq!(frame.servo(2), Some(CENTER_SERVO_POS - 50));
        assert_eq!(frame.servo(3), Some(CENTER_SERVO_POS));
    }

    #[test]
    fn test_steering_with_profile_calibration() {
        let mut h = Harness::new(false);
        h.connect_active();

        let mut edited = profile(ADDR);
        edited.is_servo_flip = true;
        edited.servo_swing = 2.0;
        edited.servo_trim = 10;
        edited.sub_servo_trim = -4;
        h.scheduler.update_profile(edited);

        h.scheduler.set_steer_value(40);
        let frame = h.scheduler.frame();
        assert_eq!(frame.servo(0), Some(CENTER_SERVO_POS - 80 + 10));
        assert_eq!(frame.servo(1), Some(CENTER_SERVO_POS + 80 - 4));
        assert_eq!(frame.servo(2), Some(CENTER_SERVO_POS + 80 - 4));

        h.scheduler.set_steer_value(-100);
        assert_eq!(h.scheduler.frame().servo(0), Some(MAX_SERVO_POS));
    }

    #[test]
    fn test_trim_updates_cover_both_sub_servos() {
        let mut h = Harness::new(false);
        h.connect_active();

        let mut edited = profile(ADDR);
        edited.servo_trim = 7;
        edited.sub_servo_trim = -12;
        h.scheduler.update_profile(edited);

        h.scheduler.update_servo_trim();
        h.scheduler.update_sub_servo_trim();
        let frame = h.scheduler.frame();
        assert_eq!(frame.servo(0), Some(CENTER_SERVO_POS + 7));
        assert_eq!(frame.servo(1), Some(CENTER_SERVO_POS - 12));
        assert_eq!(frame.servo(2), Some(CENTER_SERVO_POS - 12));
    }

    #[test]
    fn test_profile_for_other_device_is_ignored() {
        let mut h = Harness::new(false);
        h.connect_active();

        let mut foreign = profile(OTHER);
        foreign.servo_trim = 25;
        h.scheduler.update_profile(foreign);
        assert_eq!(h.scheduler.profile().map(|p| p.servo_trim), Some(0));
    }

    #[test]
    fn test_setters_are_noops_when_idle() {
        let mut h = Harness::new(false);
        h.scheduler.set_motor_speed(80);
        h.scheduler.set_steer_value(80);
        h.scheduler.set_port_out(0, true);
        h.scheduler.update_servo_trim();
        assert_eq!(*h.scheduler.frame(), OutputFrame::neutral());

        h.ticks(10);
        assert!(h.link.commands().is_empty());
    }

    #[test]
    fn test_motor_flip() {
        let mut h = Harness::new(false);
        h.connect_active();

        h.scheduler.set_motor_speed(30);
        assert_eq!(h.scheduler.frame().motor_pwm(), STOP_MOTOR_PWM - 30);

        let mut edited = profile(ADDR);
        edited.is_motor_flip = true;
        h.scheduler.update_profile(edited);
        h.scheduler.set_motor_speed(30);
        assert_eq!(h.scheduler.frame().motor_pwm(), STOP_MOTOR_PWM + 30);

        h.scheduler.hold_neutral();
        assert_eq!(h.scheduler.frame().motor_pwm(), STOP_MOTOR_PWM);
    }

    #[test]
    fn test_disconnect_mid_cycle_stops_writes() {
        let mut h = Harness::new(false);
        h.connect_active();
        h.scheduler.set_steer_value(30);

        h.ticks(3);
        assert_eq!(h.scheduler.tick_counter(), 3);
        h.link.drop_link();
        h.pump();

        assert_eq!(h.scheduler.state(), ConnectionState::Idle);
        assert!(!h.scheduler.is_ticking());
        let events = h.events();
        assert!(matches!(
            events.first(),
            Some(ControllerEvent::LogMessage(StatusMessage {
                severity: MessageSeverity::Warning,
                ..
            }))
        ));
        assert_eq!(events.last(), Some(&ControllerEvent::Disconnected));

        h.link.take_commands();
        h.ticks(10);
        assert!(h.link.commands().is_empty());

        // Frame keeps its last state until the next connect
        assert_eq!(h.scheduler.frame().servo(0), Some(CENTER_SERVO_POS + 30));
        h.connect(ADDR);
        assert_eq!(*h.scheduler.frame(), OutputFrame::neutral());
        assert_eq!(h.scheduler.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_explicit_disconnect_is_idempotent() {
        let mut h = Harness::new(false);
        h.connect_active();

        h.scheduler.disconnect();
        h.scheduler.disconnect();
        assert_eq!(h.events(), vec![ControllerEvent::Disconnected]);
        assert!(!h.link.is_connected());

        // The transport's own disconnect notice is now stale
        h.pump();
        assert!(h.events().is_empty());
        assert_eq!(h.scheduler.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_stale_events_are_ignored() {
        let mut h = Harness::new(false);
        h.connect(ADDR);

        h.link.inject(TransportEvent::ServiceDiscovered {
            address: OTHER.into(),
        });
        h.link.inject(TransportEvent::ConnectionChanged {
            address: OTHER.into(),
            state: LinkState::Disconnected,
        });
        h.link.inject(TransportEvent::FunctionsRead {
            address: OTHER.into(),
            functions: FunctionInfo::new(0, 0, true),
        });
        h.pump();

        // Own events still drive the session to Active, non-burst
        assert_eq!(h.scheduler.state(), ConnectionState::Active { burst: false });
    }

    #[test]
    fn test_reconnect_ignores_old_device_events() {
        let mut h = Harness::new(false);
        h.connect_active();

        h.connect(OTHER);
        // Old link's disconnect notice and the new link's events are queued
        h.pump();

        assert_eq!(h.scheduler.state(), ConnectionState::Active { burst: false });
        assert_eq!(
            h.scheduler.profile().map(|p| p.identity.address.as_str()),
            Some(OTHER)
        );
        assert!(!h.events().contains(&ControllerEvent::Disconnected));
    }

    #[test]
    fn test_reconnect_to_same_device() {
        let mut h = Harness::new(false);
        h.connect_active();

        // Teardown's link-down notice for ADDR is queued ahead of the new link
        h.connect(ADDR);
        h.pump();

        assert_eq!(h.scheduler.state(), ConnectionState::Active { burst: false });
        assert!(h.scheduler.is_ticking());
        assert!(h.link.is_connected());
        let events = h.events();
        assert!(!events.contains(&ControllerEvent::Disconnected));
        assert_eq!(events.first(), Some(&ControllerEvent::Connected));

        // A later real link loss is still reported
        h.link.drop_link();
        h.pump();
        assert_eq!(h.scheduler.state(), ConnectionState::Idle);
        assert_eq!(h.events().last(), Some(&ControllerEvent::Disconnected));
    }

    #[test]
    fn test_reconnect_after_write_failure() {
        let mut h = Harness::new(false);
        h.connect_active();

        h.link.set_fail_commands(true);
        h.scheduler.on_tick();
        assert_eq!(h.scheduler.state(), ConnectionState::Idle);
        h.link.set_fail_commands(false);

        h.connect(ADDR);
        h.pump();
        assert_eq!(h.scheduler.state(), ConnectionState::Active { burst: false });
    }

    #[test]
    fn test_write_failure_reported_as_disconnect() {
        let mut h = Harness::new(false);
        h.connect_active();

        h.link.set_fail_commands(true);
        h.scheduler.on_tick();

        assert_eq!(h.scheduler.state(), ConnectionState::Idle);
        assert!(!h.scheduler.is_ticking());
        let events = h.events();
        assert!(matches!(
            events.first(),
            Some(ControllerEvent::LogMessage(StatusMessage {
                severity: MessageSeverity::Error,
                ..
            }))
        ));
        assert_eq!(events.last(), Some(&ControllerEvent::Disconnected));

        // Nothing is retried
        h.link.set_fail_commands(false);
        h.ticks(5);
        assert!(h.link.commands().is_empty());
    }

    #[test]
    fn test_connect_failure_returns_to_idle() {
        let mut h = Harness::new(false);
        h.connect("ZZ:99");

        assert_eq!(h.scheduler.state(), ConnectionState::Idle);
        assert_eq!(h.events().last(), Some(&ControllerEvent::Disconnected));
    }
}
