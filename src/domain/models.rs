use crate::domain::output_frame::{PORT_OUT_COUNT, SERVO_COUNT};

/// Capability set reported by the device after function discovery.
///
/// Read once per connection and never changed afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionInfo {
    /// Bit `i` set when servo `i` is present
    pub servo_bits: u8,
    /// Bit `i` set when port-out `i` is present
    pub port_out_bits: u8,
    /// Device accepts the whole frame as one burst write
    pub burst: bool,
}

impl FunctionInfo {
    pub fn new(servo_bits: u8, port_out_bits: u8, burst: bool) -> Self {
        Self {
            servo_bits,
            port_out_bits,
            burst,
        }
    }

    pub fn is_servo_enabled(&self, index: usize) -> bool {
        index < SERVO_COUNT && self.servo_bits & (1 << index) != 0
    }

    pub fn is_port_out_enabled(&self, index: usize) -> bool {
        index < PORT_OUT_COUNT && self.port_out_bits & (1 << index) != 0
    }

    /// Whether either auxiliary steering servo is present
    pub fn has_sub_servo(&self) -> bool {
        self.is_servo_enabled(1) || self.is_servo_enabled(2)
    }

    pub fn is_burst_enabled(&self) -> bool {
        self.burst
    }
}

/// Link state reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

/// Asynchronous notification from the transport.
///
/// Every event names the device address it belongs to so that events from a
/// previous connection can be discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ConnectionChanged { address: String, state: LinkState },
    ServiceDiscovered { address: String },
    BatteryRead { address: String, millivolts: u16 },
    FunctionsRead { address: String, functions: FunctionInfo },
}

impl TransportEvent {
    pub fn address(&self) -> &str {
        match self {
            Self::ConnectionChanged { address, .. }
            | Self::ServiceDiscovered { address }
            | Self::BatteryRead { address, .. }
            | Self::FunctionsRead { address, .. } => address,
        }
    }
}

/// Session state of the command scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    AwaitingServices,
    AwaitingFunctions,
    Active { burst: bool },
}

impl ConnectionState {
    /// A device link exists (setters are accepted)
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            Self::AwaitingServices | Self::AwaitingFunctions | Self::Active { .. }
        )
    }
}

/// Notifications delivered to the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    Connected,
    Disconnected,
    Initialized {
        functions: FunctionInfo,
        burst_enabled: bool,
    },
    BatteryVoltage(u16),
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Success,
    Warning,
    Error,
}

/// Battery readout as shown on the controller screen
pub fn format_battery(millivolts: u16) -> String {
    format!("POW:{:.2}[V]", f32::from(millivolts) / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_info_queries() {
        let functions = FunctionInfo::new(0b0101, 0b1000, true);
        assert!(functions.is_servo_enabled(0));
        assert!(!functions.is_servo_enabled(1));
        assert!(functions.is_servo_enabled(2));
        assert!(!functions.is_servo_enabled(8));
        assert!(functions.has_sub_servo());
        assert!(functions.is_port_out_enabled(3));
        assert!(!functions.is_port_out_enabled(0));
        assert!(functions.is_burst_enabled());

        assert!(!FunctionInfo::new(0b0001, 0, false).has_sub_servo());
    }

    #[test]
    fn test_battery_format() {
        assert_eq!(format_battery(3712), "POW:3.71[V]");
        assert_eq!(format_battery(0), "POW:0.00[V]");
    }

    #[test]
    fn test_connected_states() {
        assert!(!ConnectionState::Idle.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(ConnectionState::AwaitingServices.is_connected());
        assert!(ConnectionState::Active { burst: false }.is_connected());
    }
}
