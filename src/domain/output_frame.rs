//! Output Frame
//!
//! The latest commanded state of a bCore device: motor PWM, port-out bits
//! and four servo positions. The byte order matches the burst command so the
//! frame can be written to the device as-is.

/// Neutral motor PWM (stopped)
pub const STOP_MOTOR_PWM: u8 = 0x80;
/// Centered servo position
pub const CENTER_SERVO_POS: u8 = 0x80;
/// Lowest servo position the device accepts
pub const MIN_SERVO_POS: u8 = 0x00;
/// Highest servo position the device accepts
pub const MAX_SERVO_POS: u8 = 0xFF;

/// Number of servo slots in a frame
pub const SERVO_COUNT: usize = 4;
/// Number of port outputs addressable through `port_out_bits`
pub const PORT_OUT_COUNT: usize = 4;

/// Length of the burst command payload
pub const BURST_LEN: usize = 7;

/// Burst payload index of motor channel 0 (held at [`STOP_MOTOR_PWM`])
pub const IDX_BURST_MOTOR_RESERVED: usize = 0;
/// Burst payload index of the commanded motor (channel 1)
pub const IDX_BURST_MOTOR: usize = 1;
/// Burst payload index of the port-out bits
pub const IDX_BURST_PORT_OUT: usize = 2;
/// Burst payload index of servo 0
pub const IDX_BURST_SERVO_START: usize = 3;

/// Motor channel driven by [`OutputFrame::set_motor`]
pub const MOTOR_CHANNEL: u8 = 1;

/// Commanded output state for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFrame {
    bytes: [u8; BURST_LEN],
}

impl Default for OutputFrame {
    fn default() -> Self {
        Self::neutral()
    }
}

impl OutputFrame {
    /// A frame with the motor stopped, servos centered and ports cleared
    pub fn neutral() -> Self {
        let mut bytes = [CENTER_SERVO_POS; BURST_LEN];
        bytes[IDX_BURST_MOTOR_RESERVED] = STOP_MOTOR_PWM;
        bytes[IDX_BURST_MOTOR] = STOP_MOTOR_PWM;
        bytes[IDX_BURST_PORT_OUT] = 0;
        Self { bytes }
    }

    /// Return every field to neutral
    pub fn reset(&mut self) {
        *self = Self::neutral();
    }

    /// Set the motor from a signed speed.
    ///
    /// The device's forward direction is negative PWM deviation unless
    /// `flip` is set. The result saturates at the byte range.
    pub fn set_motor(&mut self, value: i32, flip: bool) {
        let direction = if flip { 1 } else { -1 };
        let pwm = i32::from(STOP_MOTOR_PWM) + value * direction;
        self.bytes[IDX_BURST_MOTOR] = pwm.clamp(i32::from(u8::MIN), i32::from(u8::MAX)) as u8;
    }

    /// Set a servo to `center + offset + trim`, saturating at the servo limits.
    ///
    /// Indices outside the servo range are ignored.
    pub fn set_servo(&mut self, index: usize, offset: i32, trim: i32, flip: bool) {
        if index >= SERVO_COUNT {
            return;
        }

        let offset = if flip { -offset } else { offset };
        let raw = i32::from(CENTER_SERVO_POS) + offset + trim;
        let value = raw.clamp(i32::from(MIN_SERVO_POS), i32::from(MAX_SERVO_POS));

        self.bytes[IDX_BURST_SERVO_START + index] = value as u8;
    }

    /// Set or clear a single port-out bit
    pub fn set_port(&mut self, index: usize, is_on: bool) {
        if index >= PORT_OUT_COUNT {
            return;
        }

        let mask = 1u8 << index;
        if is_on {
            self.bytes[IDX_BURST_PORT_OUT] |= mask;
        } else {
            self.bytes[IDX_BURST_PORT_OUT] &= !mask;
        }
    }

    pub fn motor_pwm(&self) -> u8 {
        self.bytes[IDX_BURST_MOTOR]
    }

    pub fn port_out_bits(&self) -> u8 {
        self.bytes[IDX_BURST_PORT_OUT]
    }

    /// Servo position at `index`, or `None` when out of range
    pub fn servo(&self, index: usize) -> Option<u8> {
        (index < SERVO_COUNT).then(|| self.bytes[IDX_BURST_SERVO_START + index])
    }

    /// The frame in burst command byte order
    pub fn as_burst(&self) -> [u8; BURST_LEN] {
        self.bytes
    }
}
