//! bCore Command Vocabulary
//!
//! The discrete operations the scheduler issues against a device. Byte-level
//! GATT encoding belongs to the transport; this module only fixes what is
//! sent and in which order.

use crate::domain::output_frame::BURST_LEN;
use std::fmt;
use std::time::Duration;

/// Period of the command tick
pub const TICK_INTERVAL_MS: u64 = 50;

/// Number of tick slots in one command cycle
pub const CYCLE_LEN: u8 = 10;

/// In burst mode every `BURST_READ_PERIOD`-th slot reads telemetry
pub const BURST_READ_PERIOD: u8 = 5;

pub fn tick_interval() -> Duration {
    Duration::from_millis(TICK_INTERVAL_MS)
}

/// One write or read issued to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireCommand {
    WriteBurst([u8; BURST_LEN]),
    WriteServo { index: u8, value: u8 },
    WriteMotor { channel: u8, value: u8 },
    WritePortOut(u8),
    ReadBattery,
    ReadFunctions,
}

impl WireCommand {
    pub fn is_read(&self) -> bool {
        matches!(self, Self::ReadBattery | Self::ReadFunctions)
    }
}

impl fmt::Display for WireCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteBurst(bytes) => write!(f, "burst {:02X?}", bytes),
            Self::WriteServo { index, value } => write!(f, "servo[{}] = {:#04X}", index, value),
            Self::WriteMotor { channel, value } => write!(f, "motor[{}] = {:#04X}", channel, value),
            Self::WritePortOut(bits) => write!(f, "port out = {:#06b}", bits),
            Self::ReadBattery => write!(f, "read battery"),
            Self::ReadFunctions => write!(f, "read functions"),
        }
    }
}
