//! Transport Boundary
//!
//! The link to a bCore device. Operations are fire-and-forget: a call only
//! queues the request, and results (link changes, read responses) arrive
//! later as [`TransportEvent`](crate::domain::models::TransportEvent)s on the
//! channel the transport was built with.

use crate::domain::output_frame::BURST_LEN;
use crate::infrastructure::session::protocol::WireCommand;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no device connected")]
    NotConnected,
    #[error("connect to {address} failed: {reason}")]
    ConnectFailed { address: String, reason: String },
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("read failed: {0}")]
    ReadFailed(String),
}

pub trait Transport {
    /// Start connecting to `address`. Idempotent.
    fn connect(&mut self, address: &str) -> Result<(), TransportError>;

    /// Drop the link, if any. Idempotent.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Issue a single command
    fn execute(&mut self, command: WireCommand) -> Result<(), TransportError>;

    fn write_burst(&mut self, payload: [u8; BURST_LEN]) -> Result<(), TransportError> {
        self.execute(WireCommand::WriteBurst(payload))
    }

    fn write_servo(&mut self, index: u8, value: u8) -> Result<(), TransportError> {
        self.execute(WireCommand::WriteServo { index, value })
    }

    fn write_motor(&mut self, channel: u8, value: u8) -> Result<(), TransportError> {
        self.execute(WireCommand::WriteMotor { channel, value })
    }

    fn write_port_out(&mut self, bits: u8) -> Result<(), TransportError> {
        self.execute(WireCommand::WritePortOut(bits))
    }

    fn read_battery(&mut self) -> Result<(), TransportError> {
        self.execute(WireCommand::ReadBattery)
    }

    fn read_functions(&mut self) -> Result<(), TransportError> {
        self.execute(WireCommand::ReadFunctions)
    }
}

