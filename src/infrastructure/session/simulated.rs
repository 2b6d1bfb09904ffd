//! Simulated bCore Link
//!
//! An in-process transport that answers like a real device: connecting
//! reports the link and its services, reads are answered with events, and
//! every command is recorded. Used by the headless binary and by tests.

use crate::domain::models::{FunctionInfo, LinkState, TransportEvent};
use crate::domain::profile::DeviceIdentity;
use crate::infrastructure::session::protocol::WireCommand;
use crate::infrastructure::session::transport::{Transport, TransportError};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// A device the simulated link can reach
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    pub identity: DeviceIdentity,
    pub functions: FunctionInfo,
    pub battery_millivolts: u16,
}

impl SimulatedDevice {
    pub fn new(identity: DeviceIdentity, functions: FunctionInfo) -> Self {
        Self {
            identity,
            functions,
            battery_millivolts: 3700,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    devices: Vec<SimulatedDevice>,
    connected: Option<String>,
    commands: Vec<WireCommand>,
    fail_commands: bool,
}

/// Transport half, owned by the scheduler
pub struct SimulatedTransport {
    shared: Arc<Mutex<SimState>>,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
}

/// Test and demo half: inspect traffic and inject faults
#[derive(Clone)]
pub struct SimulatedLink {
    shared: Arc<Mutex<SimState>>,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
}

fn lock(shared: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimulatedTransport {
    pub fn new(
        devices: Vec<SimulatedDevice>,
        event_sender: mpsc::UnboundedSender<TransportEvent>,
    ) -> (Self, SimulatedLink) {
        let shared = Arc::new(Mutex::new(SimState {
            devices,
            ..Default::default()
        }));
        let link = SimulatedLink {
            shared: shared.clone(),
            event_sender: event_sender.clone(),
        };
        (
            Self {
                shared,
                event_sender,
            },
            link,
        )
    }

    fn send(&self, event: TransportEvent) {
        let _ = self.event_sender.send(event);
    }
}

impl Transport for SimulatedTransport {
    fn connect(&mut self, address: &str) -> Result<(), TransportError> {
        let mut state = lock(&self.shared);
        if state.connected.as_deref() == Some(address) {
            return Ok(());
        }
        if !state.devices.iter().any(|d| d.identity.address == address) {
            return Err(TransportError::ConnectFailed {
                address: address.to_string(),
                reason: "device not in range".to_string(),
            });
        }

        state.connected = Some(address.to_string());
        drop(state);

        info!("Simulated link up: {}", address);
        self.send(TransportEvent::ConnectionChanged {
            address: address.to_string(),
            state: LinkState::Connected,
        });
        self.send(TransportEvent::ServiceDiscovered {
            address: address.to_string(),
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        let Some(address) = lock(&self.shared).connected.take() else {
            return;
        };

        info!("Simulated link down: {}", address);
        self.send(TransportEvent::ConnectionChanged {
            address,
            state: LinkState::Disconnected,
        });
    }

    fn is_connected(&self) -> bool {
        lock(&self.shared).connected.is_some()
    }

    fn execute(&mut self, command: WireCommand) -> Result<(), TransportError> {
        let mut state = lock(&self.shared);
        let Some(address) = state.connected.clone() else {
            return Err(TransportError::NotConnected);
        };
        if state.fail_commands {
            return Err(if command.is_read() {
                TransportError::ReadFailed(command.to_string())
            } else {
                TransportError::WriteFailed(command.to_string())
            });
        }

        trace!("-> {}", command);
        state.commands.push(command);

        let device = state
            .devices
            .iter()
            .find(|d| d.identity.address == address)
            .cloned();
        drop(state);

        let Some(device) = device else {
            return Ok(());
        };
        match command {
            WireCommand::ReadBattery => self.send(TransportEvent::BatteryRead {
                address,
                millivolts: device.battery_millivolts,
            }),
            WireCommand::ReadFunctions => self.send(TransportEvent::FunctionsRead {
                address,
                functions: device.functions,
            }),
            _ => {}
        }
        Ok(())
    }
}

impl SimulatedLink {
    /// Every command issued so far
    pub fn commands(&self) -> Vec<WireCommand> {
        lock(&self.shared).commands.clone()
    }

    /// Drain the command log
    pub fn take_commands(&self) -> Vec<WireCommand> {
        std::mem::take(&mut lock(&self.shared).commands)
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared).connected.is_some()
    }

    /// Make every following command fail at the transport level
    pub fn set_fail_commands(&self, fail: bool) {
        lock(&self.shared).fail_commands = fail;
    }

    pub fn set_battery(&self, address: &str, millivolts: u16) {
        let mut state = lock(&self.shared);
        if let Some(device) = state
            .devices
            .iter_mut()
            .find(|d| d.identity.address == address)
        {
            device.battery_millivolts = millivolts;
        }
    }

    /// Drop the link as if the device went out of range
    pub fn drop_link(&self) {
        let Some(address) = lock(&self.shared).connected.take() else {
            return;
        };

        debug!("Simulated link lost: {}", address);
        let _ = self.event_sender.send(TransportEvent::ConnectionChanged {
            address,
            state: LinkState::Disconnected,
        });
    }

    /// Inject an arbitrary event, e.g. a late one from an old connection
    pub fn inject(&self, event: TransportEvent) {
        let _ = self.event_sender.send(event);
    }
}
