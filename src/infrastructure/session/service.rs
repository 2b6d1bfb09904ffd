//! Controller Service
//!
//! Runs the command scheduler on a single task. UI commands, transport
//! events and the periodic tick are all handled by one `select!` loop, so
//! no setter ever races a tick reading the output frame.

use crate::domain::models::{ControllerEvent, TransportEvent};
use crate::domain::profile::DeviceProfile;
use crate::infrastructure::session::scheduler::CommandScheduler;
use crate::infrastructure::session::transport::Transport;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Requests from the presentation layer
#[derive(Debug, Clone)]
pub enum ControllerCommand {
    Connect(DeviceProfile),
    Disconnect,
    SetMotorSpeed(i32),
    SetSteer(i32),
    SetPortOut { index: usize, is_on: bool },
    UpdateServoTrim,
    UpdateSubServoTrim,
    UpdateProfile(DeviceProfile),
    HoldNeutral,
    Shutdown,
}

/// Cloneable front end of a running [`ControllerService`]
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    command_sender: mpsc::UnboundedSender<ControllerCommand>,
}

impl ControllerHandle {
    pub fn send(&self, command: ControllerCommand) -> Result<()> {
        self.command_sender
            .send(command)
            .map_err(|_| anyhow::anyhow!("Controller service has stopped"))
    }

    pub fn connect(&self, profile: DeviceProfile) -> Result<()> {
        self.send(ControllerCommand::Connect(profile))
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(ControllerCommand::Disconnect)
    }

    pub fn set_motor_speed(&self, value: i32) -> Result<()> {
        self.send(ControllerCommand::SetMotorSpeed(value))
    }

    pub fn set_steer(&self, value: i32) -> Result<()> {
        self.send(ControllerCommand::SetSteer(value))
    }

    pub fn set_port_out(&self, index: usize, is_on: bool) -> Result<()> {
        self.send(ControllerCommand::SetPortOut { index, is_on })
    }

    pub fn update_servo_trim(&self) -> Result<()> {
        self.send(ControllerCommand::UpdateServoTrim)
    }

    pub fn update_sub_servo_trim(&self) -> Result<()> {
        self.send(ControllerCommand::UpdateSubServoTrim)
    }

    pub fn update_profile(&self, profile: DeviceProfile) -> Result<()> {
        self.send(ControllerCommand::UpdateProfile(profile))
    }

    pub fn hold_neutral(&self) -> Result<()> {
        self.send(ControllerCommand::HoldNeutral)
    }

    /// Stop the service. The active session, if any, is disconnected first.
    pub fn shutdown(&self) -> Result<()> {
        self.send(ControllerCommand::Shutdown)
    }
}

pub struct ControllerService<T: Transport> {
    scheduler: CommandScheduler<T>,
    command_receiver: mpsc::UnboundedReceiver<ControllerCommand>,
    transport_receiver: mpsc::UnboundedReceiver<TransportEvent>,
    tick_interval: Duration,
}

impl<T: Transport> ControllerService<T> {
    /// Build a service around `transport`, whose events arrive on
    /// `transport_receiver`.
    pub fn new(
        transport: T,
        transport_receiver: mpsc::UnboundedReceiver<TransportEvent>,
        tick_interval: Duration,
    ) -> (
        Self,
        ControllerHandle,
        mpsc::UnboundedReceiver<ControllerEvent>,
    ) {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let (command_sender, command_receiver) = mpsc::unbounded_channel();

        let service = Self {
            scheduler: CommandScheduler::new(transport, event_sender),
            command_receiver,
            transport_receiver,
            tick_interval,
        };
        (service, ControllerHandle { command_sender }, event_receiver)
    }

    /// Process commands, transport events and ticks until shut down or every
    /// handle is dropped.
    pub async fn run(mut self) -> CommandScheduler<T> {
        info!("Controller service started ({:?} tick)", self.tick_interval);
        let mut ticker: Option<Interval> = None;

        loop {
            // The tick exists only while a session is active
            match (self.scheduler.is_ticking(), ticker.is_some()) {
                (true, false) => ticker = Some(self.new_ticker()),
                (false, true) => ticker = None,
                _ => {}
            }

            tokio::select! {
                command = self.command_receiver.recv() => match command {
                    Some(ControllerCommand::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
                Some(event) = self.transport_receiver.recv() => {
                    self.scheduler.handle_transport_event(event);
                }
                _ = next_tick(&mut ticker) => self.scheduler.on_tick(),
            }
        }

        self.scheduler.disconnect();
        info!("Controller service stopped");
        self.scheduler
    }

    fn new_ticker(&self) -> Interval {
        debug!("Starting command tick");
        let period = self.tick_interval;
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }

    fn apply(&mut self, command: ControllerCommand) {
        match command {
            ControllerCommand::Connect(profile) => self.scheduler.connect(profile),
            ControllerCommand::Disconnect => self.scheduler.disconnect(),
            ControllerCommand::SetMotorSpeed(value) => self.scheduler.set_motor_speed(value),
            ControllerCommand::SetSteer(value) => self.scheduler.set_steer_value(value),
            ControllerCommand::SetPortOut { index, is_on } => {
                self.scheduler.set_port_out(index, is_on)
            }
            ControllerCommand::UpdateServoTrim => self.scheduler.update_servo_trim(),
            ControllerCommand::UpdateSubServoTrim => self.scheduler.update_sub_servo_trim(),
            ControllerCommand::UpdateProfile(profile) => self.scheduler.update_profile(profile),
            ControllerCommand::HoldNeutral => self.scheduler.hold_neutral(),
            ControllerCommand::Shutdown => {}
        }
    }
}

impl<T: Transport + Send + 'static> ControllerService<T> {
    pub fn spawn(self) -> JoinHandle<CommandScheduler<T>> {
        tokio::spawn(self.run())
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
