//! Device Session
//!
//! Drives one bCore device at a time over a [`Transport`].
//!
//! ## Architecture
//!
//! ```text
//!  ControllerHandle ──commands──┐
//!                               ▼
//! ┌─────────────────────────────────────────────┐
//! │              ControllerService               │
//! │  (single task: commands, events, 50 ms tick) │
//! └──────────────────────┬──────────────────────┘
//!                        │ owns
//!                        ▼
//!                 CommandScheduler ──ControllerEvent──▶ UI
//!                        │
//!              WireCommand │ ▲ TransportEvent
//!                        ▼ │
//!                ┌──────────────────┐
//!                │    Transport     │
//!                │ (BLE, simulated) │
//!                └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Command vocabulary and tick timing
//! - [`scheduler`] - Session state machine and tick multiplexer
//! - [`transport`] - Link boundary and its errors
//! - [`simulated`] - In-process device used for the headless binary and tests
//! - [`service`] - Task loop and the cloneable handle

pub mod protocol;
pub mod scheduler;
pub mod service;
pub mod simulated;
pub mod transport;

pub use service::{ControllerCommand, ControllerHandle, ControllerService};
pub use transport::{Transport, TransportError};
