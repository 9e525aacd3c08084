//! # Serial Bridge
//!
//! An RS-232C/UART serial data exchanger: every byte received on one port is
//! relayed to the other, in both directions, until the operator interrupts.
//!
//! ## Architecture
//!
//! The project is organized into the following modules:
//!
//! - [`serial`]: Port settings, the open seam and split port handles
//! - [`bridge`]: The supervisor, the two directional pumps and the shutdown signal
//! - [`config`]: Session configuration and verbose modes
//! - [`console`]: Status lines and echo of relayed bytes
//! - [`error`]: Custom error types for the application

pub mod bridge;
pub mod config;
pub mod console;
pub mod error;
pub mod serial;

#[cfg(test)]
mod testing;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::bridge::{
        Bridge, BridgeState, Direction, SessionReport, ShutdownReason, ShutdownSignal,
    };
    pub use crate::config::{BridgeConfig, EchoFormat, Verbosity};
    pub use crate::console::{ConsoleSink, StatusSink};
    pub use crate::error::*;
    pub use crate::serial::{PortOpener, PortSettings, SerialOpener};
}
