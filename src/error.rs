//! # Error Module
//!
//! This module provides the error types for `serial_bridge`.
//! It uses the `thiserror` crate for ergonomic error handling.

use thiserror::Error;

use crate::bridge::Direction;

/// Result type alias for `serial_bridge` operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Failed to open serial port.
    #[error("Failed to open serial port '{port_name}': {reason}")]
    PortOpen { port_name: String, reason: String },

    /// Failed to read from serial port.
    #[error("Failed to read from serial port '{port_name}': {reason}")]
    PortRead { port_name: String, reason: String },

    /// Failed to write to serial port.
    #[error("Failed to write to serial port '{port_name}': {reason}")]
    PortWrite { port_name: String, reason: String },

    /// A pump task panicked before handing its ports back.
    #[error("Pump {0} terminated abnormally")]
    PumpPanicked(Direction),

    /// Installing the interrupt handler failed.
    #[error("Failed to install interrupt handler: {0}")]
    Signal(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeError {
    /// Creates a new port open error.
    #[must_use]
    pub fn port_open(port_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::PortOpen {
            port_name: port_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a new port read error.
    #[must_use]
    pub fn port_read(port_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::PortRead {
            port_name: port_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a new port write error.
    #[must_use]
    pub fn port_write(port_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::PortWrite {
            port_name: port_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
