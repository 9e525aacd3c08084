//! # Config Module
//!
//! Run configuration for a bridge session.

use log::warn;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::bridge::Direction;
use crate::error::{BridgeError, Result};
use crate::serial::{COMMON_BAUD_RATES, DEFAULT_BAUD_RATE, PortSettings};

/// idle wait of a pump when its source has nothing to read
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Which relayed directions are echoed to the status sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Verbosity {
    #[default]
    Off,
    AToB,
    BToA,
    Both,
}

impl Verbosity {
    /// is `direction` echoed
    pub fn echoes(self, direction: Direction) -> bool {
        match self {
            Verbosity::Off => false,
            Verbosity::AToB => direction == Direction::AToB,
            Verbosity::BToA => direction == Direction::BToA,
            Verbosity::Both => true,
        }
    }
}

/// Accepts names (`off`, `a2b`, `b2a`, `both`) and the numeric levels
/// `-1`, `0`, `1`, `2`.
impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" | "-1" => Ok(Verbosity::Off),
            "a2b" | "a-to-b" | "0" => Ok(Verbosity::AToB),
            "b2a" | "b-to-a" | "1" => Ok(Verbosity::BToA),
            "both" | "2" => Ok(Verbosity::Both),
            other => Err(format!(
                "unknown verbose mode '{other}' (expected off, a2b, b2a or both)"
            )),
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verbosity::Off => write!(f, "off"),
            Verbosity::AToB => write!(f, "a2b"),
            Verbosity::BToA => write!(f, "b2a"),
            Verbosity::Both => write!(f, "both"),
        }
    }
}

/// How echoed bytes are printed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EchoFormat {
    /// bytes as received
    #[default]
    Text,
    /// one timestamped hex line per relayed chunk
    Hex,
}

/// bridge configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    pub device_a: String,
    pub device_b: String,
    pub baud_rate: u32,
    pub verbosity: Verbosity,
    pub echo_format: EchoFormat,
    pub poll_interval: Duration,
}

impl BridgeConfig {
    /// configuration for bridging `device_a` and `device_b` at the default baud rate
    pub fn new(device_a: impl Into<String>, device_b: impl Into<String>) -> Self {
        BridgeConfig {
            device_a: device_a.into(),
            device_b: device_b.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            verbosity: Verbosity::Off,
            echo_format: EchoFormat::Text,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the verbose mode
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set the echo format
    pub fn with_echo_format(mut self, echo_format: EchoFormat) -> Self {
        self.echo_format = echo_format;
        self
    }

    /// Set the pump idle wait
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Reject settings no session can run with.
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(BridgeError::invalid_config("baud rate must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(BridgeError::invalid_config("poll interval must be positive"));
        }
        if self.device_a == self.device_b {
            return Err(BridgeError::invalid_config(format!(
                "both ends are the same device '{}'",
                self.device_a
            )));
        }
        if !COMMON_BAUD_RATES.contains(&self.baud_rate) {
            warn!("Unusual baud rate {}", self.baud_rate);
        }
        Ok(())
    }

    /// port settings for device A and device B
    pub fn port_settings(&self) -> (PortSettings, PortSettings) {
        (
            PortSettings::new(self.device_a.clone(), self.baud_rate),
            PortSettings::new(self.device_b.clone(), self.baud_rate),
        )
    }
}
