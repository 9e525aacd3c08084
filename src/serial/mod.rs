//! # Serial Module
//!
//! Port handles and byte formatting for the two endpoints of a bridge.

pub mod encoding;
pub mod port;

use tokio::io::{AsyncRead, AsyncWrite};

pub use port::{
    PortHandle, PortOpener, PortReader, PortSettings, PortWriter, SerialOpener,
    COMMON_BAUD_RATES, DEFAULT_BAUD_RATE,
};

/// A byte stream the bridge can relay: a native serial port or anything
/// that behaves like one.
pub trait SerialIo: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> SerialIo for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}
