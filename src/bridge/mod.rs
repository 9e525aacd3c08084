//! # Bridge Module
//!
//! The supervisor that splices two serial ports together.
//!
//! A session always follows the same order: open A, open B, start the A->B
//! and B->A pumps, wait for a stop request, join A->B, join B->A, close B,
//! close A.

pub mod interrupt;
pub mod pump;
pub mod shutdown;

use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinError;

pub use interrupt::InterruptHandler;
pub use pump::{Pump, PumpOutcome};
pub use shutdown::{ShutdownReason, ShutdownSignal};

use crate::config::BridgeConfig;
use crate::console::StatusSink;
use crate::error::{BridgeError, Result};
use crate::serial::{PortHandle, PortOpener, PortReader, PortWriter, SerialIo};

/// relay direction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// device A to device B
    AToB,
    /// device B to device A
    BToA,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::AToB => write!(f, "A->B"),
            Direction::BToA => write!(f, "B->A"),
        }
    }
}

/// supervisor state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Opening,
    Running,
    ShuttingDown,
    Closed,
}

/// Summary of a session that ended without an I/O fault.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    pub reason: ShutdownReason,
    pub a_to_b_bytes: u64,
    pub b_to_a_bytes: u64,
}

/// Bridge supervisor for one session.
pub struct Bridge<O> {
    config: BridgeConfig,
    opener: O,
    sink: Arc<dyn StatusSink>,
    signal: Arc<ShutdownSignal>,
    catch_interrupts: bool,
    state: BridgeState,
}

impl<O: PortOpener> Bridge<O> {
    pub fn new(config: BridgeConfig, opener: O, sink: Arc<dyn StatusSink>) -> Self {
        Bridge {
            config,
            opener,
            sink,
            signal: Arc::new(ShutdownSignal::new()),
            catch_interrupts: true,
            state: BridgeState::Idle,
        }
    }

    /// Whether `run` installs the Ctrl-C/SIGTERM handler (on by default).
    pub fn catch_interrupts(mut self, enabled: bool) -> Self {
        self.catch_interrupts = enabled;
        self
    }

    /// get state
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// The session's stop request, for embedders that stop the bridge
    /// themselves.
    pub fn shutdown_signal(&self) -> Arc<ShutdownSignal> {
        Arc::clone(&self.signal)
    }

    fn transition(&mut self, next: BridgeState) {
        debug!("Bridge {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run one session to completion.
    ///
    /// Returns `Ok` when the session was stopped by a request and an error
    /// when a port failed to open or failed while relaying. Every port that
    /// was opened is closed before this returns.
    pub async fn run(&mut self) -> Result<SessionReport> {
        if self.state != BridgeState::Idle {
            return Err(BridgeError::invalid_config(
                "a bridge runs a single session",
            ));
        }
        if let Err(e) = self.config.validate() {
            self.transition(BridgeState::Closed);
            return Err(e);
        }

        self.transition(BridgeState::Opening);
        let (settings_a, settings_b) = self.config.port_settings();
        let mut port_a = match PortHandle::open(&self.opener, &settings_a) {
            Ok(port) => port,
            Err(e) => {
                self.transition(BridgeState::Closed);
                return Err(e);
            }
        };
        let mut port_b = match PortHandle::open(&self.opener, &settings_b) {
            Ok(port) => port,
            Err(e) => {
                port_a.close();
                self.transition(BridgeState::Closed);
                return Err(e);
            }
        };

        let interrupts = if self.catch_interrupts {
            match InterruptHandler::install(Arc::clone(&self.signal)) {
                Ok(handler) => Some(handler),
                Err(e) => {
                    port_b.close();
                    port_a.close();
                    self.transition(BridgeState::Closed);
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        let ((reader_a, writer_a), (reader_b, writer_b)) =
            match split_pair(&mut port_a, &mut port_b) {
                Ok(halves) => halves,
                Err(e) => {
                    port_b.close();
                    port_a.close();
                    self.transition(BridgeState::Closed);
                    return Err(e);
                }
            };

        let verbosity = self.config.verbosity;
        let echo_for = |direction: Direction| {
            verbosity
                .echoes(direction)
                .then(|| Arc::clone(&self.sink))
        };
        let pump_ab = Pump::new(Direction::AToB, reader_a, writer_b, Arc::clone(&self.signal))
            .with_poll_interval(self.config.poll_interval)
            .with_echo(echo_for(Direction::AToB))
            .spawn();
        let pump_ba = Pump::new(Direction::BToA, reader_b, writer_a, Arc::clone(&self.signal))
            .with_poll_interval(self.config.poll_interval)
            .with_echo(echo_for(Direction::BToA))
            .spawn();

        self.transition(BridgeState::Running);
        self.sink.status(&format!(
            "Started. (device_a={}, device_b={}, baudrate={})",
            self.config.device_a, self.config.device_b, self.config.baud_rate
        ));

        self.signal.wait_for_shutdown().await;
        self.transition(BridgeState::ShuttingDown);
        let reason = self.signal.reason().unwrap_or(ShutdownReason::Interrupt);
        match reason {
            ShutdownReason::Interrupt => self.sink.status("Stopping."),
            ShutdownReason::PumpFailed(direction) => {
                warn!("Stopping bridge after {direction} pump failure");
                self.sink
                    .status(&format!("Stopping. ({direction} pump failed)"));
            }
        }

        let (reader_a, writer_b, a_to_b_bytes, error_ab) = settle(pump_ab.await, Direction::AToB);
        let (reader_b, writer_a, b_to_a_bytes, error_ba) = settle(pump_ba.await, Direction::BToA);

        port_b.restore(reader_b, writer_b);
        port_a.restore(reader_a, writer_a);
        port_b.close();
        port_a.close();
        drop(interrupts);

        self.transition(BridgeState::Closed);
        info!("Bridge closed: A->B {a_to_b_bytes} bytes, B->A {b_to_a_bytes} bytes ({reason})");
        self.sink.status("Stopped.");

        match error_ab.or(error_ba) {
            Some(error) => Err(error),
            None => Ok(SessionReport {
                reason,
                a_to_b_bytes,
                b_to_a_bytes,
            }),
        }
    }
}

type Halves<S> = (PortReader<S>, PortWriter<S>);

/// Split both handles or neither. The error names the handle that was not
/// whole; halves already taken from the other one are put back.
fn split_pair<S: SerialIo>(
    port_a: &mut PortHandle<S>,
    port_b: &mut PortHandle<S>,
) -> Result<(Halves<S>, Halves<S>)> {
    match (port_a.split(), port_b.split()) {
        (Some(halves_a), Some(halves_b)) => Ok((halves_a, halves_b)),
        (halves_a, halves_b) => {
            let failed = if halves_a.is_none() { &*port_a } else { &*port_b };
            let error = BridgeError::port_open(failed.port_name(), "port handle is not whole");
            if let Some((reader, writer)) = halves_a {
                port_a.restore(Some(reader), Some(writer));
            }
            if let Some((reader, writer)) = halves_b {
                port_b.restore(Some(reader), Some(writer));
            }
            Err(error)
        }
    }
}

type Settled<S> = (
    Option<PortReader<S>>,
    Option<PortWriter<S>>,
    u64,
    Option<BridgeError>,
);

/// Unpack a joined pump. A panicked pump dropped its halves with it.
fn settle<S: SerialIo>(
    joined: std::result::Result<PumpOutcome<S>, JoinError>,
    direction: Direction,
) -> Settled<S> {
    match joined {
        Ok(outcome) => (
            Some(outcome.reader),
            Some(outcome.writer),
            outcome.bytes_relayed,
            outcome.result.err(),
        ),
        Err(e) => {
            warn!("Pump {direction} did not finish cleanly: {e}");
            (None, None, 0, Some(BridgeError::PumpPanicked(direction)))
        }
    }
}
