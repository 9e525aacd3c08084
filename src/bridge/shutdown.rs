//! # Shutdown Module
//!
//! The stop request shared by the pumps, the interrupt handler and the
//! supervisor. Pumps poll the flag between reads; the supervisor parks on
//! the wake-up until someone requests a stop.

use log::debug;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

use super::Direction;

/// Why a session is ending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// operator interrupt (Ctrl-C, SIGTERM)
    Interrupt,
    /// a pump hit a read or write error
    PumpFailed(Direction),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "interrupt"),
            ShutdownReason::PumpFailed(direction) => write!(f, "{direction} pump failure"),
        }
    }
}

/// Stop flag plus a single-permit wake-up.
///
/// A fresh signal is used for every session; once set it stays set.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    requested: AtomicBool,
    reason: OnceLock<ShutdownReason>,
    wakeup: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Only the first call has an effect; it returns `true`.
    ///
    /// The wake-up permit is stored even if nobody is waiting yet, so a later
    /// [`wait_for_shutdown`](Self::wait_for_shutdown) returns at once.
    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        if self.reason.set(reason).is_err() {
            debug!("Shutdown already requested, ignoring {reason}");
            return false;
        }
        self.requested.store(true, Ordering::Release);
        self.wakeup.notify_one();
        true
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// what triggered the stop, once it has been requested
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    /// Suspend until a stop is requested.
    pub async fn wait_for_shutdown(&self) {
        if self.is_shutdown_requested() {
            return;
        }
        self.wakeup.notified().await;
    }
}
