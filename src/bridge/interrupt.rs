//! # Interrupt Module
//!
//! Turns operator interrupts into a shutdown request. The handler task does
//! nothing but call [`ShutdownSignal::request_shutdown`]; the supervisor does
//! all of the cleanup on its own task.

use log::debug;
use std::io;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::shutdown::{ShutdownReason, ShutdownSignal};

/// Listens for Ctrl-C (and SIGTERM on Unix) until dropped.
pub struct InterruptHandler {
    task: JoinHandle<()>,
}

impl InterruptHandler {
    /// Register the signal listeners and start the handler task.
    #[cfg(unix)]
    pub fn install(signal: Arc<ShutdownSignal>) -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal as unix_signal};

        let mut interrupt = unix_signal(SignalKind::interrupt())?;
        let mut terminate = unix_signal(SignalKind::terminate())?;
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = interrupt.recv() => {
                        if received.is_none() {
                            break;
                        }
                    }
                    received = terminate.recv() => {
                        if received.is_none() {
                            break;
                        }
                    }
                }
                signal.request_shutdown(ShutdownReason::Interrupt);
            }
        });
        debug!("Interrupt handler installed (SIGINT, SIGTERM)");
        Ok(InterruptHandler { task })
    }

    /// Register the signal listeners and start the handler task.
    #[cfg(windows)]
    pub fn install(signal: Arc<ShutdownSignal>) -> io::Result<Self> {
        let mut ctrl_c = tokio::signal::windows::ctrl_c()?;
        let task = tokio::spawn(async move {
            while ctrl_c.recv().await.is_some() {
                signal.request_shutdown(ShutdownReason::Interrupt);
            }
        });
        debug!("Interrupt handler installed (Ctrl-C)");
        Ok(InterruptHandler { task })
    }
}

impl Drop for InterruptHandler {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Interrupt handler removed");
    }
}

