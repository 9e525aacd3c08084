//! # Pump Module
//!
//! One direction of the bridge: drain a source port into a destination port
//! until a stop is requested or either port fails.

use log::{debug, error, info};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use super::Direction;
use super::shutdown::{ShutdownReason, ShutdownSignal};
use crate::config::DEFAULT_POLL_INTERVAL;
use crate::console::StatusSink;
use crate::error::Result;
use crate::serial::{PortReader, PortWriter, SerialIo};

/// What a finished pump hands back to the supervisor.
pub struct PumpOutcome<S> {
    pub direction: Direction,
    pub reader: PortReader<S>,
    pub writer: PortWriter<S>,
    pub bytes_relayed: u64,
    pub result: Result<()>,
}

/// directional pump
pub struct Pump<S> {
    direction: Direction,
    reader: PortReader<S>,
    writer: PortWriter<S>,
    signal: Arc<ShutdownSignal>,
    echo: Option<Arc<dyn StatusSink>>,
    poll_interval: Duration,
    bytes_relayed: u64,
}

impl<S: SerialIo> Pump<S> {
    pub fn new(
        direction: Direction,
        reader: PortReader<S>,
        writer: PortWriter<S>,
        signal: Arc<ShutdownSignal>,
    ) -> Self {
        Pump {
            direction,
            reader,
            writer,
            signal,
            echo: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            bytes_relayed: 0,
        }
    }

    /// echo every relayed chunk to `sink`
    pub fn with_echo(mut self, sink: Option<Arc<dyn StatusSink>>) -> Self {
        self.echo = sink;
        self
    }

    /// how long one idle read may wait before the flag is checked again
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// run the pump as a tokio task
    pub fn spawn(self) -> JoinHandle<PumpOutcome<S>> {
        tokio::spawn(self.run())
    }

    /// Relay until stopped. An I/O error ends this pump and requests a stop
    /// of the whole bridge.
    pub async fn run(mut self) -> PumpOutcome<S> {
        let _guard = PanicGuard {
            signal: Arc::clone(&self.signal),
            direction: self.direction,
        };
        debug!(
            "Pump {} started ({} -> {})",
            self.direction,
            self.reader.port_name(),
            self.writer.port_name()
        );

        let result = self.relay().await;
        match &result {
            Ok(()) => info!(
                "Pump {} stopped after {} bytes",
                self.direction, self.bytes_relayed
            ),
            Err(e) => {
                error!("Pump {} failed: {}", self.direction, e);
                self.signal
                    .request_shutdown(ShutdownReason::PumpFailed(self.direction));
            }
        }

        PumpOutcome {
            direction: self.direction,
            reader: self.reader,
            writer: self.writer,
            bytes_relayed: self.bytes_relayed,
            result,
        }
    }

    async fn relay(&mut self) -> Result<()> {
        while !self.signal.is_shutdown_requested() {
            let data = self.reader.read_available(self.poll_interval).await?;
            if data.is_empty() {
                continue;
            }
            self.writer.write(&data).await?;
            self.bytes_relayed += data.len() as u64;
            if let Some(sink) = &self.echo {
                sink.echo(self.direction, &data);
            }
        }
        Ok(())
    }
}

/// Requests a stop if the pump task unwinds, so the supervisor is not left
/// waiting on a pump that will never report.
struct PanicGuard {
    signal: Arc<ShutdownSignal>,
    direction: Direction,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.signal
                .request_shutdown(ShutdownReason::PumpFailed(self.direction));
        }
    }
}
