//! # Port Module
//!
//! Serial port settings, the open seam used by the bridge, and the port
//! handle whose read and write halves are lent to the pumps.

use log::{debug, info, warn};
use std::future::poll_fn;
use std::mem;
use std::pin::Pin;
use std::task::Poll;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf};
use tokio::time::{Duration, timeout};
use tokio_serial::SerialPortBuilderExt;
pub use tokio_serial::{DataBits, FlowControl, Parity, SerialStream, StopBits, available_ports};

use super::SerialIo;
use crate::error::{BridgeError, Result};

/// serial port baud rate
pub const COMMON_BAUD_RATES: &[u32] = &[
    1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 500000, 576000, 921600,
    1000000, 1500000, 2000000,
];

/// baud rate used when none is given
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// driver read timeout applied to both ports
pub const READ_TIMEOUT: Duration = Duration::from_secs(120);

/// size of a single read from the device
pub const READ_CHUNK: usize = 4096;

/// upper bound of bytes handed to a pump in one `read_available`
pub const MAX_RELAY_CHUNK: usize = 4 * READ_CHUNK;

/// serial port settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    pub timeout: Duration,
}

impl PortSettings {
    /// 8N1 settings without flow control for `port_name` at `baud_rate`
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        PortSettings {
            port_name: port_name.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            timeout: READ_TIMEOUT,
        }
    }
}

/// Opens the streams the bridge relays between.
///
/// The bridge only ever talks to ports through this trait, so a session can
/// be driven by real devices ([`SerialOpener`]) or by in-memory links.
#[cfg_attr(test, mockall::automock(type Stream = crate::testing::TestLink;))]
pub trait PortOpener {
    type Stream: SerialIo;

    /// Open the port described by `settings`.
    fn open(&self, settings: &PortSettings) -> Result<Self::Stream>;
}

/// Opens native serial devices through `tokio-serial`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialOpener;

impl PortOpener for SerialOpener {
    type Stream = SerialStream;

    fn open(&self, settings: &PortSettings) -> Result<SerialStream> {
        let stream = tokio_serial::new(&settings.port_name, settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(settings.flow_control)
            .timeout(settings.timeout)
            .open_native_async()
            .map_err(|e| BridgeError::port_open(&settings.port_name, e))?;
        Ok(stream)
    }
}

enum Slot<S> {
    Open(S),
    /// split into a reader and a writer owned by the pumps
    Lent,
    Closed,
}

/// An open serial connection.
///
/// The handle is split into a [`PortReader`] and a [`PortWriter`] while the
/// bridge runs and restored before it is closed. Dropping an open handle
/// closes it.
pub struct PortHandle<S> {
    port_name: String,
    slot: Slot<S>,
}

impl<S: SerialIo> PortHandle<S> {
    /// open a port through `opener`
    pub fn open<O>(opener: &O, settings: &PortSettings) -> Result<Self>
    where
        O: PortOpener<Stream = S> + ?Sized,
    {
        let stream = opener.open(settings)?;
        info!(
            "Opened serial port {} at {} baud",
            settings.port_name, settings.baud_rate
        );
        Ok(Self::from_stream(settings.port_name.clone(), stream))
    }

    /// wrap an already open stream
    pub fn from_stream(port_name: impl Into<String>, stream: S) -> Self {
        PortHandle {
            port_name: port_name.into(),
            slot: Slot::Open(stream),
        }
    }

    /// get port name
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// is the device still held, whole or split
    pub fn is_open(&self) -> bool {
        !matches!(self.slot, Slot::Closed)
    }

    /// Split into halves. Returns `None` unless the handle is open and whole.
    pub fn split(&mut self) -> Option<(PortReader<S>, PortWriter<S>)> {
        match mem::replace(&mut self.slot, Slot::Lent) {
            Slot::Open(stream) => {
                let (reader, writer) = io::split(stream);
                Some((
                    PortReader::new(self.port_name.clone(), reader),
                    PortWriter::new(self.port_name.clone(), writer),
                ))
            }
            other => {
                self.slot = other;
                None
            }
        }
    }

    /// Put the halves back together.
    ///
    /// Halves that are missing or belong to another port are dropped, which
    /// releases them; the handle then stays split until closed.
    pub fn restore(&mut self, reader: Option<PortReader<S>>, writer: Option<PortWriter<S>>) {
        if !matches!(self.slot, Slot::Lent) {
            return;
        }
        match (reader, writer) {
            (Some(reader), Some(writer)) if reader.inner.is_pair_of(&writer.inner) => {
                if !reader.pending.is_empty() {
                    debug!(
                        "Discarding {} unrelayed bytes from {}",
                        reader.pending.len(),
                        self.port_name
                    );
                }
                self.slot = Slot::Open(reader.inner.unsplit(writer.inner));
            }
            _ => warn!("Serial port {} was not handed back whole", self.port_name),
        }
    }

    /// Release the device. Returns `false` if it was already closed.
    pub fn close(&mut self) -> bool {
        match mem::replace(&mut self.slot, Slot::Closed) {
            Slot::Open(stream) => {
                drop(stream);
                info!("Closed serial port {}", self.port_name);
                true
            }
            Slot::Lent => {
                info!("Closed serial port {} (halves released)", self.port_name);
                true
            }
            Slot::Closed => false,
        }
    }
}

impl<S> Drop for PortHandle<S> {
    fn drop(&mut self) {
        if matches!(self.slot, Slot::Open(_)) {
            debug!("Closing serial port {} on drop", self.port_name);
        }
    }
}

/// Read side of a port, owned by the pump that drains it.
pub struct PortReader<S> {
    port_name: String,
    inner: ReadHalf<S>,
    pending: Vec<u8>,
    /// error seen while bytes were still pending
    fault: Option<BridgeError>,
}

impl<S: SerialIo> PortReader<S> {
    fn new(port_name: String, inner: ReadHalf<S>) -> Self {
        PortReader {
            port_name,
            inner,
            pending: Vec::with_capacity(READ_CHUNK),
            fault: None,
        }
    }

    /// get port name
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Number of bytes ready to be read. Polls the device once, never waits.
    pub async fn bytes_available(&mut self) -> Result<usize> {
        if self.fault.is_none() {
            if let Err(error) = self.poll_once().await {
                if self.pending.is_empty() {
                    return Err(error);
                }
                self.fault = Some(error);
            }
        }
        Ok(self.pending.len())
    }

    /// Take the bytes currently available.
    ///
    /// When nothing is buffered this waits at most `wait` for the device and
    /// returns an empty vector if nothing arrived. A read failure after bytes
    /// were already received is reported by the next call, so those bytes are
    /// still delivered.
    pub async fn read_available(&mut self, wait: Duration) -> Result<Vec<u8>> {
        if self.pending.is_empty() {
            if let Some(error) = self.fault.take() {
                return Err(error);
            }
        }
        if self.bytes_available().await? == 0 {
            self.fill(wait).await?;
        }
        while !self.pending.is_empty() && self.pending.len() < MAX_RELAY_CHUNK {
            let before = self.pending.len();
            if self.bytes_available().await? == before {
                break;
            }
        }
        Ok(mem::take(&mut self.pending))
    }

    async fn fill(&mut self, wait: Duration) -> Result<usize> {
        let mut buffer = [0u8; READ_CHUNK];
        match timeout(wait, self.inner.read(&mut buffer)).await {
            Err(_elapsed) => Ok(0),
            Ok(read) => self.absorb(read, &buffer),
        }
    }

    /// A single read attempt with no timer; `Pending` counts as an empty read.
    async fn poll_once(&mut self) -> Result<usize> {
        let mut buffer = [0u8; READ_CHUNK];
        let inner = &mut self.inner;
        let polled = poll_fn(|cx| {
            let mut read_buf = ReadBuf::new(&mut buffer);
            match Pin::new(&mut *inner).poll_read(cx, &mut read_buf) {
                Poll::Pending => Poll::Ready(None),
                Poll::Ready(result) => Poll::Ready(Some(result.map(|()| read_buf.filled().len()))),
            }
        })
        .await;
        match polled {
            None => Ok(0),
            Some(read) => self.absorb(read, &buffer),
        }
    }

    fn absorb(&mut self, read: io::Result<usize>, buffer: &[u8]) -> Result<usize> {
        match read {
            Ok(0) => Err(BridgeError::port_read(&self.port_name, "end of stream")),
            Ok(n) => {
                self.pending.extend_from_slice(&buffer[..n]);
                Ok(n)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {
                Ok(0)
            }
            Err(e) => Err(BridgeError::port_read(&self.port_name, e)),
        }
    }
}

/// Write side of a port, owned by the pump that feeds it.
pub struct PortWriter<S> {
    port_name: String,
    inner: WriteHalf<S>,
}

impl<S: SerialIo> PortWriter<S> {
    fn new(port_name: String, inner: WriteHalf<S>) -> Self {
        PortWriter { port_name, inner }
    }

    /// get port name
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// write all of `data` and flush it to the device
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner
            .write_all(data)
            .await
            .map_err(|e| BridgeError::port_write(&self.port_name, e))?;
        self.inner
            .flush()
            .await
            .map_err(|e| BridgeError::port_write(&self.port_name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Rig;
    use tokio::io::AsyncWriteExt;

    const WAIT: Duration = Duration::from_millis(20);

    #[test]
    fn test_port_settings_are_8n1_without_flow_control() {
        let settings = PortSettings::new("/dev/ttyUSB0", DEFAULT_BAUD_RATE);
        assert_eq!(settings.port_name, "/dev/ttyUSB0");
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.data_bits, DataBits::Eight);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.stop_bits, StopBits::One);
        assert_eq!(settings.flow_control, FlowControl::None);
        assert_eq!(settings.timeout, READ_TIMEOUT);
    }

    #[tokio::test]
    async fn test_read_available_returns_empty_when_idle() {
        let rig = Rig::new();
        let (device, _far, _fault) = rig.link("/dev/ttyA");
        let mut handle = PortHandle::from_stream("/dev/ttyA", device);
        let (mut reader, _writer) = handle.split().unwrap();

        assert_eq!(reader.bytes_available().await.unwrap(), 0);
        assert!(reader.read_available(WAIT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_idle_bytes_available_never_waits() {
        let rig = Rig::new();
        let (device, _far, _fault) = rig.link("/dev/ttyA");
        let mut handle = PortHandle::from_stream("/dev/ttyA", device);
        let (mut reader, _writer) = handle.split().unwrap();

        let started = std::time::Instant::now();
        for _ in 0..100 {
            assert_eq!(reader.bytes_available().await.unwrap(), 0);
        }
        assert!(
            started.elapsed() < Duration::from_millis(50),
            "100 idle calls took {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn test_read_available_gathers_without_timer_ticks() {
        let rig = Rig::new();
        let (device, mut far, _fault) = rig.link("/dev/ttyA");
        let mut handle = PortHandle::from_stream("/dev/ttyA", device);
        let (mut reader, _writer) = handle.split().unwrap();

        let mut relayed = 0;
        let started = std::time::Instant::now();
        for _ in 0..100 {
            far.write_all(b"x").await.unwrap();
            relayed += reader.read_available(WAIT).await.unwrap().len();
        }
        assert_eq!(relayed, 100);
        assert!(
            started.elapsed() < Duration::from_millis(50),
            "100 one-byte chunks took {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn test_bytes_available_then_read_available() {
        let rig = Rig::new();
        let (device, mut far, _fault) = rig.link("/dev/ttyA");
        let mut handle = PortHandle::from_stream("/dev/ttyA", device);
        let (mut reader, _writer) = handle.split().unwrap();

        far.write_all(b"HI").await.unwrap();
        assert_eq!(reader.bytes_available().await.unwrap(), 2);
        assert_eq!(reader.read_available(WAIT).await.unwrap(), b"HI");
        assert_eq!(reader.bytes_available().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bytes_before_disconnect_are_delivered_first() {
        let rig = Rig::new();
        let (device, mut far, _fault) = rig.link("/dev/ttyA");
        let mut handle = PortHandle::from_stream("/dev/ttyA", device);
        let (mut reader, _writer) = handle.split().unwrap();

        far.write_all(b"last words").await.unwrap();
        drop(far);

        assert_eq!(reader.read_available(WAIT).await.unwrap(), b"last words");
        let error = reader.read_available(WAIT).await.unwrap_err();
        assert!(matches!(error, BridgeError::PortRead { .. }));
    }

    #[tokio::test]
    async fn test_write_reaches_far_end() {
        let rig = Rig::new();
        let (device, mut far, _fault) = rig.link("/dev/ttyB");
        let mut handle = PortHandle::from_stream("/dev/ttyB", device);
        let (_reader, mut writer) = handle.split().unwrap();

        writer.write(&[0x48, 0x49]).await.unwrap();
        let mut buffer = [0u8; 2];
        tokio::io::AsyncReadExt::read_exact(&mut far, &mut buffer)
            .await
            .unwrap();
        assert_eq!(buffer, [0x48, 0x49]);
    }

    #[tokio::test]
    async fn test_write_fault_is_port_write_error() {
        let rig = Rig::new();
        let (device, _far, fault) = rig.link("/dev/ttyB");
        let mut handle = PortHandle::from_stream("/dev/ttyB", device);
        let (_reader, mut writer) = handle.split().unwrap();

        fault.store(true, std::sync::atomic::Ordering::SeqCst);
        let error = writer.write(b"x").await.unwrap_err();
        assert!(error.to_string().contains("/dev/ttyB"));
        assert!(matches!(error, BridgeError::PortWrite { .. }));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let rig = Rig::new();
        let (device, _far, _fault) = rig.link("/dev/ttyA");
        let mut handle = PortHandle::from_stream("/dev/ttyA", device);

        assert!(handle.is_open());
        assert!(handle.close());
        assert!(!handle.close());
        assert!(!handle.is_open());
        assert_eq!(rig.closed(), vec!["/dev/ttyA".to_string()]);
    }

    #[tokio::test]
    async fn test_split_restore_close_releases_once() {
        let rig = Rig::new();
        let (device, _far, _fault) = rig.link("/dev/ttyA");
        let mut handle = PortHandle::from_stream("/dev/ttyA", device);

        let (reader, writer) = handle.split().unwrap();
        assert!(handle.split().is_none());
        handle.restore(Some(reader), Some(writer));
        assert!(rig.closed().is_empty());

        assert!(handle.close());
        drop(handle);
        assert_eq!(rig.closed(), vec!["/dev/ttyA".to_string()]);
    }

    #[tokio::test]
    async fn test_restore_with_missing_half_still_closes() {
        let rig = Rig::new();
        let (device, _far, _fault) = rig.link("/dev/ttyA");
        let mut handle = PortHandle::from_stream("/dev/ttyA", device);

        let (reader, writer) = handle.split().unwrap();
        handle.restore(Some(reader), None);
        assert!(rig.closed().is_empty());
        drop(writer);
        assert!(handle.close());
        assert!(!handle.close());
        assert_eq!(rig.closed(), vec!["/dev/ttyA".to_string()]);
    }

    #[tokio::test]
    async fn test_drop_closes_open_handle() {
        let rig = Rig::new();
        let (device, _far, _fault) = rig.link("/dev/ttyA");
        let handle = PortHandle::from_stream("/dev/ttyA", device);
        drop(handle);
        assert_eq!(rig.closed(), vec!["/dev/ttyA".to_string()]);
    }
}
