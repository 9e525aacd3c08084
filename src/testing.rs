//! In-memory serial links and a recording sink for unit tests.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use crate::bridge::Direction;
use crate::console::StatusSink;

const LINK_CAPACITY: usize = 64 * 1024;

/// The device end of an in-memory link. Records its name in the rig's close
/// log when dropped and fails writes once its fault switch is on.
pub struct TestLink {
    name: String,
    inner: DuplexStream,
    write_fault: Arc<AtomicBool>,
    close_log: Arc<Mutex<Vec<String>>>,
}

impl AsyncRead for TestLink {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TestLink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.write_fault.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device disconnected",
            )));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl Drop for TestLink {
    fn drop(&mut self) {
        if let Ok(mut log) = self.close_log.lock() {
            log.push(self.name.clone());
        }
    }
}

/// Hands out links that share one close log.
#[derive(Default)]
pub struct Rig {
    close_log: Arc<Mutex<Vec<String>>>,
}

impl Rig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A link named `name`: the device end, the far end the test drives, and
    /// the device end's write fault switch.
    pub fn link(&self, name: &str) -> (TestLink, DuplexStream, Arc<AtomicBool>) {
        let (near, far) = tokio::io::duplex(LINK_CAPACITY);
        let write_fault = Arc::new(AtomicBool::new(false));
        let link = TestLink {
            name: name.to_string(),
            inner: near,
            write_fault: Arc::clone(&write_fault),
            close_log: Arc::clone(&self.close_log),
        };
        (link, far, write_fault)
    }

    /// names of the links released so far, in release order
    pub fn closed(&self) -> Vec<String> {
        self.close_log.lock().unwrap().clone()
    }
}

/// Sink that keeps everything it was given.
#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<String>>,
    echoed: Mutex<Vec<(Direction, Vec<u8>)>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// all bytes echoed for `direction`, concatenated
    pub fn echoed(&self, direction: Direction) -> Vec<u8> {
        self.echoed
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| *d == direction)
            .flat_map(|(_, data)| data.iter().copied())
            .collect()
    }
}

impl StatusSink for RecordingSink {
    fn status(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn echo(&self, direction: Direction, data: &[u8]) {
        self.echoed.lock().unwrap().push((direction, data.to_vec()));
    }
}
