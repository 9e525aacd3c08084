//! # Console Module
//!
//! Status lines and verbose echo. Logging goes to stderr through `log`;
//! everything here goes to stdout.

use chrono::{DateTime, TimeZone};
use log::debug;
use std::fmt::Display;
use std::io::{self, Write};

use crate::bridge::Direction;
use crate::config::EchoFormat;
use crate::serial::encoding::echo_line;

/// Destination of human-readable status lines and echoed bytes.
pub trait StatusSink: Send + Sync {
    /// a complete status line such as "Stopped."
    fn status(&self, line: &str);

    /// bytes just relayed in `direction`
    fn echo(&self, direction: Direction, data: &[u8]);
}

/// Writes to the process stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleSink {
    format: EchoFormat,
}

impl ConsoleSink {
    pub fn new(format: EchoFormat) -> Self {
        ConsoleSink { format }
    }

    fn write_echo<W, Tz>(
        &self,
        out: &mut W,
        direction: Direction,
        data: &[u8],
        time: &DateTime<Tz>,
    ) -> io::Result<()>
    where
        W: Write,
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        match self.format {
            EchoFormat::Text => out.write_all(data)?,
            EchoFormat::Hex => writeln!(out, "{}", echo_line(direction, data, time))?,
        }
        out.flush()
    }
}

impl StatusSink for ConsoleSink {
    fn status(&self, line: &str) {
        println!("{line}");
    }

    fn echo(&self, direction: Direction, data: &[u8]) {
        let mut out = io::stdout().lock();
        if let Err(e) = self.write_echo(&mut out, direction, data, &chrono::Local::now()) {
            debug!("Echo to stdout failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Writer whose every call fails, like a closed stdout pipe.
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_text_echo_writes_bytes_unchanged() {
        let sink = ConsoleSink::new(EchoFormat::Text);
        let mut out = Vec::new();
        sink.write_echo(&mut out, Direction::AToB, &[b'H', 0xFF, b'\n'], &noon()).unwrap();
        assert_eq!(out, [b'H', 0xFF, b'\n']);
    }

    #[test]
    fn test_hex_echo_writes_one_timestamped_line() {
        let sink = ConsoleSink::new(EchoFormat::Hex);
        let mut out = Vec::new();
        sink.write_echo(&mut out, Direction::BToA, b"HI", &noon()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[12:00:00.000 B->A] 48 49\n");
    }

    #[test]
    fn test_echo_failure_is_reported_not_raised() {
        let sink = ConsoleSink::new(EchoFormat::Hex);
        let error = sink
            .write_echo(&mut ClosedPipe, Direction::AToB, b"HI", &noon())
            .unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
    }
}
