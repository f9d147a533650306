//! TCP sink for shipping records to a remote collector
//!
//! Each record is sent as one newline-terminated line. A write timeout keeps
//! a stalled peer from blocking the logging thread forever.
//!
//! A line is resent after a reconnect only when none of its bytes went out.
//! If the connection breaks partway through a line, the line is dropped and
//! reported, and the next record reconnects, so the collector may see one
//! truncated line but never a duplicated fragment.

use crate::core::error::{LoggerError, Result};
use crate::core::formatter::Rendered;
use crate::core::sink::{Sink, Synchronization};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::net::TcpStream;
use std::time::Duration;

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends records to a TCP endpoint
///
/// ```no_run
/// use rust_log_dispatch::sinks::NetworkSink;
///
/// let sink = NetworkSink::connect("127.0.0.1:5170")
///     .expect("log collector is not reachable")
///     .with_reconnect(false);
/// ```
#[derive(Debug)]
pub struct NetworkSink {
    address: String,
    stream: Mutex<Option<TcpStream>>,
    reconnect_on_error: bool,
    write_timeout: Duration,
}

impl NetworkSink {
    /// Connect to `address` (e.g. `"collector:5170"`)
    pub fn connect(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let stream = open_stream(&address, DEFAULT_WRITE_TIMEOUT)?;
        Ok(Self {
            address,
            stream: Mutex::new(Some(stream)),
            reconnect_on_error: true,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        })
    }

    /// Reconnect and resend once when a write fails before sending anything
    /// (default: enabled)
    #[must_use = "builder methods return a new value"]
    pub fn with_reconnect(mut self, enable: bool) -> Self {
        self.reconnect_on_error = enable;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        if let Some(ref stream) = *self.stream.get_mut() {
            let _ = stream.set_write_timeout(Some(timeout));
        }
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

fn open_stream(address: &str, timeout: Duration) -> Result<TcpStream> {
    let stream = TcpStream::connect(address)
        .map_err(|e| LoggerError::io_operation(format!("connecting to {}", address), e))?;

    stream.set_write_timeout(Some(timeout))?;
    stream.set_read_timeout(Some(timeout))?;
    // Enable TCP_NODELAY for low-latency logging
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Like `write_all`, but a failure also reports how many bytes went out
fn send<W: Write>(out: &mut W, mut buf: &[u8]) -> std::result::Result<(), (usize, io::Error)> {
    let total = buf.len();
    while !buf.is_empty() {
        match out.write(buf) {
            Ok(0) => {
                return Err((
                    total - buf.len(),
                    io::Error::new(io::ErrorKind::WriteZero, "connection accepted no bytes"),
                ))
            }
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err((total - buf.len(), e)),
        }
    }
    Ok(())
}

impl Sink for NetworkSink {
    fn write(&self, output: &Rendered) -> Result<()> {
        let mut line = Vec::with_capacity(output.len() + 1);
        line.extend_from_slice(output.as_bytes());
        line.push(b'\n');

        let mut guard = self.stream.lock();
        let first_error = match guard.as_mut() {
            Some(stream) => match send(stream, &line) {
                Ok(()) => return Ok(()),
                Err((0, e)) => e,
                Err((sent, e)) => {
                    *guard = None;
                    return Err(LoggerError::sink_write(
                        self.name(),
                        format!("{} after {} of {} bytes, line dropped", e, sent, line.len()),
                    ));
                }
            },
            None if !self.reconnect_on_error => {
                return Err(LoggerError::SinkClosed(self.name().to_string()))
            }
            None => io::Error::new(io::ErrorKind::NotConnected, "not connected"),
        };

        // Connection lost
        *guard = None;
        if !self.reconnect_on_error {
            return Err(LoggerError::sink_write(self.name(), first_error));
        }

        let mut stream = open_stream(&self.address, self.write_timeout).map_err(|reconnect| {
            LoggerError::sink_write(
                self.name(),
                format!("{} (reconnect failed: {})", first_error, reconnect),
            )
        })?;
        send(&mut stream, &line).map_err(|(_, e)| LoggerError::sink_write(self.name(), e))?;
        *guard = Some(stream);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        if let Some(ref mut stream) = *self.stream.lock() {
            stream
                .flush()
                .map_err(|e| LoggerError::sink_flush(self.name(), e))?;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(mut stream) = self.stream.lock().take() {
            stream
                .flush()
                .and_then(|_| stream.shutdown(std::net::Shutdown::Both))
                .map_err(|e| LoggerError::sink_close(self.name(), e))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "network"
    }

    fn synchronization(&self) -> Synchronization {
        Synchronization::SelfSynchronizing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    #[test]
    fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(matches!(
            NetworkSink::connect(address),
            Err(LoggerError::IoOperation { .. })
        ));
    }

    #[test]
    fn test_lines_are_delivered() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let reader = std::thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            BufReader::new(socket)
                .lines()
                .map_while(|line| line.ok())
                .collect::<Vec<_>>()
        });

        let sink = NetworkSink::connect(address)
            .unwrap()
            .with_write_timeout(Duration::from_secs(1));
        sink.write(&Rendered::from("INFO one")).unwrap();
        sink.write(&Rendered::from("ERROR two")).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();

        assert_eq!(reader.join().unwrap(), vec!["INFO one", "ERROR two"]);
    }

    /// Accepts `budget` bytes, then fails like a reset connection
    struct Truncating {
        accepted: Vec<u8>,
        budget: usize,
    }

    impl Write for Truncating {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            let n = buf.len().min(self.budget).min(3);
            self.accepted.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_send_reports_partial_progress() {
        let mut out = Truncating { accepted: Vec::new(), budget: 5 };
        let (sent, err) = send(&mut out, b"WARNING disk\n").unwrap_err();
        assert_eq!(sent, 5);
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(out.accepted, b"WARNI");

        let mut untouched = Truncating { accepted: Vec::new(), budget: 0 };
        let (sent, _) = send(&mut untouched, b"x\n").unwrap_err();
        assert_eq!(sent, 0);

        let mut roomy = Truncating { accepted: Vec::new(), budget: 64 };
        send(&mut roomy, b"INFO ok\n").unwrap();
        assert_eq!(roomy.accepted, b"INFO ok\n");
    }

    #[test]
    fn test_write_after_close_without_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let sink = NetworkSink::connect(address).unwrap().with_reconnect(false);
        let _accepted = listener.accept().unwrap();

        sink.close().unwrap();
        assert!(matches!(
            sink.write(&Rendered::from("late")),
            Err(LoggerError::SinkClosed(_))
        ));
    }
}
