//! Line transport for the NGPAS gateway link.
//!
//! Owns the TCP socket. Commands go out as single newline-terminated UTF-8
//! lines; the gateway sends one frame per reply, read in a single buffer of
//! at most 16 KiB with no reassembly. Connection establishment and command
//! exchange each carry their own bounded retry budget, and every exchange is
//! traced through the wire log.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{
    self, PedConfig, MAX_CONNECTION_RETRY_ATTEMPTS, MAX_RETRY_ATTEMPTS, RECV_BUFFER_BYTES,
};
use crate::error::PedError;
use crate::wirelog::WireLog;

/// Handshake emitted as the first framed exchange after the socket opens.
const HANDSHAKE_LINE: &str = "connect()";

// ---------------------------------------------------------------------------
// Raw line I/O
// ---------------------------------------------------------------------------

/// Byte-level connection primitives under the retrying transport.
pub trait LineIo: Send {
    /// Open the underlying connection, discarding any residual one.
    fn open(&mut self) -> Result<(), PedError>;

    /// Tear down the connection. Best-effort, never fails.
    fn close(&mut self);

    /// Whether the connection is currently open.
    fn is_open(&self) -> bool;

    /// Send one command line (terminator appended by the implementation).
    fn write_line(&mut self, line: &str) -> Result<(), PedError>;

    /// Read one reply frame.
    fn read_frame(&mut self) -> Result<String, PedError>;

    /// Human-readable description of the connection target.
    fn description(&self) -> String;
}

/// TCP implementation used against a real gateway.
pub struct TcpLineIo {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpLineIo {
    pub fn new(config: &PedConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            stream: None,
        }
    }
}

impl LineIo for TcpLineIo {
    fn open(&mut self) -> Result<(), PedError> {
        self.close();

        let address = format!("{}:{}", self.host, self.port);
        let resolved = address.to_socket_addrs()?.next().ok_or_else(|| {
            PedError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("no address for {address}"),
            ))
        })?;

        let stream = TcpStream::connect_timeout(&resolved, self.connect_timeout)?;
        if self.read_timeout > Duration::ZERO {
            stream.set_read_timeout(Some(self.read_timeout))?;
        }
        let _ = stream.set_nodelay(true);

        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(ref stream) = self.stream {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.stream = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn write_line(&mut self, line: &str) -> Result<(), PedError> {
        let stream = self.stream.as_mut().ok_or(PedError::NotConnected)?;
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<String, PedError> {
        let stream = self.stream.as_mut().ok_or(PedError::NotConnected)?;
        let mut buffer = vec![0u8; RECV_BUFFER_BYTES];
        let n = stream.read(&mut buffer)?;
        if n == 0 {
            warn!("gateway closed the connection");
            return Err(PedError::ConnectionClosed);
        }
        buffer.truncate(n);
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn description(&self) -> String {
        format!("TCP({}:{})", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Retrying transport
// ---------------------------------------------------------------------------

/// Framed request/response transport with bounded reconnection and retry.
pub struct LineTransport {
    io: Box<dyn LineIo>,
    log: Arc<WireLog>,
    clock: Arc<dyn Clock>,
}

impl LineTransport {
    pub fn new(io: Box<dyn LineIo>, log: Arc<WireLog>, clock: Arc<dyn Clock>) -> Self {
        Self { io, log, clock }
    }

    /// Establish the link. No-op when already open; otherwise up to
    /// [`MAX_CONNECTION_RETRY_ATTEMPTS`] attempts of open + handshake with
    /// exponential backoff after each failure.
    pub fn connect(&mut self) -> Result<(), PedError> {
        if self.io.is_open() {
            return Ok(());
        }

        let mut last = PedError::NotConnected;
        for attempt in 1..=MAX_CONNECTION_RETRY_ATTEMPTS {
            self.io.close();
            match self.open_and_handshake() {
                Ok(()) => {
                    info!(attempt, target = %self.io.description(), "gateway link established");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "gateway connect attempt failed");
                    self.clock.sleep(config::exponential_backoff(attempt));
                    last = e;
                }
            }
        }

        Err(PedError::ConnectExhausted {
            attempts: MAX_CONNECTION_RETRY_ATTEMPTS,
            source: Box::new(last),
        })
    }

    fn open_and_handshake(&mut self) -> Result<(), PedError> {
        self.io.open()?;
        // the handshake is the first framed exchange; its reply is discarded
        let _ = self.exchange(HANDSHAKE_LINE)?;
        Ok(())
    }

    /// Tear down the link. Best-effort, never fails.
    pub fn disconnect(&mut self) {
        self.io.close();
    }

    /// One command, one reply. Network-class failures force-disconnect the
    /// link and retry with linear backoff, so the next attempt reconnects
    /// from scratch; other errors surface immediately.
    pub fn send_and_recv(&mut self, line: &str) -> Result<String, PedError> {
        let mut last = PedError::NotConnected;
        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            self.connect()?;
            match self.exchange(line) {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_network() => {
                    warn!(attempt, error = %e, "transport failure, resetting link");
                    self.io.close();
                    self.clock.sleep(config::linear_backoff(attempt));
                    last = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(PedError::SendExhausted {
            attempts: MAX_RETRY_ATTEMPTS,
            source: Box::new(last),
        })
    }

    fn exchange(&mut self, line: &str) -> Result<String, PedError> {
        self.log.send(line);
        debug!(line, "SEND");
        self.io.write_line(line)?;

        let reply = self.io.read_frame()?;
        self.log.recv(&reply);
        debug!(payload = %reply, "RECV");
        if reply.contains("error") {
            self.log.error(&reply);
            warn!(payload = %reply, "gateway reply carries an error");
        }
        Ok(reply)
    }

    pub fn description(&self) -> String {
        self.io.description()
    }
}

// ---------------------------------------------------------------------------
// Test fakes
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
