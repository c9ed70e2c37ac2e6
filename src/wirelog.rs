//! Append-only wire log.
//!
//! The gateway integration requires a process-wide trace of every exchange:
//! `SEND: <line>` for each command, `RECV: <payload>` for each reply, and an
//! additional `ERROR: <payload>` for any reply whose raw text contains
//! `error`. Operators read this file to reconstruct what the PED actually
//! saw, so each entry is written as one atomic line. The sink is injectable;
//! the default appends to `ngenius.log`.

use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct WireLog {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl WireLog {
    /// Append to a log file, creating it if needed.
    pub fn to_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::with_sink(Box::new(file)))
    }

    /// Use an arbitrary sink (test buffer, pipe, host-owned writer).
    pub fn with_sink(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    pub fn send(&self, line: &str) {
        self.append("SEND", line);
    }

    pub fn recv(&self, payload: &str) {
        self.append("RECV", payload);
    }

    pub fn error(&self, payload: &str) {
        self.append("ERROR", payload);
    }

    // Best-effort: a failing log sink must never fail a command exchange.
    fn append(&self, tag: &str, text: &str) {
        let Ok(mut sink) = self.sink.lock() else {
            return;
        };
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let _ = writeln!(sink, "{timestamp} {tag}: {text}");
        let _ = sink.flush();
    }
}

/// Shared in-memory sink for tests and hosts that capture the wire trace.
#[derive(Clone, Default)]
pub struct MemorySink(Arc<Mutex<Vec<u8>>>);

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, decoded lossily.
    pub fn contents(&self) -> String {
        let buffer = self.0.lock().expect("sink mutex poisoned");
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .expect("sink mutex poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_recv_error_lines() {
        let sink = MemorySink::new();
        let log = WireLog::with_sink(Box::new(sink.clone()));

        log.send("getStatus()");
        log.recv("{\"inProgress\":true}");
        log.error("error {\"code\":110}");

        let contents = sink.contents();
        assert!(contents.contains("SEND: getStatus()"));
        assert!(contents.contains("RECV: {\"inProgress\":true}"));
        assert!(contents.contains("ERROR: error {\"code\":110}"));
    }

    #[test]
    fn test_each_entry_is_one_line() {
        let sink = MemorySink::new();
        let log = WireLog::with_sink(Box::new(sink.clone()));

        log.send("startTransaction {\"amount\":\"1000\"}");
        log.recv("");

        let contents = sink.contents();
        assert_eq!(contents.lines().count(), 2);
    }
}
