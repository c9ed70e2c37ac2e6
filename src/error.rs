//! Error types for the PED link.
//!
//! Transport faults split into network-class errors (a disconnect/reconnect
//! cycle may clear them) and exhaustion errors (a retry budget was spent and
//! the host has to decide what happens next). Everything else the gateway
//! does wrong, like empty frames, junk payloads, or in-band `error` replies,
//! is data, not an error: the parser and the engine absorb those into frames.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PedError {
    /// Socket-level I/O failure while connecting, reading, or writing.
    #[error("PED link I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// An operation needed the link but it is not open.
    #[error("PED link is not connected")]
    NotConnected,

    /// The gateway closed the connection (zero-byte read).
    #[error("PED link closed by peer")]
    ConnectionClosed,

    /// Every connection attempt failed; carries the last cause.
    #[error("PED connect failed after {attempts} attempts: {source}")]
    ConnectExhausted {
        attempts: u32,
        #[source]
        source: Box<PedError>,
    },

    /// Every send attempt failed; carries the last cause.
    #[error("PED send failed after {attempts} attempts: {source}")]
    SendExhausted {
        attempts: u32,
        #[source]
        source: Box<PedError>,
    },

    /// The supplied configuration cannot be used.
    #[error("invalid PED configuration: {0}")]
    Config(String),
}

impl PedError {
    /// Whether this is a network-class fault: something wrong with the socket
    /// or stream itself, worth a force-disconnect and another attempt.
    /// Exhaustion errors are terminal; their retries are already spent.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            PedError::Io(_) | PedError::NotConnected | PedError::ConnectionClosed
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn test_network_classification() {
        assert!(PedError::Io(std::io::Error::new(ErrorKind::ConnectionReset, "reset")).is_network());
        assert!(PedError::NotConnected.is_network());
        assert!(PedError::ConnectionClosed.is_network());

        assert!(!PedError::Config("bad port".into()).is_network());
        assert!(!PedError::ConnectExhausted {
            attempts: 3,
            source: Box::new(PedError::NotConnected),
        }
        .is_network());
        assert!(!PedError::SendExhausted {
            attempts: 3,
            source: Box::new(PedError::ConnectionClosed),
        }
        .is_network());
    }

    #[test]
    fn test_exhausted_display_carries_attempts_and_cause() {
        let err = PedError::ConnectExhausted {
            attempts: 3,
            source: Box::new(PedError::ConnectionClosed),
        };
        let text = err.to_string();
        assert!(text.contains("3 attempts"));
        assert!(text.contains("closed by peer"));
    }
}
