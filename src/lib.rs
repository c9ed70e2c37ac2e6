//! N-Genius PED protocol engine.
//!
//! Client-side engine for driving a payment PIN-entry device (PED) through
//! an NGPAS acceptor gateway over a persistent line-oriented TCP channel.
//! The PED is a shared physical resource with strict one-command-in-flight
//! semantics, so the crate is organized around three disciplines:
//!
//! - a resilient framed request/response transport with bounded
//!   reconnection and retry ([`transport`]),
//! - command primitives and idle detection over that link ([`session`]),
//! - a transaction state machine sequencing `getStatus` →
//!   `startTransaction` → interactive `updateTransaction` exchanges →
//!   `getResult`, with backoff on busy/timeout errors, per-phase deadlines,
//!   and guaranteed terminal cancellation ([`engine`]).
//!
//! Hosts construct a [`TransactionEngine`] from a [`PedConfig`], shape their
//! own transaction payloads, and persist the latest correlation id (see
//! [`new_source_id`]) to enable crash recovery via
//! [`TransactionEngine::check_last_transaction_result`].

use chrono::Utc;

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod session;
pub mod transport;
pub mod wirelog;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PedConfig;
pub use engine::TransactionEngine;
pub use error::PedError;
pub use session::PedSession;
pub use transport::{LineIo, LineTransport, TcpLineIo};
pub use wirelog::{MemorySink, WireLog};

/// Generate a host-side correlation id: 15 characters derived from the
/// current UTC time at millisecond precision (`yyyyMMddHHmmssfff`,
/// truncated). The PED treats it as opaque; hosts persist the most recent
/// value so a restart can recover the pending result.
pub fn new_source_id() -> String {
    let mut id = Utc::now().format("%Y%m%d%H%M%S%3f").to_string();
    id.truncate(15);
    id
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_shape() {
        let id = new_source_id();
        assert_eq!(id.len(), 15);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
        assert!(id.starts_with("20"));
    }

    #[test]
    fn test_source_ids_are_monotonic() {
        let first = new_source_id();
        let second = new_source_id();
        assert!(second >= first);
    }
}
