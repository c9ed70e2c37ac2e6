//! Command primitives over the gateway link.
//!
//! One `PedSession` owns one half-duplex link: every method takes `&mut
//! self`, so exactly one command can be in flight at a time, which is the
//! invariant the PED itself enforces with error 110. The session knows how
//! to issue commands and judge idleness; transaction lifecycle state belongs
//! to the engine alone.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::{self, MAX_RETRY_ATTEMPTS};
use crate::error::PedError;
use crate::frame::{field_bool, field_str, frame_is_empty, parse_frame};
use crate::transport::LineTransport;

/// Display texts that mark the PED as safely idle.
const IDLE_DISPLAY_TEXTS: [&str; 2] = ["NO TXN", "SYSTEM IDLE"];

pub struct PedSession {
    transport: LineTransport,
    clock: Arc<dyn Clock>,
}

impl PedSession {
    pub fn new(transport: LineTransport, clock: Arc<dyn Clock>) -> Self {
        Self { transport, clock }
    }

    pub fn connect(&mut self) -> Result<(), PedError> {
        self.transport.connect()
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    /// Begin a transaction. Fire-and-forget: the reply, if any, is discarded
    /// and progress is observed through the `getStatus` cycle.
    pub fn start_transaction(&mut self, payload: &Value) -> Result<(), PedError> {
        let _ = self
            .transport
            .send_and_recv(&format!("startTransaction {payload}"))?;
        Ok(())
    }

    /// Poll the PED state. Empty frames and transport faults are retried
    /// with linear backoff; once the budget is spent an empty object comes
    /// back so the caller treats the tick as "no information", never as a
    /// failure.
    pub fn get_status(&mut self) -> Value {
        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            match self.transport.send_and_recv("getStatus()") {
                Ok(raw) => {
                    let frame = parse_frame(&raw);
                    if !frame_is_empty(&frame) {
                        return frame;
                    }
                    warn!(attempt, "getStatus returned an empty frame");
                }
                Err(e) => warn!(attempt, error = %e, "getStatus transport failure"),
            }
            if attempt < MAX_RETRY_ATTEMPTS {
                self.clock.sleep(config::linear_backoff(attempt));
            }
        }
        json!({})
    }

    /// Answer a parameter prompt.
    pub fn update_transaction(&mut self, update: &Value) -> Result<(), PedError> {
        let _ = self
            .transport
            .send_and_recv(&format!("updateTransaction {update}"))?;
        Ok(())
    }

    /// Abort the current transaction on the PED.
    pub fn cancel_transaction(&mut self) -> Result<(), PedError> {
        let _ = self.transport.send_and_recv("cancelTransaction()")?;
        Ok(())
    }

    /// Fetch the terminal result for a correlation id. No retry: this runs
    /// at terminal steps where the caller decides what a failure means.
    pub fn get_result(&mut self, source_id: &str) -> Result<Value, PedError> {
        let raw = self
            .transport
            .send_and_recv(&format!("getResult({source_id})"))?;
        Ok(parse_frame(&raw))
    }

    /// Startup crash recovery: fetch the result of a transaction begun by a
    /// previous process, if the host retained its correlation id.
    pub fn check_last_transaction_result(&mut self, source_id: &str) -> Result<Value, PedError> {
        if source_id.trim().is_empty() {
            return Ok(json!({}));
        }
        info!(source_id, "checking result of previous transaction");
        self.get_result(source_id)
    }

    /// Whether the PED reports truly idle: not processing, last transaction
    /// complete, and the display showing one of the idle texts. Anything
    /// doubtful (missing fields, transport trouble) counts as not idle.
    pub fn is_ped_idle(&mut self) -> bool {
        let status = self.get_status();
        let display_idle = field_str(&status, &["displayText"])
            .map(|text| IDLE_DISPLAY_TEXTS.iter().any(|idle| text.contains(idle)))
            .unwrap_or(false);
        field_bool(&status, &["inProgress"]) == Some(false)
            && field_bool(&status, &["complete"]) == Some(true)
            && display_idle
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
