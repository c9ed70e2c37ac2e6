//! Transaction lifecycle engine.
//!
//! Drives one logical transaction: wait for the PED to report idle, start,
//! poll with busy/timeout backoff and parameter-prompt handling, and always
//! finish with a terminal result, cancelling first whenever completion was
//! not observed. There is no caller-driven cancellation: a PED holding a
//! card mid-transaction cannot simply be abandoned, so phase deadlines are
//! the only way out, and every deadline exit cancels on the PED before
//! returning.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{self, PedConfig};
use crate::error::PedError;
use crate::frame::{field_bool, field_str};
use crate::session::PedSession;
use crate::transport::{LineTransport, TcpLineIo};
use crate::wirelog::WireLog;

/// Error-110 reply marker: the PED is still processing a previous command.
const BUSY_ERROR_TEXT: &str = "Previous command still in progress";

/// Error-101 reply marker: the gateway gave up on a command internally.
const COMMAND_TIMEOUT_TEXT: &str = "Command timed out";

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct TransactionEngine {
    session: PedSession,
    clock: Arc<dyn Clock>,
}

impl TransactionEngine {
    /// Engine over a real TCP link, logging exchanges to the configured
    /// wire-log file.
    pub fn new(config: &PedConfig) -> Result<Self, PedError> {
        let log = Arc::new(WireLog::to_file(&config.log_path)?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let io = Box::new(TcpLineIo::new(config));
        let transport = LineTransport::new(io, log, Arc::clone(&clock));
        let session = PedSession::new(transport, Arc::clone(&clock));
        Ok(Self::with_session(session, clock))
    }

    /// Engine from pre-assembled parts: alternate transports, captured wire
    /// logs, injected clocks.
    pub fn with_session(session: PedSession, clock: Arc<dyn Clock>) -> Self {
        Self { session, clock }
    }

    /// Run one transaction with the default poll interval and deadline.
    pub fn run_with_defaults(
        &mut self,
        source_id: &str,
        payload: &Value,
    ) -> Result<Value, PedError> {
        self.run(
            source_id,
            payload,
            config::DEFAULT_POLL_INTERVAL,
            config::DEFAULT_BASE_TIMEOUT,
        )
    }

    /// Run one transaction lifecycle and return its terminal result frame.
    ///
    /// Only transport exhaustion escapes as an error; every other anomaly
    /// (empty statuses, parse failures, unknown PED errors) is absorbed by
    /// the poll discipline and ends up reflected in the returned frame.
    pub fn run(
        &mut self,
        source_id: &str,
        payload: &Value,
        poll_interval: Duration,
        base_timeout: Duration,
    ) -> Result<Value, PedError> {
        self.session.connect()?;
        self.wait_until_idle();

        info!(source_id, "starting transaction");
        self.session.start_transaction(payload)?;

        let mut update_sent = false;
        let mut busy_count: u32 = 0;
        let mut completed = false;
        let mut cancelled = false;
        let start = self.clock.now();

        loop {
            let phase_deadline = if update_sent {
                config::EXTENDED_TIMEOUT
            } else {
                base_timeout
            };
            if self.clock.now().duration_since(start) >= phase_deadline {
                break;
            }

            let status = self.session.get_status();

            if let Some(error) = field_str(&status, &["error"]) {
                if error.contains(BUSY_ERROR_TEXT) {
                    busy_count += 1;
                    let delay = config::exponential_backoff(busy_count);
                    debug!(
                        busy_count,
                        delay_ms = delay.as_millis() as u64,
                        "PED busy, backing off"
                    );
                    self.clock.sleep(delay);
                    continue;
                }
            }

            // any non-busy observation resets the busy streak
            busy_count = 0;

            if let Some(error) = field_str(&status, &["error"]) {
                if error.contains(COMMAND_TIMEOUT_TEXT) {
                    warn!("PED command timed out, pausing before next poll");
                    self.clock.sleep(config::COMMAND_TIMEOUT_SLEEP);
                    continue;
                }
                // other error replies are non-terminal; keep polling
            }

            let parameter = field_str(&status, &["parameter"]).unwrap_or("");
            let parameter_type = field_str(&status, &["parameterType"]).unwrap_or("");
            if !parameter.is_empty() && !parameter_type.is_empty() {
                let value = default_parameter_value(parameter, parameter_type);
                info!(parameter, parameter_type, value = %value, "answering parameter prompt");
                let update = build_update_payload(source_id, &status, &value);
                self.session.update_transaction(&update)?;

                // the first update is still judged against the tighter
                // pre-update safety threshold; later ones get the extended
                // window
                let threshold = if update_sent {
                    config::EXTENDED_TIMEOUT
                } else {
                    config::PRE_UPDATE_SAFETY_THRESHOLD
                };
                update_sent = true;
                if self.clock.now().duration_since(start) > threshold {
                    warn!(source_id, "deadline exceeded after parameter update, cancelling");
                    self.session.cancel_transaction()?;
                    cancelled = true;
                    break;
                }

                self.clock.sleep(poll_interval);
                continue;
            }

            if field_bool(&status, &["complete"]) == Some(true) {
                completed = true;
                break;
            }

            self.clock.sleep(poll_interval);
        }

        if !completed && !cancelled {
            // one last look before giving up on the transaction
            let status = self.session.get_status();
            if field_bool(&status, &["complete"]) == Some(true) {
                debug!(source_id, "transaction completed at the deadline check");
            } else {
                warn!(source_id, "transaction deadline exceeded, cancelling");
                self.session.cancel_transaction()?;
            }
        }

        self.session.get_result(source_id)
    }

    /// X report: intermediate totals, no close.
    pub fn run_x_report(&mut self) -> Result<Value, PedError> {
        self.run_report("X", "XReport")
    }

    /// Z report: end-of-day totals.
    pub fn run_z_report(&mut self) -> Result<Value, PedError> {
        self.run_report("Z", "ZReport")
    }

    fn run_report(&mut self, report_type: &str, source_id: &str) -> Result<Value, PedError> {
        let payload = json!({ "type": "getReport", "reportType": report_type });
        self.run(
            source_id,
            &payload,
            config::DEFAULT_POLL_INTERVAL,
            config::REPORT_TIMEOUT,
        )
    }

    /// Startup crash recovery passthrough.
    pub fn check_last_transaction_result(&mut self, source_id: &str) -> Result<Value, PedError> {
        self.session.check_last_transaction_result(source_id)
    }

    /// Graceful host shutdown.
    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }

    // Admission control: no transaction starts until the PED reports truly
    // idle. The gate has no deadline; the PED must become idle or the
    // operator must intervene.
    fn wait_until_idle(&mut self) {
        loop {
            let _ = self.session.get_status();
            if self.session.is_ped_idle() {
                return;
            }
            info!("PED not idle, waiting");
            self.clock.sleep(config::IDLE_GATE_SLEEP);
        }
    }
}

// ---------------------------------------------------------------------------
// Parameter prompts
// ---------------------------------------------------------------------------

/// Operator-input default for a `(parameter, parameterType)` prompt.
pub fn default_parameter_value(parameter: &str, parameter_type: &str) -> String {
    if parameter.eq_ignore_ascii_case("checkcard") {
        return "continue".to_string();
    }
    match parameter_type.to_ascii_lowercase().as_str() {
        "alphanumeric" => "ok",
        "numeric" => "0",
        "boolean" => "true",
        _ => "",
    }
    .to_string()
}

// The update payload echoes the prompt's surrounding status fields verbatim;
// the outbound correlation id is always spelled `sourceid`.
fn build_update_payload(source_id: &str, status: &Value, parameter_value: &str) -> Value {
    let echoed = |key: &str| status.get(key).cloned().unwrap_or(Value::Null);
    json!({
        "success": false,
        "amount": echoed("amount"),
        "cashback": echoed("cashback"),
        "sourceid": source_id,
        "currency": echoed("currency"),
        "inProgress": echoed("inProgress"),
        "displayText": echoed("displayText"),
        "parameter": echoed("parameter"),
        "parameterType": echoed("parameterType"),
        "parameterValue": parameter_value,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
