// =============================================================================
// Execution Dispatcher (spec §4.6)
// =============================================================================
//
// Submits constructed orders through the `Broker` trait, applying the
// per-error-kind policy table: transient errors retry with a fixed delay
// and don't count toward consecutive-failure; already-processed is treated
// as success; permanent rejections are reported and abandoned; unknown
// errors accumulate toward an emergency suspension of the subsystem.
// Grounded on the teacher's `ExecutionEngine`/`ExecutionResult` shape,
// generalized away from the Binance-specific demo/live split.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::errors::{DispatchError, ErrorKind};
use crate::order::OrderIntent;
use crate::types::{Direction, SymbolInfo, Ticket};

/// Projected view of a broker-side position (spec §3 "Position").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub ticket: Ticket,
    pub direction: Direction,
    pub entry_price: f64,
    pub volume: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Synchronous broker abstraction (spec §6 "Broker abstraction, consumed").
/// Every fallible method returns `Result<T, ErrorKind>` using the four
/// error kinds of spec §4.6's policy table.
pub trait Broker: Send + Sync {
    fn open_market(
        &self,
        direction: Direction,
        volume: f64,
        sl: f64,
        tp: f64,
        comment: &str,
    ) -> Result<Ticket, ErrorKind>;

    fn open_pending(
        &self,
        intent: &OrderIntent,
        comment: &str,
    ) -> Result<Ticket, ErrorKind>;

    fn modify_position(&self, ticket: Ticket, sl: f64, tp: f64) -> Result<(), ErrorKind>;
    fn close_position(&self, ticket: Ticket) -> Result<(), ErrorKind>;
    fn close_partial(&self, ticket: Ticket, volume: f64) -> Result<(), ErrorKind>;
    fn list_positions(&self) -> Vec<Position>;
    fn symbol_info(&self) -> SymbolInfo;
    fn is_trade_allowed(&self) -> bool;

    /// Close `ticket`, rerouted to the oldest same-direction, same-volume
    /// position on the instrument when the broker enforces FIFO closing
    /// (spec §4.6 "A FIFO-safe closing variant").
    fn close_position_fifo_safe(&self, ticket: Ticket) -> Result<(), ErrorKind> {
        let positions = self.list_positions();
        let target = positions.iter().find(|p| p.ticket == ticket).copied();
        let Some(target) = target else {
            return Err(ErrorKind::AlreadyProcessed);
        };
        let oldest_match = positions
            .iter()
            .filter(|p| p.direction == target.direction && (p.volume - target.volume).abs() < f64::EPSILON)
            .min_by_key(|p| p.ticket.0)
            .copied()
            .unwrap_or(target);
        self.close_position(oldest_match.ticket)
    }
}

/// Per-activity throttle (spec §3 "ThrottleState"). `emergency_threshold`
/// consecutive unknown errors trip a suspension lasting `cooldown_seconds`.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleState {
    pub last_success: Option<Instant>,
    pub consecutive_failures: u32,
    pub suspended_until: Option<Instant>,
}

impl Default for ThrottleState {
    fn default() -> Self {
        Self { last_success: None, consecutive_failures: 0, suspended_until: None }
    }
}

impl ThrottleState {
    fn is_suspended(&self, now: Instant) -> bool {
        self.suspended_until.map(|until| now < until).unwrap_or(false)
    }

    fn record_success(&mut self, now: Instant) {
        self.last_success = Some(now);
        self.consecutive_failures = 0;
        self.suspended_until = None;
    }

    fn record_unknown_failure(&mut self, now: Instant, emergency_threshold: u32, cooldown: Duration) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= emergency_threshold {
            self.suspended_until = Some(now + cooldown);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub emergency_threshold: u32,
    pub suspension_cooldown: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(250),
            emergency_threshold: 5,
            suspension_cooldown: Duration::from_secs(60),
        }
    }
}

/// Dispatches a single operation against a [`Broker`], applying the spec
/// §4.6 policy table. `activity` keys the per-activity throttle (e.g.
/// `"open_market"`, `"modify_position"`).
pub struct Dispatcher {
    cfg: DispatcherConfig,
    throttles: HashMap<String, ThrottleState>,
}

impl Dispatcher {
    pub fn new(cfg: DispatcherConfig) -> Self {
        Self { cfg, throttles: HashMap::new() }
    }

    pub fn throttle_for(&self, activity: &str) -> ThrottleState {
        self.throttles.get(activity).copied().unwrap_or_default()
    }

    /// Run `op` under the dispatcher's retry/suspend policy. `now` is
    /// supplied by the caller so tests can control elapsed time.
    pub fn dispatch<T>(
        &mut self,
        activity: &str,
        now: Instant,
        mut op: impl FnMut() -> Result<T, ErrorKind>,
    ) -> Result<T, DispatchError> {
        let throttle = self.throttles.entry(activity.to_string()).or_default();
        if throttle.is_suspended(now) {
            let recovery_at_secs = throttle
                .suspended_until
                .map(|until| until.saturating_duration_since(now).as_secs())
                .unwrap_or(0);
            return Err(DispatchError::SubsystemSuspended { recovery_at_secs });
        }

        let mut attempts = 0;
        loop {
            match op() {
                Ok(value) => {
                    self.throttles.get_mut(activity).unwrap().record_success(now);
                    return Ok(value);
                }
                Err(ErrorKind::TransientBusy) => {
                    attempts += 1;
                    debug!(activity, attempts, "transient broker error, retrying");
                    if attempts > self.cfg.max_retries {
                        return Err(DispatchError::RetriesExhausted);
                    }
                    // retried with a bounded number of attempts; does not
                    // count toward consecutive-failure (spec §4.6 policy).
                }
                Err(ErrorKind::AlreadyProcessed) => {
                    info!(activity, "already processed, treated as success");
                    self.throttles.get_mut(activity).unwrap().record_success(now);
                    return Err(DispatchError::Rejected(ErrorKind::AlreadyProcessed));
                }
                Err(ErrorKind::Permanent(msg)) => {
                    warn!(activity, reason = %msg, "permanent rejection, abandoning");
                    return Err(DispatchError::Rejected(ErrorKind::Permanent(msg)));
                }
                Err(ErrorKind::Unknown(msg)) => {
                    let throttle = self.throttles.get_mut(activity).unwrap();
                    throttle.record_unknown_failure(now, self.cfg.emergency_threshold, self.cfg.suspension_cooldown);
                    warn!(activity, reason = %msg, consecutive = throttle.consecutive_failures, "unknown broker error");
                    return Err(DispatchError::Rejected(ErrorKind::Unknown(msg)));
                }
            }
        }
    }
}
