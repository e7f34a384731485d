// =============================================================================
// Position Manager (spec §4.7)
// =============================================================================
//
// Per-position state machine evaluated every management cycle. States:
// Open -> BreakevenSet -> Trailing -> Closed, with partial closes as
// orthogonal volume-reducing events and an ExitBlocked sink for tickets
// whose modification attempts are futile. Grounded on the teacher's
// `position_engine.rs::PositionManager` RwLock-guarded, mutate-in-place
// shape, generalized from its fixed TP1/TP2 ladder to the spec's
// breakeven/trailing/partial-exit/momentum-exhaustion rules.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ManagerError;
use crate::execution::{Broker, Position as BrokerPosition};
use crate::types::{Direction, Ticket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Open,
    BreakevenSet,
    Trailing,
    Closed,
    ExitBlocked,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PositionFlags {
    pub momentum_trade: bool,
    pub ultra_momentum: bool,
    pub partial_close_done: bool,
    pub breakeven_moved: bool,
    pub exit_blocked: bool,
}

#[derive(Debug, Clone)]
pub struct ManagedPosition {
    pub ticket: Ticket,
    pub direction: Direction,
    pub entry_price: f64,
    pub volume: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub state: PositionState,
    pub flags: PositionFlags,
    pub exhaustion_signal_count: u32,
}

impl ManagedPosition {
    fn from_broker(p: BrokerPosition) -> Self {
        Self {
            ticket: p.ticket,
            direction: p.direction,
            entry_price: p.entry_price,
            volume: p.volume,
            stop_loss: p.stop_loss,
            take_profit: p.take_profit,
            state: PositionState::Open,
            flags: PositionFlags::default(),
            exhaustion_signal_count: 0,
        }
    }

    fn unrealized_distance(&self, current_price: f64) -> f64 {
        if self.direction.is_long() {
            current_price - self.entry_price
        } else {
            self.entry_price - current_price
        }
    }
}

/// One unit of telemetry per mutation the manager makes this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ManagerAction {
    BreakevenSet(Ticket),
    TrailingUpdated(Ticket, f64),
    PartialClosed(Ticket, f64),
    MomentumExhaustionClosed(Ticket),
    Closed(Ticket),
    ExitBlocked(Ticket),
    Adopted(Ticket),
}

#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    pub breakeven_atr_mult: f64,
    pub breakeven_buffer: f64,
    pub trailing_start_atr_mult: f64,
    pub trailing_enabled: bool,
    pub trail_atr_mult_momentum: f64,
    pub trail_atr_mult_ultra: f64,
    pub trail_atr_mult_normal: f64,
    pub overbought_exit: f64,
    pub oversold_exit: f64,
    pub secondary_overbought: f64,
    pub secondary_oversold: f64,
    pub partial_close_fraction: f64,
    pub partial_close_fraction_momentum: f64,
    pub min_profit_pips: f64,
    pub partial_cooldown: Duration,
    pub sl_multiplier_adoption: f64,
    pub reward_ratio_adoption: f64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            breakeven_atr_mult: 1.0,
            breakeven_buffer: 0.00005,
            trailing_start_atr_mult: 1.5,
            trailing_enabled: true,
            trail_atr_mult_momentum: 0.5,
            trail_atr_mult_ultra: 0.4,
            trail_atr_mult_normal: 0.7,
            overbought_exit: 70.0,
            oversold_exit: 30.0,
            secondary_overbought: 75.0,
            secondary_oversold: 25.0,
            partial_close_fraction: 0.5,
            partial_close_fraction_momentum: 0.66,
            min_profit_pips: 10.0,
            partial_cooldown: Duration::from_secs(900),
            sl_multiplier_adoption: 1.5,
            reward_ratio_adoption: 2.0,
        }
    }
}

/// Signals consulted for exit decisions this cycle.
#[derive(Debug, Clone, Copy)]
pub struct ExitSignals {
    pub current_price: f64,
    pub atr_current: f64,
    pub atr_10bar_avg: f64,
    pub rsi_chart: f64,
    pub rsi_secondary: f64,
    pub small_consecutive_candles: bool,
    pub rejection_wick: bool,
    pub rsi_divergence: bool,
    pub ultra_momentum_timeout: bool,
    pub pip_size: f64,
}

pub struct PositionManager {
    positions: RwLock<HashMap<Ticket, ManagedPosition>>,
    last_partial_close: RwLock<HashMap<Ticket, Instant>>,
    cfg: ManagerConfig,
}

impl PositionManager {
    pub fn new(cfg: ManagerConfig) -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            last_partial_close: RwLock::new(HashMap::new()),
            cfg,
        }
    }

    /// Refresh the projected view from the broker's system of record,
    /// adopting any position that carries the engine's footprint but lacks
    /// recognized SL/TP (spec §4.7 "Manual-position adoption").
    pub fn sync_from_broker(&self, broker: &dyn Broker, atr_current: f64, min_stop_distance: f64) -> Vec<ManagerAction> {
        let mut actions = Vec::new();
        let broker_positions = broker.list_positions();
        let mut positions = self.positions.write();

        positions.retain(|ticket, _| broker_positions.iter().any(|p| p.ticket == *ticket));

        for bp in broker_positions {
            if let Some(existing) = positions.get_mut(&bp.ticket) {
                existing.volume = bp.volume;
                continue;
            }

            let needs_adoption = bp.stop_loss <= 0.0 || bp.take_profit <= 0.0;
            let mut managed = ManagedPosition::from_broker(bp);
            if needs_adoption && atr_current > 0.0 {
                let sl_distance = (self.cfg.sl_multiplier_adoption * atr_current).max(min_stop_distance);
                let (sl, tp) = if managed.direction.is_long() {
                    (
                        managed.entry_price - sl_distance,
                        managed.entry_price + sl_distance * self.cfg.reward_ratio_adoption,
                    )
                } else {
                    (
                        managed.entry_price + sl_distance,
                        managed.entry_price - sl_distance * self.cfg.reward_ratio_adoption,
                    )
                };
                managed.stop_loss = sl;
                managed.take_profit = tp;
                actions.push(ManagerAction::Adopted(managed.ticket));
            }
            positions.insert(managed.ticket, managed);
        }

        actions
    }

    /// Run one management cycle: breakeven, trailing, partial exits, and
    /// momentum exhaustion, in that strict order per position.
    pub fn run_cycle(
        &self,
        broker: &dyn Broker,
        signals: &ExitSignals,
    ) -> Vec<ManagerAction> {
        let mut actions = Vec::new();
        let min_stop_distance = broker.symbol_info().min_stop_distance;
        let tickets: Vec<Ticket> = self.positions.read().keys().copied().collect();

        for ticket in tickets {
            if let Some(action) = self.evaluate_one(ticket, broker, signals, min_stop_distance) {
                actions.push(action);
            }
        }

        actions
    }

    fn evaluate_one(
        &self,
        ticket: Ticket,
        broker: &dyn Broker,
        signals: &ExitSignals,
        min_stop_distance: f64,
    ) -> Option<ManagerAction> {
        let mut positions = self.positions.write();
        let position = positions.get_mut(&ticket)?;

        if position.state == PositionState::ExitBlocked {
            return None;
        }

        let unrealized = position.unrealized_distance(signals.current_price);

        // 1. Open -> BreakevenSet (idempotent).
        if !position.flags.breakeven_moved
            && signals.atr_current > 0.0
            && unrealized >= self.cfg.breakeven_atr_mult * signals.atr_current
        {
            let new_sl = if position.direction.is_long() {
                position.entry_price + self.cfg.breakeven_buffer
            } else {
                position.entry_price - self.cfg.breakeven_buffer
            };
            match broker.modify_position(ticket, new_sl, position.take_profit) {
                Ok(()) => {
                    position.stop_loss = new_sl;
                    position.flags.breakeven_moved = true;
                    position.state = PositionState::BreakevenSet;
                    return Some(ManagerAction::BreakevenSet(ticket));
                }
                Err(_) => {
                    position.state = PositionState::ExitBlocked;
                    position.flags.exit_blocked = true;
                    return Some(ManagerAction::ExitBlocked(ticket));
                }
            }
        }

        // 2. BreakevenSet -> Trailing, then ongoing tighten-only updates.
        if position.flags.breakeven_moved
            && self.cfg.trailing_enabled
            && signals.atr_current > 0.0
            && unrealized >= self.cfg.trailing_start_atr_mult * signals.atr_current
        {
            position.state = PositionState::Trailing;
            let trail_mult = if position.flags.ultra_momentum {
                self.cfg.trail_atr_mult_ultra
            } else if position.flags.momentum_trade {
                self.cfg.trail_atr_mult_momentum
            } else {
                self.cfg.trail_atr_mult_normal
            };
            let trail_distance = trail_mult * signals.atr_current;
            let candidate_sl = if position.direction.is_long() {
                signals.current_price - trail_distance
            } else {
                signals.current_price + trail_distance
            };

            // Monotonicity invariant: a trailing update only ever tightens
            // the stop, never widens it.
            let improves = if position.direction.is_long() {
                candidate_sl > position.stop_loss
            } else {
                candidate_sl < position.stop_loss
            };
            let distance_ok = (candidate_sl - signals.current_price).abs() >= min_stop_distance;

            if improves && distance_ok {
                match broker.modify_position(ticket, candidate_sl, position.take_profit) {
                    Ok(()) => {
                        position.stop_loss = candidate_sl;
                        return Some(ManagerAction::TrailingUpdated(ticket, candidate_sl));
                    }
                    Err(_) => {
                        position.state = PositionState::ExitBlocked;
                        position.flags.exit_blocked = true;
                        return Some(ManagerAction::ExitBlocked(ticket));
                    }
                }
            }
        }

        // 3. Partial close on RSI exhaustion.
        if !position.flags.partial_close_done {
            let profit_pips = unrealized / signals.pip_size;
            let rsi_triggered = if position.direction.is_long() {
                signals.rsi_chart >= self.cfg.overbought_exit || signals.rsi_secondary >= self.cfg.secondary_overbought
            } else {
                signals.rsi_chart <= self.cfg.oversold_exit || signals.rsi_secondary <= self.cfg.secondary_oversold
            };
            let cooldown_elapsed = self
                .last_partial_close
                .read()
                .get(&ticket)
                .map(|t| t.elapsed() >= self.cfg.partial_cooldown)
                .unwrap_or(true);
            let atr_not_collapsing = signals.atr_10bar_avg <= 0.0
                || signals.atr_current / signals.atr_10bar_avg >= 0.8;

            if rsi_triggered && profit_pips >= self.cfg.min_profit_pips && cooldown_elapsed && atr_not_collapsing {
                let fraction = if position.flags.momentum_trade {
                    self.cfg.partial_close_fraction_momentum
                } else {
                    self.cfg.partial_close_fraction
                };
                let close_volume = position.volume * fraction;
                match broker.close_partial(ticket, close_volume) {
                    Ok(()) => {
                        position.volume -= close_volume;
                        position.flags.partial_close_done = true;
                        self.last_partial_close.write().insert(ticket, Instant::now());
                        return Some(ManagerAction::PartialClosed(ticket, close_volume));
                    }
                    Err(_) => {
                        position.state = PositionState::ExitBlocked;
                        position.flags.exit_blocked = true;
                        return Some(ManagerAction::ExitBlocked(ticket));
                    }
                }
            }
        }

        // 4. Momentum exhaustion: count signals, close 66% when >= 2.
        if position.flags.momentum_trade {
            let mut count = 0;
            if signals.small_consecutive_candles {
                count += 1;
            }
            if signals.rejection_wick {
                count += 1;
            }
            if signals.rsi_divergence {
                count += 1;
            }
            if position.flags.ultra_momentum && signals.ultra_momentum_timeout {
                count += 1;
            }
            position.exhaustion_signal_count = count;

            if count >= 2 {
                let close_volume = position.volume * 0.66;
                match broker.close_partial(ticket, close_volume) {
                    Ok(()) => {
                        position.volume -= close_volume;
                        return Some(ManagerAction::MomentumExhaustionClosed(ticket));
                    }
                    Err(_) => {
                        position.state = PositionState::ExitBlocked;
                        position.flags.exit_blocked = true;
                        return Some(ManagerAction::ExitBlocked(ticket));
                    }
                }
            }
        }

        None
    }

    pub fn close(&self, broker: &dyn Broker, ticket: Ticket) -> Result<ManagerAction, ManagerError> {
        let mut positions = self.positions.write();
        let position = positions.get_mut(&ticket).ok_or(ManagerError::ExitBlocked(ticket))?;
        if position.state == PositionState::ExitBlocked {
            return Err(ManagerError::ExitBlocked(ticket));
        }
        match broker.close_position(ticket) {
            Ok(()) => {
                position.state = PositionState::Closed;
                Ok(ManagerAction::Closed(ticket))
            }
            Err(_) => {
                position.state = PositionState::ExitBlocked;
                position.flags.exit_blocked = true;
                Err(ManagerError::ExitBlocked(ticket))
            }
        }
    }

    pub fn get(&self, ticket: Ticket) -> Option<ManagedPosition> {
        self.positions.read().get(&ticket).cloned()
    }

    pub fn count_open(&self) -> u32 {
        self.positions
            .read()
            .values()
            .filter(|p| p.state != PositionState::Closed)
            .count() as u32
    }

    pub fn mark_momentum(&self, ticket: Ticket, ultra: bool) {
        if let Some(position) = self.positions.write().get_mut(&ticket) {
            position.flags.momentum_trade = true;
            position.flags.ultra_momentum = ultra;
        }
    }
}
