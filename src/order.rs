// =============================================================================
// Order Constructor (spec §4.5)
// =============================================================================
//
// Computes SL and TP from the regime, ATR, and direction, applies the
// key-level TP cap, and normalizes the result against broker stop-distance
// constraints. Grounded on the teacher's `exit/triple_barrier.rs::BarrierState`
// monotonicity idiom, generalized to order construction rather than
// in-flight stop management.

use crate::errors::ConstructError;
use crate::key_levels::{KeyLevel, KeyLevelKind};
use crate::types::{Direction, OrderKind, SymbolInfo};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderIntent {
    pub direction: Direction,
    pub kind: OrderKind,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct StopInputs {
    pub direction: Direction,
    pub entry_price: f64,
    pub atr_current: f64,
    pub sl_atr_mult: f64,
    /// |close - open| as a multiple of ATR; drives the momentum TP ladder.
    pub candle_range_atr_mult: f64,
    pub nearest_key_level: Option<KeyLevel>,
    pub min_key_level_strength: f64,
    /// The broker's point size, for the key-level cap buffer's "5 points" floor.
    pub point: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopResult {
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// TP multiplier ladder for momentum trades (spec §4.5): surge >3x -> 1.5x
/// ATR (take quick), 2-3x -> 2.0x, 1.5-2x -> 2.5x, otherwise 3.0x.
fn tp_multiplier(candle_range_atr_mult: f64) -> f64 {
    if candle_range_atr_mult > 3.0 {
        1.5
    } else if candle_range_atr_mult >= 2.0 {
        2.0
    } else if candle_range_atr_mult >= 1.5 {
        2.5
    } else {
        3.0
    }
}

/// Compute SL/TP, applying the key-level TP cap when a strong level sits
/// between entry and the proposed TP and the capped TP still clears a
/// 1.5:1 reward-to-risk floor.
pub fn compute_stops(inputs: &StopInputs) -> Result<StopResult, ConstructError> {
    if inputs.atr_current <= 0.0 {
        return Err(ConstructError::ZeroAtr);
    }

    let sl_distance = inputs.sl_atr_mult * inputs.atr_current;
    let tp_distance = tp_multiplier(inputs.candle_range_atr_mult) * inputs.atr_current;

    let long = inputs.direction.is_long();
    let stop_loss = if long {
        inputs.entry_price - sl_distance
    } else {
        inputs.entry_price + sl_distance
    };
    let mut take_profit = if long {
        inputs.entry_price + tp_distance
    } else {
        inputs.entry_price - tp_distance
    };

    if let Some(level) = inputs.nearest_key_level {
        if level.strength >= inputs.min_key_level_strength {
            let between = if long {
                level.price > inputs.entry_price && level.price < take_profit
            } else {
                level.price < inputs.entry_price && level.price > take_profit
            };
            if between {
                let buffer = (5.0 * inputs.point).max(0.2 * inputs.atr_current);
                let capped_tp = if long { level.price - buffer } else { level.price + buffer };
                let reward = (capped_tp - inputs.entry_price).abs();
                let risk = sl_distance;
                if risk > 0.0 && reward / risk >= 1.5 {
                    take_profit = capped_tp;
                }
                // else: cap rejected, original TP preserved (spec: "preserving R:R").
            }
        }
    }

    Ok(StopResult { stop_loss, take_profit })
}

/// Normalize a constructed order against broker stop-distance constraints
/// (spec §4.5 "Normalization"): widen SL/TP to the minimum stop distance if
/// too close, round volume to step, and for pending orders reject a trigger
/// price that violates the minimum distance from the current market.
pub fn normalize_stops(
    mut intent: OrderIntent,
    symbol: &SymbolInfo,
    current_bid: f64,
    current_ask: f64,
) -> Result<OrderIntent, ConstructError> {
    let long = intent.direction.is_long();

    let sl_distance = (intent.entry_price - intent.stop_loss).abs();
    if sl_distance < symbol.min_stop_distance {
        intent.stop_loss = if long {
            intent.entry_price - symbol.min_stop_distance
        } else {
            intent.entry_price + symbol.min_stop_distance
        };
    }

    let tp_distance = (intent.take_profit - intent.entry_price).abs();
    if tp_distance < symbol.min_stop_distance {
        intent.take_profit = if long {
            intent.entry_price + symbol.min_stop_distance
        } else {
            intent.entry_price - symbol.min_stop_distance
        };
    }

    // Ensure SL/TP remain on the correct side of entry after widening.
    if long {
        debug_assert!(intent.stop_loss < intent.entry_price);
        debug_assert!(intent.take_profit > intent.entry_price);
    }

    intent.volume = symbol.round_volume_down(intent.volume);

    if intent.kind != OrderKind::Market {
        let market_price = if long { current_ask } else { current_bid };
        let trigger_distance = (intent.entry_price - market_price).abs();
        if trigger_distance < symbol.min_stop_distance {
            return Err(ConstructError::PendingTriggerTooCloseToMarket);
        }
    }

    Ok(intent)
}
