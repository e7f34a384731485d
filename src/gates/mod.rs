// =============================================================================
// Signal Gate Cascades
// =============================================================================
//
// One cascade per regime (spec §4.2). Each gate returns pass or a rejection
// reason (`GateRejection`, a tagged variant — never a free string used for
// control flow). A signal is emitted only if every gate in the cascade
// passes, grounded on the teacher's `smart_filters.rs::SmartFilterEngine`
// and `trade_insurance.rs::InsuranceGate` sequential short-circuit idiom.

pub mod breakout;
pub mod range;
pub mod trend;

use serde::{Deserialize, Serialize};

use crate::errors::GateRejection;
use crate::key_levels::KeyLevel;
use crate::sentiment::SentimentSignal;
use crate::types::{Direction, Timeframe};

/// A signal that has cleared every gate in its cascade, ready to flow into
/// the Risk Budget → Position Sizer → Order Constructor pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalCandidate {
    pub direction: Direction,
    pub entry_price: f64,
    /// Set when the breakout cascade's ultra-strong surge bypass fired
    /// (spec §4.2 G1: ">3 x ATR"); downstream order construction submits a
    /// market order instead of a stop order in that case.
    pub ultra_momentum: bool,
}

/// Inputs consulted by the trend cascade (spec §4.2 "Trend cascade").
#[derive(Debug, Clone, Copy)]
pub struct TrendGateInputs {
    pub direction: Direction,
    pub trend_follower_bullish: Option<bool>,
    pub adx_primary: f64,
    pub adx_secondary: f64,
    pub ema50_primary: f64,
    pub ema200_primary: f64,
    pub ema50_secondary: f64,
    pub ema200_secondary: f64,
    pub ema20_chart: f64,
    pub price: f64,
    pub atr_current: f64,
    pub rsi_secondary: f64,
    pub rsi_tertiary: Option<f64>,
    pub rsi_chart: f64,
    pub sentiment: Option<SentimentSignal>,
}

/// Inputs consulted by the breakout cascade (spec §4.2 "Breakout cascade").
#[derive(Debug, Clone, Copy)]
pub struct BreakoutGateInputs {
    pub direction: Direction,
    pub price: f64,
    pub atr_current: f64,
    pub inside_bar: bool,
    pub narrowest_range_of_7: bool,
    pub atr_expansion_ratio: f64,
    pub atr_expansion_threshold: f64,
    pub candle_open: f64,
    pub candle_close: f64,
    pub nearest_key_level: Option<KeyLevel>,
    pub timeframe_proximity_k: f64,
    pub tick_volume: f64,
    pub average_volume_20: f64,
    /// Minimum `KeyLevel::strength` for G2's "a strong key level" (spec
    /// §4.2 Breakout G2), sourced from `GateConfig::min_key_level_strength`.
    pub min_key_level_strength: f64,
}

/// Inputs consulted by the range cascade (spec §4.2 "Range cascade").
#[derive(Debug, Clone, Copy)]
pub struct RangeGateInputs {
    pub price: f64,
    pub spread: f64,
    pub adx_primary: f64,
    pub support: Option<KeyLevel>,
    pub resistance: Option<KeyLevel>,
    pub stoch_k: f64,
    pub stoch_k_prev: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateConfig {
    pub enable_ema_alignment: bool,
    pub pullback_atr_mult_baseline: f64,
    pub pullback_atr_mult_sentiment_boost: f64,
    /// Minimum `KeyLevel::strength` for the breakout cascade's G2 proximity
    /// check (spec §4.2 "a strong key level"). Mirrors `order.rs`'s TP-cap
    /// strength gate.
    pub min_key_level_strength: f64,
}

/// G2's proximity multiplier `k` is timeframe-adaptive (spec §4.2 Breakout
/// G2): 0.5 sub-hourly, 1.0 on hourly, 1.5 on 4-hourly and above. Takes the
/// timeframe the breakout ATR reading was sourced from, not a fixed band.
pub fn timeframe_proximity_k(timeframe: Timeframe) -> f64 {
    if timeframe.minutes() < Timeframe::H1.minutes() {
        0.5
    } else if timeframe.minutes() < Timeframe::H4.minutes() {
        1.0
    } else {
        1.5
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enable_ema_alignment: false,
            pullback_atr_mult_baseline: 3.5,
            // Spec states a 4.0-4.5 band when sentiment agrees; 4.0 is used
            // as the fixed boosted value (DESIGN.md open-question decision).
            pullback_atr_mult_sentiment_boost: 4.0,
            min_key_level_strength: 0.7,
        }
    }
}
