// =============================================================================
// Shared primitive types used across the trading engine core
// =============================================================================

use serde::{Deserialize, Serialize};

/// Whether the engine is actively trading, paused, or killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    Live,
    Paused,
    Killed,
}

impl Default for TradingMode {
    fn default() -> Self {
        Self::Paused
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "Live"),
            Self::Paused => write!(f, "Paused"),
            Self::Killed => write!(f, "Killed"),
        }
    }
}

/// Trade direction for an order or open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn is_long(self) -> bool {
        matches!(self, Direction::Buy)
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// Order kind as submitted to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    BuyStop,
    SellStop,
}

/// Opaque broker-assigned handle for an open position or pending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket(pub u64);

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A timeframe expressed as a multiple of a base unit. The engine only ever
/// compares timeframes for equality/order, so the internal representation is
/// total minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timeframe(pub u32);

impl Timeframe {
    pub const M1: Timeframe = Timeframe(1);
    pub const M5: Timeframe = Timeframe(5);
    pub const M15: Timeframe = Timeframe(15);
    pub const H1: Timeframe = Timeframe(60);
    pub const H4: Timeframe = Timeframe(240);
    pub const D1: Timeframe = Timeframe(1440);

    pub fn minutes(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            1 => write!(f, "M1"),
            5 => write!(f, "M5"),
            15 => write!(f, "M15"),
            60 => write!(f, "H1"),
            240 => write!(f, "H4"),
            1440 => write!(f, "D1"),
            n => write!(f, "M{n}"),
        }
    }
}

/// Broker-side constraints for the traded instrument, returned by
/// `Broker::symbol_info`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub digits: u32,
    pub point: f64,
    pub tick_value: f64,
    pub tick_size: f64,
    pub min_volume: f64,
    pub max_volume: f64,
    pub volume_step: f64,
    pub min_stop_distance: f64,
}

impl SymbolInfo {
    /// Round `volume` down to the nearest `volume_step`, clamped to
    /// `[0, max_volume]`. A result below `min_volume` is left for the caller
    /// to reject (spec §4.4c): rounding never bumps a too-small volume up.
    pub fn round_volume_down(&self, volume: f64) -> f64 {
        if self.volume_step <= 0.0 {
            return volume.clamp(0.0, self.max_volume);
        }
        let steps = (volume / self.volume_step).floor();
        let rounded = steps * self.volume_step;
        rounded.clamp(0.0, self.max_volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_opposite_roundtrips() {
        assert_eq!(Direction::Buy.opposite(), Direction::Sell);
        assert_eq!(Direction::Sell.opposite(), Direction::Buy);
    }

    #[test]
    fn round_volume_down_steps() {
        let info = SymbolInfo {
            digits: 5,
            point: 0.00001,
            tick_value: 1.0,
            tick_size: 0.00001,
            min_volume: 0.01,
            max_volume: 100.0,
            volume_step: 0.01,
            min_stop_distance: 0.0001,
        };
        assert!((info.round_volume_down(2.0849) - 2.08).abs() < 1e-9);
        assert!((info.round_volume_down(0.0) - 0.0).abs() < 1e-9);
        assert!((info.round_volume_down(500.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn round_volume_down_zero_step_clamps_only() {
        let info = SymbolInfo {
            digits: 2,
            point: 0.01,
            tick_value: 1.0,
            tick_size: 0.01,
            min_volume: 1.0,
            max_volume: 10.0,
            volume_step: 0.0,
            min_stop_distance: 0.1,
        };
        assert!((info.round_volume_down(5.5) - 5.5).abs() < 1e-9);
    }
}
