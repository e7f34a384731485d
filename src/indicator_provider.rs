// =============================================================================
// Indicator Provider — consumed indicator values, memoized per cycle
// =============================================================================
//
// Per Design Note 5, indicator handles are memoized per (indicator,
// timeframe) for the engine's lifetime rather than allocated fresh on every
// read. `IndicatorCache` is the event loop's cycle-scoped memoization table:
// populated once at the start of a management cycle (spec §4.9 step 1) and
// discarded at the next cycle boundary, guaranteeing the indicator-cache
// coherence invariant of spec §8 (repeated reads within a cycle return
// identical values).

use std::collections::HashMap;

use crate::market_data::{CandleBuffer, CandleKey};
use crate::types::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Adx,
    PlusDi,
    MinusDi,
    Atr,
    AtrAverage,
    Rsi,
    Ema(u32),
    StochK,
    StochD,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndicatorKey {
    pub indicator: Indicator,
    pub timeframe: Timeframe,
}

/// Consumed indicator provider (spec §6). `shift` is the number of closed
/// bars back from the latest (0 = most recent closed bar).
pub trait IndicatorProvider: Send + Sync {
    fn value(&self, indicator: Indicator, timeframe: Timeframe, shift: u32) -> Option<f64>;
}

/// Cycle-scoped memoization table. The event loop calls [`IndicatorCache::refresh`]
/// once per management cycle (§4.9 step 1); every subsequent [`IndicatorCache::get`]
/// within that cycle returns the memoized value without touching the provider again.
#[derive(Default)]
pub struct IndicatorCache {
    values: HashMap<IndicatorKey, f64>,
}

impl IndicatorCache {
    pub fn new() -> Self {
        Self { values: HashMap::new() }
    }

    /// Invalidate the cache and repopulate it for the given set of keys (the
    /// indicators the current cycle's cascades will need). Keys whose
    /// provider lookup returns `None` (data not ready) are simply absent from
    /// the cache; `get` then also returns `None`.
    pub fn refresh(&mut self, provider: &dyn IndicatorProvider, keys: &[IndicatorKey]) {
        self.values.clear();
        for key in keys {
            if let Some(v) = provider.value(key.indicator, key.timeframe, 0) {
                self.values.insert(*key, v);
            }
        }
    }

    /// Read a memoized value for the current cycle. Returns `None` if the key
    /// was not requested in `refresh`, or the provider had no value for it.
    pub fn get(&self, indicator: Indicator, timeframe: Timeframe) -> Option<f64> {
        self.values.get(&IndicatorKey { indicator, timeframe }).copied()
    }
}

/// Fixed-table test double for the indicator provider, used by unit tests and
/// the ambient demo binary's dry-run mode.
#[derive(Default)]
pub struct MockIndicatorProvider {
    table: HashMap<IndicatorKey, f64>,
}

impl MockIndicatorProvider {
    pub fn new() -> Self {
        Self { table: HashMap::new() }
    }

    pub fn set(&mut self, indicator: Indicator, timeframe: Timeframe, value: f64) -> &mut Self {
        self.table.insert(IndicatorKey { indicator, timeframe }, value);
        self
    }
}

impl IndicatorProvider for MockIndicatorProvider {
    fn value(&self, indicator: Indicator, timeframe: Timeframe, _shift: u32) -> Option<f64> {
        self.table.get(&IndicatorKey { indicator, timeframe }).copied()
    }
}

/// Adapter that computes indicator values on demand from a [`CandleBuffer`],
/// using the indicator routines in [`crate::indicators`]. Ported from the
/// teacher's call sites in `strategy.rs`/`regime/detector.rs`, generalized to
/// accept an arbitrary [`Timeframe`] rather than being hardcoded to one
/// series.
pub struct CandleIndicatorProvider<'a> {
    pub buffer: &'a CandleBuffer,
    pub symbol: String,
    pub adx_period: usize,
    pub atr_period: usize,
    pub atr_avg_period: usize,
    pub rsi_period: usize,
    pub stoch_k_period: usize,
    pub stoch_d_period: usize,
    pub lookback: usize,
}

impl<'a> CandleIndicatorProvider<'a> {
    fn key(&self, timeframe: Timeframe) -> CandleKey {
        CandleKey { symbol: self.symbol.clone(), timeframe }
    }
}

impl<'a> IndicatorProvider for CandleIndicatorProvider<'a> {
    fn value(&self, indicator: Indicator, timeframe: Timeframe, shift: u32) -> Option<f64> {
        let key = self.key(timeframe);
        let candles = self.buffer.get_closed(&key, self.lookback + shift as usize);
        if shift as usize >= candles.len() {
            return None;
        }
        let upto = candles.len() - shift as usize;
        let window = &candles[..upto];

        match indicator {
            Indicator::Adx => crate::indicators::adx::calculate_adx(window, self.adx_period),
            Indicator::PlusDi => {
                crate::indicators::adx::calculate_adx_di(window, self.adx_period)
                    .map(|(_, plus, _)| plus)
            }
            Indicator::MinusDi => {
                crate::indicators::adx::calculate_adx_di(window, self.adx_period)
                    .map(|(_, _, minus)| minus)
            }
            Indicator::Atr => crate::indicators::atr::calculate_atr(window, self.atr_period),
            Indicator::AtrAverage => {
                let atr_series: Vec<f64> = (0..window.len().saturating_sub(self.atr_period))
                    .filter_map(|i| {
                        crate::indicators::atr::calculate_atr(&window[..=i + self.atr_period], self.atr_period)
                    })
                    .collect();
                let series = if atr_series.len() >= self.atr_avg_period {
                    &atr_series[atr_series.len() - self.atr_avg_period..]
                } else {
                    &atr_series[..]
                };
                if series.is_empty() {
                    None
                } else {
                    Some(series.iter().sum::<f64>() / series.len() as f64)
                }
            }
            Indicator::Rsi => {
                let closes: Vec<f64> = window.iter().map(|c| c.close).collect();
                crate::indicators::rsi::calculate_rsi(&closes, self.rsi_period)
                    .last()
                    .copied()
            }
            Indicator::Ema(period) => {
                let closes: Vec<f64> = window.iter().map(|c| c.close).collect();
                crate::indicators::ema::calculate_ema(&closes, period as usize)
                    .last()
                    .copied()
            }
            Indicator::StochK => {
                crate::indicators::stochastic::calculate_stochastic(
                    window,
                    self.stoch_k_period,
                    self.stoch_d_period,
                )
                .map(|r| r.k)
            }
            Indicator::StochD => {
                crate::indicators::stochastic::calculate_stochastic(
                    window,
                    self.stoch_k_period,
                    self.stoch_d_period,
                )
                .map(|r| r.d)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_provider_returns_set_values() {
        let mut mock = MockIndicatorProvider::new();
        mock.set(Indicator::Adx, Timeframe::H1, 32.0);
        assert_eq!(mock.value(Indicator::Adx, Timeframe::H1, 0), Some(32.0));
        assert_eq!(mock.value(Indicator::Adx, Timeframe::H4, 0), None);
    }

    #[test]
    fn cache_coherence_within_cycle() {
        let mut mock = MockIndicatorProvider::new();
        mock.set(Indicator::Rsi, Timeframe::H1, 55.0);
        let mut cache = IndicatorCache::new();
        let keys = [IndicatorKey { indicator: Indicator::Rsi, timeframe: Timeframe::H1 }];
        cache.refresh(&mock, &keys);

        let first = cache.get(Indicator::Rsi, Timeframe::H1);
        let second = cache.get(Indicator::Rsi, Timeframe::H1);
        assert_eq!(first, second);
        assert_eq!(first, Some(55.0));
    }

    #[test]
    fn cache_miss_for_unrequested_key_returns_none() {
        let mock = MockIndicatorProvider::new();
        let mut cache = IndicatorCache::new();
        cache.refresh(&mock, &[]);
        assert_eq!(cache.get(Indicator::Atr, Timeframe::M15), None);
    }

    #[test]
    fn cache_refresh_clears_stale_entries() {
        let mut mock = MockIndicatorProvider::new();
        mock.set(Indicator::Atr, Timeframe::M15, 1.0);
        let mut cache = IndicatorCache::new();
        let key = IndicatorKey { indicator: Indicator::Atr, timeframe: Timeframe::M15 };
        cache.refresh(&mock, &[key]);
        assert_eq!(cache.get(Indicator::Atr, Timeframe::M15), Some(1.0));

        // Next cycle: provider no longer has the value, refresh with no keys.
        cache.refresh(&mock, &[]);
        assert_eq!(cache.get(Indicator::Atr, Timeframe::M15), None);
    }
}
