// =============================================================================
// Stochastic Oscillator (%K / %D)
// =============================================================================
//
// %K measures where the current close sits within the high/low range of the
// last `k_period` bars:
//   %K = (close - lowest_low) / (highest_high - lowest_low) * 100
//
// %D is a simple moving average of %K over `d_period` bars, smoothing it.
//
// Interpretation:
//   %K > 80 => overbought,  %K < 20 => oversold.

use crate::market_data::Candle;

/// Result of a stochastic calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticResult {
    pub k: f64,
    pub d: f64,
}

/// Compute the full %K series for the given candles and look-back period.
///
/// Returns one %K value per candle starting at index `k_period - 1`.
fn calculate_k_series(candles: &[Candle], k_period: usize) -> Vec<f64> {
    if k_period == 0 || candles.len() < k_period {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(candles.len() - k_period + 1);
    for i in (k_period - 1)..candles.len() {
        let window = &candles[i + 1 - k_period..=i];
        let highest_high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let lowest_low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let range = highest_high - lowest_low;

        let k = if range.abs() < f64::EPSILON {
            50.0
        } else {
            (candles[i].close - lowest_low) / range * 100.0
        };
        result.push(k);
    }
    result
}

/// Compute the most recent %K/%D pair.
///
/// Returns `None` when there are fewer than `k_period + d_period - 1`
/// candles, or either period is zero.
pub fn calculate_stochastic(
    candles: &[Candle],
    k_period: usize,
    d_period: usize,
) -> Option<StochasticResult> {
    if k_period == 0 || d_period == 0 {
        return None;
    }

    let k_series = calculate_k_series(candles, k_period);
    if k_series.len() < d_period {
        return None;
    }

    let d = k_series[k_series.len() - d_period..].iter().sum::<f64>() / d_period as f64;
    let k = *k_series.last()?;

    if !k.is_finite() || !d.is_finite() {
        return None;
    }

    Some(StochasticResult { k, d })
}

/// Return the previous cycle's %K value (one bar back from the latest),
/// used to detect a crossing (e.g. %K crossing 80 downward).
pub fn previous_k(candles: &[Candle], k_period: usize) -> Option<f64> {
    if candles.len() < 2 {
        return None;
    }
    let series = calculate_k_series(&candles[..candles.len() - 1], k_period);
    series.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: close,
            high,
            low,
            close,
            volume: 1.0,
            is_closed: true,
        }
    }

    #[test]
    fn stochastic_insufficient_data() {
        let candles = vec![candle(1.1, 1.0, 1.05); 3];
        assert!(calculate_stochastic(&candles, 14, 3).is_none());
    }

    #[test]
    fn stochastic_at_high_of_range_is_near_100() {
        let mut candles: Vec<Candle> = (0..20).map(|_| candle(1.10, 1.00, 1.05)).collect();
        candles.push(candle(1.10, 1.00, 1.099));
        let result = calculate_stochastic(&candles, 14, 3).unwrap();
        assert!(result.k > 90.0, "expected %K near 100, got {}", result.k);
    }

    #[test]
    fn stochastic_at_low_of_range_is_near_zero() {
        let mut candles: Vec<Candle> = (0..20).map(|_| candle(1.10, 1.00, 1.05)).collect();
        candles.push(candle(1.10, 1.00, 1.001));
        let result = calculate_stochastic(&candles, 14, 3).unwrap();
        assert!(result.k < 10.0, "expected %K near 0, got {}", result.k);
    }

    #[test]
    fn stochastic_zero_range_defaults_to_midpoint() {
        let candles = vec![candle(1.05, 1.05, 1.05); 20];
        let result = calculate_stochastic(&candles, 14, 3).unwrap();
        assert!((result.k - 50.0).abs() < 1e-9);
    }

    #[test]
    fn previous_k_excludes_latest_bar() {
        let mut candles: Vec<Candle> = (0..20).map(|_| candle(1.10, 1.00, 1.05)).collect();
        let before = calculate_stochastic(&candles, 14, 3).unwrap().k;
        candles.push(candle(1.10, 1.00, 1.099));
        let prev = previous_k(&candles, 14).unwrap();
        assert!((prev - before).abs() < 1e-9);
    }
}
