// =============================================================================
// Regime Classifier
// =============================================================================
//
// Classifies the prevailing market regime from a multi-timeframe ADX/ATR/DI
// snapshot. Detection hierarchy (evaluated top-to-bottom; first match wins):
//
//   1. HighVolatility — ATR_current >= high_vol_multiplier * ATR_avg
//   2. TrendBull       — ADX_primary >= adx_trend_threshold AND +DI > -DI
//   3. TrendBear       — ADX_primary >= adx_trend_threshold AND -DI > +DI
//   4. BreakoutSetup   — adx_breakout_min <= ADX_primary < adx_trend_threshold
//   5. Ranging         — otherwise
//
// Confidence blends how far ADX exceeds the relevant threshold with the
// agreement of the three timeframes; both terms are non-decreasing in their
// inputs so increasing agreement never decreases confidence.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ClassifierError;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegimeLabel {
    TrendBull,
    TrendBear,
    BreakoutSetup,
    Ranging,
    HighVolatility,
}

impl std::fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrendBull => write!(f, "TREND_BULL"),
            Self::TrendBear => write!(f, "TREND_BEAR"),
            Self::BreakoutSetup => write!(f, "BREAKOUT_SETUP"),
            Self::Ranging => write!(f, "RANGING"),
            Self::HighVolatility => write!(f, "HIGH_VOLATILITY"),
        }
    }
}

/// Raw multi-timeframe inputs consumed by [`classify`].
#[derive(Debug, Clone, Copy)]
pub struct RegimeInputs {
    pub adx_primary: f64,
    pub adx_secondary: f64,
    pub adx_tertiary: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub atr_current: f64,
    pub atr_avg: f64,
}

/// Thresholds the classification rules are evaluated against (spec §6
/// Regime config group).
#[derive(Debug, Clone, Copy)]
pub struct RegimeThresholds {
    pub adx_trend_threshold: f64,
    pub adx_breakout_min: f64,
    pub high_vol_multiplier: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            adx_trend_threshold: 25.0,
            adx_breakout_min: 20.0,
            high_vol_multiplier: 1.5,
        }
    }
}

/// Immutable snapshot produced once per classification (spec §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    pub timestamp_secs: i64,
    pub adx_primary: f64,
    pub adx_secondary: f64,
    pub adx_tertiary: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub atr_current: f64,
    pub atr_avg: f64,
    pub label: RegimeLabel,
    pub confidence: f64,
}

// =============================================================================
// Classification logic
// =============================================================================

/// Classify a regime snapshot from raw inputs. Pure and deterministic: the
/// same inputs always yield the same `(label, confidence)` (spec §8
/// idempotence property).
pub fn classify(
    inputs: RegimeInputs,
    thresholds: RegimeThresholds,
) -> (RegimeLabel, f64) {
    // 1. HighVolatility — ATR ratio dominates.
    if inputs.atr_avg > 0.0
        && inputs.atr_current >= thresholds.high_vol_multiplier * inputs.atr_avg
    {
        let ratio = inputs.atr_current / inputs.atr_avg;
        let confidence = remap(ratio, thresholds.high_vol_multiplier, thresholds.high_vol_multiplier * 2.0, 0.55, 1.0);
        return (RegimeLabel::HighVolatility, confidence);
    }

    let agreement = timeframe_agreement(inputs.adx_primary, inputs.adx_secondary, inputs.adx_tertiary);

    // 2 & 3. TrendBull / TrendBear — strong primary ADX with directional sign.
    if inputs.adx_primary >= thresholds.adx_trend_threshold {
        let excess_ratio = remap(inputs.adx_primary, thresholds.adx_trend_threshold, thresholds.adx_trend_threshold + 30.0, 0.0, 1.0);
        let confidence = blend_confidence(excess_ratio, agreement);
        if inputs.plus_di > inputs.minus_di {
            return (RegimeLabel::TrendBull, confidence);
        }
        if inputs.minus_di > inputs.plus_di {
            return (RegimeLabel::TrendBear, confidence);
        }
        // +DI == -DI: no directional edge despite trend strength: fall through
        // to the breakout/ranging rules below rather than guessing a side.
    }

    // 4. BreakoutSetup — intermediate ADX band.
    if inputs.adx_primary >= thresholds.adx_breakout_min
        && inputs.adx_primary < thresholds.adx_trend_threshold
    {
        let band_span = (thresholds.adx_trend_threshold - thresholds.adx_breakout_min).max(f64::EPSILON);
        let excess_ratio = (inputs.adx_primary - thresholds.adx_breakout_min) / band_span;
        let confidence = blend_confidence(excess_ratio, agreement);
        return (RegimeLabel::BreakoutSetup, confidence);
    }

    // 5. Ranging — fallback.
    let confidence = blend_confidence(0.0, agreement);
    (RegimeLabel::Ranging, confidence.max(0.2))
}

/// Open Question resolution (SPEC_FULL.md §9): confidence is
/// `0.6 * adx_excess_ratio + 0.4 * timeframe_agreement`, both terms
/// pre-clamped to [0,1], so the sum is monotone non-decreasing in each input.
fn blend_confidence(adx_excess_ratio: f64, timeframe_agreement: f64) -> f64 {
    let excess = adx_excess_ratio.clamp(0.0, 1.0);
    let agreement = timeframe_agreement.clamp(0.0, 1.0);
    (0.6 * excess + 0.4 * agreement).clamp(0.0, 1.0)
}

/// Agreement in [0,1] of the three ADX readings: 1.0 when all three are on
/// the same side of the trend threshold used loosely as a reference band,
/// scaled down by their relative spread. Strictly increasing agreement
/// (smaller spread) never decreases the result.
fn timeframe_agreement(primary: f64, secondary: f64, tertiary: f64) -> f64 {
    let values = [primary, secondary, tertiary];
    let max = values.iter().cloned().fold(f64::MIN, f64::max);
    let min = values.iter().cloned().fold(f64::MAX, f64::min);
    let spread = max - min;
    // Spread of 0 => perfect agreement => 1.0. Spread of 40+ ADX points => 0.0.
    remap(spread, 0.0, 40.0, 1.0, 0.0)
}

/// Linearly remap `value` from `[in_lo, in_hi]` to `[out_lo, out_hi]`, clamped
/// to the output range.
fn remap(value: f64, in_lo: f64, in_hi: f64, out_lo: f64, out_hi: f64) -> f64 {
    let t = if (in_hi - in_lo).abs() < f64::EPSILON {
        0.5
    } else {
        (value - in_lo) / (in_hi - in_lo)
    };
    let clamped = t.clamp(0.0, 1.0);
    out_lo + clamped * (out_hi - out_lo)
}

// =============================================================================
// RegimeClassifier — stateful wrapper owning the most recent snapshot
// =============================================================================

/// Thread-safe holder of the most recently classified snapshot plus the time
/// of its last actual regime change (not merely re-detection of the same
/// label).
pub struct RegimeClassifier {
    snapshot: RwLock<Option<RegimeSnapshot>>,
    last_change_time: RwLock<Instant>,
    thresholds: RegimeThresholds,
}

impl RegimeClassifier {
    pub fn new(thresholds: RegimeThresholds) -> Arc<Self> {
        Arc::new(Self {
            snapshot: RwLock::new(None),
            last_change_time: RwLock::new(Instant::now()),
            thresholds,
        })
    }

    /// Classify fresh inputs and update the held snapshot. Returns whether
    /// the regime label changed relative to the previous snapshot, or
    /// `ClassifierError::DataNotReady` when any input is missing (signaled
    /// by the caller via `inputs` being `None`).
    pub fn update(
        &self,
        inputs: Option<RegimeInputs>,
        timestamp_secs: i64,
    ) -> Result<bool, ClassifierError> {
        let inputs = inputs.ok_or(ClassifierError::DataNotReady)?;
        let (label, confidence) = classify(inputs, self.thresholds);

        let prev_label = self.snapshot.read().as_ref().map(|s| s.label);
        let changed = prev_label != Some(label);
        if changed {
            *self.last_change_time.write() = Instant::now();
        }

        let snapshot = RegimeSnapshot {
            timestamp_secs,
            adx_primary: inputs.adx_primary,
            adx_secondary: inputs.adx_secondary,
            adx_tertiary: inputs.adx_tertiary,
            plus_di: inputs.plus_di,
            minus_di: inputs.minus_di,
            atr_current: inputs.atr_current,
            atr_avg: inputs.atr_avg,
            label,
            confidence,
        };

        debug!(
            label = %label,
            confidence = format!("{:.2}", confidence),
            changed,
            "regime classified"
        );

        *self.snapshot.write() = Some(snapshot);
        Ok(changed)
    }

    pub fn current(&self) -> Option<RegimeSnapshot> {
        *self.snapshot.read()
    }

    pub fn regime_age(&self) -> std::time::Duration {
        Instant::now().duration_since(*self.last_change_time.read())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(adx_p: f64, adx_s: f64, adx_t: f64, plus_di: f64, minus_di: f64, atr: f64, atr_avg: f64) -> RegimeInputs {
        RegimeInputs {
            adx_primary: adx_p,
            adx_secondary: adx_s,
            adx_tertiary: adx_t,
            plus_di,
            minus_di,
            atr_current: atr,
            atr_avg,
        }
    }

    #[test]
    fn classify_high_volatility_takes_priority() {
        // Even with strong trend-shaped ADX/DI, an ATR blowout wins first.
        let i = inputs(40.0, 40.0, 40.0, 30.0, 10.0, 0.0020, 0.0010);
        let (label, _) = classify(i, RegimeThresholds::default());
        assert_eq!(label, RegimeLabel::HighVolatility);
    }

    #[test]
    fn classify_trend_bull() {
        let i = inputs(32.0, 36.0, 30.0, 28.0, 12.0, 0.0010, 0.0008);
        let (label, conf) = classify(i, RegimeThresholds::default());
        assert_eq!(label, RegimeLabel::TrendBull);
        assert!(conf > 0.0);
    }

    #[test]
    fn classify_trend_bear() {
        let i = inputs(42.0, 38.0, 36.0, 15.0, 30.0, 0.0010, 0.0009);
        let (label, _) = classify(i, RegimeThresholds::default());
        assert_eq!(label, RegimeLabel::TrendBear);
    }

    #[test]
    fn classify_breakout_setup() {
        let i = inputs(22.0, 18.0, 20.0, 20.0, 19.0, 0.0010, 0.0009);
        let (label, _) = classify(i, RegimeThresholds::default());
        assert_eq!(label, RegimeLabel::BreakoutSetup);
    }

    #[test]
    fn classify_ranging_fallback() {
        let i = inputs(12.0, 10.0, 11.0, 20.0, 19.0, 0.0010, 0.0009);
        let (label, _) = classify(i, RegimeThresholds::default());
        assert_eq!(label, RegimeLabel::Ranging);
    }

    #[test]
    fn classify_is_deterministic() {
        let i = inputs(32.0, 36.0, 30.0, 28.0, 12.0, 0.0010, 0.0008);
        let first = classify(i, RegimeThresholds::default());
        let second = classify(i, RegimeThresholds::default());
        assert_eq!(first, second);
    }

    #[test]
    fn confidence_monotone_in_agreement() {
        let loose = inputs(32.0, 10.0, 50.0, 28.0, 12.0, 0.0010, 0.0008);
        let tight = inputs(32.0, 32.0, 32.0, 28.0, 12.0, 0.0010, 0.0008);
        let (_, conf_loose) = classify(loose, RegimeThresholds::default());
        let (_, conf_tight) = classify(tight, RegimeThresholds::default());
        assert!(conf_tight >= conf_loose);
    }

    #[test]
    fn remap_clamps_both_directions() {
        assert!((remap(0.5, 0.0, 1.0, 0.0, 10.0) - 5.0).abs() < 1e-10);
        assert!((remap(2.0, 0.0, 1.0, 0.0, 10.0) - 10.0).abs() < 1e-10);
        assert!((remap(-1.0, 0.0, 1.0, 0.0, 10.0) - 0.0).abs() < 1e-10);
    }

    #[test]
    fn remap_degenerate_range_returns_midpoint() {
        assert!((remap(5.0, 3.0, 3.0, 0.0, 1.0) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn classifier_reports_regime_change() {
        let classifier = RegimeClassifier::new(RegimeThresholds::default());
        let bull = inputs(32.0, 36.0, 30.0, 28.0, 12.0, 0.0010, 0.0008);
        let changed_first = classifier.update(Some(bull), 1000).unwrap();
        assert!(changed_first);
        let changed_second = classifier.update(Some(bull), 1001).unwrap();
        assert!(!changed_second);

        let range = inputs(12.0, 10.0, 11.0, 20.0, 19.0, 0.0010, 0.0009);
        let changed_third = classifier.update(Some(range), 1002).unwrap();
        assert!(changed_third);
    }

    #[test]
    fn classifier_data_not_ready_when_inputs_missing() {
        let classifier = RegimeClassifier::new(RegimeThresholds::default());
        let err = classifier.update(None, 1000).unwrap_err();
        assert_eq!(err, ClassifierError::DataNotReady);
    }
}
