// =============================================================================
// Regime Detection Module
// =============================================================================
//
// Market regime classification: an ordered first-match-wins cascade over
// ADX/DI/ATR readings across the primary and two confirming timeframes.

pub mod detector;

pub use detector::{
    classify, RegimeClassifier, RegimeInputs, RegimeLabel, RegimeSnapshot, RegimeThresholds,
};
