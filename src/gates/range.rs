// =============================================================================
// Range cascade (spec §4.2 "Range cascade")
// =============================================================================
//
// Requires a pair of opposing key levels defining a range whose width is at
// least 1.5x spread; ADX_primary < 20; price within 0.2% of either boundary;
// Stochastic %K confirming reversal (crossing 80 downward near resistance,
// or 20 upward near support).

use crate::errors::GateRejection;
use crate::types::Direction;

use super::{RangeGateInputs, SignalCandidate};

const BOUNDARY_PROXIMITY_PCT: f64 = 0.002;
const ADX_CEILING: f64 = 20.0;

pub fn evaluate(inputs: &RangeGateInputs) -> Result<SignalCandidate, GateRejection> {
    let (support, resistance) = match (inputs.support, inputs.resistance) {
        (Some(s), Some(r)) => (s, r),
        _ => return Err(GateRejection::NoOpposingKeyLevels),
    };

    let width = resistance.price - support.price;
    if width < 1.5 * inputs.spread {
        return Err(GateRejection::RangeInvalid);
    }
    if width <= 0.0 {
        return Err(GateRejection::SpreadTooWideForRange);
    }

    if inputs.adx_primary >= ADX_CEILING {
        return Err(GateRejection::RangeInvalid);
    }

    let near_resistance = (resistance.price - inputs.price).abs() / inputs.price <= BOUNDARY_PROXIMITY_PCT;
    let near_support = (inputs.price - support.price).abs() / inputs.price <= BOUNDARY_PROXIMITY_PCT;

    if near_resistance {
        let crossing_down = inputs.stoch_k_prev >= 80.0 && inputs.stoch_k < 80.0;
        if !crossing_down {
            return Err(GateRejection::StochNotConfirming);
        }
        return Ok(SignalCandidate {
            direction: Direction::Sell,
            entry_price: inputs.price,
            ultra_momentum: false,
        });
    }

    if near_support {
        let crossing_up = inputs.stoch_k_prev <= 20.0 && inputs.stoch_k > 20.0;
        if !crossing_up {
            return Err(GateRejection::StochNotConfirming);
        }
        return Ok(SignalCandidate {
            direction: Direction::Buy,
            entry_price: inputs.price,
            ultra_momentum: false,
        });
    }

    Err(GateRejection::NotNearBoundary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_levels::{KeyLevel, KeyLevelKind};

    fn base_inputs() -> RangeGateInputs {
        RangeGateInputs {
            price: 1.10498,
            spread: 0.0005,
            adx_primary: 16.0,
            support: Some(KeyLevel { price: 1.1020, strength: 0.7, kind: KeyLevelKind::Support, touch_count: 3, last_touch_timestamp: 1_700_000_000 }),
            resistance: Some(KeyLevel { price: 1.1050, strength: 0.8, kind: KeyLevelKind::Resistance, touch_count: 4, last_touch_timestamp: 1_700_000_100 }),
            stoch_k: 78.0,
            stoch_k_prev: 85.0,
        }
    }

    #[test]
    fn sell_at_resistance_on_stoch_crossing_down() {
        let inputs = base_inputs();
        let candidate = evaluate(&inputs).unwrap();
        assert_eq!(candidate.direction, Direction::Sell);
    }

    #[test]
    fn buy_at_support_on_stoch_crossing_up() {
        let mut inputs = base_inputs();
        inputs.price = 1.10205;
        inputs.stoch_k = 22.0;
        inputs.stoch_k_prev = 15.0;
        let candidate = evaluate(&inputs).unwrap();
        assert_eq!(candidate.direction, Direction::Buy);
    }

    #[test]
    fn missing_opposing_levels_rejects() {
        let mut inputs = base_inputs();
        inputs.support = None;
        assert_eq!(evaluate(&inputs), Err(GateRejection::NoOpposingKeyLevels));
    }

    #[test]
    fn range_too_narrow_rejects() {
        let mut inputs = base_inputs();
        inputs.resistance = Some(KeyLevel { price: 1.1021, strength: 0.5, kind: KeyLevelKind::Resistance, touch_count: 1, last_touch_timestamp: 1_700_000_200 });
        assert_eq!(evaluate(&inputs), Err(GateRejection::RangeInvalid));
    }

    #[test]
    fn trending_adx_rejects_range_entry() {
        let mut inputs = base_inputs();
        inputs.adx_primary = 25.0;
        assert_eq!(evaluate(&inputs), Err(GateRejection::RangeInvalid));
    }

    #[test]
    fn not_near_either_boundary_rejects() {
        let mut inputs = base_inputs();
        inputs.price = 1.1035;
        assert_eq!(evaluate(&inputs), Err(GateRejection::NotNearBoundary));
    }

    #[test]
    fn stoch_not_crossing_rejects_at_resistance() {
        let mut inputs = base_inputs();
        inputs.stoch_k = 90.0;
        inputs.stoch_k_prev = 88.0;
        assert_eq!(evaluate(&inputs), Err(GateRejection::StochNotConfirming));
    }
}
