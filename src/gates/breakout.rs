// =============================================================================
// Breakout cascade (spec §4.2 "Breakout cascade")
// =============================================================================
//
// G1 pattern -> G2 proximity to a strong key level -> G3 volume spike. An
// ultra-strong momentum surge (>3x ATR) bypasses G2 and G3 entirely.

use crate::errors::GateRejection;

use super::{BreakoutGateInputs, SignalCandidate};

pub fn evaluate(inputs: &BreakoutGateInputs) -> Result<SignalCandidate, GateRejection> {
    if inputs.atr_current <= 0.0 {
        return Err(GateRejection::DataNotReady);
    }

    let candle_move = (inputs.candle_close - inputs.candle_open).abs();
    let momentum_surge = candle_move > 1.5 * inputs.atr_current;
    let ultra_momentum = candle_move > 3.0 * inputs.atr_current;

    // G1 — pattern.
    let pattern_present = inputs.inside_bar
        || inputs.narrowest_range_of_7
        || inputs.atr_expansion_ratio >= inputs.atr_expansion_threshold
        || momentum_surge;
    if !pattern_present {
        return Err(GateRejection::PatternAbsent);
    }

    if ultra_momentum {
        return Ok(SignalCandidate {
            direction: inputs.direction,
            entry_price: inputs.price,
            ultra_momentum: true,
        });
    }

    // G2 — proximity to a strong key level.
    let level = inputs.nearest_key_level.ok_or(GateRejection::NotNearKeyLevel)?;
    if level.strength < inputs.min_key_level_strength {
        return Err(GateRejection::NotNearKeyLevel);
    }
    let distance = (inputs.price - level.price).abs();
    if distance > inputs.timeframe_proximity_k * inputs.atr_current {
        return Err(GateRejection::NotNearKeyLevel);
    }

    // G3 — volume spike.
    if inputs.tick_volume < 1.2 * inputs.average_volume_20 {
        return Err(GateRejection::VolumeNotSpiking);
    }

    Ok(SignalCandidate {
        direction: inputs.direction,
        entry_price: inputs.price,
        ultra_momentum: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_levels::{KeyLevel, KeyLevelKind};
    use crate::types::Direction;

    fn base_inputs() -> BreakoutGateInputs {
        BreakoutGateInputs {
            direction: Direction::Buy,
            price: 1.1050,
            atr_current: 0.0010,
            inside_bar: false,
            narrowest_range_of_7: false,
            atr_expansion_ratio: 0.5,
            atr_expansion_threshold: 1.2,
            candle_open: 1.1040,
            candle_close: 1.1050,
            nearest_key_level: Some(KeyLevel { price: 1.1048, strength: 0.8, kind: KeyLevelKind::Resistance, touch_count: 3, last_touch_timestamp: 1_700_000_000 }),
            timeframe_proximity_k: 1.0,
            tick_volume: 150.0,
            average_volume_20: 100.0,
            min_key_level_strength: 0.7,
        }
    }

    #[test]
    fn pattern_absent_rejects() {
        let inputs = base_inputs();
        assert_eq!(evaluate(&inputs), Err(GateRejection::PatternAbsent));
    }

    #[test]
    fn inside_bar_pattern_with_proximity_and_volume_passes() {
        let mut inputs = base_inputs();
        inputs.inside_bar = true;
        assert!(evaluate(&inputs).is_ok());
    }

    #[test]
    fn not_near_key_level_rejects() {
        let mut inputs = base_inputs();
        inputs.inside_bar = true;
        inputs.nearest_key_level = Some(KeyLevel { price: 1.1200, strength: 0.9, kind: KeyLevelKind::Resistance, touch_count: 3, last_touch_timestamp: 1_700_000_000 });
        assert_eq!(evaluate(&inputs), Err(GateRejection::NotNearKeyLevel));
    }

    #[test]
    fn weak_key_level_rejects() {
        let mut inputs = base_inputs();
        inputs.inside_bar = true;
        inputs.nearest_key_level = Some(KeyLevel { price: 1.1048, strength: 0.5, kind: KeyLevelKind::Resistance, touch_count: 3, last_touch_timestamp: 1_700_000_000 });
        assert_eq!(evaluate(&inputs), Err(GateRejection::NotNearKeyLevel));
    }

    #[test]
    fn volume_not_spiking_rejects() {
        let mut inputs = base_inputs();
        inputs.inside_bar = true;
        inputs.tick_volume = 90.0;
        assert_eq!(evaluate(&inputs), Err(GateRejection::VolumeNotSpiking));
    }

    #[test]
    fn ultra_momentum_surge_bypasses_proximity_and_volume() {
        let mut inputs = base_inputs();
        inputs.candle_open = 1.1000;
        inputs.candle_close = 1.1040; // 0.0040 = 4x ATR > 3x
        inputs.nearest_key_level = None;
        inputs.tick_volume = 10.0;
        let candidate = evaluate(&inputs).unwrap();
        assert!(candidate.ultra_momentum);
    }

    #[test]
    fn moderate_momentum_surge_still_requires_proximity_and_volume() {
        let mut inputs = base_inputs();
        inputs.candle_open = 1.1030;
        inputs.candle_close = 1.1050; // 0.0020 = 2x ATR, > 1.5x but < 3x
        inputs.nearest_key_level = None;
        let candidate = evaluate(&inputs);
        assert_eq!(candidate, Err(GateRejection::NotNearKeyLevel));
    }
}
