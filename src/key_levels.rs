// =============================================================================
// Key-level detector (consumed, spec §6)
// =============================================================================
//
// Supplies support/resistance levels the breakout and range cascades anchor
// to. The engine core never computes levels itself; it only consumes the
// trait below.

use serde::{Deserialize, Serialize};

/// Which side of price a level acts on (spec §3 Data Model).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum KeyLevelKind {
    Support,
    Resistance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyLevel {
    pub price: f64,
    pub strength: f64,
    pub kind: KeyLevelKind,
    /// Number of times price has touched and respected this level.
    pub touch_count: u32,
    /// Unix timestamp (seconds) of the most recent touch.
    pub last_touch_timestamp: i64,
}

pub trait KeyLevelProvider: Send + Sync {
    fn strongest_level(&self) -> Option<KeyLevel>;
    fn levels(&self) -> Vec<KeyLevel>;
    fn get(&self, index: usize) -> Option<KeyLevel>;
}

/// Fixed-table test double, used by unit tests and the ambient demo binary.
#[derive(Default, Clone)]
pub struct StaticKeyLevelProvider {
    levels: Vec<KeyLevel>,
}

impl StaticKeyLevelProvider {
    pub fn new(levels: Vec<KeyLevel>) -> Self {
        Self { levels }
    }
}

impl KeyLevelProvider for StaticKeyLevelProvider {
    fn strongest_level(&self) -> Option<KeyLevel> {
        self.levels
            .iter()
            .copied()
            .max_by(|a, b| a.strength.partial_cmp(&b.strength).unwrap_or(std::cmp::Ordering::Equal))
    }

    fn levels(&self) -> Vec<KeyLevel> {
        self.levels.clone()
    }

    fn get(&self, index: usize) -> Option<KeyLevel> {
        self.levels.get(index).copied()
    }
}

/// Find the nearest opposing pair of levels straddling `price` (spec §4.2
/// range cascade precondition: "a pair of opposing key levels defining a
/// range"). Returns `(support, resistance)` with `support < price < resistance`.
pub fn nearest_opposing_pair(levels: &[KeyLevel], price: f64) -> Option<(KeyLevel, KeyLevel)> {
    let support = levels
        .iter()
        .copied()
        .filter(|l| l.price < price)
        .max_by(|a, b| a.price.partial_cmp(&b.price).unwrap());
    let resistance = levels
        .iter()
        .copied()
        .filter(|l| l.price > price)
        .min_by(|a, b| a.price.partial_cmp(&b.price).unwrap());
    match (support, resistance) {
        (Some(s), Some(r)) => Some((s, r)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strongest_level_picks_max_strength() {
        let provider = StaticKeyLevelProvider::new(vec![
            KeyLevel { price: 1.1050, strength: 0.6, kind: KeyLevelKind::Resistance, touch_count: 2, last_touch_timestamp: 1_700_000_000 },
            KeyLevel { price: 1.1020, strength: 0.9, kind: KeyLevelKind::Support, touch_count: 4, last_touch_timestamp: 1_700_000_500 },
        ]);
        assert_eq!(
            provider.strongest_level(),
            Some(KeyLevel { price: 1.1020, strength: 0.9, kind: KeyLevelKind::Support, touch_count: 4, last_touch_timestamp: 1_700_000_500 })
        );
    }

    #[test]
    fn nearest_opposing_pair_straddles_price() {
        let levels = vec![
            KeyLevel { price: 1.1050, strength: 0.8, kind: KeyLevelKind::Resistance, touch_count: 3, last_touch_timestamp: 1_700_000_000 },
            KeyLevel { price: 1.1020, strength: 0.7, kind: KeyLevelKind::Support, touch_count: 2, last_touch_timestamp: 1_700_000_100 },
            KeyLevel { price: 1.1080, strength: 0.5, kind: KeyLevelKind::Resistance, touch_count: 1, last_touch_timestamp: 1_700_000_200 },
        ];
        let (support, resistance) = nearest_opposing_pair(&levels, 1.1035).unwrap();
        assert!((support.price - 1.1020).abs() < 1e-9);
        assert!((resistance.price - 1.1050).abs() < 1e-9);
    }

    #[test]
    fn nearest_opposing_pair_none_when_one_sided() {
        let levels = vec![KeyLevel { price: 1.1050, strength: 0.8, kind: KeyLevelKind::Resistance, touch_count: 3, last_touch_timestamp: 1_700_000_000 }];
        assert!(nearest_opposing_pair(&levels, 1.1035).is_none());
    }
}
