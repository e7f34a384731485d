// =============================================================================
// Scaling Controller (spec §4.8)
// =============================================================================
//
// Maintains a recent-range window over the last N bars of a short
// timeframe and decides whether another entry into an existing position may
// be added. Entry #1 is always allowed; #2 requires price near the adverse
// side of the range (upper for longs, lower for shorts) to enforce
// averaging into a worse, not better, price; #3 requires price at the most
// adverse side; beyond the configured max entries, always denied.

use parking_lot::RwLock;

use crate::types::Direction;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeWindow {
    pub upper: f64,
    pub lower: f64,
    pub size: f64,
    pub valid: bool,
}

impl RangeWindow {
    pub fn from_bounds(upper: f64, lower: f64, min_size: f64) -> Self {
        let size = (upper - lower).abs();
        Self { upper, lower, size, valid: size >= min_size }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScalingConfig {
    pub enabled: bool,
    pub max_entries: u32,
    /// Fraction of the range width, from the adverse boundary inward, that
    /// counts as "near" that boundary for entry #2.
    pub adverse_proximity_fraction: f64,
    /// Fraction of the range width, from the adverse boundary inward, that
    /// counts as "at the most adverse side" for entry #3.
    pub most_adverse_proximity_fraction: f64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 3,
            adverse_proximity_fraction: 0.35,
            most_adverse_proximity_fraction: 0.15,
        }
    }
}

pub struct ScalingController {
    range: RwLock<RangeWindow>,
    cfg: ScalingConfig,
}

impl ScalingController {
    pub fn new(cfg: ScalingConfig, initial_range: RangeWindow) -> Self {
        Self { range: RwLock::new(initial_range), cfg }
    }

    pub fn update_range(&self, range: RangeWindow) {
        *self.range.write() = range;
    }

    pub fn current_range(&self) -> RangeWindow {
        *self.range.read()
    }

    /// `entry_number` is 1-based: 1 for the position's first fill, 2 for the
    /// first add, and so on.
    pub fn allow_entry(&self, entry_number: u32, direction: Direction, price: f64) -> bool {
        if !self.cfg.enabled {
            return entry_number == 1;
        }
        if entry_number == 1 {
            return true;
        }
        if entry_number > self.cfg.max_entries {
            return false;
        }

        let range = self.current_range();
        if !range.valid {
            return false;
        }

        // Adverse side: upper bound for longs (buying higher is worse),
        // lower bound for shorts.
        let adverse_bound = if direction.is_long() { range.upper } else { range.lower };
        let distance_from_adverse = (adverse_bound - price).abs();
        let proximity_fraction = if entry_number == 2 {
            self.cfg.adverse_proximity_fraction
        } else {
            self.cfg.most_adverse_proximity_fraction
        };

        distance_from_adverse <= proximity_fraction * range.size
    }
}
