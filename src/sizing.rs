// =============================================================================
// Position Sizer (spec §4.4)
// =============================================================================
//
// Pure function: given a stop distance and a risk percentage, returns a
// volume that risks exactly `risk_percent * account_equity / 100` at the
// stop, rounded down to the broker's volume step, rejecting results below
// the broker minimum.

use crate::errors::SizingError;
use crate::types::SymbolInfo;

/// Size a position so that hitting the stop loses exactly `risk_percent`% of
/// `account_equity`. `stop_distance_price` is the distance in price units
/// between entry and stop; `symbol` carries the broker's tick value and
/// volume constraints.
pub fn size_position(
    stop_distance_price: f64,
    risk_percent: f64,
    account_equity: f64,
    symbol: &SymbolInfo,
) -> Result<f64, SizingError> {
    if stop_distance_price <= 0.0 {
        return Err(SizingError::NonPositiveStopDistance);
    }

    let risk_amount = risk_percent * account_equity / 100.0;
    let stop_distance_ticks = stop_distance_price / symbol.tick_size;
    let loss_per_unit_volume = stop_distance_ticks * symbol.tick_value;

    let raw_volume = if loss_per_unit_volume > 0.0 {
        risk_amount / loss_per_unit_volume
    } else {
        0.0
    };

    let rounded = symbol.round_volume_down(raw_volume);
    if rounded < symbol.min_volume {
        return Err(SizingError::BelowMinimumVolume { rounded, min_volume: symbol.min_volume });
    }

    Ok(rounded)
}
