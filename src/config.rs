// =============================================================================
// Engine Configuration — hot-reloadable tunables with atomic save (spec §6)
// =============================================================================
//
// Six option groups (Regime, Risk, Stops, RSI, Scaling, Intervals), each a
// serde-defaulted sub-struct composed into `EngineConfig`. Persistence uses
// the teacher's atomic tmp-then-rename pattern so a crash mid-write never
// corrupts the file on disk. Every field carries a `#[serde(default = "...")]`
// so an older config file missing new fields still loads.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::TradingMode;

// ---------------------------------------------------------------------------
// Default-value helpers
// ---------------------------------------------------------------------------

fn default_adx_trend_threshold() -> f64 { 25.0 }
fn default_adx_breakout_min() -> f64 { 20.0 }
fn default_atr_period() -> usize { 14 }
fn default_atr_avg_period() -> usize { 20 }
fn default_high_vol_multiplier() -> f64 { 1.5 }

fn default_risk_pct_trend() -> f64 { 2.5 }
fn default_risk_pct_range() -> f64 { 1.0 }
fn default_risk_pct_breakout() -> f64 { 1.5 }
fn default_max_risk_per_trade() -> f64 { 3.0 }
fn default_max_drawdown_pct() -> f64 { 10.0 }
fn default_equity_peak_reset() -> f64 { 0.5 }
fn default_max_positions() -> u32 { 3 }

fn default_sl_atr_mult() -> f64 { 1.0 }
fn default_tp_reward_ratio() -> f64 { 2.0 }
fn default_breakeven_atr() -> f64 { 1.0 }
fn default_partial_close_atr() -> f64 { 1.0 }
fn default_breakeven_buffer() -> f64 { 0.00005 }
fn default_trailing_atr_mult() -> f64 { 0.7 }
fn default_min_modify_pips() -> f64 { 2.0 }
fn default_min_modify_atr_fraction() -> f64 { 0.1 }
fn default_min_modify_cooldown_sec() -> u64 { 30 }
fn default_min_stop_distance_mult() -> f64 { 1.0 }

fn default_true() -> bool { true }
fn default_secondary_ob() -> f64 { 68.0 }
fn default_secondary_os() -> f64 { 32.0 }
fn default_tertiary_ob() -> f64 { 68.0 }
fn default_tertiary_os() -> f64 { 32.0 }
fn default_overbought_exit() -> f64 { 70.0 }
fn default_oversold_exit() -> f64 { 30.0 }
fn default_partial_close_fraction() -> f64 { 0.5 }
fn default_rsi_cooldown_sec() -> u64 { 900 }
fn default_min_profit_pips() -> f64 { 10.0 }

fn default_range_periods() -> usize { 20 }
fn default_range_buffer() -> f64 { 0.0002 }
fn default_min_range_size() -> f64 { 0.0010 }

fn default_regime_update_sec() -> u64 { 5 }
fn default_key_level_update_sec() -> u64 { 60 }
fn default_risk_update_sec() -> u64 { 10 }
fn default_calendar_update_min() -> u64 { 30 }

// ---------------------------------------------------------------------------
// Option groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeOptions {
    #[serde(default = "default_adx_trend_threshold")]
    pub adx_trend_threshold: f64,
    #[serde(default = "default_adx_breakout_min")]
    pub adx_breakout_min: f64,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_atr_avg_period")]
    pub atr_avg_period: usize,
    #[serde(default = "default_high_vol_multiplier")]
    pub high_vol_multiplier: f64,
}

impl Default for RegimeOptions {
    fn default() -> Self {
        Self {
            adx_trend_threshold: default_adx_trend_threshold(),
            adx_breakout_min: default_adx_breakout_min(),
            atr_period: default_atr_period(),
            atr_avg_period: default_atr_avg_period(),
            high_vol_multiplier: default_high_vol_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskOptions {
    #[serde(default = "default_risk_pct_trend")]
    pub risk_pct_trend: f64,
    #[serde(default = "default_risk_pct_range")]
    pub risk_pct_range: f64,
    #[serde(default = "default_risk_pct_breakout")]
    pub risk_pct_breakout: f64,
    #[serde(default = "default_max_risk_per_trade")]
    pub max_risk_per_trade: f64,
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,
    #[serde(default = "default_equity_peak_reset")]
    pub equity_peak_reset: f64,
    #[serde(default = "default_max_positions")]
    pub max_positions: u32,
}

impl Default for RiskOptions {
    fn default() -> Self {
        Self {
            risk_pct_trend: default_risk_pct_trend(),
            risk_pct_range: default_risk_pct_range(),
            risk_pct_breakout: default_risk_pct_breakout(),
            max_risk_per_trade: default_max_risk_per_trade(),
            max_drawdown_pct: default_max_drawdown_pct(),
            equity_peak_reset: default_equity_peak_reset(),
            max_positions: default_max_positions(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopsOptions {
    #[serde(default = "default_sl_atr_mult")]
    pub sl_atr_mult: f64,
    #[serde(default = "default_tp_reward_ratio")]
    pub tp_reward_ratio: f64,
    #[serde(default = "default_breakeven_atr")]
    pub breakeven_atr: f64,
    #[serde(default = "default_partial_close_atr")]
    pub partial_close_atr: f64,
    #[serde(default = "default_breakeven_buffer")]
    pub breakeven_buffer: f64,
    #[serde(default = "default_trailing_atr_mult")]
    pub trailing_atr_mult: f64,
    #[serde(default = "default_min_modify_pips")]
    pub min_modify_pips: f64,
    #[serde(default = "default_min_modify_atr_fraction")]
    pub min_modify_atr_fraction: f64,
    #[serde(default = "default_min_modify_cooldown_sec")]
    pub min_modify_cooldown_sec: u64,
    #[serde(default = "default_min_stop_distance_mult")]
    pub min_stop_distance_mult: f64,
}

impl Default for StopsOptions {
    fn default() -> Self {
        Self {
            sl_atr_mult: default_sl_atr_mult(),
            tp_reward_ratio: default_tp_reward_ratio(),
            breakeven_atr: default_breakeven_atr(),
            partial_close_atr: default_partial_close_atr(),
            breakeven_buffer: default_breakeven_buffer(),
            trailing_atr_mult: default_trailing_atr_mult(),
            min_modify_pips: default_min_modify_pips(),
            min_modify_atr_fraction: default_min_modify_atr_fraction(),
            min_modify_cooldown_sec: default_min_modify_cooldown_sec(),
            min_stop_distance_mult: default_min_stop_distance_mult(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RsiOptions {
    #[serde(default = "default_true")]
    pub enable_mtf_rsi: bool,
    #[serde(default = "default_secondary_ob")]
    pub secondary_overbought: f64,
    #[serde(default = "default_secondary_os")]
    pub secondary_oversold: f64,
    #[serde(default = "default_tertiary_ob")]
    pub tertiary_overbought: f64,
    #[serde(default = "default_tertiary_os")]
    pub tertiary_oversold: f64,
    #[serde(default = "default_true")]
    pub enable_rsi_exits: bool,
    #[serde(default = "default_overbought_exit")]
    pub overbought_exit: f64,
    #[serde(default = "default_oversold_exit")]
    pub oversold_exit: f64,
    #[serde(default = "default_partial_close_fraction")]
    pub partial_close_fraction: f64,
    #[serde(default = "default_rsi_cooldown_sec")]
    pub cooldown_sec: u64,
    #[serde(default = "default_min_profit_pips")]
    pub min_profit_pips: f64,
}

impl Default for RsiOptions {
    fn default() -> Self {
        Self {
            enable_mtf_rsi: default_true(),
            secondary_overbought: default_secondary_ob(),
            secondary_oversold: default_secondary_os(),
            tertiary_overbought: default_tertiary_ob(),
            tertiary_oversold: default_tertiary_os(),
            enable_rsi_exits: default_true(),
            overbought_exit: default_overbought_exit(),
            oversold_exit: default_oversold_exit(),
            partial_close_fraction: default_partial_close_fraction(),
            cooldown_sec: default_rsi_cooldown_sec(),
            min_profit_pips: default_min_profit_pips(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScalingOptions {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_range_periods")]
    pub range_periods: usize,
    #[serde(default = "default_range_buffer")]
    pub range_buffer: f64,
    #[serde(default = "default_max_positions")]
    pub max_positions: u32,
    #[serde(default = "default_min_range_size")]
    pub min_range_size: f64,
}

impl Default for ScalingOptions {
    fn default() -> Self {
        Self {
            enable: default_true(),
            range_periods: default_range_periods(),
            range_buffer: default_range_buffer(),
            max_positions: default_max_positions(),
            min_range_size: default_min_range_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntervalOptions {
    #[serde(default = "default_regime_update_sec")]
    pub regime_update_sec: u64,
    #[serde(default = "default_key_level_update_sec")]
    pub key_level_update_sec: u64,
    #[serde(default = "default_risk_update_sec")]
    pub risk_update_sec: u64,
    #[serde(default = "default_calendar_update_min")]
    pub calendar_update_min: u64,
}

impl Default for IntervalOptions {
    fn default() -> Self {
        Self {
            regime_update_sec: default_regime_update_sec(),
            key_level_update_sec: default_key_level_update_sec(),
            risk_update_sec: default_risk_update_sec(),
            calendar_update_min: default_calendar_update_min(),
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub trading_mode: TradingMode,
    #[serde(default)]
    pub regime: RegimeOptions,
    #[serde(default)]
    pub risk: RiskOptions,
    #[serde(default)]
    pub stops: StopsOptions,
    #[serde(default)]
    pub rsi: RsiOptions,
    #[serde(default)]
    pub scaling: ScalingOptions,
    #[serde(default)]
    pub intervals: IntervalOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::default(),
            regime: RegimeOptions::default(),
            risk: RiskOptions::default(),
            stops: StopsOptions::default(),
            rsi: RsiOptions::default(),
            scaling: ScalingOptions::default(),
            intervals: IntervalOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file, falling back to field-level defaults
    /// for anything the file omits.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;
        info!(path = %path.display(), trading_mode = %config.trading_mode, "engine config loaded");
        Ok(config)
    }

    /// Persist the configuration atomically (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).context("failed to serialize engine config")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.regime.adx_trend_threshold, 25.0);
        assert_eq!(cfg.risk.max_positions, 3);
        assert_eq!(cfg.stops.tp_reward_ratio, 2.0);
        assert!(cfg.rsi.enable_mtf_rsi);
        assert!(cfg.scaling.enable);
        assert_eq!(cfg.intervals.regime_update_sec, 5);
    }

    #[test]
    fn deserialize_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.regime.adx_breakout_min, 20.0);
    }

    #[test]
    fn deserialize_partial_json_fills_defaults() {
        let json = r#"{ "trading_mode": "Live", "risk": { "max_positions": 5 } }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Live);
        assert_eq!(cfg.risk.max_positions, 5);
        // Other risk fields still default.
        assert_eq!(cfg.risk.max_drawdown_pct, 10.0);
    }

    #[test]
    fn roundtrip_serialization() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.trading_mode, cfg2.trading_mode);
        assert_eq!(cfg.regime.adx_trend_threshold, cfg2.regime.adx_trend_threshold);
        assert_eq!(cfg.scaling.range_periods, cfg2.scaling.range_periods);
    }

    #[test]
    fn save_then_load_atomic_roundtrip() {
        let dir = std::env::temp_dir().join(format!("engine-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.json");

        let mut cfg = EngineConfig::default();
        cfg.risk.max_positions = 7;
        cfg.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.risk.max_positions, 7);

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }
}
