// =============================================================================
// Regime Engine — entry point
// =============================================================================
//
// Wires a concrete `Broker`/`IndicatorProvider`/`KeyLevelProvider` into an
// `EventLoop` and drives it on a timer. Everything that decides what to trade
// lives in the library; this binary is ambient plumbing only. Per spec §5,
// the loop's own steps are never spread across tasks — this is the one task
// that calls `on_tick`/`on_timer`, sequentially, forever.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use regime_engine::broker_mock::MockBroker;
use regime_engine::config::EngineConfig;
use regime_engine::decision::RecentDecisions;
use regime_engine::event_loop::{EventLoop, MarketSnapshot, Tick};
use regime_engine::execution::{Dispatcher, DispatcherConfig};
use regime_engine::gates::GateConfig;
use regime_engine::indicator_provider::MockIndicatorProvider;
use regime_engine::key_levels::StaticKeyLevelProvider;
use regime_engine::position_manager::{ManagerConfig, PositionManager};
use regime_engine::regime::{RegimeClassifier, RegimeThresholds};
use regime_engine::risk::{RiskBudget, RiskConfig, RiskPercentages};
use regime_engine::scaling::{RangeWindow, ScalingConfig, ScalingController};
use regime_engine::types::SymbolInfo;

const STARTING_EQUITY: f64 = 10_000.0;
const CONFIG_PATH: &str = "engine_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("regime engine starting");

    let cfg = match EngineConfig::load(CONFIG_PATH) {
        Ok(cfg) => cfg,
        Err(err) => {
            info!(%err, "no config at {CONFIG_PATH}, using defaults");
            EngineConfig::default()
        }
    };

    let symbol_info = SymbolInfo {
        digits: 5,
        point: 0.00001,
        tick_value: 1.0,
        tick_size: 0.00001,
        min_volume: 0.01,
        max_volume: 100.0,
        volume_step: 0.01,
        min_stop_distance: 0.0005,
    };

    let indicators = Arc::new(MockIndicatorProvider::new());
    let classifier = RegimeClassifier::new(RegimeThresholds {
        adx_trend_threshold: cfg.regime.adx_trend_threshold,
        adx_breakout_min: cfg.regime.adx_breakout_min,
        high_vol_multiplier: cfg.regime.high_vol_multiplier,
    });
    let risk = RiskBudget::new(
        RiskConfig {
            max_drawdown_pct: cfg.risk.max_drawdown_pct,
            max_positions: cfg.risk.max_positions,
            equity_peak_reset_pct: cfg.risk.equity_peak_reset,
        },
        STARTING_EQUITY,
    );
    let risk_pcts = RiskPercentages {
        trend_pct: cfg.risk.risk_pct_trend,
        range_pct: cfg.risk.risk_pct_range,
        breakout_pct: cfg.risk.risk_pct_breakout,
    };
    let manager = PositionManager::new(ManagerConfig {
        breakeven_atr_mult: cfg.stops.breakeven_atr,
        breakeven_buffer: cfg.stops.breakeven_buffer,
        trailing_start_atr_mult: cfg.stops.partial_close_atr,
        trailing_enabled: true,
        trail_atr_mult_momentum: cfg.stops.trailing_atr_mult,
        trail_atr_mult_ultra: cfg.stops.trailing_atr_mult * 0.8,
        trail_atr_mult_normal: cfg.stops.trailing_atr_mult,
        overbought_exit: cfg.rsi.overbought_exit,
        oversold_exit: cfg.rsi.oversold_exit,
        secondary_overbought: cfg.rsi.secondary_overbought,
        secondary_oversold: cfg.rsi.secondary_oversold,
        partial_close_fraction: cfg.rsi.partial_close_fraction,
        partial_close_fraction_momentum: (cfg.rsi.partial_close_fraction * 1.3).min(1.0),
        min_profit_pips: cfg.rsi.min_profit_pips,
        partial_cooldown: Duration::from_secs(cfg.rsi.cooldown_sec),
        sl_multiplier_adoption: cfg.stops.sl_atr_mult * 1.5,
        reward_ratio_adoption: cfg.stops.tp_reward_ratio,
    });
    let scaling = ScalingController::new(
        ScalingConfig {
            enabled: cfg.scaling.enable,
            max_entries: cfg.scaling.max_positions,
            adverse_proximity_fraction: 0.35,
            most_adverse_proximity_fraction: 0.15,
        },
        RangeWindow::from_bounds(1.1050, 1.1000, cfg.scaling.min_range_size),
    );
    let dispatcher = Dispatcher::new(DispatcherConfig::default());
    let broker = Arc::new(MockBroker::new(symbol_info));
    let key_levels = Arc::new(StaticKeyLevelProvider::default());
    let decision_sink = Arc::new(RecentDecisions::new(256));

    let mut event_loop = EventLoop::new(
        indicators,
        classifier,
        risk,
        risk_pcts,
        manager,
        scaling,
        dispatcher,
        broker,
        key_levels,
        None,
        decision_sink,
        cfg,
        GateConfig::default(),
    );

    let mut tick_interval = tokio::time::interval(Duration::from_secs(1));
    let mut timer_interval = tokio::time::interval(Duration::from_secs(5));
    let mut shutdown = Box::pin(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                event_loop.on_tick(Tick { bid: 1.1000, ask: 1.1002 }, MarketSnapshot::default());
            }
            _ = timer_interval.tick() => {
                let now = std::time::Instant::now();
                if let Err(err) = event_loop.on_timer(now, unix_now_secs(), STARTING_EQUITY) {
                    error!(%err, "event loop cycle failed");
                }
            }
            result = &mut shutdown => {
                if let Err(err) = result {
                    error!(%err, "failed to listen for shutdown signal");
                }
                info!("shutdown signal received, stopping");
                break;
            }
        }
    }

    Ok(())
}

/// Wall-clock seconds since the Unix epoch. The core never calls this
/// directly; only the ambient binary supplies real timestamps to `on_timer`.
fn unix_now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
