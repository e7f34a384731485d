// =============================================================================
// Event Loop (spec §4.9)
// =============================================================================
//
// Composes every subsystem as an explicit field; no process-wide singletons
// (Design Note 1 / REDESIGN FLAGS). Two entry points: `on_tick`, frequent and
// cheap, only records the latest market snapshot; `on_timer`, coarse, runs
// the full management + signal-evaluation cycle in the strict 8-step order
// below with no interleaving. Grounded on the teacher's `app_state.rs::AppState`
// god-object composition, minus its dashboard/UI fields, per Design Note 1 and
// REDESIGN FLAGS item 1 ("compose as explicit dependencies, avoid globals").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::decision::{Decision, DecisionRecord, DecisionSink};
use crate::errors::{GateRejection, LoopError, RiskError};
use crate::execution::{Broker, Dispatcher};
use crate::gates::{
    self, timeframe_proximity_k, BreakoutGateInputs, GateConfig, RangeGateInputs, SignalCandidate,
    TrendGateInputs,
};
use crate::indicator_provider::{Indicator, IndicatorCache, IndicatorKey, IndicatorProvider};
use crate::key_levels::{nearest_opposing_pair, KeyLevel, KeyLevelProvider};
use crate::order::{compute_stops, normalize_stops, OrderIntent, StopInputs};
use crate::position_manager::{ExitSignals, ManagerAction, PositionManager};
use crate::regime::{RegimeClassifier, RegimeInputs, RegimeLabel, RegimeSnapshot};
use crate::risk::{RiskBudget, RiskPercentages};
use crate::scaling::{RangeWindow, ScalingController};
use crate::sentiment::SentimentReader;
use crate::sizing::size_position;
use crate::types::{Direction, OrderKind, Ticket};

/// Timeframe assignment used throughout the loop. The spec leaves the exact
/// timeframe-to-role mapping to the implementer; this engine fixes primary =
/// H1, secondary = H4, tertiary = D1, chart = M15 (DESIGN.md open-question
/// decision).
pub mod timeframes {
    use crate::types::Timeframe;
    pub const PRIMARY: Timeframe = Timeframe::H1;
    pub const SECONDARY: Timeframe = Timeframe::H4;
    pub const TERTIARY: Timeframe = Timeframe::D1;
    pub const CHART: Timeframe = Timeframe::M15;
}

/// How long a rejected cascade is suppressed from re-evaluation when regime
/// and direction are unchanged (spec §4.9 "Throttles"). Not part of
/// `EngineConfig`'s enumerated option groups (§6); a loop-internal tuning
/// constant, documented in DESIGN.md.
const CASCADE_THROTTLE: Duration = Duration::from_secs(30);

/// Frequent, cheap input: the latest market tick. `on_tick` only stores this
/// for the next timer cycle to consume (spec §4.9: "tick handler only
/// performs market-data collection for the external store").
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
}

/// Ambient per-cycle inputs the gate cascades need beyond what
/// `IndicatorProvider` supplies as a plain `(indicator, timeframe) -> value`
/// table: pattern detection, trend-oracle, and volume signals. These are
/// modeled as a consumed snapshot supplied by the ambient binary's
/// market-data layer, the same way `IndicatorProvider`/`KeyLevelProvider`
/// are consumed rather than computed by this core.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketSnapshot {
    pub trend_follower_bullish: Option<bool>,
    pub inside_bar: bool,
    pub narrowest_range_of_7: bool,
    pub atr_expansion_ratio: f64,
    pub atr_expansion_threshold: f64,
    pub candle_open: f64,
    pub candle_close: f64,
    pub candle_range_atr_mult: f64,
    pub tick_volume: f64,
    pub average_volume_20: f64,
    pub small_consecutive_candles: bool,
    pub rejection_wick: bool,
    pub rsi_divergence: bool,
    pub ultra_momentum_timeout: bool,
    pub spread: f64,
}

pub struct EventLoop {
    indicators: Arc<dyn IndicatorProvider>,
    classifier: Arc<RegimeClassifier>,
    risk: RiskBudget,
    risk_pcts: RiskPercentages,
    manager: PositionManager,
    scaling: ScalingController,
    dispatcher: Dispatcher,
    broker: Arc<dyn Broker>,
    key_levels: Arc<dyn KeyLevelProvider>,
    sentiment: Option<Arc<dyn SentimentReader>>,
    decision_sink: Arc<dyn DecisionSink>,
    cache: IndicatorCache,
    cfg: EngineConfig,
    gate_cfg: GateConfig,

    last_tick: Option<Tick>,
    last_market: MarketSnapshot,
    last_regime_update: Option<Instant>,
    last_key_level_update: Option<Instant>,
    cached_key_levels: Vec<KeyLevel>,
    cascade_throttle: HashMap<(RegimeLabel, Direction), Instant>,
}

impl EventLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        indicators: Arc<dyn IndicatorProvider>,
        classifier: Arc<RegimeClassifier>,
        risk: RiskBudget,
        risk_pcts: RiskPercentages,
        manager: PositionManager,
        scaling: ScalingController,
        dispatcher: Dispatcher,
        broker: Arc<dyn Broker>,
        key_levels: Arc<dyn KeyLevelProvider>,
        sentiment: Option<Arc<dyn SentimentReader>>,
        decision_sink: Arc<dyn DecisionSink>,
        cfg: EngineConfig,
        gate_cfg: GateConfig,
    ) -> Self {
        Self {
            indicators,
            classifier,
            risk,
            risk_pcts,
            manager,
            scaling,
            dispatcher,
            broker,
            key_levels,
            sentiment,
            decision_sink,
            cache: IndicatorCache::new(),
            cfg,
            gate_cfg,
            last_tick: None,
            last_market: MarketSnapshot::default(),
            last_regime_update: None,
            last_key_level_update: None,
            cached_key_levels: Vec::new(),
            cascade_throttle: HashMap::new(),
        }
    }

    /// Frequent, minimal-work handler: record the latest tick and market
    /// snapshot for the next timer cycle. No decisions are made here.
    pub fn on_tick(&mut self, tick: Tick, market: MarketSnapshot) {
        self.last_tick = Some(tick);
        self.last_market = market;
    }

    /// Coarse timer handler running the strict 8-step cycle of spec §4.9.
    /// `account_equity` is supplied by the ambient caller (account balance is
    /// not part of the `Broker` abstraction's enumerated operations, §6).
    pub fn on_timer(&mut self, now: Instant, timestamp_secs: i64, account_equity: f64) -> Result<(), LoopError> {
        // 1. Refresh IndicatorCache for this cycle.
        self.refresh_cache();

        // 2. Invoke Position Manager.
        self.run_position_manager();

        // 3. Update Scaling Controller's range window if due.
        self.maybe_update_scaling_range();

        // 4. Regime snapshot + ExecuteTradeLogic, if the interval elapsed.
        if self.interval_elapsed(self.last_regime_update, now, self.cfg.intervals.regime_update_sec) {
            self.last_regime_update = Some(now);
            if let Some(snapshot) = self.update_regime(timestamp_secs) {
                self.execute_trade_logic(now, &snapshot, account_equity)?;
            }
        }

        // 5. Refresh key levels if due.
        if self.interval_elapsed(self.last_key_level_update, now, self.cfg.intervals.key_level_update_sec) {
            self.last_key_level_update = Some(now);
            self.cached_key_levels = self.key_levels.levels();
        }

        // 6. Triangle cascade: a third signal source, out of this core's
        // module list (§2 system overview); left as a no-op extension point.
        // 7. Calendar/sentiment refresh: ingestion pipeline is an explicit
        // non-goal (§1); the sentiment reader is polled inline by the gate
        // cascades instead of refreshed here.
        // 8. Display overlays: UI rendering is an explicit non-goal (§1).

        Ok(())
    }

    fn interval_elapsed(&self, last: Option<Instant>, now: Instant, interval_secs: u64) -> bool {
        match last {
            None => true,
            Some(t) => now.duration_since(t) >= Duration::from_secs(interval_secs),
        }
    }

    fn refresh_cache(&mut self) {
        use timeframes::*;
        let keys = [
            IndicatorKey { indicator: Indicator::Adx, timeframe: PRIMARY },
            IndicatorKey { indicator: Indicator::PlusDi, timeframe: PRIMARY },
            IndicatorKey { indicator: Indicator::MinusDi, timeframe: PRIMARY },
            IndicatorKey { indicator: Indicator::Atr, timeframe: PRIMARY },
            IndicatorKey { indicator: Indicator::AtrAverage, timeframe: PRIMARY },
            IndicatorKey { indicator: Indicator::Adx, timeframe: SECONDARY },
            IndicatorKey { indicator: Indicator::Adx, timeframe: TERTIARY },
            IndicatorKey { indicator: Indicator::Rsi, timeframe: SECONDARY },
            IndicatorKey { indicator: Indicator::Rsi, timeframe: TERTIARY },
            IndicatorKey { indicator: Indicator::Rsi, timeframe: CHART },
            IndicatorKey { indicator: Indicator::Ema(20), timeframe: CHART },
            IndicatorKey { indicator: Indicator::Ema(50), timeframe: PRIMARY },
            IndicatorKey { indicator: Indicator::Ema(200), timeframe: PRIMARY },
            IndicatorKey { indicator: Indicator::Ema(50), timeframe: SECONDARY },
            IndicatorKey { indicator: Indicator::Ema(200), timeframe: SECONDARY },
            IndicatorKey { indicator: Indicator::StochK, timeframe: CHART },
            IndicatorKey { indicator: Indicator::StochD, timeframe: CHART },
        ];
        self.cache.refresh(self.indicators.as_ref(), &keys);
    }

    fn run_position_manager(&mut self) {
        use timeframes::*;
        let atr_current = self.cache.get(Indicator::Atr, PRIMARY).unwrap_or(0.0);
        let min_stop_distance = self.broker.symbol_info().min_stop_distance;
        let adoption_actions = self.manager.sync_from_broker(self.broker.as_ref(), atr_current, min_stop_distance);
        for action in &adoption_actions {
            info!(?action, "position manager: adoption");
        }

        let Some(tick) = self.last_tick else { return };
        let point = self.broker.symbol_info().point;
        let signals = ExitSignals {
            current_price: (tick.bid + tick.ask) / 2.0,
            atr_current,
            atr_10bar_avg: self.cache.get(Indicator::AtrAverage, PRIMARY).unwrap_or(atr_current),
            rsi_chart: self.cache.get(Indicator::Rsi, CHART).unwrap_or(50.0),
            rsi_secondary: self.cache.get(Indicator::Rsi, SECONDARY).unwrap_or(50.0),
            small_consecutive_candles: self.last_market.small_consecutive_candles,
            rejection_wick: self.last_market.rejection_wick,
            rsi_divergence: self.last_market.rsi_divergence,
            ultra_momentum_timeout: self.last_market.ultra_momentum_timeout,
            pip_size: point * 10.0,
        };

        let actions = self.manager.run_cycle(self.broker.as_ref(), &signals);
        for action in &actions {
            match action {
                ManagerAction::ExitBlocked(ticket) => warn!(%ticket, "position manager: exit blocked"),
                _ => info!(?action, "position manager: cycle action"),
            }
        }
    }

    fn maybe_update_scaling_range(&mut self) {
        use timeframes::*;
        // No dedicated interval in EngineConfig's Intervals group for the
        // range window; reuses the key-level-update cadence (DESIGN.md
        // open-question decision: both describe "how often support/resistance
        // structure is refreshed").
        let atr = self.cache.get(Indicator::Atr, PRIMARY).unwrap_or(0.0);
        if atr <= 0.0 {
            return;
        }
        if let Some(tick) = self.last_tick {
            let mid = (tick.bid + tick.ask) / 2.0;
            let window = RangeWindow::from_bounds(
                mid + self.cfg.scaling.range_buffer * 10.0,
                mid - self.cfg.scaling.range_buffer * 10.0,
                self.cfg.scaling.min_range_size,
            );
            self.scaling.update_range(window);
        }
    }

    fn update_regime(&mut self, timestamp_secs: i64) -> Option<RegimeSnapshot> {
        use timeframes::*;
        let inputs = match (
            self.cache.get(Indicator::Adx, PRIMARY),
            self.cache.get(Indicator::Adx, SECONDARY),
            self.cache.get(Indicator::Adx, TERTIARY),
            self.cache.get(Indicator::PlusDi, PRIMARY),
            self.cache.get(Indicator::MinusDi, PRIMARY),
            self.cache.get(Indicator::Atr, PRIMARY),
            self.cache.get(Indicator::AtrAverage, PRIMARY),
        ) {
            (Some(adx_primary), Some(adx_secondary), Some(adx_tertiary), Some(plus_di), Some(minus_di), Some(atr_current), Some(atr_avg)) => {
                RegimeInputs { adx_primary, adx_secondary, adx_tertiary, plus_di, minus_di, atr_current, atr_avg }
            }
            _ => {
                debug!("regime update skipped: indicator data not ready");
                return None;
            }
        };

        match self.classifier.update(Some(inputs), timestamp_secs) {
            Ok(changed) => {
                let snapshot = self.classifier.current()?;
                if changed {
                    info!(label = %snapshot.label, confidence = snapshot.confidence, "regime changed");
                }
                Some(snapshot)
            }
            Err(_) => None,
        }
    }

    fn execute_trade_logic(&mut self, now: Instant, snapshot: &RegimeSnapshot, account_equity: f64) -> Result<(), LoopError> {
        let directions = match snapshot.label {
            RegimeLabel::TrendBull => vec![Direction::Buy],
            RegimeLabel::TrendBear => vec![Direction::Sell],
            RegimeLabel::BreakoutSetup | RegimeLabel::Ranging => vec![Direction::Buy, Direction::Sell],
            RegimeLabel::HighVolatility => Vec::new(),
        };

        for direction in directions {
            if let Some(last_rejected) = self.cascade_throttle.get(&(snapshot.label, direction)) {
                if now.duration_since(*last_rejected) < CASCADE_THROTTLE {
                    continue;
                }
            }

            let candidate = self.evaluate_cascade(snapshot.label, direction);
            let decision = match &candidate {
                Ok(_) => Decision::Passed,
                Err(rejection) => {
                    self.cascade_throttle.insert((snapshot.label, direction), now);
                    Decision::Rejected(*rejection)
                }
            };

            let sentiment_signal = self.sentiment.as_ref().and_then(|s| s.signal());
            self.decision_sink.record(DecisionRecord {
                timestamp_secs: snapshot.timestamp_secs,
                direction,
                regime: snapshot.label,
                decision,
                account_equity,
                open_position_count: self.manager.count_open(),
                sentiment_label: sentiment_signal.map(|s| format!("{:?}", s.label)),
                sentiment_confidence: sentiment_signal.map(|s| s.confidence),
            });

            if let Ok(candidate) = candidate {
                self.cascade_throttle.remove(&(snapshot.label, direction));
                if let Err(e) = self.place_order(snapshot.label, candidate, account_equity) {
                    warn!(error = %e, "trade logic: order placement failed");
                }
            }
        }

        Ok(())
    }

    fn evaluate_cascade(&self, label: RegimeLabel, direction: Direction) -> Result<SignalCandidate, GateRejection> {
        match label {
            RegimeLabel::TrendBull | RegimeLabel::TrendBear => {
                let inputs = self.build_trend_inputs(direction).ok_or(GateRejection::DataNotReady)?;
                gates::trend::evaluate(&inputs, &self.gate_cfg)
            }
            RegimeLabel::BreakoutSetup => {
                let inputs = self.build_breakout_inputs(direction).ok_or(GateRejection::DataNotReady)?;
                gates::breakout::evaluate(&inputs)
            }
            RegimeLabel::Ranging => {
                let inputs = self.build_range_inputs().ok_or(GateRejection::DataNotReady)?;
                gates::range::evaluate(&inputs)
            }
            RegimeLabel::HighVolatility => Err(GateRejection::DataNotReady),
        }
    }

    fn build_trend_inputs(&self, direction: Direction) -> Option<TrendGateInputs> {
        use timeframes::*;
        let tick = self.last_tick?;
        Some(TrendGateInputs {
            direction,
            trend_follower_bullish: self.last_market.trend_follower_bullish,
            adx_primary: self.cache.get(Indicator::Adx, PRIMARY)?,
            adx_secondary: self.cache.get(Indicator::Adx, SECONDARY)?,
            ema50_primary: self.cache.get(Indicator::Ema(50), PRIMARY)?,
            ema200_primary: self.cache.get(Indicator::Ema(200), PRIMARY)?,
            ema50_secondary: self.cache.get(Indicator::Ema(50), SECONDARY)?,
            ema200_secondary: self.cache.get(Indicator::Ema(200), SECONDARY)?,
            ema20_chart: self.cache.get(Indicator::Ema(20), CHART)?,
            price: (tick.bid + tick.ask) / 2.0,
            atr_current: self.cache.get(Indicator::Atr, PRIMARY)?,
            rsi_secondary: self.cache.get(Indicator::Rsi, SECONDARY)?,
            rsi_tertiary: self.cache.get(Indicator::Rsi, TERTIARY),
            rsi_chart: self.cache.get(Indicator::Rsi, CHART)?,
            sentiment: self.sentiment.as_ref().and_then(|s| s.signal()),
        })
    }

    fn build_breakout_inputs(&self, direction: Direction) -> Option<BreakoutGateInputs> {
        use timeframes::*;
        let tick = self.last_tick?;
        Some(BreakoutGateInputs {
            direction,
            price: (tick.bid + tick.ask) / 2.0,
            atr_current: self.cache.get(Indicator::Atr, PRIMARY)?,
            inside_bar: self.last_market.inside_bar,
            narrowest_range_of_7: self.last_market.narrowest_range_of_7,
            atr_expansion_ratio: self.last_market.atr_expansion_ratio,
            atr_expansion_threshold: self.last_market.atr_expansion_threshold,
            candle_open: self.last_market.candle_open,
            candle_close: self.last_market.candle_close,
            nearest_key_level: self.key_levels.strongest_level(),
            timeframe_proximity_k: timeframe_proximity_k(PRIMARY),
            tick_volume: self.last_market.tick_volume,
            average_volume_20: self.last_market.average_volume_20,
            min_key_level_strength: self.gate_cfg.min_key_level_strength,
        })
    }

    fn build_range_inputs(&self) -> Option<RangeGateInputs> {
        use timeframes::*;
        let tick = self.last_tick?;
        let price = (tick.bid + tick.ask) / 2.0;
        let (support, resistance) = nearest_opposing_pair(&self.cached_key_levels, price)
            .map(|(s, r)| (Some(s), Some(r)))
            .unwrap_or((None, None));
        let stoch_k_prev = self.indicators.value(Indicator::StochK, CHART, 1).unwrap_or(50.0);
        Some(RangeGateInputs {
            price,
            spread: self.last_market.spread,
            adx_primary: self.cache.get(Indicator::Adx, PRIMARY)?,
            support,
            resistance,
            stoch_k: self.cache.get(Indicator::StochK, CHART)?,
            stoch_k_prev,
        })
    }

    fn place_order(&mut self, label: RegimeLabel, candidate: SignalCandidate, account_equity: f64) -> Result<Ticket, LoopError> {
        use timeframes::*;

        let symbol = self.broker.symbol_info();
        let open_positions = self.manager.count_open();

        self.risk.check_entry(account_equity, open_positions)?;

        let risk_percent = self.risk.risk_percent(label, &self.risk_pcts);

        let entry_number = open_positions + 1;
        if !self.scaling.allow_entry(entry_number, candidate.direction, candidate.entry_price) {
            return Err(LoopError::Manager(crate::errors::ManagerError::SubsystemSuspended));
        }

        let atr_current = self.cache.get(Indicator::Atr, PRIMARY).unwrap_or(0.0);
        let candle_range_atr_mult = self.last_market.candle_range_atr_mult;
        let stop_inputs = StopInputs {
            direction: candidate.direction,
            entry_price: candidate.entry_price,
            atr_current,
            sl_atr_mult: self.cfg.stops.sl_atr_mult,
            candle_range_atr_mult,
            nearest_key_level: self.key_levels.strongest_level(),
            min_key_level_strength: 0.7,
            point: symbol.point,
        };
        let stops = compute_stops(&stop_inputs).map_err(|_| {
            LoopError::Manager(crate::errors::ManagerError::SubsystemSuspended)
        })?;

        let stop_distance = (candidate.entry_price - stops.stop_loss).abs();
        let volume = size_position(stop_distance, risk_percent, account_equity, &symbol).map_err(|_| {
            LoopError::Manager(crate::errors::ManagerError::SubsystemSuspended)
        })?;

        let kind = if candidate.ultra_momentum {
            OrderKind::Market
        } else if candidate.direction == Direction::Buy {
            OrderKind::BuyStop
        } else {
            OrderKind::SellStop
        };

        let intent = OrderIntent {
            direction: candidate.direction,
            kind,
            entry_price: candidate.entry_price,
            stop_loss: stops.stop_loss,
            take_profit: stops.take_profit,
            volume,
        };
        let tick = self.last_tick.unwrap_or(Tick { bid: candidate.entry_price, ask: candidate.entry_price });
        let normalized = normalize_stops(intent, &symbol, tick.bid, tick.ask).map_err(|_| {
            LoopError::Manager(crate::errors::ManagerError::SubsystemSuspended)
        })?;

        let comment = format!("{label}:{:?}", candidate.direction);
        let broker = Arc::clone(&self.broker);
        let activity = if kind == OrderKind::Market { "open_market" } else { "open_pending" };
        let ticket = self.dispatcher.dispatch(activity, Instant::now(), || {
            if kind == OrderKind::Market {
                broker.open_market(normalized.direction, normalized.volume, normalized.stop_loss, normalized.take_profit, &comment)
            } else {
                broker.open_pending(&normalized, &comment)
            }
        })?;

        info!(%ticket, direction = ?candidate.direction, regime = %label, "order placed");
        Ok(ticket)
    }
}

impl From<RiskError> for LoopError {
    fn from(_: RiskError) -> Self {
        LoopError::Manager(crate::errors::ManagerError::SubsystemSuspended)
    }
}
