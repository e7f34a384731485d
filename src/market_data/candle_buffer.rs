// =============================================================================
// Candle storage — per (symbol, timeframe) ring buffer of OHLCV bars
// =============================================================================
//
// Pure, allocation-light storage; no network I/O. Market-data ingestion that
// populates this buffer is an external collaborator (spec §1) and lives
// outside the core.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::Timeframe;

/// A single OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub is_closed: bool,
}

/// Composite key that identifies a unique candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandleKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

/// Thread-safe ring buffer that stores the most recent candles per
/// `(symbol, timeframe)` pair. The live (unclosed) candle is continuously
/// updated in-place; when a candle closes it becomes permanent and the ring
/// is trimmed to `max_candles`.
pub struct CandleBuffer {
    buffers: RwLock<HashMap<CandleKey, VecDeque<Candle>>>,
    max_candles: usize,
}

impl CandleBuffer {
    /// Create a new buffer that retains at most `max_candles` closed candles
    /// per key, plus one in-progress candle.
    pub fn new(max_candles: usize) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            max_candles,
        }
    }

    /// Insert or replace the latest candle for the given key.
    pub fn update(&self, key: CandleKey, candle: Candle) {
        let mut map = self.buffers.write();
        let ring = map
            .entry(key)
            .or_insert_with(|| VecDeque::with_capacity(self.max_candles + 1));

        if candle.is_closed {
            if let Some(last) = ring.back() {
                if !last.is_closed && last.open_time == candle.open_time {
                    ring.pop_back();
                }
            }
            ring.push_back(candle);
            while ring.len() > self.max_candles {
                ring.pop_front();
            }
        } else {
            if let Some(last) = ring.back() {
                if !last.is_closed && last.open_time == candle.open_time {
                    ring.pop_back();
                }
            }
            ring.push_back(candle);
        }
    }

    /// Return the most recent `count` **closed** candles (oldest-first order).
    pub fn get_closed(&self, key: &CandleKey, count: usize) -> Vec<Candle> {
        let map = self.buffers.read();
        match map.get(key) {
            Some(ring) => {
                let closed: Vec<&Candle> = ring.iter().filter(|c| c.is_closed).collect();
                let start = closed.len().saturating_sub(count);
                closed[start..].iter().map(|c| **c).collect()
            }
            None => Vec::new(),
        }
    }

    /// Return the most recent `count` close prices from closed candles
    /// (oldest-first order).
    pub fn get_closes(&self, key: &CandleKey, count: usize) -> Vec<f64> {
        self.get_closed(key, count).iter().map(|c| c.close).collect()
    }

    /// Close price of the most recent closed candle, if any.
    pub fn last_close(&self, key: &CandleKey) -> Option<f64> {
        let map = self.buffers.read();
        map.get(key)
            .and_then(|ring| ring.iter().rev().find(|c| c.is_closed).map(|c| c.close))
    }

    /// Total number of candles (including any in-progress candle) stored for
    /// a key.
    pub fn count(&self, key: &CandleKey) -> usize {
        let map = self.buffers.read();
        map.get(key).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_time: i64, close: f64, is_closed: bool) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 60,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            is_closed,
        }
    }

    #[test]
    fn in_progress_candle_replaced_not_appended() {
        let buf = CandleBuffer::new(10);
        let key = CandleKey { symbol: "EURUSD".into(), timeframe: Timeframe::M1 };
        buf.update(key.clone(), candle(0, 1.1000, false));
        buf.update(key.clone(), candle(0, 1.1005, false));
        assert_eq!(buf.count(&key), 1);
        assert_eq!(buf.last_close(&key), None);
    }

    #[test]
    fn closed_candle_finalizes_and_trims() {
        let buf = CandleBuffer::new(3);
        let key = CandleKey { symbol: "EURUSD".into(), timeframe: Timeframe::M1 };
        for i in 0..5 {
            buf.update(key.clone(), candle(i * 60, 1.10 + i as f64 * 0.001, true));
        }
        assert_eq!(buf.get_closed(&key, 10).len(), 3);
        assert_eq!(buf.last_close(&key), Some(1.10 + 4.0 * 0.001));
    }

    #[test]
    fn get_closes_returns_oldest_first() {
        let buf = CandleBuffer::new(10);
        let key = CandleKey { symbol: "EURUSD".into(), timeframe: Timeframe::H1 };
        for i in 0..3 {
            buf.update(key.clone(), candle(i * 3600, 1.0 + i as f64, true));
        }
        assert_eq!(buf.get_closes(&key, 10), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn unknown_key_returns_empty() {
        let buf = CandleBuffer::new(10);
        let key = CandleKey { symbol: "XAUUSD".into(), timeframe: Timeframe::D1 };
        assert!(buf.get_closed(&key, 5).is_empty());
        assert_eq!(buf.count(&key), 0);
    }
}
