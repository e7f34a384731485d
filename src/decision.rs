// =============================================================================
// Decision Record — auditable record of every signal evaluation (spec §6
// "Observability outputs")
// =============================================================================
//
// One record per signal evaluation, pass or reject, carrying every
// indicator value consulted so a rejection can be replayed from the record
// alone. Grounded on the teacher's `decision_envelope.rs::DecisionEnvelope`
// auditable-record idiom, generalized from its fixed four-layer verdict
// shape to the spec's regime/gate/risk pipeline and given a typed
// `DecisionSink` output instead of a single hardcoded destination.

use std::collections::VecDeque;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::GateRejection;
use crate::regime::RegimeLabel;
use crate::types::Direction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    Passed,
    Rejected(GateRejection),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp_secs: i64,
    pub direction: Direction,
    pub regime: RegimeLabel,
    pub decision: Decision,
    pub account_equity: f64,
    pub open_position_count: u32,
    pub sentiment_label: Option<String>,
    pub sentiment_confidence: Option<f64>,
}

/// Consumer of decision records (spec §6 "written to the external
/// reporter"). The event loop both logs structurally via `tracing` and
/// pushes to the sink so recent decisions can be queried in-process.
pub trait DecisionSink: Send + Sync {
    fn record(&self, record: DecisionRecord);
}

/// Fixed-capacity ring buffer of the most recent decisions, the default
/// in-process `DecisionSink`.
pub struct RecentDecisions {
    capacity: usize,
    buffer: RwLock<VecDeque<DecisionRecord>>,
}

impl RecentDecisions {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, buffer: RwLock::new(VecDeque::with_capacity(capacity)) }
    }

    pub fn recent(&self, n: usize) -> Vec<DecisionRecord> {
        let buffer = self.buffer.read();
        buffer.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DecisionSink for RecentDecisions {
    fn record(&self, record: DecisionRecord) {
        info!(
            regime = %record.regime,
            decision = ?record.decision,
            equity = record.account_equity,
            positions = record.open_position_count,
            "decision record"
        );
        let mut buffer = self.buffer.write();
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(ts: i64) -> DecisionRecord {
        DecisionRecord {
            timestamp_secs: ts,
            direction: Direction::Buy,
            regime: RegimeLabel::TrendBull,
            decision: Decision::Passed,
            account_equity: 10_000.0,
            open_position_count: 1,
            sentiment_label: None,
            sentiment_confidence: None,
        }
    }

    #[test]
    fn ring_buffer_evicts_oldest_past_capacity() {
        let sink = RecentDecisions::new(2);
        sink.record(sample_record(1));
        sink.record(sample_record(2));
        sink.record(sample_record(3));
        assert_eq!(sink.len(), 2);
        let recent = sink.recent(10);
        let timestamps: Vec<i64> = recent.iter().map(|r| r.timestamp_secs).collect();
        assert_eq!(timestamps, vec![3, 2]);
    }

    #[test]
    fn recent_returns_newest_first() {
        let sink = RecentDecisions::new(5);
        sink.record(sample_record(1));
        sink.record(sample_record(2));
        let recent = sink.recent(1);
        assert_eq!(recent[0].timestamp_secs, 2);
    }
}
