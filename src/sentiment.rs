// =============================================================================
// Sentiment reader (consumed, optional, spec §6)
// =============================================================================
//
// An optional external signal the trend cascade's pullback gate (G3) widens
// its tolerance for when it agrees with the candidate's direction.

use serde::{Deserialize, Serialize};

use crate::types::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentSignal {
    pub label: SentimentLabel,
    pub score: f64,
    pub confidence: f64,
}

impl SentimentSignal {
    /// True when this signal agrees with `direction` at or above `min_confidence`.
    /// Agreement means a strictly positive score for Buy-side directions and a
    /// strictly negative score for Sell-side directions.
    pub fn agrees_with(&self, direction: Direction, min_confidence: f64) -> bool {
        if self.confidence < min_confidence {
            return false;
        }
        match direction {
            Direction::Buy => self.score > 0.0,
            Direction::Sell => self.score < 0.0,
        }
    }
}

pub trait SentimentReader: Send + Sync {
    fn signal(&self) -> Option<SentimentSignal>;
}

/// Fixed-value test double.
pub struct StaticSentimentReader {
    pub signal: Option<SentimentSignal>,
}

impl SentimentReader for StaticSentimentReader {
    fn signal(&self) -> Option<SentimentSignal> {
        self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agrees_with_requires_confidence_threshold() {
        let weak = SentimentSignal { label: SentimentLabel::Buy, score: 0.6, confidence: 0.3 };
        assert!(!weak.agrees_with(Direction::Buy, 0.5));

        let strong = SentimentSignal { label: SentimentLabel::Buy, score: 0.6, confidence: 0.7 };
        assert!(strong.agrees_with(Direction::Buy, 0.5));
    }

    #[test]
    fn agrees_with_checks_sign_against_direction() {
        let bearish = SentimentSignal { label: SentimentLabel::Sell, score: -0.4, confidence: 0.9 };
        assert!(bearish.agrees_with(Direction::Sell, 0.5));
        assert!(!bearish.agrees_with(Direction::Buy, 0.5));
    }
}
