// =============================================================================
// Error taxonomy — typed result variants, never exceptions across boundaries
// =============================================================================
//
// Every subsystem boundary returns one of these enums rather than a string or
// a panic. `anyhow` is reserved for the ambient binary's I/O edges (config
// load, broker-adapter construction) where the caller only logs and moves on;
// anything the loop needs to branch on is one of these.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Ticket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierError {
    DataNotReady,
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "regime classifier data not ready")
    }
}

/// Rejection reasons across all three gate cascades. One variant per named
/// gate, per spec §4.2 — never a free string used for control flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GateRejection {
    DataNotReady,
    TrendFollowerMisaligned,
    EmaMisaligned,
    PullbackTooFar,
    RsiOverbought,
    RsiOversold,
    RsiOutOfMomentumBand,
    PatternAbsent,
    NotNearKeyLevel,
    VolumeNotSpiking,
    RangeInvalid,
    NotNearBoundary,
    StochNotConfirming,
    NoOpposingKeyLevels,
    SpreadTooWideForRange,
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateRejection::DataNotReady => "data not ready",
            GateRejection::TrendFollowerMisaligned => "trend-follower oracle misaligned",
            GateRejection::EmaMisaligned => "EMA(50)/EMA(200) not aligned",
            GateRejection::PullbackTooFar => "pullback distance exceeds ATR multiple",
            GateRejection::RsiOverbought => "RSI overbought",
            GateRejection::RsiOversold => "RSI oversold",
            GateRejection::RsiOutOfMomentumBand => "RSI outside momentum band",
            GateRejection::PatternAbsent => "no qualifying breakout pattern",
            GateRejection::NotNearKeyLevel => "price not near a strong key level",
            GateRejection::VolumeNotSpiking => "volume below spike threshold",
            GateRejection::RangeInvalid => "range window invalid or too narrow",
            GateRejection::NotNearBoundary => "price not near range boundary",
            GateRejection::StochNotConfirming => "stochastic not confirming reversal",
            GateRejection::NoOpposingKeyLevels => "no opposing key-level pair",
            GateRejection::SpreadTooWideForRange => "spread exceeds range-entry floor",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskError {
    DrawdownExceeded { drawdown_pct: f64, max_pct: f64 },
    MaxPositionsReached { open: u32, max: u32 },
}

impl fmt::Display for RiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskError::DrawdownExceeded { drawdown_pct, max_pct } => write!(
                f,
                "drawdown {drawdown_pct:.2}% exceeds max {max_pct:.2}%"
            ),
            RiskError::MaxPositionsReached { open, max } => {
                write!(f, "{open} positions open, max is {max}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingError {
    BelowMinimumVolume { rounded: f64, min_volume: f64 },
    NonPositiveStopDistance,
}

impl fmt::Display for SizingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizingError::BelowMinimumVolume { rounded, min_volume } => write!(
                f,
                "sized volume {rounded} below broker minimum {min_volume}"
            ),
            SizingError::NonPositiveStopDistance => write!(f, "stop distance is non-positive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstructError {
    ZeroAtr,
    PendingTriggerTooCloseToMarket,
}

impl fmt::Display for ConstructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructError::ZeroAtr => write!(f, "ATR is zero, stop distances degenerate"),
            ConstructError::PendingTriggerTooCloseToMarket => {
                write!(f, "pending trigger price violates min stop distance")
            }
        }
    }
}

/// The four broker error kinds of spec §4.6, returned by every fallible
/// `Broker` method.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    TransientBusy,
    AlreadyProcessed,
    Permanent(String),
    Unknown(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TransientBusy => write!(f, "broker busy, transient"),
            ErrorKind::AlreadyProcessed => write!(f, "already processed"),
            ErrorKind::Permanent(msg) => write!(f, "permanent rejection: {msg}"),
            ErrorKind::Unknown(msg) => write!(f, "unknown broker error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchError {
    RetriesExhausted,
    SubsystemSuspended { recovery_at_secs: u64 },
    Rejected(ErrorKind),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::RetriesExhausted => write!(f, "retries exhausted"),
            DispatchError::SubsystemSuspended { recovery_at_secs } => {
                write!(f, "subsystem suspended until t={recovery_at_secs}")
            }
            DispatchError::Rejected(kind) => write!(f, "{kind}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ManagerError {
    ExitBlocked(Ticket),
    SubsystemSuspended,
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerError::ExitBlocked(t) => write!(f, "ticket {t} is exit-blocked"),
            ManagerError::SubsystemSuspended => write!(f, "position manager suspended"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopError {
    Dispatch(DispatchError),
    Manager(ManagerError),
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopError::Dispatch(e) => write!(f, "{e}"),
            LoopError::Manager(e) => write!(f, "{e}"),
        }
    }
}

impl From<DispatchError> for LoopError {
    fn from(e: DispatchError) -> Self {
        LoopError::Dispatch(e)
    }
}

impl From<ManagerError> for LoopError {
    fn from(e: ManagerError) -> Self {
        LoopError::Manager(e)
    }
}
