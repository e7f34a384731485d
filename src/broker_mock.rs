// =============================================================================
// MockBroker — in-memory ledger test double for the Broker trait
// =============================================================================
//
// Used by unit tests and the ambient demo binary's dry-run mode. Tracks
// positions and a monotonically increasing ticket counter; supports
// injecting a scripted error for the next call to exercise the dispatcher's
// policy handling.

use parking_lot::RwLock;

use crate::errors::ErrorKind;
use crate::execution::{Broker, Position};
use crate::order::OrderIntent;
use crate::types::{Direction, SymbolInfo, Ticket};

struct Inner {
    next_ticket: u64,
    positions: Vec<Position>,
    trade_allowed: bool,
    injected_error: Option<ErrorKind>,
}

pub struct MockBroker {
    inner: RwLock<Inner>,
    symbol_info: SymbolInfo,
}

impl MockBroker {
    pub fn new(symbol_info: SymbolInfo) -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_ticket: 1,
                positions: Vec::new(),
                trade_allowed: true,
                injected_error: None,
            }),
            symbol_info,
        }
    }

    /// Cause the next fallible call to return `error` instead of succeeding.
    pub fn inject_error(&self, error: ErrorKind) {
        self.inner.write().injected_error = Some(error);
    }

    pub fn set_trade_allowed(&self, allowed: bool) {
        self.inner.write().trade_allowed = allowed;
    }

    fn take_injected(&self) -> Option<ErrorKind> {
        self.inner.write().injected_error.take()
    }
}

impl Broker for MockBroker {
    fn open_market(
        &self,
        direction: Direction,
        volume: f64,
        sl: f64,
        tp: f64,
        _comment: &str,
    ) -> Result<Ticket, ErrorKind> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        let mut inner = self.inner.write();
        let ticket = Ticket(inner.next_ticket);
        inner.next_ticket += 1;
        inner.positions.push(Position {
            ticket,
            direction,
            entry_price: 0.0,
            volume,
            stop_loss: sl,
            take_profit: tp,
        });
        Ok(ticket)
    }

    fn open_pending(&self, intent: &OrderIntent, _comment: &str) -> Result<Ticket, ErrorKind> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        let mut inner = self.inner.write();
        let ticket = Ticket(inner.next_ticket);
        inner.next_ticket += 1;
        inner.positions.push(Position {
            ticket,
            direction: intent.direction,
            entry_price: intent.entry_price,
            volume: intent.volume,
            stop_loss: intent.stop_loss,
            take_profit: intent.take_profit,
        });
        Ok(ticket)
    }

    fn modify_position(&self, ticket: Ticket, sl: f64, tp: f64) -> Result<(), ErrorKind> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        let mut inner = self.inner.write();
        match inner.positions.iter_mut().find(|p| p.ticket == ticket) {
            Some(position) => {
                position.stop_loss = sl;
                position.take_profit = tp;
                Ok(())
            }
            None => Err(ErrorKind::AlreadyProcessed),
        }
    }

    fn close_position(&self, ticket: Ticket) -> Result<(), ErrorKind> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        let mut inner = self.inner.write();
        let before = inner.positions.len();
        inner.positions.retain(|p| p.ticket != ticket);
        if inner.positions.len() == before {
            return Err(ErrorKind::AlreadyProcessed);
        }
        Ok(())
    }

    fn close_partial(&self, ticket: Ticket, volume: f64) -> Result<(), ErrorKind> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        let mut inner = self.inner.write();
        match inner.positions.iter_mut().find(|p| p.ticket == ticket) {
            Some(position) if position.volume > volume => {
                position.volume -= volume;
                Ok(())
            }
            Some(position) => {
                let t = position.ticket;
                inner.positions.retain(|p| p.ticket != t);
                Ok(())
            }
            None => Err(ErrorKind::AlreadyProcessed),
        }
    }

    fn list_positions(&self) -> Vec<Position> {
        self.inner.read().positions.clone()
    }

    fn symbol_info(&self) -> SymbolInfo {
        self.symbol_info
    }

    fn is_trade_allowed(&self) -> bool {
        self.inner.read().trade_allowed
    }
}
