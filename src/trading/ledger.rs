use std::sync::RwLock;

use crate::error::{LedgerError, StorageError, ValidationError};
use crate::models::TradeEvent;

/// Append-only, insertion-ordered store of trade events.
///
/// Reads never reorder: `all` is oldest-first, `recent` newest-first.
pub trait Ledger: Send + Sync {
    fn append(&self, event: TradeEvent) -> Result<(), LedgerError> {
        self.append_batch(vec![event])
    }

    /// Validates every event, then stores all of them or none.
    fn append_batch(&self, events: Vec<TradeEvent>) -> Result<(), LedgerError>;

    fn all(&self) -> Result<Vec<TradeEvent>, StorageError>;

    fn recent(&self, n: usize) -> Result<Vec<TradeEvent>, StorageError>;

    /// Most recent `open_long`/`open_short`.
    fn last_open(&self) -> Result<Option<TradeEvent>, StorageError>;
}

/// Structural checks only. Zero, negative and textual numbers are kept as
/// given; aggregation decides what counts.
pub fn validate(event: &TradeEvent) -> Result<(), ValidationError> {
    if event.symbol.trim().is_empty() {
        return Err(ValidationError::MissingField("symbol"));
    }
    if event.price.is_missing() {
        return Err(ValidationError::MissingField("price"));
    }
    if event.amount.is_missing() {
        return Err(ValidationError::MissingField("amount"));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    events: RwLock<Vec<TradeEvent>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with rows that predate the append boundary (no validation).
    pub fn with_history(events: Vec<TradeEvent>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Ledger for MemoryLedger {
    fn append_batch(&self, events: Vec<TradeEvent>) -> Result<(), LedgerError> {
        for e in &events {
            validate(e)?;
        }
        let mut guard = self.events.write().map_err(|_| StorageError::Poisoned)?;
        guard.extend(events);
        Ok(())
    }

    fn all(&self) -> Result<Vec<TradeEvent>, StorageError> {
        let guard = self.events.read().map_err(|_| StorageError::Poisoned)?;
        Ok(guard.clone())
    }

    fn recent(&self, n: usize) -> Result<Vec<TradeEvent>, StorageError> {
        let guard = self.events.read().map_err(|_| StorageError::Poisoned)?;
        Ok(guard.iter().rev().take(n).cloned().collect())
    }

    fn last_open(&self) -> Result<Option<TradeEvent>, StorageError> {
        let guard = self.events.read().map_err(|_| StorageError::Poisoned)?;
        Ok(guard.iter().rev().find(|e| e.action.is_open()).cloned())
    }
}
