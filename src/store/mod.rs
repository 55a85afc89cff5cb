//! Durable storage of minute observations
//!
//! The contract is insert-or-ignore on `(symbol, minute)`: a row, once
//! written, is never updated, and re-submitting it is a silent no-op.

pub mod errors;
pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::FinalMinuteWindow;

pub use errors::StoreError;
pub use memory::{MemoryStore, MemorySession};

/// One stored minute bar, keyed by `(symbol, minute)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub symbol: String,
    /// Start of the minute, always truncated to a whole minute
    pub minute: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Observation {
    pub fn key(&self) -> (String, DateTime<Utc>) {
        (self.symbol.clone(), self.minute)
    }
}

/// A scoped store session; dropping it releases the underlying connection
#[async_trait]
pub trait ObservationStore: Send {
    /// Insert rows whose key is absent and return how many were inserted.
    /// Existing keys are left untouched and count as 0.
    async fn upsert_batch(&mut self, rows: &[Observation]) -> Result<u64, StoreError>;

    /// Symbols with at least one observation whose minute lies in `window`
    async fn symbols_present_in(&mut self, window: &FinalMinuteWindow) -> Result<HashSet<String>, StoreError>;
}

/// Hands out store sessions, one per tick
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Session: ObservationStore;

    async fn acquire(&self) -> Result<Self::Session, StoreError>;
}
