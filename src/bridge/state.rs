//! Per-query state machine
//!
//! ```text
//! Idle -> Running -> Completed | Failed
//!         Running <-> AwaitingCallback
//! Completed | Failed -> Running    (next query)
//! Completed | Failed -> Idle       (close_query)
//! ```
//!
//! Any state may move to `Poisoned`; nothing leaves it.

use crate::errors::{BridgeError, Result};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    Running,
    AwaitingCallback,
    Completed,
    Failed,
    Poisoned,
}

impl QueryState {
    /// A query ran and its results are still held by the engine
    pub fn is_open(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_executing(self) -> bool {
        matches!(self, Self::Running | Self::AwaitingCallback)
    }

    fn allows(self, to: QueryState) -> bool {
        use QueryState::*;
        match (self, to) {
            (Poisoned, _) => false,
            (_, Poisoned) => true,
            (Idle | Completed | Failed, Running) => true,
            (Running, AwaitingCallback) | (AwaitingCallback, Running) => true,
            (Running, Completed | Failed) => true,
            (Completed | Failed, Idle) => true,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct QueryMachine {
    state: QueryState,
    callbacks: usize,
}

impl QueryMachine {
    pub fn new() -> Self {
        Self {
            state: QueryState::Idle,
            callbacks: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> QueryState {
        self.state
    }

    /// Callback round-trips completed by the current query
    pub fn callbacks(&self) -> usize {
        self.callbacks
    }

    pub fn transition(&mut self, to: QueryState) -> Result<()> {
        if !self.state.allows(to) {
            return Err(BridgeError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        trace!(from = ?self.state, to = ?to, "query state");
        match (self.state, to) {
            (QueryState::AwaitingCallback, QueryState::Running) => self.callbacks += 1,
            (_, QueryState::Running) => self.callbacks = 0,
            _ => {}
        }
        self.state = to;
        Ok(())
    }

    pub fn poison(&mut self) {
        self.state = QueryState::Poisoned;
    }
}

impl Default for QueryMachine {
    fn default() -> Self {
        Self::new()
    }
}
