//! Adjustment transaction state machine.

use serde::{Deserialize, Serialize};

/// The state of one atomic ledger operation.
///
/// State transitions:
/// ```text
/// Started ──► LotsMutated ──► Logged ──► Aggregated ──► Committed
///    │             │            │            │
///    └─────────────┴────────────┴────────────┴──────► RolledBack
/// ```
///
/// Operations that never touch lot quantities (metadata edits, deletes,
/// reads) commit straight from `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AdjustmentState {
    /// Transaction opened, nothing written to lots yet.
    #[default]
    Started,

    /// Lot quantities changed.
    LotsMutated,

    /// Adjustment rows appended for every lot change.
    Logged,

    /// Item on-hand re-derived from its lots.
    Aggregated,

    /// Every write is durable (terminal state).
    Committed,

    /// Every write was discarded (terminal state).
    RolledBack,
}

impl AdjustmentState {
    /// Returns true if `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: AdjustmentState) -> bool {
        use AdjustmentState::*;
        match (self, next) {
            (Started, LotsMutated)
            | (LotsMutated, Logged)
            | (Logged, Aggregated)
            | (Started, Committed)
            | (Aggregated, Committed) => true,
            (current, RolledBack) => !current.is_terminal(),
            _ => false,
        }
    }

    /// Returns true if the operation may commit from this state.
    pub fn can_commit(&self) -> bool {
        self.can_transition_to(AdjustmentState::Committed)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AdjustmentState::Committed | AdjustmentState::RolledBack)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentState::Started => "Started",
            AdjustmentState::LotsMutated => "LotsMutated",
            AdjustmentState::Logged => "Logged",
            AdjustmentState::Aggregated => "Aggregated",
            AdjustmentState::Committed => "Committed",
            AdjustmentState::RolledBack => "RolledBack",
        }
    }
}

impl std::fmt::Display for AdjustmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
