//! Transaction scope driving one operation through [`AdjustmentState`].

use chrono::{DateTime, NaiveDate, Utc};
use common::OperationId;
use stock_store::{StockStore, StockTransaction};

use crate::error::{LedgerError, Result};
use crate::state::AdjustmentState;

/// Owns the store transaction of one ledger operation.
///
/// Every write of the operation goes through [`TransactionScope::tx`]. The
/// scope refuses out-of-order state transitions and rolls the transaction
/// back on failure, so a caller sees either all of an operation's writes or
/// none of them. Dropping an unfinished scope drops the store transaction,
/// which rolls it back.
pub struct TransactionScope<T: StockTransaction> {
    tx: Option<T>,
    state: AdjustmentState,
    operation_id: OperationId,
    started_at: DateTime<Utc>,
}

impl<T: StockTransaction> TransactionScope<T> {
    /// Opens a store transaction and starts a new operation.
    pub async fn begin<S>(store: &S) -> Result<Self>
    where
        S: StockStore<Transaction = T>,
    {
        let tx = store.begin().await?;
        let operation_id = OperationId::new();
        tracing::trace!(%operation_id, "transaction started");
        Ok(Self {
            tx: Some(tx),
            state: AdjustmentState::Started,
            operation_id,
            started_at: Utc::now(),
        })
    }

    /// Returns the current state.
    pub fn state(&self) -> AdjustmentState {
        self.state
    }

    /// Returns the ID shared by every adjustment this operation writes.
    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    /// The operation's current date, used for lots received without one.
    pub fn today(&self) -> NaiveDate {
        self.started_at.date_naive()
    }

    /// Borrows the open store transaction.
    pub fn tx(&mut self) -> Result<&mut T> {
        let state = self.state;
        self.tx.as_mut().ok_or_else(|| {
            LedgerError::InvariantViolation(format!("transaction already finished ({state})"))
        })
    }

    /// Moves to `next`, rejecting transitions the state machine does not allow.
    pub fn advance(&mut self, next: AdjustmentState) -> Result<()> {
        if !self.state.can_transition_to(next) || next.is_terminal() {
            return Err(LedgerError::InvariantViolation(format!(
                "illegal transition {} -> {}",
                self.state, next
            )));
        }
        tracing::trace!(operation_id = %self.operation_id, from = %self.state, to = %next, "state transition");
        self.state = next;
        Ok(())
    }

    /// Commits every write of the operation.
    ///
    /// Only legal from `Started` (nothing mutated) or `Aggregated`. Committing
    /// from any other state rolls back and reports an invariant violation. A
    /// commit the store refuses counts as a rollback.
    pub async fn commit(mut self) -> Result<()> {
        if !self.state.can_commit() {
            let err = LedgerError::InvariantViolation(format!(
                "cannot commit from state {}",
                self.state
            ));
            return Err(self.abort(err).await);
        }
        let tx = self.tx.take().ok_or_else(|| {
            LedgerError::InvariantViolation("transaction already finished".to_string())
        })?;
        if let Err(commit_err) = tx.commit().await {
            let from = self.state;
            self.state = AdjustmentState::RolledBack;
            let err = LedgerError::from(commit_err);
            self.report_rollback(from, &err);
            return Err(err);
        }
        self.state = AdjustmentState::Committed;
        tracing::trace!(operation_id = %self.operation_id, "transaction committed");
        Ok(())
    }

    /// Commits on success, rolls back on failure.
    pub async fn finish<R>(self, outcome: Result<R>) -> Result<R> {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => Err(self.abort(err).await),
        }
    }

    /// Rolls back every write and hands back the error that caused it.
    ///
    /// A failing rollback is logged; the returned error is always `err`.
    pub async fn abort(mut self, err: LedgerError) -> LedgerError {
        let from = self.state;
        self.state = AdjustmentState::RolledBack;
        if let Some(tx) = self.tx.take()
            && let Err(rollback_err) = tx.rollback().await
        {
            tracing::warn!(
                operation_id = %self.operation_id,
                error = %rollback_err,
                "rollback failed, transaction will be discarded on drop"
            );
        }
        self.report_rollback(from, &err);
        err
    }

    fn report_rollback(&self, from: AdjustmentState, err: &LedgerError) {
        match err {
            LedgerError::InvariantViolation(_) | LedgerError::StorageUnavailable(_) => {
                tracing::error!(operation_id = %self.operation_id, %from, error = %err, "operation rolled back");
            }
            _ => {
                tracing::debug!(operation_id = %self.operation_id, %from, error = %err, "operation rolled back");
            }
        }
        metrics::counter!("stock_rollbacks_total").increment(1);
    }
}
