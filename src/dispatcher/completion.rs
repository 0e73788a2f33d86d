use log::debug;

use super::{CompletionTarget, TransactionDispatcher};
use crate::context::TransactionContext;
use crate::engines::handler::{CompensableManager, TransactionManager};
use crate::error::{Result, TccError};
use crate::types::ExecutionContext;

impl TransactionDispatcher {
    /// Commit the current transaction
    ///
    /// Only a local coordinator in its trying phase reaches
    /// `compensable_commit`; every other compensable case finishes through
    /// the compensable engine's plain commit.
    pub fn commit(&self, ctx: &ExecutionContext) -> Result<()> {
        let context = self.require_completion_context(ctx, "commit")?;
        let target = CompletionTarget::for_commit(context.route()?);
        debug!("commit on {} routed to {:?} ({:?})", ctx, target, context);

        match target {
            CompletionTarget::Atomic => self.transaction_manager.commit(ctx),
            CompletionTarget::Compensable => self.compensable_manager.commit(ctx),
            CompletionTarget::Global => self.compensable_manager.compensable_commit(ctx),
        }
    }

    /// Roll back the current transaction
    ///
    /// There is no compensating-phase short-circuit here: a rollback in the
    /// compensating phase is routed on role alone.
    pub fn rollback(&self, ctx: &ExecutionContext) -> Result<()> {
        let context = self.require_completion_context(ctx, "rollback")?;
        let target = CompletionTarget::for_rollback(context.route()?);
        debug!("rollback on {} routed to {:?} ({:?})", ctx, target, context);

        match target {
            CompletionTarget::Atomic => self.transaction_manager.rollback(ctx),
            CompletionTarget::Compensable => self.compensable_manager.rollback(ctx),
            CompletionTarget::Global => self.compensable_manager.compensable_rollback(ctx),
        }
    }

    fn require_completion_context(
        &self,
        ctx: &ExecutionContext,
        operation: &str,
    ) -> Result<TransactionContext> {
        self.current_context(ctx).ok_or_else(|| {
            TccError::illegal_state(format!("{} without a transaction on {}", operation, ctx))
        })
    }
}
