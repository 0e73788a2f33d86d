use log::debug;

use super::{BeginPath, TransactionDispatcher};
use crate::engines::handler::{
    CompensableManager, CompensableTransaction, Transaction, TransactionManager,
};
use crate::error::{Result, TccError};
use crate::types::{CompensableInvocation, ExecutionContext};

impl TransactionDispatcher {
    /// Begin a transaction
    ///
    /// Chooses between a new global compensable transaction, a branch of the
    /// current compensable transaction, and a plain atomic transaction.
    pub fn begin(&self, ctx: &ExecutionContext) -> Result<()> {
        let compensable = self.current_compensable(ctx);
        let invocation = self.registry.current(ctx);

        let context = compensable.as_ref().map(|txn| txn.transaction_context());
        let path = BeginPath::resolve(invocation.is_some(), context.as_ref());
        debug!(
            "begin on {} resolved to {:?} (current compensable: {:?})",
            ctx,
            path,
            compensable.as_ref().map(|txn| txn.xid())
        );

        match (path, invocation) {
            (BeginPath::CoordinatorTrying, Some(invocation)) => {
                self.begin_in_trying_phase_for_coordinator(ctx, invocation)
            }
            (BeginPath::ParticipantTrying, _) => self.begin_in_trying_phase_for_participant(ctx),
            (BeginPath::CoordinatorCompensating, _) => {
                self.begin_in_compensating_phase_for_coordinator(ctx)
            }
            (BeginPath::Plain, _) => self.transaction_manager.begin(ctx),
            (BeginPath::Recovery, _) => self.begin_in_compensating_phase_for_recovery(ctx),
            (BeginPath::ParticipantCompensating, _) => {
                self.begin_in_compensating_phase_for_participant(ctx)
            }
            (BeginPath::CoordinatorTrying, None) => Err(TccError::illegal_state(
                "coordinator begin resolved without a pending invocation",
            )),
        }
    }

    /// New global transaction; the pending invocation becomes its root branch
    fn begin_in_trying_phase_for_coordinator(
        &self,
        ctx: &ExecutionContext,
        invocation: CompensableInvocation,
    ) -> Result<()> {
        self.compensable_manager.compensable_begin(ctx)?;

        let transaction = self.current_compensable(ctx).ok_or_else(|| {
            TccError::illegal_state(format!(
                "compensable engine reported no transaction on {} after begin",
                ctx
            ))
        })?;
        debug!("registering {} as root of {}", invocation, transaction.xid());
        transaction.register_compensable(invocation)
    }

    /// The invocation already belongs to the running global transaction and
    /// is not registered again
    fn begin_in_trying_phase_for_participant(&self, ctx: &ExecutionContext) -> Result<()> {
        self.compensable_manager.begin(ctx)
    }

    fn begin_in_compensating_phase_for_coordinator(&self, ctx: &ExecutionContext) -> Result<()> {
        self.compensable_manager.begin(ctx)
    }

    fn begin_in_compensating_phase_for_participant(&self, ctx: &ExecutionContext) -> Result<()> {
        self.compensable_manager.begin(ctx)
    }

    /// Branch for work on a transaction rebuilt by recovery
    fn begin_in_compensating_phase_for_recovery(&self, ctx: &ExecutionContext) -> Result<()> {
        self.compensable_manager.begin(ctx)
    }
}
