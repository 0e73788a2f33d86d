//! Transaction Dispatcher
//!
//! The dispatcher is the transaction manager application code talks to. It
//! owns no state: on every lifecycle call it looks at what the two engines
//! report as current for the caller's execution context, and at whether the
//! invocation registry holds a pending compensable invocation, and then
//! forwards the call to exactly one engine.
//!
//! ## Routing
//!
//! - `begin`: decided by [`BeginPath::resolve`]
//! - `commit` / `rollback`: decided by [`CompletionTarget::for_commit`] and
//!   [`CompletionTarget::for_rollback`] over the [`Route`] of the current
//!   transaction (compensable preferred over atomic)
//! - `suspend` / `set_rollback_only` / `set_transaction_timeout`: the engine
//!   owning the current transaction
//! - `resume`: the engine owning the supplied handle, regardless of what is
//!   current

use std::sync::Arc;

use crate::context::{Phase, Role, Route, TransactionContext};
use crate::engines::handler::{
    CompensableManager, CompensableTransaction, Transaction, TransactionHandle,
    TransactionManager,
};
use crate::error::Result;
use crate::registry::InvocationRegistry;
use crate::types::ExecutionContext;

pub mod association;
pub mod begin;
pub mod completion;

/// Sub-path taken by `begin`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeginPath {
    /// Outermost compensable call: new global transaction, invocation
    /// registered as its root branch
    CoordinatorTrying,
    /// Compensable call inside a trying transaction
    ParticipantTrying,
    /// Compensable call issued by confirm/cancel logic
    CoordinatorCompensating,
    /// No compensation involved
    Plain,
    /// Work on behalf of a transaction rebuilt by recovery
    Recovery,
    /// Framework-level begin on a context with a live compensable transaction
    ParticipantCompensating,
}

impl BeginPath {
    /// Apply the begin decision table. First match wins.
    pub fn resolve(pending_invocation: bool, compensable: Option<&TransactionContext>) -> Self {
        match (pending_invocation, compensable) {
            (true, None) => BeginPath::CoordinatorTrying,
            (true, Some(context)) if context.is_compensating() => {
                BeginPath::CoordinatorCompensating
            }
            (true, Some(_)) => BeginPath::ParticipantTrying,
            (false, None) => BeginPath::Plain,
            (false, Some(context)) if context.is_recoveried() => BeginPath::Recovery,
            (false, Some(_)) => BeginPath::ParticipantCompensating,
        }
    }
}

/// Engine method a commit or rollback is forwarded to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionTarget {
    /// Atomic engine `commit` / `rollback`
    Atomic,
    /// Compensable engine plain `commit` / `rollback`
    Compensable,
    /// Compensable engine `compensable_commit` / `compensable_rollback`,
    /// which drives confirm or cancel for the whole global transaction
    Global,
}

impl CompletionTarget {
    pub fn for_commit(route: Route) -> Self {
        match route {
            Route::Recovered => CompletionTarget::Compensable,
            Route::Atomic => CompletionTarget::Atomic,
            Route::Compensable {
                phase: Phase::Compensating,
                ..
            } => CompletionTarget::Compensable,
            Route::Compensable {
                role: Role::Coordinator,
                phase: Phase::Trying,
            } => CompletionTarget::Global,
            Route::Compensable {
                role: Role::PropagatedCoordinator | Role::Participant,
                phase: Phase::Trying,
            } => CompletionTarget::Compensable,
        }
    }

    /// Unlike commit, the phase plays no part: a cancel request always
    /// re-evaluates the role.
    pub fn for_rollback(route: Route) -> Self {
        match route {
            Route::Recovered => CompletionTarget::Compensable,
            Route::Atomic => CompletionTarget::Atomic,
            Route::Compensable {
                role: Role::Coordinator,
                ..
            } => CompletionTarget::Global,
            Route::Compensable {
                role: Role::PropagatedCoordinator | Role::Participant,
                ..
            } => CompletionTarget::Compensable,
        }
    }
}

/// Routes lifecycle calls to the atomic or the compensable engine
pub struct TransactionDispatcher {
    transaction_manager: Arc<dyn TransactionManager>,
    compensable_manager: Arc<dyn CompensableManager>,
    registry: Arc<dyn InvocationRegistry>,
}

impl TransactionDispatcher {
    pub fn new(
        transaction_manager: Arc<dyn TransactionManager>,
        compensable_manager: Arc<dyn CompensableManager>,
        registry: Arc<dyn InvocationRegistry>,
    ) -> Self {
        Self {
            transaction_manager,
            compensable_manager,
            registry,
        }
    }

    pub fn transaction_manager(&self) -> &Arc<dyn TransactionManager> {
        &self.transaction_manager
    }

    pub fn compensable_manager(&self) -> &Arc<dyn CompensableManager> {
        &self.compensable_manager
    }

    fn current_atomic(&self, ctx: &ExecutionContext) -> Option<Arc<dyn Transaction>> {
        self.transaction_manager.get_transaction_quietly(ctx)
    }

    fn current_compensable(
        &self,
        ctx: &ExecutionContext,
    ) -> Option<Arc<dyn CompensableTransaction>> {
        self.compensable_manager.get_compensable_transaction_quietly(ctx)
    }

    /// Context to classify on: the compensable transaction's if there is one,
    /// else the atomic transaction's
    fn current_context(&self, ctx: &ExecutionContext) -> Option<TransactionContext> {
        let transaction = self.current_atomic(ctx);
        let compensable = self.current_compensable(ctx);
        match (compensable, transaction) {
            (Some(compensable), _) => Some(compensable.transaction_context()),
            (None, Some(transaction)) => Some(transaction.transaction_context()),
            (None, None) => None,
        }
    }
}

impl TransactionManager for TransactionDispatcher {
    fn begin(&self, ctx: &ExecutionContext) -> Result<()> {
        TransactionDispatcher::begin(self, ctx)
    }

    fn commit(&self, ctx: &ExecutionContext) -> Result<()> {
        TransactionDispatcher::commit(self, ctx)
    }

    fn rollback(&self, ctx: &ExecutionContext) -> Result<()> {
        TransactionDispatcher::rollback(self, ctx)
    }

    fn suspend(&self, ctx: &ExecutionContext) -> Result<TransactionHandle> {
        TransactionDispatcher::suspend(self, ctx)
    }

    fn resume(&self, ctx: &ExecutionContext, handle: TransactionHandle) -> Result<()> {
        TransactionDispatcher::resume(self, ctx, handle)
    }

    fn set_rollback_only(&self, ctx: &ExecutionContext) -> Result<()> {
        TransactionDispatcher::set_rollback_only(self, ctx)
    }

    fn set_transaction_timeout(&self, ctx: &ExecutionContext, seconds: u32) -> Result<()> {
        TransactionDispatcher::set_transaction_timeout(self, ctx, seconds)
    }

    fn get_transaction_quietly(&self, ctx: &ExecutionContext) -> Option<Arc<dyn Transaction>> {
        self.get_transaction(ctx).ok().flatten()
    }
}
