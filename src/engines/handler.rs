use std::fmt;
use std::sync::Arc;

use crate::context::TransactionContext;
use crate::error::Result;
use crate::types::{CompensableInvocation, ExecutionContext, TransactionStatus, Xid};

/// A transaction as seen from outside its engine.
pub trait Transaction: Send + Sync + fmt::Debug {
    fn xid(&self) -> Xid;

    /// Classification flags. Engines return a snapshot; the flags may move
    /// from trying to compensating between two calls.
    fn transaction_context(&self) -> TransactionContext;

    fn status(&self) -> TransactionStatus;
}

/// A TCC-managed transaction.
pub trait CompensableTransaction: Transaction {
    /// Record an invocation as a branch to confirm or cancel later
    fn register_compensable(&self, invocation: CompensableInvocation) -> Result<()>;

    /// The atomic transaction this compensable transaction currently wraps
    fn transaction(&self) -> Option<Arc<dyn Transaction>>;
}

/// A transaction detached from its execution context by `suspend`.
#[derive(Debug, Clone)]
pub enum TransactionHandle {
    Atomic(Arc<dyn Transaction>),
    Compensable(Arc<dyn CompensableTransaction>),
}

impl TransactionHandle {
    pub fn transaction_context(&self) -> TransactionContext {
        match self {
            TransactionHandle::Atomic(txn) => txn.transaction_context(),
            TransactionHandle::Compensable(txn) => txn.transaction_context(),
        }
    }

    pub fn xid(&self) -> Xid {
        match self {
            TransactionHandle::Atomic(txn) => txn.xid(),
            TransactionHandle::Compensable(txn) => txn.xid(),
        }
    }

    pub fn status(&self) -> TransactionStatus {
        match self {
            TransactionHandle::Atomic(txn) => txn.status(),
            TransactionHandle::Compensable(txn) => txn.status(),
        }
    }
}

/// Standard transaction-manager surface shared by the atomic engine, the
/// compensable engine and the dispatcher itself.
///
/// Every call names the execution context it acts for; "current transaction"
/// always means the one associated with that context.
pub trait TransactionManager: Send + Sync {
    fn begin(&self, ctx: &ExecutionContext) -> Result<()>;

    fn commit(&self, ctx: &ExecutionContext) -> Result<()>;

    fn rollback(&self, ctx: &ExecutionContext) -> Result<()>;

    /// Detach the current transaction from `ctx`
    fn suspend(&self, ctx: &ExecutionContext) -> Result<TransactionHandle>;

    /// Attach a previously suspended transaction to `ctx`
    fn resume(&self, ctx: &ExecutionContext, handle: TransactionHandle) -> Result<()>;

    fn set_rollback_only(&self, ctx: &ExecutionContext) -> Result<()>;

    fn set_transaction_timeout(&self, ctx: &ExecutionContext, seconds: u32) -> Result<()>;

    /// Current transaction, or `None`. Never fails.
    fn get_transaction_quietly(&self, ctx: &ExecutionContext) -> Option<Arc<dyn Transaction>>;
}

/// Engine for compensable (TCC) transactions.
pub trait CompensableManager: TransactionManager {
    /// Start a new global compensable transaction with this process as
    /// coordinator
    fn compensable_begin(&self, ctx: &ExecutionContext) -> Result<()>;

    /// Finish the trying phase and confirm every registered branch
    fn compensable_commit(&self, ctx: &ExecutionContext) -> Result<()>;

    /// Abandon the trying phase and cancel every registered branch
    fn compensable_rollback(&self, ctx: &ExecutionContext) -> Result<()>;

    /// Current compensable transaction, or `None`. Never fails.
    fn get_compensable_transaction_quietly(
        &self,
        ctx: &ExecutionContext,
    ) -> Option<Arc<dyn CompensableTransaction>>;
}
