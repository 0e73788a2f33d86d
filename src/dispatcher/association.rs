use std::sync::Arc;

use log::debug;

use super::TransactionDispatcher;
use crate::engines::handler::{
    CompensableManager, CompensableTransaction, Transaction, TransactionHandle,
    TransactionManager,
};
use crate::engines::EngineType;
use crate::error::{Result, TccError};
use crate::types::{ExecutionContext, TransactionStatus};

impl TransactionDispatcher {
    /// Detach the current transaction from `ctx`
    pub fn suspend(&self, ctx: &ExecutionContext) -> Result<TransactionHandle> {
        let context = self.current_context(ctx).ok_or_else(|| {
            TccError::system(format!("suspend without a transaction on {}", ctx))
        })?;
        let engine = EngineType::for_context(&context);
        debug!("suspend on {} routed to {}", ctx, engine);
        match engine {
            EngineType::Compensable => self.compensable_manager.suspend(ctx),
            EngineType::Atomic => self.transaction_manager.suspend(ctx),
        }
    }

    /// Attach `handle` to `ctx`
    ///
    /// Routed on the handle's own context only; whatever is current on `ctx`
    /// is left to the receiving engine to judge.
    pub fn resume(&self, ctx: &ExecutionContext, handle: TransactionHandle) -> Result<()> {
        let engine = EngineType::for_context(&handle.transaction_context());
        debug!("resume of {} on {} routed to {}", handle.xid(), ctx, engine);
        match engine {
            EngineType::Compensable => self.compensable_manager.resume(ctx, handle),
            EngineType::Atomic => self.transaction_manager.resume(ctx, handle),
        }
    }

    pub fn set_rollback_only(&self, ctx: &ExecutionContext) -> Result<()> {
        match self.require_setter_engine(ctx, "set_rollback_only")? {
            EngineType::Compensable => self.compensable_manager.set_rollback_only(ctx),
            EngineType::Atomic => self.transaction_manager.set_rollback_only(ctx),
        }
    }

    pub fn set_transaction_timeout(&self, ctx: &ExecutionContext, seconds: u32) -> Result<()> {
        match self.require_setter_engine(ctx, "set_transaction_timeout")? {
            EngineType::Compensable => {
                self.compensable_manager.set_transaction_timeout(ctx, seconds)
            }
            EngineType::Atomic => self.transaction_manager.set_transaction_timeout(ctx, seconds),
        }
    }

    fn require_setter_engine(&self, ctx: &ExecutionContext, operation: &str) -> Result<EngineType> {
        let context = self.current_context(ctx).ok_or_else(|| {
            TccError::illegal_state(format!("{} without a transaction on {}", operation, ctx))
        })?;
        Ok(EngineType::for_context(&context))
    }

    /// Current atomic transaction.
    ///
    /// With no atomic transaction associated, falls back to the atomic
    /// transaction wrapped by the current compensable transaction. Returns
    /// `None` when neither exists.
    pub fn get_transaction(&self, ctx: &ExecutionContext) -> Result<Option<Arc<dyn Transaction>>> {
        if let Some(transaction) = self.transaction_manager.get_transaction_quietly(ctx) {
            return Ok(Some(transaction));
        }
        Ok(self
            .compensable_manager
            .get_compensable_transaction_quietly(ctx)
            .and_then(|compensable| compensable.transaction()))
    }

    pub fn get_status(&self, ctx: &ExecutionContext) -> Result<TransactionStatus> {
        Ok(self
            .get_transaction(ctx)?
            .map(|transaction| transaction.status())
            .unwrap_or(TransactionStatus::NoTransaction))
    }

    // Thread association and raw timeout access belong to the engines.

    pub fn associate_thread(
        &self,
        _ctx: &ExecutionContext,
        _transaction: Arc<dyn Transaction>,
    ) -> Result<()> {
        Err(TccError::illegal_state("associate_thread is not supported"))
    }

    pub fn disassociate_thread(&self, _ctx: &ExecutionContext) -> Result<Arc<dyn Transaction>> {
        Err(TccError::illegal_state("disassociate_thread is not supported"))
    }

    pub fn timeout_seconds(&self) -> Result<u32> {
        Err(TccError::illegal_state("timeout_seconds is not supported"))
    }

    pub fn set_timeout_seconds(&self, _seconds: u32) -> Result<()> {
        Err(TccError::illegal_state("set_timeout_seconds is not supported"))
    }
}
