//! Transaction Manager for the Local engine
//!
//! ## Lifecycle
//! 1. BEGIN: allocate an xid, associate the transaction with the context
//! 2. SET ROLLBACK ONLY: mark the transaction; the next COMMIT becomes a rollback
//! 3. COMMIT / ROLLBACK: finish the transaction and drop the association
//! 4. SUSPEND / RESUME: park the transaction by xid and re-attach it later,
//!    possibly to a different execution context

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

pub use super::types::LocalTransaction;

use crate::engines::handler::{Transaction, TransactionHandle, TransactionManager};
use crate::error::{Result, TccError};
use crate::types::{ExecutionContext, TransactionStatus, Xid, XidFactory};

/// Default transaction timeout when nothing is configured
pub const DEFAULT_TIMEOUT_SECS: u32 = 60;

/// The Local Transaction Manager
pub struct LocalTransactionManager {
    xid_factory: Arc<XidFactory>,
    /// Timeout applied when a caller sets 0 or never sets one
    default_timeout_secs: u32,
    /// Transactions currently associated with an execution context
    associated: Mutex<HashMap<ExecutionContext, Arc<LocalTransaction>>>,
    /// Transactions detached by `suspend`, waiting for `resume`
    suspended: Mutex<HashMap<Xid, Arc<LocalTransaction>>>,
}

impl LocalTransactionManager {
    pub fn new(xid_factory: Arc<XidFactory>) -> Self {
        Self::with_timeout(xid_factory, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(xid_factory: Arc<XidFactory>, default_timeout_secs: u32) -> Self {
        Self {
            xid_factory,
            default_timeout_secs,
            associated: Mutex::new(HashMap::new()),
            suspended: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_timeout_secs(&self) -> u32 {
        self.default_timeout_secs
    }

    pub fn xid_factory(&self) -> &Arc<XidFactory> {
        &self.xid_factory
    }

    /// Begin a transaction, either a new global one or a branch of `global`
    pub fn begin_branch(
        &self,
        ctx: &ExecutionContext,
        global: Option<&Xid>,
    ) -> Result<Arc<LocalTransaction>> {
        let mut associated = self.associated.lock();
        if let Some(existing) = associated.get(ctx) {
            return Err(TccError::NotSupported(format!(
                "{} already has transaction {}",
                ctx,
                existing.xid()
            )));
        }

        let xid = match global {
            Some(global) => self.xid_factory.create_branch(global),
            None => self.xid_factory.create_global(),
        };
        let txn = Arc::new(LocalTransaction::new(xid, self.default_timeout_secs));
        associated.insert(*ctx, Arc::clone(&txn));

        info!("Local transaction {} started on {}", xid, ctx);
        Ok(txn)
    }

    /// Transaction associated with `ctx`
    pub fn current(&self, ctx: &ExecutionContext) -> Option<Arc<LocalTransaction>> {
        self.associated.lock().get(ctx).cloned()
    }

    /// Check if a transaction is associated with `ctx`
    pub fn is_active(&self, ctx: &ExecutionContext) -> bool {
        self.associated.lock().contains_key(ctx)
    }

    /// Number of suspended transactions awaiting resume
    pub fn suspended_count(&self) -> usize {
        self.suspended.lock().len()
    }

    fn take_current(&self, ctx: &ExecutionContext) -> Result<Arc<LocalTransaction>> {
        self.associated.lock().remove(ctx).ok_or_else(|| {
            TccError::illegal_state(format!("no local transaction on {}", ctx))
        })
    }

    fn require_current(&self, ctx: &ExecutionContext) -> Result<Arc<LocalTransaction>> {
        self.current(ctx).ok_or_else(|| {
            TccError::illegal_state(format!("no local transaction on {}", ctx))
        })
    }
}

impl TransactionManager for LocalTransactionManager {
    fn begin(&self, ctx: &ExecutionContext) -> Result<()> {
        self.begin_branch(ctx, None).map(|_| ())
    }

    fn commit(&self, ctx: &ExecutionContext) -> Result<()> {
        let txn = self.take_current(ctx)?;
        match txn.status() {
            TransactionStatus::Active => {
                txn.set_status(TransactionStatus::Committing);
                txn.set_status(TransactionStatus::Committed);
                info!("Local transaction {} committed", txn.xid());
                Ok(())
            }
            TransactionStatus::MarkedRollback => {
                txn.set_status(TransactionStatus::RolledBack);
                info!("Local transaction {} was rollback-only, rolled back", txn.xid());
                Err(TccError::Rollback(format!(
                    "transaction {} was marked rollback-only",
                    txn.xid()
                )))
            }
            status => Err(TccError::illegal_state(format!(
                "transaction {} cannot commit in status {}",
                txn.xid(),
                status
            ))),
        }
    }

    fn rollback(&self, ctx: &ExecutionContext) -> Result<()> {
        let txn = self.take_current(ctx)?;
        txn.set_status(TransactionStatus::RollingBack);
        txn.set_status(TransactionStatus::RolledBack);
        info!("Local transaction {} rolled back", txn.xid());
        Ok(())
    }

    fn suspend(&self, ctx: &ExecutionContext) -> Result<TransactionHandle> {
        let txn = self.take_current(ctx)?;
        self.suspended.lock().insert(txn.xid(), Arc::clone(&txn));
        debug!("Local transaction {} suspended from {}", txn.xid(), ctx);
        Ok(TransactionHandle::Atomic(txn))
    }

    fn resume(&self, ctx: &ExecutionContext, handle: TransactionHandle) -> Result<()> {
        if handle.transaction_context().is_compensable() {
            return Err(TccError::InvalidTransaction(format!(
                "transaction {} is compensable",
                handle.xid()
            )));
        }

        let mut associated = self.associated.lock();
        if let Some(existing) = associated.get(ctx) {
            return Err(TccError::illegal_state(format!(
                "{} already has transaction {}",
                ctx,
                existing.xid()
            )));
        }

        let txn = self.suspended.lock().remove(&handle.xid()).ok_or_else(|| {
            TccError::InvalidTransaction(format!(
                "transaction {} was not suspended by this engine",
                handle.xid()
            ))
        })?;
        debug!("Local transaction {} resumed on {}", txn.xid(), ctx);
        associated.insert(*ctx, txn);
        Ok(())
    }

    fn set_rollback_only(&self, ctx: &ExecutionContext) -> Result<()> {
        let txn = self.require_current(ctx)?;
        txn.set_status(TransactionStatus::MarkedRollback);
        debug!("Local transaction {} marked rollback-only", txn.xid());
        Ok(())
    }

    fn set_transaction_timeout(&self, ctx: &ExecutionContext, seconds: u32) -> Result<()> {
        let txn = self.require_current(ctx)?;
        let seconds = if seconds == 0 {
            self.default_timeout_secs
        } else {
            seconds
        };
        txn.set_timeout(seconds);
        Ok(())
    }

    fn get_transaction_quietly(&self, ctx: &ExecutionContext) -> Option<Arc<dyn Transaction>> {
        self.current(ctx).map(|txn| txn as Arc<dyn Transaction>)
    }
}
