//! Transaction Manager for the Compensable engine
//!
//! ## Lifecycle
//! 1. COMPENSABLE BEGIN: new global transaction, coordinator role, trying
//!    phase, with an atomic branch opened on the Local engine
//! 2. BEGIN: open another atomic branch inside the current compensable
//!    transaction (participant work, nested calls during confirm/cancel,
//!    recovery work)
//! 3. COMMIT / ROLLBACK: finish the open branch. With no branch open, a
//!    transaction this process does not coordinate locally is completed:
//!    commit confirms, rollback cancels
//! 4. COMPENSABLE COMMIT / ROLLBACK: coordinator only. Finish the open branch,
//!    enter the compensating phase, then confirm (in order) or cancel (in
//!    reverse order) every registered invocation

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use super::invoker::{CompensableInvoker, LoggingInvoker};
use super::types::{BranchState, CompensableArchive, LocalCompensableTransaction};
use crate::context::{Role, TransactionContext};
use crate::engines::handler::{
    CompensableManager, CompensableTransaction, Transaction, TransactionHandle,
    TransactionManager,
};
use crate::engines::local::LocalTransactionManager;
use crate::error::{Result, TccError};
use crate::types::{CompensableInvocation, ExecutionContext, TransactionStatus, Xid};

/// The Compensable Transaction Manager
pub struct LocalCompensableManager {
    /// Engine that runs the atomic branches
    local: Arc<LocalTransactionManager>,
    invoker: Arc<dyn CompensableInvoker>,
    associated: Mutex<HashMap<ExecutionContext, Arc<LocalCompensableTransaction>>>,
    suspended: Mutex<HashMap<Xid, Arc<LocalCompensableTransaction>>>,
}

impl LocalCompensableManager {
    pub fn new(local: Arc<LocalTransactionManager>) -> Self {
        Self::with_invoker(local, Arc::new(LoggingInvoker))
    }

    pub fn with_invoker(
        local: Arc<LocalTransactionManager>,
        invoker: Arc<dyn CompensableInvoker>,
    ) -> Self {
        Self {
            local,
            invoker,
            associated: Mutex::new(HashMap::new()),
            suspended: Mutex::new(HashMap::new()),
        }
    }

    /// Local engine the branches run on
    pub fn local(&self) -> &Arc<LocalTransactionManager> {
        &self.local
    }

    /// Compensable transaction associated with `ctx`
    pub fn current(&self, ctx: &ExecutionContext) -> Option<Arc<LocalCompensableTransaction>> {
        self.associated.lock().get(ctx).cloned()
    }

    /// Attach a compensable transaction that arrived from a remote caller.
    ///
    /// `context` must be compensable and describe either a participant or a
    /// propagated coordinator.
    pub fn join(
        &self,
        ctx: &ExecutionContext,
        xid: Xid,
        context: TransactionContext,
    ) -> Result<Arc<LocalCompensableTransaction>> {
        if !context.is_compensable() || context.is_recoveried() {
            return Err(TccError::illegal_state(
                "only live compensable transactions can be joined",
            ));
        }
        if context.role() == Role::Coordinator {
            return Err(TccError::illegal_state(
                "a joined transaction cannot be a local coordinator",
            ));
        }
        let txn = Arc::new(LocalCompensableTransaction::new(
            xid.global_xid(),
            context,
            self.local.default_timeout_secs(),
        ));
        self.attach(ctx, Arc::clone(&txn))?;
        info!("Joined compensable transaction {} on {} as {:?}", xid, ctx, context.role());
        Ok(txn)
    }

    /// Attach a transaction rebuilt from recovery records.
    ///
    /// The transaction starts in its compensating phase with every invocation
    /// still awaiting its outcome.
    pub fn recover(
        &self,
        ctx: &ExecutionContext,
        xid: Xid,
        coordinator: bool,
        invocations: Vec<CompensableInvocation>,
    ) -> Result<Arc<LocalCompensableTransaction>> {
        let txn = Arc::new(LocalCompensableTransaction::new(
            xid.global_xid(),
            TransactionContext::recovered(coordinator),
            self.local.default_timeout_secs(),
        ));
        for invocation in invocations {
            txn.push_archive(CompensableArchive {
                branch_xid: None,
                invocation,
                state: BranchState::Registered,
            });
        }
        self.attach(ctx, Arc::clone(&txn))?;
        info!("Recovered compensable transaction {} on {}", xid, ctx);
        Ok(txn)
    }

    fn attach(&self, ctx: &ExecutionContext, txn: Arc<LocalCompensableTransaction>) -> Result<()> {
        let mut associated = self.associated.lock();
        if let Some(existing) = associated.get(ctx) {
            return Err(TccError::NotSupported(format!(
                "{} already has compensable transaction {}",
                ctx,
                existing.xid()
            )));
        }
        associated.insert(*ctx, txn);
        Ok(())
    }

    fn detach(&self, ctx: &ExecutionContext) {
        self.associated.lock().remove(ctx);
    }

    fn require_current(&self, ctx: &ExecutionContext) -> Result<Arc<LocalCompensableTransaction>> {
        self.current(ctx).ok_or_else(|| {
            TccError::illegal_state(format!("no compensable transaction on {}", ctx))
        })
    }

    fn require_coordinator(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<Arc<LocalCompensableTransaction>> {
        let txn = self.require_current(ctx)?;
        if !txn.transaction_context().is_coordinator() {
            return Err(TccError::illegal_state(format!(
                "transaction {} is not coordinated by this process",
                txn.xid()
            )));
        }
        Ok(txn)
    }

    /// Whether a branchless commit/rollback should complete the transaction
    fn completes_without_branch(context: &TransactionContext) -> bool {
        context.is_recoveried() || context.role() != Role::Coordinator
    }

    /// Enter the compensating phase and confirm or cancel every branch.
    ///
    /// Confirms run in registration order, cancels in reverse. A failing
    /// branch is marked `Failed`; the remaining branches still run.
    fn complete(&self, txn: &LocalCompensableTransaction, confirm: bool) -> Result<()> {
        txn.enter_compensating(confirm)?;

        let archives = txn.archives();
        let mut order: Vec<usize> = (0..archives.len()).collect();
        if !confirm {
            order.reverse();
        }

        let mut failures = Vec::new();
        for index in order {
            let archive = &archives[index];
            if archive.state != BranchState::Registered {
                continue;
            }
            let outcome = if confirm {
                self.invoker.confirm(&txn.xid(), &archive.invocation)
            } else {
                self.invoker.cancel(&txn.xid(), &archive.invocation)
            };
            match outcome {
                Ok(()) => {
                    let state = if confirm {
                        BranchState::Confirmed
                    } else {
                        BranchState::Cancelled
                    };
                    txn.set_archive_state(index, state);
                }
                Err(e) => {
                    warn!("Branch {} of {} failed: {}", archive.invocation, txn.xid(), e);
                    txn.set_archive_state(index, BranchState::Failed);
                    failures.push(archive.invocation.to_string());
                }
            }
        }

        if !failures.is_empty() {
            txn.set_status(TransactionStatus::Unknown);
            return Err(TccError::HeuristicMixed(format!(
                "transaction {}: {} branch(es) failed: {}",
                txn.xid(),
                failures.len(),
                failures.join(", ")
            )));
        }

        let status = if confirm {
            TransactionStatus::Committed
        } else {
            TransactionStatus::RolledBack
        };
        txn.set_status(status);
        info!("Compensable transaction {} {}", txn.xid(), status);
        Ok(())
    }

    /// Complete `txn` and drop its association with `ctx`.
    ///
    /// A rollback-only transaction is cancelled even when `confirm` is set and
    /// the caller gets a Rollback error.
    fn finish(
        &self,
        ctx: &ExecutionContext,
        txn: &LocalCompensableTransaction,
        confirm: bool,
    ) -> Result<()> {
        let rollback_only = txn.status() == TransactionStatus::MarkedRollback;
        let result = self.complete(txn, confirm && !rollback_only);
        self.detach(ctx);
        result?;
        if confirm && rollback_only {
            return Err(TccError::Rollback(format!(
                "compensable transaction {} was marked rollback-only",
                txn.xid()
            )));
        }
        Ok(())
    }
}

impl TransactionManager for LocalCompensableManager {
    fn begin(&self, ctx: &ExecutionContext) -> Result<()> {
        let txn = self.require_current(ctx)?;
        if txn.status().is_terminal() {
            return Err(TccError::illegal_state(format!(
                "transaction {} already completed",
                txn.xid()
            )));
        }
        let branch = self.local.begin_branch(ctx, Some(&txn.xid()))?;
        debug!("Branch {} opened in compensable transaction {}", branch.xid(), txn.xid());
        txn.set_branch(Some(branch));
        Ok(())
    }

    fn commit(&self, ctx: &ExecutionContext) -> Result<()> {
        let txn = self.require_current(ctx)?;
        if txn.take_branch().is_some() {
            return self.local.commit(ctx);
        }
        let context = txn.transaction_context();
        if !Self::completes_without_branch(&context) {
            return Err(TccError::illegal_state(format!(
                "transaction {} has no open branch to commit",
                txn.xid()
            )));
        }
        self.finish(ctx, &txn, true)
    }

    fn rollback(&self, ctx: &ExecutionContext) -> Result<()> {
        let txn = self.require_current(ctx)?;
        if txn.take_branch().is_some() {
            return self.local.rollback(ctx);
        }
        let context = txn.transaction_context();
        if !Self::completes_without_branch(&context) {
            return Err(TccError::illegal_state(format!(
                "transaction {} has no open branch to roll back",
                txn.xid()
            )));
        }
        self.finish(ctx, &txn, false)
    }

    fn suspend(&self, ctx: &ExecutionContext) -> Result<TransactionHandle> {
        let txn = self.associated.lock().remove(ctx).ok_or_else(|| {
            TccError::illegal_state(format!("no compensable transaction on {}", ctx))
        })?;
        if txn.branch().is_some() {
            if let Err(e) = self.local.suspend(ctx) {
                self.associated.lock().insert(*ctx, txn);
                return Err(e);
            }
        }
        self.suspended.lock().insert(txn.xid(), Arc::clone(&txn));
        debug!("Compensable transaction {} suspended from {}", txn.xid(), ctx);
        Ok(TransactionHandle::Compensable(txn))
    }

    fn resume(&self, ctx: &ExecutionContext, handle: TransactionHandle) -> Result<()> {
        if !handle.transaction_context().is_compensable() {
            return Err(TccError::InvalidTransaction(format!(
                "transaction {} is not compensable",
                handle.xid()
            )));
        }
        if self.associated.lock().contains_key(ctx) {
            return Err(TccError::illegal_state(format!(
                "{} already has a compensable transaction",
                ctx
            )));
        }

        let txn = self.suspended.lock().remove(&handle.xid()).ok_or_else(|| {
            TccError::InvalidTransaction(format!(
                "transaction {} was not suspended by this engine",
                handle.xid()
            ))
        })?;
        if let Some(branch) = txn.branch() {
            let branch_handle = TransactionHandle::Atomic(branch as Arc<dyn Transaction>);
            if let Err(e) = self.local.resume(ctx, branch_handle) {
                self.suspended.lock().insert(txn.xid(), txn);
                return Err(e);
            }
        }
        debug!("Compensable transaction {} resumed on {}", txn.xid(), ctx);
        self.attach(ctx, txn)
    }

    fn set_rollback_only(&self, ctx: &ExecutionContext) -> Result<()> {
        let txn = self.require_current(ctx)?;
        if txn.branch().is_some() {
            self.local.set_rollback_only(ctx)?;
        }
        txn.set_status(TransactionStatus::MarkedRollback);
        debug!("Compensable transaction {} marked rollback-only", txn.xid());
        Ok(())
    }

    fn set_transaction_timeout(&self, ctx: &ExecutionContext, seconds: u32) -> Result<()> {
        let txn = self.require_current(ctx)?;
        if txn.branch().is_some() {
            self.local.set_transaction_timeout(ctx, seconds)?;
        }
        let seconds = if seconds == 0 {
            self.local.default_timeout_secs()
        } else {
            seconds
        };
        txn.set_timeout(seconds);
        Ok(())
    }

    fn get_transaction_quietly(&self, ctx: &ExecutionContext) -> Option<Arc<dyn Transaction>> {
        self.current(ctx).and_then(|txn| txn.transaction())
    }
}

impl CompensableManager for LocalCompensableManager {
    fn compensable_begin(&self, ctx: &ExecutionContext) -> Result<()> {
        if let Some(existing) = self.current(ctx) {
            return Err(TccError::NotSupported(format!(
                "{} already has compensable transaction {}",
                ctx,
                existing.xid()
            )));
        }

        let xid = self.local.xid_factory().create_global();
        let branch = self.local.begin_branch(ctx, Some(&xid))?;
        let txn = Arc::new(LocalCompensableTransaction::new(
            xid,
            TransactionContext::coordinator(),
            self.local.default_timeout_secs(),
        ));
        txn.set_branch(Some(branch));
        if let Err(e) = self.attach(ctx, txn) {
            let _ = self.local.rollback(ctx);
            return Err(e);
        }
        info!("Compensable transaction {} started on {}", xid, ctx);
        Ok(())
    }

    fn compensable_commit(&self, ctx: &ExecutionContext) -> Result<()> {
        let txn = self.require_coordinator(ctx)?;
        if txn.take_branch().is_some() {
            if let Err(e) = self.local.commit(ctx) {
                warn!("Try phase of {} failed, cancelling: {}", txn.xid(), e);
                self.finish(ctx, &txn, false)?;
                return Err(TccError::Rollback(format!(
                    "try phase of {} failed: {}",
                    txn.xid(),
                    e
                )));
            }
        }
        self.finish(ctx, &txn, true)
    }

    fn compensable_rollback(&self, ctx: &ExecutionContext) -> Result<()> {
        let txn = self.require_coordinator(ctx)?;
        if txn.take_branch().is_some() {
            if let Err(e) = self.local.rollback(ctx) {
                warn!("Rollback of try branch in {} failed: {}", txn.xid(), e);
            }
        }
        self.finish(ctx, &txn, false)
    }

    fn get_compensable_transaction_quietly(
        &self,
        ctx: &ExecutionContext,
    ) -> Option<Arc<dyn CompensableTransaction>> {
        self.current(ctx)
            .map(|txn| txn as Arc<dyn CompensableTransaction>)
    }
}
