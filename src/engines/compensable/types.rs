//! Compensable transaction type, its branches and its state

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::context::TransactionContext;
use crate::engines::handler::{CompensableTransaction, Transaction};
use crate::engines::local::LocalTransaction;
use crate::error::{Result, TccError};
use crate::types::{CompensableInvocation, TransactionStatus, Xid};

/// Outcome of one registered branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchState {
    /// Try method recorded; no outcome yet
    Registered,
    Confirmed,
    Cancelled,
    /// Confirm or cancel failed; needs recovery
    Failed,
}

/// A registered invocation and what happened to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensableArchive {
    /// Atomic branch the try method ran in, if one was open
    pub branch_xid: Option<Xid>,
    pub invocation: CompensableInvocation,
    pub state: BranchState,
}

#[derive(Debug)]
pub(crate) struct CompensableState {
    pub(crate) context: TransactionContext,
    pub(crate) status: TransactionStatus,
    /// Open atomic branch, if any
    pub(crate) branch: Option<Arc<LocalTransaction>>,
    pub(crate) archives: Vec<CompensableArchive>,
    pub(crate) timeout_secs: u32,
}

/// In-memory compensable transaction
#[derive(Debug)]
pub struct LocalCompensableTransaction {
    xid: Xid,
    state: Mutex<CompensableState>,
}

impl LocalCompensableTransaction {
    pub fn new(xid: Xid, context: TransactionContext, timeout_secs: u32) -> Self {
        Self {
            xid,
            state: Mutex::new(CompensableState {
                context,
                status: TransactionStatus::Active,
                branch: None,
                archives: Vec::new(),
                timeout_secs,
            }),
        }
    }

    /// Snapshot of all registered branches in registration order
    pub fn archives(&self) -> Vec<CompensableArchive> {
        self.state.lock().archives.clone()
    }

    pub fn branch(&self) -> Option<Arc<LocalTransaction>> {
        self.state.lock().branch.clone()
    }

    pub fn timeout_secs(&self) -> u32 {
        self.state.lock().timeout_secs
    }

    pub(crate) fn set_branch(&self, branch: Option<Arc<LocalTransaction>>) {
        self.state.lock().branch = branch;
    }

    pub(crate) fn take_branch(&self) -> Option<Arc<LocalTransaction>> {
        self.state.lock().branch.take()
    }

    pub(crate) fn set_status(&self, status: TransactionStatus) {
        self.state.lock().status = status;
    }

    pub(crate) fn set_timeout(&self, seconds: u32) {
        self.state.lock().timeout_secs = seconds;
    }

    pub(crate) fn push_archive(&self, archive: CompensableArchive) {
        self.state.lock().archives.push(archive);
    }

    pub(crate) fn set_archive_state(&self, index: usize, branch_state: BranchState) {
        if let Some(archive) = self.state.lock().archives.get_mut(index) {
            archive.state = branch_state;
        }
    }

    /// Move into the compensating phase and report the status in effect
    /// while branches are being completed
    pub(crate) fn enter_compensating(&self, confirm: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.context.mark_compensating()?;
        state.status = if confirm {
            TransactionStatus::Committing
        } else {
            TransactionStatus::RollingBack
        };
        Ok(())
    }
}

impl Transaction for LocalCompensableTransaction {
    fn xid(&self) -> Xid {
        self.xid
    }

    fn transaction_context(&self) -> TransactionContext {
        self.state.lock().context
    }

    fn status(&self) -> TransactionStatus {
        self.state.lock().status
    }
}

impl CompensableTransaction for LocalCompensableTransaction {
    fn register_compensable(&self, invocation: CompensableInvocation) -> Result<()> {
        let mut state = self.state.lock();
        if state.status != TransactionStatus::Active {
            return Err(TccError::illegal_state(format!(
                "cannot register {} on transaction {} in status {}",
                invocation, self.xid, state.status
            )));
        }
        let branch_xid = state.branch.as_ref().map(|branch| branch.xid());
        log::debug!("Registered {} on transaction {}", invocation, self.xid);
        state.archives.push(CompensableArchive {
            branch_xid,
            invocation,
            state: BranchState::Registered,
        });
        Ok(())
    }

    fn transaction(&self) -> Option<Arc<dyn Transaction>> {
        self.branch().map(|branch| branch as Arc<dyn Transaction>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xid() -> Xid {
        Xid { global: 42, branch: 0 }
    }

    #[test]
    fn test_register_records_open_branch() {
        let txn = LocalCompensableTransaction::new(xid(), TransactionContext::coordinator(), 60);
        txn.register_compensable(CompensableInvocation::new("a", "try1"))
            .unwrap();

        let branch = Arc::new(LocalTransaction::new(Xid { global: 42, branch: 3 }, 60));
        txn.set_branch(Some(branch));
        txn.register_compensable(CompensableInvocation::new("b", "try2"))
            .unwrap();

        let archives = txn.archives();
        assert_eq!(archives.len(), 2);
        assert_eq!(archives[0].branch_xid, None);
        assert_eq!(archives[1].branch_xid, Some(Xid { global: 42, branch: 3 }));
        assert!(archives.iter().all(|a| a.state == BranchState::Registered));
    }

    #[test]
    fn test_register_rejected_after_completion() {
        let txn = LocalCompensableTransaction::new(xid(), TransactionContext::coordinator(), 60);
        txn.set_status(TransactionStatus::Committed);
        assert!(txn
            .register_compensable(CompensableInvocation::new("a", "try1"))
            .is_err());
    }

    #[test]
    fn test_enter_compensating() {
        let txn = LocalCompensableTransaction::new(xid(), TransactionContext::coordinator(), 60);
        txn.enter_compensating(false).unwrap();
        assert!(txn.transaction_context().is_compensating());
        assert_eq!(txn.status(), TransactionStatus::RollingBack);
    }

    #[test]
    fn test_wrapped_transaction() {
        let txn = LocalCompensableTransaction::new(xid(), TransactionContext::participant(), 60);
        assert!(txn.transaction().is_none());

        let branch = Arc::new(LocalTransaction::new(Xid { global: 42, branch: 9 }, 60));
        txn.set_branch(Some(branch));
        assert_eq!(txn.transaction().unwrap().xid().branch, 9);
        assert!(txn.take_branch().is_some());
        assert!(txn.transaction().is_none());
    }
}
