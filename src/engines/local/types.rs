//! Atomic transaction type and its state

use parking_lot::Mutex;

use crate::context::TransactionContext;
use crate::engines::handler::Transaction;
use crate::types::{TransactionStatus, Xid};

/// Mutable part of a local transaction
#[derive(Debug, Clone, Copy)]
pub(crate) struct LocalState {
    pub(crate) status: TransactionStatus,
    pub(crate) timeout_secs: u32,
}

/// In-memory atomic transaction
#[derive(Debug)]
pub struct LocalTransaction {
    xid: Xid,
    context: TransactionContext,
    state: Mutex<LocalState>,
}

impl LocalTransaction {
    pub fn new(xid: Xid, timeout_secs: u32) -> Self {
        Self {
            xid,
            context: TransactionContext::atomic(),
            state: Mutex::new(LocalState {
                status: TransactionStatus::Active,
                timeout_secs,
            }),
        }
    }

    pub fn timeout_secs(&self) -> u32 {
        self.state.lock().timeout_secs
    }

    pub fn is_rollback_only(&self) -> bool {
        self.state.lock().status == TransactionStatus::MarkedRollback
    }

    pub(crate) fn set_status(&self, status: TransactionStatus) {
        self.state.lock().status = status;
    }

    pub(crate) fn set_timeout(&self, seconds: u32) {
        self.state.lock().timeout_secs = seconds;
    }
}

impl Transaction for LocalTransaction {
    fn xid(&self) -> Xid {
        self.xid
    }

    fn transaction_context(&self) -> TransactionContext {
        self.context
    }

    fn status(&self) -> TransactionStatus {
        self.state.lock().status
    }
}
