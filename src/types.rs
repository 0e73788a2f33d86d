//! Core types for the TCC core
//!
//! Defines execution contexts, transaction identifiers, JTA-style status codes
//! and the captured description of a compensable invocation.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one logical thread of execution.
///
/// Everything the engines and the invocation registry consider "current" is
/// keyed by this value, so callers pass it explicitly on every lifecycle call
/// instead of relying on ambient thread-local lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionContext {
    id: u64,
}

impl ExecutionContext {
    /// Allocate a fresh, process-unique context
    pub fn new() -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.id)
    }
}

/// Transaction status, numbered as in JTA `javax.transaction.Status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Active,
    MarkedRollback,
    Prepared,
    Committed,
    RolledBack,
    Unknown,
    NoTransaction,
    Preparing,
    Committing,
    RollingBack,
}

impl TransactionStatus {
    /// Numeric status code
    pub fn code(&self) -> i32 {
        match self {
            TransactionStatus::Active => 0,
            TransactionStatus::MarkedRollback => 1,
            TransactionStatus::Prepared => 2,
            TransactionStatus::Committed => 3,
            TransactionStatus::RolledBack => 4,
            TransactionStatus::Unknown => 5,
            TransactionStatus::NoTransaction => 6,
            TransactionStatus::Preparing => 7,
            TransactionStatus::Committing => 8,
            TransactionStatus::RollingBack => 9,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let status = match code {
            0 => TransactionStatus::Active,
            1 => TransactionStatus::MarkedRollback,
            2 => TransactionStatus::Prepared,
            3 => TransactionStatus::Committed,
            4 => TransactionStatus::RolledBack,
            5 => TransactionStatus::Unknown,
            6 => TransactionStatus::NoTransaction,
            7 => TransactionStatus::Preparing,
            8 => TransactionStatus::Committing,
            9 => TransactionStatus::RollingBack,
            _ => return None,
        };
        Some(status)
    }

    /// Whether the transaction has reached a final outcome
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Committed | TransactionStatus::RolledBack
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Active => "ACTIVE",
            TransactionStatus::MarkedRollback => "MARKED_ROLLBACK",
            TransactionStatus::Prepared => "PREPARED",
            TransactionStatus::Committed => "COMMITTED",
            TransactionStatus::RolledBack => "ROLLEDBACK",
            TransactionStatus::Unknown => "UNKNOWN",
            TransactionStatus::NoTransaction => "NO_TRANSACTION",
            TransactionStatus::Preparing => "PREPARING",
            TransactionStatus::Committing => "COMMITTING",
            TransactionStatus::RollingBack => "ROLLING_BACK",
        };
        write!(f, "{}", name)
    }
}

/// Transaction identifier: a global id plus a branch qualifier.
///
/// A branch qualifier of 0 identifies the global transaction itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Xid {
    pub global: u64,
    pub branch: u64,
}

impl Xid {
    pub fn is_global(&self) -> bool {
        self.branch == 0
    }

    /// The global transaction this xid belongs to
    pub fn global_xid(&self) -> Xid {
        Xid {
            global: self.global,
            branch: 0,
        }
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}:{:016x}", self.global, self.branch)
    }
}

/// Generates xids unique to this process.
///
/// The upper 32 bits of every global id carry a node prefix; the lower 32 bits
/// come from a monotonic sequence shared with branch qualifiers.
#[derive(Debug)]
pub struct XidFactory {
    node: u32,
    sequence: AtomicU64,
}

impl XidFactory {
    /// Factory with a random node prefix
    pub fn new() -> Self {
        Self::with_node(rand::random::<u32>())
    }

    pub fn with_node(node: u32) -> Self {
        Self {
            node,
            sequence: AtomicU64::new(1),
        }
    }

    pub fn node(&self) -> u32 {
        self.node
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) & 0xffff_ffff
    }

    /// New global transaction id
    pub fn create_global(&self) -> Xid {
        Xid {
            global: ((self.node as u64) << 32) | self.next_sequence(),
            branch: 0,
        }
    }

    /// New branch under an existing global transaction
    pub fn create_branch(&self, global: &Xid) -> Xid {
        Xid {
            global: global.global,
            branch: self.next_sequence(),
        }
    }
}

impl Default for XidFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Captured description of a compensable call about to execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensableInvocation {
    /// Identifier of the target bean
    pub identifier: String,
    /// Name of the business (try) method
    pub method: String,
    /// Arguments the try method is invoked with
    pub args: Vec<JsonValue>,
    /// Bean that confirms this invocation, if not the target itself
    pub confirmable_key: Option<String>,
    /// Bean that cancels this invocation, if not the target itself
    pub cancellable_key: Option<String>,
}

impl CompensableInvocation {
    pub fn new(identifier: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            method: method.into(),
            args: Vec::new(),
            confirmable_key: None,
            cancellable_key: None,
        }
    }

    pub fn with_args(mut self, args: Vec<JsonValue>) -> Self {
        self.args = args;
        self
    }

    pub fn with_confirm(mut self, key: impl Into<String>) -> Self {
        self.confirmable_key = Some(key.into());
        self
    }

    pub fn with_cancel(mut self, key: impl Into<String>) -> Self {
        self.cancellable_key = Some(key.into());
        self
    }
}

impl fmt::Display for CompensableInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}({} args)", self.identifier, self.method, self.args.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execution_contexts_are_unique() {
        let a = ExecutionContext::new();
        let b = ExecutionContext::new();
        assert_ne!(a, b);
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(TransactionStatus::Active.code(), 0);
        assert_eq!(TransactionStatus::NoTransaction.code(), 6);
        assert_eq!(TransactionStatus::RollingBack.code(), 9);
        for code in 0..10 {
            let status = TransactionStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(TransactionStatus::from_code(10), None);
    }

    #[test]
    fn test_terminal_status() {
        assert!(TransactionStatus::Committed.is_terminal());
        assert!(TransactionStatus::RolledBack.is_terminal());
        assert!(!TransactionStatus::Active.is_terminal());
        assert!(!TransactionStatus::MarkedRollback.is_terminal());
    }

    #[test]
    fn test_xid_factory_node_prefix() {
        let factory = XidFactory::with_node(0xabcd);
        let global = factory.create_global();
        assert!(global.is_global());
        assert_eq!(global.global >> 32, 0xabcd);

        let branch = factory.create_branch(&global);
        assert!(!branch.is_global());
        assert_eq!(branch.global_xid(), global);
        assert_ne!(factory.create_global(), global);
    }

    #[test]
    fn test_xid_display() {
        let xid = Xid { global: 0x10, branch: 0x2 };
        assert_eq!(xid.to_string(), "0000000000000010:0000000000000002");
    }

    #[test]
    fn test_invocation_builder() {
        let invocation = CompensableInvocation::new("accountService", "transfer")
            .with_args(vec![json!("acct-1"), json!(100)])
            .with_confirm("accountConfirm")
            .with_cancel("accountCancel");
        assert_eq!(invocation.args.len(), 2);
        assert_eq!(invocation.confirmable_key.as_deref(), Some("accountConfirm"));
        assert_eq!(invocation.to_string(), "accountService#transfer(2 args)");
    }
}
