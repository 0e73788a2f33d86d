//! Transaction engines
//!
//! The dispatcher routes every lifecycle call to exactly one of two engines:
//! - **Atomic**: ACID transactions with no compensation semantics
//! - **Compensable**: Try-Confirm-Cancel transactions that confirm or cancel
//!   registered branches
//!
//! Both are consumed through the traits in [`handler`]. The `local` and
//! `compensable` modules hold in-memory implementations.

pub mod compensable;
pub mod handler;
pub mod local;

pub use handler::{
    CompensableManager, CompensableTransaction, Transaction, TransactionHandle,
    TransactionManager,
};

use crate::context::TransactionContext;

/// Which engine owns a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineType {
    /// Plain ACID/XA engine
    Atomic,
    /// TCC engine
    Compensable,
}

impl std::fmt::Display for EngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineType::Atomic => write!(f, "Atomic"),
            EngineType::Compensable => write!(f, "Compensable"),
        }
    }
}

impl EngineType {
    /// Engine responsible for transactions carrying `context`
    pub fn for_context(context: &TransactionContext) -> Self {
        if context.is_compensable() {
            EngineType::Compensable
        } else {
            EngineType::Atomic
        }
    }

    /// Get a human-readable description of the engine
    pub fn description(&self) -> &'static str {
        match self {
            EngineType::Atomic => "ACID engine with two-phase commit",
            EngineType::Compensable => "Try-Confirm-Cancel engine with compensating branches",
        }
    }

    /// Check if this engine drives confirm/cancel compensation
    pub fn supports_compensation(&self) -> bool {
        match self {
            EngineType::Atomic => false,
            EngineType::Compensable => true,
        }
    }
}

pub use compensable::{BranchState, LocalCompensableManager};
pub use local::LocalTransactionManager;
