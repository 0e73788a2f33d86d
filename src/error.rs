//! Error types for the TCC core
//!
//! One error type is shared by the dispatcher and both engines. The dispatcher
//! never rewrites an engine error; whatever the engine returns reaches the
//! caller as-is.

use std::io;

use thiserror::Error;

use crate::types::TransactionStatus;

/// Unified error type for transaction lifecycle operations
#[derive(Debug, Error)]
pub enum TccError {
    /// No transaction where one is required, an unsupported operation, or a
    /// transaction context that breaks an invariant
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Infrastructure failure inside an engine
    #[error("system error: {0}")]
    System(String),

    /// Nested begin on an engine that does not allow it
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The transaction was rolled back instead of committed
    #[error("transaction rolled back: {0}")]
    Rollback(String),

    /// Some branches committed and some rolled back
    #[error("heuristic mixed outcome: {0}")]
    HeuristicMixed(String),

    /// All branches were heuristically rolled back
    #[error("heuristic rollback: {0}")]
    HeuristicRollback(String),

    /// A transaction handle passed to `resume` is inconsistent
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TccError {
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        TccError::IllegalState(msg.into())
    }

    pub fn system(msg: impl Into<String>) -> Self {
        TccError::System(msg.into())
    }

    /// Whether the error reports a rollback-family outcome decided by an engine
    pub fn is_rollback_related(&self) -> bool {
        matches!(
            self,
            TccError::Rollback(_) | TccError::HeuristicMixed(_) | TccError::HeuristicRollback(_)
        )
    }

    /// Status a caller should report after this error, if the error itself
    /// determines one
    pub fn status_hint(&self) -> Option<TransactionStatus> {
        match self {
            TccError::Rollback(_) | TccError::HeuristicRollback(_) => {
                Some(TransactionStatus::RolledBack)
            }
            TccError::HeuristicMixed(_) => Some(TransactionStatus::Unknown),
            _ => None,
        }
    }
}

/// Result type alias for TCC operations
pub type Result<T> = std::result::Result<T, TccError>;
