//! Compensable Engine - in-memory Try-Confirm-Cancel transactions
//!
//! ## Architecture
//! - A compensable transaction is associated with one execution context
//! - Business work runs in atomic branches begun on the Local engine and
//!   wrapped by the compensable transaction
//! - Registered invocations are confirmed in registration order or cancelled
//!   in reverse order once the transaction enters its compensating phase

mod invoker;
pub mod manager;
mod types;

pub use invoker::{CompensableInvoker, LoggingInvoker};
pub use manager::LocalCompensableManager;
pub use types::{BranchState, CompensableArchive, LocalCompensableTransaction};
