//! Local Engine - in-memory atomic transactions
//!
//! Holds at most one atomic transaction per execution context. Nested begin
//! is not supported; suspended transactions are parked by xid until resumed
//! on any context.

pub mod manager;
pub mod types;

pub use manager::LocalTransactionManager;
pub use types::LocalTransaction;
