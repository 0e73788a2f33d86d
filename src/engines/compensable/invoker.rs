//! Confirm/cancel invocation seam
//!
//! How a branch's confirm or cancel method is physically invoked belongs to
//! the container hosting the business beans. The engine only calls this trait.

use crate::error::Result;
use crate::types::{CompensableInvocation, Xid};

/// Runs the second phase of a registered branch
pub trait CompensableInvoker: Send + Sync {
    fn confirm(&self, xid: &Xid, invocation: &CompensableInvocation) -> Result<()>;

    fn cancel(&self, xid: &Xid, invocation: &CompensableInvocation) -> Result<()>;
}

/// Invoker that only logs; every confirm and cancel succeeds
#[derive(Debug, Default)]
pub struct LoggingInvoker;

impl CompensableInvoker for LoggingInvoker {
    fn confirm(&self, xid: &Xid, invocation: &CompensableInvocation) -> Result<()> {
        let target = invocation
            .confirmable_key
            .as_deref()
            .unwrap_or(&invocation.identifier);
        log::info!("Confirm {} via {} for {}", invocation, target, xid);
        Ok(())
    }

    fn cancel(&self, xid: &Xid, invocation: &CompensableInvocation) -> Result<()> {
        let target = invocation
            .cancellable_key
            .as_deref()
            .unwrap_or(&invocation.identifier);
        log::info!("Cancel {} via {} for {}", invocation, target, xid);
        Ok(())
    }
}
