//! Pending compensable invocations
//!
//! The interception layer records the invocation it is about to run before
//! calling a compensable business method and clears it afterwards. The
//! dispatcher reads it on `begin` to tell an outermost compensable entry from
//! a framework-level call on a context that already has a transaction.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::{CompensableInvocation, ExecutionContext};

/// Read side of the registry, as consumed by the dispatcher
pub trait InvocationRegistry: Send + Sync {
    /// Invocation pending on `ctx`, if any. No side effects.
    fn current(&self, ctx: &ExecutionContext) -> Option<CompensableInvocation>;
}

/// At most one pending invocation per execution context
#[derive(Debug, Default)]
pub struct ThreadInvocationRegistry {
    pending: Mutex<HashMap<ExecutionContext, CompensableInvocation>>,
}

impl ThreadInvocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `invocation` as pending on `ctx`, returning the one it replaces
    pub fn register(
        &self,
        ctx: &ExecutionContext,
        invocation: CompensableInvocation,
    ) -> Option<CompensableInvocation> {
        log::trace!("{} pending on {}", invocation, ctx);
        self.pending.lock().insert(*ctx, invocation)
    }

    pub fn unregister(&self, ctx: &ExecutionContext) -> Option<CompensableInvocation> {
        self.pending.lock().remove(ctx)
    }

    /// Register `invocation` for as long as the returned scope lives
    pub fn scope(
        self: &Arc<Self>,
        ctx: &ExecutionContext,
        invocation: CompensableInvocation,
    ) -> InvocationScope {
        self.register(ctx, invocation);
        InvocationScope {
            registry: Arc::clone(self),
            ctx: *ctx,
        }
    }
}

impl InvocationRegistry for ThreadInvocationRegistry {
    fn current(&self, ctx: &ExecutionContext) -> Option<CompensableInvocation> {
        self.pending.lock().get(ctx).cloned()
    }
}

/// Clears the pending invocation of its context when dropped
#[must_use = "the invocation is cleared as soon as the scope is dropped"]
pub struct InvocationScope {
    registry: Arc<ThreadInvocationRegistry>,
    ctx: ExecutionContext,
}

impl InvocationScope {
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }
}

impl Drop for InvocationScope {
    fn drop(&mut self) {
        self.registry.unregister(&self.ctx);
    }
}
