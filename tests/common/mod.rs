//! Recording engines for dispatcher tests
//!
//! Both fakes hold a single current transaction regardless of the execution
//! context and append every call they receive to a shared journal.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use tcc_core::{
    CompensableInvocation, CompensableManager, CompensableTransaction, ExecutionContext, Result,
    TccError, ThreadInvocationRegistry, Transaction, TransactionContext, TransactionDispatcher,
    TransactionHandle, TransactionManager, TransactionStatus, Xid,
};

/// One call observed by a fake engine
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    AtomicBegin,
    AtomicCommit,
    AtomicRollback,
    AtomicSuspend,
    AtomicResume(Xid),
    AtomicSetRollbackOnly,
    AtomicSetTimeout(u32),
    CompensableBegin,
    CompensableCommit,
    CompensableRollback,
    CompensableSuspend,
    CompensableResume(Xid),
    CompensableSetRollbackOnly,
    CompensableSetTimeout(u32),
    GlobalBegin,
    GlobalCommit,
    GlobalRollback,
    Register(String),
}

pub type Journal = Arc<Mutex<Vec<Call>>>;

static NEXT_GLOBAL: AtomicU64 = AtomicU64::new(1);

fn next_xid() -> Xid {
    Xid {
        global: NEXT_GLOBAL.fetch_add(1, Ordering::SeqCst),
        branch: 0,
    }
}

#[derive(Debug)]
pub struct FakeTransaction {
    xid: Xid,
    context: TransactionContext,
    status: TransactionStatus,
}

impl FakeTransaction {
    pub fn new(context: TransactionContext) -> Arc<Self> {
        Arc::new(Self {
            xid: next_xid(),
            context,
            status: TransactionStatus::Active,
        })
    }
}

impl Transaction for FakeTransaction {
    fn xid(&self) -> Xid {
        self.xid
    }

    fn transaction_context(&self) -> TransactionContext {
        self.context
    }

    fn status(&self) -> TransactionStatus {
        self.status
    }
}

#[derive(Debug)]
pub struct FakeCompensableTransaction {
    xid: Xid,
    context: TransactionContext,
    wrapped: Option<Arc<FakeTransaction>>,
    registered: Mutex<Vec<CompensableInvocation>>,
    journal: Journal,
}

impl FakeCompensableTransaction {
    pub fn registered(&self) -> Vec<CompensableInvocation> {
        self.registered.lock().clone()
    }

    pub fn wrapped(&self) -> Option<&Arc<FakeTransaction>> {
        self.wrapped.as_ref()
    }
}

impl Transaction for FakeCompensableTransaction {
    fn xid(&self) -> Xid {
        self.xid
    }

    fn transaction_context(&self) -> TransactionContext {
        self.context
    }

    fn status(&self) -> TransactionStatus {
        TransactionStatus::Active
    }
}

impl CompensableTransaction for FakeCompensableTransaction {
    fn register_compensable(&self, invocation: CompensableInvocation) -> Result<()> {
        self.journal
            .lock()
            .push(Call::Register(invocation.method.clone()));
        self.registered.lock().push(invocation);
        Ok(())
    }

    fn transaction(&self) -> Option<Arc<dyn Transaction>> {
        self.wrapped
            .as_ref()
            .map(|txn| Arc::clone(txn) as Arc<dyn Transaction>)
    }
}

#[derive(Debug)]
pub struct FakeAtomicEngine {
    journal: Journal,
    current: Mutex<Option<Arc<FakeTransaction>>>,
}

impl FakeAtomicEngine {
    pub fn set_current(&self, txn: Option<Arc<FakeTransaction>>) {
        *self.current.lock() = txn;
    }

    fn record(&self, call: Call) {
        self.journal.lock().push(call);
    }
}

impl TransactionManager for FakeAtomicEngine {
    fn begin(&self, _ctx: &ExecutionContext) -> Result<()> {
        self.record(Call::AtomicBegin);
        *self.current.lock() = Some(FakeTransaction::new(TransactionContext::atomic()));
        Ok(())
    }

    fn commit(&self, _ctx: &ExecutionContext) -> Result<()> {
        self.record(Call::AtomicCommit);
        Ok(())
    }

    fn rollback(&self, _ctx: &ExecutionContext) -> Result<()> {
        self.record(Call::AtomicRollback);
        Ok(())
    }

    fn suspend(&self, _ctx: &ExecutionContext) -> Result<TransactionHandle> {
        self.record(Call::AtomicSuspend);
        let txn = self
            .current
            .lock()
            .take()
            .ok_or_else(|| TccError::system("nothing to suspend"))?;
        Ok(TransactionHandle::Atomic(txn as Arc<dyn Transaction>))
    }

    fn resume(&self, _ctx: &ExecutionContext, handle: TransactionHandle) -> Result<()> {
        self.record(Call::AtomicResume(handle.xid()));
        Ok(())
    }

    fn set_rollback_only(&self, _ctx: &ExecutionContext) -> Result<()> {
        self.record(Call::AtomicSetRollbackOnly);
        Ok(())
    }

    fn set_transaction_timeout(&self, _ctx: &ExecutionContext, seconds: u32) -> Result<()> {
        self.record(Call::AtomicSetTimeout(seconds));
        Ok(())
    }

    fn get_transaction_quietly(&self, _ctx: &ExecutionContext) -> Option<Arc<dyn Transaction>> {
        self.current
            .lock()
            .as_ref()
            .map(|txn| Arc::clone(txn) as Arc<dyn Transaction>)
    }
}

#[derive(Debug)]
pub struct FakeCompensableEngine {
    journal: Journal,
    current: Mutex<Option<Arc<FakeCompensableTransaction>>>,
    created: Mutex<Vec<Arc<FakeCompensableTransaction>>>,
    failure: Mutex<Option<String>>,
}

impl FakeCompensableEngine {
    /// Make `context` current, wrapping an atomic transaction when `wrapped`
    pub fn install(&self, context: TransactionContext, wrapped: bool) -> Arc<FakeCompensableTransaction> {
        let txn = self.create(context, wrapped);
        *self.current.lock() = Some(Arc::clone(&txn));
        txn
    }

    pub fn clear(&self) {
        *self.current.lock() = None;
    }

    /// Every transaction this engine created, in order
    pub fn created(&self) -> Vec<Arc<FakeCompensableTransaction>> {
        self.created.lock().clone()
    }

    /// Make the next completion call fail with a heuristic-mixed error
    pub fn fail_next_completion(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    fn create(&self, context: TransactionContext, wrapped: bool) -> Arc<FakeCompensableTransaction> {
        let txn = Arc::new(FakeCompensableTransaction {
            xid: next_xid(),
            context,
            wrapped: wrapped.then(|| FakeTransaction::new(TransactionContext::atomic())),
            registered: Mutex::new(Vec::new()),
            journal: Arc::clone(&self.journal),
        });
        self.created.lock().push(Arc::clone(&txn));
        txn
    }

    fn record(&self, call: Call) {
        self.journal.lock().push(call);
    }

    fn complete(&self, call: Call) -> Result<()> {
        self.record(call);
        match self.failure.lock().take() {
            Some(message) => Err(TccError::HeuristicMixed(message)),
            None => Ok(()),
        }
    }
}

impl TransactionManager for FakeCompensableEngine {
    fn begin(&self, _ctx: &ExecutionContext) -> Result<()> {
        self.record(Call::CompensableBegin);
        let txn = self.create(TransactionContext::participant(), true);
        *self.current.lock() = Some(txn);
        Ok(())
    }

    fn commit(&self, _ctx: &ExecutionContext) -> Result<()> {
        self.complete(Call::CompensableCommit)
    }

    fn rollback(&self, _ctx: &ExecutionContext) -> Result<()> {
        self.complete(Call::CompensableRollback)
    }

    fn suspend(&self, _ctx: &ExecutionContext) -> Result<TransactionHandle> {
        self.record(Call::CompensableSuspend);
        let txn = self
            .current
            .lock()
            .take()
            .ok_or_else(|| TccError::system("nothing to suspend"))?;
        Ok(TransactionHandle::Compensable(
            txn as Arc<dyn CompensableTransaction>,
        ))
    }

    fn resume(&self, _ctx: &ExecutionContext, handle: TransactionHandle) -> Result<()> {
        self.record(Call::CompensableResume(handle.xid()));
        Ok(())
    }

    fn set_rollback_only(&self, _ctx: &ExecutionContext) -> Result<()> {
        self.record(Call::CompensableSetRollbackOnly);
        Ok(())
    }

    fn set_transaction_timeout(&self, _ctx: &ExecutionContext, seconds: u32) -> Result<()> {
        self.record(Call::CompensableSetTimeout(seconds));
        Ok(())
    }

    fn get_transaction_quietly(&self, _ctx: &ExecutionContext) -> Option<Arc<dyn Transaction>> {
        self.current.lock().as_ref().and_then(|txn| txn.transaction())
    }
}

impl CompensableManager for FakeCompensableEngine {
    fn compensable_begin(&self, _ctx: &ExecutionContext) -> Result<()> {
        self.record(Call::GlobalBegin);
        let txn = self.create(TransactionContext::coordinator(), true);
        *self.current.lock() = Some(txn);
        Ok(())
    }

    fn compensable_commit(&self, _ctx: &ExecutionContext) -> Result<()> {
        self.complete(Call::GlobalCommit)
    }

    fn compensable_rollback(&self, _ctx: &ExecutionContext) -> Result<()> {
        self.complete(Call::GlobalRollback)
    }

    fn get_compensable_transaction_quietly(
        &self,
        _ctx: &ExecutionContext,
    ) -> Option<Arc<dyn CompensableTransaction>> {
        self.current
            .lock()
            .as_ref()
            .map(|txn| Arc::clone(txn) as Arc<dyn CompensableTransaction>)
    }
}

/// Dispatcher wired to the recording engines
pub struct Harness {
    pub journal: Journal,
    pub atomic: Arc<FakeAtomicEngine>,
    pub compensable: Arc<FakeCompensableEngine>,
    pub registry: Arc<ThreadInvocationRegistry>,
    pub dispatcher: TransactionDispatcher,
    pub ctx: ExecutionContext,
}

impl Harness {
    pub fn new() -> Self {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let atomic = Arc::new(FakeAtomicEngine {
            journal: Arc::clone(&journal),
            current: Mutex::new(None),
        });
        let compensable = Arc::new(FakeCompensableEngine {
            journal: Arc::clone(&journal),
            current: Mutex::new(None),
            created: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        });
        let registry = Arc::new(ThreadInvocationRegistry::new());
        let dispatcher = TransactionDispatcher::new(
            Arc::clone(&atomic) as Arc<dyn TransactionManager>,
            Arc::clone(&compensable) as Arc<dyn CompensableManager>,
            Arc::clone(&registry) as Arc<dyn tcc_core::InvocationRegistry>,
        );
        Self {
            journal,
            atomic,
            compensable,
            registry,
            dispatcher,
            ctx: ExecutionContext::new(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.journal.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.journal.lock().clear();
    }

    /// Install a bare atomic transaction as current
    pub fn with_atomic(&self) -> Arc<FakeTransaction> {
        let txn = FakeTransaction::new(TransactionContext::atomic());
        self.atomic.set_current(Some(Arc::clone(&txn)));
        txn
    }

    /// Install a compensable transaction with `context` as current
    pub fn with_compensable(&self, context: TransactionContext) -> Arc<FakeCompensableTransaction> {
        self.compensable.install(context, true)
    }

    /// Leave `invocation` pending on the harness context
    pub fn pending(&self, invocation: CompensableInvocation) {
        self.registry.register(&self.ctx, invocation);
    }
}

pub fn invocation(method: &str) -> CompensableInvocation {
    CompensableInvocation::new("accountService", method)
        .with_confirm(format!("{}Confirm", method))
        .with_cancel(format!("{}Cancel", method))
}

/// Compensating-phase variant of `context`
pub fn compensating(mut context: TransactionContext) -> TransactionContext {
    context
        .mark_compensating()
        .expect("only compensable contexts can compensate");
    context
}
