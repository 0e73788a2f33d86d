use std::path::Path;
use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

pub mod context;
pub mod dispatcher;
pub mod engines;
pub mod error;
pub mod registry;
pub mod types;

pub use crate::context::{Phase, Role, Route, TransactionContext};
pub use crate::dispatcher::{BeginPath, CompletionTarget, TransactionDispatcher};
pub use crate::engines::compensable::CompensableInvoker;
pub use crate::engines::{
    CompensableManager, CompensableTransaction, LocalCompensableManager,
    LocalTransactionManager, Transaction, TransactionHandle, TransactionManager,
};
pub use crate::error::{Result, TccError};
pub use crate::registry::{InvocationRegistry, InvocationScope, ThreadInvocationRegistry};
pub use crate::types::{CompensableInvocation, ExecutionContext, TransactionStatus, Xid, XidFactory};

use crate::engines::compensable::LoggingInvoker;
use crate::engines::local::manager::DEFAULT_TIMEOUT_SECS;

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Timeout applied to new transactions, in seconds
    pub default_timeout_secs: u32,
    /// `env_logger` filter used when `RUST_LOG` is not set
    pub log_filter: String,
    /// Node prefix for generated xids; random when absent
    pub node_id: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            log_filter: "info".to_string(),
            node_id: None,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_secs == 0 {
            return Err(TccError::Config(
                "default_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// In-memory engines wired behind a dispatcher
pub struct Runtime {
    config: Config,
    transaction_manager: Arc<LocalTransactionManager>,
    compensable_manager: Arc<LocalCompensableManager>,
    registry: Arc<ThreadInvocationRegistry>,
    dispatcher: Arc<TransactionDispatcher>,
}

impl Runtime {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_invoker(config, Arc::new(LoggingInvoker))
    }

    /// Runtime whose compensable engine confirms and cancels through `invoker`
    pub fn with_invoker(config: Config, invoker: Arc<dyn CompensableInvoker>) -> Result<Self> {
        config.validate()?;

        let xid_factory = Arc::new(match config.node_id {
            Some(node) => XidFactory::with_node(node),
            None => XidFactory::new(),
        });
        let transaction_manager = Arc::new(LocalTransactionManager::with_timeout(
            xid_factory,
            config.default_timeout_secs,
        ));
        let compensable_manager = Arc::new(LocalCompensableManager::with_invoker(
            Arc::clone(&transaction_manager),
            invoker,
        ));
        let registry = Arc::new(ThreadInvocationRegistry::new());

        let dispatcher = Arc::new(TransactionDispatcher::new(
            Arc::clone(&transaction_manager) as Arc<dyn TransactionManager>,
            Arc::clone(&compensable_manager) as Arc<dyn CompensableManager>,
            Arc::clone(&registry) as Arc<dyn InvocationRegistry>,
        ));
        info!(
            "TCC runtime ready (node {:08x}, default timeout {}s)",
            transaction_manager.xid_factory().node(),
            config.default_timeout_secs
        );

        Ok(Self {
            config,
            transaction_manager,
            compensable_manager,
            registry,
            dispatcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<TransactionDispatcher> {
        &self.dispatcher
    }

    pub fn transaction_manager(&self) -> &Arc<LocalTransactionManager> {
        &self.transaction_manager
    }

    pub fn compensable_manager(&self) -> &Arc<LocalCompensableManager> {
        &self.compensable_manager
    }

    pub fn registry(&self) -> &Arc<ThreadInvocationRegistry> {
        &self.registry
    }
}
