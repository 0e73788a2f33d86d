//! tcc-core - walk-through of the TCC transaction dispatcher
//!
//! Runs one lifecycle scenario against the in-memory engines and prints the
//! statuses the dispatcher reports along the way.
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Application / remote-call interceptors           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Transaction Dispatcher                     │
//! │   (begin path, commit/rollback target, engine selection)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    ┌─────────┴─────────┐
//!                    ▼                   ▼
//! ┌──────────────────────────┐ ┌────────────────────────────────┐
//! │      Atomic engine       │ │      Compensable engine        │
//! │   (ACID transactions)    │ │  (try branches, confirm/cancel)│
//! └──────────────────────────┘ └────────────────────────────────┘

use std::path::PathBuf;

use log::info;
use serde_json::json;

use tcc_core::engines::compensable::LocalCompensableTransaction;
use tcc_core::{
    CompensableInvocation, CompensableTransaction, Config, ExecutionContext, Result, Runtime,
    TccError, Transaction, TransactionContext,
};

const SCENARIOS: &[&str] = &["atomic", "coordinator", "cancel", "participant", "recovery"];

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut timeout: Option<u32> = None;
    let mut scenario = "coordinator".to_string();

    // Simple argument parsing
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--timeout" | "-t" => {
                if i + 1 < args.len() {
                    timeout = Some(args[i + 1].parse()?);
                    i += 1;
                }
            }
            "--scenario" | "-s" => {
                if i + 1 < args.len() {
                    scenario = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("tcc-core - TCC transaction dispatcher walk-through");
                println!();
                println!("Usage: tcc-core [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config FILE      JSON configuration file");
                println!("  -t, --timeout SECS     Default transaction timeout (default: 60)");
                println!("  -s, --scenario NAME    One of: {}", SCENARIOS.join(", "));
                println!("  -h, --help             Show this help");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = match config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(timeout) = timeout {
        config.default_timeout_secs = timeout;
    }

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_filter.as_str()),
    )
    .init();

    let runtime = Runtime::new(config)?;
    info!("Running scenario '{}'", scenario);

    match scenario.as_str() {
        "atomic" => run_atomic(&runtime)?,
        "coordinator" => run_coordinator(&runtime, true)?,
        "cancel" => run_coordinator(&runtime, false)?,
        "participant" => run_participant(&runtime)?,
        "recovery" => run_recovery(&runtime)?,
        other => {
            return Err(TccError::Config(format!(
                "unknown scenario '{}', expected one of: {}",
                other,
                SCENARIOS.join(", ")
            ))
            .into());
        }
    }

    Ok(())
}

fn report(runtime: &Runtime, ctx: &ExecutionContext, step: &str) -> Result<()> {
    let status = runtime.dispatcher().get_status(ctx)?;
    println!("{:<28} status={} ({})", step, status, status.code());
    Ok(())
}

fn run_atomic(runtime: &Runtime) -> Result<()> {
    let dispatcher = runtime.dispatcher();
    let ctx = ExecutionContext::new();

    report(runtime, &ctx, "before begin")?;
    dispatcher.begin(&ctx)?;
    report(runtime, &ctx, "after begin")?;
    dispatcher.set_transaction_timeout(&ctx, 30)?;
    dispatcher.commit(&ctx)?;
    report(runtime, &ctx, "after commit")
}

fn transfer(from: &str, to: &str, amount: u64) -> CompensableInvocation {
    CompensableInvocation::new("transferService", "transfer")
        .with_args(vec![json!(from), json!(to), json!(amount)])
        .with_confirm("transferConfirm")
        .with_cancel("transferCancel")
}

fn run_coordinator(runtime: &Runtime, confirm: bool) -> Result<()> {
    let dispatcher = runtime.dispatcher();
    let ctx = ExecutionContext::new();

    {
        let _scope = runtime.registry().scope(&ctx, transfer("acct-1", "acct-2", 100));
        dispatcher.begin(&ctx)?;
        report(runtime, &ctx, "trying")?;
    }

    let txn = runtime
        .compensable_manager()
        .current(&ctx)
        .ok_or_else(|| TccError::illegal_state("no compensable transaction after begin"))?;

    if confirm {
        dispatcher.commit(&ctx)?;
    } else {
        dispatcher.rollback(&ctx)?;
    }
    report(runtime, &ctx, "after completion")?;
    print_archives(&txn);
    Ok(())
}

fn run_participant(runtime: &Runtime) -> Result<()> {
    let dispatcher = runtime.dispatcher();
    let ctx = ExecutionContext::new();
    let xid = runtime.transaction_manager().xid_factory().create_global();

    let txn = runtime
        .compensable_manager()
        .join(&ctx, xid, TransactionContext::participant())?;
    {
        let invocation = transfer("acct-3", "acct-4", 25);
        let _scope = runtime.registry().scope(&ctx, invocation.clone());
        dispatcher.begin(&ctx)?;
        // Participant branches are registered by the engine's own interceptor
        txn.register_compensable(invocation)?;
        report(runtime, &ctx, "participant branch open")?;
        dispatcher.commit(&ctx)?;
    }
    report(runtime, &ctx, "participant branch done")?;

    // Outcome decided by the remote coordinator
    dispatcher.commit(&ctx)?;
    report(runtime, &ctx, "participant confirmed")?;
    print_archives(&txn);
    Ok(())
}

fn run_recovery(runtime: &Runtime) -> Result<()> {
    let dispatcher = runtime.dispatcher();
    let ctx = ExecutionContext::new();
    let xid = runtime.transaction_manager().xid_factory().create_global();

    let txn = runtime.compensable_manager().recover(
        &ctx,
        xid,
        true,
        vec![transfer("acct-5", "acct-6", 10), transfer("acct-6", "acct-7", 10)],
    )?;

    dispatcher.begin(&ctx)?;
    report(runtime, &ctx, "recovery branch open")?;
    dispatcher.commit(&ctx)?;
    dispatcher.rollback(&ctx)?;
    report(runtime, &ctx, "recovered and cancelled")?;
    print_archives(&txn);
    Ok(())
}

fn print_archives(txn: &LocalCompensableTransaction) {
    println!("branches of {} (final status {}):", txn.xid(), txn.status());
    for archive in txn.archives() {
        println!("  {:<40} {:?}", archive.invocation.to_string(), archive.state);
    }
}
