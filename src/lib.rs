//! Process-level wiring for the `fleetcored` control plane binary.
pub mod config;
pub mod logging;

use std::sync::Arc;

use anyhow::Result;

use fleetcore_context::Context;
use fleetcore_engine::Engine;
use fleetcore_engine::EngineConf;
use fleetcore_events::emit::LoggingBackend;
use fleetcore_lock::LockManager;
use fleetcore_scheduler::Scheduler;
use fleetcore_store::memory::MemoryBackend;
use fleetcore_store::Store;

pub use self::config::Config;

/// Assemble an [`Engine`] from process configuration.
///
/// The in-memory store and an empty profile driver registry are what a bare process boots with;
/// a real deployment supplies its own `StoreBackend` and registers the `ProfileDriver`s its
/// infrastructure needs before calling this (driver discovery is deliberately out of scope here,
/// see `SPEC_FULL.md` §6).
pub fn build_engine(context: Context, config: &Config) -> Engine {
    let conf = EngineConf {
        store: Store::new(MemoryBackend::new()),
        locks: Arc::new(LockManager::new()),
        scheduler: Scheduler::new(),
        policies: fleetcore_policy::builtin_registry(),
        drivers: fleetcore_actions::ProfileDriverRegistry::build().finish(),
        events: LoggingBackend.into(),
        dispatcher: config.dispatcher.clone().into(),
    };
    Engine::build(context, conf)
}

/// Run the control plane until a shutdown signal arrives.
pub async fn serve(context: Context, config: Config) -> Result<()> {
    let _engine = build_engine(context.clone(), &config);

    slog::info!(context.logger, "fleetcored is up");
    tokio::signal::ctrl_c().await?;
    slog::info!(context.logger, "shutdown signal received, stopping");
    Ok(())
}
