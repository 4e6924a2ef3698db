//! Execution engines for pattern job pipelines.
//!
//! Architecture role:
//! - defines the [`Engine`] lifecycle the director drives
//!   (preinitialize / fire / postfire / stop / wrapup)
//! - resolves configured engines to implementations through an explicit
//!   [`EngineRegistry`]; there is no reflective engine discovery
//! - bootstraps distributed backend servers before jobs are submitted
//! - executes embedded pipelines through stub worker threads
//!
//! Key modules:
//! - [`context`]: per-run [`JobContext`] and server modes
//! - [`logic`]: execution-override resolution
//! - [`stub`]: grouped worker drivers over stub channels
//! - [`exec`]: graph-order pipeline execution
//! - [`bootstrap`]: backend server probe/start/retry
//! - [`local`] / [`cluster`]: the builtin engines

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use fdp_common::{ConfigError, DispatchConfig, EngineDescriptor, EngineError, Result};
use fdp_schema::Record;
use tracing::{info, warn};

pub mod bootstrap;
pub mod cluster;
pub mod context;
pub mod exec;
pub mod local;
pub mod logic;
pub mod stub;

pub use bootstrap::{BootstrapOptions, ServerStart};
pub use cluster::ClusterEngine;
pub use context::{
    JobContext, ServerMode, SERVER_TYPE_DEFAULT, SERVER_TYPE_DISTRIBUTED, SERVER_TYPE_EMBEDDED,
};
pub use local::LocalEngine;
pub use logic::{factory_of, LanguageHandler, LogicRegistry};

/// One execution engine bound to its configuration descriptor.
///
/// The director calls the lifecycle in order: `preinitialize` once, then
/// `fire`/`postfire` until `postfire` returns false, and `wrapup` always,
/// even after errors. `stop` may arrive from another thread at any point.
pub trait Engine: Send {
    fn descriptor(&self) -> &EngineDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Server-start types this engine supports; the first entry is the
    /// default.
    fn server_types(&self) -> Vec<&'static str>;

    /// Parameters this engine contributes to the director while active.
    fn attach_parameters(&self) -> BTreeMap<String, String> {
        self.descriptor().parameters.clone()
    }

    /// Remove this engine's parameters from an attached set, for engine
    /// swaps.
    fn detach_parameters(&self, attached: &mut BTreeMap<String, String>) {
        for key in self.descriptor().parameters.keys() {
            attached.remove(key);
        }
    }

    fn preinitialize(&mut self, ctx: &mut JobContext) -> Result<()> {
        default_preinitialize(self.name(), &self.server_types(), ctx)
    }

    /// One iteration: sources, sinks, job, delivery. The stop flag is
    /// honored between every step.
    fn fire(&mut self, ctx: &mut JobContext) -> Result<()> {
        ctx.iterate_sources()?;
        if ctx.stop_requested() {
            return Ok(());
        }
        ctx.prefire_sinks()?;
        if ctx.stop_requested() {
            return Ok(());
        }
        let outputs = self.execute_job(ctx)?;
        if ctx.stop_requested() {
            info!(
                run_id = %ctx.run_id,
                engine = %self.name(),
                operator = "Engine",
                "stop requested; sink results discarded"
            );
            return Ok(());
        }
        for (sink, records) in outputs {
            ctx.deliver_to_sink(&sink, records);
        }
        ctx.fire_sinks()?;
        Ok(())
    }

    /// Backend hook: run the graph's jobs and return records per sink.
    fn execute_job(&mut self, ctx: &mut JobContext) -> Result<BTreeMap<String, Vec<Record>>>;

    /// Whether the director should fire again.
    fn postfire(&mut self, ctx: &JobContext) -> bool {
        !ctx.stop_requested() && ctx.sinks_want_more()
    }

    /// Cooperative stop; safe to call repeatedly and from other threads.
    fn stop(&mut self, ctx: &JobContext) {
        ctx.request_stop();
    }

    /// Always called, also after failed fires. Clears per-run state.
    fn wrapup(&mut self, ctx: &mut JobContext) -> Result<()> {
        ctx.clear_io();
        Ok(())
    }

    /// Parse the backend address from a server start-script output line.
    fn parse_server_address_from_output(&self, _line: &str) -> Option<SocketAddr> {
        None
    }
}

/// Shared preinitialize: configuration directory, server mode, graph and
/// job validation, I/O construction.
pub fn default_preinitialize(
    name: &str,
    server_types: &[&str],
    ctx: &mut JobContext,
) -> Result<()> {
    if ctx.config_dir.is_none() {
        let var = config_dir_env_var(name);
        match std::env::var(&var) {
            Ok(value) if !value.trim().is_empty() => {
                ctx.config_dir = Some(value.trim().to_string().into());
            }
            _ => return Err(ConfigError::MissingWorkflowDir(var).into()),
        }
    }
    if let Some(dir) = &ctx.config_dir {
        if !dir.is_dir() {
            return Err(ConfigError::ConfigDirNotFound(dir.clone()).into());
        }
    }

    let fallback = server_types.first().copied().unwrap_or(SERVER_TYPE_EMBEDDED);
    let mode = ServerMode::resolve(&ctx.start_server_type, fallback);
    ctx.set_server_mode(mode);

    ctx.graph.validate_edges()?;
    for job in ctx.graph.pattern_jobs() {
        job.validate_consistency()?;
    }
    for spec in ctx.graph.sources() {
        spec.validate()?;
    }
    for spec in ctx.graph.sinks() {
        spec.validate()?;
    }
    ctx.prepare_io()?;
    info!(
        engine = name,
        run_id = %ctx.run_id,
        mode = ?mode,
        degree = ctx.degree_of_parallelism,
        operator = "Engine",
        "preinitialized"
    );
    Ok(())
}

/// Environment variable consulted when no configuration directory is set
/// on the director.
pub fn config_dir_env_var(engine: &str) -> String {
    let sanitized: String = engine
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("FDP_{sanitized}_CONFIG_DIR")
}

/// Builds an engine from its configuration descriptor.
pub type EngineFactory =
    Arc<dyn Fn(&EngineDescriptor) -> std::result::Result<Box<dyn Engine>, EngineError> + Send + Sync>;

/// Implementation-keyed engine factories.
///
/// An engine descriptor names an implementation key; the registry maps that
/// key to a factory. Keys match case-insensitively.
pub struct EngineRegistry {
    factories: BTreeMap<String, EngineFactory>,
}

impl EngineRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the builtin `local` and `cluster` implementations.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("local", LocalEngine::factory());
        registry.register("cluster", ClusterEngine::factory());
        registry
    }

    pub fn register(&mut self, implementation: impl Into<String>, factory: EngineFactory) {
        self.factories
            .insert(implementation.into().to_ascii_lowercase(), factory);
    }

    /// Resolve an engine by user-facing name through the configuration.
    ///
    /// The name `default` (or an empty name) selects the configured default
    /// engine, falling back to the first configured engine with a warning
    /// when the configuration names none.
    pub fn resolve(
        &self,
        config: &DispatchConfig,
        name: &str,
    ) -> std::result::Result<Box<dyn Engine>, EngineError> {
        let trimmed = name.trim();
        let resolved = if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("default") {
            let resolved = config.default_engine_name()?;
            if config.default_engine.is_none() {
                warn!(
                    engine = %resolved,
                    operator = "EngineRegistry",
                    "configuration names no default engine; using the first configured engine"
                );
            }
            resolved
        } else {
            trimmed.to_string()
        };
        let descriptor = config.engine(&resolved)?;
        let factory = self
            .factories
            .get(&descriptor.implementation.to_ascii_lowercase())
            .ok_or_else(|| {
                EngineError::InstantiationFailed(
                    descriptor.name.clone(),
                    format!("unknown implementation '{}'", descriptor.implementation),
                )
            })?;
        factory(descriptor)
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
