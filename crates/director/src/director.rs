//! The orchestration director.
//!
//! Owns the workflow graph, the engine selection, and the run lifecycle:
//! validate the model, set up the job directory and classpath, then drive
//! the engine through preinitialize / fire / postfire / wrapup. Wrapup runs
//! even when a fire fails.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fdp_common::{
    ConfigError, DispatchConfig, EngineError, Result, RunId,
};
use fdp_engine::{
    Engine, EngineRegistry, JobContext, LogicRegistry, SERVER_TYPE_DEFAULT,
    SERVER_TYPE_DISTRIBUTED, SERVER_TYPE_EMBEDDED,
};
use fdp_model::{
    ExecutionTarget, GraphNode, InMemoryWorkflowModel, ScopeLayer, WorkflowGraph, WorkflowModel,
};
use fdp_schema::Record;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::check;
use crate::jars;
use crate::jobdir;
use crate::params;

/// Server-type names accepted for backward compatibility and mapped onto
/// `distributed` when the engine supports it.
const LEGACY_SERVER_TYPES: [&str; 2] = ["local", "cluster"];

/// Result of one completed run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub job_dir: PathBuf,
    /// Records captured by token sinks, keyed by sink name.
    pub captures: BTreeMap<String, Vec<Record>>,
}

pub struct Director {
    config: DispatchConfig,
    registry: EngineRegistry,
    /// Override-resolution registry shared with the engine.
    pub logic: Arc<LogicRegistry>,
    /// The workflow to run.
    pub graph: WorkflowGraph,
    /// Sub-workflow definitions referenced by the graph.
    pub model: Arc<dyn WorkflowModel>,
    /// Parameter scope chain around the workflow, innermost first.
    pub scope: Vec<ScopeLayer>,
    /// Engine configuration directory; engines fall back to an environment
    /// variable when unset.
    pub config_dir: Option<PathBuf>,
    /// Jars added to every job of this workflow.
    pub include_jars: Vec<PathBuf>,
    /// Infrastructure jars every submission needs.
    pub mandatory_jars: Vec<PathBuf>,
    /// Directories searched for relative jar paths.
    pub jar_search_dirs: Vec<PathBuf>,
    /// Raw `name = value, ...` job arguments.
    pub job_arguments: String,
    /// Default degree of parallelism for jobs without an explicit one.
    pub degree_of_parallelism: u32,
    /// Dump each sub-workflow clone into the job directory for debugging.
    pub write_sub_workflows_to_files: bool,
    /// Number of fire iterations per run.
    pub iterations: u32,
    /// Where job directories are created.
    pub job_base_dir: PathBuf,
    engine: Option<Box<dyn Engine>>,
    engine_name: String,
    attached_parameters: BTreeMap<String, String>,
    start_server_type: String,
    server_type_choices: Vec<String>,
    stop: Arc<AtomicBool>,
}

impl Director {
    pub fn new(config: DispatchConfig) -> Self {
        Self::with_registry(config, EngineRegistry::builtin())
    }

    pub fn with_registry(config: DispatchConfig, registry: EngineRegistry) -> Self {
        Self {
            config,
            registry,
            logic: Arc::new(LogicRegistry::new()),
            graph: WorkflowGraph::new(),
            model: Arc::new(InMemoryWorkflowModel::new()),
            scope: Vec::new(),
            config_dir: None,
            include_jars: Vec::new(),
            mandatory_jars: Vec::new(),
            jar_search_dirs: Vec::new(),
            job_arguments: String::new(),
            degree_of_parallelism: 1,
            write_sub_workflows_to_files: false,
            iterations: 1,
            job_base_dir: jobdir::default_base_dir(),
            engine: None,
            engine_name: String::new(),
            attached_parameters: BTreeMap::new(),
            start_server_type: SERVER_TYPE_DEFAULT.to_string(),
            server_type_choices: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Name of the active engine; empty until one is selected.
    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    /// Parameters the active engine attached to the director.
    pub fn attached_parameters(&self) -> &BTreeMap<String, String> {
        &self.attached_parameters
    }

    pub fn start_server_type(&self) -> &str {
        &self.start_server_type
    }

    /// Server-start types offered by the active engine.
    pub fn server_type_choices(&self) -> &[String] {
        &self.server_type_choices
    }

    /// Select the execution engine by its configured name.
    ///
    /// Selecting the already active engine is a no-op. On a swap the old
    /// engine's parameters are detached before the new engine's are
    /// attached, and the server-type choices are refreshed: a still valid
    /// selection survives, anything else resets to the new engine's first
    /// listed type.
    pub fn set_engine(&mut self, name: &str) -> Result<()> {
        let requested = name.trim();
        if self.engine.is_some() && self.engine_name.eq_ignore_ascii_case(requested) {
            debug!(engine = %self.engine_name, operator = "Director", "engine unchanged");
            return Ok(());
        }
        let engine = self.registry.resolve(&self.config, requested)?;
        if let Some(old) = self.engine.take() {
            old.detach_parameters(&mut self.attached_parameters);
            info!(
                from = %self.engine_name,
                to = %engine.name(),
                operator = "Director",
                "swapping engine"
            );
        }
        self.attached_parameters.extend(engine.attach_parameters());

        let choices: Vec<String> = engine
            .server_types()
            .iter()
            .map(|t| t.to_string())
            .collect();
        let still_valid = self.start_server_type == SERVER_TYPE_DEFAULT
            || choices.iter().any(|c| *c == self.start_server_type);
        if !still_valid {
            let fallback = choices
                .first()
                .cloned()
                .unwrap_or_else(|| SERVER_TYPE_EMBEDDED.to_string());
            warn!(
                engine = %engine.name(),
                dropped = %self.start_server_type,
                selected = %fallback,
                operator = "Director",
                "server-start type not offered by engine"
            );
            self.start_server_type = fallback;
        }
        self.server_type_choices = choices;
        self.engine_name = engine.name().to_string();
        self.engine = Some(engine);
        Ok(())
    }

    /// Select how the engine reaches its backend.
    ///
    /// The type must be one the active engine offers. The legacy names
    /// `local` and `cluster` map onto `distributed` when the engine
    /// supports it.
    pub fn set_start_server_type(&mut self, server_type: &str) -> Result<()> {
        let requested = server_type.trim();
        if requested.is_empty() || requested == SERVER_TYPE_DEFAULT {
            self.start_server_type = SERVER_TYPE_DEFAULT.to_string();
            return Ok(());
        }
        if self.server_type_choices.iter().any(|c| c == requested) {
            self.start_server_type = requested.to_string();
            return Ok(());
        }
        if LEGACY_SERVER_TYPES.contains(&requested)
            && self
                .server_type_choices
                .iter()
                .any(|c| c == SERVER_TYPE_DISTRIBUTED)
        {
            warn!(
                legacy = requested,
                operator = "Director",
                "legacy server-start type; using 'distributed'"
            );
            self.start_server_type = SERVER_TYPE_DISTRIBUTED.to_string();
            return Ok(());
        }
        Err(ConfigError::InvalidServerType(requested.to_string()).into())
    }

    /// Raise the cooperative stop flag. Running jobs finish their current
    /// step; spawned servers are left alone.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Shared stop flag for raising a stop from another thread.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Execute the workflow once: validate, set up, fire, wrap up.
    pub fn run(&mut self) -> Result<RunReport> {
        self.stop.store(false, Ordering::SeqCst);
        if self.engine.is_none() {
            self.set_engine(SERVER_TYPE_DEFAULT)?;
        }
        check::check_model(&self.graph)?;

        let run_id = RunId(rand::rng().random::<u64>());
        let job_dir = jobdir::create_job_directory(&self.job_base_dir)?;
        info!(
            %run_id,
            engine = %self.engine_name,
            job_dir = %job_dir.display(),
            operator = "Director",
            "run starting"
        );

        // Clone every referenced sub-workflow, reconcile its director with
        // the job's lifecycle setting, and push scope parameters into it.
        let mut graph = self.graph.clone();
        let mut overlay = InMemoryWorkflowModel::new();
        for node in &mut graph.nodes {
            let GraphNode::Pattern(job) = node else {
                continue;
            };
            match &job.target {
                ExecutionTarget::SubWorkflow(workflow) => {
                    let mut clone = self.model.clone_sub_workflow(workflow)?;
                    job.run_lifecycle_per_input = check::check_director_iterations(
                        workflow,
                        clone.director.as_mut(),
                        job.run_lifecycle_per_input,
                    );
                    params::copy_parameters_into_sub_workflow(&self.scope, &mut clone);
                    if self.write_sub_workflows_to_files {
                        write_clone_summary(&job_dir, &clone)?;
                    }
                    overlay.register(clone);
                }
                _ => {
                    // Surface unresolvable overrides before anything runs.
                    self.logic.resolve(job, self.model.as_ref())?;
                }
            }
        }

        let job_jars: Vec<PathBuf> = graph
            .pattern_jobs()
            .flat_map(|job| job.jars.iter().cloned())
            .collect();
        let jars = jars::assemble_jar_list(
            &self.mandatory_jars,
            &self.include_jars,
            &job_jars,
            &self.jar_search_dirs,
        )?;

        let mut ctx = JobContext::new(run_id, graph, Arc::new(overlay));
        ctx.logic = Arc::clone(&self.logic);
        ctx.job_dir = job_dir.clone();
        ctx.jars = jars;
        ctx.job_arguments = params::parse_job_arguments(&self.job_arguments)?;
        ctx.degree_of_parallelism = self.degree_of_parallelism;
        ctx.config_dir = self.config_dir.clone();
        ctx.start_server_type = self.start_server_type.clone();
        ctx.share_stop_flag(Arc::clone(&self.stop));

        let engine = self
            .engine
            .as_mut()
            .ok_or(EngineError::NoEnginesConfigured)?;

        let iterations = self.iterations.max(1);
        let fired = (|| -> Result<()> {
            engine.preinitialize(&mut ctx)?;
            for iteration in 1..=iterations {
                debug!(%run_id, iteration, operator = "Director", "firing");
                engine.fire(&mut ctx)?;
                if !engine.postfire(&ctx) {
                    break;
                }
            }
            Ok(())
        })();
        // Wrapup always runs, also after a failed fire.
        let wrapped = engine.wrapup(&mut ctx);

        let mut captures = BTreeMap::new();
        for spec in self.graph.sinks() {
            if let Some(handle) = ctx.capture(&spec.name) {
                captures.insert(spec.name.clone(), handle.take());
            }
        }

        fired?;
        wrapped?;
        info!(%run_id, operator = "Director", "run finished");
        Ok(RunReport {
            run_id,
            job_dir,
            captures,
        })
    }
}

fn write_clone_summary(job_dir: &std::path::Path, clone: &fdp_model::SubWorkflow) -> Result<()> {
    let ports: BTreeMap<&String, String> = clone
        .port_schemas
        .iter()
        .map(|(port, schema)| (port, schema.to_string()))
        .collect();
    let summary = serde_json::json!({
        "name": clone.name,
        "director": clone.director.as_ref().map(|d| format!("{:?}", d.model)),
        "parameters": clone.parameters,
        "ports": ports,
    });
    let path = job_dir.join(format!("{}.json", clone.name));
    std::fs::write(&path, serde_json::to_vec_pretty(&summary).unwrap_or_default())?;
    Ok(())
}
