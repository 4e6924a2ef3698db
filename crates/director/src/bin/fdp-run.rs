//! Workflow runner.
//!
//! Configuration comes from the environment:
//! - `FDP_CONFIG`: path to the dispatch configuration JSON (required)
//! - `FDP_WORKFLOW`: path to the workflow graph JSON (required)
//! - `FDP_ENGINE`: engine name (default: the configured default engine)
//! - `FDP_START_SERVER_TYPE`: server-start type (default: engine default)
//! - `FDP_CONFIG_DIR`: engine configuration directory
//! - `FDP_DEGREE`: default degree of parallelism (default 1)
//! - `FDP_JOB_ARGUMENTS`: `name = value, ...` forwarded to the engine
//! - `FDP_INCLUDE_JARS`: comma-separated jar paths
//! - `FDP_ITERATIONS`: fire iterations per run (default 1)

use std::path::PathBuf;
use std::sync::Arc;

use fdp_common::{DispatchConfig, DispatchError};
use fdp_director::{register_builtin_logic, Director};
use fdp_engine::LogicRegistry;
use fdp_model::WorkflowGraph;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required_env(name: &str) -> Result<String, String> {
    std::env::var(name).map_err(|_| format!("environment variable {name} is required"))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(e) = run() {
        error!("fdp-run failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let config_path = PathBuf::from(required_env("FDP_CONFIG")?);
    let workflow_path = PathBuf::from(required_env("FDP_WORKFLOW")?);

    let config = DispatchConfig::load(&config_path).map_err(|e| e.to_string())?;
    let workflow_text =
        std::fs::read_to_string(&workflow_path).map_err(|e| format!("cannot read workflow: {e}"))?;
    let graph: WorkflowGraph =
        serde_json::from_str(&workflow_text).map_err(|e| format!("invalid workflow: {e}"))?;

    let mut logic = LogicRegistry::new();
    register_builtin_logic(&mut logic);

    let mut director = Director::new(config);
    director.graph = graph;
    director.logic = Arc::new(logic);
    director.config_dir = std::env::var("FDP_CONFIG_DIR").ok().map(PathBuf::from);
    director.job_arguments = env_or("FDP_JOB_ARGUMENTS", "");
    director.degree_of_parallelism = env_or("FDP_DEGREE", "1")
        .parse()
        .map_err(|_| "FDP_DEGREE must be a number".to_string())?;
    director.iterations = env_or("FDP_ITERATIONS", "1")
        .parse()
        .map_err(|_| "FDP_ITERATIONS must be a number".to_string())?;
    director.include_jars = std::env::var("FDP_INCLUDE_JARS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default();

    director
        .set_engine(&env_or("FDP_ENGINE", "default"))
        .map_err(|e| e.to_string())?;
    if let Ok(server_type) = std::env::var("FDP_START_SERVER_TYPE") {
        director
            .set_start_server_type(&server_type)
            .map_err(|e| e.to_string())?;
    }

    let report = director.run().map_err(|e: DispatchError| e.to_string())?;
    info!(
        run_id = %report.run_id,
        job_dir = %report.job_dir.display(),
        "workflow finished"
    );
    for (sink, records) in &report.captures {
        info!(sink = %sink, records = records.len(), "captured results");
    }
    Ok(())
}
