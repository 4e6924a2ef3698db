//! Per-run state shared between the director and the active engine.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fdp_common::{Result, RunId, RuntimeError};
use fdp_model::{CaptureHandle, Sink, Source, WorkflowGraph, WorkflowModel};
use fdp_schema::Record;
use tracing::warn;

use crate::logic::LogicRegistry;

/// Server-start type understood by every engine.
pub const SERVER_TYPE_DEFAULT: &str = "default";
/// Run the job inside the director's own process.
pub const SERVER_TYPE_EMBEDDED: &str = "embedded";
/// Submit the job to a separately running server.
pub const SERVER_TYPE_DISTRIBUTED: &str = "distributed";

/// How the engine reaches its backend for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Embedded,
    Distributed,
}

impl ServerMode {
    /// Map a server-start type string onto a mode. Unknown types fall back
    /// to embedded with a warning; `default` resolves to `fallback`.
    pub fn resolve(server_type: &str, fallback: &str) -> ServerMode {
        let effective = if server_type.is_empty() || server_type == SERVER_TYPE_DEFAULT {
            fallback
        } else {
            server_type
        };
        match effective {
            SERVER_TYPE_EMBEDDED => ServerMode::Embedded,
            SERVER_TYPE_DISTRIBUTED => ServerMode::Distributed,
            other => {
                warn!(
                    server_type = other,
                    operator = "ServerMode",
                    "unknown server-start type; running embedded"
                );
                ServerMode::Embedded
            }
        }
    }
}

/// Everything one run needs: the graph, the sub-workflow model, resolved
/// resources, and the cooperative stop flag.
///
/// Built by the director before `preinitialize` and handed to the engine
/// for every lifecycle call.
pub struct JobContext {
    pub run_id: RunId,
    pub graph: WorkflowGraph,
    pub model: Arc<dyn WorkflowModel>,
    pub logic: Arc<LogicRegistry>,
    /// Scratch directory for this run's job files.
    pub job_dir: PathBuf,
    /// Classpath jars shipped with the job.
    pub jars: Vec<PathBuf>,
    /// Arguments forwarded to the engine alongside the job.
    pub job_arguments: BTreeMap<String, String>,
    /// Director-level degree of parallelism; jobs may override it.
    pub degree_of_parallelism: u32,
    /// Engine configuration directory, resolved during preinitialize.
    pub config_dir: Option<PathBuf>,
    /// Server-start type selected on the director.
    pub start_server_type: String,
    server_mode: ServerMode,
    stop: Arc<AtomicBool>,
    sources: Vec<(String, Box<dyn Source>)>,
    sinks: Vec<(String, Box<dyn Sink>)>,
    captures: BTreeMap<String, CaptureHandle>,
    sinks_want_more: bool,
}

impl JobContext {
    pub fn new(run_id: RunId, graph: WorkflowGraph, model: Arc<dyn WorkflowModel>) -> Self {
        Self {
            run_id,
            graph,
            model,
            logic: Arc::new(LogicRegistry::new()),
            job_dir: PathBuf::new(),
            jars: Vec::new(),
            job_arguments: BTreeMap::new(),
            degree_of_parallelism: 1,
            config_dir: None,
            start_server_type: SERVER_TYPE_DEFAULT.to_string(),
            server_mode: ServerMode::Embedded,
            stop: Arc::new(AtomicBool::new(false)),
            sources: Vec::new(),
            sinks: Vec::new(),
            captures: BTreeMap::new(),
            sinks_want_more: true,
        }
    }

    /// Build the runtime sources and sinks declared in the graph. Called
    /// once during preinitialize; rebuilding replaces previous instances.
    pub fn prepare_io(&mut self) -> Result<()> {
        self.sources.clear();
        self.sinks.clear();
        self.captures.clear();
        let source_specs: Vec<_> = self.graph.sources().cloned().collect();
        for spec in source_specs {
            let source = spec.build()?;
            self.sources.push((spec.name, source));
        }
        let sink_specs: Vec<_> = self.graph.sinks().cloned().collect();
        for spec in sink_specs {
            let (sink, capture) = spec.build()?;
            if let Some(capture) = capture {
                self.captures.insert(spec.name.clone(), capture);
            }
            self.sinks.push((spec.name, sink));
        }
        Ok(())
    }

    /// Capture handle of a token sink, if the graph declares one by that
    /// name.
    pub fn capture(&self, sink: &str) -> Option<&CaptureHandle> {
        self.captures.get(sink)
    }

    pub fn set_server_mode(&mut self, mode: ServerMode) {
        self.server_mode = mode;
    }

    pub fn server_mode(&self) -> ServerMode {
        self.server_mode
    }

    /// Adopt an externally owned stop flag, so a stop raised before or
    /// during the run is visible on both sides.
    pub fn share_stop_flag(&mut self, flag: Arc<AtomicBool>) {
        self.stop = flag;
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Shared handle to the stop flag, for worker threads.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Iterate every source once. A failure aborts the fire.
    pub fn iterate_sources(&mut self) -> std::result::Result<(), RuntimeError> {
        for (_, source) in &mut self.sources {
            source.iterate()?;
        }
        Ok(())
    }

    /// Records produced by the named source in the current fire.
    pub fn take_source_records(&mut self, name: &str) -> Vec<Record> {
        self.sources
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, source)| source.take_records())
            .unwrap_or_default()
    }

    /// Prefire every sink. A `false` is reported as the offending sink.
    pub fn prefire_sinks(&mut self) -> std::result::Result<(), RuntimeError> {
        for (name, sink) in &mut self.sinks {
            if !sink.prefire()? {
                return Err(RuntimeError::SinkNotReady(name.clone()));
            }
        }
        Ok(())
    }

    pub fn deliver_to_sink(&mut self, name: &str, records: Vec<Record>) {
        if let Some((_, sink)) = self.sinks.iter_mut().find(|(n, _)| n == name) {
            sink.deliver(records);
        }
    }

    /// Fire and postfire every sink; remembers whether any sink asked to
    /// stop firing.
    pub fn fire_sinks(&mut self) -> std::result::Result<(), RuntimeError> {
        let mut want_more = true;
        for (_, sink) in &mut self.sinks {
            sink.fire()?;
            want_more &= sink.postfire();
        }
        self.sinks_want_more = want_more;
        Ok(())
    }

    pub fn sinks_want_more(&self) -> bool {
        self.sinks_want_more
    }

    /// Drop per-run I/O state. Called from wrapup.
    pub fn clear_io(&mut self) {
        self.sources.clear();
        self.sinks.clear();
    }
}
