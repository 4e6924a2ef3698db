//! Data model of the dispatch core.
//!
//! Architecture role:
//! - defines the five data-parallel pattern kinds and the per-job settings
//!   the director and engines agree on
//! - declarative data source/sink specs plus the runtime `Source`/`Sink`
//!   traits the engine drives each fire
//! - the sub-workflow model: reusable definitions, per-job clones, and the
//!   `WorkflowLogic` bodies the stub drivers call
//! - the workflow graph connecting all of the above
//!
//! Key modules:
//! - [`pattern`]: `PatternKind`, `Parallelism`, `ExecutionTarget`, `PatternJob`
//! - [`io`]: `DataSourceSpec`/`DataSinkSpec` and builtin sources/sinks
//! - [`workflow`]: `SubWorkflow`, `WorkflowModel`, `WorkflowLogic`, scopes
//! - [`graph`]: `WorkflowGraph` with deterministic topological ordering

pub mod graph;
pub mod io;
pub mod pattern;
pub mod workflow;

pub use graph::{GraphEdge, GraphNode, WorkflowGraph};
pub use io::{chunk_records, CaptureHandle, DataSinkSpec, DataSourceSpec, Sink, Source};
pub use pattern::{ExecutionTarget, Parallelism, PatternJob, PatternKind};
pub use workflow::{
    DirectorModel, InMemoryWorkflowModel, Iterations, LogicFactory, ScopeLayer, ScopeVariable,
    StubInput, SubDirector, SubWorkflow, WorkflowLogic, WorkflowModel,
};
