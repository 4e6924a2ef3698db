//! End-to-end pipeline runs through the embedded engine.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use fdp_common::{DispatchConfig, DispatchError, EngineDescriptor, RuntimeError};
use fdp_director::builtin::{TokenizeMap, SUM_REDUCE};
use fdp_director::{register_builtin_logic, Director};
use fdp_engine::LogicRegistry;
use fdp_model::{
    DataSinkSpec, DataSourceSpec, ExecutionTarget, GraphNode, InMemoryWorkflowModel, Parallelism,
    PatternJob, PatternKind, SubWorkflow, WorkflowGraph,
};
use fdp_schema::{parse_key_value_types, Record, Value};

fn embedded_config() -> DispatchConfig {
    DispatchConfig {
        default_engine: Some("Embedded".to_string()),
        engines: vec![EngineDescriptor {
            name: "Embedded".to_string(),
            implementation: "local".to_string(),
            server: None,
            parameters: BTreeMap::new(),
        }],
    }
}

fn test_dirs(name: &str) -> (PathBuf, PathBuf) {
    let base = std::env::temp_dir().join("fdp-pipeline-tests").join(name);
    let config_dir = base.join("config");
    let jobs = base.join("jobs");
    std::fs::create_dir_all(&config_dir).unwrap();
    (config_dir, jobs)
}

fn director_for(name: &str, graph: WorkflowGraph) -> Director {
    let (config_dir, jobs) = test_dirs(name);
    let mut logic = LogicRegistry::new();
    register_builtin_logic(&mut logic);
    let mut director = Director::new(embedded_config());
    director.graph = graph;
    director.logic = Arc::new(logic);
    director.config_dir = Some(config_dir);
    director.job_base_dir = jobs;
    director
}

fn wordcount_graph() -> (WorkflowGraph, Arc<InMemoryWorkflowModel>) {
    let mut model = InMemoryWorkflowModel::new();
    model.register(SubWorkflow::new(
        "tokenize-logic",
        Arc::new(|| Box::new(TokenizeMap)),
    ));

    let mut graph = WorkflowGraph::new();
    graph.add_node(GraphNode::Source(DataSourceSpec::tokens(
        "lines",
        vec![
            Value::Str("to be or".to_string()),
            Value::Str("not to be".to_string()),
        ],
    )));

    let mut tokenize = PatternJob::new(
        "tokenize",
        PatternKind::Map,
        ExecutionTarget::SubWorkflow("tokenize-logic".to_string()),
    );
    tokenize.parallelism = Parallelism::Degree(2);
    graph.add_node(GraphNode::Pattern(tokenize));

    let mut count = PatternJob::new(
        "count",
        PatternKind::Reduce,
        ExecutionTarget::ExternalClass(SUM_REDUCE.to_string()),
    );
    count.parallelism = Parallelism::Degree(2);
    count.use_combiner = true;
    count.input_schemas = vec![parse_key_value_types("string long").unwrap()];
    count.output_schema = Some(parse_key_value_types("string long").unwrap());
    graph.add_node(GraphNode::Pattern(count));

    graph.add_node(GraphNode::Sink(DataSinkSpec::tokens("out")));
    graph
        .connect("lines", "tokenize")
        .connect("tokenize", "count")
        .connect("count", "out");
    (graph, Arc::new(model))
}

fn sorted(mut records: Vec<Record>) -> Vec<Record> {
    records.sort_by_key(|r| format!("{r:?}"));
    records
}

#[test]
fn wordcount_runs_end_to_end() {
    let (graph, model) = wordcount_graph();
    let mut director = director_for("wordcount", graph);
    director.model = model;

    let report = director.run().unwrap();
    let captured = report.captures.get("out").cloned().unwrap();
    let expected = vec![
        Record::new(Value::Str("to".into()), Value::Long(2)),
        Record::new(Value::Str("be".into()), Value::Long(2)),
        Record::new(Value::Str("or".into()), Value::Long(1)),
        Record::new(Value::Str("not".into()), Value::Long(1)),
    ];
    assert_eq!(sorted(captured), sorted(expected));
    assert!(report.job_dir.is_dir(), "job directory must survive the run");
}

#[test]
fn sub_workflow_dumps_land_in_the_job_directory() {
    let (graph, model) = wordcount_graph();
    let mut director = director_for("dumps", graph);
    director.model = model;
    director.write_sub_workflows_to_files = true;

    let report = director.run().unwrap();
    assert!(report.job_dir.join("tokenize-logic.json").is_file());
}

#[test]
fn parallel_map_emits_one_record_per_token() {
    let mut model = InMemoryWorkflowModel::new();
    model.register(SubWorkflow::new(
        "echo",
        Arc::new(|| Box::new(TokenizeMap)),
    ));

    let data: Vec<Value> = (0..10).map(|i| Value::Str(format!("token{i}"))).collect();
    let mut graph = WorkflowGraph::new();
    graph.add_node(GraphNode::Source(DataSourceSpec::tokens(
        "in",
        data.clone(),
    )));
    let mut job = PatternJob::new(
        "spread",
        PatternKind::Map,
        ExecutionTarget::SubWorkflow("echo".to_string()),
    );
    job.parallelism = Parallelism::Degree(3);
    graph.add_node(GraphNode::Pattern(job));
    graph.add_node(GraphNode::Sink(DataSinkSpec::tokens("out")));
    graph.connect("in", "spread").connect("spread", "out");

    let mut director = director_for("identity", graph);
    director.model = Arc::new(model);

    let report = director.run().unwrap();
    let captured = report.captures.get("out").cloned().unwrap();
    // One (token, 1) record per input token.
    assert_eq!(captured.len(), data.len());
}

#[test]
fn empty_source_aborts_the_fire_with_source_not_ready() {
    let mut graph = WorkflowGraph::new();
    let mut spec = DataSourceSpec::tokens("in", vec![Value::Int(1)]);
    spec.data = Some(Vec::new());
    graph.add_node(GraphNode::Source(spec));
    graph.add_node(GraphNode::Sink(DataSinkSpec::tokens("out")));
    graph.connect("in", "out");

    let mut director = director_for("not-ready", graph);
    match director.run() {
        Err(DispatchError::Runtime(RuntimeError::SourceNotReady(name))) => {
            assert_eq!(name, "in")
        }
        other => panic!("expected SourceNotReady, got {other:?}"),
    }
}

#[test]
fn unresolvable_override_fails_before_execution() {
    let mut graph = WorkflowGraph::new();
    graph.add_node(GraphNode::Source(DataSourceSpec::tokens(
        "in",
        vec![Value::Int(1)],
    )));
    let mut job = PatternJob::new(
        "mystery",
        PatternKind::Map,
        ExecutionTarget::ExternalClass("org.example.NotRegistered".to_string()),
    );
    job.input_schemas = vec![parse_key_value_types("nil int").unwrap()];
    job.output_schema = Some(parse_key_value_types("nil int").unwrap());
    graph.add_node(GraphNode::Pattern(job));
    graph.add_node(GraphNode::Sink(DataSinkSpec::tokens("out")));
    graph.connect("in", "mystery").connect("mystery", "out");

    let mut director = director_for("unresolved", graph);
    assert!(matches!(
        director.run(),
        Err(DispatchError::Engine(_))
    ));
}

#[test]
fn mismatched_override_schemas_are_rejected() {
    let mut graph = WorkflowGraph::new();
    graph.add_node(GraphNode::Source(DataSourceSpec::tokens(
        "in",
        vec![Value::Int(1)],
    )));
    // Override target without schemas.
    let job = PatternJob::new(
        "broken",
        PatternKind::Map,
        ExecutionTarget::ExternalClass(SUM_REDUCE.to_string()),
    );
    graph.add_node(GraphNode::Pattern(job));
    graph.add_node(GraphNode::Sink(DataSinkSpec::tokens("out")));
    graph.connect("in", "broken").connect("broken", "out");

    let mut director = director_for("mismatch", graph);
    assert!(matches!(
        director.run(),
        Err(DispatchError::Config(_))
    ));
}
