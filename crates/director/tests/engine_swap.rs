//! Engine selection and swap semantics.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use fdp_common::{
    ConfigError, DispatchConfig, DispatchError, EngineDescriptor, EngineError,
};
use fdp_director::builtin::TokenizeMap;
use fdp_director::Director;
use fdp_model::{
    DataSinkSpec, DataSourceSpec, ExecutionTarget, GraphNode, InMemoryWorkflowModel, PatternJob,
    PatternKind, SubWorkflow, WorkflowGraph,
};
use fdp_schema::Value;

fn two_engine_config() -> DispatchConfig {
    DispatchConfig {
        default_engine: Some("Embedded".to_string()),
        engines: vec![
            EngineDescriptor {
                name: "Embedded".to_string(),
                implementation: "local".to_string(),
                server: None,
                parameters: BTreeMap::from([(
                    "embedded.threads".to_string(),
                    "4".to_string(),
                )]),
            },
            EngineDescriptor {
                name: "Farm".to_string(),
                implementation: "cluster".to_string(),
                server: None,
                parameters: BTreeMap::from([
                    ("farm.queue".to_string(), "batch".to_string()),
                    ("farm.user".to_string(), "fdp".to_string()),
                ]),
            },
        ],
    }
}

#[test]
fn swapping_engines_swaps_attached_parameters() {
    let mut director = Director::new(two_engine_config());
    director.set_engine("Embedded").unwrap();
    assert_eq!(director.engine_name(), "Embedded");
    assert!(director.attached_parameters().contains_key("embedded.threads"));

    director.set_engine("Farm").unwrap();
    assert_eq!(director.engine_name(), "Farm");
    assert!(!director.attached_parameters().contains_key("embedded.threads"));
    assert_eq!(
        director.attached_parameters().get("farm.queue").map(String::as_str),
        Some("batch")
    );
}

#[test]
fn reselecting_the_active_engine_is_a_no_op() {
    let mut director = Director::new(two_engine_config());
    director.set_engine("Embedded").unwrap();
    let before = director.attached_parameters().clone();
    director.set_engine("embedded").unwrap();
    assert_eq!(director.attached_parameters(), &before);
}

#[test]
fn unknown_engine_is_reported() {
    let mut director = Director::new(two_engine_config());
    match director.set_engine("Ghost") {
        Err(DispatchError::Engine(EngineError::NotFound(name))) => assert_eq!(name, "Ghost"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn server_type_choices_follow_the_engine() {
    let mut director = Director::new(two_engine_config());
    director.set_engine("Farm").unwrap();
    assert_eq!(
        director.server_type_choices().to_vec(),
        vec!["distributed".to_string(), "embedded".to_string()]
    );

    // A selection still offered by the new engine survives the swap.
    director.set_start_server_type("embedded").unwrap();
    director.set_engine("Embedded").unwrap();
    assert_eq!(director.start_server_type(), "embedded");

    // One no longer offered resets to the new engine's first choice.
    director.set_engine("Farm").unwrap();
    director.set_start_server_type("distributed").unwrap();
    director.set_engine("Embedded").unwrap();
    assert_eq!(director.start_server_type(), "embedded");
}

#[test]
fn legacy_server_types_map_to_distributed() {
    let mut director = Director::new(two_engine_config());
    director.set_engine("Farm").unwrap();
    director.set_start_server_type("local").unwrap();
    assert_eq!(director.start_server_type(), "distributed");
    director.set_start_server_type("cluster").unwrap();
    assert_eq!(director.start_server_type(), "distributed");
}

#[test]
fn invalid_server_type_is_rejected() {
    let mut director = Director::new(two_engine_config());
    director.set_engine("Embedded").unwrap();
    match director.set_start_server_type("mainframe") {
        Err(DispatchError::Config(ConfigError::InvalidServerType(t))) => {
            assert_eq!(t, "mainframe")
        }
        other => panic!("expected InvalidServerType, got {other:?}"),
    }
    // Legacy names do not map when the engine has no distributed mode.
    assert!(director.set_start_server_type("cluster").is_err());
}

#[test]
fn cluster_engine_runs_embedded_pipelines() {
    let base = std::env::temp_dir().join("fdp-swap-tests").join("cluster-embedded");
    let config_dir = base.join("config");
    std::fs::create_dir_all(&config_dir).unwrap();

    let mut model = InMemoryWorkflowModel::new();
    model.register(SubWorkflow::new(
        "tokenize-logic",
        Arc::new(|| Box::new(TokenizeMap)),
    ));

    let mut graph = WorkflowGraph::new();
    graph.add_node(GraphNode::Source(DataSourceSpec::tokens(
        "in",
        vec![Value::Str("alpha beta".to_string())],
    )));
    graph.add_node(GraphNode::Pattern(PatternJob::new(
        "tokenize",
        PatternKind::Map,
        ExecutionTarget::SubWorkflow("tokenize-logic".to_string()),
    )));
    graph.add_node(GraphNode::Sink(DataSinkSpec::tokens("out")));
    graph.connect("in", "tokenize").connect("tokenize", "out");

    let mut director = Director::new(two_engine_config());
    director.graph = graph;
    director.model = Arc::new(model);
    director.config_dir = Some(config_dir);
    director.job_base_dir = base.join("jobs");
    director.set_engine("Farm").unwrap();
    director.set_start_server_type("embedded").unwrap();

    let report = director.run().unwrap();
    assert_eq!(report.captures.get("out").map(Vec::len), Some(2));
}

#[test]
fn run_selects_the_default_engine_when_none_was_chosen() {
    let base = std::env::temp_dir().join("fdp-swap-tests").join("default-engine");
    let config_dir = base.join("config");
    std::fs::create_dir_all(&config_dir).unwrap();

    let mut graph = WorkflowGraph::new();
    graph.add_node(GraphNode::Source(DataSourceSpec::tokens(
        "in",
        vec![Value::Int(1)],
    )));
    graph.add_node(GraphNode::Sink(DataSinkSpec::tokens("out")));
    graph.connect("in", "out");

    let mut director = Director::new(two_engine_config());
    director.graph = graph;
    director.config_dir = Some(config_dir);
    director.job_base_dir = base.join("jobs");

    director.run().unwrap();
    assert_eq!(director.engine_name(), "Embedded");
}

#[test]
fn foreign_entities_are_rejected_before_running() {
    let mut director = Director::new(two_engine_config());
    let mut graph = WorkflowGraph::new();
    graph.add_node(GraphNode::Foreign {
        name: "Display".to_string(),
        class: "ui.Display".to_string(),
        is_composite: false,
        has_director: false,
    });
    director.graph = graph;
    director.job_base_dir = PathBuf::from(std::env::temp_dir()).join("fdp-swap-tests");
    assert!(matches!(
        director.run(),
        Err(DispatchError::Validation(_))
    ));
}
