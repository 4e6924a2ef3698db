//! Sub-workflow model and the logic executed inside pattern jobs.
//!
//! A pattern job whose target is a sub-workflow gets a fresh clone of that
//! sub-workflow per job. The clone carries its own director settings, port
//! schemas and parameters, and yields a [`WorkflowLogic`] instance that the
//! stub drivers call once per input group.

use std::collections::BTreeMap;
use std::sync::Arc;

use fdp_common::ValidationError;
use fdp_schema::{KeyValueSchema, Record, Value};
use serde::{Deserialize, Serialize};

use crate::pattern::PatternKind;

/// Director model declared on a sub-workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectorModel {
    /// Fires the sub-workflow a bounded number of times.
    BoundedIterations,
    /// Token-driven dynamic dataflow.
    DynamicDataflow,
    /// Anything else; tolerated with a warning.
    Other(String),
}

/// Iteration bound carried by a sub-workflow director.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Iterations {
    Unbounded,
    Count(u32),
}

/// Director settings on a sub-workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubDirector {
    pub model: DirectorModel,
    pub iterations: Iterations,
}

/// Produces a fresh [`WorkflowLogic`] per job clone.
pub type LogicFactory = Arc<dyn Fn() -> Box<dyn WorkflowLogic> + Send + Sync>;

/// One reusable sub-workflow definition.
#[derive(Clone)]
pub struct SubWorkflow {
    pub name: String,
    pub director: Option<SubDirector>,
    /// Workflow-level parameters visible inside the clone.
    pub parameters: BTreeMap<String, String>,
    /// Declared key/value schema per port name.
    pub port_schemas: BTreeMap<String, KeyValueSchema>,
    logic: LogicFactory,
}

impl std::fmt::Debug for SubWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubWorkflow")
            .field("name", &self.name)
            .field("director", &self.director)
            .field("parameters", &self.parameters)
            .field("port_schemas", &self.port_schemas)
            .finish_non_exhaustive()
    }
}

impl SubWorkflow {
    pub fn new(name: impl Into<String>, logic: LogicFactory) -> Self {
        Self {
            name: name.into(),
            director: None,
            parameters: BTreeMap::new(),
            port_schemas: BTreeMap::new(),
            logic,
        }
    }

    pub fn with_director(mut self, director: SubDirector) -> Self {
        self.director = Some(director);
        self
    }

    pub fn with_port_schema(mut self, port: impl Into<String>, schema: KeyValueSchema) -> Self {
        self.port_schemas.insert(port.into(), schema);
        self
    }

    /// Instantiate the executable body for one job clone.
    pub fn instantiate(&self) -> Box<dyn WorkflowLogic> {
        (self.logic)()
    }
}

/// One grouped input handed to a [`WorkflowLogic`] call.
///
/// The grouping matches the pattern kind: Reduce groups values by key,
/// Cross delivers raw pairs, CoGroup and Match deliver both sides of one
/// key group.
#[derive(Debug, Clone, PartialEq)]
pub enum StubInput {
    Map(Record),
    Reduce { key: Value, values: Vec<Value> },
    Cross(Record, Record),
    CoGroup { key: Value, left: Vec<Value>, right: Vec<Value> },
    Match { key: Value, left: Value, right: Value },
}

impl StubInput {
    pub fn kind(&self) -> PatternKind {
        match self {
            StubInput::Map(_) => PatternKind::Map,
            StubInput::Reduce { .. } => PatternKind::Reduce,
            StubInput::Cross(..) => PatternKind::Cross,
            StubInput::CoGroup { .. } => PatternKind::CoGroup,
            StubInput::Match { .. } => PatternKind::Match,
        }
    }
}

/// The executable body of a cloned sub-workflow.
///
/// Called once per input group; returns the result records for that group.
pub trait WorkflowLogic: Send {
    fn run_iteration(
        &mut self,
        input: StubInput,
    ) -> Result<Vec<Record>, fdp_common::RuntimeError>;
}

/// Provider of sub-workflow definitions.
pub trait WorkflowModel: Send + Sync {
    fn sub_workflow(&self, name: &str) -> Option<&SubWorkflow>;

    /// A per-job clone of a registered sub-workflow.
    fn clone_sub_workflow(&self, name: &str) -> Result<SubWorkflow, ValidationError> {
        self.sub_workflow(name)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownSubWorkflow(name.to_string()))
    }
}

/// Name-keyed in-process workflow model.
#[derive(Default)]
pub struct InMemoryWorkflowModel {
    sub_workflows: BTreeMap<String, SubWorkflow>,
}

impl InMemoryWorkflowModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sub_workflow: SubWorkflow) {
        self.sub_workflows
            .insert(sub_workflow.name.clone(), sub_workflow);
    }

    /// Update the declared schema of a port on a registered sub-workflow.
    pub fn set_port_schema(
        &mut self,
        workflow: &str,
        port: &str,
        schema: KeyValueSchema,
    ) -> Result<(), ValidationError> {
        let sub = self
            .sub_workflows
            .get_mut(workflow)
            .ok_or_else(|| ValidationError::UnknownSubWorkflow(workflow.to_string()))?;
        sub.port_schemas.insert(port.to_string(), schema);
        Ok(())
    }
}

impl WorkflowModel for InMemoryWorkflowModel {
    fn sub_workflow(&self, name: &str) -> Option<&SubWorkflow> {
        self.sub_workflows.get(name)
    }
}

/// One variable in a parameter scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeVariable {
    pub name: String,
    pub value: String,
    /// Semantic-type annotation; annotated variables are never copied into
    /// sub-workflow clones.
    #[serde(default)]
    pub semantic_type: Option<String>,
}

/// One layer of the parameter scope chain, innermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScopeLayer {
    pub name: String,
    pub variables: Vec<ScopeVariable>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl WorkflowLogic for Echo {
        fn run_iteration(
            &mut self,
            input: StubInput,
        ) -> Result<Vec<Record>, fdp_common::RuntimeError> {
            match input {
                StubInput::Map(record) => Ok(vec![record]),
                other => panic!("unexpected input {other:?}"),
            }
        }
    }

    fn echo_workflow(name: &str) -> SubWorkflow {
        SubWorkflow::new(name, Arc::new(|| Box::new(Echo)))
    }

    #[test]
    fn clone_of_unknown_sub_workflow_fails() {
        let model = InMemoryWorkflowModel::new();
        assert_eq!(
            model.clone_sub_workflow("missing").unwrap_err(),
            ValidationError::UnknownSubWorkflow("missing".to_string())
        );
    }

    #[test]
    fn clones_are_independent() {
        let mut model = InMemoryWorkflowModel::new();
        model.register(echo_workflow("echo"));
        let mut clone = model.clone_sub_workflow("echo").unwrap();
        clone
            .parameters
            .insert("degree".to_string(), "4".to_string());
        assert!(model.sub_workflow("echo").unwrap().parameters.is_empty());
    }

    #[test]
    fn port_schema_updates_land_on_the_registered_workflow() {
        let mut model = InMemoryWorkflowModel::new();
        model.register(echo_workflow("echo"));
        let schema = fdp_schema::parse_key_value_types("string int").unwrap();
        model.set_port_schema("echo", "in", schema.clone()).unwrap();
        assert_eq!(
            model.sub_workflow("echo").unwrap().port_schemas.get("in"),
            Some(&schema)
        );
        assert!(model.set_port_schema("nope", "in", schema).is_err());
    }

    #[test]
    fn instantiated_logic_runs() {
        let workflow = echo_workflow("echo");
        let mut logic = workflow.instantiate();
        let record = Record::keyless(Value::Int(1));
        assert_eq!(
            logic.run_iteration(StubInput::Map(record.clone())).unwrap(),
            vec![record]
        );
    }
}
