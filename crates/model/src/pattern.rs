//! Pattern job definitions.
//!
//! A pattern job is one data-parallel step in a workflow: a Map, Reduce,
//! Cross, CoGroup or Match over key/value records. Its executable body is
//! either a named sub-workflow or an explicit execution override (a class
//! name or inline code).

use std::collections::BTreeMap;
use std::path::PathBuf;

use fdp_common::ConfigError;
use fdp_schema::KeyValueSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The five data-parallel patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    Map,
    Reduce,
    Cross,
    CoGroup,
    Match,
}

impl PatternKind {
    pub fn name(self) -> &'static str {
        match self {
            PatternKind::Map => "Map",
            PatternKind::Reduce => "Reduce",
            PatternKind::Cross => "Cross",
            PatternKind::CoGroup => "CoGroup",
            PatternKind::Match => "Match",
        }
    }

    /// Cross, CoGroup and Match consume two input streams.
    pub fn is_dual_input(self) -> bool {
        matches!(
            self,
            PatternKind::Cross | PatternKind::CoGroup | PatternKind::Match
        )
    }

    pub fn input_arity(self) -> usize {
        if self.is_dual_input() {
            2
        } else {
            1
        }
    }
}

/// Requested degree of parallelism for one job.
///
/// `Default` defers to the director's workflow-wide degree; it is distinct
/// from `Degree(0)`, which asks the engine to pick its own default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parallelism {
    Default,
    Degree(u32),
}

impl Parallelism {
    /// Resolve against the director-level degree.
    pub fn resolve(self, director_degree: u32) -> u32 {
        match self {
            Parallelism::Default => director_degree,
            Parallelism::Degree(n) => n,
        }
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Parallelism::Default
    }
}

/// What actually runs inside a pattern job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionTarget {
    /// A sub-workflow registered in the workflow model, cloned per job.
    SubWorkflow(String),
    /// A pre-built implementation class on the engine's classpath.
    ExternalClass(String),
    /// Source text compiled/interpreted by a registered language handler.
    InlineCode { language: String, source: String },
}

impl ExecutionTarget {
    /// True for targets that bypass the sub-workflow model and therefore
    /// must declare their port schemas explicitly.
    pub fn is_override(&self) -> bool {
        !matches!(self, ExecutionTarget::SubWorkflow(_))
    }
}

/// One data-parallel step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternJob {
    pub name: String,
    pub kind: PatternKind,
    #[serde(default)]
    pub parallelism: Parallelism,
    pub target: ExecutionTarget,
    /// Explicit per-input schemas. Required with an execution override,
    /// derived from sub-workflow ports otherwise.
    #[serde(default)]
    pub input_schemas: Vec<KeyValueSchema>,
    #[serde(default)]
    pub output_schema: Option<KeyValueSchema>,
    /// Jars this job additionally needs on the engine classpath.
    #[serde(default)]
    pub jars: Vec<PathBuf>,
    /// Reduce only: also run the logic as a pre-aggregation combiner.
    #[serde(default)]
    pub use_combiner: bool,
    /// Run the cloned sub-workflow's full lifecycle once per input group
    /// instead of once per job.
    #[serde(default)]
    pub run_lifecycle_per_input: bool,
    /// Per-job parameters forwarded to the engine alongside the job.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl PatternJob {
    pub fn new(name: impl Into<String>, kind: PatternKind, target: ExecutionTarget) -> Self {
        Self {
            name: name.into(),
            kind,
            parallelism: Parallelism::Default,
            target,
            input_schemas: Vec::new(),
            output_schema: None,
            jars: Vec::new(),
            use_combiner: false,
            run_lifecycle_per_input: false,
            parameters: BTreeMap::new(),
        }
    }

    /// Enforce the override/schema contract.
    ///
    /// An execution override and explicit key/value schemas must be set
    /// together or cleared together, in both directions. With an override
    /// present, one input schema per input stream and an output schema are
    /// required.
    pub fn validate_consistency(&self) -> Result<(), ConfigError> {
        let has_override = self.target.is_override();
        let schemas_complete =
            self.input_schemas.len() == self.kind.input_arity() && self.output_schema.is_some();
        let schemas_any = !self.input_schemas.is_empty() || self.output_schema.is_some();

        if has_override && !schemas_complete {
            return Err(ConfigError::SchemaOverrideMismatch(self.name.clone()));
        }
        if !has_override && schemas_any && !schemas_complete {
            return Err(ConfigError::SchemaOverrideMismatch(self.name.clone()));
        }
        if self.use_combiner && self.kind != PatternKind::Reduce {
            warn!(
                job = %self.name,
                kind = self.kind.name(),
                operator = "PatternJob",
                "combiner flag is only honored for Reduce jobs; ignoring"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdp_schema::parse_key_value_types;

    fn schemas() -> (KeyValueSchema, KeyValueSchema) {
        (
            parse_key_value_types("string int").unwrap(),
            parse_key_value_types("string long").unwrap(),
        )
    }

    #[test]
    fn override_without_schemas_is_rejected() {
        let job = PatternJob::new(
            "wordcount-map",
            PatternKind::Map,
            ExecutionTarget::ExternalClass("org.example.TokenizeMap".into()),
        );
        assert!(matches!(
            job.validate_consistency(),
            Err(ConfigError::SchemaOverrideMismatch(name)) if name == "wordcount-map"
        ));
    }

    #[test]
    fn override_with_full_schemas_passes() {
        let (input, output) = schemas();
        let mut job = PatternJob::new(
            "wordcount-map",
            PatternKind::Map,
            ExecutionTarget::ExternalClass("org.example.TokenizeMap".into()),
        );
        job.input_schemas = vec![input];
        job.output_schema = Some(output);
        assert!(job.validate_consistency().is_ok());
    }

    #[test]
    fn partial_schemas_without_override_are_rejected() {
        let (input, _) = schemas();
        let mut job = PatternJob::new(
            "join",
            PatternKind::Match,
            ExecutionTarget::SubWorkflow("join-logic".into()),
        );
        job.input_schemas = vec![input];
        assert!(matches!(
            job.validate_consistency(),
            Err(ConfigError::SchemaOverrideMismatch(_))
        ));
    }

    #[test]
    fn sub_workflow_without_schemas_passes() {
        let job = PatternJob::new(
            "count",
            PatternKind::Reduce,
            ExecutionTarget::SubWorkflow("count-logic".into()),
        );
        assert!(job.validate_consistency().is_ok());
    }

    #[test]
    fn dual_input_override_needs_two_input_schemas() {
        let (input, output) = schemas();
        let mut job = PatternJob::new(
            "join",
            PatternKind::CoGroup,
            ExecutionTarget::ExternalClass("org.example.Join".into()),
        );
        job.input_schemas = vec![input.clone()];
        job.output_schema = Some(output);
        assert!(job.validate_consistency().is_err());
        job.input_schemas.push(input);
        assert!(job.validate_consistency().is_ok());
    }

    #[test]
    fn default_parallelism_resolves_to_director_degree() {
        assert_eq!(Parallelism::Default.resolve(4), 4);
        assert_eq!(Parallelism::Degree(0).resolve(4), 0);
        assert_eq!(Parallelism::Degree(8).resolve(4), 8);
    }
}
