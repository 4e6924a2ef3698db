//! Resolution of execution overrides to runnable logic.
//!
//! Pattern jobs that bypass the sub-workflow model name either an
//! implementation class or inline code in some language. Both are resolved
//! through an explicit registry; there is no reflection and no on-the-fly
//! classpath scanning.

use std::collections::BTreeMap;
use std::sync::Arc;

use fdp_common::EngineError;
use fdp_model::{ExecutionTarget, LogicFactory, PatternJob, WorkflowLogic, WorkflowModel};

/// Compiles inline source text into a logic factory.
pub type LanguageHandler =
    Arc<dyn Fn(&str) -> Result<LogicFactory, EngineError> + Send + Sync>;

/// Name-keyed registry of override implementations.
#[derive(Default)]
pub struct LogicRegistry {
    classes: BTreeMap<String, LogicFactory>,
    languages: BTreeMap<String, LanguageHandler>,
}

impl LogicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation class under its external name.
    pub fn register_class(&mut self, name: impl Into<String>, factory: LogicFactory) {
        self.classes.insert(name.into(), factory);
    }

    /// Register a handler for one inline-code language.
    pub fn register_language(&mut self, language: impl Into<String>, handler: LanguageHandler) {
        self.languages.insert(language.into(), handler);
    }

    /// Resolve a job's execution target to a per-worker logic factory.
    pub fn resolve(
        &self,
        job: &PatternJob,
        model: &dyn WorkflowModel,
    ) -> Result<LogicFactory, EngineError> {
        match &job.target {
            ExecutionTarget::SubWorkflow(name) => {
                let workflow = model.clone_sub_workflow(name).map_err(|e| {
                    EngineError::InstantiationFailed(job.name.clone(), e.to_string())
                })?;
                Ok(Arc::new(move || workflow.instantiate()))
            }
            ExecutionTarget::ExternalClass(class) => {
                self.classes.get(class).cloned().ok_or_else(|| {
                    EngineError::InstantiationFailed(
                        job.name.clone(),
                        format!("no implementation registered for class '{class}'"),
                    )
                })
            }
            ExecutionTarget::InlineCode { language, source } => {
                let handler = self.languages.get(language).ok_or_else(|| {
                    EngineError::InstantiationFailed(
                        job.name.clone(),
                        format!("no handler registered for language '{language}'"),
                    )
                })?;
                handler(source)
            }
        }
    }
}

/// Convenience for building a factory from a closure that constructs the
/// logic value.
pub fn factory_of<L, F>(build: F) -> LogicFactory
where
    L: WorkflowLogic + 'static,
    F: Fn() -> L + Send + Sync + 'static,
{
    Arc::new(move || Box::new(build()))
}
