//! The embedded engine: runs whole pipelines in the director's process.

use fdp_common::{EngineDescriptor, Result};
use fdp_schema::Record;
use std::collections::BTreeMap;
use tracing::info;

use crate::context::{JobContext, SERVER_TYPE_EMBEDDED};
use crate::exec;
use crate::{Engine, EngineFactory};

/// Executes jobs through the in-process stub drivers. No server, no
/// classpath shipping; the natural engine for tests and small workloads.
pub struct LocalEngine {
    descriptor: EngineDescriptor,
}

impl LocalEngine {
    pub fn new(descriptor: EngineDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn factory() -> EngineFactory {
        std::sync::Arc::new(|descriptor| Ok(Box::new(LocalEngine::new(descriptor.clone()))))
    }
}

impl Engine for LocalEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn server_types(&self) -> Vec<&'static str> {
        vec![SERVER_TYPE_EMBEDDED]
    }

    fn execute_job(&mut self, ctx: &mut JobContext) -> Result<BTreeMap<String, Vec<Record>>> {
        info!(
            run_id = %ctx.run_id,
            engine = %self.descriptor.name,
            jobs = ctx.graph.pattern_jobs().count(),
            operator = "LocalEngine",
            "executing pipeline in process"
        );
        exec::run_pipeline(ctx)
    }
}
