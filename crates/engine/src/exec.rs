//! Whole-pipeline execution over the stub drivers.
//!
//! Walks the workflow graph in dependency order, runs each pattern job
//! through [`crate::stub`], and returns the records destined for each sink.
//! Both builtin engines funnel through this; a remote backend would replace
//! it with job submission.

use std::collections::BTreeMap;

use fdp_common::Result;
use fdp_model::GraphNode;
use fdp_schema::Record;
use tracing::{debug, info, warn};

use crate::context::JobContext;
use crate::stub;

/// Execute every pattern job in the context's graph.
///
/// Returns sink name to result records. Honors the cooperative stop flag
/// between jobs; jobs already finished keep their outputs.
pub fn run_pipeline(ctx: &mut JobContext) -> Result<BTreeMap<String, Vec<Record>>> {
    let graph = ctx.graph.clone();
    let order = graph.topological_order()?;

    let mut outputs: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    let mut sink_outputs: BTreeMap<String, Vec<Record>> = BTreeMap::new();

    for node in order {
        if ctx.stop_requested() {
            info!(
                run_id = %ctx.run_id,
                node = node.name(),
                operator = "Pipeline",
                "stop requested; skipping remaining jobs"
            );
            break;
        }
        match node {
            GraphNode::Source(spec) => {
                let records = ctx.take_source_records(&spec.name);
                debug!(
                    source = %spec.name,
                    records = records.len(),
                    operator = "Pipeline",
                    "source produced"
                );
                outputs.insert(spec.name.clone(), records);
            }
            GraphNode::Pattern(job) => {
                let inputs: Vec<Vec<Record>> = graph
                    .upstream(&job.name)
                    .into_iter()
                    .map(|name| outputs.get(name).cloned().unwrap_or_default())
                    .collect();
                let factory = ctx.logic.resolve(job, ctx.model.as_ref())?;
                let degree = job.parallelism.resolve(ctx.degree_of_parallelism);
                let records =
                    stub::run_pattern(job, &factory, inputs, degree, &ctx.stop_flag())?;
                debug!(
                    job = %job.name,
                    kind = job.kind.name(),
                    degree,
                    records = records.len(),
                    operator = "Pipeline",
                    "pattern job finished"
                );
                outputs.insert(job.name.clone(), records);
            }
            GraphNode::Sink(spec) => {
                let mut records = Vec::new();
                for upstream in graph.upstream(&spec.name) {
                    records.extend(outputs.get(upstream).cloned().unwrap_or_default());
                }
                sink_outputs.insert(spec.name.clone(), records);
            }
            GraphNode::Foreign { name, .. } => {
                // Rejected during model checking; reaching one here means the
                // caller skipped validation.
                warn!(node = %name, operator = "Pipeline", "ignoring foreign entity");
            }
        }
    }
    Ok(sink_outputs)
}
