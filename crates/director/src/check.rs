//! Pre-run model checks.

use fdp_common::ValidationError;
use fdp_model::{
    DirectorModel, GraphNode, Iterations, SubDirector, WorkflowGraph,
};
use tracing::warn;

/// Reconcile a sub-workflow's director with the job's lifecycle setting.
///
/// Returns the effective `run_lifecycle_per_input` value:
/// - a bounded-iterations director gets its iteration count set to exactly
///   1 when running per input and unbounded otherwise; a mismatched bound
///   is overwritten with a warning
/// - a dynamic-dataflow director cannot run once per job; the lifecycle is
///   forced to per-input with a warning
/// - any other director is tolerated with a warning
pub fn check_director_iterations(
    workflow: &str,
    director: Option<&mut SubDirector>,
    run_lifecycle_per_input: bool,
) -> bool {
    let Some(director) = director else {
        return run_lifecycle_per_input;
    };
    match &director.model {
        DirectorModel::BoundedIterations => {
            let expected = if run_lifecycle_per_input {
                Iterations::Count(1)
            } else {
                Iterations::Unbounded
            };
            if director.iterations != expected {
                warn!(
                    workflow,
                    iterations = ?director.iterations,
                    expected = ?expected,
                    operator = "ModelCheck",
                    "adjusting iteration bound to match the lifecycle setting"
                );
                director.iterations = expected;
            }
            run_lifecycle_per_input
        }
        DirectorModel::DynamicDataflow => {
            if !run_lifecycle_per_input {
                warn!(
                    workflow,
                    operator = "ModelCheck",
                    "dynamic dataflow requires running the lifecycle per input; forcing it"
                );
            }
            true
        }
        DirectorModel::Other(name) => {
            warn!(
                workflow,
                director = %name,
                operator = "ModelCheck",
                "unexpected director; results may be incorrect"
            );
            run_lifecycle_per_input
        }
    }
}

/// Reject graphs containing entities the engines cannot run.
pub fn check_model(graph: &WorkflowGraph) -> Result<(), ValidationError> {
    graph.validate_edges()?;
    for node in &graph.nodes {
        if let GraphNode::Foreign {
            name,
            is_composite,
            has_director,
            ..
        } = node
        {
            if *is_composite && !has_director {
                return Err(ValidationError::NotOpaque(name.clone()));
            }
            return Err(ValidationError::NonPatternActor(name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdp_model::{DataSourceSpec, GraphNode};

    fn sub(model: DirectorModel, iterations: Iterations) -> SubDirector {
        SubDirector { model, iterations }
    }

    #[test]
    fn no_director_keeps_the_setting() {
        assert!(check_director_iterations("w", None, true));
        assert!(!check_director_iterations("w", None, false));
    }

    #[test]
    fn bounded_iterations_are_set_to_match_the_lifecycle() {
        let mut d = sub(DirectorModel::BoundedIterations, Iterations::Count(10));
        assert!(check_director_iterations("w", Some(&mut d), true));
        assert_eq!(d.iterations, Iterations::Count(1));

        let mut d = sub(DirectorModel::BoundedIterations, Iterations::Count(1));
        assert!(!check_director_iterations("w", Some(&mut d), false));
        assert_eq!(d.iterations, Iterations::Unbounded);
    }

    #[test]
    fn matching_bounds_are_left_alone() {
        let mut d = sub(DirectorModel::BoundedIterations, Iterations::Count(1));
        assert!(check_director_iterations("w", Some(&mut d), true));
        assert_eq!(d.iterations, Iterations::Count(1));

        let mut d = sub(DirectorModel::BoundedIterations, Iterations::Unbounded);
        assert!(!check_director_iterations("w", Some(&mut d), false));
        assert_eq!(d.iterations, Iterations::Unbounded);
    }

    #[test]
    fn dynamic_dataflow_forces_per_input() {
        let mut d = sub(DirectorModel::DynamicDataflow, Iterations::Unbounded);
        assert!(check_director_iterations("w", Some(&mut d), false));
        assert!(check_director_iterations("w", Some(&mut d), true));
        // The bound belongs to the dynamic director; it is not rewritten.
        assert_eq!(d.iterations, Iterations::Unbounded);
    }

    #[test]
    fn other_directors_are_tolerated() {
        let mut d = sub(DirectorModel::Other("Continuous".into()), Iterations::Unbounded);
        assert!(!check_director_iterations("w", Some(&mut d), false));
        assert_eq!(d.iterations, Iterations::Unbounded);
    }

    #[test]
    fn foreign_atomic_entity_is_rejected() {
        let mut graph = WorkflowGraph::new();
        graph.add_node(GraphNode::Foreign {
            name: "Display".to_string(),
            class: "ui.Display".to_string(),
            is_composite: false,
            has_director: false,
        });
        assert_eq!(
            check_model(&graph).unwrap_err(),
            ValidationError::NonPatternActor("Display".to_string())
        );
    }

    #[test]
    fn composite_without_director_must_contain_one() {
        let mut graph = WorkflowGraph::new();
        graph.add_node(GraphNode::Foreign {
            name: "Nested".to_string(),
            class: "composite".to_string(),
            is_composite: true,
            has_director: false,
        });
        assert_eq!(
            check_model(&graph).unwrap_err(),
            ValidationError::NotOpaque("Nested".to_string())
        );
    }

    #[test]
    fn pattern_only_graphs_pass() {
        let mut graph = WorkflowGraph::new();
        graph.add_node(GraphNode::Source(DataSourceSpec::tokens("in", vec![])));
        assert!(check_model(&graph).is_ok());
    }
}
