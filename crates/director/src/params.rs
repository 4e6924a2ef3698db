//! Parameter propagation into sub-workflow clones and job-argument parsing.

use std::collections::BTreeMap;

use fdp_common::ConfigError;
use fdp_model::{ScopeLayer, SubWorkflow};
use tracing::debug;

/// Collect the parameters visible from a scope chain, innermost layer
/// first.
///
/// Variables whose name starts with `_` and variables carrying a semantic
/// type annotation are never copied. When the same name appears in several
/// layers the innermost occurrence wins.
pub fn collect_parameters(scope: &[ScopeLayer]) -> BTreeMap<String, String> {
    let mut collected = BTreeMap::new();
    for layer in scope {
        for variable in &layer.variables {
            if variable.name.starts_with('_') || variable.semantic_type.is_some() {
                continue;
            }
            collected
                .entry(variable.name.clone())
                .or_insert_with(|| variable.value.clone());
        }
    }
    collected
}

/// Copy scope parameters into a sub-workflow clone.
///
/// Parameters already defined on the clone shadow the scope chain.
pub fn copy_parameters_into_sub_workflow(scope: &[ScopeLayer], sub_workflow: &mut SubWorkflow) {
    let mut copied = 0usize;
    for (name, value) in collect_parameters(scope) {
        if !sub_workflow.parameters.contains_key(&name) {
            sub_workflow.parameters.insert(name, value);
            copied += 1;
        }
    }
    debug!(
        workflow = %sub_workflow.name,
        copied,
        operator = "ParameterCopy",
        "scope parameters applied"
    );
}

/// Parse `name1 = value1, name2 = value2` into an argument map.
pub fn parse_job_arguments(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut arguments = BTreeMap::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedJobArguments(entry.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::MalformedJobArguments(entry.to_string()));
        }
        arguments.insert(name.to_string(), value.trim().to_string());
    }
    Ok(arguments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdp_model::ScopeVariable;
    use std::sync::Arc;

    fn layer(name: &str, vars: &[(&str, &str)]) -> ScopeLayer {
        ScopeLayer {
            name: name.to_string(),
            variables: vars
                .iter()
                .map(|(n, v)| ScopeVariable {
                    name: n.to_string(),
                    value: v.to_string(),
                    semantic_type: None,
                })
                .collect(),
        }
    }

    #[test]
    fn inner_layers_shadow_outer_layers() {
        let scope = vec![
            layer("inner", &[("threshold", "5")]),
            layer("outer", &[("threshold", "99"), ("mode", "fast")]),
        ];
        let params = collect_parameters(&scope);
        assert_eq!(params.get("threshold").map(String::as_str), Some("5"));
        assert_eq!(params.get("mode").map(String::as_str), Some("fast"));
    }

    #[test]
    fn underscore_and_semantic_typed_variables_are_skipped() {
        let mut scope = vec![layer("inner", &[("_internal", "x"), ("keep", "1")])];
        scope[0].variables.push(ScopeVariable {
            name: "annotated".to_string(),
            value: "y".to_string(),
            semantic_type: Some("urn:lsid:example".to_string()),
        });
        let params = collect_parameters(&scope);
        assert_eq!(params.len(), 1);
        assert!(params.contains_key("keep"));
    }

    #[test]
    fn existing_clone_parameters_are_not_overwritten() {
        let mut sub = SubWorkflow::new("clone", Arc::new(|| unreachable!()));
        sub.parameters
            .insert("threshold".to_string(), "local".to_string());
        copy_parameters_into_sub_workflow(&[layer("outer", &[("threshold", "9")])], &mut sub);
        assert_eq!(
            sub.parameters.get("threshold").map(String::as_str),
            Some("local")
        );
    }

    #[test]
    fn job_arguments_parse_and_trim() {
        let args = parse_job_arguments(" a = 1 , b=two ,").unwrap();
        assert_eq!(args.get("a").map(String::as_str), Some("1"));
        assert_eq!(args.get("b").map(String::as_str), Some("two"));
    }

    #[test]
    fn malformed_job_arguments_are_rejected() {
        assert!(matches!(
            parse_job_arguments("a=1, bogus"),
            Err(ConfigError::MalformedJobArguments(entry)) if entry == "bogus"
        ));
        assert!(matches!(
            parse_job_arguments("=value"),
            Err(ConfigError::MalformedJobArguments(_))
        ));
    }

    #[test]
    fn empty_job_arguments_are_fine() {
        assert!(parse_job_arguments("").unwrap().is_empty());
        assert!(parse_job_arguments("  ").unwrap().is_empty());
    }
}
