//! Builtin workflow logic registered by the `fdp-run` binary.
//!
//! These cover the classic demonstration pipelines (tokenize plus word
//! count) and give execution-override jobs something runnable without a
//! user-provided registry.

use fdp_common::RuntimeError;
use fdp_engine::{factory_of, LogicRegistry};
use fdp_model::{StubInput, WorkflowLogic};
use fdp_schema::{Record, Value};

/// Class name of [`IdentityMap`].
pub const IDENTITY_MAP: &str = "fdp.builtin.IdentityMap";
/// Class name of [`TokenizeMap`].
pub const TOKENIZE_MAP: &str = "fdp.builtin.TokenizeMap";
/// Class name of [`SumReduce`].
pub const SUM_REDUCE: &str = "fdp.builtin.SumReduce";

/// Passes every record through unchanged.
pub struct IdentityMap;

impl WorkflowLogic for IdentityMap {
    fn run_iteration(&mut self, input: StubInput) -> Result<Vec<Record>, RuntimeError> {
        match input {
            StubInput::Map(record) => Ok(vec![record]),
            other => Err(RuntimeError::JobFailed(format!(
                "IdentityMap expects map input, got {:?}",
                other.kind()
            ))),
        }
    }
}

/// Splits a string value into whitespace tokens, emitting `(token, 1)`.
pub struct TokenizeMap;

impl WorkflowLogic for TokenizeMap {
    fn run_iteration(&mut self, input: StubInput) -> Result<Vec<Record>, RuntimeError> {
        let StubInput::Map(record) = input else {
            return Err(RuntimeError::JobFailed(
                "TokenizeMap expects map input".to_string(),
            ));
        };
        let Value::Str(text) = &record.value else {
            return Err(RuntimeError::JobFailed(
                "TokenizeMap expects string values".to_string(),
            ));
        };
        Ok(text
            .split_whitespace()
            .map(|token| Record::new(Value::Str(token.to_string()), Value::Long(1)))
            .collect())
    }
}

/// Sums the numeric values of one key group.
pub struct SumReduce;

impl WorkflowLogic for SumReduce {
    fn run_iteration(&mut self, input: StubInput) -> Result<Vec<Record>, RuntimeError> {
        let StubInput::Reduce { key, values } = input else {
            return Err(RuntimeError::JobFailed(
                "SumReduce expects reduce input".to_string(),
            ));
        };
        let mut sum = 0i64;
        for value in &values {
            sum += match value {
                Value::Int(i) => *i as i64,
                Value::Long(l) => *l,
                other => {
                    return Err(RuntimeError::JobFailed(format!(
                        "SumReduce expects numeric values, got {other:?}"
                    )))
                }
            };
        }
        Ok(vec![Record::new(key, Value::Long(sum))])
    }
}

/// Register the builtin classes on a logic registry.
pub fn register_builtin_logic(registry: &mut LogicRegistry) {
    registry.register_class(IDENTITY_MAP, factory_of(|| IdentityMap));
    registry.register_class(TOKENIZE_MAP, factory_of(|| TokenizeMap));
    registry.register_class(SUM_REDUCE, factory_of(|| SumReduce));
}
