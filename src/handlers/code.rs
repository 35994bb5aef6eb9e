//! The `code` step kind.

use super::{inputs_as_value, resolve_inputs, HandlerOutcome};
use crate::error::HandlerError;
use crate::handlers::registry::CodeStepRegistry;
use crate::resources::Resources;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::HashMap;

/// Resolves `input_mapping` into a dict, looks up `function_name` in the
/// registry, and invokes it. Schema validation is deserialization: a
/// malformed dict surfaces as [`HandlerError::Code`].
pub async fn run(
    resources: &Resources,
    registry: &CodeStepRegistry,
    function_name: &str,
    input_mapping: &HashMap<String, String>,
    context: &FxHashMap<String, Value>,
) -> Result<HandlerOutcome, HandlerError> {
    let resolved = resolve_inputs(input_mapping, context);
    let input = inputs_as_value(&resolved);

    let output = registry
        .invoke(function_name, input.clone(), resources)
        .await?;

    Ok(HandlerOutcome {
        output,
        resolved_inputs: input,
        extra_records: Vec::new(),
    })
}
