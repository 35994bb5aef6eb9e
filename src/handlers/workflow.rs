//! The `workflow` step kind: embeds and runs a sub-workflow to completion,
//! forwarding its events onto the parent's stream as they occur.

use super::{inputs_as_value, resolve_inputs, HandlerOutcome};
use crate::error::HandlerError;
use crate::events::{self, EventSink};
use crate::handlers::registry::CodeStepRegistry;
use crate::resources::Resources;
use crate::subworkflow::SubWorkflowCache;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::HashMap;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    resources: &Resources,
    registry: &CodeStepRegistry,
    cache: &SubWorkflowCache,
    parent_step: &str,
    workflow_name: &str,
    input_mapping: &HashMap<String, String>,
    output_mapping: &HashMap<String, String>,
    context: &FxHashMap<String, Value>,
    outer_events: &EventSink,
    map_index: Option<usize>,
) -> Result<HandlerOutcome, HandlerError> {
    let resolved = resolve_inputs(input_mapping, context);

    let graph = cache
        .get_or_compile(workflow_name)
        .map_err(|e| HandlerError::SubWorkflow(workflow_name.to_string(), e.to_string()))?;

    let (sub_sink, sub_stream) = events::channel();
    let sub_resources = resources.clone();
    let sub_registry = registry.clone();
    let sub_cache = cache.clone();
    let initial_data: FxHashMap<String, Value> = resolved.clone();

    let run_handle = tokio::spawn(async move {
        crate::engine::run_compiled_graph(
            graph,
            sub_resources,
            sub_registry,
            sub_cache,
            initial_data,
            sub_sink,
        )
        .await
    });

    while let Some(event) = sub_stream.recv().await {
        outer_events.forward_sub_event(parent_step, workflow_name, map_index, event);
    }

    let sub_state = run_handle
        .await
        .map_err(|e| HandlerError::SubWorkflow(workflow_name.to_string(), e.to_string()))?;

    if let Some(first_error) = sub_state.error_info.first() {
        return Err(HandlerError::SubWorkflow(
            workflow_name.to_string(),
            first_error.message.clone(),
        ));
    }

    let mut output = serde_json::Map::new();
    for (sub_key, parent_key) in output_mapping {
        if let Some(value) = sub_state.workflow_data.get(sub_key) {
            output.insert(parent_key.clone(), value.clone());
        }
    }

    Ok(HandlerOutcome {
        output: Value::Object(output),
        resolved_inputs: inputs_as_value(&resolved),
        extra_records: sub_state.debug_log,
    })
}
