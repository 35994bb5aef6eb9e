//! The `api` step kind.

use super::{inputs_as_value, resolve_inputs, HandlerOutcome};
use crate::error::HandlerError;
use crate::resolver::resolve_placeholders;
use crate::resources::Resources;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::HashMap;

/// Resolves the endpoint, headers, and body through [`resolve_placeholders`],
/// issues the request, and raises on any non-2xx response.
pub async fn run(
    resources: &Resources,
    method: &str,
    endpoint: &Value,
    headers: &Value,
    body: &Value,
    input_mapping: &HashMap<String, String>,
    context: &FxHashMap<String, Value>,
) -> Result<HandlerOutcome, HandlerError> {
    let resolved = resolve_inputs(input_mapping, context);
    // input_mapping values feed into the endpoint/headers/body templates
    // under their local names, alongside the base context.
    let mut merged_context = context.clone();
    merged_context.extend(resolved.iter().map(|(k, v)| (k.clone(), v.clone())));

    let resolved_endpoint = resolve_placeholders(endpoint, &merged_context);
    let resolved_headers = resolve_placeholders(headers, &merged_context);
    let resolved_body = resolve_placeholders(body, &merged_context);

    let url = match &resolved_endpoint {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let response = resources
        .http_transport
        .request(method, &url, resolved_headers, resolved_body)
        .await
        .map_err(HandlerError::Transport)?;

    if !(200..300).contains(&response.status) {
        return Err(HandlerError::Http {
            url,
            status: response.status,
            body: response.raw_body,
        });
    }

    Ok(HandlerOutcome {
        output: response.json,
        resolved_inputs: inputs_as_value(&resolved),
        extra_records: Vec::new(),
    })
}
