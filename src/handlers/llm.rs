//! The `llm` step kind.

use super::{inputs_as_value, resolve_inputs, HandlerOutcome};
use crate::error::{HandlerError, InputResolutionError};
use crate::prompts::PromptLoader;
use crate::resolver::all_null;
use crate::resources::{PromptPart, Resources};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::HashMap;

/// Resolves `input_mapping`, partitions resolved values into multimodal
/// prompt parts (values shaped like `{mime_type, data}`) and text
/// substitutions, renders the prompt template, and invokes the
/// language-model client.
///
/// Fails fast if every resolved value is null (upstream data loss) before
/// ever constructing a prompt or touching the client. Vacuously true for a
/// step with an empty `input_mapping`, matching the original handler.
pub async fn run(
    resources: &Resources,
    workflow_name: &str,
    step_name: &str,
    prompt_template: &str,
    input_mapping: &HashMap<String, String>,
    context: &FxHashMap<String, Value>,
) -> Result<HandlerOutcome, HandlerError> {
    let resolved = resolve_inputs(input_mapping, context);

    if all_null(resolved.values()) {
        return Err(HandlerError::Llm(
            InputResolutionError::AllInputsNull {
                step: step_name.to_string(),
            }
            .to_string(),
        ));
    }

    let template = PromptLoader::new(&resources.config).load(workflow_name, prompt_template)?;
    let mut rendered = template;
    let mut media_parts = Vec::new();

    for value in resolved.values() {
        if let Some(part) = as_media_part(value) {
            media_parts.push(part);
        }
    }

    for (local_name, value) in &resolved {
        if as_media_part(value).is_some() {
            continue;
        }
        let token = format!("<{local_name}>");
        if rendered.contains(&token) {
            rendered = rendered.replace(&token, &stringify(value));
        }
    }

    let mut parts = vec![PromptPart::Text(rendered)];
    parts.extend(media_parts);

    let output = resources
        .llm_client
        .generate(parts)
        .await
        .map_err(HandlerError::Llm)?;

    Ok(HandlerOutcome {
        output,
        resolved_inputs: inputs_as_value(&resolved),
        extra_records: Vec::new(),
    })
}

fn as_media_part(value: &Value) -> Option<PromptPart> {
    let Value::Object(map) = value else {
        return None;
    };
    let mime_type = map.get("mime_type")?.as_str()?.to_string();
    let data = map.get("data")?.as_str()?;
    Some(PromptPart::Media {
        mime_type,
        data: data.as_bytes().to_vec(),
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Object(_) | Value::Array(_) => serde_json::to_string(value).unwrap_or_default(),
        other => other.to_string(),
    }
}
