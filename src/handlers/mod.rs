//! Node Logic Handlers: one pure function per [`crate::document::StepParams`]
//! variant. Each takes the merged context view (`workflow_data` plus any
//! mapped-iteration `item` overlay) and resources, and returns an outcome —
//! never timing, error formatting, or debug-record assembly, which belong to
//! [`crate::executor`].

pub mod api;
pub mod code;
pub mod llm;
pub mod registry;
pub mod workflow;

use serde_json::Value;

/// What a handler hands back to the executor wrapper.
pub struct HandlerOutcome {
    pub output: Value,
    /// The resolved `input_mapping` values, recorded verbatim into the
    /// parent `DebugRecord.inputs` after sanitization.
    pub resolved_inputs: Value,
    /// Additional debug records a handler wants folded into `debug_log`
    /// alongside its own parent record — used only by the `workflow` kind,
    /// which contributes its embedded sub-run's entire log.
    pub extra_records: Vec<crate::state::DebugRecord>,
}

/// Resolves every entry of `input_mapping` against `context`, returning a
/// `(local_name -> resolved_value)` map plus the same values as a JSON object
/// for debug-record purposes.
pub fn resolve_inputs(
    input_mapping: &std::collections::HashMap<String, String>,
    context: &rustc_hash::FxHashMap<String, Value>,
) -> rustc_hash::FxHashMap<String, Value> {
    input_mapping
        .iter()
        .map(|(local, ref_path)| (local.clone(), crate::resolver::resolve_ref(context, ref_path)))
        .collect()
}

pub fn inputs_as_value(resolved: &rustc_hash::FxHashMap<String, Value>) -> Value {
    Value::Object(
        resolved
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}
