//! Run state and its reducers.
//!
//! `GraphState` is shared by every node execution within one run. Nodes never
//! mutate it directly; they return a [`NodePartial`] which [`GraphState::merge`]
//! folds in field-wise. `workflow_data` is a shallow key-union; the log fields
//! concatenate. There is no general deep-merge — nested structure belongs
//! entirely inside one output value.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum DebugStatus {
    Running,
    Completed,
    Failed,
}

impl DebugStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebugStatus::Running => "Running",
            DebugStatus::Completed => "Completed",
            DebugStatus::Failed => "Failed",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DebugRecord {
    pub step_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: DebugStatus,
    pub duration_ms: u64,
    pub inputs: Value,
    pub outputs: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_child: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub failed_step: String,
    pub message: String,
    pub traceback: String,
}

/// A node's contribution to the shared state, folded in by [`GraphState::merge`].
#[derive(Clone, Debug, Default)]
pub struct NodePartial {
    pub workflow_data: FxHashMap<String, Value>,
    pub debug_log: Vec<DebugRecord>,
    pub execution_log: Vec<String>,
    pub error_info: Vec<ErrorRecord>,
}

impl NodePartial {
    pub fn is_empty(&self) -> bool {
        self.workflow_data.is_empty()
            && self.debug_log.is_empty()
            && self.execution_log.is_empty()
            && self.error_info.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct GraphState {
    pub workflow_data: FxHashMap<String, Value>,
    pub debug_log: Vec<DebugRecord>,
    pub execution_log: Vec<String>,
    pub error_info: Vec<ErrorRecord>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once any node has recorded a failure; the executor wrapper's
    /// fail-fast gate consults this before running anything else.
    pub fn has_failed(&self) -> bool {
        !self.error_info.is_empty()
    }

    /// Shallow key-union on `workflow_data`, concatenation on the three log
    /// fields. The compiler guarantees disjoint `output_key`s, so a colliding
    /// key here indicates a compiler bug rather than a runtime race.
    pub fn merge(&mut self, partial: NodePartial) {
        for (k, v) in partial.workflow_data {
            self.workflow_data.insert(k, v);
        }
        self.debug_log.extend(partial.debug_log);
        self.execution_log.extend(partial.execution_log);
        self.error_info.extend(partial.error_info);
    }
}

/// Recursively makes a `Value` tree JSON-safe for debug records: this crate
/// never holds raw byte blobs in `Value` (there is no `Value::Bytes`
/// variant), but callers that resolve external bytes (e.g. an `api` response
/// body that isn't UTF-8) route them through [`bytes_placeholder`] before
/// insertion.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), sanitize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        other => other.clone(),
    }
}

pub fn bytes_placeholder(len: usize) -> Value {
    Value::String(format!("<bytes of length {len}>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_shallow_key_union() {
        let mut state = GraphState::new();
        let mut a = NodePartial::default();
        a.workflow_data.insert("a".into(), Value::from(1));
        let mut b = NodePartial::default();
        b.workflow_data.insert("b".into(), Value::from(2));
        state.merge(a);
        state.merge(b);
        assert_eq!(state.workflow_data.get("a"), Some(&Value::from(1)));
        assert_eq!(state.workflow_data.get("b"), Some(&Value::from(2)));
    }

    #[test]
    fn logs_concatenate_in_order() {
        let mut state = GraphState::new();
        let mut a = NodePartial::default();
        a.execution_log.push("first".into());
        let mut b = NodePartial::default();
        b.execution_log.push("second".into());
        state.merge(a);
        state.merge(b);
        assert_eq!(state.execution_log, vec!["first", "second"]);
    }

    #[test]
    fn error_info_non_empty_flags_failure() {
        let mut state = GraphState::new();
        assert!(!state.has_failed());
        state.merge(NodePartial {
            error_info: vec![ErrorRecord {
                failed_step: "x".into(),
                message: "boom".into(),
                traceback: String::new(),
            }],
            ..Default::default()
        });
        assert!(state.has_failed());
    }
}
