//! The declarative workflow document schema.
//!
//! Parsing itself is mechanical (`serde_yaml`); the interesting behavior is
//! entirely in [`crate::compiler`] and [`crate::resolver`]. This module only
//! defines the shape operators author against.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// The sentinel router target meaning "stop the workflow here".
pub const END: &str = "END";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
}

impl WorkflowDocument {
    /// Loads and parses `<root>/workflow.yaml`.
    pub fn load_from_dir(root: &Path) -> Result<Self, DocumentLoadError> {
        let path = root.join("workflow.yaml");
        let text = std::fs::read_to_string(&path)
            .map_err(|e| DocumentLoadError::Read(path.display().to_string(), e.to_string()))?;
        serde_yaml::from_str(&text)
            .map_err(|e| DocumentLoadError::Parse(path.display().to_string(), e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentLoadError {
    #[error("could not read workflow document `{0}`: {1}")]
    Read(String, String),
    #[error("could not parse workflow document `{0}`: {1}")]
    Parse(String, String),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Text,
    File,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    pub kind: InputKind,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    #[serde(default)]
    pub display_hint: Option<String>,
}

/// A single node in the declarative document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(flatten)]
    pub params: StepParams,
}

/// Kind-tagged parameters. The `type` field in the YAML document is the
/// serde tag.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepParams {
    Llm {
        output_key: String,
        prompt_template: String,
        #[serde(default)]
        input_mapping: HashMap<String, String>,
        #[serde(default)]
        map_input: Option<String>,
    },
    Code {
        output_key: String,
        function_name: String,
        #[serde(default)]
        input_mapping: HashMap<String, String>,
        #[serde(default)]
        map_input: Option<String>,
    },
    Api {
        output_key: String,
        method: String,
        endpoint: serde_json::Value,
        #[serde(default)]
        headers: serde_json::Value,
        #[serde(default)]
        body: serde_json::Value,
        #[serde(default)]
        input_mapping: HashMap<String, String>,
        #[serde(default)]
        map_input: Option<String>,
    },
    Workflow {
        output_key: String,
        workflow_name: String,
        #[serde(default)]
        input_mapping: HashMap<String, String>,
        #[serde(default)]
        output_mapping: HashMap<String, String>,
        #[serde(default)]
        map_input: Option<String>,
    },
    ConditionalRouter {
        condition_key: String,
        routing_map: HashMap<String, String>,
    },
}

impl StepParams {
    /// `None` for routers, `Some(output_key)` for everything else.
    pub fn output_key(&self) -> Option<&str> {
        match self {
            StepParams::Llm { output_key, .. }
            | StepParams::Code { output_key, .. }
            | StepParams::Api { output_key, .. }
            | StepParams::Workflow { output_key, .. } => Some(output_key.as_str()),
            StepParams::ConditionalRouter { .. } => None,
        }
    }

    pub fn map_input(&self) -> Option<&str> {
        match self {
            StepParams::Llm { map_input, .. }
            | StepParams::Code { map_input, .. }
            | StepParams::Api { map_input, .. }
            | StepParams::Workflow { map_input, .. } => map_input.as_deref(),
            StepParams::ConditionalRouter { .. } => None,
        }
    }

    pub fn input_mapping(&self) -> Option<&HashMap<String, String>> {
        match self {
            StepParams::Llm { input_mapping, .. }
            | StepParams::Code { input_mapping, .. }
            | StepParams::Api { input_mapping, .. }
            | StepParams::Workflow { input_mapping, .. } => Some(input_mapping),
            StepParams::ConditionalRouter { .. } => None,
        }
    }

    pub fn is_router(&self) -> bool {
        matches!(self, StepParams::ConditionalRouter { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            StepParams::Llm { .. } => "llm",
            StepParams::Code { .. } => "code",
            StepParams::Api { .. } => "api",
            StepParams::Workflow { .. } => "workflow",
            StepParams::ConditionalRouter { .. } => "conditional_router",
        }
    }
}
