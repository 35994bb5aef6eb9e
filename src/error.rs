//! Crate-wide error taxonomy.
//!
//! Four categories mirror the lifecycle stages a workflow passes through:
//! compiling a document ([`ValidationError`]), resolving a step's inputs
//! ([`InputResolutionError`]), running a step's handler ([`HandlerError`]),
//! and evaluating a router's condition ([`RouterError`]). [`EngineError`]
//! wraps all four for call sites that need one error type.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    #[error("step `{0}` depends on unknown step `{1}`")]
    #[diagnostic(code(loomgraph::validation::unknown_dependency))]
    UnknownDependency(String, String),

    #[error("duplicate step id `{0}`")]
    #[diagnostic(code(loomgraph::validation::duplicate_step))]
    DuplicateStep(String),

    #[error("router `{0}` routing_map references unknown step `{1}`")]
    #[diagnostic(code(loomgraph::validation::unknown_route_target))]
    UnknownRouteTarget(String, String),

    #[error("graph contains a cycle involving step `{0}`")]
    #[diagnostic(
        code(loomgraph::validation::cycle),
        help("routers and dependencies must form a DAG")
    )]
    Cycle(String),

    #[error("workflow document has no steps")]
    #[diagnostic(code(loomgraph::validation::empty_document))]
    EmptyDocument,
}

#[derive(Debug, Error, Diagnostic)]
pub enum InputResolutionError {
    #[error("step `{step}` resolved all inputs to null")]
    #[diagnostic(
        code(loomgraph::resolution::all_inputs_null),
        help("check that upstream steps populate the keys this step reads")
    )]
    AllInputsNull { step: String },

    #[error("placeholder `<{0}>` has no matching resolved value")]
    #[diagnostic(code(loomgraph::resolution::unresolved_placeholder))]
    UnresolvedPlaceholder(String),
}

#[derive(Debug, Error, Diagnostic)]
pub enum HandlerError {
    #[error("llm handler failed: {0}")]
    #[diagnostic(code(loomgraph::handler::llm))]
    Llm(String),

    #[error("{0}")]
    #[diagnostic(code(loomgraph::handler::custom))]
    Custom(String),

    #[error("code handler `{name}` input did not match its schema: {source}")]
    #[diagnostic(code(loomgraph::handler::code))]
    Code {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("code step `{0}` is not registered")]
    #[diagnostic(code(loomgraph::handler::unregistered_code_step))]
    UnregisteredCodeStep(String),

    #[error("api call to `{url}` failed with status {status}: {body}")]
    #[diagnostic(code(loomgraph::handler::http))]
    Http {
        url: String,
        status: u16,
        body: String,
    },

    #[error("http transport error: {0}")]
    #[diagnostic(code(loomgraph::handler::transport))]
    Transport(String),

    #[error("sub-workflow `{0}` could not be compiled: {1}")]
    #[diagnostic(code(loomgraph::handler::sub_workflow))]
    SubWorkflow(String, String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Prompt(#[from] PromptError),
}

#[derive(Debug, Error, Diagnostic)]
pub enum PromptError {
    #[error(
        "prompt template `{name}` not found in workflow path `{workflow_path}` \
         or shared path `{shared_path}`"
    )]
    #[diagnostic(code(loomgraph::prompt::not_found))]
    NotFound {
        name: String,
        workflow_path: String,
        shared_path: String,
    },

    #[error("prompt template `{0}` could not be read: {1}")]
    #[diagnostic(code(loomgraph::prompt::read))]
    Read(String, String),
}

#[derive(Debug, Error, Diagnostic)]
pub enum RouterError {
    #[error("router `{step}` condition value `{value}` matched no entry in routing_map")]
    #[diagnostic(
        code(loomgraph::router::no_match),
        help("add an entry for this value, or an \"else\"/wildcard default route")
    )]
    NoMatchingRoute { step: String, value: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    InputResolution(#[from] InputResolutionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Router(#[from] RouterError),
}
