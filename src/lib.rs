//! loomgraph: a declarative workflow engine.
//!
//! An operator authors a directed acyclic graph of steps in a YAML
//! document; [`compiler::compile`] turns it into a runnable [`compiler::CompiledGraph`],
//! [`orchestrator::Orchestrator`] runs it concurrently through [`engine::run_compiled_graph`],
//! and [`events::EventStream`] carries progress to an observer in real time.
//!
//! Four step kinds are supported out of the box: `llm` ([`handlers::llm`]),
//! `code` ([`handlers::code`]), `api` ([`handlers::api`]), and an embedded
//! `workflow` sub-graph ([`handlers::workflow`]). Fan-in joins and
//! conditional routers are synthesized by the compiler as data-presence
//! predicates rather than structural barriers — see [`engine`] for why that
//! makes fail-fast automatic.
//!
//! # Quick start
//!
//! ```no_run
//! use loomgraph::config::EngineConfig;
//! use loomgraph::document::WorkflowDocument;
//! use loomgraph::handlers::registry::CodeStepRegistry;
//! use loomgraph::orchestrator::Orchestrator;
//! use loomgraph::resources::{Resources, ReqwestHttpTransport};
//! use std::sync::Arc;
//!
//! # async fn run(llm_client: Arc<dyn loomgraph::resources::LanguageModelClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(EngineConfig::from_env());
//! let resources = Resources {
//!     llm_client,
//!     http_transport: Arc::new(ReqwestHttpTransport::new()),
//!     storage: None,
//!     config: config.clone(),
//! };
//!
//! let mut registry = CodeStepRegistry::new();
//! registry.register("text_analysis.GetTextStats", loomgraph::handlers::registry::builtins::GetTextStats);
//!
//! let orchestrator = Orchestrator::new(resources, registry);
//! let document = WorkflowDocument::load_from_dir(&config.workflows_root.join("greeting"))?;
//! let run = orchestrator.compile(&document)?;
//! let final_state = run.run_to_completion(Default::default()).await;
//! println!("errors: {}", final_state.error_info.len());
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod handlers;
pub mod orchestrator;
pub mod prompts;
pub mod resolver;
pub mod resources;
pub mod state;
pub mod subworkflow;
pub mod telemetry;
