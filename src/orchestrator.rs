//! Orchestrator Facade: wires the compiler, execution engine, resources, and
//! event stream together for one run. The only entry point most callers
//! need.

use crate::compiler::{self, CompiledGraph};
use crate::document::WorkflowDocument;
use crate::error::ValidationError;
use crate::events::EventStream;
use crate::handlers::registry::CodeStepRegistry;
use crate::resources::Resources;
use crate::state::GraphState;
use crate::subworkflow::SubWorkflowCache;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

/// Owns the long-lived collaborators a sequence of runs shares: the
/// sub-workflow cache (process-wide, no eviction) and the custom-code
/// registry populated by the embedding application at startup.
pub struct Orchestrator {
    resources: Resources,
    registry: CodeStepRegistry,
    cache: SubWorkflowCache,
}

impl Orchestrator {
    pub fn new(resources: Resources, registry: CodeStepRegistry) -> Self {
        let cache = SubWorkflowCache::new(resources.config.workflows_root.clone());
        Self {
            resources,
            registry,
            cache,
        }
    }

    /// Compiles `document` and returns a handle whose [`Run::start`] drives
    /// execution, yielding an [`EventStream`] the caller can observe while
    /// the run proceeds concurrently in the background.
    pub fn compile(&self, document: &WorkflowDocument) -> Result<CompiledRun<'_>, ValidationError> {
        let graph = Arc::new(compiler::compile(document)?);
        Ok(CompiledRun {
            orchestrator: self,
            graph,
        })
    }
}

pub struct CompiledRun<'a> {
    orchestrator: &'a Orchestrator,
    graph: Arc<CompiledGraph>,
}

impl CompiledRun<'_> {
    /// Starts the run against `initial_data` (the document's resolved
    /// `inputs`). Execution proceeds on a background Tokio task; the
    /// returned [`RunHandle`] carries an [`EventStream`] that yields
    /// `lifecycle_update`/`log`/`sub_workflow_event` events as they occur
    /// and exactly one final `result` event.
    ///
    /// Dropping the handle before the run settles cancels the background
    /// task per §5's cancellation contract: an abandoned event stream must
    /// not leave the top-level run polling forward unobserved. A `workflow`
    /// step's embedded sub-run is its own independently spawned task (see
    /// [`crate::handlers::workflow`]); aborting the parent does not reach
    /// into it, but it harmlessly finds its event sink's receiver dropped
    /// (a no-op per [`crate::events::EventSink::emit`]) and its result
    /// discarded once it finishes, rather than disrupting the cancelled run.
    pub fn start(&self, initial_data: FxHashMap<String, Value>) -> RunHandle {
        let (sink, stream) = crate::events::channel();
        let graph = self.graph.clone();
        let resources = self.orchestrator.resources.clone();
        let registry = self.orchestrator.registry.clone();
        let cache = self.orchestrator.cache.clone();

        let task = tokio::spawn(async move {
            crate::engine::run_compiled_graph(graph, resources, registry, cache, initial_data, sink)
                .await
        });

        RunHandle { stream, task }
    }

    /// Runs to completion and returns the final state directly, without
    /// streaming — convenient for tests and headless batch callers.
    pub async fn run_to_completion(&self, initial_data: FxHashMap<String, Value>) -> GraphState {
        let (sink, _stream) = crate::events::channel();
        crate::engine::run_compiled_graph(
            self.graph.clone(),
            self.orchestrator.resources.clone(),
            self.orchestrator.registry.clone(),
            self.orchestrator.cache.clone(),
            initial_data,
            sink,
        )
        .await
    }
}

/// The caller-facing half of a streamed run: an [`EventStream`] plus the
/// background task producing it. Dropping this handle aborts the task,
/// cancelling outstanding handler work rather than letting it run unobserved.
pub struct RunHandle {
    stream: EventStream,
    task: tokio::task::JoinHandle<GraphState>,
}

impl RunHandle {
    /// Receives the next event, or `None` once the run has settled and every
    /// buffered event has been drained.
    pub async fn recv(&self) -> Option<crate::events::Event> {
        self.stream.recv().await
    }

    /// Explicitly cancels the run: aborts the background task and drains any
    /// events already buffered so observers can see what happened before
    /// cancellation.
    pub fn cancel(self) -> Vec<crate::events::Event> {
        self.task.abort();
        self.stream.drain()
    }

    /// Awaits the background task directly, bypassing the event stream —
    /// equivalent to `run_to_completion` for a handle already in flight.
    pub async fn join(self) -> GraphState {
        self.task
            .await
            .unwrap_or_else(|_| panic!("run task panicked or was cancelled"))
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
