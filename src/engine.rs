//! Execution Engine: schedules nodes of a [`crate::compiler::CompiledGraph`]
//! respecting dependencies, merges partial state updates, and enforces
//! fail-fast semantics.
//!
//! This engine is a demand-driven async recursion from the synthetic `END`
//! node: each node is memoized behind a `tokio::sync::OnceCell` so concurrent
//! dependents share one execution, and independent branches run concurrently
//! because their futures are polled together at every fan-in (`join_all`).
//! Fan-in joins and conditional routers are both "decision nodes" that await
//! their static predecessors, then dynamically decide which single
//! downstream node (if any) actually runs — a data-presence predicate rather
//! than a structural barrier.

use crate::compiler::{CompiledGraph, NodeBehavior, RouteTarget};
use crate::document::END;
use crate::error::RouterError;
use crate::events::{EventSink, FinalState, LifecycleStatus};
use crate::executor::{self, NodeRunContext};
use crate::handlers::registry::CodeStepRegistry;
use crate::resources::Resources;
use crate::state::{DebugRecord, DebugStatus, ErrorRecord, GraphState};
use crate::subworkflow::SubWorkflowCache;
use futures_util::future::{join_all, BoxFuture};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::instrument;

struct Engine {
    graph: Arc<CompiledGraph>,
    resources: Resources,
    registry: CodeStepRegistry,
    cache: SubWorkflowCache,
    events: EventSink,
    state: Mutex<GraphState>,
    cells: HashMap<String, Arc<OnceCell<()>>>,
}

/// Runs `graph` to completion against a fresh [`GraphState`] seeded with
/// `initial_data`, emitting every event onto `events`, and returns the
/// final state. Used both for the top-level run (by
/// [`crate::orchestrator`]) and recursively for embedded sub-workflows (by
/// [`crate::handlers::workflow`]).
#[instrument(skip(graph, resources, registry, cache, initial_data, events), fields(workflow = %graph.workflow_name))]
pub async fn run_compiled_graph(
    graph: Arc<CompiledGraph>,
    resources: Resources,
    registry: CodeStepRegistry,
    cache: SubWorkflowCache,
    initial_data: FxHashMap<String, Value>,
    events: EventSink,
) -> GraphState {
    tracing::debug!(workflow = %graph.workflow_name, "starting graph run");
    let mut state = GraphState::new();
    state.workflow_data = initial_data;

    let cells = graph
        .node_ids()
        .map(|id| (id.to_string(), Arc::new(OnceCell::new())))
        .collect();

    let engine = Arc::new(Engine {
        graph,
        resources,
        registry,
        cache,
        events,
        state: Mutex::new(state),
        cells,
    });

    ensure_ran(engine.clone(), END.to_string()).await;

    let final_state = Arc::try_unwrap(engine)
        .unwrap_or_else(|_| panic!("engine still referenced after run completed"))
        .state
        .into_inner()
        .expect("state mutex not poisoned");

    tracing::debug!(
        failed = final_state.has_failed(),
        nodes_logged = final_state.debug_log.len(),
        "graph run settled"
    );

    final_state
}

fn ensure_ran(engine: Arc<Engine>, id: String) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let cell = engine
            .cells
            .get(&id)
            .cloned()
            .unwrap_or_else(|| panic!("unknown graph node `{id}`"));
        let engine_for_body = engine.clone();
        let id_for_body = id.clone();
        cell.get_or_init(move || run_node_body(engine_for_body, id_for_body))
            .await;
    })
}

async fn run_node_body(engine: Arc<Engine>, id: String) {
    let behavior = engine
        .graph
        .node(&id)
        .unwrap_or_else(|| panic!("unknown graph node `{id}`"))
        .behavior
        .clone();

    match behavior {
        NodeBehavior::Start => {}

        NodeBehavior::End { parents } => {
            join_all(parents.iter().map(|p| ensure_ran(engine.clone(), p.clone()))).await;
            let final_state = {
                let state = engine.state.lock().unwrap();
                FinalState {
                    workflow_data: state.workflow_data.clone(),
                    debug_log: state.debug_log.clone(),
                    execution_log: state.execution_log.clone(),
                    error_info: state.error_info.clone(),
                }
            };
            engine.events.emit_result(final_state);
        }

        NodeBehavior::Join {
            parents,
            required_keys: _,
        } => {
            // Only a synchronization barrier: await every producer
            // concurrently. The required-keys predicate is evaluated by
            // whichever Step/Router declares this join as its `parent` (via
            // `join_predicate_failed`), never here — a join that pulled its
            // own dependent would recurse into itself and deadlock under
            // this pull-backward scheduler.
            join_all(parents.iter().map(|p| ensure_ran(engine.clone(), p.clone()))).await;
        }

        NodeBehavior::Router {
            parent,
            condition_key,
            routes,
        } => {
            if let Some(parent_id) = &parent {
                ensure_ran(engine.clone(), parent_id.clone()).await;
            }

            let blocked = engine.state.lock().unwrap().has_failed()
                || parent
                    .as_deref()
                    .is_some_and(|p| join_predicate_failed(&engine, p));
            if blocked {
                return;
            }

            let value = {
                let state = engine.state.lock().unwrap();
                crate::resolver::resolve_ref(&state.workflow_data, &condition_key)
            };

            let value_str = stringify_condition(&value);
            match routes.get(&value_str) {
                Some(RouteTarget::End) => {}
                Some(RouteTarget::Island(ids)) => {
                    join_all(ids.iter().map(|n| ensure_ran(engine.clone(), n.clone()))).await;
                }
                None => {
                    let err = RouterError::NoMatchingRoute {
                        step: id.clone(),
                        value: value_str,
                    };
                    tracing::error!(router = %id, %err, "router condition matched no route");
                    let mut state = engine.state.lock().unwrap();
                    state.debug_log.push(DebugRecord {
                        step_name: id.clone(),
                        kind: "conditional_router".to_string(),
                        status: DebugStatus::Failed,
                        duration_ms: 0,
                        inputs: Value::Null,
                        outputs: Value::Null,
                        error: Some(err.to_string()),
                        timestamp: chrono::Utc::now(),
                        is_child: false,
                    });
                    state.error_info.push(ErrorRecord {
                        failed_step: id.clone(),
                        message: err.to_string(),
                        traceback: String::new(),
                    });
                }
            }
        }

        NodeBehavior::Step { spec, parent } => {
            if let Some(parent_id) = &parent {
                ensure_ran(engine.clone(), parent_id.clone()).await;
            }

            let skip = engine.state.lock().unwrap().has_failed()
                || parent
                    .as_deref()
                    .is_some_and(|p| join_predicate_failed(&engine, p));
            if skip {
                tracing::warn!(step = %spec.name, "skipping step, run already failed or join predicate unmet");
            } else {
                engine
                    .events
                    .emit_lifecycle(spec.name.clone(), LifecycleStatus::Running);
            }

            let context_view = engine.state.lock().unwrap().workflow_data.clone();
            let run_ctx = NodeRunContext {
                resources: &engine.resources,
                registry: &engine.registry,
                cache: &engine.cache,
                events: &engine.events,
                workflow_name: &engine.graph.workflow_name,
            };
            let partial = executor::run_node(&run_ctx, &spec, context_view, skip).await;

            if !skip {
                for record in &partial.debug_log {
                    engine.events.emit_log(record.clone());
                }
                if let Some(last) = partial.debug_log.iter().rev().find(|r| !r.is_child) {
                    let lifecycle = match last.status {
                        DebugStatus::Completed => LifecycleStatus::Completed,
                        DebugStatus::Failed => LifecycleStatus::Failed,
                        DebugStatus::Running => LifecycleStatus::Running,
                    };
                    engine.events.emit_lifecycle(spec.name.clone(), lifecycle);
                }
            }

            engine.state.lock().unwrap().merge(partial);
        }
    }
}

/// `true` when `parent_id` is a join barrier whose `required_keys` are not
/// all present in `workflow_data` — the pull-model equivalent of the
/// original push model's "do not fire a node whose fan-in predicate
/// failed". Any other node kind (or a join whose keys are all present)
/// returns `false`.
fn join_predicate_failed(engine: &Engine, parent_id: &str) -> bool {
    let Some(node) = engine.graph.node(parent_id) else {
        return false;
    };
    let NodeBehavior::Join { required_keys, .. } = &node.behavior else {
        return false;
    };
    let state = engine.state.lock().unwrap();
    !required_keys
        .iter()
        .all(|k| state.workflow_data.contains_key(k))
}

/// Stringifies a resolved condition value for exact-match lookup against a
/// router's `routing_map`.
fn stringify_condition(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        other => other.to_string(),
    }
}

/// A no-op event sink used where the caller does not care about the stream
/// (e.g. `GraphState`-only test assertions).
#[allow(dead_code)]
pub fn discard_events() -> EventSink {
    let (sink, _stream) = crate::events::channel();
    sink
}
