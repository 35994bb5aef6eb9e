//! Node Executor Wrapper: the uniform timing/error/map-over-list/debug-record
//! machinery around any of the four step-kind handlers.
//!
//! Handles the fail-fast gate, timing, map-over-list fan-out, and
//! debug-record construction; the handlers in [`crate::handlers`] know
//! nothing about timing, mapping, or logging.

use crate::document::{StepParams, StepSpec};
use crate::error::HandlerError;
use crate::events::EventSink;
use crate::handlers::registry::CodeStepRegistry;
use crate::handlers::HandlerOutcome;
use crate::resources::Resources;
use crate::state::{sanitize, DebugRecord, DebugStatus, ErrorRecord, NodePartial};
use crate::subworkflow::SubWorkflowCache;
use chrono::Utc;
use futures_util::future::join_all;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::time::Instant;
use tracing::instrument;

/// Everything a node execution needs beyond the step's own parameters.
pub struct NodeRunContext<'a> {
    pub resources: &'a Resources,
    pub registry: &'a CodeStepRegistry,
    pub cache: &'a SubWorkflowCache,
    pub events: &'a EventSink,
    pub workflow_name: &'a str,
}

/// Runs one step node to completion, returning the [`NodePartial`] to merge
/// into the shared [`crate::state::GraphState`].
///
/// `failed_already` is the fail-fast gate (§4.D step 1): when a prior node
/// has already written to `error_info`, this step is skipped entirely and an
/// empty update is returned — the gate, not a structural barrier, is what
/// makes fail-fast automatic.
#[instrument(skip(ctx, spec, context_view), fields(step = %spec.name, kind = spec.params.kind_name()))]
pub async fn run_node(
    ctx: &NodeRunContext<'_>,
    spec: &StepSpec,
    context_view: FxHashMap<String, Value>,
    failed_already: bool,
) -> NodePartial {
    if failed_already {
        return NodePartial::default();
    }

    let started_at = Instant::now();
    let timestamp = Utc::now();

    match spec.params.map_input() {
        None => run_single(ctx, spec, &context_view, started_at, timestamp).await,
        Some(map_path) => run_mapped(ctx, spec, &context_view, map_path, started_at, timestamp).await,
    }
}

async fn run_single(
    ctx: &NodeRunContext<'_>,
    spec: &StepSpec,
    context_view: &FxHashMap<String, Value>,
    started_at: Instant,
    timestamp: chrono::DateTime<Utc>,
) -> NodePartial {
    match invoke_handler(ctx, spec, context_view, None).await {
        Ok(outcome) => completed_partial(spec, outcome, started_at, timestamp),
        Err(err) => failed_partial(spec, &err, Value::Null, started_at, timestamp),
    }
}

async fn run_mapped(
    ctx: &NodeRunContext<'_>,
    spec: &StepSpec,
    context_view: &FxHashMap<String, Value>,
    map_path: &str,
    started_at: Instant,
    timestamp: chrono::DateTime<Utc>,
) -> NodePartial {
    let list_value = crate::resolver::resolve_ref(context_view, map_path);
    let Value::Array(items) = list_value else {
        let err = HandlerError::Custom(format!(
            "map_input `{map_path}` did not resolve to a list"
        ));
        return failed_partial(spec, &err, Value::Null, started_at, timestamp);
    };

    tracing::debug!(step = %spec.name, iterations = items.len(), "fanning out mapped step");

    if items.is_empty() {
        let mut partial = NodePartial::default();
        if let Some(output_key) = spec.params.output_key() {
            partial
                .workflow_data
                .insert(output_key.to_string(), Value::Array(Vec::new()));
        }
        partial.debug_log.push(DebugRecord {
            step_name: spec.name.clone(),
            kind: spec.params.kind_name().to_string(),
            status: DebugStatus::Completed,
            duration_ms: elapsed_ms(started_at),
            inputs: Value::Null,
            outputs: sanitize(&Value::Array(Vec::new())),
            error: None,
            timestamp,
            is_child: false,
        });
        return partial;
    }

    // Bounded fan-out: `max_concurrent_map_iterations` caps how many
    // iterations run concurrently, so a large list doesn't flood the
    // transport layers, while still launching and awaiting the group per §5.
    let semaphore = tokio::sync::Semaphore::new(
        ctx.resources
            .config
            .max_concurrent_map_iterations
            .max(1),
    );

    let futures = items.iter().enumerate().map(|(index, element)| {
        let mut iteration_context = context_view.clone();
        iteration_context.insert("item".to_string(), element.clone());
        iteration_context.insert("map_index".to_string(), Value::from(index));
        let semaphore = &semaphore;
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            let outcome = invoke_handler(ctx, spec, &iteration_context, Some(index)).await;
            (index, outcome)
        }
    });

    let results = join_all(futures).await;

    // Open question (a), resolved in DESIGN.md: a failing iteration aborts
    // the whole mapped step rather than aggregating a null placeholder.
    if let Some((_, Err(err))) = results.iter().find(|(_, r)| r.is_err()) {
        return failed_partial(spec, err, Value::Null, started_at, timestamp);
    }

    let mut partial = NodePartial::default();
    let mut outputs = Vec::with_capacity(results.len());
    for (index, outcome) in results {
        let outcome = outcome.expect("checked above");
        partial.debug_log.push(DebugRecord {
            step_name: spec.name.clone(),
            kind: spec.params.kind_name().to_string(),
            status: DebugStatus::Completed,
            duration_ms: elapsed_ms(started_at),
            inputs: sanitize(&outcome.resolved_inputs),
            outputs: sanitize(&outcome.output),
            error: None,
            timestamp,
            is_child: true,
        });
        let _ = index;
        outputs.push(outcome.output);
        partial.debug_log.extend(outcome.extra_records);
    }

    if let Some(output_key) = spec.params.output_key() {
        partial
            .workflow_data
            .insert(output_key.to_string(), Value::Array(outputs.clone()));
    }

    partial.debug_log.push(DebugRecord {
        step_name: spec.name.clone(),
        kind: spec.params.kind_name().to_string(),
        status: DebugStatus::Completed,
        duration_ms: elapsed_ms(started_at),
        inputs: Value::Null,
        outputs: sanitize(&Value::Array(outputs)),
        error: None,
        timestamp,
        is_child: false,
    });

    partial
}

async fn invoke_handler(
    ctx: &NodeRunContext<'_>,
    spec: &StepSpec,
    context: &FxHashMap<String, Value>,
    map_index: Option<usize>,
) -> Result<HandlerOutcome, HandlerError> {
    match &spec.params {
        StepParams::Llm {
            prompt_template,
            input_mapping,
            ..
        } => {
            crate::handlers::llm::run(
                ctx.resources,
                ctx.workflow_name,
                &spec.name,
                prompt_template,
                input_mapping,
                context,
            )
            .await
        }
        StepParams::Code {
            function_name,
            input_mapping,
            ..
        } => {
            crate::handlers::code::run(ctx.resources, ctx.registry, function_name, input_mapping, context)
                .await
        }
        StepParams::Api {
            method,
            endpoint,
            headers,
            body,
            input_mapping,
            ..
        } => {
            crate::handlers::api::run(
                ctx.resources,
                method,
                endpoint,
                headers,
                body,
                input_mapping,
                context,
            )
            .await
        }
        StepParams::Workflow {
            workflow_name,
            input_mapping,
            output_mapping,
            ..
        } => {
            crate::handlers::workflow::run(
                ctx.resources,
                ctx.registry,
                ctx.cache,
                &spec.name,
                workflow_name,
                input_mapping,
                output_mapping,
                context,
                ctx.events,
                map_index,
            )
            .await
        }
        StepParams::ConditionalRouter { .. } => {
            unreachable!("routers are dispatched by the engine, not the executor wrapper")
        }
    }
}

fn completed_partial(
    spec: &StepSpec,
    outcome: HandlerOutcome,
    started_at: Instant,
    timestamp: chrono::DateTime<Utc>,
) -> NodePartial {
    let mut partial = NodePartial::default();
    if let Some(output_key) = spec.params.output_key() {
        partial
            .workflow_data
            .insert(output_key.to_string(), outcome.output.clone());
    }
    partial.debug_log.extend(outcome.extra_records);
    partial.debug_log.push(DebugRecord {
        step_name: spec.name.clone(),
        kind: spec.params.kind_name().to_string(),
        status: DebugStatus::Completed,
        duration_ms: elapsed_ms(started_at),
        inputs: sanitize(&outcome.resolved_inputs),
        outputs: sanitize(&outcome.output),
        error: None,
        timestamp,
        is_child: false,
    });
    partial
}

fn failed_partial(
    spec: &StepSpec,
    err: &HandlerError,
    inputs: Value,
    started_at: Instant,
    timestamp: chrono::DateTime<Utc>,
) -> NodePartial {
    let message = err.to_string();
    tracing::error!(step = %spec.name, error = %message, "step handler failed");
    let mut partial = NodePartial::default();
    partial.debug_log.push(DebugRecord {
        step_name: spec.name.clone(),
        kind: spec.params.kind_name().to_string(),
        status: DebugStatus::Failed,
        duration_ms: elapsed_ms(started_at),
        inputs: sanitize(&inputs),
        outputs: Value::Null,
        error: Some(message.clone()),
        timestamp,
        is_child: false,
    });
    partial.error_info.push(ErrorRecord {
        failed_step: spec.name.clone(),
        message,
        traceback: format!("{err:?}"),
    });
    partial
}

fn elapsed_ms(started_at: Instant) -> u64 {
    started_at.elapsed().as_millis() as u64
}
