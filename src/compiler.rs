//! Workflow Compiler: `WorkflowDocument` → validated, runnable [`CompiledGraph`].
//!
//! Follows a `GraphBuilder`/`compile()` split: validate the document, wire
//! every step to its static predecessor(s), synthesize join and router
//! nodes, and hand back an immutable compiled artifact.

use crate::document::{StepParams, StepSpec, WorkflowDocument, END};
use crate::error::ValidationError;
use std::collections::{HashMap, HashSet};
use tracing::instrument;

pub const START: &str = "START";

/// A single vertex of the compiled graph.
#[derive(Clone, Debug)]
pub struct GraphNode {
    pub id: String,
    pub behavior: NodeBehavior,
}

#[derive(Clone, Debug)]
pub enum NodeBehavior {
    Start,
    End {
        /// The terminal step ids that must all complete before `on_graph_end`.
        parents: Vec<String>,
    },
    Step {
        spec: StepSpec,
        /// The single static predecessor this step waits on, or `None` if it
        /// is reachable only via a router's dynamic dispatch.
        parent: Option<String>,
    },
    /// A fan-in barrier: awaits every producer concurrently, then exposes
    /// whether `required_keys` all ended up present. It never invokes its
    /// dependent itself — the engine schedules by recursing backward from
    /// `END`, so a join that pulled its own target would create a
    /// `target -> join -> target` cycle (the target's `Step`/`Router` arm is
    /// what awaits this join, as its declared `parent`, and consults the
    /// predicate before running).
    Join {
        /// The producer steps this join waits on concurrently.
        parents: Vec<String>,
        required_keys: Vec<String>,
    },
    Router {
        parent: Option<String>,
        condition_key: String,
        /// condition value -> what running this branch means.
        routes: HashMap<String, RouteTarget>,
    },
}

/// What a router's resolved condition value pulls at runtime.
#[derive(Clone, Debug)]
pub enum RouteTarget {
    /// The sentinel `END` value: this branch does nothing.
    End,
    /// The node ids the router must `ensure_ran` to run this branch's chosen
    /// step and everything chained after it (see [`island_terminals`]).
    Island(Vec<String>),
}

/// The immutable, runnable artifact a [`crate::subworkflow::SubWorkflowCache`]
/// keys on workflow name and an [`crate::engine`] run executes.
#[derive(Clone, Debug)]
pub struct CompiledGraph {
    pub workflow_name: String,
    nodes: HashMap<String, GraphNode>,
}

impl CompiledGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }
}

/// Validates `document` and lowers it into a runnable graph.
#[instrument(skip(document), fields(workflow = %document.name, steps = document.steps.len()), err)]
pub fn compile(document: &WorkflowDocument) -> Result<CompiledGraph, ValidationError> {
    validate_unique_names(document)?;

    let output_to_producer = build_output_to_producer(document)?;
    validate_dependencies(document, &output_to_producer)?;
    detect_cycles(document, &output_to_producer)?;

    let router_targets = collect_router_targets(document)?;
    let forward_edges = build_forward_edges(document, &output_to_producer);
    let gated = compute_gated_set(&router_targets, &forward_edges);

    let mut nodes: HashMap<String, GraphNode> = HashMap::new();
    nodes.insert(
        START.to_string(),
        GraphNode {
            id: START.to_string(),
            behavior: NodeBehavior::Start,
        },
    );

    for step in &document.steps {
        let parent_set = parent_set_for(step, &output_to_producer);

        let parent = match parent_set.len() {
            0 => {
                if gated.contains(&step.name) {
                    None
                } else {
                    Some(START.to_string())
                }
            }
            1 => Some(parent_set[0].clone()),
            _ => {
                let join_id = format!("join_for_{}", step.name);
                nodes.entry(join_id.clone()).or_insert_with(|| GraphNode {
                    id: join_id.clone(),
                    behavior: NodeBehavior::Join {
                        parents: parent_set.clone(),
                        required_keys: step.dependencies.clone(),
                    },
                });
                Some(join_id)
            }
        };

        if step.params.is_router() {
            let StepParams::ConditionalRouter {
                condition_key,
                routing_map,
            } = &step.params
            else {
                unreachable!()
            };
            let routes = routing_map
                .iter()
                .map(|(value, target)| {
                    let route = if target == END {
                        RouteTarget::End
                    } else {
                        RouteTarget::Island(island_terminals(target, &forward_edges))
                    };
                    (value.clone(), route)
                })
                .collect();
            nodes.insert(
                step.name.clone(),
                GraphNode {
                    id: step.name.clone(),
                    behavior: NodeBehavior::Router {
                        parent,
                        condition_key: condition_key.clone(),
                        routes,
                    },
                },
            );
        } else {
            nodes.insert(
                step.name.clone(),
                GraphNode {
                    id: step.name.clone(),
                    behavior: NodeBehavior::Step {
                        spec: step.clone(),
                        parent,
                    },
                },
            );
        }
    }

    // A step reachable only through a router's dynamic dispatch — directly
    // or transitively, via a chain of declared `dependencies` — must not be
    // pulled by END: this engine schedules by recursing backward from END,
    // so an END->step edge would run the step (and everything it depends
    // on) unconditionally and defeat the router entirely. The router itself
    // stays a terminal parent of END (unless it is in turn only reachable
    // via another router): its own execution is what conditionally pulls
    // the chosen branch's island (see `engine::run_node_body`'s
    // `NodeBehavior::Router` arm).
    let terminal_ids: Vec<String> = document
        .steps
        .iter()
        .filter(|s| !forward_edges.contains_key(&s.name) && !gated.contains(&s.name))
        .map(|s| s.name.clone())
        .collect();

    nodes.insert(
        END.to_string(),
        GraphNode {
            id: END.to_string(),
            behavior: NodeBehavior::End {
                parents: terminal_ids,
            },
        },
    );

    tracing::debug!(
        workflow = %document.name,
        nodes = nodes.len(),
        "compiled workflow document into runnable graph"
    );

    Ok(CompiledGraph {
        workflow_name: document.name.clone(),
        nodes,
    })
}

fn validate_unique_names(document: &WorkflowDocument) -> Result<(), ValidationError> {
    if document.steps.is_empty() {
        // An empty document is a valid boundary case (§8 property 9): it
        // compiles to a trivial START -> END graph.
        return Ok(());
    }
    let mut seen = HashSet::new();
    for step in &document.steps {
        if !seen.insert(step.name.as_str()) {
            return Err(ValidationError::DuplicateStep(step.name.clone()));
        }
    }
    Ok(())
}

fn build_output_to_producer(
    document: &WorkflowDocument,
) -> Result<HashMap<String, String>, ValidationError> {
    let mut map = HashMap::new();
    for step in &document.steps {
        if let Some(key) = step.params.output_key() {
            if map.insert(key.to_string(), step.name.clone()).is_some() {
                return Err(ValidationError::DuplicateStep(key.to_string()));
            }
        }
        if let StepParams::Workflow { output_mapping, .. } = &step.params {
            for parent_key in output_mapping.values() {
                map.insert(parent_key.clone(), step.name.clone());
            }
        }
    }
    Ok(map)
}

fn validate_dependencies(
    document: &WorkflowDocument,
    output_to_producer: &HashMap<String, String>,
) -> Result<(), ValidationError> {
    for step in &document.steps {
        for dep in &step.dependencies {
            let Some(producer) = output_to_producer.get(dep) else {
                return Err(ValidationError::UnknownDependency(
                    step.name.clone(),
                    dep.clone(),
                ));
            };
            if producer == &step.name {
                return Err(ValidationError::Cycle(step.name.clone()));
            }
        }
        if let StepParams::ConditionalRouter { routing_map, .. } = &step.params {
            for target in routing_map.values() {
                if target != END && !document.steps.iter().any(|s| &s.name == target) {
                    return Err(ValidationError::UnknownRouteTarget(
                        step.name.clone(),
                        target.clone(),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Detects cycles in the combined graph of non-router dependency edges
/// (`producer -> dependent`) and router routing edges (`router -> target`,
/// excluding `END`). Invariant 2 requires the non-router graph be acyclic;
/// open question (c) requires router-introduced back-references be rejected
/// too, so both edge kinds are checked together with one DFS.
fn detect_cycles(
    document: &WorkflowDocument,
    output_to_producer: &HashMap<String, String>,
) -> Result<(), ValidationError> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in &document.steps {
        adjacency.entry(step.name.as_str()).or_default();
        for dep in &step.dependencies {
            if let Some(producer) = output_to_producer.get(dep) {
                adjacency
                    .entry(producer.as_str())
                    .or_default()
                    .push(step.name.as_str());
            }
        }
        if let StepParams::ConditionalRouter { routing_map, .. } = &step.params {
            for target in routing_map.values() {
                if target != END {
                    adjacency
                        .entry(step.name.as_str())
                        .or_default()
                        .push(target.as_str());
                }
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Option<String> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => return Some(node.to_string()),
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        if let Some(children) = adjacency.get(node) {
            for child in children {
                if let Some(cycle_at) = visit(child, adjacency, marks) {
                    return Some(cycle_at);
                }
            }
        }
        marks.insert(node, Mark::Done);
        None
    }

    for step in &document.steps {
        if let Some(cycle_at) = visit(step.name.as_str(), &adjacency, &mut marks) {
            return Err(ValidationError::Cycle(cycle_at));
        }
    }
    Ok(())
}

fn collect_router_targets(document: &WorkflowDocument) -> Result<HashSet<String>, ValidationError> {
    let mut targets = HashSet::new();
    for step in &document.steps {
        if let StepParams::ConditionalRouter { routing_map, .. } = &step.params {
            for target in routing_map.values() {
                if target != END {
                    targets.insert(target.clone());
                }
            }
        }
    }
    Ok(targets)
}

/// Builds the producer -> dependents adjacency implied by declared
/// `dependencies` (router dispatch edges are not part of this graph — a
/// router's chosen branch is pulled explicitly via [`island_terminals`], not
/// declared as a `dependencies` entry). Only producers with at least one
/// dependent get an entry, so `forward_edges.contains_key(name)` doubles as
/// "some step depends on `name`'s output".
fn build_forward_edges(
    document: &WorkflowDocument,
    output_to_producer: &HashMap<String, String>,
) -> HashMap<String, Vec<String>> {
    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    for step in &document.steps {
        for dep in &step.dependencies {
            if let Some(producer) = output_to_producer.get(dep) {
                let entry = edges.entry(producer.clone()).or_default();
                if !entry.contains(&step.name) {
                    entry.push(step.name.clone());
                }
            }
        }
    }
    edges
}

/// The full set of steps reachable only through a router's dynamic dispatch:
/// every direct routing target, plus every step that (transitively, through
/// declared `dependencies`) depends on one. None of these may be wired from
/// `START` or pulled directly by `END`.
fn compute_gated_set(
    router_targets: &HashSet<String>,
    forward_edges: &HashMap<String, Vec<String>>,
) -> HashSet<String> {
    let mut gated: HashSet<String> = HashSet::new();
    let mut queue: Vec<String> = router_targets.iter().cloned().collect();
    while let Some(node) = queue.pop() {
        if !gated.insert(node.clone()) {
            continue;
        }
        if let Some(dependents) = forward_edges.get(&node) {
            for d in dependents {
                if !gated.contains(d) {
                    queue.push(d.clone());
                }
            }
        }
    }
    gated
}

/// Walks forward from `target` over `forward_edges`, collecting the "sink"
/// ids (those with no further dependents) of its reachable closure. A
/// router dispatches a branch by pulling just these sinks: the existing
/// backward-pull recursion (`ensure_ran` awaiting a node's declared
/// `parent`) transitively awaits everything upstream of a sink within the
/// branch, so the router never needs to enumerate the whole island itself.
/// `target` being a sink of its own branch (e.g. a router-to-router edge,
/// since routers never have an `output_key` and so never appear as a
/// `forward_edges` key) is handled the same way — it's its own one-node
/// island.
fn island_terminals(target: &str, forward_edges: &HashMap<String, Vec<String>>) -> Vec<String> {
    let mut sinks = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue = vec![target.to_string()];
    while let Some(node) = queue.pop() {
        if !seen.insert(node.clone()) {
            continue;
        }
        match forward_edges.get(&node) {
            Some(dependents) => queue.extend(dependents.iter().cloned()),
            None => sinks.push(node),
        }
    }
    sinks
}

fn parent_set_for(step: &StepSpec, output_to_producer: &HashMap<String, String>) -> Vec<String> {
    let mut producers: Vec<String> = Vec::new();
    for dep in &step.dependencies {
        if let Some(producer) = output_to_producer.get(dep) {
            if !producers.contains(producer) {
                producers.push(producer.clone());
            }
        }
    }
    producers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{InputKind, InputSpec};
    use std::collections::HashMap as Map;

    fn code_step(name: &str, output_key: &str, deps: &[&str]) -> StepSpec {
        StepSpec {
            name: name.to_string(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            params: StepParams::Code {
                output_key: output_key.to_string(),
                function_name: "noop".to_string(),
                input_mapping: Map::new(),
                map_input: None,
            },
        }
    }

    fn doc(steps: Vec<StepSpec>) -> WorkflowDocument {
        WorkflowDocument {
            name: "test".to_string(),
            description: String::new(),
            inputs: vec![InputSpec {
                name: "text".to_string(),
                kind: InputKind::Text,
                label: None,
                default: None,
            }],
            steps,
            outputs: vec![],
        }
    }

    #[test]
    fn empty_document_compiles_to_trivial_graph() {
        let graph = compile(&doc(vec![])).unwrap();
        let end = graph.node(END).unwrap();
        assert!(matches!(&end.behavior, NodeBehavior::End { parents } if parents.is_empty()));
    }

    #[test]
    fn linear_chain_wires_start_and_end() {
        let graph = compile(&doc(vec![
            code_step("stats", "stats", &[]),
            code_step("classify", "classify", &["stats"]),
        ]))
        .unwrap();

        let stats = graph.node("stats").unwrap();
        assert!(matches!(&stats.behavior, NodeBehavior::Step { parent: Some(p), .. } if p == START));

        let classify = graph.node("classify").unwrap();
        assert!(
            matches!(&classify.behavior, NodeBehavior::Step { parent: Some(p), .. } if p == "stats")
        );

        let end = graph.node(END).unwrap();
        assert!(matches!(&end.behavior, NodeBehavior::End { parents } if parents == &vec!["classify".to_string()]));
    }

    #[test]
    fn fan_in_synthesizes_one_join_node() {
        let graph = compile(&doc(vec![
            code_step("a", "a", &[]),
            code_step("b", "b", &[]),
            code_step("c", "c", &["a", "b"]),
        ]))
        .unwrap();

        let join = graph.node("join_for_c").unwrap();
        assert!(matches!(&join.behavior, NodeBehavior::Join { parents, .. } if parents.len() == 2));

        let c = graph.node("c").unwrap();
        assert!(
            matches!(&c.behavior, NodeBehavior::Step { parent: Some(p), .. } if p == "join_for_c")
        );
    }

    #[test]
    fn router_target_is_not_wired_from_start() {
        let mut router_map = Map::new();
        router_map.insert("support".to_string(), "path_s".to_string());
        router_map.insert("END".to_string(), END.to_string());

        let router = StepSpec {
            name: "router".to_string(),
            dependencies: vec!["classify".to_string()],
            params: StepParams::ConditionalRouter {
                condition_key: "classify.label".to_string(),
                routing_map: router_map,
            },
        };

        let graph = compile(&doc(vec![
            code_step("classify", "classify", &[]),
            router,
            code_step("path_s", "path_s", &[]),
        ]))
        .unwrap();

        let path_s = graph.node("path_s").unwrap();
        assert!(matches!(&path_s.behavior, NodeBehavior::Step { parent: None, .. }));

        // `path_s` must not be an END parent either: END pulls the router,
        // and the router conditionally pulls `path_s` itself. If END also
        // pulled `path_s` directly it would run unconditionally regardless
        // of the router's choice.
        let end = graph.node(END).unwrap();
        let NodeBehavior::End { parents } = &end.behavior else {
            panic!("END node must be NodeBehavior::End");
        };
        assert!(parents.contains(&"router".to_string()));
        assert!(!parents.contains(&"path_s".to_string()));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = compile(&doc(vec![code_step("a", "a", &["missing"])])).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownDependency(_, _)));
    }

    #[test]
    fn self_referential_dependency_is_a_cycle() {
        let err = compile(&doc(vec![code_step("a", "a", &["a"])])).unwrap_err();
        assert!(matches!(err, ValidationError::Cycle(_)));
    }

    #[test]
    fn router_back_reference_is_rejected_as_a_cycle() {
        let mut router_map = Map::new();
        router_map.insert("loop".to_string(), "a".to_string());
        router_map.insert("END".to_string(), END.to_string());

        let router = StepSpec {
            name: "router".to_string(),
            dependencies: vec!["a".to_string()],
            params: StepParams::ConditionalRouter {
                condition_key: "a.choice".to_string(),
                routing_map: router_map,
            },
        };

        // `a` depends on nothing, `router` depends on `a`'s output, but
        // `router` can route back to `a` — a cycle through a router edge.
        let err = compile(&doc(vec![code_step("a", "a", &[]), router])).unwrap_err();
        assert!(matches!(err, ValidationError::Cycle(_)));
    }

    #[test]
    fn non_cyclic_router_back_reference_to_sibling_is_accepted() {
        // A router may legitimately target a step that isn't its own
        // ancestor; this must not be mistaken for a cycle.
        let mut router_map = Map::new();
        router_map.insert("go".to_string(), "b".to_string());
        router_map.insert("END".to_string(), END.to_string());

        let router = StepSpec {
            name: "router".to_string(),
            dependencies: vec!["a".to_string()],
            params: StepParams::ConditionalRouter {
                condition_key: "a.choice".to_string(),
                routing_map: router_map,
            },
        };

        let graph = compile(&doc(vec![
            code_step("a", "a", &[]),
            router,
            code_step("b", "b", &[]),
        ]))
        .unwrap();
        assert!(graph.node("b").is_some());
    }

    #[test]
    fn transitive_dependent_of_router_target_is_not_wired_from_start_or_end() {
        let mut router_map = Map::new();
        router_map.insert("support".to_string(), "a".to_string());
        router_map.insert("END".to_string(), END.to_string());

        let router = StepSpec {
            name: "router".to_string(),
            dependencies: vec!["classify".to_string()],
            params: StepParams::ConditionalRouter {
                condition_key: "classify.label".to_string(),
                routing_map: router_map,
            },
        };

        // router -> a (routing target), b depends on a's output. Neither `a`
        // nor `b` may be wired from START or pulled directly by END: doing
        // so would run them regardless of which branch the router chose.
        let graph = compile(&doc(vec![
            code_step("classify", "classify", &[]),
            router,
            code_step("a", "a", &[]),
            code_step("b", "b", &["a"]),
        ]))
        .unwrap();

        let a = graph.node("a").unwrap();
        assert!(matches!(&a.behavior, NodeBehavior::Step { parent: None, .. }));
        let b = graph.node("b").unwrap();
        assert!(matches!(&b.behavior, NodeBehavior::Step { parent: Some(p), .. } if p == "a"));

        let end = graph.node(END).unwrap();
        let NodeBehavior::End { parents } = &end.behavior else {
            panic!("END node must be NodeBehavior::End");
        };
        assert!(parents.contains(&"router".to_string()));
        assert!(!parents.contains(&"a".to_string()));
        assert!(!parents.contains(&"b".to_string()));

        let router_node = graph.node("router").unwrap();
        let NodeBehavior::Router { routes, .. } = &router_node.behavior else {
            panic!("router node must be NodeBehavior::Router");
        };
        match routes.get("support").unwrap() {
            RouteTarget::Island(ids) => assert_eq!(ids, &vec!["b".to_string()]),
            RouteTarget::End => panic!("expected an island route"),
        }
    }

    #[test]
    fn fan_in_join_no_longer_carries_a_target() {
        let graph = compile(&doc(vec![
            code_step("a", "a", &[]),
            code_step("b", "b", &[]),
            code_step("c", "c", &["a", "b"]),
        ]))
        .unwrap();

        let join = graph.node("join_for_c").unwrap();
        assert!(matches!(
            &join.behavior,
            NodeBehavior::Join { parents, required_keys } if parents.len() == 2 && required_keys == &vec!["a".to_string(), "b".to_string()]
        ));
    }
}
