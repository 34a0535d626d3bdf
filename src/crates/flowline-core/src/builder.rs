//! Graph builder: descriptor set → validated [`PipelineDefinition`].
//!
//! The builder is a two-pass compiler over the descriptor set. Pass one
//! collects every step name into an index and assigns deterministic ids;
//! pass two resolves declared successor names against that index, classifies
//! each node's runtime kind from its output shape, and synthesizes broadcast
//! nodes wherever a step declared more than one distinct successor.
//!
//! # Determinism
//!
//! The resulting definition is a function of the descriptor *set*:
//! descriptors are sorted by name before ids are assigned, broadcast nodes
//! are appended in source-id order, successor lists are deduplicated and
//! id-sorted, and ingestion sources are ordered by (priority, name). Feeding
//! the same descriptors in any order produces byte-identical definitions and
//! diagnostics.
//!
//! # Leniency
//!
//! A successor name that resolves to no known step is silently dropped: no
//! edge, no diagnostic. The same leniency applies to ingestion sources whose
//! produced type matches no entry node: they stay inert. Only the
//! more-than-one-match case is surfaced, by the validator.
//!
//! # Example
//!
//! ```rust
//! use flowline_core::builder::build;
//! use flowline_core::descriptor::{StepDescriptor, ValueShape};
//! use flowline_core::graph::NodeKind;
//!
//! let steps = vec![
//!     StepDescriptor::new("split", ValueShape::plain("String"),
//!         Some(ValueShape::collection("String")))
//!         .entry()
//!         .with_successor("count"),
//!     StepDescriptor::new("count", ValueShape::plain("String"),
//!         Some(ValueShape::plain("usize")))
//!         .exit(),
//! ];
//!
//! let outcome = build(&steps, &[]);
//! assert!(outcome.diagnostics.is_empty());
//! let split = outcome.definition.node_by_name("split").unwrap();
//! assert_eq!(split.kind, NodeKind::TransformMany);
//! ```

use std::collections::BTreeMap;

use crate::descriptor::{IngestDescriptor, StepDescriptor, ValueShape};
use crate::graph::{IngestBinding, IngestSource, NodeId, NodeKind, PipelineDefinition, StepNode};
use crate::validator::validate;

/// Result of one build: the definition plus the diagnostics the validator
/// raised over it. Diagnostics are collected, never returned as an error.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// The immutable execution graph.
    pub definition: PipelineDefinition,
    /// Structural diagnostics, ordered by (code, subject).
    pub diagnostics: Vec<crate::diagnostics::Diagnostic>,
}

/// Compiles a descriptor set into a validated pipeline definition.
pub fn build(steps: &[StepDescriptor], sources: &[IngestDescriptor]) -> BuildOutcome {
    // Pass one: name index in sorted order. Keyed by name, so a duplicate
    // descriptor replaces an earlier one instead of producing two nodes.
    let mut by_name: BTreeMap<&str, &StepDescriptor> = BTreeMap::new();
    for step in steps {
        by_name.insert(step.name.as_str(), step);
    }

    let index: BTreeMap<&str, NodeId> = by_name
        .keys()
        .enumerate()
        .map(|(id, name)| (*name, id))
        .collect();

    // Pass two: resolve successors and materialize user nodes in id order.
    let mut nodes: Vec<StepNode> = Vec::with_capacity(by_name.len());
    for (id, (_, step)) in by_name.iter().enumerate() {
        let mut successors: Vec<NodeId> = step
            .successors
            .iter()
            .filter_map(|name| index.get(name.as_str()).copied())
            .collect();
        successors.sort_unstable();
        successors.dedup();

        nodes.push(StepNode {
            id,
            name: step.name.clone(),
            input: step.input.clone(),
            output: step.output.clone(),
            kind: classify(step.output.as_ref()),
            is_entry: step.is_entry,
            is_exit: step.is_exit,
            max_parallelism: step.effective_parallelism(),
            max_queue_depth: step.effective_queue_depth(),
            successors,
        });
    }

    // Fan-out synthesis: any node with more than one distinct successor gets
    // a broadcast child appended after all user nodes, in source-id order.
    let user_count = nodes.len();
    for source_id in 0..user_count {
        if nodes[source_id].successors.len() <= 1 {
            continue;
        }
        let broadcast_id = nodes.len();
        let targets = std::mem::replace(&mut nodes[source_id].successors, vec![broadcast_id]);
        let item_shape = nodes[source_id]
            .output
            .as_ref()
            .map(|shape| ValueShape::plain(shape.type_name.clone()))
            .unwrap_or_else(|| ValueShape::plain(""));

        nodes.push(StepNode {
            id: broadcast_id,
            name: format!("{}::broadcast", nodes[source_id].name),
            input: item_shape.clone(),
            output: Some(item_shape),
            kind: NodeKind::Broadcast,
            is_entry: false,
            is_exit: false,
            max_parallelism: 1,
            max_queue_depth: nodes[source_id].max_queue_depth,
            successors: targets,
        });
    }

    let ingest_sources = bind_sources(sources, &nodes);

    let definition = PipelineDefinition {
        step_nodes: nodes,
        ingest_sources,
    };
    let diagnostics = validate(&definition);

    BuildOutcome {
        definition,
        diagnostics,
    }
}

/// Classifies a node's runtime behavior from its declared output shape.
///
/// No output means the node only consumes; a collection (directly or inside
/// an awaited wrapper) means zero-or-more outputs per item; anything else
/// is a one-to-one transform.
fn classify(output: Option<&ValueShape>) -> NodeKind {
    match output {
        None => NodeKind::Action,
        Some(shape) if shape.is_collection => NodeKind::TransformMany,
        Some(_) => NodeKind::Transform,
    }
}

/// Resolves each ingestion descriptor against the entry nodes and orders the
/// result by (priority, name).
fn bind_sources(sources: &[IngestDescriptor], nodes: &[StepNode]) -> Vec<IngestSource> {
    let mut bound: Vec<IngestSource> = sources
        .iter()
        .map(|source| {
            let matches: Vec<NodeId> = nodes
                .iter()
                .filter(|n| n.is_entry && n.input.unwrapped() == source.produced.unwrapped())
                .map(|n| n.id)
                .collect();
            let binding = match matches.as_slice() {
                [] => IngestBinding::Unmatched,
                [id] => IngestBinding::Bound(*id),
                _ => IngestBinding::Ambiguous,
            };
            IngestSource {
                name: source.name.clone(),
                priority: source.priority,
                produced: source.produced.clone(),
                is_stream: source.is_stream,
                free_standing: source.free_standing,
                binding,
            }
        })
        .collect();
    bound.sort_by(|a, b| (a.priority, &a.name).cmp(&(b.priority, &b.name)));
    bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DEFAULT_MAX_PARALLELISM, DEFAULT_QUEUE_DEPTH};

    fn transform(name: &str, input: &str, output: &str) -> StepDescriptor {
        StepDescriptor::new(
            name,
            ValueShape::plain(input),
            Some(ValueShape::plain(output)),
        )
    }

    #[test]
    fn ids_are_assigned_in_name_sorted_order() {
        let steps = vec![
            transform("zeta", "A", "B"),
            transform("alpha", "A", "B").entry(),
            transform("mid", "A", "B"),
        ];
        let outcome = build(&steps, &[]);
        let names: Vec<_> = outcome
            .definition
            .step_nodes
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        let ids: Vec<_> = outcome.definition.step_nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn classification_follows_output_shape() {
        let steps = vec![
            StepDescriptor::new("sink", ValueShape::plain("A"), None).entry(),
            transform("one", "A", "B"),
            StepDescriptor::new(
                "many",
                ValueShape::plain("A"),
                Some(ValueShape::collection("B")),
            ),
            StepDescriptor::new(
                "async_many",
                ValueShape::plain("A"),
                Some(ValueShape::awaited_collection("B")),
            ),
            StepDescriptor::new(
                "async_one",
                ValueShape::plain("A"),
                Some(ValueShape::awaited("B")),
            ),
        ];
        let outcome = build(&steps, &[]);
        let kind = |name: &str| outcome.definition.node_by_name(name).unwrap().kind;
        assert_eq!(kind("sink"), NodeKind::Action);
        assert_eq!(kind("one"), NodeKind::Transform);
        assert_eq!(kind("many"), NodeKind::TransformMany);
        assert_eq!(kind("async_many"), NodeKind::TransformMany);
        assert_eq!(kind("async_one"), NodeKind::Transform);
    }

    #[test]
    fn unknown_successor_names_are_silently_dropped() {
        let steps = vec![transform("start", "A", "B")
            .entry()
            .with_successor("missing")];
        let outcome = build(&steps, &[]);
        let start = outcome.definition.node_by_name("start").unwrap();
        assert!(start.successors.is_empty());
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn duplicate_successors_resolve_to_a_single_edge() {
        let steps = vec![
            transform("start", "A", "B")
                .entry()
                .with_successor("next")
                .with_successor("next"),
            transform("next", "B", "C").exit(),
        ];
        let outcome = build(&steps, &[]);
        let start = outcome.definition.node_by_name("start").unwrap();
        let next = outcome.definition.node_by_name("next").unwrap();
        // Deduplicated before fan-out detection, so no broadcast appears.
        assert_eq!(start.successors, vec![next.id]);
        assert_eq!(outcome.definition.step_nodes.len(), 2);
    }

    #[test]
    fn fan_out_synthesizes_one_broadcast_with_deduplicated_sorted_edges() {
        let steps = vec![
            transform("start", "A", "B")
                .entry()
                .with_successor("b_side")
                .with_successor("a_side")
                .with_successor("a_side"),
            transform("a_side", "B", "C"),
            transform("b_side", "B", "C"),
        ];
        let outcome = build(&steps, &[]);
        let def = &outcome.definition;
        assert_eq!(def.step_nodes.len(), 4);

        let start = def.node_by_name("start").unwrap();
        let a = def.node_by_name("a_side").unwrap();
        let b = def.node_by_name("b_side").unwrap();
        let broadcast = def.node_by_name("start::broadcast").unwrap();

        assert_eq!(broadcast.kind, NodeKind::Broadcast);
        assert_eq!(broadcast.id, 3, "broadcast ids come after all user nodes");
        assert_eq!(start.successors, vec![broadcast.id]);
        assert_eq!(broadcast.successors, vec![a.id, b.id]);
        assert!(!broadcast.is_entry && !broadcast.is_exit);
        assert_eq!(broadcast.max_parallelism, 1);
    }

    #[test]
    fn fan_out_rejoin_topology_builds_five_nodes() {
        // Start(entry) -> {A, B}; A -> C; B -> C; C(exit).
        let steps = vec![
            transform("Start", "In", "Mid")
                .entry()
                .with_successor("A")
                .with_successor("B"),
            transform("A", "Mid", "Mid").with_successor("C"),
            transform("B", "Mid", "Mid").with_successor("C"),
            transform("C", "Mid", "Out").exit(),
        ];
        let outcome = build(&steps, &[]);
        let def = &outcome.definition;
        assert_eq!(def.step_nodes.len(), 5);

        let a = def.node_by_name("A").unwrap();
        let b = def.node_by_name("B").unwrap();
        let c = def.node_by_name("C").unwrap();
        let start = def.node_by_name("Start").unwrap();
        let broadcast = def.node_by_name("Start::broadcast").unwrap();

        assert_eq!(start.successors, vec![broadcast.id]);
        let mut expected = vec![a.id, b.id];
        expected.sort_unstable();
        assert_eq!(broadcast.successors, expected);
        assert_eq!(a.successors, vec![c.id]);
        assert_eq!(b.successors, vec![c.id]);

        let exits: Vec<_> = def.exit_nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(exits, vec!["C"]);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn terminal_node_without_exit_flag_is_valid() {
        let steps = vec![
            transform("start", "A", "B").entry().with_successor("end"),
            transform("end", "B", "C"),
        ];
        let outcome = build(&steps, &[]);
        let end = outcome.definition.node_by_name("end").unwrap();
        assert!(end.successors.is_empty());
        assert!(!end.is_exit);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn tuning_hints_resolve_to_positive_bounds() {
        let steps = vec![
            transform("tuned", "A", "B")
                .entry()
                .with_max_parallelism(2)
                .with_max_queue_depth(3),
            transform("default", "A", "B"),
        ];
        let outcome = build(&steps, &[]);
        let tuned = outcome.definition.node_by_name("tuned").unwrap();
        assert_eq!(tuned.max_parallelism, 2);
        assert_eq!(tuned.max_queue_depth, 3);
        let default = outcome.definition.node_by_name("default").unwrap();
        assert_eq!(default.max_parallelism, DEFAULT_MAX_PARALLELISM);
        assert_eq!(default.max_queue_depth, DEFAULT_QUEUE_DEPTH);
    }

    #[test]
    fn ingest_sources_bind_by_unwrapped_type() {
        let steps = vec![
            transform("start", "Telemetry", "Out").entry(),
            transform("other", "Command", "Out").entry(),
        ];
        let sources = vec![
            IngestDescriptor::new("telemetry_feed", 1, ValueShape::awaited("Telemetry")),
            IngestDescriptor::new("unknown_feed", 0, ValueShape::awaited("Nothing")),
        ];
        let outcome = build(&steps, &sources);
        let def = &outcome.definition;

        // Ordered by (priority, name).
        assert_eq!(def.ingest_sources[0].name, "unknown_feed");
        assert_eq!(def.ingest_sources[1].name, "telemetry_feed");

        let start_id = def.node_by_name("start").unwrap().id;
        assert_eq!(
            def.ingest_sources[1].binding,
            IngestBinding::Bound(start_id)
        );
        assert_eq!(def.ingest_sources[0].binding, IngestBinding::Unmatched);
    }

    #[test]
    fn builds_are_independent_of_descriptor_order() {
        let steps = vec![
            transform("Start", "In", "Mid")
                .entry()
                .with_successor("A")
                .with_successor("B"),
            transform("A", "Mid", "Mid").with_successor("C"),
            transform("B", "Mid", "Mid").with_successor("C"),
            transform("C", "Mid", "Out").exit(),
        ];
        let sources = vec![
            IngestDescriptor::new("feed", 3, ValueShape::awaited("In")),
            IngestDescriptor::new("alt", 3, ValueShape::awaited("Other")),
        ];

        let forward = build(&steps, &sources);
        let mut reversed_steps = steps.clone();
        reversed_steps.reverse();
        let mut reversed_sources = sources.clone();
        reversed_sources.reverse();
        let reversed = build(&reversed_steps, &reversed_sources);

        assert_eq!(forward.definition, reversed.definition);
        assert_eq!(forward.diagnostics, reversed.diagnostics);
    }
}

#[cfg(test)]
mod determinism_props {
    use super::*;
    use proptest::prelude::*;

    fn arb_steps() -> impl Strategy<Value = Vec<StepDescriptor>> {
        // A handful of fixed names with random edges, role flags and
        // shapes; indices outside the name pool exercise the unknown-name
        // leniency.
        let names = ["alpha", "bravo", "charlie", "delta", "echo"];
        proptest::collection::vec(
            (
                0usize..names.len(),
                proptest::collection::vec(0usize..8, 0..4),
                any::<bool>(),
                any::<bool>(),
                any::<bool>(),
            ),
            1..=names.len(),
        )
        .prop_map(move |raw| {
            raw.into_iter()
                .map(|(name_ix, succs, is_entry, is_exit, collection)| {
                    let output = if collection {
                        Some(ValueShape::collection("Item"))
                    } else {
                        Some(ValueShape::plain("Item"))
                    };
                    let mut step =
                        StepDescriptor::new(names[name_ix], ValueShape::plain("Item"), output);
                    step.is_entry = is_entry;
                    step.is_exit = is_exit;
                    step.successors = succs
                        .into_iter()
                        .map(|ix| names.get(ix).copied().unwrap_or("missing").to_string())
                        .collect();
                    step
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn permuting_descriptors_never_changes_the_build(
            steps in arb_steps(),
            seed in any::<u64>(),
        ) {
            // Deterministic pseudo-shuffle derived from the seed.
            let mut shuffled = steps.clone();
            let len = shuffled.len();
            let mut state = seed;
            for i in (1..len).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (state % (i as u64 + 1)) as usize;
                shuffled.swap(i, j);
            }

            // Identical name sets build identically. Duplicated names are
            // keyed last-wins, so restrict the property to duplicate-free
            // inputs.
            let mut names: Vec<_> = steps.iter().map(|s| s.name.clone()).collect();
            names.sort();
            names.dedup();
            prop_assume!(names.len() == steps.len());

            let a = build(&steps, &[]);
            let b = build(&shuffled, &[]);
            prop_assert_eq!(a.definition, b.definition);
            prop_assert_eq!(a.diagnostics, b.diagnostics);
        }
    }
}
