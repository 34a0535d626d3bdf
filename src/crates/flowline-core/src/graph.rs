//! Core graph data structures: the immutable output of the builder.
//!
//! A [`PipelineDefinition`] is a fully resolved execution graph: every
//! declared successor name has been turned into a [`NodeId`], every step has
//! been classified into a [`NodeKind`], and every multi-successor step has
//! been split through a synthetic broadcast node. Definitions are
//! constructed once per descriptor set and never mutated; re-running the
//! builder on the same set produces an identical definition (ids, edges and
//! ordering included), which is what lets downstream consumers (the
//! execution runtime and the emitted-artifact collaborator) treat it as a
//! stable, purely structural artifact.
//!
//! # Node identity
//!
//! Node ids are plain `usize` indices assigned in deterministic name-sorted
//! order, with broadcast nodes appended after all user nodes. An id is also
//! the node's position in [`PipelineDefinition::step_nodes`], so edge
//! traversal is index lookup. Ids are stable for the lifetime of one build
//! and carry no meaning across rebuilds.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::descriptor::ValueShape;

/// Node identifier: the node's position in the definition's node list.
pub type NodeId = usize;

/// Runtime behavior class of a step, derived from its declared output
/// shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Consumes items and produces no output.
    Action,
    /// Produces exactly one output item per input item.
    Transform,
    /// Produces zero-or-more output items per input item.
    TransformMany,
    /// Synthetic identity fan-out; never declared by a user.
    Broadcast,
}

/// One processing stage of the resolved graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepNode {
    /// Unique within one definition; equals the node's index in
    /// [`PipelineDefinition::step_nodes`].
    pub id: NodeId,
    /// Unique among step nodes. Synthetic broadcast nodes are named
    /// `<source>::broadcast`, which cannot collide with a declared name.
    pub name: String,
    /// Shape of each consumed item.
    pub input: ValueShape,
    /// Shape of the produced value; `None` for [`NodeKind::Action`].
    pub output: Option<ValueShape>,
    /// Behavior classification.
    pub kind: NodeKind,
    /// Accepts external submissions.
    pub is_entry: bool,
    /// Output externally observable via receive.
    pub is_exit: bool,
    /// Concurrent-worker bound for the stage, always positive.
    pub max_parallelism: usize,
    /// Queue capacity for the stage, always positive.
    pub max_queue_depth: usize,
    /// Downstream node ids: deduplicated, ascending. After building,
    /// non-broadcast nodes hold at most one.
    pub successors: Vec<NodeId>,
}

impl StepNode {
    /// The node's output is observable: flagged exit and not an action.
    pub fn has_observable_output(&self) -> bool {
        self.is_exit && self.output.is_some() && self.kind != NodeKind::Action
    }
}

/// Resolution state of an ingestion source against the definition's entry
/// nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestBinding {
    /// Bound to the unique entry node with a matching unwrapped input type.
    Bound(NodeId),
    /// No entry node matched; the source is inert.
    Unmatched,
    /// More than one entry node matched; the source is left unbound and
    /// diagnosed.
    Ambiguous,
}

/// An external, independently scheduled producer, resolved against the
/// graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSource {
    /// Unique name among ingestion sources.
    pub name: String,
    /// Startup ordering, ascending; ties broken by name. Not a runtime
    /// scheduling priority.
    pub priority: i32,
    /// Shape of each produced value.
    pub produced: ValueShape,
    /// Yields a sequence rather than one awaited value per pull.
    pub is_stream: bool,
    /// Independently schedulable.
    pub free_standing: bool,
    /// Resolution against the entry nodes.
    pub binding: IngestBinding,
}

impl IngestSource {
    /// A source is schedulable when it is free-standing and produces either
    /// an awaited single value or a stream.
    pub fn is_schedulable(&self) -> bool {
        self.free_standing && (self.is_stream || self.produced.awaited)
    }
}

/// The immutable output of the graph builder.
///
/// `step_nodes` is ordered by id; `ingest_sources` by (priority, name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// All nodes, user-declared and synthetic, in id order.
    pub step_nodes: Vec<StepNode>,
    /// All ingestion sources in startup order.
    pub ingest_sources: Vec<IngestSource>,
}

impl PipelineDefinition {
    /// Looks a node up by id.
    pub fn node(&self, id: NodeId) -> Option<&StepNode> {
        self.step_nodes.get(id)
    }

    /// Looks a node up by name.
    pub fn node_by_name(&self, name: &str) -> Option<&StepNode> {
        self.step_nodes.iter().find(|n| n.name == name)
    }

    /// Entry nodes in id order.
    pub fn entry_nodes(&self) -> impl Iterator<Item = &StepNode> {
        self.step_nodes.iter().filter(|n| n.is_entry)
    }

    /// Exit nodes in id order.
    pub fn exit_nodes(&self) -> impl Iterator<Item = &StepNode> {
        self.step_nodes.iter().filter(|n| n.is_exit)
    }

    /// Unwrapped input type names of the entry nodes, in id order.
    pub fn input_type_names(&self) -> Vec<&str> {
        self.entry_nodes().map(|n| n.input.unwrapped()).collect()
    }

    /// Unwrapped output type names of the exit nodes with observable
    /// output, in id order.
    pub fn output_type_names(&self) -> Vec<&str> {
        self.exit_nodes()
            .filter(|n| n.has_observable_output())
            .filter_map(|n| n.output.as_ref())
            .map(ValueShape::unwrapped)
            .collect()
    }

    /// At least one entry node exists.
    pub fn has_any_input_types(&self) -> bool {
        !self.input_type_names().is_empty()
    }

    /// Exactly one entry node exists.
    pub fn has_single_input_type(&self) -> bool {
        self.input_type_names().len() == 1
    }

    /// More than one entry node exists.
    pub fn has_multiple_input_types(&self) -> bool {
        self.input_type_names().len() > 1
    }

    /// Every entry node's unwrapped input type name is distinct.
    pub fn has_disjoint_input_types(&self) -> bool {
        let names = self.input_type_names();
        self.distinct_count(&names) == names.len()
    }

    /// At least one observable exit output type exists.
    pub fn has_any_output_types(&self) -> bool {
        !self.output_type_names().is_empty()
    }

    /// Exactly one observable exit node exists.
    pub fn has_single_output_type(&self) -> bool {
        self.output_type_names().len() == 1
    }

    /// More than one observable exit node exists.
    pub fn has_multiple_output_types(&self) -> bool {
        self.output_type_names().len() > 1
    }

    /// Every observable exit node's unwrapped output type name is distinct.
    pub fn has_disjoint_output_types(&self) -> bool {
        let names = self.output_type_names();
        self.distinct_count(&names) == names.len()
    }

    fn distinct_count(&self, names: &[&str]) -> usize {
        names.iter().collect::<BTreeSet<_>>().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: NodeId, name: &str, input: &str, entry: bool) -> StepNode {
        StepNode {
            id,
            name: name.to_string(),
            input: ValueShape::plain(input),
            output: Some(ValueShape::plain("Out")),
            kind: NodeKind::Transform,
            is_entry: entry,
            is_exit: false,
            max_parallelism: 1,
            max_queue_depth: 1,
            successors: Vec::new(),
        }
    }

    #[test]
    fn input_type_predicates() {
        let def = PipelineDefinition {
            step_nodes: vec![
                node(0, "a", "Foo", true),
                node(1, "b", "Bar", true),
                node(2, "c", "Baz", false),
            ],
            ingest_sources: Vec::new(),
        };
        assert!(def.has_any_input_types());
        assert!(def.has_multiple_input_types());
        assert!(def.has_disjoint_input_types());
        assert!(!def.has_single_input_type());
    }

    #[test]
    fn overlapping_input_types_are_not_disjoint() {
        let def = PipelineDefinition {
            step_nodes: vec![node(0, "a", "Foo", true), node(1, "b", "Foo", true)],
            ingest_sources: Vec::new(),
        };
        assert!(!def.has_single_input_type());
        assert!(def.has_multiple_input_types());
        assert!(!def.has_disjoint_input_types());
    }

    #[test]
    fn no_entries_means_no_input_types() {
        let def = PipelineDefinition {
            step_nodes: vec![node(0, "a", "Foo", false)],
            ingest_sources: Vec::new(),
        };
        assert!(!def.has_any_input_types());
    }

    #[test]
    fn action_exit_is_not_observable() {
        let mut n = node(0, "sink", "Foo", false);
        n.is_exit = true;
        n.kind = NodeKind::Action;
        n.output = None;
        let def = PipelineDefinition {
            step_nodes: vec![n],
            ingest_sources: Vec::new(),
        };
        assert!(!def.has_any_output_types());
    }

    #[test]
    fn output_type_predicates_mirror_the_input_ones() {
        let mut left = node(0, "left", "In", false);
        left.is_exit = true;
        left.output = Some(ValueShape::plain("Report"));
        let mut right = node(1, "right", "In", false);
        right.is_exit = true;
        right.output = Some(ValueShape::plain("Report"));

        let def = PipelineDefinition {
            step_nodes: vec![left, right],
            ingest_sources: Vec::new(),
        };
        assert!(def.has_any_output_types());
        assert!(def.has_multiple_output_types());
        assert!(!def.has_single_output_type());
        assert!(!def.has_disjoint_output_types());
    }

    #[test]
    fn schedulable_requires_free_standing_and_awaitable_shape() {
        let source = IngestSource {
            name: "feed".to_string(),
            priority: 0,
            produced: ValueShape::awaited("Foo"),
            is_stream: false,
            free_standing: true,
            binding: IngestBinding::Unmatched,
        };
        assert!(source.is_schedulable());

        let bound = IngestSource {
            free_standing: false,
            ..source.clone()
        };
        assert!(!bound.is_schedulable());

        let plain = IngestSource {
            produced: ValueShape::plain("Foo"),
            ..source
        };
        assert!(!plain.is_schedulable());
    }
}
