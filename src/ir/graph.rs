// This module implements the ComputeGraph, a directed acyclic graph of operator nodes. Nodes
// live in an arena whose slot index is the insertion order; a removed node leaves an empty
// slot so the indices of the remaining nodes never move. Edges are stored twice, as links in
// the producer's outgoing list and in the consumer's incoming list, and always refer to
// arena indices. Each consumer input slot has at most one producer while an output slot may
// fan out to any number of consumers. Cycles are rejected when an edge is added by searching
// the consumer's descendants for the producer, so the graph is acyclic at all times and the
// lazy topological order never stalls. Validation checks each node's arity and attributes,
// every edge's slot ranges and the presence of graph inputs and outputs, either stopping at
// the first violation or collecting all of them.

//! Compute graph container.

use super::node::{NodeId, OperatorNode};
use super::ops::io::{INPUT_KIND, OUTPUT_KIND};
use crate::core::{CompileError, CompileResult, SlotDirection, Violation};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::fmt;

/// A connection between an output slot and an input slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub producer: NodeId,
    pub out_slot: u32,
    pub consumer: NodeId,
    pub in_slot: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    producer: usize,
    out_slot: u32,
    consumer: usize,
    in_slot: u32,
}

#[derive(Debug, Clone)]
struct Entry {
    id: NodeId,
    node: OperatorNode,
    incoming: Vec<Link>,
    outgoing: Vec<Link>,
}

/// A named DAG of operator nodes.
#[derive(Debug, Clone, Default)]
pub struct ComputeGraph {
    name: String,
    entries: Vec<Option<Entry>>,
    index: HashMap<NodeId, usize>,
    edge_count: usize,
}

impl ComputeGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add `node` under `id`.
    pub fn add_node(&mut self, id: impl Into<NodeId>, node: OperatorNode) -> CompileResult<()> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(CompileError::DuplicateNodeIdentity { id: id.to_string() });
        }
        log::trace!("add node {} = {}", id, node);
        self.index.insert(id.clone(), self.entries.len());
        self.entries.push(Some(Entry {
            id,
            node,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }));
        Ok(())
    }

    /// Connect `producer:out_slot` to `consumer:in_slot`.
    ///
    /// Leaves the graph unchanged on failure.
    pub fn connect(
        &mut self,
        producer: &NodeId,
        out_slot: u32,
        consumer: &NodeId,
        in_slot: u32,
    ) -> CompileResult<()> {
        let from = self.slot_of(producer)?;
        let to = self.slot_of(consumer)?;

        let producer_arity = self.entry(from).node.arity();
        if !producer_arity.output_slot_exists(out_slot) {
            return Err(CompileError::SlotOutOfRange {
                id: producer.to_string(),
                direction: SlotDirection::Output,
                slot: out_slot,
                max: producer_arity.max_outputs.unwrap_or(u32::MAX),
            });
        }
        let consumer_entry = self.entry(to);
        let consumer_arity = consumer_entry.node.arity();
        if !consumer_arity.input_slot_exists(in_slot) {
            return Err(CompileError::SlotOutOfRange {
                id: consumer.to_string(),
                direction: SlotDirection::Input,
                slot: in_slot,
                max: consumer_arity.max_inputs.unwrap_or(u32::MAX),
            });
        }
        if consumer_entry.incoming.iter().any(|link| link.in_slot == in_slot) {
            return Err(CompileError::SlotOccupied {
                id: consumer.to_string(),
                slot: in_slot,
            });
        }
        if self.reaches(to, from) {
            return Err(CompileError::CycleDetected {
                producer: producer.to_string(),
                consumer: consumer.to_string(),
            });
        }

        let link = Link {
            producer: from,
            out_slot,
            consumer: to,
            in_slot,
        };
        self.entry_mut(from).outgoing.push(link);
        self.entry_mut(to).incoming.push(link);
        self.edge_count += 1;
        Ok(())
    }

    /// Remove the edge feeding `consumer:in_slot`, returning it.
    pub fn disconnect(&mut self, consumer: &NodeId, in_slot: u32) -> CompileResult<Option<Edge>> {
        let to = self.slot_of(consumer)?;
        let Some(pos) = self
            .entry(to)
            .incoming
            .iter()
            .position(|link| link.in_slot == in_slot)
        else {
            return Ok(None);
        };
        let link = self.entry_mut(to).incoming.remove(pos);
        self.entry_mut(link.producer).outgoing.retain(|l| *l != link);
        self.edge_count -= 1;
        Ok(Some(self.edge_of(link)))
    }

    /// Remove `id` and every edge touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> CompileResult<OperatorNode> {
        let slot = self.slot_of(id)?;
        self.index.remove(id);
        let entry = self.entries[slot]
            .take()
            .ok_or_else(|| CompileError::DanglingReference { id: id.to_string() })?;

        for link in &entry.incoming {
            if let Some(peer) = self.entries[link.producer].as_mut() {
                peer.outgoing.retain(|l| l != link);
            }
        }
        for link in &entry.outgoing {
            if let Some(peer) = self.entries[link.consumer].as_mut() {
                peer.incoming.retain(|l| l != link);
            }
        }
        self.edge_count -= entry.incoming.len() + entry.outgoing.len();
        log::trace!("removed node {}", id);
        Ok(entry.node)
    }

    /// Swap the operator behind `id`, keeping its edges.
    pub fn replace_node(&mut self, id: &NodeId, node: OperatorNode) -> CompileResult<OperatorNode> {
        let slot = self.slot_of(id)?;
        Ok(std::mem::replace(&mut self.entry_mut(slot).node, node))
    }

    pub fn node(&self, id: &NodeId) -> Option<&OperatorNode> {
        self.index.get(id).map(|&slot| &self.entry(slot).node)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut OperatorNode> {
        let slot = *self.index.get(id)?;
        Some(&mut self.entry_mut(slot).node)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    /// The producer feeding `consumer:in_slot`, as `(producer, out_slot)`.
    pub fn producer_of(&self, consumer: &NodeId, in_slot: u32) -> Option<(&NodeId, u32)> {
        let entry = self.entry(*self.index.get(consumer)?);
        entry
            .incoming
            .iter()
            .find(|link| link.in_slot == in_slot)
            .map(|link| (&self.entry(link.producer).id, link.out_slot))
    }

    /// Producers of every connected input of `consumer`, ordered by input slot.
    pub fn input_edges(&self, consumer: &NodeId) -> Vec<Edge> {
        let Some(&slot) = self.index.get(consumer) else {
            return Vec::new();
        };
        let mut edges: Vec<Edge> = self.entry(slot).incoming.iter().map(|&l| self.edge_of(l)).collect();
        edges.sort_by_key(|edge| edge.in_slot);
        edges
    }

    /// Every edge leaving `producer`, in connection order.
    pub fn consumers_of(&self, producer: &NodeId) -> Vec<Edge> {
        match self.index.get(producer) {
            Some(&slot) => self.entry(slot).outgoing.iter().map(|&l| self.edge_of(l)).collect(),
            None => Vec::new(),
        }
    }

    /// Every edge, ordered by producer insertion order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.live()
            .flat_map(move |entry| entry.outgoing.iter().map(move |&l| self.edge_of(l)))
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.live().map(|entry| &entry.id)
    }

    /// Graph input nodes, in insertion order.
    pub fn inputs(&self) -> Vec<&NodeId> {
        self.ids_of_kind(INPUT_KIND)
    }

    /// Graph output nodes, in insertion order.
    pub fn outputs(&self) -> Vec<&NodeId> {
        self.ids_of_kind(OUTPUT_KIND)
    }

    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Lazy topological order. Ready nodes come out in insertion order.
    pub fn topological_order(&self) -> TopologicalOrder<'_> {
        let mut pending = vec![0usize; self.entries.len()];
        let mut ready = BinaryHeap::new();
        for (slot, entry) in self.entries.iter().enumerate() {
            if let Some(entry) = entry {
                pending[slot] = entry.incoming.len();
                if entry.incoming.is_empty() {
                    ready.push(Reverse(slot));
                }
            }
        }
        TopologicalOrder {
            graph: self,
            pending,
            ready,
        }
    }

    /// Fail-fast validation: the first violation found becomes `GraphInvalid`.
    pub fn validate(&self) -> CompileResult<()> {
        match self.collect_violations(true).into_iter().next() {
            None => Ok(()),
            Some(first) => Err(CompileError::GraphInvalid {
                violations: vec![first],
            }),
        }
    }

    /// Verbose validation: every violation in the graph.
    pub fn violations(&self) -> Vec<Violation> {
        self.collect_violations(false)
    }

    /// Like [`validate`](Self::validate) but reporting every violation.
    pub fn validate_all(&self) -> CompileResult<()> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(CompileError::GraphInvalid { violations })
        }
    }

    fn collect_violations(&self, fail_fast: bool) -> Vec<Violation> {
        let mut violations = Vec::new();

        for entry in self.live() {
            let inputs = sorted_slots(entry.incoming.iter().map(|l| l.in_slot));
            let outputs = sorted_slots(entry.outgoing.iter().map(|l| l.out_slot));
            for problem in entry.node.validate(&inputs, &outputs) {
                violations.push(Violation::on_node(entry.id.as_str(), problem));
                if fail_fast {
                    return violations;
                }
            }

            let arity = entry.node.arity();
            for link in &entry.outgoing {
                let consumer = self.entries.get(link.consumer).and_then(Option::as_ref);
                let problem = match consumer {
                    None => Some(format!("edge to removed node at slot {}", link.consumer)),
                    Some(_) if !arity.output_slot_exists(link.out_slot) => {
                        Some(format!("output slot {} exceeds arity ({})", link.out_slot, arity))
                    }
                    Some(peer) if !peer.node.arity().input_slot_exists(link.in_slot) => Some(format!(
                        "edge into input slot {} of '{}' exceeds its arity",
                        link.in_slot, peer.id
                    )),
                    Some(_) => None,
                };
                if let Some(problem) = problem {
                    violations.push(Violation::on_node(entry.id.as_str(), problem));
                    if fail_fast {
                        return violations;
                    }
                }
            }
        }

        if self.inputs().is_empty() {
            violations.push(Violation::graph("graph has no Input node"));
            if fail_fast {
                return violations;
            }
        }
        if self.outputs().is_empty() {
            violations.push(Violation::graph("graph has no Output node"));
            if fail_fast {
                return violations;
            }
        }
        if self.topological_order().count() != self.node_count() {
            violations.push(Violation::graph("graph contains a cycle"));
        }
        violations
    }

    fn ids_of_kind(&self, kind: &str) -> Vec<&NodeId> {
        self.live()
            .filter(|entry| entry.node.kind() == kind)
            .map(|entry| &entry.id)
            .collect()
    }

    /// Whether `target` is reachable from `start` along edges.
    fn reaches(&self, start: usize, target: usize) -> bool {
        if start == target {
            return true;
        }
        // Only the descendants of `start` are visited.
        let mut seen = HashSet::from([start]);
        let mut stack = vec![start];
        while let Some(slot) = stack.pop() {
            for link in &self.entry(slot).outgoing {
                if link.consumer == target {
                    return true;
                }
                if seen.insert(link.consumer) {
                    stack.push(link.consumer);
                }
            }
        }
        false
    }

    fn slot_of(&self, id: &NodeId) -> CompileResult<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| CompileError::DanglingReference { id: id.to_string() })
    }

    fn live(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().flatten()
    }

    fn edge_of(&self, link: Link) -> Edge {
        Edge {
            producer: self.entry(link.producer).id.clone(),
            out_slot: link.out_slot,
            consumer: self.entry(link.consumer).id.clone(),
            in_slot: link.in_slot,
        }
    }

    // Slots reached through `index` or a live link are always occupied.
    fn entry(&self, slot: usize) -> &Entry {
        match &self.entries[slot] {
            Some(entry) => entry,
            None => unreachable!("graph slot {slot} is empty"),
        }
    }

    fn entry_mut(&mut self, slot: usize) -> &mut Entry {
        match &mut self.entries[slot] {
            Some(entry) => entry,
            None => unreachable!("graph slot {slot} is empty"),
        }
    }
}

fn sorted_slots(slots: impl Iterator<Item = u32>) -> Vec<u32> {
    slots.collect::<BTreeSet<_>>().into_iter().collect()
}

/// Structural equality: same name, same nodes by id, same edges.
impl PartialEq for ComputeGraph {
    fn eq(&self, other: &Self) -> bool {
        if self.name != other.name || self.node_count() != other.node_count() {
            return false;
        }
        let same_nodes = self
            .live()
            .all(|entry| other.node(&entry.id) == Some(&entry.node));
        same_nodes && self.edges().collect::<BTreeSet<_>>() == other.edges().collect::<BTreeSet<_>>()
    }
}

impl fmt::Display for ComputeGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {} {{", self.name)?;
        for entry in self.live() {
            write!(f, "  %{} = {}", entry.id, entry.node)?;
            for edge in self.input_edges(&entry.id) {
                write!(f, " %{}", edge.producer)?;
                if edge.out_slot != 0 {
                    write!(f, ":{}", edge.out_slot)?;
                }
            }
            writeln!(f)?;
        }
        writeln!(f, "}}")
    }
}

/// Lazy Kahn traversal returned by [`ComputeGraph::topological_order`].
pub struct TopologicalOrder<'g> {
    graph: &'g ComputeGraph,
    pending: Vec<usize>,
    ready: BinaryHeap<Reverse<usize>>,
}

impl<'g> Iterator for TopologicalOrder<'g> {
    type Item = &'g NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(slot) = self.ready.pop()?;
        let entry = self.graph.entry(slot);
        for link in &entry.outgoing {
            self.pending[link.consumer] -= 1;
            if self.pending[link.consumer] == 0 {
                self.ready.push(Reverse(link.consumer));
            }
        }
        Some(&entry.id)
    }
}
