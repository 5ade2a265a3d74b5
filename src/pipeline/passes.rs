// This module holds the built-in passes. Verification re-checks the graph and aborts the run
// on any violation. Identity elimination rewires the consumers of every Identity node to its
// producer and drops the node. Constant folding walks the graph in dependency order and
// evaluates any compute node whose inputs all come from Constant nodes, replacing it with a
// Constant of the same id and removing constants that no longer feed anything. Lowering turns
// the graph into a Program, running shape inference node by node. Program emission publishes
// the lowered program as the run's artifact.

//! Built-in passes.

use super::artifact::Artifact;
use super::pass::{Diagnostic, Pass, PassContext, PassOutcome};
use super::program::{Kernel, Program, Step, ValueRef};
use crate::backend::interp::{eval_kernel, Tensor};
use crate::core::{CompileError, CompileResult};
use crate::ir::ops::io::{CONSTANT_KIND, INPUT_KIND, OUTPUT_KIND};
use crate::ir::{AttrValue, Attributes, ComputeGraph, NodeId};
use std::collections::HashMap;

const IDENTITY_KIND: &str = "Identity";

/// Full graph validation.
#[derive(Debug, Default)]
pub struct VerifyGraph;

impl Pass for VerifyGraph {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn run(&self, graph: &mut ComputeGraph, ctx: &mut PassContext<'_, '_>) -> PassOutcome {
        ctx.session.record_nodes_validated(graph.node_count());
        match graph.validate_all() {
            Ok(()) => PassOutcome::Unchanged,
            Err(err) => PassOutcome::Failed(err),
        }
    }
}

/// Removes `Identity` nodes.
#[derive(Debug, Default)]
pub struct EliminateIdentity;

impl EliminateIdentity {
    fn bypass(graph: &mut ComputeGraph, id: &NodeId) -> CompileResult<()> {
        let source = graph
            .producer_of(id, 0)
            .map(|(producer, slot)| (producer.clone(), slot));
        let consumers = graph.consumers_of(id);
        graph.remove_node(id)?;
        if let Some((producer, out_slot)) = source {
            for edge in consumers {
                graph.connect(&producer, out_slot, &edge.consumer, edge.in_slot)?;
            }
        }
        Ok(())
    }
}

impl Pass for EliminateIdentity {
    fn name(&self) -> &'static str {
        "eliminate-identity"
    }

    fn is_fatal(&self) -> bool {
        false
    }

    fn run(&self, graph: &mut ComputeGraph, _ctx: &mut PassContext<'_, '_>) -> PassOutcome {
        let identities: Vec<NodeId> = graph
            .node_ids()
            .filter(|id| graph.node(id).is_some_and(|node| node.kind() == IDENTITY_KIND))
            .cloned()
            .collect();
        if identities.is_empty() {
            return PassOutcome::Unchanged;
        }
        for id in &identities {
            if let Err(err) = Self::bypass(graph, id) {
                return PassOutcome::Failed(err);
            }
        }
        log::debug!("Eliminated {} identity node(s)", identities.len());
        PassOutcome::Changed
    }
}

/// Evaluates nodes whose inputs are all constants.
#[derive(Debug, Default)]
pub struct FoldConstants;

impl FoldConstants {
    fn constant_value(graph: &ComputeGraph, id: &NodeId) -> Option<Tensor> {
        let node = graph.node(id)?;
        if node.kind() != CONSTANT_KIND {
            return None;
        }
        match node.lower().ok()? {
            Kernel::Constant { shape, value } => Tensor::new(shape, value).ok(),
            _ => None,
        }
    }

    /// Fold `id` if every input is a constant. Returns whether it was folded.
    fn try_fold(graph: &mut ComputeGraph, id: &NodeId, ctx: &PassContext<'_, '_>) -> CompileResult<bool> {
        let Some(node) = graph.node(id) else {
            return Ok(false);
        };
        if matches!(node.kind(), INPUT_KIND | OUTPUT_KIND | CONSTANT_KIND) {
            return Ok(false);
        }
        let edges = graph.input_edges(id);
        if edges.is_empty() {
            return Ok(false);
        }
        let mut values = Vec::with_capacity(edges.len());
        for edge in &edges {
            match Self::constant_value(graph, &edge.producer) {
                Some(value) => values.push(value),
                None => return Ok(false),
            }
        }

        let lowering = |reason: String| CompileError::Lowering { node: id.to_string(), reason };
        let kernel = node.lower().map_err(lowering)?;
        let shapes: Vec<&[usize]> = values.iter().map(Tensor::shape).collect();
        let shape = kernel.infer_shape(&shapes).map_err(lowering)?;
        let args: Vec<&Tensor> = values.iter().collect();
        let folded = eval_kernel(&kernel, &args, &shape).map_err(lowering)?;

        let attrs = Attributes::new()
            .with("shape", AttrValue::Ints(shape.iter().map(|&d| d as i64).collect()))
            .with("value", AttrValue::Floats(folded.into_data()));
        let constant = ctx.registry.create(CONSTANT_KIND, attrs)?;

        for edge in &edges {
            graph.disconnect(id, edge.in_slot)?;
        }
        graph.replace_node(id, constant)?;
        for edge in &edges {
            let orphan = graph.consumers_of(&edge.producer).is_empty()
                && graph.node(&edge.producer).is_some_and(|n| n.kind() == CONSTANT_KIND);
            if orphan {
                graph.remove_node(&edge.producer)?;
            }
        }
        log::trace!("Folded {} into a constant of shape {:?}", id, shape);
        Ok(true)
    }
}

impl Pass for FoldConstants {
    fn name(&self) -> &'static str {
        "fold-constants"
    }

    fn is_fatal(&self) -> bool {
        false
    }

    fn run(&self, graph: &mut ComputeGraph, ctx: &mut PassContext<'_, '_>) -> PassOutcome {
        let order: Vec<NodeId> = graph.topological_order().cloned().collect();
        let mut folded = 0usize;
        for id in &order {
            if ctx.is_cancelled() {
                return PassOutcome::Failed(CompileError::Cancelled { pass: self.name().to_string() });
            }
            match Self::try_fold(graph, id, ctx) {
                Ok(true) => folded += 1,
                Ok(false) => {}
                Err(err) => return PassOutcome::Failed(err),
            }
        }
        if folded == 0 {
            return PassOutcome::Unchanged;
        }
        PassOutcome::Diagnostic {
            diagnostic: Diagnostic::note(format!("folded {folded} node(s) into constants")),
            changed: true,
        }
    }
}

/// Lowers the graph to a [`Program`].
#[derive(Debug, Default)]
pub struct LowerToProgram;

/// Lower `graph` in topological order, inferring every step's shape.
pub fn lower_graph(graph: &ComputeGraph, ctx: &PassContext<'_, '_>) -> CompileResult<Program> {
    let mut program = Program {
        name: graph.name().to_string(),
        ..Program::default()
    };
    let mut step_of: HashMap<&NodeId, usize> = HashMap::with_capacity(graph.node_count());

    for id in graph.topological_order() {
        if ctx.is_cancelled() {
            return Err(CompileError::Cancelled { pass: "lower".to_string() });
        }
        let node = graph
            .node(id)
            .ok_or_else(|| CompileError::DanglingReference { id: id.to_string() })?;
        let lowering = |reason: String| CompileError::Lowering { node: id.to_string(), reason };

        let kernel = node.lower().map_err(lowering)?;
        let mut inputs = Vec::new();
        for edge in graph.input_edges(id) {
            let step = *step_of
                .get(&edge.producer)
                .ok_or_else(|| lowering(format!("producer '{}' not lowered", edge.producer)))?;
            inputs.push(ValueRef { step, slot: edge.out_slot });
        }
        let shapes: Vec<&[usize]> = inputs
            .iter()
            .map(|input| program.steps[input.step].shape.as_slice())
            .collect();
        let shape = kernel.infer_shape(&shapes).map_err(lowering)?;

        log::trace!("lower %{} = {} -> {:?}", id, node.kind(), shape);
        ctx.session.record_node_lowered(node.kind());

        let index = program.steps.len();
        match node.kind() {
            INPUT_KIND => program.inputs.push(index),
            OUTPUT_KIND => program.outputs.push(index),
            _ => {}
        }
        step_of.insert(id, index);
        program.steps.push(Step {
            node: id.clone(),
            kind: node.kind().to_string(),
            kernel,
            inputs,
            shape,
        });
    }
    Ok(program)
}

impl Pass for LowerToProgram {
    fn name(&self) -> &'static str {
        "lower"
    }

    fn run(&self, graph: &mut ComputeGraph, ctx: &mut PassContext<'_, '_>) -> PassOutcome {
        match lower_graph(graph, ctx) {
            Ok(program) => {
                log::debug!("Lowered {} into {} steps", program.name, program.steps.len());
                ctx.program = Some(program);
                PassOutcome::Unchanged
            }
            Err(err) => PassOutcome::Failed(err),
        }
    }
}

/// Publishes the lowered program as the artifact.
#[derive(Debug, Default)]
pub struct EmitProgram;

impl Pass for EmitProgram {
    fn name(&self) -> &'static str {
        "emit-program"
    }

    fn run(&self, _graph: &mut ComputeGraph, ctx: &mut PassContext<'_, '_>) -> PassOutcome {
        match &ctx.program {
            Some(program) => {
                ctx.session.record_code_size(program.listing().len());
                ctx.artifact = Some(Artifact::Program(program.clone()));
                PassOutcome::Unchanged
            }
            None => PassOutcome::Failed(CompileError::Emission {
                reason: "no lowered program to emit".to_string(),
            }),
        }
    }
}
