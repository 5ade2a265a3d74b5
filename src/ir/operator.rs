// This module defines the Operator trait, the capability set every operator kind implements.
// An operator is a stateless description of one kind of computation: it declares its arity
// (how many input and output slots may be connected), the attributes it understands, any
// kind-specific attribute checks, how it renders itself, and how it lowers to a kernel. The
// graph, the pipeline and the backends only ever talk to operators through this trait, so a
// new kind is a new implementation registered in the OperatorRegistry and nothing else.

//! Operator capability trait and arity contracts.

use super::attr::{AttrSpec, Attributes};
use super::node::OperatorNode;
use crate::pipeline::program::Kernel;
use std::fmt;

/// Input/output slot contract of an operator kind.
///
/// `None` as a maximum means variadic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min_inputs: u32,
    pub max_inputs: Option<u32>,
    pub min_outputs: u32,
    pub max_outputs: Option<u32>,
}

impl Arity {
    pub const fn new(
        min_inputs: u32,
        max_inputs: Option<u32>,
        min_outputs: u32,
        max_outputs: Option<u32>,
    ) -> Self {
        Self { min_inputs, max_inputs, min_outputs, max_outputs }
    }

    /// Exactly `inputs` inputs and `outputs` outputs.
    pub const fn fixed(inputs: u32, outputs: u32) -> Self {
        Self::new(inputs, Some(inputs), outputs, Some(outputs))
    }

    /// At least `min_inputs` inputs, exactly one output.
    pub const fn variadic_inputs(min_inputs: u32) -> Self {
        Self::new(min_inputs, None, 1, Some(1))
    }

    pub fn accepts_inputs(&self, count: u32) -> bool {
        count >= self.min_inputs && self.max_inputs.map_or(true, |max| count <= max)
    }

    pub fn accepts_outputs(&self, count: u32) -> bool {
        count >= self.min_outputs && self.max_outputs.map_or(true, |max| count <= max)
    }

    pub fn input_slot_exists(&self, slot: u32) -> bool {
        self.max_inputs.map_or(true, |max| slot < max)
    }

    pub fn output_slot_exists(&self, slot: u32) -> bool {
        self.max_outputs.map_or(true, |max| slot < max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn range(min: u32, max: Option<u32>) -> String {
            match max {
                Some(max) if max == min => min.to_string(),
                Some(max) => format!("{min}..{max}"),
                None => format!("{min}.."),
            }
        }
        write!(
            f,
            "inputs {}, outputs {}",
            range(self.min_inputs, self.max_inputs),
            range(self.min_outputs, self.max_outputs)
        )
    }
}

/// Capability set of an operator kind.
///
/// Implementations hold no per-node state; attributes live on the
/// [`OperatorNode`] and are handed back to every capability.
pub trait Operator: fmt::Debug + Send + Sync {
    /// Slot contract of this kind.
    fn arity(&self) -> Arity;

    /// Attributes this kind understands.
    fn attr_specs(&self) -> &'static [AttrSpec] {
        &[]
    }

    /// Kind-specific attribute semantics beyond presence and value kind.
    fn check(&self, _attrs: &Attributes) -> Result<(), String> {
        Ok(())
    }

    /// Human-readable rendering of the node body (without its identity).
    fn describe(&self, node: &OperatorNode, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(node.kind())?;
        if !node.attrs().is_empty() {
            write!(f, " {}", node.attrs())?;
        }
        Ok(())
    }

    /// Kind-specific contribution to lowering.
    fn lower(&self, attrs: &Attributes) -> Result<Kernel, String>;
}
