//! Operator nodes and node identities.

use super::attr::{AttrValue, Attributes};
use super::operator::{Arity, Operator};
use crate::pipeline::program::Kernel;
use std::fmt;
use std::sync::Arc;

/// Stable identity of a node inside one graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        id.clone()
    }
}

/// A single unit of computation.
///
/// Nodes are only built by [`OperatorRegistry::create`](super::OperatorRegistry::create);
/// the kind name is fixed at construction. Edges are owned by the graph.
#[derive(Clone)]
pub struct OperatorNode {
    kind: String,
    attrs: Attributes,
    op: Arc<dyn Operator>,
}

impl OperatorNode {
    pub(crate) fn new(kind: &str, op: Arc<dyn Operator>, attrs: Attributes) -> Self {
        Self {
            kind: kind.to_string(),
            attrs,
            op,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: AttrValue) -> Option<AttrValue> {
        self.attrs.set(name, value)
    }

    pub fn arity(&self) -> Arity {
        self.op.arity()
    }

    pub fn operator(&self) -> &dyn Operator {
        self.op.as_ref()
    }

    /// Validate the node against its kind's contract.
    ///
    /// `inputs` and `outputs` are the connected slot indices, sorted and
    /// deduplicated. Returns one message per problem found.
    pub fn validate(&self, inputs: &[u32], outputs: &[u32]) -> Vec<String> {
        let mut problems = Vec::new();
        let arity = self.arity();

        let input_count = inputs.len() as u32;
        if !arity.accepts_inputs(input_count) {
            problems.push(format!(
                "{} expects {}, found {} connected input(s)",
                self.kind, arity, input_count
            ));
        }
        if let Some(gap) = (0..input_count).find(|slot| !inputs.contains(slot)) {
            problems.push(format!("input slot {gap} is not connected"));
        }

        let output_count = outputs.len() as u32;
        if !arity.accepts_outputs(output_count) {
            problems.push(format!(
                "{} expects {}, found {} connected output(s)",
                self.kind, arity, output_count
            ));
        }

        for spec in self.op.attr_specs() {
            match self.attrs.get(spec.name) {
                None if spec.required => {
                    problems.push(format!("missing required attribute '{}'", spec.name));
                }
                Some(value) if !value.satisfies(spec.kind) => {
                    problems.push(format!(
                        "attribute '{}' must be {}, found {}",
                        spec.name,
                        spec.kind,
                        value.kind()
                    ));
                }
                _ => {}
            }
        }

        if problems.is_empty() {
            if let Err(reason) = self.op.check(&self.attrs) {
                problems.push(reason);
            }
        }

        problems
    }

    /// Lower this node to its kernel.
    pub fn lower(&self) -> Result<Kernel, String> {
        self.op.lower(&self.attrs)
    }
}

/// Structural equality: kind and attributes.
impl PartialEq for OperatorNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.attrs == other.attrs
    }
}

impl fmt::Debug for OperatorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorNode")
            .field("kind", &self.kind)
            .field("attrs", &self.attrs)
            .finish()
    }
}

impl fmt::Display for OperatorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.op.describe(self, f)
    }
}
