//! Compute graph intermediate representation: attributes, operator kinds,
//! the kind registry and the graph container.

pub mod attr;
pub mod graph;
pub mod node;
pub mod operator;
pub mod ops;
pub mod registry;

pub use attr::{AttrKind, AttrSpec, AttrValue, Attributes};
pub use graph::{ComputeGraph, Edge, TopologicalOrder};
pub use node::{NodeId, OperatorNode};
pub use operator::{Arity, Operator};
pub use registry::{global_registry, install_global_registry, OperatorFactory, OperatorRegistry};
