// This module defines the error taxonomy of the nnlower compiler using the thiserror crate.
// CompileError is the single error enum flowing through the crate. Registry errors cover
// unknown kinds, conflicting registrations and mutation after freezing. Graph errors cover
// duplicate node identities, dangling references, slot range and occupancy violations,
// rejected cyclic edges and failed validation. Target errors cover malformed quadruples and
// targets no backend can serve. Pipeline errors carry the failing pass name and its cause.
// The remaining variants belong to the textual loader, lowering, execution and emission.
// CompileResult<T> is the usual alias for Result<T, CompileError>.

//! Error types for the nnlower compiler.

use thiserror::Error;

/// One structural problem found while validating a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Node the violation was found on, if it is node-local.
    pub node: Option<String>,
    pub message: String,
}

impl Violation {
    pub fn on_node(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node: Some(node.into()),
            message: message.into(),
        }
    }

    pub fn graph(message: impl Into<String>) -> Self {
        Self {
            node: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.node {
            Some(node) => write!(f, "node '{}': {}", node, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Main error type for compilation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Unknown operator kind: {kind}")]
    UnknownKind { kind: String },

    #[error("Operator kind '{kind}' is already registered with a different factory")]
    DuplicateKindConflict { kind: String },

    #[error("Operator registry is frozen; cannot register '{kind}'")]
    RegistryFrozen { kind: String },

    #[error("Operator kind name must not be empty")]
    EmptyKind,

    #[error("Duplicate node identity: {id}")]
    DuplicateNodeIdentity { id: String },

    #[error("Dangling reference to node: {id}")]
    DanglingReference { id: String },

    #[error("Slot {slot} out of range for {direction} of node '{id}' (max {max})")]
    SlotOutOfRange {
        id: String,
        direction: SlotDirection,
        slot: u32,
        max: u32,
    },

    #[error("Input slot {slot} of node '{id}' is already connected")]
    SlotOccupied { id: String, slot: u32 },

    #[error("Edge {producer} -> {consumer} would create a cycle")]
    CycleDetected { producer: String, consumer: String },

    #[error("Graph is invalid: {}", first_violation(.violations))]
    GraphInvalid { violations: Vec<Violation> },

    #[error("Malformed quadruple '{quadruple}': {reason}")]
    MalformedQuadruple { quadruple: String, reason: String },

    #[error("Target unresolvable: {reason}")]
    TargetUnresolvable { reason: String },

    #[error("Pass '{pass}' failed: {cause}")]
    PassFailure { pass: String, cause: String },

    #[error("Compilation cancelled before pass '{pass}' completed")]
    Cancelled { pass: String },

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Lowering of node '{node}' failed: {reason}")]
    Lowering { node: String, reason: String },

    #[error("Execution failed at step {step}: {message}")]
    Execution { step: usize, message: String },

    #[error("Emission failed: {reason}")]
    Emission { reason: String },

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CompileError {
    fn from(err: std::io::Error) -> Self {
        CompileError::Io(err.to_string())
    }
}

/// Which side of a node a slot index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDirection {
    Input,
    Output,
}

impl std::fmt::Display for SlotDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotDirection::Input => write!(f, "inputs"),
            SlotDirection::Output => write!(f, "outputs"),
        }
    }
}

fn first_violation(violations: &[Violation]) -> String {
    match violations {
        [] => "no violations recorded".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_invalid_message_counts_extra_violations() {
        let err = CompileError::GraphInvalid {
            violations: vec![
                Violation::on_node("y", "expected 1 input, found 0"),
                Violation::graph("graph has no inputs"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("node 'y': expected 1 input, found 0"));
        assert!(msg.contains("and 1 more"));
    }

    #[test]
    fn test_pass_failure_names_pass() {
        let err = CompileError::PassFailure {
            pass: "lower".to_string(),
            cause: "shape mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Pass 'lower' failed: shape mismatch");
    }
}
