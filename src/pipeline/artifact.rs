//! Compilation artifacts.

use super::program::Program;
use crate::ir::ComputeGraph;

/// What a compilation run produced.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// The transformed graph, when no pass lowered it.
    Graph(ComputeGraph),
    /// A portable lowered program.
    Program(Program),
    /// A native relocatable object plus the program it dispatches over.
    Object { bytes: Vec<u8>, program: Program },
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Graph(_) => "graph",
            Artifact::Program(_) => "program",
            Artifact::Object { .. } => "object",
        }
    }

    /// The program behind this artifact, if it was lowered.
    pub fn program(&self) -> Option<&Program> {
        match self {
            Artifact::Graph(_) => None,
            Artifact::Program(program) | Artifact::Object { program, .. } => Some(program),
        }
    }

    /// Bytes written by file and buffer sinks.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Artifact::Graph(graph) => graph.to_string().into_bytes(),
            Artifact::Program(program) => program.listing().into_bytes(),
            Artifact::Object { bytes, .. } => bytes.clone(),
        }
    }
}
