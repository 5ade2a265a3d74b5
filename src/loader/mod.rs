//! Model loaders.
//!
//! A loader turns a model description into a populated graph whose nodes come
//! from an [`OperatorRegistry`]. The graph is not validated here; that is the
//! driver's first step.

mod parser;

pub use parser::parse_graph;

use crate::core::CompileResult;
use crate::ir::{ComputeGraph, OperatorRegistry};
use std::path::Path;

/// Source of compute graphs.
pub trait ModelLoader {
    fn load_str(&self, source: &str, registry: &OperatorRegistry) -> CompileResult<ComputeGraph>;

    fn load_file(&self, path: &Path, registry: &OperatorRegistry) -> CompileResult<ComputeGraph> {
        let source = std::fs::read_to_string(path)?;
        log::debug!("Loading {}", path.display());
        self.load_str(&source, registry)
    }
}

/// Loader for the `graph name { ... }` text format.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLoader;

impl ModelLoader for TextLoader {
    fn load_str(&self, source: &str, registry: &OperatorRegistry) -> CompileResult<ComputeGraph> {
        parse_graph(source, registry)
    }
}
