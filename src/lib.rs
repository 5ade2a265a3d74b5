//! nnlower - compute graph IR and target lowering.
//!
//! nnlower holds neural-network compute graphs in an extensible operator IR,
//! resolves a target from a quadruple or architecture name, and runs a
//! transactional pass pipeline that lowers the graph to a program which is
//! either executed on the built-in interpreter or emitted as an artifact
//! (a program listing, or an x86-64 ELF object).
//!
//! # Primary Usage
//!
//! ```ignore
//! use nnlower::driver::{BufferSink, CompileOptions, Driver};
//! use nnlower::ir::global_registry;
//! use nnlower::loader::parse_graph;
//!
//! let registry = global_registry();
//! let graph = parse_graph(source, registry)?;
//! let outcome = Driver::new(registry).run(&CompileOptions::default(), graph, &mut BufferSink::new());
//! assert!(outcome.is_success());
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - Attributes, operator kinds, the registry and the graph
//! - [`target`] - Quadruple parsing and target resolution
//! - [`pipeline`] - Programs, passes and the pass manager
//! - [`backend`] - Interpreter and x86-64 backends
//! - [`driver`] - Run state machine, options and output sinks
//! - [`loader`] - Textual graph loader
//! - [`core`] - Errors and the per-run session

pub mod backend;
pub mod core;
pub mod driver;
pub mod ir;
pub mod loader;
pub mod pipeline;
pub mod target;

pub use core::{CompilationSession, CompileError, CompileResult, SessionStats};
pub use driver::{CompileOptions, CompileOutcome, Driver, RunMode, Status};
pub use ir::{global_registry, ComputeGraph, NodeId, OperatorNode, OperatorRegistry};
pub use target::TargetDescriptor;
