//! Lowering pipeline: programs, artifacts, the pass manager and the
//! built-in passes.

pub mod artifact;
pub mod pass;
pub mod passes;
pub mod program;

pub use artifact::Artifact;
pub use pass::{CancellationFlag, Diagnostic, Pass, PassContext, PassManager, PassOutcome, Severity};
pub use program::{Kernel, Program, Step, ValueRef};
