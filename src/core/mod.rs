// This module gathers the infrastructure shared by every other part of nnlower: the error
// taxonomy with its Violation records, and the arena-backed per-run compilation session
// with its statistics. Nothing here knows about operators, targets or passes.

//! Core nnlower infrastructure.

pub mod error;
pub mod session;

pub use error::{CompileError, CompileResult, SlotDirection, Violation};
pub use session::{CompilationSession, SessionStats};
