//! Code generation backends.
//!
//! A backend declares which targets it serves and assembles the pass
//! pipeline for a run. The driver picks the first backend that supports the
//! resolved target in the requested run mode.

pub mod interp;
pub mod x64;

use crate::core::{CompileError, CompileResult};
use crate::driver::RunMode;
use crate::pipeline::passes::{EliminateIdentity, EmitProgram, FoldConstants, LowerToProgram, VerifyGraph};
use crate::pipeline::PassManager;
use crate::target::TargetDescriptor;

pub use interp::{Execution, Interpreter, Tensor};

/// A family of targets sharing one pipeline.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, target: &TargetDescriptor, mode: RunMode) -> bool;

    fn build_pipeline(&self, target: &TargetDescriptor, mode: RunMode) -> PassManager;
}

/// Passes every backend runs before emission.
pub fn front_passes() -> PassManager {
    PassManager::new()
        .with(VerifyGraph)
        .with(EliminateIdentity)
        .with(FoldConstants)
        .with(LowerToProgram)
}

const PORTABLE_ARCHS: &[&str] = &[
    "x86", "x86_64", "i386", "i486", "i586", "i686", "arm", "armeb", "thumb", "aarch64",
    "riscv32", "riscv64", "wasm32", "mips", "powerpc64",
];

/// Runs lowered programs on the host interpreter; emits program listings.
#[derive(Debug, Default)]
pub struct InterpreterBackend;

impl Backend for InterpreterBackend {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn supports(&self, target: &TargetDescriptor, _mode: RunMode) -> bool {
        PORTABLE_ARCHS.contains(&target.arch.as_str())
    }

    fn build_pipeline(&self, _target: &TargetDescriptor, _mode: RunMode) -> PassManager {
        front_passes().with(EmitProgram)
    }
}

/// Emits x86-64 ELF objects.
#[derive(Debug, Default)]
pub struct X64Backend;

impl Backend for X64Backend {
    fn name(&self) -> &'static str {
        "x86-64"
    }

    fn supports(&self, target: &TargetDescriptor, mode: RunMode) -> bool {
        mode == RunMode::Emit && matches!(target.arch.as_str(), "x86_64" | "amd64")
    }

    fn build_pipeline(&self, _target: &TargetDescriptor, _mode: RunMode) -> PassManager {
        front_passes().with(x64::EmitX64)
    }
}

/// Built-in backends in selection order.
pub fn default_backends() -> Vec<Box<dyn Backend>> {
    vec![Box::new(X64Backend), Box::new(InterpreterBackend)]
}

/// First backend serving `target` in `mode`.
pub fn select<'b>(
    backends: &'b [Box<dyn Backend>],
    target: &TargetDescriptor,
    mode: RunMode,
) -> CompileResult<&'b dyn Backend> {
    backends
        .iter()
        .find(|backend| backend.supports(target, mode))
        .map(|backend| backend.as_ref())
        .ok_or_else(|| CompileError::TargetUnresolvable {
            reason: format!("no backend serves {} in {} mode", target, mode),
        })
}
