// This module implements the pass pipeline. A Pass transforms or inspects the compute graph
// and reports a tagged outcome instead of panicking. The PassManager runs passes in order,
// each one against a working copy of the graph: the copy replaces the real graph only when
// the pass reports success and the copy still validates, so a failing pass never leaves a
// half-transformed graph behind. The program and artifact slots of the PassContext are
// restored the same way. Fatal passes abort the run with PassFailure; non-fatal ones turn
// their failure into a diagnostic and the pipeline moves on. The cancellation flag is checked
// before and after every pass.

//! Pass trait, pass context and the transactional pass manager.

use super::artifact::Artifact;
use super::program::Program;
use crate::core::{CompilationSession, CompileError, CompileResult};
use crate::ir::{ComputeGraph, OperatorRegistry};
use crate::target::TargetDescriptor;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// A message produced while compiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub pass: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self { severity, pass: None, message: message.into() }
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::new(Severity::Note, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    fn in_pass(mut self, pass: &str) -> Self {
        self.pass.get_or_insert_with(|| pass.to_string());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pass {
            Some(pass) => write!(f, "{} [{}]: {}", self.severity, pass, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Result of running one pass.
#[derive(Debug)]
pub enum PassOutcome {
    Changed,
    Unchanged,
    /// The pass succeeded and has something to report. `changed` tells the
    /// manager whether the working copy must be validated and swapped in.
    Diagnostic { diagnostic: Diagnostic, changed: bool },
    Failed(CompileError),
}

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Everything a pass may read or fill in besides the graph.
pub struct PassContext<'run, 'arena> {
    pub target: &'run TargetDescriptor,
    pub registry: &'run OperatorRegistry,
    pub cancel: &'run CancellationFlag,
    pub session: &'run CompilationSession<'arena>,
    pub program: Option<Program>,
    pub artifact: Option<Artifact>,
    diagnostics: Vec<Diagnostic>,
}

impl<'run, 'arena> PassContext<'run, 'arena> {
    pub fn new(
        target: &'run TargetDescriptor,
        registry: &'run OperatorRegistry,
        cancel: &'run CancellationFlag,
        session: &'run CompilationSession<'arena>,
    ) -> Self {
        Self {
            target,
            registry,
            cancel,
            session,
            program: None,
            artifact: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Record a diagnostic. The driver reports them all once the run ends.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        log::debug!("Recorded {}", diagnostic);
        self.diagnostics.push(diagnostic);
    }
}

/// A graph transformation or analysis step.
pub trait Pass {
    fn name(&self) -> &'static str;

    /// Whether a failure of this pass aborts the run.
    fn is_fatal(&self) -> bool {
        true
    }

    fn run(&self, graph: &mut ComputeGraph, ctx: &mut PassContext<'_, '_>) -> PassOutcome;
}

/// Ordered list of passes run transactionally.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pass: impl Pass + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn with(mut self, pass: impl Pass + 'static) -> Self {
        self.add(pass);
        self
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Run every pass over `graph`.
    ///
    /// On error the graph, program and artifact are left as the last
    /// successful pass produced them.
    pub fn run(&self, graph: &mut ComputeGraph, ctx: &mut PassContext<'_, '_>) -> CompileResult<()> {
        for pass in &self.passes {
            self.run_one(pass.as_ref(), graph, ctx)?;
        }
        Ok(())
    }

    fn run_one(
        &self,
        pass: &dyn Pass,
        graph: &mut ComputeGraph,
        ctx: &mut PassContext<'_, '_>,
    ) -> CompileResult<()> {
        let name = pass.name();
        if ctx.is_cancelled() {
            return Err(CompileError::Cancelled { pass: name.to_string() });
        }

        log::debug!("Running pass {}", name);
        ctx.session.begin_pass(name);
        let saved_program = ctx.program.clone();
        let saved_artifact = ctx.artifact.clone();
        let mut working = graph.clone();

        let outcome = pass.run(&mut working, ctx);
        let result = if ctx.is_cancelled() {
            Err(CompileError::Cancelled { pass: name.to_string() })
        } else {
            match outcome {
                PassOutcome::Changed => commit(&working).map(|()| (true, None)),
                PassOutcome::Unchanged => Ok((false, None)),
                PassOutcome::Diagnostic { diagnostic, changed } => {
                    let checked = if changed { commit(&working) } else { Ok(()) };
                    checked.map(|()| (changed, Some(diagnostic.in_pass(name))))
                }
                PassOutcome::Failed(err) => Err(err),
            }
        };

        match result {
            Ok((changed, diagnostic)) => {
                ctx.session.end_pass(true);
                if changed {
                    *graph = working;
                }
                if let Some(diagnostic) = diagnostic {
                    ctx.report(diagnostic);
                }
                log::debug!("Pass {} succeeded ({})", name, if changed { "changed" } else { "unchanged" });
                Ok(())
            }
            Err(err) => {
                ctx.session.end_pass(false);
                ctx.program = saved_program;
                ctx.artifact = saved_artifact;
                if let CompileError::Cancelled { .. } = err {
                    return Err(err);
                }
                if pass.is_fatal() {
                    Err(CompileError::PassFailure {
                        pass: name.to_string(),
                        cause: err.to_string(),
                    })
                } else {
                    ctx.report(Diagnostic::warning(err.to_string()).in_pass(name));
                    Ok(())
                }
            }
        }
    }
}

fn commit(working: &ComputeGraph) -> CompileResult<()> {
    working.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AttrValue, Attributes, NodeId};
    use crate::target;
    use bumpalo::Bump;

    struct Breaks {
        fatal: bool,
    }

    impl Pass for Breaks {
        fn name(&self) -> &'static str {
            "breaks"
        }

        fn is_fatal(&self) -> bool {
            self.fatal
        }

        fn run(&self, graph: &mut ComputeGraph, _ctx: &mut PassContext<'_, '_>) -> PassOutcome {
            // Half-way through a rewrite, then give up.
            let _ = graph.remove_node(&NodeId::from("y"));
            PassOutcome::Failed(CompileError::Lowering {
                node: "y".to_string(),
                reason: "unsupported".to_string(),
            })
        }
    }

    struct Corrupts;

    impl Pass for Corrupts {
        fn name(&self) -> &'static str {
            "corrupts"
        }

        fn run(&self, graph: &mut ComputeGraph, _ctx: &mut PassContext<'_, '_>) -> PassOutcome {
            let _ = graph.remove_node(&NodeId::from("out"));
            PassOutcome::Changed
        }
    }

    fn graph(registry: &OperatorRegistry) -> ComputeGraph {
        let mut graph = ComputeGraph::new("g");
        let shape = Attributes::new().with("shape", AttrValue::Ints(vec![1]));
        graph.add_node("x", registry.create("Input", shape).unwrap()).unwrap();
        graph.add_node("y", registry.create("Acos", Attributes::new()).unwrap()).unwrap();
        graph.add_node("out", registry.create("Output", Attributes::new()).unwrap()).unwrap();
        graph.connect(&"x".into(), 0, &"y".into(), 0).unwrap();
        graph.connect(&"y".into(), 0, &"out".into(), 0).unwrap();
        graph
    }

    fn run(manager: &PassManager, cancel: &CancellationFlag) -> (ComputeGraph, ComputeGraph, CompileResult<()>, Vec<Diagnostic>) {
        let registry = OperatorRegistry::with_builtins().unwrap();
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let target = target::host();
        let mut ctx = PassContext::new(&target, &registry, cancel, &session);
        let original = graph(&registry);
        let mut graph = original.clone();
        let result = manager.run(&mut graph, &mut ctx);
        (original, graph, result, ctx.take_diagnostics())
    }

    #[test]
    fn test_fatal_failure_leaves_graph_untouched() {
        let manager = PassManager::new().with(Breaks { fatal: true });
        let (original, graph, result, _) = run(&manager, &CancellationFlag::new());
        assert_eq!(graph, original);
        match result.unwrap_err() {
            CompileError::PassFailure { pass, cause } => {
                assert_eq!(pass, "breaks");
                assert!(cause.contains("unsupported"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_non_fatal_failure_becomes_diagnostic() {
        let manager = PassManager::new().with(Breaks { fatal: false });
        let (original, graph, result, diagnostics) = run(&manager, &CancellationFlag::new());
        result.unwrap();
        assert_eq!(graph, original);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert_eq!(diagnostics[0].pass.as_deref(), Some("breaks"));
    }

    #[test]
    fn test_invalid_result_is_not_committed() {
        let manager = PassManager::new().with(Corrupts);
        let (original, graph, result, _) = run(&manager, &CancellationFlag::new());
        assert!(matches!(result, Err(CompileError::PassFailure { .. })));
        assert_eq!(graph, original);
    }

    #[test]
    fn test_cancelled_before_pass() {
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let manager = PassManager::new().with(Corrupts);
        let (original, graph, result, _) = run(&manager, &cancel);
        assert_eq!(result, Err(CompileError::Cancelled { pass: "corrupts".to_string() }));
        assert_eq!(graph, original);
    }
}
