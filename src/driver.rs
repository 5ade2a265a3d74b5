// This module implements the compilation driver, the state machine that takes a loaded graph
// to an emitted or executed artifact. A run moves through Loaded, Validated, TargetResolved
// and Lowering, then either hands the artifact to an output sink (emit mode) or runs it on the
// interpreter (execute mode), and ends Succeeded or Failed. In execute mode a pipeline that
// stops at the graph artifact has the graph lowered on the spot. Each transition is recorded in the
// outcome's trace. Graph validation failures stop the run before a target is resolved; target
// problems, including malformed quadruples and architectures no backend serves, surface as
// TargetUnresolvable; a fatal pass failure names the pass. Diagnostics from non-fatal passes
// accumulate and are logged once at the end. Every run owns a fresh bumpalo-backed session
// whose statistics are returned with the outcome.

//! Compilation driver, run configuration and output sinks.

use crate::backend::{self, Backend, Execution, Interpreter};
use crate::core::{CompilationSession, CompileError, CompileResult, SessionStats};
use crate::ir::{global_registry, ComputeGraph, OperatorRegistry};
use crate::pipeline::passes::lower_graph;
use crate::pipeline::{Artifact, CancellationFlag, Diagnostic, PassContext, PassManager, Severity};
use crate::target::{self, TargetDescriptor};
use bumpalo::Bump;
use std::fmt;
use std::path::{Path, PathBuf};

/// Output name used when none is given.
pub const DEFAULT_OUTPUT_NAME: &str = "out.nnl";

/// What to do with the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Write the artifact to the output sink.
    Emit,
    /// Run the artifact immediately.
    #[default]
    Execute,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Emit => "emit",
            RunMode::Execute => "execute",
        })
    }
}

/// Output verbosity. 0 is silent, 1 the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Verbosity(pub u32);

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity(1)
    }
}

impl Verbosity {
    pub const QUIET: Verbosity = Verbosity(0);

    /// Combine the command line flags: `--verbose=N`, then the `-v` count,
    /// then `--quiet`, each overriding the previous.
    pub fn from_flags(verbose: Option<u32>, v_count: u8, quiet: bool) -> Self {
        let mut level = Verbosity::default();
        if let Some(n) = verbose {
            level = Verbosity(n);
        }
        if v_count > 0 {
            level = Verbosity(u32::from(v_count));
        }
        if quiet {
            level = Verbosity::QUIET;
        }
        level
    }

    pub fn level(self) -> u32 {
        self.0
    }

    pub fn log_filter(self) -> log::LevelFilter {
        match self.0 {
            0 => log::LevelFilter::Off,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            3 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

/// Run configuration.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub quadruple: Option<String>,
    pub arch: Option<String>,
    pub mode: RunMode,
    pub output: PathBuf,
    pub verbosity: Verbosity,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            quadruple: None,
            arch: None,
            mode: RunMode::default(),
            output: PathBuf::from(DEFAULT_OUTPUT_NAME),
            verbosity: Verbosity::default(),
        }
    }
}

impl CompileOptions {
    pub fn with_quadruple(mut self, quadruple: impl Into<String>) -> Self {
        self.quadruple = Some(quadruple.into());
        self
    }

    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = Some(arch.into());
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }
}

/// States a run passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Loaded,
    Validated,
    TargetResolved,
    Lowering,
    Emitted,
    Executed,
    Succeeded,
    Failed,
}

/// Final verdict of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Succeeded,
    SucceededWithDiagnostics,
    Failed { reason: CompileError, pass: Option<String> },
}

impl Status {
    pub fn is_success(&self) -> bool {
        !matches!(self, Status::Failed { .. })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Succeeded => f.write_str("succeeded"),
            Status::SucceededWithDiagnostics => f.write_str("succeeded with diagnostics"),
            Status::Failed { reason, pass: Some(pass) } => write!(f, "failed in {pass}: {reason}"),
            Status::Failed { reason, pass: None } => write!(f, "failed: {reason}"),
        }
    }
}

/// What happened to the artifact.
#[derive(Debug, Clone)]
pub enum Emission {
    Written { bytes: usize },
    Executed(Execution),
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub status: Status,
    pub diagnostics: Vec<Diagnostic>,
    pub trace: Vec<RunState>,
    pub target: Option<TargetDescriptor>,
    pub backend: Option<&'static str>,
    /// The graph as the last successful pass left it.
    pub graph: ComputeGraph,
    pub artifact: Option<Artifact>,
    pub emission: Option<Emission>,
    pub stats: SessionStats,
}

impl CompileOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn execution(&self) -> Option<&Execution> {
        match &self.emission {
            Some(Emission::Executed(execution)) => Some(execution),
            _ => None,
        }
    }
}

/// Destination of emitted artifacts.
pub trait OutputSink {
    /// Store `artifact`, returning the number of bytes written.
    fn write(&mut self, artifact: &Artifact) -> CompileResult<usize>;
}

/// Writes artifacts to a file.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputSink for FileSink {
    fn write(&mut self, artifact: &Artifact) -> CompileResult<usize> {
        let bytes = artifact.to_bytes();
        std::fs::write(&self.path, &bytes)?;
        log::info!("Wrote {} ({} bytes)", self.path.display(), bytes.len());
        Ok(bytes.len())
    }
}

/// Keeps artifacts in memory.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    pub bytes: Vec<u8>,
    pub artifact: Option<Artifact>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for BufferSink {
    fn write(&mut self, artifact: &Artifact) -> CompileResult<usize> {
        self.bytes = artifact.to_bytes();
        self.artifact = Some(artifact.clone());
        Ok(self.bytes.len())
    }
}

/// Runs compilations.
pub struct Driver<'r> {
    registry: &'r OperatorRegistry,
    backends: Vec<Box<dyn Backend>>,
    pipeline: Option<PassManager>,
    interpreter: Interpreter,
    cancel: CancellationFlag,
}

impl Default for Driver<'static> {
    fn default() -> Self {
        Self::new(global_registry())
    }
}

impl<'r> Driver<'r> {
    pub fn new(registry: &'r OperatorRegistry) -> Self {
        Self {
            registry,
            backends: backend::default_backends(),
            pipeline: None,
            interpreter: Interpreter::new(),
            cancel: CancellationFlag::new(),
        }
    }

    /// Run `pipeline` instead of the backend's.
    pub fn with_pipeline(mut self, pipeline: PassManager) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Replace the backend list, in selection order.
    pub fn with_backends(mut self, backends: Vec<Box<dyn Backend>>) -> Self {
        self.backends = backends;
        self
    }

    /// Engine used in execute mode, with its feeds.
    pub fn with_interpreter(mut self, interpreter: Interpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Flag that cancels runs of this driver when set.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Compile `graph` and emit or execute the result.
    pub fn run(&self, options: &CompileOptions, graph: ComputeGraph, sink: &mut dyn OutputSink) -> CompileOutcome {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut run = Run {
            trace: vec![RunState::Loaded],
            diagnostics: Vec::new(),
            target: None,
            backend: None,
            graph,
            artifact: None,
            emission: None,
        };
        log::info!("Compiling graph {} ({} nodes)", run.graph.name(), run.graph.node_count());

        let result = self.drive(options, &session, &mut run, sink);
        let status = match result {
            Ok(()) => {
                run.trace.push(RunState::Succeeded);
                if run.diagnostics.is_empty() {
                    Status::Succeeded
                } else {
                    Status::SucceededWithDiagnostics
                }
            }
            Err(reason) => {
                run.trace.push(RunState::Failed);
                let pass = match &reason {
                    CompileError::PassFailure { pass, .. } | CompileError::Cancelled { pass } => Some(pass.clone()),
                    _ => None,
                };
                Status::Failed { reason, pass }
            }
        };

        for diagnostic in &run.diagnostics {
            match diagnostic.severity {
                Severity::Error | Severity::Warning => log::warn!("{}", diagnostic),
                Severity::Note => log::info!("{}", diagnostic),
            }
        }
        log::info!("Run {}", status);

        CompileOutcome {
            status,
            diagnostics: run.diagnostics,
            trace: run.trace,
            target: run.target,
            backend: run.backend,
            graph: run.graph,
            artifact: run.artifact,
            emission: run.emission,
            stats: session.stats(),
        }
    }

    fn drive(
        &self,
        options: &CompileOptions,
        session: &CompilationSession<'_>,
        run: &mut Run,
        sink: &mut dyn OutputSink,
    ) -> CompileResult<()> {
        // Loaded -> Validated
        session.record_nodes_validated(run.graph.node_count());
        if options.verbosity.level() >= 3 {
            run.graph.validate_all()?;
        } else {
            run.graph.validate()?;
        }
        run.trace.push(RunState::Validated);

        // Validated -> TargetResolved
        let target = target::resolve(options.quadruple.as_deref(), options.arch.as_deref()).map_err(|err| match err {
            CompileError::MalformedQuadruple { .. } => CompileError::TargetUnresolvable { reason: err.to_string() },
            other => other,
        })?;
        let selected = backend::select(&self.backends, &target, options.mode);
        let owned_pipeline;
        let pipeline = match (&self.pipeline, selected) {
            (Some(pipeline), selected) => {
                run.backend = selected.ok().map(|backend| backend.name());
                pipeline
            }
            (None, selected) => {
                let backend = selected?;
                run.backend = Some(backend.name());
                owned_pipeline = backend.build_pipeline(&target, options.mode);
                &owned_pipeline
            }
        };
        log::debug!("Target {} served by {}", target, run.backend.unwrap_or("a custom pipeline"));
        run.trace.push(RunState::TargetResolved);

        // TargetResolved -> Lowering
        run.trace.push(RunState::Lowering);
        let mut ctx = PassContext::new(&target, self.registry, &self.cancel, session);
        let passes = pipeline.run(&mut run.graph, &mut ctx);
        run.diagnostics.extend(ctx.take_diagnostics());
        let artifact = ctx.artifact.take();
        run.target = Some(target.clone());
        passes?;

        // Lowering -> Emitted | Executed
        let artifact = artifact.unwrap_or_else(|| Artifact::Graph(run.graph.clone()));
        let emission = match options.mode {
            RunMode::Emit => {
                let bytes = sink.write(&artifact)?;
                run.trace.push(RunState::Emitted);
                Some(Emission::Written { bytes })
            }
            RunMode::Execute => {
                // A pipeline that stopped at the graph is lowered here so it can still run.
                let lowered;
                let program = match artifact.program() {
                    Some(program) => program,
                    None => {
                        log::debug!("Lowering {} artifact for execution", artifact.kind());
                        lowered = lower_graph(&run.graph, &ctx)?;
                        &lowered
                    }
                };
                let execution = self.interpreter.run(program)?;
                session.record_steps_executed(execution.steps_executed);
                run.trace.push(RunState::Executed);
                Some(Emission::Executed(execution))
            }
        };
        run.artifact = Some(artifact);
        run.emission = emission;
        Ok(())
    }
}

struct Run {
    trace: Vec<RunState>,
    diagnostics: Vec<Diagnostic>,
    target: Option<TargetDescriptor>,
    backend: Option<&'static str>,
    graph: ComputeGraph,
    artifact: Option<Artifact>,
    emission: Option<Emission>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_precedence() {
        assert_eq!(Verbosity::from_flags(None, 0, false), Verbosity(1));
        assert_eq!(Verbosity::from_flags(Some(3), 0, false), Verbosity(3));
        assert_eq!(Verbosity::from_flags(Some(3), 2, false), Verbosity(2));
        assert_eq!(Verbosity::from_flags(Some(3), 2, true), Verbosity::QUIET);
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(Verbosity(0).log_filter(), log::LevelFilter::Off);
        assert_eq!(Verbosity(1).log_filter(), log::LevelFilter::Warn);
        assert_eq!(Verbosity(9).log_filter(), log::LevelFilter::Trace);
    }

    #[test]
    fn test_default_options() {
        let options = CompileOptions::default();
        assert_eq!(options.output, PathBuf::from(DEFAULT_OUTPUT_NAME));
        assert_eq!(options.mode, RunMode::Execute);
        assert!(options.quadruple.is_none() && options.arch.is_none());
    }
}
