use nnlower::backend::{Interpreter, Tensor};
use nnlower::driver::{BufferSink, FileSink, RunState};
use nnlower::ir::OperatorRegistry;
use nnlower::loader::{ModelLoader, TextLoader};
use nnlower::pipeline::{Artifact, Pass, PassContext, PassManager, PassOutcome};
use nnlower::{CompileError, CompileOptions, ComputeGraph, Driver, NodeId, RunMode, Status};

const ACOS_NET: &str = include_str!("models/acos.ngt");
const CONV_BLOCK: &str = include_str!("models/conv_block.ngt");

fn load(registry: &OperatorRegistry, source: &str) -> ComputeGraph {
    TextLoader.load_str(source, registry).unwrap()
}

fn approx(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-5, "{actual:?} vs {expected:?}");
    }
}

#[test]
fn test_execute_acos() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let graph = load(&registry, ACOS_NET);
    let driver = Driver::new(&registry);
    let outcome = driver.run(&CompileOptions::default(), graph, &mut BufferSink::new());

    assert_eq!(outcome.status, Status::Succeeded);
    assert_eq!(
        outcome.trace,
        vec![
            RunState::Loaded,
            RunState::Validated,
            RunState::TargetResolved,
            RunState::Lowering,
            RunState::Executed,
            RunState::Succeeded
        ]
    );
    let execution = outcome.execution().unwrap();
    let result = &execution.outputs[&NodeId::from("out")];
    assert_eq!(result.shape(), &[2, 2]);
    let pi = std::f32::consts::PI;
    approx(result.data(), &[0.0, pi / 2.0, pi, pi / 3.0]);
    assert_eq!(outcome.stats.steps_executed, 3);
}

#[test]
fn test_empty_pipeline_returns_graph() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let graph = load(&registry, ACOS_NET);
    let driver = Driver::new(&registry).with_pipeline(PassManager::new());
    let options = CompileOptions::default().with_mode(RunMode::Emit);
    let mut sink = BufferSink::new();
    let outcome = driver.run(&options, graph.clone(), &mut sink);

    assert_eq!(outcome.status, Status::Succeeded);
    match sink.artifact {
        Some(Artifact::Graph(emitted)) => assert_eq!(emitted, graph),
        other => panic!("expected a graph artifact, got {other:?}"),
    }
    assert_eq!(sink.bytes, graph.to_string().into_bytes());
}

#[test]
fn test_execute_with_empty_pipeline_lowers_graph() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let graph = load(&registry, ACOS_NET);
    let driver = Driver::new(&registry).with_pipeline(PassManager::new());
    let outcome = driver.run(&CompileOptions::default(), graph.clone(), &mut BufferSink::new());

    assert_eq!(outcome.status, Status::Succeeded);
    assert!(outcome.diagnostics.is_empty());
    match &outcome.artifact {
        Some(Artifact::Graph(artifact)) => assert_eq!(artifact, &graph),
        other => panic!("expected a graph artifact, got {other:?}"),
    }
    let result = &outcome.execution().unwrap().outputs[&NodeId::from("out")];
    assert_eq!(result.data()[0], 0.0);
}

struct Vandal;

impl Pass for Vandal {
    fn name(&self) -> &'static str {
        "vandal"
    }

    fn run(&self, graph: &mut ComputeGraph, _ctx: &mut PassContext<'_, '_>) -> PassOutcome {
        if let Err(err) = graph.remove_node(&NodeId::from("y")) {
            return PassOutcome::Failed(err);
        }
        PassOutcome::Failed(CompileError::Lowering {
            node: "y".to_string(),
            reason: "gave up".to_string(),
        })
    }
}

#[test]
fn test_fatal_pass_leaves_graph_untouched() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let graph = load(&registry, ACOS_NET);
    let driver = Driver::new(&registry).with_pipeline(PassManager::new().with(Vandal));
    let outcome = driver.run(&CompileOptions::default(), graph.clone(), &mut BufferSink::new());

    match &outcome.status {
        Status::Failed { reason, pass } => {
            assert_eq!(pass.as_deref(), Some("vandal"));
            assert!(matches!(reason, CompileError::PassFailure { .. }));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(outcome.graph, graph);
    assert_eq!(outcome.trace.last(), Some(&RunState::Failed));
    assert_eq!(outcome.stats.passes_failed, 1);
}

#[test]
fn test_invalid_graph_stops_before_target() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let graph = load(&registry, "graph broken {\n  %x = Input {shape = [1]}\n  %y = Acos\n  %out = Output %x\n}\n");
    let outcome = Driver::new(&registry).run(&CompileOptions::default(), graph, &mut BufferSink::new());

    assert!(matches!(
        outcome.status,
        Status::Failed { reason: CompileError::GraphInvalid { .. }, pass: None }
    ));
    assert_eq!(outcome.trace, vec![RunState::Loaded, RunState::Failed]);
    assert!(outcome.target.is_none());
}

#[test]
fn test_unknown_architecture_unresolvable() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let graph = load(&registry, ACOS_NET);
    let options = CompileOptions::default().with_arch("sparc");
    let outcome = Driver::new(&registry).run(&options, graph, &mut BufferSink::new());
    assert!(matches!(
        outcome.status,
        Status::Failed { reason: CompileError::TargetUnresolvable { .. }, .. }
    ));
}

#[test]
fn test_malformed_quadruple_unresolvable() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let graph = load(&registry, ACOS_NET);
    let options = CompileOptions::default().with_quadruple("x86_64--linux");
    let outcome = Driver::new(&registry).run(&options, graph, &mut BufferSink::new());
    assert!(matches!(
        outcome.status,
        Status::Failed { reason: CompileError::TargetUnresolvable { .. }, .. }
    ));
}

#[test]
fn test_cancelled_run_names_pass() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let graph = load(&registry, ACOS_NET);
    let driver = Driver::new(&registry);
    driver.cancellation().cancel();
    let outcome = driver.run(&CompileOptions::default(), graph, &mut BufferSink::new());

    match outcome.status {
        Status::Failed { reason: CompileError::Cancelled { pass }, pass: named } => {
            assert_eq!(pass, "verify");
            assert_eq!(named.as_deref(), Some("verify"));
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[test]
fn test_emit_program_listing() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let graph = load(&registry, ACOS_NET);
    let options = CompileOptions::default()
        .with_quadruple("armv7a-none-eabi")
        .with_mode(RunMode::Emit);
    let mut sink = BufferSink::new();
    let outcome = Driver::new(&registry).run(&options, graph, &mut sink);

    assert!(outcome.is_success());
    assert_eq!(outcome.backend, Some("interpreter"));
    let listing = String::from_utf8(sink.bytes).unwrap();
    assert!(listing.starts_with("program acos_net"));
    assert!(listing.contains("%y = Acos"));
}

#[test]
fn test_conv_block_folds_and_executes() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let graph = load(&registry, CONV_BLOCK);
    let feed = Tensor::new(vec![1, 1, 3, 3], (1..=9).map(|v| v as f32).collect()).unwrap();
    let driver = Driver::new(&registry).with_interpreter(Interpreter::new().with_feed("x", feed));
    let outcome = driver.run(&CompileOptions::default(), graph, &mut BufferSink::new());

    assert_eq!(outcome.status, Status::SucceededWithDiagnostics);
    assert!(outcome.diagnostics.iter().any(|d| d.pass.as_deref() == Some("fold-constants")));

    // The identity and the bias inputs are gone, the folded bias remains.
    let final_graph = &outcome.graph;
    assert!(!final_graph.contains(&NodeId::from("keep")));
    assert!(!final_graph.contains(&NodeId::from("b0")));
    assert_eq!(final_graph.node(&NodeId::from("bias")).unwrap().kind(), "Constant");
    assert_eq!(final_graph.node_count(), 7);

    let result = &outcome.execution().unwrap().outputs[&NodeId::from("out")];
    assert_eq!(result.shape(), &[1, 2]);
    approx(result.data(), &[10.5, 0.0]);
}

#[test]
fn test_file_sink_writes_artifact() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let graph = load(&registry, ACOS_NET);
    let path = std::env::temp_dir().join(format!("nnlower-driver-{}.lst", std::process::id()));
    let options = CompileOptions::default()
        .with_arch("aarch64")
        .with_mode(RunMode::Emit)
        .with_output(&path);
    let mut sink = FileSink::new(&options.output);
    let outcome = Driver::new(&registry).run(&options, graph, &mut sink);

    assert!(outcome.is_success());
    let written = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert!(written.contains("Acos"));
}

#[test]
fn test_zero_sized_conv_kernel_fails_lowering() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let source = "graph conv0 {
  %x = Input {shape = [1, 1, 3, 3]}
  %w = Constant {shape = [1, 1, 0, 3], value = []}
  %c = Conv %x, %w
  %out = Output %c
}
";
    let graph = load(&registry, source);
    let outcome = Driver::new(&registry).run(&CompileOptions::default(), graph, &mut BufferSink::new());

    match &outcome.status {
        Status::Failed { reason: CompileError::PassFailure { cause, .. }, pass } => {
            assert_eq!(pass.as_deref(), Some("lower"));
            assert!(cause.contains("does not fit"), "{cause}");
        }
        other => panic!("expected lowering failure, got {other:?}"),
    }
}

#[test]
fn test_oversized_input_shape_is_invalid() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let source = "graph huge {
  %x = Input {shape = [4294967296, 4294967296, 4294967296]}
  %y = Acos %x
  %out = Output %y
}
";
    let graph = load(&registry, source);
    let outcome = Driver::new(&registry).run(&CompileOptions::default(), graph, &mut BufferSink::new());

    match &outcome.status {
        Status::Failed { reason: CompileError::GraphInvalid { violations }, pass: None } => {
            assert_eq!(violations[0].node.as_deref(), Some("x"));
        }
        other => panic!("expected invalid graph, got {other:?}"),
    }
}
