use nnlower::ir::OperatorRegistry;
use nnlower::loader::{ModelLoader, TextLoader};
use nnlower::CompileError;
use std::path::PathBuf;

fn model(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/models").join(name)
}

#[test]
fn test_load_acos_model() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let graph = TextLoader.load_file(&model("acos.ngt"), &registry).unwrap();
    assert_eq!(graph.name(), "acos_net");
    assert_eq!(graph.node_count(), 3);
    graph.validate().unwrap();
    // Loading creates nodes, which freezes the registry.
    assert!(registry.is_frozen());
}

#[test]
fn test_load_conv_model() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let graph = TextLoader.load_file(&model("conv_block.ngt"), &registry).unwrap();
    assert_eq!(graph.node_count(), 10);
    assert_eq!(graph.producer_of(&"conv".into(), 2).map(|(p, _)| p.as_str()), Some("bias"));
    graph.validate().unwrap();
}

#[test]
fn test_missing_file_is_io_error() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let err = TextLoader.load_file(&model("missing.ngt"), &registry).unwrap_err();
    assert!(matches!(err, CompileError::Io(_)));
}

#[test]
fn test_graph_errors_surface_from_loader() {
    let registry = OperatorRegistry::with_builtins().unwrap();
    let source = "graph g {\n  %a = Acos %b\n  %b = Acos %a\n}\n";
    let err = TextLoader.load_str(source, &registry).unwrap_err();
    assert!(matches!(err, CompileError::CycleDetected { .. }));

    let source = "graph g {\n  %x = Input {shape = [1]}\n  %y = Acos %x:1\n}\n";
    let err = TextLoader.load_str(source, &registry).unwrap_err();
    assert!(matches!(err, CompileError::SlotOutOfRange { slot: 1, .. }));
}
