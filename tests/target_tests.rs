use nnlower::target::{host, parse_quadruple, resolve, TargetOrigin};
use nnlower::CompileError;

#[test]
fn test_quadruple_overrides_architecture() {
    let target = resolve(Some("arm-none-eabi"), Some("x86")).unwrap();
    assert_eq!(target.arch, "arm");
    assert_eq!(target.origin, TargetOrigin::Quadruple);
}

#[test]
fn test_no_flags_gives_host() {
    let target = resolve(None, None).unwrap();
    assert_eq!(target, host());
    assert_eq!(target.origin, TargetOrigin::Host);
}

#[test]
fn test_architecture_only_leaves_fields_to_backend() {
    let target = resolve(None, Some("aarch64")).unwrap();
    assert_eq!(target.arch, "aarch64");
    assert!(target.vendor.is_none() && target.system.is_none() && target.environment.is_none());
}

#[test]
fn test_full_quadruple() {
    let target = parse_quadruple("x86_64-unknown-linux-gnu").unwrap();
    assert_eq!(target.arch, "x86_64");
    assert_eq!(target.vendor.as_deref(), Some("unknown"));
    assert_eq!(target.system.as_deref(), Some("linux"));
    assert_eq!(target.environment.as_deref(), Some("gnu"));
    assert_eq!(target.to_string(), "x86_64-unknown-linux-gnu");
}

#[test]
fn test_malformed_quadruple() {
    match resolve(Some("-unknown-linux"), None) {
        Err(CompileError::MalformedQuadruple { quadruple, .. }) => assert_eq!(quadruple, "-unknown-linux"),
        other => panic!("unexpected result {other:?}"),
    }
}
