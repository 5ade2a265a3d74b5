// This module implements the OperatorRegistry, the catalog mapping operator kind names to
// factory functions. Registration is idempotent for an identical factory and rejects a
// different factory under an existing kind. The registry freezes itself on the first create
// call (or an explicit freeze), after which every further registration fails loudly with
// RegistryFrozen. Frozen registries are only read, so one instance can serve any number of
// concurrent compilations. A lazily-built process-wide instance holding every built-in kind
// is available through global_registry; embedders may install their own before first use.

//! Operator kind registry.

use super::attr::Attributes;
use super::node::OperatorNode;
use super::operator::{Arity, Operator};
use super::ops;
use crate::core::{CompileError, CompileResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Constructor capability for one operator kind.
pub type OperatorFactory = fn() -> Arc<dyn Operator>;

/// Catalog of operator kinds.
#[derive(Debug, Default)]
pub struct OperatorRegistry {
    factories: HashMap<String, OperatorFactory>,
    frozen: AtomicBool,
}

impl OperatorRegistry {
    /// Create an empty, unfrozen registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in kind. The result is not frozen.
    pub fn with_builtins() -> CompileResult<Self> {
        let mut registry = Self::new();
        ops::register_builtin_operators(&mut registry)?;
        Ok(registry)
    }

    /// Register `factory` under `kind`.
    pub fn register(&mut self, kind: &str, factory: OperatorFactory) -> CompileResult<()> {
        if self.is_frozen() {
            return Err(CompileError::RegistryFrozen { kind: kind.to_string() });
        }
        if kind.is_empty() {
            return Err(CompileError::EmptyKind);
        }

        // Factories are compared by address. Identical-code folding may merge two distinct
        // factories with the same body, which then count as the same registration.
        match self.factories.get(kind) {
            Some(&existing) if std::ptr::fn_addr_eq(existing, factory) => {
                log::trace!("Kind {} registered again with the same factory", kind);
                Ok(())
            }
            Some(_) => Err(CompileError::DuplicateKindConflict { kind: kind.to_string() }),
            None => {
                self.factories.insert(kind.to_string(), factory);
                Ok(())
            }
        }
    }

    /// Build a new node of `kind`. Freezes the registry.
    pub fn create(&self, kind: &str, attrs: Attributes) -> CompileResult<OperatorNode> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| CompileError::UnknownKind { kind: kind.to_string() })?;
        self.freeze();
        Ok(OperatorNode::new(kind, factory(), attrs))
    }

    /// Arity declared by `kind`.
    pub fn arity(&self, kind: &str) -> CompileResult<Arity> {
        self.factories
            .get(kind)
            .map(|factory| factory().arity())
            .ok_or_else(|| CompileError::UnknownKind { kind: kind.to_string() })
    }

    /// Reject every further registration.
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::AcqRel) {
            log::debug!("Operator registry frozen with {} kinds", self.factories.len());
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

static GLOBAL: OnceLock<OperatorRegistry> = OnceLock::new();

/// Process-wide registry, built with every built-in kind on first use.
///
/// # Panics
///
/// Panics if the built-in kinds conflict with each other, which is a
/// configuration error in this crate.
pub fn global_registry() -> &'static OperatorRegistry {
    GLOBAL.get_or_init(|| {
        let registry = OperatorRegistry::with_builtins()
            .unwrap_or_else(|err| panic!("built-in operator registration failed: {err}"));
        registry.freeze();
        registry
    })
}

/// Install `registry` as the process-wide registry.
///
/// Fails with `RegistryFrozen` once the global registry exists, whether it was
/// installed or built lazily by [`global_registry`].
pub fn install_global_registry(registry: OperatorRegistry) -> CompileResult<&'static OperatorRegistry> {
    registry.freeze();
    let mut pending = Some(registry);
    let installed = GLOBAL.get_or_init(|| pending.take().unwrap_or_default());
    match pending {
        None => Ok(installed),
        Some(_) => Err(CompileError::RegistryFrozen { kind: "<global registry>".to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ops::{elementwise, io};

    #[test]
    fn test_register_same_factory_twice_is_noop() {
        let mut registry = OperatorRegistry::new();
        registry.register("Acos", elementwise::acos).unwrap();
        registry.register("Acos", elementwise::acos).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_copied_factory_pointer_is_same_registration() {
        let mut registry = OperatorRegistry::new();
        let factory: OperatorFactory = elementwise::acos;
        let copy = factory;
        registry.register("Acos", factory).unwrap();
        registry.register("Acos", copy).unwrap();
        assert_eq!(registry.kinds(), vec!["Acos"]);
    }

    #[test]
    fn test_register_different_factory_conflicts() {
        let mut registry = OperatorRegistry::new();
        registry.register("Acos", elementwise::acos).unwrap();
        let err = registry.register("Acos", io::output).unwrap_err();
        assert_eq!(err, CompileError::DuplicateKindConflict { kind: "Acos".to_string() });
    }

    #[test]
    fn test_empty_kind_rejected() {
        let mut registry = OperatorRegistry::new();
        assert_eq!(registry.register("", elementwise::acos), Err(CompileError::EmptyKind));
    }

    #[test]
    fn test_create_unknown_kind() {
        let registry = OperatorRegistry::new();
        let err = registry.create("Nope", Attributes::new()).unwrap_err();
        assert_eq!(err, CompileError::UnknownKind { kind: "Nope".to_string() });
    }

    #[test]
    fn test_create_freezes_registry() {
        let mut registry = OperatorRegistry::new();
        registry.register("Acos", elementwise::acos).unwrap();
        assert!(!registry.is_frozen());

        let node = registry.create("Acos", Attributes::new()).unwrap();
        assert_eq!(node.kind(), "Acos");
        assert!(registry.is_frozen());

        let err = registry.register("Output", io::output).unwrap_err();
        assert!(matches!(err, CompileError::RegistryFrozen { .. }));
    }

    #[test]
    fn test_arity_lookup() {
        let registry = OperatorRegistry::with_builtins().unwrap();
        assert_eq!(registry.arity("Acos").unwrap(), Arity::fixed(1, 1));
        assert!(registry.arity("Missing").is_err());
    }

    #[test]
    fn test_global_registry_is_frozen_and_complete() {
        let registry = global_registry();
        assert!(registry.is_frozen());
        for kind in ["Input", "Output", "Acos", "Add", "Conv", "ReduceMean", "Concat"] {
            assert!(registry.contains(kind), "missing {kind}");
        }
    }
}
