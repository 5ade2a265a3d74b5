//! Kinds that move data without arithmetic.

use crate::ir::attr::{AttrKind, AttrSpec, Attributes};
use crate::ir::operator::{Arity, Operator};
use crate::pipeline::program::Kernel;
use std::sync::Arc;

/// Pass-through. Removed by the identity elimination pass.
#[derive(Debug)]
pub struct Identity;

impl Operator for Identity {
    fn arity(&self) -> Arity {
        Arity::fixed(1, 1)
    }

    fn lower(&self, _attrs: &Attributes) -> Result<Kernel, String> {
        Ok(Kernel::Identity)
    }
}

/// Concatenation along `axis`.
#[derive(Debug)]
pub struct Concat;

impl Operator for Concat {
    fn arity(&self) -> Arity {
        Arity::variadic_inputs(1)
    }

    fn attr_specs(&self) -> &'static [AttrSpec] {
        const SPECS: &[AttrSpec] = &[AttrSpec::required("axis", AttrKind::Int)];
        SPECS
    }

    fn lower(&self, attrs: &Attributes) -> Result<Kernel, String> {
        let axis = attrs
            .int("axis")
            .ok_or_else(|| "missing attribute 'axis'".to_string())?;
        Ok(Kernel::Concat { axis })
    }
}

pub fn identity() -> Arc<dyn Operator> {
    Arc::new(Identity)
}

pub fn concat() -> Arc<dyn Operator> {
    Arc::new(Concat)
}
