//! Graph boundary kinds and constants.

use crate::ir::attr::{AttrKind, AttrSpec, Attributes};
use crate::ir::node::OperatorNode;
use crate::ir::operator::{Arity, Operator};
use crate::pipeline::program::{element_count, Kernel};
use std::fmt;
use std::sync::Arc;

/// Kind name of graph input nodes.
pub const INPUT_KIND: &str = "Input";
/// Kind name of graph output nodes.
pub const OUTPUT_KIND: &str = "Output";
/// Kind name of constant nodes.
pub const CONSTANT_KIND: &str = "Constant";

fn shape_of(attrs: &Attributes) -> Result<Vec<usize>, String> {
    attrs
        .shape("shape")
        .unwrap_or_else(|| Err("missing attribute 'shape'".to_string()))
}

fn check_len(shape: &[usize], values: &[f32], name: &str) -> Result<(), String> {
    let expected = element_count(shape)?;
    if values.len() != expected {
        return Err(format!(
            "'{name}' holds {} value(s), shape {shape:?} needs {expected}",
            values.len()
        ));
    }
    Ok(())
}

/// Graph input. `data` supplies a default feed.
#[derive(Debug)]
pub struct Input;

impl Operator for Input {
    fn arity(&self) -> Arity {
        Arity::fixed(0, 1)
    }

    fn attr_specs(&self) -> &'static [AttrSpec] {
        const SPECS: &[AttrSpec] = &[
            AttrSpec::required("shape", AttrKind::Ints),
            AttrSpec::optional("data", AttrKind::Floats),
        ];
        SPECS
    }

    fn check(&self, attrs: &Attributes) -> Result<(), String> {
        let shape = shape_of(attrs)?;
        match attrs.float_list("data") {
            Some(data) => check_len(&shape, &data, "data"),
            None => element_count(&shape).map(|_| ()),
        }
    }

    fn describe(&self, node: &OperatorNode, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attrs = node.attrs();
        write!(f, "Input")?;
        if let Some(shape) = attrs.ints("shape") {
            write!(f, " {shape:?}")?;
        }
        if attrs.contains("data") {
            f.write_str(" (with data)")?;
        }
        Ok(())
    }

    fn lower(&self, attrs: &Attributes) -> Result<Kernel, String> {
        Ok(Kernel::Input {
            shape: shape_of(attrs)?,
            data: attrs.float_list("data"),
        })
    }
}

/// Graph output sink.
#[derive(Debug)]
pub struct Output;

impl Operator for Output {
    fn arity(&self) -> Arity {
        Arity::fixed(1, 0)
    }

    fn lower(&self, _attrs: &Attributes) -> Result<Kernel, String> {
        Ok(Kernel::Output)
    }
}

/// Compile-time tensor.
#[derive(Debug)]
pub struct Constant;

impl Operator for Constant {
    fn arity(&self) -> Arity {
        Arity::fixed(0, 1)
    }

    fn attr_specs(&self) -> &'static [AttrSpec] {
        const SPECS: &[AttrSpec] = &[
            AttrSpec::required("shape", AttrKind::Ints),
            AttrSpec::required("value", AttrKind::Floats),
        ];
        SPECS
    }

    fn check(&self, attrs: &Attributes) -> Result<(), String> {
        let shape = shape_of(attrs)?;
        let value = attrs.float_list("value").unwrap_or_default();
        check_len(&shape, &value, "value")
    }

    fn lower(&self, attrs: &Attributes) -> Result<Kernel, String> {
        Ok(Kernel::Constant {
            shape: shape_of(attrs)?,
            value: attrs
                .float_list("value")
                .ok_or_else(|| "missing attribute 'value'".to_string())?,
        })
    }
}

pub fn input() -> Arc<dyn Operator> {
    Arc::new(Input)
}

pub fn output() -> Arc<dyn Operator> {
    Arc::new(Output)
}

pub fn constant() -> Arc<dyn Operator> {
    Arc::new(Constant)
}
