//! 2-D convolution over NCHW tensors.

use crate::ir::attr::{AttrKind, AttrSpec, Attributes};
use crate::ir::operator::{Arity, Operator};
use crate::pipeline::program::{ConvParams, Kernel};
use std::sync::Arc;

/// `Conv(X, W[, B])`.
#[derive(Debug)]
pub struct Conv;

fn pair(attrs: &Attributes, name: &str, default: [usize; 2]) -> Result<[usize; 2], String> {
    match attrs.ints(name) {
        None => Ok(default),
        Some(&[a, b]) if a > 0 && b > 0 => Ok([a as usize, b as usize]),
        Some(other) => Err(format!("'{name}' must be two positive integers, found {other:?}")),
    }
}

fn params(attrs: &Attributes) -> Result<ConvParams, String> {
    let defaults = ConvParams::default();
    let pads = match attrs.ints("pads") {
        None => defaults.pads,
        Some(&[t, l, b, r]) if [t, l, b, r].iter().all(|&p| p >= 0) => {
            [t as usize, l as usize, b as usize, r as usize]
        }
        Some(other) => {
            return Err(format!("'pads' must be four non-negative integers, found {other:?}"))
        }
    };
    let group = match attrs.int("group") {
        None => defaults.group,
        Some(g) if g > 0 => g as usize,
        Some(g) => return Err(format!("'group' must be positive, found {g}")),
    };
    Ok(ConvParams {
        strides: pair(attrs, "strides", defaults.strides)?,
        pads,
        dilations: pair(attrs, "dilations", defaults.dilations)?,
        group,
    })
}

impl Operator for Conv {
    fn arity(&self) -> Arity {
        Arity::new(2, Some(3), 1, Some(1))
    }

    fn attr_specs(&self) -> &'static [AttrSpec] {
        const SPECS: &[AttrSpec] = &[
            AttrSpec::optional("strides", AttrKind::Ints),
            AttrSpec::optional("pads", AttrKind::Ints),
            AttrSpec::optional("dilations", AttrKind::Ints),
            AttrSpec::optional("group", AttrKind::Int),
        ];
        SPECS
    }

    fn check(&self, attrs: &Attributes) -> Result<(), String> {
        params(attrs).map(|_| ())
    }

    fn lower(&self, attrs: &Attributes) -> Result<Kernel, String> {
        params(attrs).map(Kernel::Conv)
    }
}

pub fn conv() -> Arc<dyn Operator> {
    Arc::new(Conv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::attr::AttrValue;

    #[test]
    fn test_conv_params() {
        let attrs = Attributes::new()
            .with("strides", AttrValue::Ints(vec![2, 1]))
            .with("pads", AttrValue::Ints(vec![1, 1, 1, 1]));
        let params = params(&attrs).unwrap();
        assert_eq!(params.strides, [2, 1]);
        assert_eq!(params.pads, [1, 1, 1, 1]);
        assert_eq!(params.dilations, [1, 1]);
        assert_eq!(params.group, 1);
    }

    #[test]
    fn test_conv_rejects_bad_strides() {
        let attrs = Attributes::new().with("strides", AttrValue::Ints(vec![0, 1]));
        assert!(Conv.check(&attrs).is_err());
        let attrs = Attributes::new().with("strides", AttrValue::Ints(vec![1, 1, 1]));
        assert!(Conv.check(&attrs).is_err());
    }
}
