//! Reductions over a set of axes.

use crate::ir::attr::{AttrKind, AttrSpec, Attributes};
use crate::ir::operator::{Arity, Operator};
use crate::pipeline::program::{Kernel, ReduceOp};
use std::sync::Arc;

#[derive(Debug)]
pub struct Reduce {
    op: ReduceOp,
}

impl Operator for Reduce {
    fn arity(&self) -> Arity {
        Arity::fixed(1, 1)
    }

    fn attr_specs(&self) -> &'static [AttrSpec] {
        const SPECS: &[AttrSpec] = &[
            AttrSpec::optional("axes", AttrKind::Ints),
            AttrSpec::optional("keepdims", AttrKind::Int),
        ];
        SPECS
    }

    fn check(&self, attrs: &Attributes) -> Result<(), String> {
        match attrs.int("keepdims") {
            None | Some(0) | Some(1) => Ok(()),
            Some(other) => Err(format!("keepdims must be 0 or 1, found {other}")),
        }
    }

    fn lower(&self, attrs: &Attributes) -> Result<Kernel, String> {
        Ok(Kernel::Reduce {
            op: self.op,
            axes: attrs.ints("axes").map(<[i64]>::to_vec).unwrap_or_default(),
            // keepdims defaults to 1
            keep_dims: attrs.int("keepdims").unwrap_or(1) != 0,
        })
    }
}

pub fn reduce_sum() -> Arc<dyn Operator> {
    Arc::new(Reduce { op: ReduceOp::Sum })
}

pub fn reduce_mean() -> Arc<dyn Operator> {
    Arc::new(Reduce { op: ReduceOp::Mean })
}

pub fn reduce_max() -> Arc<dyn Operator> {
    Arc::new(Reduce { op: ReduceOp::Max })
}

pub fn reduce_min() -> Arc<dyn Operator> {
    Arc::new(Reduce { op: ReduceOp::Min })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::attr::AttrValue;

    #[test]
    fn test_keepdims_validated() {
        let attrs = Attributes::new().with("keepdims", AttrValue::Int(2));
        assert!(reduce_sum().check(&attrs).is_err());
    }

    #[test]
    fn test_defaults() {
        match reduce_mean().lower(&Attributes::new()).unwrap() {
            Kernel::Reduce { op, axes, keep_dims } => {
                assert_eq!(op, ReduceOp::Mean);
                assert!(axes.is_empty());
                assert!(keep_dims);
            }
            other => panic!("unexpected kernel {other:?}"),
        }
    }
}
