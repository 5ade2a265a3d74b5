//! Elementwise operator kinds: unary math functions, broadcasting binary
//! arithmetic and the variadic `Sum`.

use crate::ir::attr::Attributes;
use crate::ir::operator::{Arity, Operator};
use crate::ir::registry::OperatorFactory;
use crate::pipeline::program::{BinaryFn, Kernel, UnaryFn};
use std::sync::Arc;

/// One-input elementwise function.
#[derive(Debug)]
pub struct Unary {
    func: UnaryFn,
}

impl Operator for Unary {
    fn arity(&self) -> Arity {
        Arity::fixed(1, 1)
    }

    fn lower(&self, _attrs: &Attributes) -> Result<Kernel, String> {
        Ok(Kernel::Unary(self.func))
    }
}

/// Two-input elementwise function with numpy-style broadcasting.
#[derive(Debug)]
pub struct Binary {
    func: BinaryFn,
}

impl Operator for Binary {
    fn arity(&self) -> Arity {
        Arity::fixed(2, 1)
    }

    fn lower(&self, _attrs: &Attributes) -> Result<Kernel, String> {
        Ok(Kernel::Binary(self.func))
    }
}

/// Broadcasting sum of one or more inputs.
#[derive(Debug)]
pub struct Sum;

impl Operator for Sum {
    fn arity(&self) -> Arity {
        Arity::variadic_inputs(1)
    }

    fn lower(&self, _attrs: &Attributes) -> Result<Kernel, String> {
        Ok(Kernel::Sum)
    }
}

pub fn sum() -> Arc<dyn Operator> {
    Arc::new(Sum)
}

macro_rules! unary_kinds {
    ($($kind:literal => $factory:ident($apply:expr);)*) => {
        $(
            pub fn $factory() -> Arc<dyn Operator> {
                Arc::new(Unary { func: UnaryFn { name: stringify!($factory), apply: $apply } })
            }
        )*

        pub(super) const UNARY_KINDS: &[(&str, OperatorFactory)] =
            &[$(($kind, $factory as OperatorFactory)),*];
    };
}

macro_rules! binary_kinds {
    ($($kind:literal => $factory:ident($apply:expr);)*) => {
        $(
            pub fn $factory() -> Arc<dyn Operator> {
                Arc::new(Binary { func: BinaryFn { name: stringify!($factory), apply: $apply } })
            }
        )*

        pub(super) const BINARY_KINDS: &[(&str, OperatorFactory)] =
            &[$(($kind, $factory as OperatorFactory)),*];
    };
}

unary_kinds! {
    "Acos" => acos(f32::acos);
    "Asin" => asin(f32::asin);
    "Atan" => atan(f32::atan);
    "Cos" => cos(f32::cos);
    "Sin" => sin(f32::sin);
    "Tan" => tan(f32::tan);
    "Exp" => exp(f32::exp);
    "Log" => log(f32::ln);
    "Sqrt" => sqrt(f32::sqrt);
    "Abs" => abs(f32::abs);
    "Neg" => neg(|x: f32| -x);
    "Floor" => floor(f32::floor);
    "Ceil" => ceil(f32::ceil);
    "Relu" => relu(|x: f32| x.max(0.0));
    "Sigmoid" => sigmoid(|x: f32| 1.0 / (1.0 + (-x).exp()));
    "Tanh" => tanh(f32::tanh);
}

binary_kinds! {
    "Add" => add(|a: f32, b: f32| a + b);
    "Sub" => sub(|a: f32, b: f32| a - b);
    "Mul" => mul(|a: f32, b: f32| a * b);
    "Div" => div(|a: f32, b: f32| a / b);
    "Pow" => pow(f32::powf);
    "Max" => max(f32::max);
    "Min" => min(f32::min);
}
