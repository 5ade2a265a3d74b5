//! Built-in operator kinds.

pub mod conv;
pub mod elementwise;
pub mod io;
pub mod reduce;
pub mod structural;

use super::registry::{OperatorFactory, OperatorRegistry};
use crate::core::CompileResult;

const OTHER_KINDS: &[(&str, OperatorFactory)] = &[
    (io::INPUT_KIND, io::input),
    (io::OUTPUT_KIND, io::output),
    (io::CONSTANT_KIND, io::constant),
    ("Identity", structural::identity),
    ("Concat", structural::concat),
    ("Sum", elementwise::sum),
    ("ReduceSum", reduce::reduce_sum),
    ("ReduceMean", reduce::reduce_mean),
    ("ReduceMax", reduce::reduce_max),
    ("ReduceMin", reduce::reduce_min),
    ("Conv", conv::conv),
];

/// Register every built-in kind into `registry`.
pub fn register_builtin_operators(registry: &mut OperatorRegistry) -> CompileResult<()> {
    let tables = [elementwise::UNARY_KINDS, elementwise::BINARY_KINDS, OTHER_KINDS];
    for (kind, factory) in tables.iter().flat_map(|table| table.iter()) {
        registry.register(kind, *factory)?;
    }
    log::debug!("Registered {} built-in operator kinds", registry.len());
    Ok(())
}
