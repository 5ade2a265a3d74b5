// This module defines the lowered form of a compute graph. A Program is a flat list of Steps
// in dependency order; each Step names the node it came from, the Kernel the node's operator
// lowered to, the values it reads (producer step and output slot) and the shape it produces.
// Kernel covers every built-in operator family and knows how to infer its output shape from
// its input shapes: numpy-style broadcasting for elementwise binary ops and Sum, reductions
// over normalized axes with optional kept dimensions, concatenation along one axis, and NCHW
// convolution output sizes from strides, pads and dilations. Backends consume Programs: the
// interpreter executes them and the x86-64 backend encodes a dispatch routine over them.

//! Lowered program representation.

use crate::ir::NodeId;
use std::fmt;

/// Elementwise unary function.
#[derive(Clone, Copy)]
pub struct UnaryFn {
    pub name: &'static str,
    pub apply: fn(f32) -> f32,
}

/// Elementwise binary function.
#[derive(Clone, Copy)]
pub struct BinaryFn {
    pub name: &'static str,
    pub apply: fn(f32, f32) -> f32,
}

impl fmt::Debug for UnaryFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnaryFn({})", self.name)
    }
}

impl fmt::Debug for BinaryFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BinaryFn({})", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Mean,
    Max,
    Min,
}

/// 2-D convolution parameters (NCHW input, OIHW weights).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParams {
    pub strides: [usize; 2],
    /// top, left, bottom, right
    pub pads: [usize; 4],
    pub dilations: [usize; 2],
    pub group: usize,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            strides: [1, 1],
            pads: [0, 0, 0, 0],
            dilations: [1, 1],
            group: 1,
        }
    }
}

/// What a step computes.
#[derive(Debug, Clone)]
pub enum Kernel {
    Input { shape: Vec<usize>, data: Option<Vec<f32>> },
    Constant { shape: Vec<usize>, value: Vec<f32> },
    Output,
    Identity,
    Unary(UnaryFn),
    Binary(BinaryFn),
    Sum,
    Concat { axis: i64 },
    Reduce { op: ReduceOp, axes: Vec<i64>, keep_dims: bool },
    Conv(ConvParams),
}

impl Kernel {
    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Input { .. } => "input",
            Kernel::Constant { .. } => "constant",
            Kernel::Output => "output",
            Kernel::Identity => "identity",
            Kernel::Unary(func) => func.name,
            Kernel::Binary(func) => func.name,
            Kernel::Sum => "sum",
            Kernel::Concat { .. } => "concat",
            Kernel::Reduce { op: ReduceOp::Sum, .. } => "reduce_sum",
            Kernel::Reduce { op: ReduceOp::Mean, .. } => "reduce_mean",
            Kernel::Reduce { op: ReduceOp::Max, .. } => "reduce_max",
            Kernel::Reduce { op: ReduceOp::Min, .. } => "reduce_min",
            Kernel::Conv(_) => "conv",
        }
    }

    /// Runtime dispatch class used by native backends.
    pub fn opcode(&self) -> u32 {
        match self {
            Kernel::Input { .. } => 0,
            Kernel::Constant { .. } => 1,
            Kernel::Output => 2,
            Kernel::Identity => 3,
            Kernel::Unary(_) => 4,
            Kernel::Binary(_) => 5,
            Kernel::Sum => 6,
            Kernel::Concat { .. } => 7,
            Kernel::Reduce { .. } => 8,
            Kernel::Conv(_) => 9,
        }
    }

    /// Infer the output shape from the input shapes.
    pub fn infer_shape(&self, inputs: &[&[usize]]) -> Result<Vec<usize>, String> {
        let shape = self.output_shape(inputs)?;
        element_count(&shape)?;
        Ok(shape)
    }

    fn output_shape(&self, inputs: &[&[usize]]) -> Result<Vec<usize>, String> {
        match self {
            Kernel::Input { shape, data } => {
                if let Some(data) = data {
                    check_len(shape, data.len(), "data")?;
                }
                Ok(shape.clone())
            }
            Kernel::Constant { shape, value } => {
                check_len(shape, value.len(), "value")?;
                Ok(shape.clone())
            }
            Kernel::Output | Kernel::Identity | Kernel::Unary(_) => {
                single(inputs).map(|shape| shape.to_vec())
            }
            Kernel::Binary(_) | Kernel::Sum => {
                let (first, rest) = inputs
                    .split_first()
                    .ok_or_else(|| "expected at least one input".to_string())?;
                rest.iter()
                    .try_fold(first.to_vec(), |acc, shape| broadcast_shapes(&acc, shape))
            }
            Kernel::Concat { axis } => concat_shape(inputs, *axis),
            Kernel::Reduce { axes, keep_dims, .. } => {
                let input = single(inputs)?;
                let axes = normalize_axes(axes, input.len())?;
                Ok(reduced_shape(input, &axes, *keep_dims))
            }
            Kernel::Conv(params) => conv_shape(inputs, params),
        }
    }
}

/// Number of elements in a tensor of `shape`, or an error if it overflows `usize`.
pub fn element_count(shape: &[usize]) -> Result<usize, String> {
    shape
        .iter()
        .try_fold(1usize, |count, &dim| count.checked_mul(dim))
        .ok_or_else(|| format!("shape {shape:?} has more elements than fit in memory"))
}

fn check_len(shape: &[usize], len: usize, what: &str) -> Result<(), String> {
    let expected = element_count(shape)?;
    if expected != len {
        return Err(format!(
            "{what} holds {len} element(s) but shape {shape:?} needs {expected}"
        ));
    }
    Ok(())
}

fn single<'a>(inputs: &[&'a [usize]]) -> Result<&'a [usize], String> {
    match inputs {
        [only] => Ok(only),
        _ => Err(format!("expected 1 input, found {}", inputs.len())),
    }
}

/// Numpy-style broadcast of two shapes.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>, String> {
    let rank = a.len().max(b.len());
    let mut out = vec![0; rank];
    for i in 0..rank {
        let da = if i < rank - a.len() { 1 } else { a[i - (rank - a.len())] };
        let db = if i < rank - b.len() { 1 } else { b[i - (rank - b.len())] };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return Err(format!("shapes {a:?} and {b:?} are not broadcastable")),
        };
    }
    Ok(out)
}

/// Resolve negative axes and reject duplicates. Empty means every axis.
pub fn normalize_axes(axes: &[i64], rank: usize) -> Result<Vec<usize>, String> {
    if axes.is_empty() {
        return Ok((0..rank).collect());
    }
    let mut out = Vec::with_capacity(axes.len());
    for &axis in axes {
        let resolved = normalize_axis(axis, rank)?;
        if out.contains(&resolved) {
            return Err(format!("axis {axis} listed twice"));
        }
        out.push(resolved);
    }
    out.sort_unstable();
    Ok(out)
}

pub fn normalize_axis(axis: i64, rank: usize) -> Result<usize, String> {
    let rank_i = rank as i64;
    let resolved = if axis < 0 { axis + rank_i } else { axis };
    if resolved < 0 || resolved >= rank_i {
        return Err(format!("axis {axis} out of range for rank {rank}"));
    }
    Ok(resolved as usize)
}

fn reduced_shape(input: &[usize], axes: &[usize], keep_dims: bool) -> Vec<usize> {
    input
        .iter()
        .enumerate()
        .filter_map(|(i, &d)| match (axes.contains(&i), keep_dims) {
            (true, true) => Some(1),
            (true, false) => None,
            (false, _) => Some(d),
        })
        .collect()
}

fn concat_shape(inputs: &[&[usize]], axis: i64) -> Result<Vec<usize>, String> {
    let first = inputs
        .first()
        .ok_or_else(|| "concat needs at least one input".to_string())?;
    let axis = normalize_axis(axis, first.len())?;
    let mut out = first.to_vec();
    for shape in &inputs[1..] {
        if shape.len() != first.len() {
            return Err(format!("concat rank mismatch: {first:?} vs {shape:?}"));
        }
        for (i, (&a, &b)) in first.iter().zip(shape.iter()).enumerate() {
            if i != axis && a != b {
                return Err(format!("concat dimension {i} mismatch: {first:?} vs {shape:?}"));
            }
        }
        out[axis] = out[axis]
            .checked_add(shape[axis])
            .ok_or_else(|| format!("concat along axis {axis} overflows"))?;
    }
    Ok(out)
}

fn conv_shape(inputs: &[&[usize]], params: &ConvParams) -> Result<Vec<usize>, String> {
    let (input, weight) = match inputs {
        [input, weight] | [input, weight, _] => (*input, *weight),
        _ => return Err(format!("conv expects 2 or 3 inputs, found {}", inputs.len())),
    };
    let &[n, c, h, w] = input else {
        return Err(format!("conv input must be NCHW, found {input:?}"));
    };
    let &[m, cg, kh, kw] = weight else {
        return Err(format!("conv weight must be OIHW, found {weight:?}"));
    };
    if params.group == 0 || c % params.group != 0 || m % params.group != 0 {
        return Err(format!("group {} does not divide channels {c} / {m}", params.group));
    }
    if c / params.group != cg {
        return Err(format!(
            "weight expects {cg} channels per group, input provides {}",
            c / params.group
        ));
    }
    if let [_, _, bias] = inputs {
        if **bias != [m] {
            return Err(format!("bias must have shape [{m}], found {bias:?}"));
        }
    }

    let out_dim = |size: usize, pad_lo: usize, pad_hi: usize, kernel: usize, stride: usize, dilation: usize| {
        if kernel == 0 || stride == 0 {
            return None;
        }
        let padded = size.checked_add(pad_lo)?.checked_add(pad_hi)?;
        let span = dilation.checked_mul(kernel - 1)?.checked_add(1)?;
        let room = padded.checked_sub(span)?;
        Some(room / stride + 1)
    };
    let [pt, pl, pb, pr] = params.pads;
    let oh = out_dim(h, pt, pb, kh, params.strides[0], params.dilations[0]);
    let ow = out_dim(w, pl, pr, kw, params.strides[1], params.dilations[1]);
    match (oh, ow) {
        (Some(oh), Some(ow)) => Ok(vec![n, m, oh, ow]),
        _ => Err(format!(
            "kernel {kh}x{kw} does not fit input {h}x{w} with the given pads/strides"
        )),
    }
}

/// Reference to an output slot of an earlier step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRef {
    pub step: usize,
    pub slot: u32,
}

/// One lowered node.
#[derive(Debug, Clone)]
pub struct Step {
    pub node: NodeId,
    pub kind: String,
    pub kernel: Kernel,
    pub inputs: Vec<ValueRef>,
    pub shape: Vec<usize>,
}

/// A graph lowered to an ordered list of kernel invocations.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub name: String,
    pub steps: Vec<Step>,
    /// Step indices of graph inputs, in step order.
    pub inputs: Vec<usize>,
    /// Step indices of graph outputs, in step order.
    pub outputs: Vec<usize>,
}

impl Program {
    pub fn step_of(&self, node: &NodeId) -> Option<usize> {
        self.steps.iter().position(|step| &step.node == node)
    }

    /// Textual listing, also used as the portable artifact encoding.
    pub fn listing(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "program {}", self.name)?;
        for (idx, step) in self.steps.iter().enumerate() {
            write!(f, "  {idx}: %{} = {}", step.node, step.kind)?;
            if !step.inputs.is_empty() {
                f.write_str("(")?;
                for (i, input) in step.inputs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "#{}", input.step)?;
                    if input.slot != 0 {
                        write!(f, ":{}", input.slot)?;
                    }
                }
                f.write_str(")")?;
            }
            writeln!(f, " -> {:?} [{}]", step.shape, step.kernel.name())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_shapes() {
        assert_eq!(broadcast_shapes(&[2, 3], &[3]).unwrap(), vec![2, 3]);
        assert_eq!(broadcast_shapes(&[4, 1, 5], &[2, 1]).unwrap(), vec![4, 2, 5]);
        assert!(broadcast_shapes(&[2, 3], &[4]).is_err());
    }

    #[test]
    fn test_reduce_shape() {
        let kernel = Kernel::Reduce { op: ReduceOp::Sum, axes: vec![-1], keep_dims: false };
        assert_eq!(kernel.infer_shape(&[&[2, 3, 4]]).unwrap(), vec![2, 3]);

        let kernel = Kernel::Reduce { op: ReduceOp::Max, axes: vec![], keep_dims: true };
        assert_eq!(kernel.infer_shape(&[&[2, 3]]).unwrap(), vec![1, 1]);

        let kernel = Kernel::Reduce { op: ReduceOp::Min, axes: vec![0, 0], keep_dims: true };
        assert!(kernel.infer_shape(&[&[2, 3]]).is_err());
    }

    #[test]
    fn test_concat_shape() {
        let kernel = Kernel::Concat { axis: 1 };
        assert_eq!(kernel.infer_shape(&[&[2, 3], &[2, 5]]).unwrap(), vec![2, 8]);
        assert!(kernel.infer_shape(&[&[2, 3], &[3, 5]]).is_err());
    }

    #[test]
    fn test_conv_shape() {
        let params = ConvParams { pads: [1, 1, 1, 1], ..ConvParams::default() };
        let kernel = Kernel::Conv(params);
        assert_eq!(
            kernel.infer_shape(&[&[1, 3, 8, 8], &[16, 3, 3, 3]]).unwrap(),
            vec![1, 16, 8, 8]
        );

        let strided = Kernel::Conv(ConvParams { strides: [2, 2], ..ConvParams::default() });
        assert_eq!(
            strided.infer_shape(&[&[1, 1, 5, 5], &[2, 1, 3, 3], &[2]]).unwrap(),
            vec![1, 2, 2, 2]
        );

        assert!(kernel.infer_shape(&[&[1, 4, 8, 8], &[16, 3, 3, 3]]).is_err());
    }

    #[test]
    fn test_conv_degenerate_kernels_rejected() {
        let kernel = Kernel::Conv(ConvParams::default());
        assert!(kernel.infer_shape(&[&[1, 1, 3, 3], &[1, 1, 0, 3]]).is_err());

        let huge = Kernel::Conv(ConvParams { dilations: [usize::MAX, 1], ..ConvParams::default() });
        assert!(huge.infer_shape(&[&[1, 1, 3, 3], &[1, 1, 3, 1]]).is_err());

        let padded = Kernel::Conv(ConvParams { pads: [usize::MAX, 0, 1, 0], ..ConvParams::default() });
        assert!(padded.infer_shape(&[&[1, 1, 3, 3], &[1, 1, 1, 1]]).is_err());
    }

    #[test]
    fn test_element_count_overflow() {
        assert_eq!(element_count(&[2, 3, 4]), Ok(24));
        assert_eq!(element_count(&[]), Ok(1));
        assert!(element_count(&[usize::MAX, 2]).is_err());

        let input = Kernel::Input { shape: vec![usize::MAX, usize::MAX], data: None };
        assert!(input.infer_shape(&[]).is_err());
        let outer = Kernel::Binary(BinaryFn { name: "add", apply: |a, b| a + b });
        let wide = [usize::MAX / 2 + 1, 1];
        let tall = [1, 4];
        assert!(outer.infer_shape(&[&wide, &tall]).is_err());
    }

    #[test]
    fn test_constant_length_checked() {
        let kernel = Kernel::Constant { shape: vec![2, 2], value: vec![1.0; 3] };
        assert!(kernel.infer_shape(&[]).is_err());
    }
}
