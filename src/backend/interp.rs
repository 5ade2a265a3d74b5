// This module implements the portable execution engine. The Interpreter walks a lowered
// Program step by step on dense row-major f32 tensors and keeps one value per step. Input
// steps take a caller-supplied feed when one exists, then the data attribute the node was
// built with, and otherwise zeros of the declared shape. Every built-in kernel has a naive
// reference implementation here: broadcasting elementwise arithmetic, reductions,
// concatenation and grouped NCHW convolution with padding, strides and dilations. The same
// kernel evaluator is used by the constant folding pass to evaluate nodes at compile time.

//! Reference interpreter for lowered programs.

use crate::core::{CompileError, CompileResult};
use crate::ir::NodeId;
use crate::pipeline::program::{element_count, ConvParams, Kernel, Program, ReduceOp};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Dense row-major `f32` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, String> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            return Err(format!(
                "shape {:?} needs {} element(s), got {}",
                shape,
                expected,
                data.len()
            ));
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: Vec<usize>) -> Result<Self, String> {
        let len = element_count(&shape)?;
        Ok(Self { shape, data: vec![0.0; len] })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?}", self.shape, self.data)
    }
}

fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

fn unravel(mut index: usize, shape: &[usize], coords: &mut [usize]) {
    for d in (0..shape.len()).rev() {
        coords[d] = index % shape[d];
        index /= shape[d];
    }
}

/// Flat index into `shape` for an output coordinate, broadcasting size-1 dims.
fn broadcast_offset(coords: &[usize], shape: &[usize], strides: &[usize]) -> usize {
    let lead = coords.len() - shape.len();
    shape
        .iter()
        .zip(strides)
        .enumerate()
        .map(|(d, (&dim, &stride))| if dim == 1 { 0 } else { coords[lead + d] * stride })
        .sum()
}

fn broadcast_zip(
    inputs: &[&Tensor],
    out_shape: &[usize],
    init: f32,
    combine: impl Fn(f32, f32) -> f32,
) -> Tensor {
    let len: usize = out_shape.iter().product();
    let all_strides: Vec<Vec<usize>> = inputs.iter().map(|t| strides(&t.shape)).collect();
    let mut coords = vec![0; out_shape.len()];
    let mut data = Vec::with_capacity(len);
    for i in 0..len {
        unravel(i, out_shape, &mut coords);
        let mut acc = init;
        for (j, (tensor, tensor_strides)) in inputs.iter().zip(&all_strides).enumerate() {
            let value = tensor.data[broadcast_offset(&coords, &tensor.shape, tensor_strides)];
            acc = if j == 0 { value } else { combine(acc, value) };
        }
        data.push(acc);
    }
    Tensor { shape: out_shape.to_vec(), data }
}

fn reduce(input: &Tensor, op: ReduceOp, axes: &[i64], out_shape: &[usize]) -> Result<Tensor, String> {
    let rank = input.shape.len();
    let axes = crate::pipeline::program::normalize_axes(axes, rank)?;
    let init = match op {
        ReduceOp::Sum | ReduceOp::Mean => 0.0,
        ReduceOp::Max => f32::NEG_INFINITY,
        ReduceOp::Min => f32::INFINITY,
    };
    let out_len: usize = out_shape.iter().product();
    let mut data = vec![init; out_len];

    // Output strides over the full input rank, zero along reduced axes.
    let kept: Vec<usize> = input
        .shape
        .iter()
        .enumerate()
        .map(|(d, &dim)| if axes.contains(&d) { 1 } else { dim })
        .collect();
    let kept_strides = strides(&kept);
    let mut coords = vec![0; rank];
    for (i, &value) in input.data.iter().enumerate() {
        unravel(i, &input.shape, &mut coords);
        let out: usize = coords
            .iter()
            .zip(&kept_strides)
            .enumerate()
            .map(|(d, (&c, &s))| if axes.contains(&d) { 0 } else { c * s })
            .sum();
        data[out] = match op {
            ReduceOp::Sum | ReduceOp::Mean => data[out] + value,
            ReduceOp::Max => data[out].max(value),
            ReduceOp::Min => data[out].min(value),
        };
    }
    if op == ReduceOp::Mean {
        let count: usize = axes.iter().map(|&d| input.shape[d]).product();
        if count > 0 {
            data.iter_mut().for_each(|v| *v /= count as f32);
        }
    }
    Ok(Tensor { shape: out_shape.to_vec(), data })
}

fn concat(inputs: &[&Tensor], axis: i64, out_shape: &[usize]) -> Result<Tensor, String> {
    let axis = crate::pipeline::program::normalize_axis(axis, out_shape.len())?;
    let outer: usize = out_shape[..axis].iter().product();
    let mut data = Vec::with_capacity(out_shape.iter().product());
    for o in 0..outer {
        for tensor in inputs {
            let chunk: usize = tensor.shape[axis..].iter().product();
            data.extend_from_slice(&tensor.data[o * chunk..(o + 1) * chunk]);
        }
    }
    Ok(Tensor { shape: out_shape.to_vec(), data })
}

fn conv2d(inputs: &[&Tensor], params: &ConvParams, out_shape: &[usize]) -> Result<Tensor, String> {
    let (x, w, bias) = match inputs {
        [x, w] => (*x, *w, None),
        [x, w, b] => (*x, *w, Some(*b)),
        _ => return Err(format!("conv expects 2 or 3 inputs, got {}", inputs.len())),
    };
    let (&[n, c, h, wd], &[m, cg, kh, kw], &[_, _, oh, ow]) =
        (x.shape.as_slice(), w.shape.as_slice(), out_shape)
    else {
        return Err("conv operands must be rank 4".to_string());
    };
    let [sh, sw] = params.strides;
    let [dh, dw] = params.dilations;
    let [pt, pl, _, _] = params.pads;
    let per_group = m / params.group;

    let mut out = vec![0.0; n * m * oh * ow];
    for b in 0..n {
        for oc in 0..m {
            let g = oc / per_group;
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut sum = bias.map_or(0.0, |t| t.data[oc]);
                    for icg in 0..cg {
                        let ic = g * cg + icg;
                        for ky in 0..kh {
                            // Positions inside the zero padding contribute nothing.
                            let Some(iy) = (oy * sh + ky * dh).checked_sub(pt).filter(|&iy| iy < h)
                            else {
                                continue;
                            };
                            for kx in 0..kw {
                                let Some(ix) =
                                    (ox * sw + kx * dw).checked_sub(pl).filter(|&ix| ix < wd)
                                else {
                                    continue;
                                };
                                let x_idx = ((b * c + ic) * h + iy) * wd + ix;
                                let w_idx = ((oc * cg + icg) * kh + ky) * kw + kx;
                                sum += x.data[x_idx] * w.data[w_idx];
                            }
                        }
                    }
                    out[((b * m + oc) * oh + oy) * ow + ox] = sum;
                }
            }
        }
    }
    Ok(Tensor { shape: out_shape.to_vec(), data: out })
}

/// Evaluate one kernel whose value does not depend on feeds.
pub fn eval_kernel(kernel: &Kernel, inputs: &[&Tensor], out_shape: &[usize]) -> Result<Tensor, String> {
    match kernel {
        Kernel::Input { .. } => Err("input kernels are evaluated from feeds".to_string()),
        Kernel::Constant { shape, value } => Tensor::new(shape.clone(), value.clone()),
        Kernel::Output | Kernel::Identity => match inputs {
            [only] => Ok((*only).clone()),
            _ => Err(format!("expected 1 input, got {}", inputs.len())),
        },
        Kernel::Unary(func) => match inputs {
            [only] => Ok(Tensor {
                shape: only.shape.clone(),
                data: only.data.iter().map(|&x| (func.apply)(x)).collect(),
            }),
            _ => Err(format!("expected 1 input, got {}", inputs.len())),
        },
        Kernel::Binary(func) => {
            if inputs.len() != 2 {
                return Err(format!("expected 2 inputs, got {}", inputs.len()));
            }
            Ok(broadcast_zip(inputs, out_shape, 0.0, func.apply))
        }
        Kernel::Sum => Ok(broadcast_zip(inputs, out_shape, 0.0, |a, b| a + b)),
        Kernel::Concat { axis } => concat(inputs, *axis, out_shape),
        Kernel::Reduce { op, axes, .. } => match inputs {
            [only] => reduce(only, *op, axes, out_shape),
            _ => Err(format!("expected 1 input, got {}", inputs.len())),
        },
        Kernel::Conv(params) => conv2d(inputs, params, out_shape),
    }
}

/// Result of running a program.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub outputs: BTreeMap<NodeId, Tensor>,
    pub steps_executed: usize,
}

/// Executes lowered programs on the host.
#[derive(Debug, Default)]
pub struct Interpreter {
    feeds: HashMap<NodeId, Tensor>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply the value of input node `id`.
    pub fn feed(&mut self, id: impl Into<NodeId>, tensor: Tensor) -> &mut Self {
        self.feeds.insert(id.into(), tensor);
        self
    }

    pub fn with_feed(mut self, id: impl Into<NodeId>, tensor: Tensor) -> Self {
        self.feed(id, tensor);
        self
    }

    pub fn run(&self, program: &Program) -> CompileResult<Execution> {
        let mut values: Vec<Tensor> = Vec::with_capacity(program.steps.len());
        let mut execution = Execution::default();

        for (index, step) in program.steps.iter().enumerate() {
            let fail = |message: String| CompileError::Execution { step: index, message };

            let mut args = Vec::with_capacity(step.inputs.len());
            for input in &step.inputs {
                if input.slot != 0 {
                    return Err(fail(format!("output slot {} is not produced", input.slot)));
                }
                let value = values
                    .get(input.step)
                    .ok_or_else(|| fail(format!("step {} has not run yet", input.step)))?;
                args.push(value);
            }

            let value = match &step.kernel {
                Kernel::Input { shape, data } => self.input_value(&step.node, shape, data.as_deref()).map_err(fail)?,
                kernel => eval_kernel(kernel, &args, &step.shape).map_err(fail)?,
            };
            log::trace!("step {} %{} [{}] -> {:?}", index, step.node, step.kernel.name(), value.shape);

            if let Kernel::Output = step.kernel {
                execution.outputs.insert(step.node.clone(), value.clone());
            }
            values.push(value);
            execution.steps_executed += 1;
        }

        log::debug!("Executed {} steps of {}", execution.steps_executed, program.name);
        Ok(execution)
    }

    fn input_value(&self, id: &NodeId, shape: &[usize], data: Option<&[f32]>) -> Result<Tensor, String> {
        match (self.feeds.get(id), data) {
            (Some(feed), _) if feed.shape != shape => Err(format!(
                "feed for '{id}' has shape {:?}, expected {shape:?}",
                feed.shape
            )),
            (Some(feed), _) => Ok(feed.clone()),
            (None, Some(data)) => Tensor::new(shape.to_vec(), data.to_vec()),
            (None, None) => Tensor::zeros(shape.to_vec()),
        }
    }
}
