//! Outer-loop broadcasting for gufunc calls.
//!
//! Operand shapes split into outer (loop) dimensions and trailing core
//! dimensions named by the dimension signature. Outer shapes broadcast the
//! usual way, right-aligned with size-1 dimensions stretched. The kernel is
//! invoked once per outer index with copies of the addressed cores.

use std::collections::HashMap;

use gufunc_sig::DimensionSignature;
use gufunc_types::{Array, Scalar, ScalarType, Type, Value};
use rayon::prelude::*;
use tracing::trace;

use crate::errors::{GufuncError, Result};
use crate::runtime::jit::CallSignature;

/// Callee of the broadcasting loop, invoked once per outer index.
pub trait ElementKernel: Sync {
    fn call_element(&self, args: &[Value]) -> Result<()>;
}

impl<F> ElementKernel for F
where
    F: Fn(&[Value]) -> Result<()> + Sync,
{
    fn call_element(&self, args: &[Value]) -> Result<()> {
        self(args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopPlan {
    pub outer_shape: Vec<usize>,
    /// Outer shape of every operand, inputs first.
    pub operand_outer: Vec<Vec<usize>>,
    pub core_sizes: HashMap<String, usize>,
}

impl LoopPlan {
    pub fn iterations(&self) -> usize {
        self.outer_shape.iter().product()
    }
}

/// Broadcast outer shapes together.
pub fn broadcast_shapes(shapes: &[Vec<usize>]) -> Result<Vec<usize>> {
    let ndim = shapes.iter().map(Vec::len).max().unwrap_or(0);
    let mut result = vec![1; ndim];
    for shape in shapes {
        let offset = ndim - shape.len();
        for (axis, &dim) in shape.iter().enumerate() {
            let slot = &mut result[offset + axis];
            if *slot == 1 {
                *slot = dim;
            } else if dim != 1 && dim != *slot {
                return Err(GufuncError::ShapeMismatch(format!(
                    "operands could not be broadcast together with shapes {shapes:?}"
                )));
            }
        }
    }
    Ok(result)
}

fn split_core<'a>(
    position: usize,
    shape: &'a [usize],
    core: &[String],
) -> Result<(&'a [usize], &'a [usize])> {
    if shape.len() < core.len() {
        return Err(GufuncError::ShapeMismatch(format!(
            "operand {position} has {} dimension(s) but its core ({}) needs {}",
            shape.len(),
            core.join(","),
            core.len()
        )));
    }
    Ok(shape.split_at(shape.len() - core.len()))
}

fn bind_core(
    position: usize,
    names: &[String],
    sizes: &[usize],
    bound: &mut HashMap<String, usize>,
) -> Result<()> {
    for (name, &size) in names.iter().zip(sizes) {
        match bound.get(name) {
            Some(&existing) if existing != size => {
                return Err(GufuncError::ShapeMismatch(format!(
                    "core dimension '{name}' of operand {position} has size {size}, expected {existing}"
                )));
            }
            Some(_) => {}
            None => {
                bound.insert(name.clone(), size);
            }
        }
    }
    Ok(())
}

fn bind_inputs(
    dims: &DimensionSignature,
    inputs: &[Value],
) -> Result<(HashMap<String, usize>, Vec<Vec<usize>>)> {
    let mut bound = HashMap::new();
    let mut outers = Vec::with_capacity(inputs.len());
    for (position, (value, core)) in inputs.iter().zip(dims.inputs()).enumerate() {
        let shape = value.shape();
        let (outer, sizes) = split_core(position, &shape, core)?;
        bind_core(position, core, sizes, &mut bound)?;
        outers.push(outer.to_vec());
    }
    Ok((bound, outers))
}

/// Shape of the output operand implied by `inputs`.
pub fn output_shape(function: &str, dims: &DimensionSignature, inputs: &[Value]) -> Result<Vec<usize>> {
    let (bound, outers) = bind_inputs(dims, inputs)?;
    let mut shape = broadcast_shapes(&outers)?;
    for name in dims.output() {
        let size = bound.get(name).ok_or_else(|| GufuncError::MissingOutput {
            function: function.to_string(),
            dimension: name.clone(),
        })?;
        shape.push(*size);
    }
    Ok(shape)
}

/// Bind core dimensions and compute the loop shape for `operands`, which
/// hold every input followed by the output.
///
/// The loop shape is the broadcast of every operand's outer shape, the
/// output included, and must equal the output's outer shape.
pub fn plan_loop(dims: &DimensionSignature, operands: &[Value]) -> Result<LoopPlan> {
    let nin = dims.nin();
    if operands.len() != nin + 1 {
        return Err(GufuncError::ShapeMismatch(format!(
            "expected {} operands, found {}",
            nin + 1,
            operands.len()
        )));
    }

    let (mut core_sizes, mut operand_outer) = bind_inputs(dims, &operands[..nin])?;

    let Value::Array(output) = &operands[nin] else {
        return Err(GufuncError::ShapeMismatch("output operand must be an array".into()));
    };
    let shape = output.shape();
    let (outer, sizes) = split_core(nin, &shape, dims.output())?;
    bind_core(nin, dims.output(), sizes, &mut core_sizes)?;
    operand_outer.push(outer.to_vec());

    // inputs may broadcast up to the output, never the other way round
    let outer_shape = broadcast_shapes(&operand_outer)?;
    if outer != outer_shape.as_slice() {
        return Err(GufuncError::ShapeMismatch(format!(
            "output outer shape {outer:?} does not match broadcast shape {outer_shape:?}"
        )));
    }

    Ok(LoopPlan {
        outer_shape,
        operand_outer,
        core_sizes,
    })
}

fn value_dtype(value: &Value) -> ScalarType {
    match value {
        Value::Scalar(scalar) => scalar.scalar_type(),
        Value::Array(array) => array.dtype(),
    }
}

/// Types of the per-element values [`run_loop`] hands to the kernel.
///
/// Inputs with an empty core arrive as scalars, other inputs as arrays of
/// the core rank. The output always arrives as an array, a length-1
/// carrier when its core is empty.
pub fn element_signature(dims: &DimensionSignature, operands: &[Value]) -> CallSignature {
    let nin = dims.nin();
    let args = operands
        .iter()
        .zip(dims.expected_ndims())
        .enumerate()
        .map(|(position, (value, rank))| {
            let dtype = value_dtype(value);
            if position == nin {
                Type::array(dtype, rank.max(1))
            } else if rank == 0 {
                Type::scalar(dtype)
            } else {
                Type::array(dtype, rank)
            }
        })
        .collect();
    CallSignature::void(args)
}

fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for (slot, &dim) in index.iter_mut().zip(shape).rev() {
        *slot = flat % dim;
        flat /= dim;
    }
    index
}

/// Index into an operand's outer shape for the loop index `full`.
fn operand_prefix(full: &[usize], outer: &[usize]) -> Vec<usize> {
    let offset = full.len() - outer.len();
    outer
        .iter()
        .enumerate()
        .map(|(axis, &dim)| if dim == 1 { 0 } else { full[offset + axis] })
        .collect()
}

fn missing(position: usize, prefix: &[usize]) -> GufuncError {
    GufuncError::ShapeMismatch(format!("operand {position} has no element at {prefix:?}"))
}

fn run_iteration(
    dims: &DimensionSignature,
    plan: &LoopPlan,
    operands: &[Value],
    writable: &[bool],
    kernel: &dyn ElementKernel,
    flat: usize,
) -> Result<()> {
    let nin = dims.nin();
    let full = unravel(flat, &plan.outer_shape);
    let ranks = dims.expected_ndims();
    let prefixes: Vec<Vec<usize>> = plan
        .operand_outer
        .iter()
        .map(|outer| operand_prefix(&full, outer))
        .collect();

    let mut element = Vec::with_capacity(operands.len());
    for (position, operand) in operands.iter().enumerate() {
        let prefix = &prefixes[position];
        let value = match operand {
            Value::Scalar(scalar) => Value::Scalar(*scalar),
            Value::Array(array) if position == nin && ranks[position] == 0 => {
                let current = array.get(prefix).ok_or_else(|| missing(position, prefix))?;
                let carrier = Array::zeros(array.dtype(), &[1]);
                carrier.set_flat(0, current)?;
                Value::Array(carrier)
            }
            Value::Array(array) if ranks[position] == 0 => {
                Value::Scalar(array.get(prefix).ok_or_else(|| missing(position, prefix))?)
            }
            Value::Array(array) => Value::Array(array.subarray(prefix)?),
        };
        element.push(value);
    }

    kernel.call_element(&element)?;

    for (position, (operand, value)) in operands.iter().zip(&element).enumerate() {
        let write_back = position == nin || writable.get(position).copied().unwrap_or(false);
        if !write_back {
            continue;
        }
        if let (Value::Array(target), Value::Array(core)) = (operand, value) {
            if position == nin && ranks[position] == 0 {
                let result = core.get_flat(0).unwrap_or_else(|| Scalar::zero(target.dtype()));
                target.set(&prefixes[position], result)?;
            } else {
                target.assign_subarray(&prefixes[position], core)?;
            }
        }
    }
    Ok(())
}

/// Invoke `kernel` once per outer index of `plan`.
///
/// The output operand and any input flagged in `writable` receive the
/// kernel's writes. With `parallel` set iterations run on the rayon pool.
pub fn run_loop(
    dims: &DimensionSignature,
    plan: &LoopPlan,
    operands: &[Value],
    writable: &[bool],
    kernel: &dyn ElementKernel,
    parallel: bool,
) -> Result<()> {
    let iterations = plan.iterations();
    trace!(iterations, outer = ?plan.outer_shape, parallel, "running gufunc loop");

    if parallel {
        (0..iterations)
            .into_par_iter()
            .try_for_each(|flat| run_iteration(dims, plan, operands, writable, kernel, flat))
    } else {
        (0..iterations).try_for_each(|flat| run_iteration(dims, plan, operands, writable, kernel, flat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gufunc_sig::parse_signature;
    use gufunc_types::ScalarType::Float64;

    fn matvec(args: &[Value]) -> Result<()> {
        let (Some(m), Some(v), Some(out)) = (args[0].as_array(), args[1].as_array(), args[2].as_array()) else {
            return Err(GufuncError::ShapeMismatch("expected arrays".into()));
        };
        let shape = m.shape();
        for i in 0..shape[0] {
            let mut acc = 0.0;
            for j in 0..shape[1] {
                acc += m.get(&[i, j]).unwrap().to_f64() * v.get(&[j]).unwrap().to_f64();
            }
            out.set(&[i], Scalar::Float64(acc))?;
        }
        Ok(())
    }

    #[test]
    fn broadcasts_size_one_dimensions() {
        assert_eq!(broadcast_shapes(&[vec![3, 1], vec![4]]).unwrap(), vec![3, 4]);
        assert_eq!(broadcast_shapes(&[vec![], vec![2]]).unwrap(), vec![2]);
        assert!(broadcast_shapes(&[vec![3], vec![4]]).is_err());
    }

    #[test]
    fn output_shape_from_bound_cores() {
        let dims = parse_signature("(n,m),(m)->(n)").unwrap();
        let inputs = [
            Value::Array(Array::zeros(Float64, &[5, 3, 4])),
            Value::Array(Array::zeros(Float64, &[4])),
        ];
        assert_eq!(output_shape("matvec", &dims, &inputs).unwrap(), vec![5, 3]);
    }

    #[test]
    fn conflicting_core_sizes_are_rejected() {
        let dims = parse_signature("(n,m),(m)->(n)").unwrap();
        let operands = [
            Value::Array(Array::zeros(Float64, &[3, 4])),
            Value::Array(Array::zeros(Float64, &[5])),
            Value::Array(Array::zeros(Float64, &[3])),
        ];
        assert!(matches!(plan_loop(&dims, &operands), Err(GufuncError::ShapeMismatch(_))));
    }

    #[test]
    fn unbound_output_dimension_is_missing() {
        let dims = parse_signature("(n)->(k)").unwrap();
        let inputs = [Value::Array(Array::zeros(Float64, &[2]))];
        assert!(matches!(
            output_shape("grow", &dims, &inputs),
            Err(GufuncError::MissingOutput { .. })
        ));
    }

    #[test]
    fn loops_over_outer_dimensions() {
        let dims = parse_signature("(n,m),(m)->(n)").unwrap();
        let m = Array::from_f64(Float64, &[2, 2, 2], &[1.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 2.0]).unwrap();
        let v = Array::from_f64(Float64, &[2], &[3.0, 4.0]).unwrap();
        let out = Array::zeros(Float64, &[2, 2]);
        let operands = [Value::Array(m), Value::Array(v), Value::Array(out.clone())];

        let plan = plan_loop(&dims, &operands).unwrap();
        assert_eq!(plan.iterations(), 2);
        run_loop(&dims, &plan, &operands, &[], &matvec, false).unwrap();
        assert_eq!(out.to_f64_vec(), vec![3.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn scalar_output_uses_length_one_carrier() {
        let dims = parse_signature("(n),(n)->()").unwrap();
        let dot = |args: &[Value]| -> Result<()> {
            let (Some(a), Some(b), Some(out)) = (args[0].as_array(), args[1].as_array(), args[2].as_array()) else {
                return Err(GufuncError::ShapeMismatch("expected arrays".into()));
            };
            assert_eq!(out.shape(), vec![1]);
            let total: f64 = a.to_f64_vec().iter().zip(b.to_f64_vec()).map(|(x, y)| x * y).sum();
            out.set_flat(0, Scalar::Float64(total))?;
            Ok(())
        };
        let a = Array::from_f64(Float64, &[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Array::from_f64(Float64, &[3], &[1.0, 1.0, 1.0]).unwrap();
        let out = Array::zeros(Float64, &[2]);
        let operands = [Value::Array(a), Value::Array(b), Value::Array(out.clone())];

        let sig = element_signature(&dims, &operands);
        assert_eq!(sig.args[2], Type::array(Float64, 1));

        let plan = plan_loop(&dims, &operands).unwrap();
        run_loop(&dims, &plan, &operands, &[], &dot, true).unwrap();
        assert_eq!(out.to_f64_vec(), vec![6.0, 15.0]);
    }

    #[test]
    fn inputs_broadcast_up_to_larger_output() {
        let dims = parse_signature("(n,m),(m)->(n)").unwrap();
        let m = Array::from_f64(Float64, &[2, 2], &[1.0, 0.0, 0.0, 1.0]).unwrap();
        let v = Array::from_f64(Float64, &[2], &[3.0, 4.0]).unwrap();
        let out = Array::zeros(Float64, &[3, 2]);
        let operands = [Value::Array(m), Value::Array(v), Value::Array(out.clone())];

        let plan = plan_loop(&dims, &operands).unwrap();
        assert_eq!(plan.outer_shape, vec![3]);
        run_loop(&dims, &plan, &operands, &[], &matvec, false).unwrap();
        assert_eq!(out.to_f64_vec(), vec![3.0, 4.0, 3.0, 4.0, 3.0, 4.0]);
    }

    #[test]
    fn output_does_not_broadcast_to_inputs() {
        let dims = parse_signature("(n,m),(m)->(n)").unwrap();
        let operands = [
            Value::Array(Array::zeros(Float64, &[4, 2, 2])),
            Value::Array(Array::zeros(Float64, &[2])),
            Value::Array(Array::zeros(Float64, &[1, 2])),
        ];
        assert!(matches!(plan_loop(&dims, &operands), Err(GufuncError::ShapeMismatch(_))));
    }
}
