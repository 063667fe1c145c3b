//! Aggregate array function built from a set of compiled loops.
//!
//! A [`Ufunc`] is an immutable dispatch table: it never compiles. Dynamic
//! behaviour lives in the facade, which replaces the whole `Ufunc` after
//! each new specialization.

pub mod broadcast;
pub mod loops;

use std::fmt;
use std::sync::Arc;

use gufunc_sig::DimensionSignature;
use gufunc_types::{Array, ScalarType, Value};
use parking_lot::Mutex;
use tracing::debug;

use crate::codegen::LoweringPass;
use crate::config::{Identity, TargetOptions};
use crate::errors::{GufuncError, Result};
use crate::runtime::jit::specialization::elementwise_types;
use crate::runtime::jit::{CallSignature, CompiledArtifact, ElementwiseKey, SpecializationEntry, SpecializationRegistry};
use broadcast::{element_signature, output_shape, plan_loop, run_loop};
pub use loops::{LoopSpec, find_matching_loop, resolve_elementwise_types};

/// Keyword arguments accepted by a call.
#[derive(Debug, Clone, Default)]
pub struct Kwargs {
    pub out: Option<Value>,
}

impl Kwargs {
    pub fn with_out(out: impl Into<Value>) -> Self {
        Self {
            out: Some(out.into()),
        }
    }
}

/// One inner loop of the dispatch table.
#[derive(Debug, Clone)]
pub struct Loop {
    pub key: ElementwiseKey,
    pub signature: CallSignature,
    pub artifact: Arc<CompiledArtifact>,
    nin: usize,
}

impl Loop {
    fn from_entry(entry: &SpecializationEntry, nin: usize) -> Self {
        Self {
            key: entry.key.clone(),
            signature: entry.signature.clone(),
            artifact: Arc::clone(&entry.artifact),
            nin,
        }
    }
}

impl LoopSpec for Loop {
    fn inputs(&self) -> &[ScalarType] {
        &self.key.types()[..self.nin]
    }

    fn outputs(&self) -> &[ScalarType] {
        &self.key.types()[self.nin..]
    }
}

pub struct Ufunc {
    name: String,
    dims: Arc<DimensionSignature>,
    identity: Identity,
    loops: Vec<Loop>,
    writable: Vec<bool>,
    options: TargetOptions,
    pass: Mutex<LoweringPass>,
}

impl Ufunc {
    /// Build the dispatch table from every entry of `registry`, in
    /// registration order.
    pub fn build(
        name: impl Into<String>,
        registry: &SpecializationRegistry,
        identity: Identity,
        writable_args: &[usize],
    ) -> Self {
        let name = name.into();
        let dims = Arc::clone(registry.dims());
        let nin = dims.nin();
        let loops: Vec<Loop> = registry
            .entries()
            .iter()
            .map(|entry| Loop::from_entry(entry, nin))
            .collect();

        let nargs = nin + dims.nout();
        let mut writable = vec![false; nargs];
        for &position in writable_args {
            if let Some(slot) = writable.get_mut(position) {
                *slot = true;
            }
        }

        debug!(function = %name, loops = loops.len(), "built aggregate function");
        Self {
            pass: Mutex::new(LoweringPass::new(name.clone())),
            name,
            dims,
            identity,
            loops,
            writable,
            options: registry.options().clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &DimensionSignature {
        &self.dims
    }

    pub fn nin(&self) -> usize {
        self.dims.nin()
    }

    pub fn nout(&self) -> usize {
        self.dims.nout()
    }

    pub fn nargs(&self) -> usize {
        self.nin() + self.nout()
    }

    pub fn ntypes(&self) -> usize {
        self.loops.len()
    }

    /// Loop type codes in registration order, e.g. `"dd->d"`.
    pub fn types(&self) -> Vec<String> {
        self.loops.iter().map(|l| l.key.loop_code(self.nin())).collect()
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn signature(&self) -> String {
        self.dims.to_string()
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    pub fn find_matching_loop(&self, ewise: &[ScalarType]) -> Option<&Loop> {
        find_matching_loop(&self.loops, self.nin(), ewise)
    }

    /// Number of trampolines generated by the current lowering pass.
    pub fn trampoline_count(&self) -> usize {
        self.pass.lock().len()
    }

    /// Call with `args` (inputs, optionally followed by the output) and an
    /// optional `out`. Returns the output operand.
    pub fn call(&self, args: &[Value], out: Option<Value>) -> Result<Value> {
        let nin = self.nin();
        let mut operands = args.to_vec();
        operands.extend(out);
        if operands.len() != nin && operands.len() != nin + 1 {
            return Err(GufuncError::Arity {
                expected: nin + 1,
                found: operands.len(),
                message: format!(
                    "{}() takes from {} to {} arguments but {} were given",
                    self.name,
                    nin,
                    nin + 1,
                    operands.len()
                ),
            });
        }

        let ewise = elementwise_types(&operands)?;
        let selected = self
            .find_matching_loop(&ewise)
            .ok_or_else(|| GufuncError::NoMatchingSpecialization {
                function: self.name.clone(),
                types: ewise.clone(),
            })?;

        if operands.len() == nin {
            let dtype = selected.outputs()[0];
            operands.push(self.allocate_output(&operands, dtype)?);
        }
        self.execute(&operands, &selected.key, &selected.artifact)?;
        Ok(operands.swap_remove(nin))
    }

    /// Fresh output operand for `inputs`, shaped from the bound core dimensions.
    pub fn allocate_output(&self, inputs: &[Value], dtype: ScalarType) -> Result<Value> {
        let shape = output_shape(&self.name, &self.dims, inputs)?;
        Ok(Value::Array(Array::zeros(dtype, &shape)))
    }

    /// Run the broadcasting loop over `operands` with the trampoline for
    /// the loop keyed by `ewise`.
    pub fn execute(
        &self,
        operands: &[Value],
        ewise: &ElementwiseKey,
        artifact: &CompiledArtifact,
    ) -> Result<()> {
        let plan = plan_loop(&self.dims, operands)?;
        let outer = element_signature(&self.dims, operands);
        let trampoline = self.pass.lock().trampoline(
            &outer,
            ewise,
            artifact,
            &self.writable,
            self.options.boundscheck,
        );
        run_loop(
            &self.dims,
            &plan,
            operands,
            &self.writable,
            trampoline.as_ref(),
            self.options.parallel,
        )
    }
}

impl fmt::Debug for Ufunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ufunc")
            .field("name", &self.name)
            .field("signature", &self.signature())
            .field("types", &self.types())
            .finish()
    }
}
