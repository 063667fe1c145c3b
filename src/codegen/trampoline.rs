//! Bridge between the broadcasting loop and a compiled kernel.
//!
//! A [`KernelTrampoline`] is generated once per outer element signature and
//! element-wise type combination. Per element it casts the loop's values to
//! the kernel's declared operand types, calls the entry point under the
//! artifact's calling convention and copies converted writable operands
//! back.

use std::fmt;
use std::sync::Arc;

use gufunc_types::{Object, Type, Value, cast_value};
use tracing::{debug, warn};

use super::module::{CodegenModule, FnAttribute, FunctionType};
use crate::errors::{GufuncError, Result};
use crate::runtime::jit::{CallConv, CallSignature, CompiledArtifact, EntryPoint, NativeFn, ObjectFn};
use crate::ufunc::broadcast::ElementKernel;

/// How a compiled entry point expects to be called.
pub trait CallingConvention {
    type Callee: Clone + Send + Sync + 'static;

    const CONV: CallConv;

    /// Low-level type of the entry point for the inner signature.
    fn function_type(inner: &CallSignature) -> FunctionType;

    fn call(callee: &Self::Callee, args: &[Value]) -> Result<()>;
}

/// Typed operands, no return value.
pub struct NativeConvention;

impl CallingConvention for NativeConvention {
    type Callee = NativeFn;

    const CONV: CallConv = CallConv::Native;

    fn function_type(inner: &CallSignature) -> FunctionType {
        FunctionType::new(inner.return_type, inner.args.clone())
    }

    fn call(callee: &NativeFn, args: &[Value]) -> Result<()> {
        callee(args).map_err(GufuncError::from)
    }
}

/// Every operand boxed as a host object; the returned object is discarded.
pub struct ObjectConvention;

impl CallingConvention for ObjectConvention {
    type Callee = ObjectFn;

    const CONV: CallConv = CallConv::Object;

    fn function_type(inner: &CallSignature) -> FunctionType {
        FunctionType::new(Type::Object, vec![Type::Object; inner.args.len()])
    }

    fn call(callee: &ObjectFn, args: &[Value]) -> Result<()> {
        let boxed: Vec<Object> = args.iter().map(Object::boxed).collect();
        callee(&boxed)?;
        Ok(())
    }
}

type Invoker = Arc<dyn Fn(&[Value]) -> Result<()> + Send + Sync>;

pub struct KernelTrampoline {
    outer: CallSignature,
    inner: CallSignature,
    symbol: String,
    convention: CallConv,
    writable: Vec<bool>,
    boundscheck: bool,
    invoke: Invoker,
}

impl KernelTrampoline {
    /// Declare the artifact's entry point in `module` and build the bridge.
    ///
    /// `outer` types the per-element values the loop supplies; `writable`
    /// flags inputs whose converted copies must be written back.
    pub fn generate(
        module: &mut CodegenModule,
        outer: &CallSignature,
        artifact: &CompiledArtifact,
        writable: &[bool],
        boundscheck: bool,
    ) -> Self {
        match &artifact.entry {
            EntryPoint::Native(callee) => Self::generate_with::<NativeConvention>(
                module,
                outer,
                artifact,
                callee.clone(),
                writable,
                boundscheck,
            ),
            EntryPoint::Object(callee) => {
                warn!(symbol = %artifact.symbol, "lowering kernel under the object calling convention");
                Self::generate_with::<ObjectConvention>(
                    module,
                    outer,
                    artifact,
                    callee.clone(),
                    writable,
                    boundscheck,
                )
            }
        }
    }

    fn generate_with<C: CallingConvention>(
        module: &mut CodegenModule,
        outer: &CallSignature,
        artifact: &CompiledArtifact,
        callee: C::Callee,
        writable: &[bool],
        boundscheck: bool,
    ) -> Self {
        let inner = artifact.signature.clone();
        let fnty = C::function_type(&inner);

        module.add_linking_libs([artifact.library.clone()]);
        let decl = module.get_or_insert_function(fnty, &artifact.symbol);
        decl.attributes.insert(FnAttribute::AlwaysInline);

        debug!(
            symbol = %artifact.symbol,
            outer = %outer,
            inner = %inner,
            fnty = %decl.fnty,
            "generated kernel trampoline"
        );

        let invoke: Invoker = Arc::new(move |args: &[Value]| C::call(&callee, args));
        let mut writable = writable.to_vec();
        writable.resize(inner.args.len(), false);
        // the output operand always receives the kernel's writes
        if let Some(output) = writable.last_mut() {
            *output = true;
        }

        Self {
            outer: outer.clone(),
            inner,
            symbol: artifact.symbol.clone(),
            convention: C::CONV,
            writable,
            boundscheck,
            invoke,
        }
    }

    pub fn outer_signature(&self) -> &CallSignature {
        &self.outer
    }

    pub fn inner_signature(&self) -> &CallSignature {
        &self.inner
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn convention(&self) -> CallConv {
        self.convention
    }

    fn check_operands(&self, args: &[Value]) -> Result<()> {
        for (position, (arg, expected)) in args.iter().zip(&self.inner.args).enumerate() {
            let rank_ok = match (arg, expected) {
                (Value::Array(array), Type::Array(ty)) => array.ndim() == ty.ndim,
                (Value::Scalar(_), Type::Scalar { .. }) => true,
                (_, Type::Any | Type::Object) => true,
                _ => false,
            };
            if !rank_ok {
                return Err(GufuncError::ShapeMismatch(format!(
                    "operand {position} of {} has shape {:?}, kernel expects {expected}",
                    self.symbol,
                    arg.shape()
                )));
            }
        }
        Ok(())
    }

    /// Run the kernel on one element's operands.
    pub fn call(&self, args: &[Value]) -> Result<()> {
        if args.len() != self.inner.args.len() {
            return Err(GufuncError::arity(
                &self.symbol,
                self.inner.args.len(),
                args.len(),
            ));
        }
        if self.boundscheck {
            self.check_operands(args)?;
        }

        let cast_args = args
            .iter()
            .zip(self.outer.args.iter().zip(&self.inner.args))
            .map(|(value, (from, to))| cast_value(value, from, to))
            .collect::<Result<Vec<_>, _>>()?;

        (self.invoke)(&cast_args)?;

        for ((original, converted), writable) in args.iter().zip(&cast_args).zip(&self.writable) {
            if !writable {
                continue;
            }
            if let (Value::Array(original), Value::Array(converted)) = (original, converted) {
                if !original.ptr_eq(converted) {
                    original.assign_subarray(&[], converted)?;
                }
            }
        }
        Ok(())
    }
}

impl ElementKernel for KernelTrampoline {
    fn call_element(&self, args: &[Value]) -> Result<()> {
        self.call(args)
    }
}

impl fmt::Debug for KernelTrampoline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelTrampoline")
            .field("symbol", &self.symbol)
            .field("outer", &self.outer.to_string())
            .field("inner", &self.inner.to_string())
            .field("convention", &self.convention)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use gufunc_types::{Array, Scalar, ScalarType};
    use parking_lot::Mutex;

    use crate::runtime::jit::{KernelError, LibraryId};

    fn artifact(entry: EntryPoint, signature: CallSignature) -> CompiledArtifact {
        CompiledArtifact {
            symbol: "__gufunc_scale".into(),
            library: LibraryId("scale.lib1".into()),
            signature,
            entry,
            compile_time: Duration::ZERO,
        }
    }

    fn scale_signature(ty: ScalarType) -> CallSignature {
        CallSignature::void(vec![Type::array(ty, 1), Type::scalar(ty), Type::array(ty, 1)])
    }

    fn scale_native() -> NativeFn {
        Arc::new(|args: &[Value]| {
            let (Some(input), Some(factor), Some(out)) = (
                args[0].as_array(),
                args[1].as_scalar(),
                args[2].as_array(),
            ) else {
                return Err(KernelError::new("unexpected operands"));
            };
            for i in 0..input.size() {
                let v = input.get_flat(i).unwrap_or(Scalar::Float64(0.0)).to_f64();
                out.set_flat(i, Scalar::Float64(v * factor.to_f64()))
                    .map_err(|e| KernelError::new(e.to_string()))?;
            }
            Ok(())
        })
    }

    #[test]
    fn native_call_declares_inlined_entry_point() {
        let mut module = CodegenModule::new("pass");
        let sig = scale_signature(ScalarType::Float64);
        let artifact = artifact(EntryPoint::Native(scale_native()), sig.clone());
        let trampoline = KernelTrampoline::generate(&mut module, &sig, &artifact, &[false, false, true], false);

        let decl = module.get_function("__gufunc_scale").unwrap();
        assert!(decl.has_attribute(FnAttribute::AlwaysInline));
        assert_eq!(decl.fnty, FunctionType::new(Type::None, sig.args.clone()));
        assert_eq!(module.linked_libraries().count(), 1);

        let input = Array::from_f64(ScalarType::Float64, &[3], &[1.0, 2.0, 3.0]).unwrap();
        let out = Array::zeros(ScalarType::Float64, &[3]);
        trampoline
            .call(&[
                Value::Array(input),
                Value::Scalar(Scalar::Float64(2.0)),
                Value::Array(out.clone()),
            ])
            .unwrap();
        assert_eq!(out.to_f64_vec(), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn casts_operands_and_writes_back_converted_output() {
        let mut module = CodegenModule::new("pass");
        let inner = scale_signature(ScalarType::Float64);
        let outer = CallSignature::void(vec![
            Type::array(ScalarType::Int32, 1),
            Type::scalar(ScalarType::Int32),
            Type::array(ScalarType::Float32, 1),
        ]);
        let artifact = artifact(EntryPoint::Native(scale_native()), inner);
        let trampoline = KernelTrampoline::generate(&mut module, &outer, &artifact, &[false, false, true], true);

        let input = Array::from_i64(ScalarType::Int32, &[2], &[3, 4]).unwrap();
        let out = Array::zeros(ScalarType::Float32, &[2]);
        trampoline
            .call(&[
                Value::Array(input),
                Value::Scalar(Scalar::Int32(3)),
                Value::Array(out.clone()),
            ])
            .unwrap();
        assert_eq!(out.dtype(), ScalarType::Float32);
        assert_eq!(out.to_f64_vec(), vec![9.0, 12.0]);
    }

    #[test]
    fn object_convention_boxes_every_operand() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_kernel = Arc::clone(&seen);
        let callee: ObjectFn = Arc::new(move |objects: &[Object]| {
            seen_in_kernel.lock().push(objects.len());
            assert!(objects.iter().all(|o| !o.is_none()));
            Ok(Object::None)
        });

        let mut module = CodegenModule::new("pass");
        let sig = scale_signature(ScalarType::Float64);
        let artifact = artifact(EntryPoint::Object(callee), sig.clone());
        let trampoline = KernelTrampoline::generate(&mut module, &sig, &artifact, &[], false);
        assert_eq!(trampoline.convention(), CallConv::Object);

        let decl = module.get_function("__gufunc_scale").unwrap();
        assert_eq!(decl.fnty, FunctionType::new(Type::Object, vec![Type::Object; 3]));

        trampoline
            .call(&[
                Value::Array(Array::zeros(ScalarType::Float64, &[1])),
                Value::Scalar(Scalar::Float64(1.0)),
                Value::Array(Array::zeros(ScalarType::Float64, &[1])),
            ])
            .unwrap();
        assert_eq!(*seen.lock(), vec![3]);
    }

    #[test]
    fn boundscheck_reports_rank_mismatch() {
        let mut module = CodegenModule::new("pass");
        let sig = scale_signature(ScalarType::Float64);
        let artifact = artifact(EntryPoint::Native(scale_native()), sig.clone());
        let trampoline = KernelTrampoline::generate(&mut module, &sig, &artifact, &[], true);

        let err = trampoline
            .call(&[
                Value::Array(Array::zeros(ScalarType::Float64, &[2, 2])),
                Value::Scalar(Scalar::Float64(1.0)),
                Value::Array(Array::zeros(ScalarType::Float64, &[2])),
            ])
            .unwrap_err();
        assert!(matches!(err, GufuncError::ShapeMismatch(_)));
    }
}
