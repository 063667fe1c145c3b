use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use ahash::AHasher;
use gufunc_sig::DimensionSignature;
use gufunc_types::{Object, Type, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::artifact::{CompiledArtifact, EntryPoint, LibraryId};
use super::kernel::{KernelBody, KernelError, KernelImpl, NativeFn, ObjectFn};
use super::specialization::CallSignature;
use crate::config::TargetOptions;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to compile '{kernel}' for {signature}: {reason}")]
pub struct CompilationError {
    pub kernel: String,
    pub signature: String,
    pub reason: String,
}

/// Everything the compiler needs to produce one specialization.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub signature: &'a CallSignature,
    pub kernel: &'a KernelBody,
    pub dims: &'a DimensionSignature,
    pub options: &'a TargetOptions,
}

/// Just-in-time compiler turning a kernel body into a callable artifact.
pub trait KernelCompiler: Send + Sync {
    fn compile(&self, request: CompileRequest<'_>) -> Result<CompiledArtifact, CompilationError>;

    /// Number of successful compilations performed so far.
    fn compile_count(&self) -> u64;
}

/// In-process compiler that validates a call signature against the
/// dimension signature and binds the kernel body under the selected
/// calling convention.
#[derive(Debug, Default)]
pub struct JitEngine {
    compilations: AtomicU64,
    failures: AtomicU64,
}

impl JitEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh engine behind the trait object the builder expects.
    pub fn new_dyn() -> Arc<dyn KernelCompiler> {
        Arc::new(Self::new())
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn validate(request: &CompileRequest<'_>) -> Result<(), String> {
        let CompileRequest {
            signature, dims, ..
        } = request;

        if signature.return_type != Type::None {
            return Err(format!(
                "kernels return through their output operand, not {}",
                signature.return_type
            ));
        }

        let expected = dims.nin() + dims.nout();
        if signature.args.len() != expected {
            return Err(format!(
                "expected {expected} operands for signature {dims}, found {}",
                signature.args.len()
            ));
        }

        for (position, (arg, rank)) in signature.args.iter().zip(dims.input_ranks()).enumerate() {
            let ok = match arg {
                Type::Scalar { .. } => rank == 0,
                Type::Array(array) => array.ndim == rank && rank > 0,
                _ => false,
            };
            if !ok {
                return Err(format!(
                    "operand {position} of type {arg} does not match core rank {rank}"
                ));
            }
        }

        let out_rank = dims.output_rank().max(1);
        match signature.args.last() {
            Some(Type::Array(array)) if array.ndim == out_rank => {}
            other => {
                return Err(format!(
                    "output operand must be a {out_rank}d array, found {}",
                    other.map_or_else(|| "nothing".to_string(), ToString::to_string)
                ));
            }
        }

        let unbound = dims.unbound_output_dims();
        if !unbound.is_empty() {
            return Err(format!(
                "output dimensions [{}] are not bound by any input",
                unbound.join(", ")
            ));
        }

        Ok(())
    }

    fn bind_entry(request: &CompileRequest<'_>) -> Result<EntryPoint, String> {
        match request.kernel.implementation() {
            KernelImpl::Object(body) => {
                if request.options.nopython {
                    return Err("object-mode kernel cannot be compiled with nopython".into());
                }
                Ok(EntryPoint::Object(Arc::clone(body)))
            }
            KernelImpl::Native(body) if request.options.forceobj => {
                warn!(
                    kernel = request.kernel.name(),
                    "forceobj set, compiling under the object calling convention"
                );
                Ok(EntryPoint::Object(box_native(Arc::clone(body))))
            }
            KernelImpl::Native(body) => Ok(EntryPoint::Native(Arc::clone(body))),
        }
    }

    fn symbol_name(kernel: &KernelBody, signature: &CallSignature) -> String {
        let mut hasher = AHasher::default();
        signature.hash(&mut hasher);
        format!("__gufunc_{}_{:016x}", kernel.name(), hasher.finish())
    }
}

/// Adapt a native body to the object calling convention.
fn box_native(body: NativeFn) -> ObjectFn {
    Arc::new(move |objects: &[Object]| {
        let values = objects
            .iter()
            .map(|object| {
                object
                    .as_value()
                    .cloned()
                    .ok_or_else(|| KernelError::new("cannot unbox None operand"))
            })
            .collect::<Result<Vec<Value>, _>>()?;
        body(&values)?;
        Ok(Object::None)
    })
}

impl KernelCompiler for JitEngine {
    fn compile(&self, request: CompileRequest<'_>) -> Result<CompiledArtifact, CompilationError> {
        let start = Instant::now();
        let fail = |reason: String| {
            self.failures.fetch_add(1, Ordering::Relaxed);
            CompilationError {
                kernel: request.kernel.name().to_string(),
                signature: request.signature.to_string(),
                reason,
            }
        };

        Self::validate(&request).map_err(fail)?;
        let entry = Self::bind_entry(&request).map_err(fail)?;

        let serial = self.compilations.fetch_add(1, Ordering::Relaxed) + 1;
        let artifact = CompiledArtifact {
            symbol: Self::symbol_name(request.kernel, request.signature),
            library: LibraryId(format!("{}.lib{}", request.kernel.name(), serial)),
            signature: request.signature.clone(),
            entry,
            compile_time: start.elapsed(),
        };

        debug!(
            kernel = request.kernel.name(),
            signature = %request.signature,
            symbol = %artifact.symbol,
            convention = ?artifact.convention(),
            elapsed = ?artifact.compile_time,
            "compiled kernel"
        );
        Ok(artifact)
    }

    fn compile_count(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::jit::artifact::CallConv;
    use gufunc_sig::parse_signature;
    use gufunc_types::ScalarType;

    fn request<'a>(
        signature: &'a CallSignature,
        kernel: &'a KernelBody,
        dims: &'a DimensionSignature,
        options: &'a TargetOptions,
    ) -> CompileRequest<'a> {
        CompileRequest {
            signature,
            kernel,
            dims,
            options,
        }
    }

    fn matvec_signature() -> CallSignature {
        CallSignature::void(vec![
            Type::array(ScalarType::Float64, 2),
            Type::array(ScalarType::Float64, 1),
            Type::array(ScalarType::Float64, 1),
        ])
    }

    #[test]
    fn compiles_native_kernel() {
        let engine = JitEngine::new();
        let dims = parse_signature("(n,m),(m)->(n)").unwrap();
        let kernel = KernelBody::native("matvec", |_| Ok(()));
        let sig = matvec_signature();
        let options = TargetOptions::default();

        let artifact = engine.compile(request(&sig, &kernel, &dims, &options)).unwrap();
        assert_eq!(artifact.convention(), CallConv::Native);
        assert!(artifact.symbol.starts_with("__gufunc_matvec_"));
        assert_eq!(engine.compile_count(), 1);
    }

    #[test]
    fn rank_mismatch_is_a_compilation_error() {
        let engine = JitEngine::new();
        let dims = parse_signature("(n,m),(m)->(n)").unwrap();
        let kernel = KernelBody::native("matvec", |_| Ok(()));
        let sig = CallSignature::void(vec![
            Type::array(ScalarType::Float64, 1),
            Type::array(ScalarType::Float64, 1),
            Type::array(ScalarType::Float64, 1),
        ]);
        let options = TargetOptions::default();

        let err = engine
            .compile(request(&sig, &kernel, &dims, &options))
            .unwrap_err();
        assert!(err.reason.contains("core rank 2"), "{}", err.reason);
        assert_eq!(engine.compile_count(), 0);
        assert_eq!(engine.failure_count(), 1);
    }

    #[test]
    fn forceobj_selects_object_convention() {
        let engine = JitEngine::new();
        let dims = parse_signature("(n,m),(m)->(n)").unwrap();
        let kernel = KernelBody::native("matvec", |_| Ok(()));
        let sig = matvec_signature();
        let options = TargetOptions::default().forceobj(true);

        let artifact = engine.compile(request(&sig, &kernel, &dims, &options)).unwrap();
        assert!(artifact.is_object_mode());
    }

    #[test]
    fn nopython_rejects_object_kernels() {
        let engine = JitEngine::new();
        let dims = parse_signature("(n),(n)->()").unwrap();
        let kernel = KernelBody::object("dot", |_| Ok(Object::None));
        let sig = CallSignature::void(vec![
            Type::array(ScalarType::Float64, 1),
            Type::array(ScalarType::Float64, 1),
            Type::array(ScalarType::Float64, 1),
        ]);
        let options = TargetOptions::default().nopython(true);

        assert!(engine.compile(request(&sig, &kernel, &dims, &options)).is_err());
    }

    #[test]
    fn unbound_output_dimension_is_rejected() {
        let engine = JitEngine::new();
        let dims = parse_signature("(n)->(k)").unwrap();
        let kernel = KernelBody::native("grow", |_| Ok(()));
        let sig = CallSignature::void(vec![
            Type::array(ScalarType::Float64, 1),
            Type::array(ScalarType::Float64, 1),
        ]);
        let options = TargetOptions::default();

        let err = engine
            .compile(request(&sig, &kernel, &dims, &options))
            .unwrap_err();
        assert!(err.reason.contains("[k]"), "{}", err.reason);
    }
}
