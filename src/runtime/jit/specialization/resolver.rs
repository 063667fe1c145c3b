use gufunc_sig::DimensionSignature;
use gufunc_types::{ScalarType, Type};
use tracing::debug;

use super::CallSignature;
use crate::errors::{GufuncError, Result};
use crate::runtime::jit::cache::{SpecializationEntry, SpecializationRegistry};

/// How a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    /// An entry with exactly these element-wise types existed.
    Exact,
    /// A loop accepting these types under host casting rules was selected.
    Compatible,
    /// A new specialization was compiled.
    Compiled,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub signature: CallSignature,
    /// Element-wise types after any widening to the selected loop.
    pub elementwise: Vec<ScalarType>,
    pub kind: ResolutionKind,
}

/// Build the call signature for `ewise` from the parsed dimension signature.
///
/// Inputs with an empty core are scalars, the rest arrays of the core rank.
/// The output is always an array, of rank one when its core is empty. When
/// `ewise` holds only the inputs, the output takes the last input's type.
pub fn synthesize_signature(dims: &DimensionSignature, ewise: &[ScalarType]) -> CallSignature {
    let mut args: Vec<Type> = dims
        .inputs()
        .iter()
        .zip(ewise)
        .map(|(core, &dtype)| {
            if core.is_empty() {
                Type::scalar(dtype)
            } else {
                Type::array(dtype, core.len())
            }
        })
        .collect();

    if let Some(&out_dtype) = ewise.get(dims.nin()).or_else(|| ewise.last()) {
        args.push(Type::array(out_dtype, dims.output_rank().max(1)));
    }
    CallSignature::void(args)
}

/// Decides between reusing, widening to, or compiling a specialization.
pub struct SpecializationResolver<'a> {
    registry: &'a mut SpecializationRegistry,
    function: &'a str,
}

impl<'a> SpecializationResolver<'a> {
    pub fn new(registry: &'a mut SpecializationRegistry, function: &'a str) -> Self {
        Self { registry, function }
    }

    fn no_match(&self, ewise: &[ScalarType]) -> GufuncError {
        GufuncError::NoMatchingSpecialization {
            function: self.function.to_string(),
            types: ewise.to_vec(),
        }
    }

    fn resolved(entry: &SpecializationEntry, elementwise: Vec<ScalarType>, kind: ResolutionKind) -> Resolution {
        Resolution {
            signature: entry.signature.clone(),
            elementwise,
            kind,
        }
    }

    /// Resolve `ewise` to a stored specialization.
    ///
    /// `frozen` restricts the search to host-compatible loops. Otherwise an
    /// exact match is reused; failing that, `may_compile` decides between
    /// compiling a new specialization and falling back to a compatible loop.
    pub fn resolve(
        &mut self,
        ewise: &[ScalarType],
        frozen: bool,
        may_compile: bool,
    ) -> Result<Resolution> {
        if frozen {
            return self
                .registry
                .find_compatible(ewise)
                .map(|(widened, entry)| {
                    let kind = if widened.as_slice() == ewise {
                        ResolutionKind::Exact
                    } else {
                        ResolutionKind::Compatible
                    };
                    Self::resolved(entry, widened, kind)
                })
                .ok_or_else(|| self.no_match(ewise));
        }

        if let Some(entry) = self.registry.find(ewise) {
            return Ok(Self::resolved(entry, ewise.to_vec(), ResolutionKind::Exact));
        }

        if !may_compile {
            return self
                .registry
                .find_compatible(ewise)
                .map(|(widened, entry)| Self::resolved(entry, widened, ResolutionKind::Compatible))
                .ok_or_else(|| self.no_match(ewise));
        }

        let signature = synthesize_signature(self.registry.dims(), ewise);
        debug!(function = self.function, signature = %signature, "compiling new specialization");
        self.registry.insert(signature)?;

        match self.registry.find(ewise) {
            Some(entry) => Ok(Self::resolved(entry, ewise.to_vec(), ResolutionKind::Compiled)),
            None => panic!(
                "specialization for {:?} of {} missing right after insertion",
                ewise, self.function
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::TargetOptions;
    use crate::runtime::jit::engine::{JitEngine, KernelCompiler};
    use crate::runtime::jit::kernel::KernelBody;
    use gufunc_sig::parse_signature;
    use ScalarType::{Float32, Float64, Int32};

    fn registry(sig: &str, engine: Arc<JitEngine>) -> SpecializationRegistry {
        SpecializationRegistry::new(
            KernelBody::native("kernel", |_| Ok(())),
            Arc::new(parse_signature(sig).unwrap()),
            TargetOptions::default(),
            engine,
        )
    }

    #[test]
    fn synthesizes_arrays_and_scalars() {
        let dims = parse_signature("(n,m),(),(m)->(n)").unwrap();
        let sig = synthesize_signature(&dims, &[Float64, Int32, Float64, Float32]);
        assert_eq!(
            sig.args,
            vec![
                Type::array(Float64, 2),
                Type::scalar(Int32),
                Type::array(Float64, 1),
                Type::array(Float32, 1),
            ]
        );
        assert_eq!(sig.return_type, Type::None);
    }

    #[test]
    fn scalar_output_is_carried_in_rank_one_array() {
        let dims = parse_signature("(n),(n)->()").unwrap();
        let sig = synthesize_signature(&dims, &[Float32, Float32, Float32]);
        assert_eq!(sig.args[2], Type::array(Float32, 1));
    }

    #[test]
    fn implicit_output_takes_last_input_type() {
        let dims = parse_signature("(n),()->(n)").unwrap();
        let sig = synthesize_signature(&dims, &[Float32, Int32]);
        assert_eq!(sig.args[2], Type::array(Int32, 1));
    }

    #[test]
    fn compiles_once_then_reuses() {
        let engine = Arc::new(JitEngine::new());
        let mut registry = registry("(n),(n)->()", Arc::clone(&engine));

        let first = SpecializationResolver::new(&mut registry, "dot")
            .resolve(&[Float64, Float64, Float64], false, true)
            .unwrap();
        assert_eq!(first.kind, ResolutionKind::Compiled);

        let second = SpecializationResolver::new(&mut registry, "dot")
            .resolve(&[Float64, Float64, Float64], false, true)
            .unwrap();
        assert_eq!(second.kind, ResolutionKind::Exact);
        assert_eq!(second.signature, first.signature);
        assert_eq!(engine.compile_count(), 1);
    }

    #[test]
    fn frozen_never_compiles() {
        let engine = Arc::new(JitEngine::new());
        let mut registry = registry("(n),(n)->()", Arc::clone(&engine));
        SpecializationResolver::new(&mut registry, "dot")
            .resolve(&[Float32, Float32, Float32], false, true)
            .unwrap();

        let err = SpecializationResolver::new(&mut registry, "dot")
            .resolve(&[Float64, Float64, Float64], true, true)
            .unwrap_err();
        assert!(matches!(err, GufuncError::NoMatchingSpecialization { .. }));
        assert_eq!(engine.compile_count(), 1);
    }

    #[test]
    fn frozen_widens_to_compatible_loop() {
        let engine = Arc::new(JitEngine::new());
        let mut registry = registry("(n),(n)->()", Arc::clone(&engine));
        SpecializationResolver::new(&mut registry, "dot")
            .resolve(&[Float64, Float64, Float64], false, true)
            .unwrap();

        let resolution = SpecializationResolver::new(&mut registry, "dot")
            .resolve(&[Int32, Float32, Float64], true, true)
            .unwrap();
        assert_eq!(resolution.kind, ResolutionKind::Compatible);
        assert_eq!(resolution.elementwise, vec![Float64, Float64, Float64]);
    }

    #[test]
    fn static_functions_fall_back_without_compiling() {
        let engine = Arc::new(JitEngine::new());
        let mut registry = registry("(n),(n)->()", Arc::clone(&engine));
        let err = SpecializationResolver::new(&mut registry, "dot")
            .resolve(&[Float64, Float64, Float64], false, false)
            .unwrap_err();
        assert!(matches!(err, GufuncError::NoMatchingSpecialization { .. }));
        assert_eq!(engine.compile_count(), 0);
    }
}
