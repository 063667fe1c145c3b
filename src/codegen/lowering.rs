use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use gufunc_types::Value;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::trace;

use super::module::CodegenModule;
use super::trampoline::KernelTrampoline;
use super::typing::FunctionKey;
use crate::errors::{GufuncError, Result};
use crate::runtime::jit::{CallSignature, CompiledArtifact, ElementwiseKey};

/// One argument position of a lowering entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgPattern {
    Any,
    Array,
}

impl ArgPattern {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ArgPattern::Any => true,
            ArgPattern::Array => matches!(value, Value::Array(_)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallShape(pub Vec<ArgPattern>);

impl CallShape {
    pub fn matches(&self, args: &[Value]) -> bool {
        self.0.len() == args.len() && self.0.iter().zip(args).all(|(p, v)| p.accepts(v))
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .0
            .iter()
            .map(|p| match p {
                ArgPattern::Any => "any",
                ArgPattern::Array => "array",
            })
            .collect::<Vec<_>>();
        write!(f, "({})", parts.join(", "))
    }
}

/// Implementation of a call once its arguments are known.
pub trait Lowerer: Send + Sync {
    fn lower(&self, args: &[Value]) -> Result<Value>;
}

/// Registration of a lowerer for one call shape of a function.
#[derive(Clone)]
pub struct FuncDefn {
    pub key: FunctionKey,
    pub shape: CallShape,
    pub lowerer: Arc<dyn Lowerer>,
}

#[derive(Clone, Default)]
pub struct TargetContext {
    inner: Arc<Mutex<HashMap<FunctionKey, Vec<(CallShape, Arc<dyn Lowerer>)>>>>,
}

impl TargetContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static Self {
        static GLOBAL: Lazy<TargetContext> = Lazy::new(TargetContext::new);
        &GLOBAL
    }

    pub fn insert_func_defn(&self, defns: impl IntoIterator<Item = FuncDefn>) {
        let mut guard = self.inner.lock();
        for defn in defns {
            trace!(function = %defn.key, shape = %defn.shape, "installed lowering entry point");
            let slots = guard.entry(defn.key).or_default();
            slots.retain(|(shape, _)| *shape != defn.shape);
            slots.push((defn.shape, defn.lowerer));
        }
    }

    pub fn remove(&self, key: &FunctionKey) {
        self.inner.lock().remove(key);
    }

    pub fn shapes(&self, key: &FunctionKey) -> Vec<CallShape> {
        self.inner
            .lock()
            .get(key)
            .map(|slots| slots.iter().map(|(shape, _)| shape.clone()).collect())
            .unwrap_or_default()
    }

    /// Lower a call to `key` with the first entry point whose shape accepts
    /// `args`. The lowerer runs without the context lock held.
    pub fn lower_call(&self, key: &FunctionKey, args: &[Value]) -> Result<Value> {
        let lowerer = {
            let guard = self.inner.lock();
            let slots = guard
                .get(key)
                .ok_or_else(|| GufuncError::Typing(format!("no lowering registered for {key}")))?;
            slots
                .iter()
                .find(|(shape, _)| shape.matches(args))
                .map(|(_, lowerer)| Arc::clone(lowerer))
                .ok_or_else(|| {
                    GufuncError::Typing(format!(
                        "no lowering of {key} accepts {} argument(s)",
                        args.len()
                    ))
                })?
        };
        lowerer.lower(args)
    }
}

/// Code generation state for one aggregate function: the module its
/// trampolines declare entry points in, and the trampolines themselves.
#[derive(Debug)]
pub struct LoweringPass {
    module: CodegenModule,
    trampolines: HashMap<(CallSignature, ElementwiseKey), Arc<KernelTrampoline>>,
}

impl LoweringPass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: CodegenModule::new(name),
            trampolines: HashMap::new(),
        }
    }

    pub fn module(&self) -> &CodegenModule {
        &self.module
    }

    pub fn len(&self) -> usize {
        self.trampolines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trampolines.is_empty()
    }

    /// Trampoline for `outer` running the loop keyed by `ewise`, generated
    /// on first use.
    pub fn trampoline(
        &mut self,
        outer: &CallSignature,
        ewise: &ElementwiseKey,
        artifact: &CompiledArtifact,
        writable: &[bool],
        boundscheck: bool,
    ) -> Arc<KernelTrampoline> {
        let memo_key = (outer.clone(), ewise.clone());
        if let Some(existing) = self.trampolines.get(&memo_key) {
            trace!(symbol = existing.symbol(), "trampoline memo hit");
            return Arc::clone(existing);
        }
        let trampoline = Arc::new(KernelTrampoline::generate(
            &mut self.module,
            outer,
            artifact,
            writable,
            boundscheck,
        ));
        self.trampolines.insert(memo_key, Arc::clone(&trampoline));
        trampoline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gufunc_types::{Array, Scalar, ScalarType, Type};
    use std::time::Duration;

    use crate::runtime::jit::{EntryPoint, LibraryId};

    struct Echo;

    impl Lowerer for Echo {
        fn lower(&self, args: &[Value]) -> Result<Value> {
            Ok(args[args.len() - 1].clone())
        }
    }

    #[test]
    fn selects_entry_point_by_shape() {
        let ctx = TargetContext::new();
        let key = FunctionKey::new("f");
        let lowerer: Arc<dyn Lowerer> = Arc::new(Echo);
        ctx.insert_func_defn([FuncDefn {
            key: key.clone(),
            shape: CallShape(vec![ArgPattern::Any, ArgPattern::Array]),
            lowerer,
        }]);

        let out = Array::zeros(ScalarType::Int64, &[2]);
        let result = ctx
            .lower_call(&key, &[Value::Scalar(Scalar::Int64(1)), Value::Array(out.clone())])
            .unwrap();
        assert!(result.as_array().unwrap().ptr_eq(&out));

        let err = ctx
            .lower_call(&key, &[Value::Scalar(Scalar::Int64(1)), Value::Scalar(Scalar::Int64(2))])
            .unwrap_err();
        assert!(matches!(err, GufuncError::Typing(_)));
    }

    #[test]
    fn memoizes_trampolines_per_outer_signature() {
        let sig = CallSignature::void(vec![
            Type::scalar(ScalarType::Float64),
            Type::array(ScalarType::Float64, 1),
        ]);
        let artifact = CompiledArtifact {
            symbol: "__gufunc_fill".into(),
            library: LibraryId("fill.lib1".into()),
            signature: sig.clone(),
            entry: EntryPoint::Native(Arc::new(|_: &[Value]| Ok(()))),
            compile_time: Duration::ZERO,
        };
        let ewise = ElementwiseKey::new(vec![ScalarType::Float64, ScalarType::Float64]);

        let mut pass = LoweringPass::new("fill");
        let first = pass.trampoline(&sig, &ewise, &artifact, &[], false);
        let second = pass.trampoline(&sig, &ewise, &artifact, &[], false);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pass.len(), 1);
        assert_eq!(pass.module().functions().count(), 1);
    }
}
