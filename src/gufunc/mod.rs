//! Dynamic generalized universal functions.
//!
//! A [`Gufunc`] behaves like an aggregate array function whose loop table
//! grows at call time: a dynamic, unfrozen gufunc compiles a specialization
//! for every new combination of element-wise types it is called with, then
//! rebuilds its aggregate function and delegates to it.

mod hooks;
mod lifecycle;
mod state;

use std::fmt;
use std::sync::Arc;

use gufunc_sig::{DimensionSignature, parse_signature};
use gufunc_types::{ScalarType, Type, Value};
use parking_lot::RwLock;
use tracing::{debug, trace};

pub use lifecycle::{Dispatch, Lifecycle, Phase};
pub use state::GufuncState;

use crate::codegen::{FunctionKey, TargetContext, TypingContext};
use crate::config::{Identity, TargetOptions};
use crate::errors::{GufuncError, Result};
use crate::runtime::jit::specialization::elementwise_types;
use crate::runtime::jit::{
    CallSignature, JitEngine, KernelBody, KernelCompiler, KernelLibrary, ResolutionKind,
    SpecializationEntry, SpecializationRegistry, SpecializationResolver,
};
use crate::ufunc::{Kwargs, LoopSpec, Ufunc, resolve_elementwise_types};

struct GufuncCore {
    registry: SpecializationRegistry,
    lifecycle: Lifecycle,
    ufunc: Arc<Ufunc>,
}

impl GufuncCore {
    fn rebuild_ufunc(&mut self, name: &str, identity: Identity, writable_args: &[usize]) {
        self.ufunc = Arc::new(Ufunc::build(name, &self.registry, identity, writable_args));
    }

    fn find_ewise_function(&self, ewise: &[ScalarType]) -> Option<SpecializationEntry> {
        if self.lifecycle.is_frozen() {
            self.registry
                .find_compatible(ewise)
                .map(|(_, entry)| entry.clone())
        } else {
            self.registry.find(ewise).cloned()
        }
    }
}

pub(crate) struct GufuncInner {
    key: FunctionKey,
    name: String,
    doc: Option<String>,
    signature: String,
    identity: Identity,
    cache: bool,
    writable_args: Vec<usize>,
    core: RwLock<GufuncCore>,
}

impl Drop for GufuncInner {
    fn drop(&mut self) {
        TypingContext::global().remove(&self.key);
        TargetContext::global().remove(&self.key);
    }
}

/// Handle to a dynamic gufunc. Clones share state.
#[derive(Clone)]
pub struct Gufunc {
    inner: Arc<GufuncInner>,
}

pub struct GufuncBuilder {
    kernel: KernelBody,
    signature: String,
    dispatch: Dispatch,
    identity: Identity,
    cache: bool,
    options: Option<TargetOptions>,
    writable_args: Vec<usize>,
    compiler: Option<Arc<dyn KernelCompiler>>,
}

impl GufuncBuilder {
    pub fn new(kernel: KernelBody, signature: impl Into<String>) -> Self {
        Self {
            kernel,
            signature: signature.into(),
            dispatch: Dispatch::Static,
            identity: Identity::None,
            cache: false,
            options: None,
            writable_args: Vec::new(),
            compiler: None,
        }
    }

    pub fn dynamic(mut self, enabled: bool) -> Self {
        self.dispatch = if enabled {
            Dispatch::Dynamic
        } else {
            Dispatch::Static
        };
        self
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// Defaults to [`TargetOptions::from_env`].
    pub fn target_options(mut self, options: TargetOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Input positions whose kernel writes are copied back to the caller.
    pub fn writable_args(mut self, positions: impl IntoIterator<Item = usize>) -> Self {
        self.writable_args = positions.into_iter().collect();
        self
    }

    /// Defaults to a fresh [`JitEngine`] owned by this gufunc.
    pub fn compiler(mut self, compiler: Arc<dyn KernelCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    /// Parse the signature, register the kernel in the global kernel
    /// library and install the typing and lowering hooks.
    ///
    /// Fails with [`GufuncError::KernelConflict`] when another body is
    /// already registered under the kernel's name.
    pub fn build(self) -> Result<Gufunc> {
        let dims: DimensionSignature = parse_signature(&self.signature)?;
        let name = self.kernel.name().to_string();
        let doc = self.kernel.doc().map(str::to_string);
        KernelLibrary::global().register(self.kernel.clone())?;

        let registry = SpecializationRegistry::new(
            self.kernel,
            Arc::new(dims),
            self.options.unwrap_or_else(TargetOptions::from_env),
            self.compiler.unwrap_or_else(JitEngine::new_dyn),
        );
        let ufunc = Arc::new(Ufunc::build(
            name.clone(),
            &registry,
            self.identity,
            &self.writable_args,
        ));

        let gufunc = Gufunc {
            inner: Arc::new(GufuncInner {
                key: FunctionKey::new(name.clone()),
                name,
                doc,
                signature: self.signature,
                identity: self.identity,
                cache: self.cache,
                writable_args: self.writable_args,
                core: RwLock::new(GufuncCore {
                    registry,
                    lifecycle: Lifecycle::new(self.dispatch),
                    ufunc,
                }),
            }),
        };
        gufunc.install_hooks();
        debug!(function = %gufunc.name(), signature = %gufunc.inner.signature, "created gufunc");
        Ok(gufunc)
    }
}

impl Gufunc {
    pub fn builder(kernel: KernelBody, signature: impl Into<String>) -> GufuncBuilder {
        GufuncBuilder::new(kernel, signature)
    }

    fn install_hooks(&self) {
        TypingContext::global().insert_user_function(
            self.inner.key.clone(),
            Arc::new(hooks::GufuncTemplate {
                inner: Arc::downgrade(&self.inner),
            }),
        );
        TargetContext::global().insert_func_defn(hooks::lowering_defns(self));
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn doc(&self) -> Option<&str> {
        self.inner.doc.as_deref()
    }

    /// Symbol under which the typing and lowering hooks are installed.
    pub fn key(&self) -> &FunctionKey {
        &self.inner.key
    }

    pub fn is_dynamic(&self) -> bool {
        self.inner.core.read().lifecycle.is_dynamic()
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.core.read().lifecycle.is_frozen()
    }

    pub fn cache(&self) -> bool {
        self.inner.cache
    }

    pub fn writable_args(&self) -> &[usize] {
        &self.inner.writable_args
    }

    /// The aggregate function currently calls are delegated to.
    pub fn ufunc(&self) -> Arc<Ufunc> {
        Arc::clone(&self.inner.core.read().ufunc)
    }

    pub fn nin(&self) -> usize {
        self.ufunc().nin()
    }

    pub fn nout(&self) -> usize {
        self.ufunc().nout()
    }

    pub fn nargs(&self) -> usize {
        self.ufunc().nargs()
    }

    pub fn ntypes(&self) -> usize {
        self.ufunc().ntypes()
    }

    pub fn types(&self) -> Vec<String> {
        self.ufunc().types()
    }

    pub fn identity(&self) -> Identity {
        self.ufunc().identity()
    }

    pub fn signature(&self) -> String {
        self.ufunc().signature()
    }

    /// Core rank of every operand, inputs first.
    pub fn expected_ndims(&self) -> Vec<usize> {
        self.inner.core.read().registry.dims().expected_ndims()
    }

    pub fn target_options(&self) -> TargetOptions {
        self.inner.core.read().registry.options().clone()
    }

    pub fn specializations(&self) -> Vec<CallSignature> {
        self.inner.core.read().registry.signatures()
    }

    /// Successful compilations performed by this gufunc's compiler.
    pub fn compile_count(&self) -> u64 {
        self.inner.core.read().registry.compiler().compile_count()
    }

    /// Compile `signature` without rebuilding the aggregate function.
    pub fn add(&self, signature: CallSignature) -> Result<()> {
        self.inner.core.write().registry.insert(signature)?;
        Ok(())
    }

    /// Rebuild the aggregate function from the current specializations.
    pub fn build_ufunc(&self) -> &Self {
        let inner = &self.inner;
        inner
            .core
            .write()
            .rebuild_ufunc(&inner.name, inner.identity, &inner.writable_args);
        self
    }

    /// Stop compiling at call time. Later calls only widen to existing
    /// specializations.
    pub fn disable_compile(&self) -> Result<()> {
        let mut core = self.inner.core.write();
        let count = core.registry.len();
        if !core.lifecycle.freeze(count) {
            return Err(GufuncError::FreezeWithoutSpecializations {
                function: self.inner.name.clone(),
            });
        }
        debug!(function = %self.inner.name, specializations = count, "compilation disabled");
        Ok(())
    }

    /// Stored specialization for `ewise`. Once frozen, the lookup accepts
    /// any loop the host casting rules allow.
    pub fn find_ewise_function(&self, ewise: &[ScalarType]) -> Option<(CallSignature, SpecializationEntry)> {
        self.inner
            .core
            .read()
            .find_ewise_function(ewise)
            .map(|entry| (entry.signature.clone(), entry))
    }

    /// Call the gufunc. `args` holds the inputs and, for dynamic gufuncs,
    /// the output unless it is passed as `kwargs.out`. Returns the output.
    pub fn call(&self, args: &[Value], kwargs: Kwargs) -> Result<Value> {
        let inner = &self.inner;
        let (fast, mut ufunc) = {
            let core = inner.core.read();
            (core.lifecycle.fast_path(), Arc::clone(&core.ufunc))
        };
        if fast {
            return ufunc.call(args, kwargs.out);
        }

        let mut operands = args.to_vec();
        operands.extend(kwargs.out);
        let expected = ufunc.nin() + 1;
        if operands.len() != expected {
            return Err(GufuncError::arity(&inner.name, expected, operands.len()));
        }

        let ewise = elementwise_types(&operands)?;
        if ufunc.find_matching_loop(&ewise).is_none() {
            let mut core = inner.core.write();
            // another caller may have compiled or frozen in the meantime
            if !core.lifecycle.fast_path() && core.ufunc.find_matching_loop(&ewise).is_none() {
                let resolution =
                    SpecializationResolver::new(&mut core.registry, &inner.name).resolve(&ewise, false, true)?;
                debug!(function = %inner.name, signature = %resolution.signature, "rebuilding aggregate function");
                core.rebuild_ufunc(&inner.name, inner.identity, &inner.writable_args);
            }
            ufunc = Arc::clone(&core.ufunc);
        } else {
            trace!(function = %inner.name, "loop table hit");
        }

        ufunc.call(&operands, None)
    }

    /// Typing rule for call sites: validate the element-wise types, compiling
    /// a specialization when none matches and the gufunc is not frozen.
    /// The call's signature is `none(argtys...)`.
    pub fn type_call(&self, argtys: &[Type], kws: &[(String, Type)]) -> Result<CallSignature> {
        if let Some((name, _)) = kws.first() {
            return Err(GufuncError::Typing(format!(
                "{self} does not accept keyword argument '{name}' at typed call sites"
            )));
        }
        let inner = &self.inner;
        let ewise = resolve_elementwise_types(self.nin(), argtys)?;

        let mut core = inner.core.write();
        if core.find_ewise_function(&ewise).is_none() {
            let frozen = core.lifecycle.is_frozen();
            let resolution =
                SpecializationResolver::new(&mut core.registry, &inner.name).resolve(&ewise, frozen, !frozen)?;
            if resolution.kind == ResolutionKind::Compiled {
                core.rebuild_ufunc(&inner.name, inner.identity, &inner.writable_args);
            }
        }
        Ok(CallSignature::void(argtys.to_vec()))
    }

    /// Lowered call: run the broadcasting loop with the stored specialization
    /// for `args`, allocating the output when it is not supplied.
    pub fn lower_call(&self, args: &[Value]) -> Result<Value> {
        let ewise = elementwise_types(args)?;
        let (_, entry) = self.find_ewise_function(&ewise).ok_or_else(|| {
            GufuncError::NoMatchingSpecialization {
                function: self.inner.name.clone(),
                types: ewise.clone(),
            }
        })?;

        let ufunc = self.ufunc();
        let nin = ufunc.nin();
        let mut operands = args.to_vec();
        if operands.len() == nin {
            let dtype = entry.outputs()[0];
            operands.push(ufunc.allocate_output(&operands, dtype)?);
        }
        ufunc.execute(&operands, &entry.key, &entry.artifact)?;
        Ok(operands.swap_remove(nin))
    }

    pub fn state(&self) -> GufuncState {
        let core = self.inner.core.read();
        GufuncState {
            kernel: self.inner.name.clone(),
            signature: self.inner.signature.clone(),
            identity: self.inner.identity,
            cache: self.inner.cache,
            is_dynamic: core.lifecycle.is_dynamic(),
            target_options: core.registry.options().clone(),
            writable_args: self.inner.writable_args.clone(),
            typesigs: core.registry.signatures(),
            frozen: core.lifecycle.is_frozen(),
        }
    }

    /// Reconstruct a gufunc from `state`, compiling each stored signature
    /// once with `compiler`.
    pub fn rebuild(
        state: GufuncState,
        library: &KernelLibrary,
        compiler: Arc<dyn KernelCompiler>,
    ) -> Result<Gufunc> {
        let kernel = library
            .lookup(&state.kernel)
            .ok_or_else(|| GufuncError::UnknownKernel(state.kernel.clone()))?;
        let gufunc = Gufunc::builder(kernel, state.signature)
            .dynamic(state.is_dynamic)
            .identity(state.identity)
            .cache(state.cache)
            .target_options(state.target_options)
            .writable_args(state.writable_args)
            .compiler(compiler)
            .build()?;
        for signature in state.typesigs {
            gufunc.add(signature)?;
        }
        gufunc.build_ufunc();
        if state.frozen {
            gufunc.disable_compile()?;
        }
        Ok(gufunc)
    }
}

impl fmt::Display for Gufunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<dyngufunc '{}'>", self.inner.name)
    }
}

impl fmt::Debug for Gufunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gufunc")
            .field("name", &self.inner.name)
            .field("signature", &self.inner.signature)
            .field("specializations", &self.specializations().len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
